// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/read_image_file.rs - 静态图像输入
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{path::Path, time::Instant};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  input::{FrameSource, InputError},
  query_map,
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemaMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("无效的重复次数: {0}")]
  InvalidRepeat(String),
}

/// 把一张静态图像作为帧序列重复输出。
///
/// `repeat` 为输出次数，0 表示无限重复。
pub struct ImageFileInput {
  image: RgbImage,
  repeat: u64,
  emitted: u64,
  start_time: Instant,
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let repeat = match query_map(url).get("repeat") {
      Some(value) => value
        .parse::<u64>()
        .map_err(|_| ImageFileInputError::InvalidRepeat(value.clone()))?,
      None => 1,
    };
    Ok(Self::open(Path::new(url.path()))?.with_repeat(repeat))
  }
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl ImageFileInput {
  pub fn open(path: &Path) -> Result<Self, ImageFileInputError> {
    let image = ImageReader::open(path)?.decode()?.to_rgb8();
    info!(
      "读取图像 {} ({}x{})",
      path.display(),
      image.width(),
      image.height()
    );
    Ok(Self::from_image(image))
  }

  pub fn from_image(image: RgbImage) -> Self {
    Self {
      image,
      repeat: 1,
      emitted: 0,
      start_time: Instant::now(),
    }
  }

  pub fn with_repeat(mut self, repeat: u64) -> Self {
    self.repeat = repeat;
    self
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<RgbFrame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.repeat != 0 && self.emitted >= self.repeat {
      return None;
    }
    let index = self.emitted;
    self.emitted += 1;
    let timestamp_ms = self.start_time.elapsed().as_millis() as u64;
    Some(Ok(
      RgbFrame::from(self.image.clone()).with_index(index, timestamp_ms),
    ))
  }
}

impl FrameSource for ImageFileInput {
  fn frame_size(&self) -> Option<(u32, u32)> {
    Some(self.image.dimensions())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn repeats_requested_number_of_frames() {
    let input = ImageFileInput::from_image(RgbImage::from_pixel(4, 3, Rgb([1, 2, 3]))).with_repeat(3);
    let frames: Vec<RgbFrame> = input.map(|f| f.unwrap()).collect();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[2].index(), 2);
    assert_eq!((frames[0].width(), frames[0].height()), (4, 3));
  }

  #[test]
  fn zero_repeat_never_ends() {
    let input = ImageFileInput::from_image(RgbImage::new(2, 2)).with_repeat(0);
    assert_eq!(input.take(100).count(), 100);
  }

  #[test]
  fn reads_image_from_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("still.png");
    RgbImage::from_pixel(5, 5, Rgb([9, 9, 9])).save(&path).unwrap();

    let url = Url::parse(&format!("image://{}?repeat=2", path.display())).unwrap();
    let input = ImageFileInput::from_url(&url).unwrap();
    assert_eq!(input.frame_size(), Some((5, 5)));
    assert_eq!(input.count(), 2);
  }

  #[test]
  fn missing_file_is_an_error() {
    let url = Url::parse("image:///nonexistent/still.png").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::IoError(_))
    ));
  }
}
