// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/image_folder.rs - 图像序列输入
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

use std::{
  path::{Path, PathBuf},
  time::Instant,
};

use image::ImageReader;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  input::{FrameSource, InputError},
  query_map,
};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Error, Debug)]
pub enum ImageFolderInputError {
  #[error("URI 方案不匹配")]
  SchemaMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("目录中没有图像文件: {0}")]
  EmptyFolder(String),
  #[error("图像 {0} 加载错误: {1}")]
  ImageLoadError(String, image::ImageError),
}

/// 按文件名顺序读取目录中的图像，`loop` 参数使其循环播放。
pub struct ImageFolderInput {
  files: Vec<PathBuf>,
  position: usize,
  looping: bool,
  frame_index: u64,
  frame_size: Option<(u32, u32)>,
  start_time: Instant,
}

impl FromUrl for ImageFolderInput {
  type Error = ImageFolderInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFolderInputError::SchemaMismatch);
    }
    let looping = query_map(url).contains_key("loop");
    Ok(Self::open(Path::new(url.path()))?.looping(looping))
  }
}

impl FromUrlWithScheme for ImageFolderInput {
  const SCHEME: &'static str = "folder";
}

impl ImageFolderInput {
  pub fn open(dir: &Path) -> Result<Self, ImageFolderInputError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
      let path = entry?.path();
      let is_image = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
      if path.is_file() && is_image {
        files.push(path);
      }
    }
    if files.is_empty() {
      return Err(ImageFolderInputError::EmptyFolder(
        dir.display().to_string(),
      ));
    }
    files.sort();
    info!("目录 {} 中共有 {} 张图像", dir.display(), files.len());

    Ok(Self {
      files,
      position: 0,
      looping: false,
      frame_index: 0,
      frame_size: None,
      start_time: Instant::now(),
    })
  }

  pub fn looping(mut self, looping: bool) -> Self {
    self.looping = looping;
    self
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  fn load(path: &Path) -> Result<image::RgbImage, ImageFolderInputError> {
    let reader = ImageReader::open(path)?;
    let image = reader
      .decode()
      .map_err(|e| ImageFolderInputError::ImageLoadError(path.display().to_string(), e))?;
    Ok(image.to_rgb8())
  }
}

impl Iterator for ImageFolderInput {
  type Item = Result<RgbFrame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.position >= self.files.len() {
      if !self.looping {
        return None;
      }
      self.position = 0;
    }
    let path = &self.files[self.position];
    self.position += 1;

    let index = self.frame_index;
    self.frame_index += 1;
    match Self::load(path) {
      Ok(image) => {
        self.frame_size = Some(image.dimensions());
        let timestamp_ms = self.start_time.elapsed().as_millis() as u64;
        Some(Ok(RgbFrame::from(image).with_index(index, timestamp_ms)))
      }
      Err(e) => {
        warn!("读取图像失败: {}", e);
        Some(Err(e.into()))
      }
    }
  }
}

impl FrameSource for ImageFolderInput {
  fn frame_size(&self) -> Option<(u32, u32)> {
    self.frame_size
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  fn write(dir: &Path, name: &str, value: u8) {
    RgbImage::from_pixel(3, 2, Rgb([value, value, value]))
      .save(dir.join(name))
      .unwrap();
  }

  #[test]
  fn images_are_read_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "b.png", 2);
    write(dir.path(), "a.png", 1);
    std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

    let input = ImageFolderInput::open(dir.path()).unwrap();
    assert_eq!(input.len(), 2);
    let firsts: Vec<u8> = input
      .map(|f| f.unwrap().to_rgb_image().unwrap().get_pixel(0, 0)[0])
      .collect();
    assert_eq!(firsts, vec![1, 2]);
  }

  #[test]
  fn broken_file_yields_error_then_continues() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.png"), b"not a png").unwrap();
    write(dir.path(), "b.png", 7);

    let results: Vec<bool> = ImageFolderInput::open(dir.path())
      .unwrap()
      .map(|f| f.is_ok())
      .collect();
    assert_eq!(results, vec![false, true]);
  }

  #[test]
  fn looping_restarts_from_first_image() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.png", 1);
    let url = Url::parse(&format!("folder://{}?loop", dir.path().display())).unwrap();
    let input = ImageFolderInput::from_url(&url).unwrap();
    assert_eq!(input.take(5).filter(|f| f.is_ok()).count(), 5);
  }

  #[test]
  fn empty_folder_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      ImageFolderInput::open(dir.path()),
      Err(ImageFolderInputError::EmptyFolder(_))
    ));
  }
}
