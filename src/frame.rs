// 该文件是 Kanjian （看见） 项目的一部分。
// src/frame.rs - RGB 帧定义
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

use image::RgbImage;
use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

pub trait AsNhwcFrame {
  fn as_nhwc(&self) -> &[u8];
}

/// 一帧交错排列（HWC）的 RGB 图像，附带帧序号与采集时间戳。
#[derive(Debug, Clone)]
pub struct RgbFrame {
  width: u32,
  height: u32,
  data: Box<[u8]>,
  index: u64,
  timestamp_ms: u64,
}

impl RgbFrame {
  pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
    let expected = RGB_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      data: data.into_boxed_slice(),
      index: 0,
      timestamp_ms: 0,
    })
  }

  /// 全黑帧。尺寸为 0 时表示输入源尚未就绪。
  pub fn with_shape(width: u32, height: u32) -> Self {
    let size = RGB_CHANNELS * width as usize * height as usize;
    Self {
      width,
      height,
      data: vec![0u8; size].into_boxed_slice(),
      index: 0,
      timestamp_ms: 0,
    }
  }

  pub fn with_index(mut self, index: u64, timestamp_ms: u64) -> Self {
    self.index = index;
    self.timestamp_ms = timestamp_ms;
    self
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn index(&self) -> u64 {
    self.index
  }

  pub fn timestamp_ms(&self) -> u64 {
    self.timestamp_ms
  }

  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }

  pub fn to_rgb_image(&self) -> Option<RgbImage> {
    RgbImage::from_raw(self.width, self.height, self.data.to_vec())
  }

  /// 水平镜像，保留帧序号与时间戳。
  pub fn mirrored(&self) -> Self {
    let row_len = RGB_CHANNELS * self.width as usize;
    let mut data = Vec::with_capacity(self.data.len());
    if row_len > 0 {
      for row in self.data.chunks_exact(row_len) {
        for pixel in row.rchunks_exact(RGB_CHANNELS) {
          data.extend_from_slice(pixel);
        }
      }
    }
    Self {
      width: self.width,
      height: self.height,
      data: data.into_boxed_slice(),
      index: self.index,
      timestamp_ms: self.timestamp_ms,
    }
  }
}

impl From<RgbImage> for RgbFrame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      data: image.into_raw().into_boxed_slice(),
      index: 0,
      timestamp_ms: 0,
    }
  }
}

impl AsMut<[u8]> for RgbFrame {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl AsNhwcFrame for RgbFrame {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn from_raw_rejects_wrong_length() {
    let err = RgbFrame::from_raw(2, 2, vec![0; 11]).unwrap_err();
    assert_eq!(
      err,
      FrameError::LengthMismatch {
        expected: 12,
        actual: 11
      }
    );
  }

  #[test]
  fn image_round_trip_keeps_pixels() {
    let mut image = RgbImage::new(3, 2);
    image.put_pixel(2, 1, image::Rgb([1, 2, 3]));
    let frame = RgbFrame::from(image.clone()).with_index(7, 40);
    assert_eq!(frame.index(), 7);
    assert_eq!(frame.to_rgb_image().unwrap(), image);
  }

  #[test]
  fn mirrored_flips_each_row() {
    let frame = RgbFrame::from_raw(2, 2, vec![1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4])
      .unwrap()
      .with_index(5, 200);
    let mirrored = frame.mirrored();
    assert_eq!(mirrored.as_nhwc(), &[2, 2, 2, 1, 1, 1, 4, 4, 4, 3, 3, 3]);
    assert_eq!(mirrored.index(), 5);
    assert_eq!(mirrored.timestamp_ms(), 200);
    assert!(RgbFrame::with_shape(0, 0).mirrored().is_empty());
  }
}
