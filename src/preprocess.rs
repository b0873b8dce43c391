// 该文件是 Kanjian （看见） 项目的一部分。
// src/preprocess.rs - 帧预处理
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

use image::imageops::{self, FilterType};
use thiserror::Error;
use tracing::debug;

use crate::{
  frame::{RGB_CHANNELS, RgbFrame},
  tensor::{Tensor, TensorError},
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PreprocessError {
  #[error("帧尺寸无效: {width}x{height}")]
  EmptyFrame { width: u32, height: u32 },
  #[error("模型输入尺寸无效: {width}x{height}")]
  InvalidInputSize { width: u32, height: u32 },
  #[error("帧数据尚未就绪")]
  SourceNotReady,
  #[error("张量错误: {0}")]
  TensorError(#[from] TensorError),
}

/// 把任意尺寸的 RGB 帧转换成模型要求的 `[1, 3, H, W]` 浮点张量。
///
/// 缩放直接拉伸到目标尺寸（不做 letterbox），像素值除以 255 归一化到 [0, 1]，
/// 并按通道平面排列：先全部 R，再全部 G，最后全部 B。
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
  input_size: (u32, u32),
  filter: FilterType,
}

impl Preprocessor {
  pub fn new(input_size: (u32, u32)) -> Self {
    Self {
      input_size,
      filter: FilterType::Triangle,
    }
  }

  pub fn with_filter(mut self, filter: FilterType) -> Self {
    self.filter = filter;
    self
  }

  pub fn input_size(&self) -> (u32, u32) {
    self.input_size
  }

  pub fn prepare(&self, frame: &RgbFrame) -> Result<Tensor, PreprocessError> {
    let (width, height) = self.input_size;
    if width == 0 || height == 0 {
      return Err(PreprocessError::InvalidInputSize { width, height });
    }
    if frame.is_empty() {
      return Err(PreprocessError::EmptyFrame {
        width: frame.width(),
        height: frame.height(),
      });
    }

    let image = frame.to_rgb_image().ok_or(PreprocessError::SourceNotReady)?;
    let resized = if image.dimensions() == (width, height) {
      image
    } else {
      debug!(
        "缩放帧 {}x{} -> {}x{}",
        frame.width(),
        frame.height(),
        width,
        height
      );
      imageops::resize(&image, width, height, self.filter)
    };

    let plane = plane_len(width, height);
    let raw = resized.as_raw();
    let mut data = vec![0f32; RGB_CHANNELS * plane];
    for idx in 0..plane {
      data[idx] = raw[idx * RGB_CHANNELS] as f32 / 255.0;
      data[plane + idx] = raw[idx * RGB_CHANNELS + 1] as f32 / 255.0;
      data[2 * plane + idx] = raw[idx * RGB_CHANNELS + 2] as f32 / 255.0;
    }

    Ok(Tensor::new(
      [1, RGB_CHANNELS, height as usize, width as usize],
      data,
    )?)
  }
}

/// 单个通道平面的元素个数，按 usize 计算
fn plane_len(width: u32, height: u32) -> usize {
  width as usize * height as usize
}

pub fn prepare(frame: &RgbFrame, input_size: (u32, u32)) -> Result<Tensor, PreprocessError> {
  Preprocessor::new(input_size).prepare(frame)
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn plane_length_does_not_wrap_in_u32() {
    assert_eq!(plane_len(65_536, 65_536), 65_536usize * 65_536usize);
    assert_eq!(plane_len(640, 480), 307_200);
  }

  fn gradient(width: u32, height: u32) -> RgbFrame {
    RgbFrame::from(RgbImage::from_fn(width, height, |x, y| {
      Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
  }

  #[test]
  fn output_has_planar_shape_and_unit_range() {
    for (w, h) in [(1280, 720), (33, 17), (640, 640)] {
      let tensor = prepare(&gradient(w, h), (64, 64)).unwrap();
      assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
      assert_eq!(tensor.len(), 3 * 64 * 64);
      assert!(tensor.data().iter().all(|v| (0.0..=1.0).contains(v)));
    }
  }

  #[test]
  fn channels_are_written_plane_by_plane() {
    let mut image = RgbImage::new(2, 1);
    image.put_pixel(0, 0, Rgb([255, 0, 0]));
    image.put_pixel(1, 0, Rgb([0, 51, 255]));
    let tensor = prepare(&RgbFrame::from(image), (2, 1)).unwrap();
    assert_eq!(tensor.data(), &[1.0, 0.0, 0.0, 0.2, 0.0, 1.0]);
  }

  #[test]
  fn empty_frame_is_rejected() {
    let err = prepare(&RgbFrame::with_shape(0, 480), (640, 640)).unwrap_err();
    assert_eq!(
      err,
      PreprocessError::EmptyFrame {
        width: 0,
        height: 480
      }
    );
  }
}
