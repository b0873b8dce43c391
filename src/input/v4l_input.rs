// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/v4l_input.rs - V4L2 摄像头输入
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

use std::{pin::Pin, time::Instant};

use thiserror::Error;
use tracing::{error, info};
use url::Url;
use v4l::{
  FourCC,
  buffer::Type,
  io::{mmap::Stream, traits::CaptureStream},
  prelude::*,
  video::Capture,
};

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  input::{FrameSource, InputError},
  query_map,
};

const DEFAULT_DEVICE: &str = "/dev/video0";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const CAPTURE_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum V4lInputError {
  #[error("URI 方案不匹配")]
  SchemaMismatch,
  #[error("无法打开设备 {0}: {1}")]
  OpenError(String, std::io::Error),
  #[error("V4L 错误: {0}")]
  V4lError(#[from] std::io::Error),
  #[error("无效的参数 {0}: {1}")]
  InvalidParameter(&'static str, String),
  #[error("设备不支持 YUYV 格式, 实际格式 {0}")]
  UnsupportedPixelFormat(String),
  #[error("帧数据长度异常: 期望 {expected}, 实际 {actual}")]
  BufferSizeMismatch { expected: usize, actual: usize },
}

/// V4L2 摄像头输入源，按 YUYV 采集并转换为 RGB。
///
/// v4l 的 Stream 需要引用 Device，这里用 `Pin<Box<Device>>` 固定设备的内存
/// 地址，再创建引用它的 Stream。
pub struct V4lInput {
  device: Pin<Box<Device>>,
  stream: Option<Stream<'static>>,
  width: u32,
  height: u32,
  frame_index: u64,
  start_time: Instant,
}

impl FromUrl for V4lInput {
  type Error = V4lInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4lInputError::SchemaMismatch);
    }

    let query = query_map(url);
    let parse = |key: &'static str, default: u32| -> Result<u32, V4lInputError> {
      match query.get(key) {
        Some(value) => value
          .parse::<u32>()
          .map_err(|_| V4lInputError::InvalidParameter(key, value.clone())),
        None => Ok(default),
      }
    };
    let width = parse("width", DEFAULT_WIDTH)?;
    let height = parse("height", DEFAULT_HEIGHT)?;

    let device_path = if url.path().is_empty() || url.path() == "/" {
      DEFAULT_DEVICE
    } else {
      url.path()
    };
    Self::open(device_path, width, height)
  }
}

impl FromUrlWithScheme for V4lInput {
  const SCHEME: &'static str = "v4l";
}

impl V4lInput {
  pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, V4lInputError> {
    let device = Box::pin(
      Device::with_path(device_path)
        .map_err(|e| V4lInputError::OpenError(device_path.to_string(), e))?,
    );

    let mut format = device.format()?;
    format.width = width;
    format.height = height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format)?;
    if format.fourcc != FourCC::new(b"YUYV") {
      return Err(V4lInputError::UnsupportedPixelFormat(
        format.fourcc.to_string(),
      ));
    }
    info!(
      "打开摄像头 {} ({}x{})",
      device_path, format.width, format.height
    );

    let mut input = Self {
      device,
      stream: None,
      width: format.width,
      height: format.height,
      frame_index: 0,
      start_time: Instant::now(),
    };

    // SAFETY: device 被 Pin<Box> 固定在堆上不会移动，stream 在 Drop 中先于 device 释放
    let device_ref: &Device = &input.device;
    let stream = unsafe {
      let device_static: &'static Device = std::mem::transmute(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, CAPTURE_BUFFERS)?
    };
    input.stream = Some(stream);
    Ok(input)
  }
}

impl Drop for V4lInput {
  fn drop(&mut self) {
    self.stream.take();
  }
}

/// 将 YUYV 格式转换为 RGB
pub(crate) fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, V4lInputError> {
  let expected = (width * height * 2) as usize;
  if yuyv.len() < expected {
    return Err(V4lInputError::BufferSizeMismatch {
      expected,
      actual: yuyv.len(),
    });
  }

  let mut rgb = Vec::with_capacity((width * height * 3) as usize);
  for chunk in yuyv[..expected].chunks_exact(4) {
    let u = chunk[1] as f32 - 128.0;
    let v = chunk[3] as f32 - 128.0;
    for y in [chunk[0] as f32, chunk[2] as f32] {
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }
  Ok(rgb)
}

impl Iterator for V4lInput {
  type Item = Result<RgbFrame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let stream = self.stream.as_mut()?;
    let result = stream
      .next()
      .map_err(V4lInputError::from)
      .and_then(|(buffer, _meta)| yuyv_to_rgb(buffer, self.width, self.height))
      .and_then(|rgb| {
        RgbFrame::from_raw(self.width, self.height, rgb).map_err(|e| {
          V4lInputError::V4lError(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
      });

    let index = self.frame_index;
    self.frame_index += 1;
    let timestamp_ms = self.start_time.elapsed().as_millis() as u64;
    Some(
      result
        .map(|frame| frame.with_index(index, timestamp_ms))
        .map_err(InputError::from),
    )
  }
}

impl FrameSource for V4lInput {
  fn frame_size(&self) -> Option<(u32, u32)> {
    Some((self.width, self.height))
  }

  fn fps(&self) -> Option<f32> {
    // V4L2 默认帧率
    Some(30.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn neutral_chroma_gives_gray() {
    let rgb = yuyv_to_rgb(&[128, 128, 64, 128], 2, 1).unwrap();
    assert_eq!(rgb, vec![128, 128, 128, 64, 64, 64]);
  }

  #[test]
  fn short_buffer_is_rejected() {
    assert!(matches!(
      yuyv_to_rgb(&[0; 6], 2, 2),
      Err(V4lInputError::BufferSizeMismatch {
        expected: 8,
        actual: 6
      })
    ));
  }
}
