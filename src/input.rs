// 该文件是 Kanjian （看见） 项目的一部分。
// src/input.rs - 帧输入源
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame};

/// 逐帧产生 RGB 图像的输入源。
///
/// 迭代结束表示输入源已耗尽；`Some(Err(_))` 表示单帧采集失败，
/// 调用方可以记录后继续读取下一帧。
pub trait FrameSource: Iterator<Item = Result<RgbFrame, InputError>> {
  /// 已知时返回帧尺寸
  fn frame_size(&self) -> Option<(u32, u32)>;

  fn fps(&self) -> Option<f32> {
    None
  }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
  fn frame_size(&self) -> Option<(u32, u32)> {
    (**self).frame_size()
  }

  fn fps(&self) -> Option<f32> {
    (**self).fps()
  }
}

mod image_folder;
mod read_image_file;

pub use self::image_folder::{ImageFolderInput, ImageFolderInputError};
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "v4l_input")]
mod v4l_input;
#[cfg(feature = "v4l_input")]
pub use self::v4l_input::{V4lInput, V4lInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerInputError, GStreamerInputPipelineBuilder};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("图像目录输入错误: {0}")]
  ImageFolderInputError(#[from] ImageFolderInputError),
  #[cfg(feature = "v4l_input")]
  #[error("V4L 输入错误: {0}")]
  V4lInputError(#[from] V4lInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer 输入错误: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  ReadImageFile(ImageFileInput),
  ImageFolder(ImageFolderInput),
  #[cfg(feature = "v4l_input")]
  V4l(V4lInput),
  #[cfg(feature = "gstreamer_input")]
  GStreamer(GStreamerInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?)),
      ImageFolderInput::SCHEME => Ok(InputWrapper::ImageFolder(ImageFolderInput::from_url(url)?)),
      #[cfg(feature = "v4l_input")]
      V4lInput::SCHEME => Ok(InputWrapper::V4l(V4lInput::from_url(url)?)),
      #[cfg(feature = "gstreamer_input")]
      GStreamerInputPipelineBuilder::SCHEME => {
        let input = GStreamerInputPipelineBuilder::from_url(url)?.build()?;
        Ok(InputWrapper::GStreamer(input))
      }
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Result<RgbFrame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ReadImageFile(input) => input.next(),
      InputWrapper::ImageFolder(input) => input.next(),
      #[cfg(feature = "v4l_input")]
      InputWrapper::V4l(input) => input.next(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => input.next(),
    }
  }
}

impl FrameSource for InputWrapper {
  fn frame_size(&self) -> Option<(u32, u32)> {
    match self {
      InputWrapper::ReadImageFile(input) => input.frame_size(),
      InputWrapper::ImageFolder(input) => input.frame_size(),
      #[cfg(feature = "v4l_input")]
      InputWrapper::V4l(input) => input.frame_size(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => input.frame_size(),
    }
  }

  fn fps(&self) -> Option<f32> {
    match self {
      InputWrapper::ReadImageFile(input) => input.fps(),
      InputWrapper::ImageFolder(input) => input.fps(),
      #[cfg(feature = "v4l_input")]
      InputWrapper::V4l(input) => input.fps(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => input.fps(),
    }
  }
}
