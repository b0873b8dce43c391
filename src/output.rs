// 该文件是 Kanjian （看见） 项目的一部分。
// src/output.rs - 结果输出
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

use std::path::Path;

use image::RgbImage;
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, export::ExportRecord};

/// 输出一帧绘制好的叠加画面及其检测结果。
pub trait Render: Sized {
  type Error;
  fn render_result(&self, canvas: &RgbImage, record: &ExportRecord) -> Result<(), Self::Error>;
}

pub mod draw;

mod directory_record;
mod save_image_file;

pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};
pub use self::draw::{Canvas, DrawError};
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 丢弃所有结果。
#[derive(Debug, Default)]
pub struct NoneOutput;

impl FromUrl for NoneOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(NoneOutput)
  }
}

impl FromUrlWithScheme for NoneOutput {
  const SCHEME: &'static str = "none";
}

impl Render for NoneOutput {
  type Error = OutputError;

  fn render_result(&self, _canvas: &RgbImage, _record: &ExportRecord) -> Result<(), Self::Error> {
    Ok(())
  }
}

pub enum OutputWrapper {
  SaveImageFileOutput(SaveImageFileOutput),
  DirectoryRecordOutput(DirectoryRecordOutput),
  NoneOutput(NoneOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      SaveImageFileOutput::SCHEME => Ok(OutputWrapper::SaveImageFileOutput(
        SaveImageFileOutput::from_url(url)?,
      )),
      DirectoryRecordOutput::SCHEME => Ok(OutputWrapper::DirectoryRecordOutput(
        DirectoryRecordOutput::from_url(url)?,
      )),
      NoneOutput::SCHEME => Ok(OutputWrapper::NoneOutput(NoneOutput::from_url(url)?)),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, canvas: &RgbImage, record: &ExportRecord) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::SaveImageFileOutput(output) => output
        .render_result(canvas, record)
        .map_err(OutputError::from),
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(canvas, record)
        .map_err(OutputError::from),
      OutputWrapper::NoneOutput(output) => output.render_result(canvas, record),
    }
  }
}

pub(crate) fn ensure_parent(path: &Path) -> std::io::Result<()> {
  match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
    _ => Ok(()),
  }
}

pub(crate) fn write_record(path: &Path, record: &ExportRecord) -> std::io::Result<()> {
  let json = record.to_json_pretty().map_err(std::io::Error::other)?;
  std::fs::write(path, json)
}
