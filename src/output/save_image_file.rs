// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/save_image_file.rs - 保存叠加画面到文件
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

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  export::{ExportRecord, capture_file_name, export_file_name},
  output::{Render, ensure_parent, write_record},
  query_map,
};

/// 保存最新的叠加画面。
///
/// 路径是已存在的目录时，按 `detection-{时间戳}.png` 命名；带 `record`
/// 参数时同时写出 JSON 结果。
pub struct SaveImageFileOutput {
  path: PathBuf,
  record: bool,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput {
      path: PathBuf::from(uri.path()),
      record: query_map(uri).contains_key("record"),
    })
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      record: false,
    }
  }

  pub fn with_record(mut self, record: bool) -> Self {
    self.record = record;
    self
  }

  fn target_paths(&self, record: &ExportRecord) -> (PathBuf, PathBuf) {
    if self.path.is_dir() {
      let at = DateTime::<Utc>::from_timestamp_millis(record.timestamp).unwrap_or_else(Utc::now);
      (
        self.path.join(capture_file_name(at)),
        self.path.join(export_file_name(at)),
      )
    } else {
      (self.path.clone(), self.path.with_extension("json"))
    }
  }
}

impl Render for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, canvas: &RgbImage, record: &ExportRecord) -> Result<(), Self::Error> {
    let (image_path, record_path) = self.target_paths(record);
    ensure_parent(&image_path)?;
    canvas.save(&image_path)?;
    info!("保存图像到文件: {}", image_path.display());

    if self.record {
      write_record(&record_path, record)?;
      info!("保存检测结果到文件: {}", record_path.display());
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record() -> ExportRecord {
    ExportRecord {
      timestamp: 1_700_000_000_000,
      frame_index: 3,
      detections: Vec::new(),
    }
  }

  #[test]
  fn writes_image_and_sidecar_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("out.png");
    let output = SaveImageFileOutput::new(&path).with_record(true);

    output.render_result(&RgbImage::new(4, 4), &record()).unwrap();
    assert!(path.is_file());
    let json = std::fs::read_to_string(path.with_extension("json")).unwrap();
    assert!(json.contains("\"frameIndex\": 3"));
  }

  #[test]
  fn directory_target_uses_timestamped_names() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("image://{}?record", dir.path().display())).unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();

    output.render_result(&RgbImage::new(2, 2), &record()).unwrap();
    assert!(dir.path().join("detection-1700000000000.png").is_file());
    assert!(dir.path().join("detections-1700000000000.json").is_file());
  }
}
