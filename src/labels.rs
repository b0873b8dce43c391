// 该文件是 Kanjian （看见） 项目的一部分。
// src/labels.rs - 类别标签表
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

use thiserror::Error;
use tracing::info;

/// 类别编号越界时使用的占位名称
pub const UNKNOWN_LABEL: &str = "unknown";

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

/// 商品识别模型的类别名称
pub const PRODUCT_CLASSES: [&str; 9] = [
  "person", "car", "phone", "tv", "laptop", "shoe", "shirt", "pants", "bag",
];

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("标签表为空: {0}")]
  Empty(String),
}

/// 按编号索引的类别名称表，启动时确定，之后只读。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabelTable {
  labels: Box<[String]>,
}

impl ClassLabelTable {
  pub fn new<I, S>(labels: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      labels: labels.into_iter().map(Into::into).collect(),
    }
  }

  pub fn coco() -> Self {
    Self::new(COCO_CLASSES)
  }

  pub fn products() -> Self {
    Self::new(PRODUCT_CLASSES)
  }

  /// 每行一个标签，忽略空行与 `#` 开头的注释行。
  pub fn parse_lines(text: &str) -> Self {
    Self::new(
      text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#')),
    )
  }

  /// `.json` 文件按字符串数组解析，其他文件按行解析。
  pub fn from_path(path: &Path) -> Result<Self, LabelError> {
    let text = std::fs::read_to_string(path)?;
    let is_json = path
      .extension()
      .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let table = if is_json {
      Self::new(serde_json::from_str::<Vec<String>>(&text)?)
    } else {
      Self::parse_lines(&text)
    };

    if table.is_empty() {
      return Err(LabelError::Empty(path.display().to_string()));
    }
    info!("从 {} 加载 {} 个类别标签", path.display(), table.len());
    Ok(table)
  }

  /// `coco` 与 `products` 为内置标签表，其余视为文件路径。
  pub fn resolve(name: &str) -> Result<Self, LabelError> {
    match name {
      "coco" => Ok(Self::coco()),
      "products" => Ok(Self::products()),
      path => Self::from_path(Path::new(path)),
    }
  }

  pub fn get(&self, class_id: i64) -> Option<&str> {
    usize::try_from(class_id)
      .ok()
      .and_then(|idx| self.labels.get(idx))
      .map(String::as_str)
  }

  pub fn name_of(&self, class_id: i64) -> &str {
    self.get(class_id).unwrap_or(UNKNOWN_LABEL)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn out_of_range_ids_resolve_to_unknown() {
    let labels = ClassLabelTable::products();
    assert_eq!(labels.name_of(0), "person");
    assert_eq!(labels.name_of(8), "bag");
    assert_eq!(labels.name_of(9), UNKNOWN_LABEL);
    assert_eq!(labels.name_of(-1), UNKNOWN_LABEL);
  }

  #[test]
  fn parse_lines_skips_comments_and_blanks() {
    let labels = ClassLabelTable::parse_lines("# header\ncat\n\n  dog  \n");
    assert_eq!(labels.iter().collect::<Vec<_>>(), vec!["cat", "dog"]);
  }

  #[test]
  fn loads_json_and_text_files() {
    let dir = tempfile::tempdir().unwrap();
    let json = dir.path().join("labels.json");
    std::fs::write(&json, r#"["a", "b", "c"]"#).unwrap();
    assert_eq!(ClassLabelTable::from_path(&json).unwrap().len(), 3);

    let empty = dir.path().join("empty.txt");
    std::fs::write(&empty, "# nothing\n").unwrap();
    assert!(matches!(
      ClassLabelTable::from_path(&empty),
      Err(LabelError::Empty(_))
    ));

    assert_eq!(ClassLabelTable::resolve("coco").unwrap().len(), 80);
  }
}
