// 该文件是 Kanjian （看见） 项目的一部分。
// src/export.rs - 检测结果导出与分享
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

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
  catalog::{ProductCatalog, ProductInfo},
  detection::{BoundingBox, Detection},
  session::DetectionSnapshot,
};

pub const SHOPPING_SEARCH_URL: &str = "https://www.google.com/search?tbm=shop&q=";

/// 可出现在分享文本中的类别。
pub const SHARE_CLASSES: [&str; 31] = [
  "person",
  "backpack",
  "handbag",
  "suitcase",
  "bottle",
  "wine glass",
  "cup",
  "bowl",
  "chair",
  "couch",
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

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedDetection {
  pub bbox: BoundingBox,
  pub confidence: f32,
  pub class_id: i64,
  #[serde(rename = "class")]
  pub class_name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub product_info: Option<ProductInfo>,
}

/// 一次结果导出的内容，时间戳为毫秒级 Unix 时间。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
  pub timestamp: i64,
  pub frame_index: u64,
  pub detections: Vec<ExportedDetection>,
}

impl ExportRecord {
  pub fn from_snapshot(snapshot: &DetectionSnapshot, catalog: &ProductCatalog) -> Self {
    Self::new(
      snapshot.captured_at,
      snapshot.frame_index,
      &snapshot.detections,
      catalog,
    )
  }

  pub fn new(
    at: DateTime<Utc>,
    frame_index: u64,
    detections: &[Detection],
    catalog: &ProductCatalog,
  ) -> Self {
    let detections = detections
      .iter()
      .map(|d| ExportedDetection {
        bbox: d.bbox,
        confidence: d.confidence,
        class_id: d.class_id,
        class_name: d.class_name.clone(),
        product_info: catalog.get(&d.class_name).cloned(),
      })
      .collect();
    Self {
      timestamp: at.timestamp_millis(),
      frame_index,
      detections,
    }
  }

  pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(self)
  }
}

pub fn capture_file_name(at: DateTime<Utc>) -> String {
  format!("detection-{}.png", at.timestamp_millis())
}

pub fn export_file_name(at: DateTime<Utc>) -> String {
  format!("detections-{}.json", at.timestamp_millis())
}

/// `Today's Fit: a, b, c`，按检测顺序列出白名单内的类别。
pub fn share_text(detections: &[Detection]) -> String {
  let items: Vec<&str> = detections
    .iter()
    .map(|d| d.class_name.as_str())
    .filter(|name| SHARE_CLASSES.contains(name))
    .collect();
  format!("Today's Fit: {}", items.join(", "))
}

pub fn shopping_link(class_name: &str) -> String {
  format!(
    "{}{}",
    SHOPPING_SEARCH_URL,
    urlencoding::encode(class_name)
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn detection(name: &str) -> Detection {
    Detection {
      bbox: BoundingBox::new(1.0, 2.0, 3.0, 4.0),
      class_id: 0,
      class_name: name.to_string(),
      confidence: 0.75,
    }
  }

  #[test]
  fn share_text_keeps_whitelisted_classes_in_order() {
    let detections = [
      detection("laptop"),
      detection("car"),
      detection("cell phone"),
      detection("laptop"),
    ];
    assert_eq!(
      share_text(&detections),
      "Today's Fit: laptop, cell phone, laptop"
    );
    assert_eq!(share_text(&[]), "Today's Fit: ");
  }

  #[test]
  fn shopping_link_encodes_class() {
    assert_eq!(
      shopping_link("teddy bear"),
      "https://www.google.com/search?tbm=shop&q=teddy%20bear"
    );
  }

  #[test]
  fn export_attaches_product_info_when_known() {
    let mut catalog = ProductCatalog::default();
    catalog.insert(
      "laptop",
      ProductInfo {
        brand: "Acme".to_string(),
        price: "$999".to_string(),
        description: "Thin".to_string(),
      },
    );
    let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
    let record = ExportRecord::new(at, 9, &[detection("laptop"), detection("car")], &catalog);

    let value: serde_json::Value = serde_json::from_str(&record.to_json_pretty().unwrap()).unwrap();
    assert_eq!(value["timestamp"], 1_700_000_000_123i64);
    assert_eq!(value["frameIndex"], 9);
    assert_eq!(value["detections"][0]["classId"], 0);
    assert!(value["detections"][0].get("class_id").is_none());
    assert_eq!(value["detections"][0]["class"], "laptop");
    assert_eq!(value["detections"][0]["productInfo"]["brand"], "Acme");
    assert!(value["detections"][1].get("productInfo").is_none());
    assert_eq!(capture_file_name(at), "detection-1700000000123.png");
    assert_eq!(export_file_name(at), "detections-1700000000123.json");
  }
}
