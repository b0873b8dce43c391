// 该文件是 Kanjian （看见） 项目的一部分。
// src/catalog.rs - 商品信息表
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

use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum CatalogError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
  #[serde(default)]
  pub brand: String,
  #[serde(default, deserialize_with = "string_or_number")]
  pub price: String,
  #[serde(default)]
  pub description: String,
}

// 价格字段既可能写成 "$19.99" 也可能写成 19.99
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Price {
    Text(String),
    Number(serde_json::Number),
  }

  Ok(match Price::deserialize(deserializer)? {
    Price::Text(text) => text,
    Price::Number(number) => number.to_string(),
  })
}

/// 类别名称到商品信息的静态映射，启动时加载一次。
///
/// 查不到条目不是错误，只是不绘制额外的信息行。
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
  entries: HashMap<String, ProductInfo>,
}

impl ProductCatalog {
  pub fn from_json_str(text: &str) -> Result<Self, CatalogError> {
    let entries: HashMap<String, ProductInfo> = serde_json::from_str(text)?;
    Ok(Self { entries })
  }

  pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
    let text = std::fs::read_to_string(path)?;
    let catalog = Self::from_json_str(&text)?;
    info!("从 {} 加载 {} 条商品信息", path.display(), catalog.len());
    Ok(catalog)
  }

  pub fn insert(&mut self, class_name: impl Into<String>, info: ProductInfo) {
    self.entries.insert(class_name.into(), info);
  }

  pub fn get(&self, class_name: &str) -> Option<&ProductInfo> {
    self.entries.get(class_name)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_textual_and_numeric_prices() {
    let catalog = ProductCatalog::from_json_str(
      r#"{
        "shoe": {"brand": "Runner", "price": "$89.00", "description": "Trail shoe"},
        "bag": {"brand": "Carry", "price": 35, "description": "Tote"}
      }"#,
    )
    .unwrap();

    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.get("shoe").unwrap().price, "$89.00");
    assert_eq!(catalog.get("bag").unwrap().price, "35");
    assert!(catalog.get("car").is_none());
  }

  #[test]
  fn missing_fields_default_to_empty() {
    let catalog = ProductCatalog::from_json_str(r#"{"tv": {"brand": "Pixel"}}"#).unwrap();
    let tv = catalog.get("tv").unwrap();
    assert_eq!(tv.brand, "Pixel");
    assert!(tv.price.is_empty());
    assert!(tv.description.is_empty());
  }
}
