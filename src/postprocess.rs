// 该文件是 Kanjian （看见） 项目的一部分。
// src/postprocess.rs - 模型输出解码
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

//! # 模型输出解码
//!
//! 支持两种原始输出布局，由模型配置决定，不做自动探测：
//!
//! - 逐类别置信度布局：每条记录为
//!   `[x, y, w, h, objectness, class_score_0 .. class_score_{N-1}]`，
//!   `x, y` 为模型输入坐标系中的左上角。
//! - 扁平检测布局：每条记录为 `[x1, y1, x2, y2, confidence, class_id]`。
//!
//! 置信度阈值为闭区间判断（`confidence >= threshold`）。解码后的边界框按
//! `(显示宽 / 输入宽, 显示高 / 输入高)` 分轴缩放并裁剪到显示区域内。
//!
//! 不做非极大值抑制，同一物体的重叠框会全部保留。

use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use crate::{
  config::DetectionConfig,
  detection::{BoundingBox, Detection},
  labels::ClassLabelTable,
  tensor::Tensor,
};

pub const DEFAULT_CLASS_COUNT: usize = 80;
const FLAT_RECORD_STRIDE: usize = 6;
// x, y, w, h, objectness
const PER_CLASS_HEADER: usize = 5;

/// 逐类别布局下最终置信度的计算方式，随模型而定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfidenceMode {
  /// 直接使用 objectness
  #[default]
  Objectness,
  /// objectness 乘以最高类别分数
  ObjectnessTimesClass,
}

impl FromStr for ConfidenceMode {
  type Err = DecodeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "objectness" => Ok(ConfidenceMode::Objectness),
      "combined" | "objectness-times-class" => Ok(ConfidenceMode::ObjectnessTimesClass),
      other => Err(DecodeError::UnknownConfidenceMode(other.to_string())),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
  PerClass {
    num_classes: usize,
    confidence: ConfidenceMode,
  },
  Flat,
}

impl OutputLayout {
  pub fn per_class(num_classes: usize, confidence: ConfidenceMode) -> Self {
    OutputLayout::PerClass {
      num_classes,
      confidence,
    }
  }

  pub fn stride(&self) -> usize {
    match self {
      OutputLayout::PerClass { num_classes, .. } => PER_CLASS_HEADER + num_classes,
      OutputLayout::Flat => FLAT_RECORD_STRIDE,
    }
  }
}

impl FromStr for OutputLayout {
  type Err = DecodeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "flat" => Ok(OutputLayout::Flat),
      "per-class" => Ok(OutputLayout::per_class(
        DEFAULT_CLASS_COUNT,
        ConfidenceMode::default(),
      )),
      other => Err(DecodeError::UnknownLayout(other.to_string())),
    }
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
  #[error("模型输出长度异常: {len} 不能被记录步长 {stride} 整除")]
  MalformedLength { len: usize, stride: usize },
  #[error("逐类别布局的类别数不能为 0")]
  NoClasses,
  #[error("显示区域尺寸无效: {0}x{1}")]
  InvalidDisplaySize(u32, u32),
  #[error("未知的输出布局: {0}")]
  UnknownLayout(String),
  #[error("未知的置信度模式: {0}")]
  UnknownConfidenceMode(String),
}

#[derive(Debug, Clone, Copy)]
pub struct PostProcessor {
  layout: OutputLayout,
}

impl PostProcessor {
  pub fn new(layout: OutputLayout) -> Self {
    Self { layout }
  }

  pub fn layout(&self) -> OutputLayout {
    self.layout
  }

  pub fn decode(
    &self,
    raw: &Tensor,
    config: &DetectionConfig,
    labels: &ClassLabelTable,
    display_size: (u32, u32),
  ) -> Result<Vec<Detection>, DecodeError> {
    decode(raw, self.layout, config, labels, display_size)
  }
}

pub fn decode(
  raw: &Tensor,
  layout: OutputLayout,
  config: &DetectionConfig,
  labels: &ClassLabelTable,
  display_size: (u32, u32),
) -> Result<Vec<Detection>, DecodeError> {
  if let OutputLayout::PerClass { num_classes: 0, .. } = layout {
    return Err(DecodeError::NoClasses);
  }
  let (display_w, display_h) = display_size;
  if display_w == 0 || display_h == 0 {
    return Err(DecodeError::InvalidDisplaySize(display_w, display_h));
  }

  let data = raw.data();
  let stride = layout.stride();
  if data.len() % stride != 0 {
    return Err(DecodeError::MalformedLength {
      len: data.len(),
      stride,
    });
  }

  let threshold = config.confidence_threshold();
  let (input_w, input_h) = config.input_size();
  let sx = display_w as f32 / input_w as f32;
  let sy = display_h as f32 / input_h as f32;

  let mut detections = Vec::new();
  for record in data.chunks_exact(stride) {
    let (bbox, class_id, score) = match layout {
      OutputLayout::PerClass { confidence, .. } => decode_per_class(record, confidence),
      OutputLayout::Flat => decode_flat(record),
    };

    // NaN 不会通过比较
    if !(score >= threshold) {
      continue;
    }

    detections.push(Detection {
      bbox: bbox
        .scale(sx, sy)
        .clamp_to(display_w as f32, display_h as f32),
      class_id,
      class_name: labels.name_of(class_id).to_string(),
      // 未校准的模型可能给出大于 1 的分数
      confidence: score.clamp(0.0, 1.0),
    });
  }

  debug!(
    "解码 {} 条记录, 保留 {} 个检测结果",
    data.len() / stride,
    detections.len()
  );
  Ok(detections)
}

fn decode_per_class(record: &[f32], mode: ConfidenceMode) -> (BoundingBox, i64, f32) {
  let objectness = record[4];
  let scores = &record[PER_CLASS_HEADER..];

  let mut best_idx = 0usize;
  let mut best_score = f32::MIN;
  for (idx, &score) in scores.iter().enumerate() {
    if score > best_score {
      best_score = score;
      best_idx = idx;
    }
  }

  let confidence = match mode {
    ConfidenceMode::Objectness => objectness,
    ConfidenceMode::ObjectnessTimesClass => objectness * best_score,
  };

  let bbox = BoundingBox::new(record[0], record[1], record[2], record[3]);
  (bbox, best_idx as i64, confidence)
}

fn decode_flat(record: &[f32]) -> (BoundingBox, i64, f32) {
  let class = record[5];
  // 非有限的类别编号一律视为越界
  let class_id = if class.is_finite() {
    class.round() as i64
  } else {
    -1
  };
  let bbox = BoundingBox::from_corners(record[0], record[1], record[2], record[3]);
  (bbox, class_id, record[4])
}
