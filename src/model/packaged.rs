// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/packaged.rs - 分离输出的推理适配器
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

//! 打包模型把框、分数、类别分成多个输出（常见于 SSD 一类的导出模型）。
//! 适配器把它们拼成扁平检测布局 `[x1, y1, x2, y2, confidence, class_id]`，
//! 坐标换算到模型输入像素，后续解码与原始张量模型完全一致。

use std::{path::PathBuf, str::FromStr};

use ort::{inputs, value::TensorRef};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{
    InferenceAdapter, InferenceError,
    onnx::{self, OnnxSession},
  },
  postprocess::OutputLayout,
  query_map,
  tensor::Tensor,
};

const DEFAULT_BOXES_NAME: &str = "detection_boxes";
const DEFAULT_SCORES_NAME: &str = "detection_scores";
const DEFAULT_CLASSES_NAME: &str = "detection_classes";

/// 框坐标的排列方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoxFormat {
  /// `[y1, x1, y2, x2]`，归一化到 [0, 1]
  #[default]
  NormalizedYxyx,
  /// `[x1, y1, x2, y2]`，归一化到 [0, 1]
  NormalizedXyxy,
  /// `[x1, y1, x2, y2]`，模型输入像素
  PixelXyxy,
}

impl FromStr for BoxFormat {
  type Err = InferenceError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "yxyx" | "normalized-yxyx" => Ok(BoxFormat::NormalizedYxyx),
      "xyxy" | "normalized-xyxy" => Ok(BoxFormat::NormalizedXyxy),
      "pixel" | "pixel-xyxy" => Ok(BoxFormat::PixelXyxy),
      other => Err(InferenceError::InvalidParameter(format!(
        "未知的框格式: {}",
        other
      ))),
    }
  }
}

/// 把分离的框、分数、类别输出拼成 `[N, 6]` 的扁平检测张量。
///
/// `class_offset` 从模型类别编号中减去，用于以 1 起始编号的模型。
pub fn pack_flat_records(
  boxes: &[f32],
  scores: &[f32],
  classes: &[f32],
  format: BoxFormat,
  input_size: (u32, u32),
  class_offset: i64,
) -> Result<Tensor, InferenceError> {
  let count = scores.len();
  if boxes.len() != count * 4 || classes.len() != count {
    return Err(InferenceError::InvalidOutput(format!(
      "输出数量不一致: 框 {} 个数值, 分数 {} 个, 类别 {} 个",
      boxes.len(),
      scores.len(),
      classes.len()
    )));
  }

  let (w, h) = (input_size.0 as f32, input_size.1 as f32);
  let mut data = Vec::with_capacity(count * 6);
  for ((b, &score), &class) in boxes.chunks_exact(4).zip(scores).zip(classes) {
    let (x1, y1, x2, y2) = match format {
      BoxFormat::NormalizedYxyx => (b[1] * w, b[0] * h, b[3] * w, b[2] * h),
      BoxFormat::NormalizedXyxy => (b[0] * w, b[1] * h, b[2] * w, b[3] * h),
      BoxFormat::PixelXyxy => (b[0], b[1], b[2], b[3]),
    };
    data.extend([x1, y1, x2, y2, score, class - class_offset as f32]);
  }

  Ok(Tensor::new([count, 6], data)?)
}

pub struct PackagedModelAdapter {
  onnx: OnnxSession,
  input_name: String,
  boxes_name: String,
  scores_name: String,
  classes_name: String,
  format: BoxFormat,
  class_offset: i64,
}

#[derive(Debug, Clone)]
pub struct PackagedModelBuilder {
  model_path: PathBuf,
  input_name: Option<String>,
  boxes_name: String,
  scores_name: String,
  classes_name: String,
  format: BoxFormat,
  class_offset: i64,
  threads: Option<usize>,
}

impl FromUrl for PackagedModelBuilder {
  type Error = InferenceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InferenceError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let query = query_map(url);
    let mut builder = PackagedModelBuilder::new(url.path());
    builder.input_name = query.get("input").cloned();
    if let Some(name) = query.get("boxes") {
      builder.boxes_name = name.clone();
    }
    if let Some(name) = query.get("scores") {
      builder.scores_name = name.clone();
    }
    if let Some(name) = query.get("classes") {
      builder.classes_name = name.clone();
    }
    if let Some(format) = query.get("format") {
      builder.format = format.parse()?;
    }
    if let Some(offset) = query.get("class_offset") {
      builder.class_offset = offset.parse::<i64>().map_err(|_| {
        InferenceError::InvalidParameter(format!("无效的类别偏移: {}", offset))
      })?;
    }
    if let Some(threads) = query.get("threads") {
      builder.threads = Some(threads.parse::<usize>().map_err(|_| {
        InferenceError::InvalidParameter(format!("无效的线程数: {}", threads))
      })?);
    }
    Ok(builder)
  }
}

impl FromUrlWithScheme for PackagedModelBuilder {
  const SCHEME: &'static str = "packaged";
}

impl PackagedModelBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      input_name: None,
      boxes_name: DEFAULT_BOXES_NAME.to_string(),
      scores_name: DEFAULT_SCORES_NAME.to_string(),
      classes_name: DEFAULT_CLASSES_NAME.to_string(),
      format: BoxFormat::default(),
      class_offset: 0,
      threads: None,
    }
  }

  pub fn format(mut self, format: BoxFormat) -> Self {
    self.format = format;
    self
  }

  pub fn class_offset(mut self, offset: i64) -> Self {
    self.class_offset = offset;
    self
  }

  pub fn build(self) -> Result<PackagedModelAdapter, InferenceError> {
    let onnx = onnx::load_session(&self.model_path, self.threads)?;
    let input_name = onnx.pick_input(self.input_name.as_deref())?;
    onnx.require_output(&self.boxes_name)?;
    onnx.require_output(&self.scores_name)?;
    onnx.require_output(&self.classes_name)?;

    info!(
      "打包模型: 输入 {}, 输出 {}/{}/{}, 框格式 {:?}",
      input_name, self.boxes_name, self.scores_name, self.classes_name, self.format
    );
    Ok(PackagedModelAdapter {
      onnx,
      input_name,
      boxes_name: self.boxes_name,
      scores_name: self.scores_name,
      classes_name: self.classes_name,
      format: self.format,
      class_offset: self.class_offset,
    })
  }
}

impl InferenceAdapter for PackagedModelAdapter {
  fn output_layout(&self) -> OutputLayout {
    OutputLayout::Flat
  }

  fn run(&mut self, input: &Tensor) -> Result<Tensor, InferenceError> {
    let input_size = match input.shape() {
      [.., h, w] => (*w as u32, *h as u32),
      shape => {
        return Err(InferenceError::InvalidParameter(format!(
          "输入张量形状无效: {:?}",
          shape
        )));
      }
    };

    let array = onnx::to_ndarray(input)?;
    let tensor_ref = TensorRef::from_array_view(array.view())
      .map_err(|e| InferenceError::RunError(format!("无法创建输入张量: {}", e)))?;

    let outputs = self
      .onnx
      .session
      .run(inputs![self.input_name.as_str() => tensor_ref])
      .map_err(|e| InferenceError::RunError(e.to_string()))?;

    let boxes = onnx::extract_f32(&outputs[self.boxes_name.as_str()], &self.boxes_name)?;
    let scores = onnx::extract_f32(&outputs[self.scores_name.as_str()], &self.scores_name)?;
    let classes = onnx::extract_numeric(&outputs[self.classes_name.as_str()], &self.classes_name)?;

    let packed = pack_flat_records(
      boxes.data(),
      scores.data(),
      classes.data(),
      self.format,
      input_size,
      self.class_offset,
    );
    match &packed {
      Ok(tensor) => debug!("打包 {} 条检测记录", tensor.shape()[0]),
      Err(e) => warn!("打包模型输出失败: {}", e),
    }
    packed
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalized_yxyx_is_scaled_to_input_pixels() {
    let boxes = [0.25, 0.1, 0.5, 0.6];
    let packed = pack_flat_records(
      &boxes,
      &[0.9],
      &[3.0],
      BoxFormat::NormalizedYxyx,
      (640, 320),
      1,
    )
    .unwrap();

    assert_eq!(packed.shape(), &[1, 6]);
    assert_eq!(packed.data(), &[64.0, 80.0, 384.0, 160.0, 0.9, 2.0]);
  }

  #[test]
  fn pixel_boxes_pass_through() {
    let packed = pack_flat_records(
      &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
      &[0.4, 0.6],
      &[0.0, 1.0],
      BoxFormat::PixelXyxy,
      (640, 640),
      0,
    )
    .unwrap();
    assert_eq!(packed.shape(), &[2, 6]);
    assert_eq!(&packed.data()[6..], &[5.0, 6.0, 7.0, 8.0, 0.6, 1.0]);
  }

  #[test]
  fn mismatched_counts_are_rejected() {
    let err = pack_flat_records(
      &[0.0; 8],
      &[0.5],
      &[1.0],
      BoxFormat::NormalizedXyxy,
      (640, 640),
      0,
    );
    assert!(matches!(err, Err(InferenceError::InvalidOutput(_))));
  }

  #[test]
  fn builder_reads_output_names() {
    let url = Url::parse(
      "packaged:///models/ssd.onnx?boxes=b&scores=s&classes=c&format=xyxy&class_offset=1",
    )
    .unwrap();
    let builder = PackagedModelBuilder::from_url(&url).unwrap();
    assert_eq!(builder.boxes_name, "b");
    assert_eq!(builder.scores_name, "s");
    assert_eq!(builder.classes_name, "c");
    assert_eq!(builder.format, BoxFormat::NormalizedXyxy);
    assert_eq!(builder.class_offset, 1);
  }
}
