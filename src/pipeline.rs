// 该文件是 Kanjian （看见） 项目的一部分。
// src/pipeline.rs - 单帧检测流水线
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

use std::time::Instant;

use thiserror::Error;
use tracing::debug;

use crate::{
  config::DetectionConfig,
  detection::Detection,
  frame::RgbFrame,
  labels::ClassLabelTable,
  model::{InferenceAdapter, InferenceError},
  postprocess::{DecodeError, PostProcessor},
  preprocess::{PreprocessError, Preprocessor},
};

/// 单帧处理中可恢复的错误，记录日志后跳过该帧。
#[derive(Error, Debug)]
pub enum TickError {
  #[error("预处理失败: {0}")]
  Preprocess(#[from] PreprocessError),
  #[error("推理失败: {0}")]
  Inference(#[from] InferenceError),
  #[error("解码失败: {0}")]
  Decode(#[from] DecodeError),
}

/// 预处理、推理、解码串成的一次完整检测。
pub struct Pipeline<A> {
  preprocessor: Preprocessor,
  adapter: A,
  postprocessor: PostProcessor,
  labels: ClassLabelTable,
  config: DetectionConfig,
}

impl<A: InferenceAdapter> Pipeline<A> {
  pub fn new(adapter: A, labels: ClassLabelTable, config: DetectionConfig) -> Self {
    let postprocessor = PostProcessor::new(adapter.output_layout());
    Self {
      preprocessor: Preprocessor::new(config.input_size()),
      adapter,
      postprocessor,
      labels,
      config,
    }
  }

  pub fn config(&self) -> &DetectionConfig {
    &self.config
  }

  pub fn labels(&self) -> &ClassLabelTable {
    &self.labels
  }

  pub fn adapter(&self) -> &A {
    &self.adapter
  }

  /// 检测一帧，结果坐标为帧本身的像素坐标。
  pub fn detect(&mut self, frame: &RgbFrame) -> Result<Vec<Detection>, TickError> {
    let now = Instant::now();
    let input = self.preprocessor.prepare(frame)?;
    let prepared = now.elapsed();

    let raw = self.adapter.run(&input)?;
    let inferred = now.elapsed();

    let detections = self.postprocessor.decode(
      &raw,
      &self.config,
      &self.labels,
      (frame.width(), frame.height()),
    )?;
    debug!(
      "第 {} 帧: 预处理 {:.2?}, 推理 {:.2?}, 总计 {:.2?}, {} 个目标",
      frame.index(),
      prepared,
      inferred - prepared,
      now.elapsed(),
      detections.len()
    );
    Ok(detections)
  }
}
