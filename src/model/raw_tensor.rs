// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/raw_tensor.rs - 原始张量推理适配器
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

use ort::{inputs, value::TensorRef};
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{
    InferenceAdapter, InferenceError,
    onnx::{self, OnnxSession},
  },
  postprocess::{ConfidenceMode, OutputLayout},
  query_map,
  tensor::Tensor,
};

const DEFAULT_INPUT_NAME: &str = "images";
const DEFAULT_OUTPUT_NAME: &str = "output0";

/// 直接返回模型单个输出张量的适配器，输出布局由 URL 参数给定。
pub struct RawTensorModelAdapter {
  onnx: OnnxSession,
  input_name: String,
  output_name: String,
  layout: OutputLayout,
}

#[derive(Debug, Clone)]
pub struct RawTensorModelBuilder {
  model_path: PathBuf,
  layout: OutputLayout,
  input_name: Option<String>,
  output_name: Option<String>,
  threads: Option<usize>,
}

impl FromUrl for RawTensorModelBuilder {
  type Error = InferenceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InferenceError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let query = query_map(url);
    let mut layout = match query.get("layout") {
      Some(name) => name.parse::<OutputLayout>()?,
      None => OutputLayout::Flat,
    };
    if let OutputLayout::PerClass {
      num_classes,
      confidence,
    } = &mut layout
    {
      if let Some(classes) = query.get("classes") {
        *num_classes = classes.parse::<usize>().map_err(|_| {
          InferenceError::InvalidParameter(format!("无效的类别数: {}", classes))
        })?;
      }
      if let Some(mode) = query.get("confidence") {
        *confidence = mode.parse::<ConfidenceMode>()?;
      }
    }

    let threads = match query.get("threads") {
      Some(value) => Some(value.parse::<usize>().map_err(|_| {
        InferenceError::InvalidParameter(format!("无效的线程数: {}", value))
      })?),
      None => None,
    };

    Ok(Self {
      model_path: PathBuf::from(url.path()),
      layout,
      input_name: query.get("input").cloned(),
      output_name: query.get("output").cloned(),
      threads,
    })
  }
}

impl FromUrlWithScheme for RawTensorModelBuilder {
  const SCHEME: &'static str = "onnx";
}

impl RawTensorModelBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      layout: OutputLayout::Flat,
      input_name: None,
      output_name: None,
      threads: None,
    }
  }

  pub fn layout(mut self, layout: OutputLayout) -> Self {
    self.layout = layout;
    self
  }

  pub fn per_class(self, num_classes: usize, confidence: ConfidenceMode) -> Self {
    self.layout(OutputLayout::per_class(num_classes, confidence))
  }

  pub fn input_name(mut self, name: impl Into<String>) -> Self {
    self.input_name = Some(name.into());
    self
  }

  pub fn output_name(mut self, name: impl Into<String>) -> Self {
    self.output_name = Some(name.into());
    self
  }

  pub fn threads(mut self, threads: usize) -> Self {
    self.threads = Some(threads);
    self
  }

  pub fn build(self) -> Result<RawTensorModelAdapter, InferenceError> {
    if let OutputLayout::PerClass { num_classes: 0, .. } = self.layout {
      return Err(InferenceError::InvalidParameter(
        "逐类别布局的类别数不能为 0".to_string(),
      ));
    }

    let onnx = onnx::load_session(&self.model_path, self.threads)?;
    let input_name = match self.input_name {
      Some(name) => onnx.pick_input(Some(&name))?,
      None => onnx
        .pick_input(Some(DEFAULT_INPUT_NAME))
        .or_else(|_| onnx.pick_input(None))?,
    };
    let output_name = match self.output_name {
      Some(name) => onnx.pick_output(Some(&name))?,
      None => onnx
        .pick_output(Some(DEFAULT_OUTPUT_NAME))
        .or_else(|_| onnx.pick_output(None))?,
    };

    info!(
      "原始张量模型: 输入 {}, 输出 {}, 布局 {:?}",
      input_name, output_name, self.layout
    );
    Ok(RawTensorModelAdapter {
      onnx,
      input_name,
      output_name,
      layout: self.layout,
    })
  }
}

impl RawTensorModelAdapter {
  pub fn input_name(&self) -> &str {
    &self.input_name
  }

  pub fn output_name(&self) -> &str {
    &self.output_name
  }
}

impl InferenceAdapter for RawTensorModelAdapter {
  fn output_layout(&self) -> OutputLayout {
    self.layout
  }

  fn run(&mut self, input: &Tensor) -> Result<Tensor, InferenceError> {
    let array = onnx::to_ndarray(input)?;
    let tensor_ref = TensorRef::from_array_view(array.view())
      .map_err(|e| InferenceError::RunError(format!("无法创建输入张量: {}", e)))?;

    let outputs = self
      .onnx
      .session
      .run(inputs![self.input_name.as_str() => tensor_ref])
      .map_err(|e| InferenceError::RunError(e.to_string()))?;

    let output = onnx::extract_f32(&outputs[self.output_name.as_str()], &self.output_name)?;
    debug!("模型输出形状: {:?}", output.shape());
    Ok(output)
  }
}
