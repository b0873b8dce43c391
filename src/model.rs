// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 推理适配器
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

use crate::{
  FromUrl, FromUrlWithScheme,
  postprocess::{DecodeError, OutputLayout},
  tensor::{Tensor, TensorError},
};

/// 推理适配器：输入一个张量，返回模型的原始输出张量。
///
/// 模型本身是不透明的外部依赖，这里只约定输入输出。输出如何解读由
/// [`InferenceAdapter::output_layout`] 给出，按模型配置而不是自动探测。
pub trait InferenceAdapter {
  fn output_layout(&self) -> OutputLayout;
  fn run(&mut self, input: &Tensor) -> Result<Tensor, InferenceError>;
}

impl<A: InferenceAdapter + ?Sized> InferenceAdapter for Box<A> {
  fn output_layout(&self) -> OutputLayout {
    (**self).output_layout()
  }

  fn run(&mut self, input: &Tensor) -> Result<Tensor, InferenceError> {
    (**self).run(input)
  }
}

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型参数错误: {0}")]
  InvalidParameter(String),
  #[error("输出布局错误: {0}")]
  LayoutError(#[from] DecodeError),
  #[error("推理执行错误: {0}")]
  RunError(String),
  #[error("模型输出无效: {0}")]
  InvalidOutput(String),
  #[error("张量错误: {0}")]
  TensorError(#[from] TensorError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

mod onnx;
mod packaged;
mod raw_tensor;

pub use self::packaged::{BoxFormat, PackagedModelAdapter, PackagedModelBuilder, pack_flat_records};
pub use self::raw_tensor::{RawTensorModelAdapter, RawTensorModelBuilder};

/// 启动时按 URL 方案选择的推理适配器。
pub enum ModelWrapper {
  RawTensor(RawTensorModelAdapter),
  Packaged(PackagedModelAdapter),
}

impl FromUrl for ModelWrapper {
  type Error = InferenceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      RawTensorModelBuilder::SCHEME => {
        let model = RawTensorModelBuilder::from_url(url)?.build()?;
        Ok(ModelWrapper::RawTensor(model))
      }
      PackagedModelBuilder::SCHEME => {
        let model = PackagedModelBuilder::from_url(url)?.build()?;
        Ok(ModelWrapper::Packaged(model))
      }
      _ => Err(InferenceError::SchemeMismatch),
    }
  }
}

impl InferenceAdapter for ModelWrapper {
  fn output_layout(&self) -> OutputLayout {
    match self {
      ModelWrapper::RawTensor(model) => model.output_layout(),
      ModelWrapper::Packaged(model) => model.output_layout(),
    }
  }

  fn run(&mut self, input: &Tensor) -> Result<Tensor, InferenceError> {
    match self {
      ModelWrapper::RawTensor(model) => model.run(input),
      ModelWrapper::Packaged(model) => model.run(input),
    }
  }
}
