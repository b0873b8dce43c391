// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 会话辅助
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

use ndarray::{ArrayD, IxDyn};
use ort::{session::Session, value::DynValue};
use tracing::{debug, info};

use crate::{model::InferenceError, tensor::Tensor};

/// 已加载的 ONNX 会话及其输入输出名称。
pub(crate) struct OnnxSession {
  pub(crate) session: Session,
  pub(crate) input_names: Vec<String>,
  pub(crate) output_names: Vec<String>,
}

pub(crate) fn load_session(path: &Path, threads: Option<usize>) -> Result<OnnxSession, InferenceError> {
  info!("加载模型文件: {}", path.display());
  if !path.is_file() {
    return Err(InferenceError::ModelPathError(format!(
      "模型文件不存在: {}",
      path.display()
    )));
  }

  let mut builder = Session::builder()
    .map_err(|e| InferenceError::ModelLoadError(format!("无法创建会话构建器: {}", e)))?;
  if let Some(threads) = threads {
    builder = builder
      .with_intra_threads(threads)
      .map_err(|e| InferenceError::ModelLoadError(format!("无法设置线程数: {}", e)))?;
  }

  let session = builder
    .commit_from_file(path)
    .map_err(|e| InferenceError::ModelLoadError(format!("无法加载模型 {}: {}", path.display(), e)))?;

  let input_names: Vec<String> = session
    .inputs()
    .iter()
    .map(|input| input.name().to_string())
    .collect();
  let output_names: Vec<String> = session
    .outputs()
    .iter()
    .map(|output| output.name().to_string())
    .collect();

  debug!("模型输入: {:?}", input_names);
  debug!("模型输出: {:?}", output_names);
  info!("模型加载完成");

  Ok(OnnxSession {
    session,
    input_names,
    output_names,
  })
}

impl OnnxSession {
  /// 输入名称必须存在；未指定时取模型的第一个输入。
  pub(crate) fn pick_input(&self, wanted: Option<&str>) -> Result<String, InferenceError> {
    pick_name(&self.input_names, wanted, "输入")
  }

  pub(crate) fn pick_output(&self, wanted: Option<&str>) -> Result<String, InferenceError> {
    pick_name(&self.output_names, wanted, "输出")
  }

  pub(crate) fn require_output(&self, name: &str) -> Result<(), InferenceError> {
    pick_name(&self.output_names, Some(name), "输出").map(|_| ())
  }
}

fn pick_name(names: &[String], wanted: Option<&str>, what: &str) -> Result<String, InferenceError> {
  match wanted {
    Some(name) if names.iter().any(|n| n == name) => Ok(name.to_string()),
    Some(name) => Err(InferenceError::InvalidParameter(format!(
      "模型没有名为 {} 的{}, 可用名称: {:?}",
      name, what, names
    ))),
    None => names
      .first()
      .cloned()
      .ok_or_else(|| InferenceError::InvalidParameter(format!("模型没有任何{}", what))),
  }
}

pub(crate) fn to_ndarray(tensor: &Tensor) -> Result<ArrayD<f32>, InferenceError> {
  ArrayD::from_shape_vec(IxDyn(tensor.shape()), tensor.data().to_vec())
    .map_err(|e| InferenceError::RunError(format!("无法构造输入数组: {}", e)))
}

pub(crate) fn extract_f32(value: &DynValue, name: &str) -> Result<Tensor, InferenceError> {
  let array = value
    .try_extract_array::<f32>()
    .map_err(|e| InferenceError::InvalidOutput(format!("输出 {} 不是 f32 张量: {}", name, e)))?;
  Ok(Tensor::new(
    array.shape().to_vec(),
    array.iter().copied().collect::<Vec<f32>>(),
  )?)
}

/// 类别编号可能以 f32 或 i64 输出，统一转换为 f32。
pub(crate) fn extract_numeric(value: &DynValue, name: &str) -> Result<Tensor, InferenceError> {
  if let Ok(array) = value.try_extract_array::<i64>() {
    return Ok(Tensor::new(
      array.shape().to_vec(),
      array.iter().map(|&v| v as f32).collect::<Vec<f32>>(),
    )?);
  }
  extract_f32(value, name)
}
