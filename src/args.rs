// 该文件是 Kanjian （看见） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Args;
use tracing::info;
use url::Url;

use crate::{
  catalog::ProductCatalog,
  config::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_TARGET_FPS, DetectionConfig},
  labels::ClassLabelTable,
  model::InferenceAdapter,
  output::Canvas,
  pipeline::Pipeline,
  render::{DisplayOptions, Renderer},
  scheduler::{Clock, FrameScheduler},
  session::{DetectionSession, FacingMode, SessionContext},
};

/// 各个可执行程序共用的参数
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
  /// 模型地址，例如 onnx:///model.onnx?layout=flat 或 packaged:///ssd.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 image:///a.png、folder:///frames、v4l:///dev/video0
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，例如 image:///out.png?record、folder:///records?always、none://
  #[arg(long, value_name = "OUTPUT", default_value = "none://")]
  pub output: Url,
  /// 类别表：coco、products 或标签文件路径
  #[arg(long, value_name = "LABELS", default_value = "coco")]
  pub labels: String,
  /// 商品信息 JSON 文件
  #[arg(long, value_name = "FILE")]
  pub catalog: Option<PathBuf>,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,
  /// 目标帧率
  #[arg(long, default_value_t = DEFAULT_TARGET_FPS, value_name = "FPS")]
  pub fps: f32,
  /// 模型输入宽度
  #[arg(long, default_value_t = 640, value_name = "PIXELS")]
  pub input_width: u32,
  /// 模型输入高度
  #[arg(long, default_value_t = 640, value_name = "PIXELS")]
  pub input_height: u32,
  /// 标签字体文件（TTF/OTF），不指定时使用内置字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
  #[arg(long)]
  pub show_brand: bool,
  #[arg(long)]
  pub show_price: bool,
  #[arg(long)]
  pub show_description: bool,
  /// 摄像头朝向：user 或 environment
  #[arg(long, default_value_t = FacingMode::Environment)]
  pub facing: FacingMode,
}

impl CommonArgs {
  pub fn detection_config(&self) -> Result<DetectionConfig> {
    Ok(DetectionConfig::new(
      self.confidence,
      self.fps,
      (self.input_width, self.input_height),
    )?)
  }

  pub fn display_options(&self) -> DisplayOptions {
    DisplayOptions {
      show_brand: self.show_brand,
      show_price: self.show_price,
      show_description: self.show_description,
    }
  }

  pub fn label_table(&self) -> Result<ClassLabelTable> {
    let labels = ClassLabelTable::resolve(&self.labels)?;
    info!("类别表 {} 共 {} 个类别", self.labels, labels.len());
    Ok(labels)
  }

  pub fn product_catalog(&self) -> Result<ProductCatalog> {
    match &self.catalog {
      Some(path) => Ok(ProductCatalog::from_path(path)?),
      None => Ok(ProductCatalog::default()),
    }
  }

  pub fn canvas(&self) -> Result<Canvas> {
    let canvas = Canvas::new();
    match &self.font {
      Some(path) => Ok(canvas.with_font(Canvas::load_font(path)?)),
      None => Ok(canvas),
    }
  }

  /// 组装检测会话，模型与时钟由调用方提供
  pub fn build_session<A: InferenceAdapter, C: Clock>(
    &self,
    adapter: A,
    clock: C,
  ) -> Result<DetectionSession<A, Canvas, C>> {
    let config = self.detection_config()?;
    let pipeline = Pipeline::new(adapter, self.label_table()?, config);
    let renderer = Renderer::new(self.product_catalog()?);
    let scheduler = FrameScheduler::with_clock(config.frame_interval(), clock);
    let context = Arc::new(SessionContext::new(self.display_options(), self.facing));

    Ok(DetectionSession::new(pipeline, renderer, self.canvas()?, scheduler).with_context(context))
  }
}
