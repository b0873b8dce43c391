// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/simple_continueshot.rs - 连续检测
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

use anyhow::Result;
use clap::Parser;
use tracing::info;

use kanjian::{
  FromUrl,
  args::CommonArgs,
  output::OutputWrapper,
  scheduler::MonotonicClock,
  task::{ContinuousTask, DEFAULT_MAX_CAPTURE_FAILURES, Task, load_model, open_input},
};

/// Kanjian 连续检测参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub common: CommonArgs,

  /// 处理指定帧数后退出
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,

  /// 连续采集失败多少次后结束
  #[arg(long, default_value_t = DEFAULT_MAX_CAPTURE_FAILURES)]
  pub max_capture_failures: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.common.model);
  info!("输入来源: {}", args.common.input);
  info!("输出路径: {}", args.common.output);

  let input = open_input(&args.common.input)?;
  let model = load_model(&args.common.model)?;
  let output = OutputWrapper::from_url(&args.common.output)?;

  let mut session = args.common.build_session(model, MonotonicClock::new())?;
  let stop = session.stop_handle();
  ctrlc::set_handler(move || {
    info!("收到退出信号");
    stop.request_stop();
  })?;

  let summary = ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .with_max_capture_failures(args.max_capture_failures)
    .run_task(input, &mut session, output)?;

  info!(
    "共处理 {} 帧, 节流丢弃 {} 帧, 失败 {} 帧, 检测到 {} 个目标",
    summary.processed, summary.dropped, summary.failed, summary.detections
  );
  Ok(())
}
