// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/simple_oneshot.rs - 单帧检测
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
  export::shopping_link,
  output::OutputWrapper,
  scheduler::MonotonicClock,
  task::{OneShotTask, Task, load_model, open_input},
};

/// Kanjian 单帧检测参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub common: CommonArgs,

  /// 打印分享文本
  #[arg(long)]
  pub share: bool,

  /// 打印每个检测类别的购物搜索链接
  #[arg(long)]
  pub shopping: bool,
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
  let summary = OneShotTask.run_task(input, &mut session, output)?;
  info!("检测到 {} 个目标", summary.detections);

  let record = session.export_record();
  for detection in &record.detections {
    info!(
      "{} {:.1}% [{:.1}, {:.1}, {:.1}, {:.1}]",
      detection.class_name,
      detection.confidence * 100.0,
      detection.bbox.x,
      detection.bbox.y,
      detection.bbox.width,
      detection.bbox.height
    );
  }

  if args.share {
    println!("{}", session.share_text());
  }
  if args.shopping {
    let mut seen = Vec::new();
    for detection in &record.detections {
      if !seen.contains(&detection.class_name) {
        println!("{}: {}", detection.class_name, shopping_link(&detection.class_name));
        seen.push(detection.class_name.clone());
      }
    }
  }
  Ok(())
}
