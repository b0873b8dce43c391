// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 检测任务
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
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl,
  export::ExportRecord,
  input::{FrameSource, InputError, InputWrapper},
  model::{InferenceAdapter, InferenceError, ModelWrapper},
  output::{Canvas, Render},
  pipeline::TickError,
  scheduler::{Clock, SchedulerError, TickOutcome},
  session::DetectionSession,
};

/// 连续采集失败达到该次数时结束会话
pub const DEFAULT_MAX_CAPTURE_FAILURES: usize = 30;

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("输入源不可用: {0}")]
  SourceUnavailable(#[source] InputError),
  #[error("模型加载失败: {0}")]
  ModelLoadFailure(#[source] InferenceError),
  #[error("调度器错误: {0}")]
  Scheduler(#[from] SchedulerError),
  #[error("输入源连续 {0} 次采集失败")]
  SourceLost(usize),
  #[error("没有输入帧")]
  NoFrame,
  #[error("处理失败: {0}")]
  Tick(#[from] TickError),
}

pub fn open_input(url: &Url) -> Result<InputWrapper, SessionError> {
  InputWrapper::from_url(url).map_err(|e| {
    error!("无法打开输入源 {}: {}", url, e);
    SessionError::SourceUnavailable(e)
  })
}

pub fn load_model(url: &Url) -> Result<ModelWrapper, SessionError> {
  ModelWrapper::from_url(url).map_err(|e| {
    error!("无法加载模型 {}: {}", url, e);
    SessionError::ModelLoadFailure(e)
  })
}

/// 一次任务运行的统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskSummary {
  /// 读取到的帧数（含采集失败）
  pub frames: usize,
  pub processed: usize,
  /// 被节流丢弃的帧
  pub dropped: usize,
  pub failed: usize,
  pub capture_failures: usize,
  pub discarded: usize,
  pub detections: usize,
}

pub trait Task<I, A, O>: Sized {
  type Error;
  fn run_task(self, input: I, session: &mut A, output: O) -> Result<TaskSummary, Self::Error>;
}

/// 持续从输入源读取帧，直到输入耗尽、达到帧数上限或收到停止请求。
#[derive(Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  max_capture_failures: usize,
}

impl Default for ContinuousTask {
  fn default() -> Self {
    Self {
      frame_number: None,
      max_capture_failures: DEFAULT_MAX_CAPTURE_FAILURES,
    }
  }
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_max_capture_failures(mut self, max: usize) -> Self {
    self.max_capture_failures = max.max(1);
    self
  }
}

impl<I, A, C, O> Task<I, DetectionSession<A, Canvas, C>, O> for ContinuousTask
where
  I: FrameSource,
  A: InferenceAdapter,
  C: Clock,
  O: Render,
  O::Error: std::fmt::Display,
{
  type Error = SessionError;

  fn run_task(
    self,
    input: I,
    session: &mut DetectionSession<A, Canvas, C>,
    output: O,
  ) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    if let Some((w, h)) = input.frame_size() {
      info!("输入尺寸 {}x{}, 帧率 {:?}", w, h, input.fps());
    }
    session.start()?;

    let mut summary = TaskSummary::default();
    let mut consecutive_failures = 0usize;
    let mut result = Ok(());

    for frame in input {
      summary.frames += 1;
      let frame = match frame {
        Ok(frame) => {
          consecutive_failures = 0;
          frame
        }
        Err(e) => {
          summary.capture_failures += 1;
          consecutive_failures += 1;
          warn!("采集失败 ({}/{}): {}", consecutive_failures, self.max_capture_failures, e);
          if consecutive_failures >= self.max_capture_failures {
            error!("输入源连续采集失败, 结束会话");
            result = Err(SessionError::SourceLost(consecutive_failures));
            break;
          }
          continue;
        }
      };

      let now = Instant::now();
      match session.tick(&frame) {
        TickOutcome::Processed(snapshot) => {
          summary.processed += 1;
          summary.detections += snapshot.detections.len();
          let record = ExportRecord::from_snapshot(&snapshot, session.renderer().catalog());
          if let Err(e) = output.render_result(session.surface().image(), &record) {
            warn!("输出第 {} 帧失败: {}", frame.index(), e);
          }
          info!(
            "第 {} 帧完成, {} 个目标, 耗时 {:.2?}",
            frame.index(),
            snapshot.detections.len(),
            now.elapsed()
          );
        }
        TickOutcome::Throttled => {
          summary.dropped += 1;
          debug!("丢弃第 {} 帧", frame.index());
        }
        TickOutcome::Failed(_) => summary.failed += 1,
        TickOutcome::Discarded => summary.discarded += 1,
        TickOutcome::Inactive => {
          warn!("调度器已停止, 退出任务循环");
          break;
        }
      }

      if self
        .frame_number
        .is_some_and(|n| summary.processed >= n)
      {
        info!("达到指定帧数 {}, 退出任务循环", summary.processed);
        break;
      }
    }

    session.stop();
    info!("任务完成: {:?}", summary);
    result.map(|_| summary)
  }
}

/// 只处理输入源的第一帧，不做节流。
#[derive(Debug, Default)]
pub struct OneShotTask;

impl<I, A, C, O> Task<I, DetectionSession<A, Canvas, C>, O> for OneShotTask
where
  I: FrameSource,
  A: InferenceAdapter,
  C: Clock,
  O: Render,
  O::Error: std::fmt::Display,
{
  type Error = SessionError;

  fn run_task(
    self,
    mut input: I,
    session: &mut DetectionSession<A, Canvas, C>,
    output: O,
  ) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let frame = input
      .next()
      .ok_or(SessionError::NoFrame)?
      .map_err(SessionError::SourceUnavailable)?;
    session.start()?;

    let now = Instant::now();
    let outcome = session.tick(&frame);
    session.stop();

    let snapshot = match outcome {
      TickOutcome::Processed(snapshot) => snapshot,
      TickOutcome::Failed(e) => return Err(SessionError::Tick(e)),
      _ => {
        warn!("处理期间收到停止请求, 结果已丢弃");
        return Ok(TaskSummary {
          frames: 1,
          discarded: 1,
          ..TaskSummary::default()
        });
      }
    };
    info!(
      "推理完成, {} 个目标, 耗时: {:.2?}",
      snapshot.detections.len(),
      now.elapsed()
    );

    let record = ExportRecord::from_snapshot(&snapshot, session.renderer().catalog());
    if let Err(e) = output.render_result(session.surface().image(), &record) {
      warn!("输出结果失败: {}", e);
    }

    Ok(TaskSummary {
      frames: 1,
      processed: 1,
      detections: snapshot.detections.len(),
      ..TaskSummary::default()
    })
  }
}
