// 该文件是 Kanjian （看见） 项目的一部分。
// src/session.rs - 检测会话
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

use std::{
  borrow::Cow,
  fmt,
  str::FromStr,
  sync::{Arc, RwLock},
};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
  detection::Detection,
  export::{ExportRecord, share_text},
  frame::RgbFrame,
  model::InferenceAdapter,
  pipeline::Pipeline,
  render::{DisplayOptions, Renderer, Surface},
  scheduler::{
    Clock, FrameScheduler, MonotonicClock, SchedulerError, SchedulerState, StopHandle, TickOutcome,
  },
};

/// 摄像头朝向。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
  /// 前置
  User,
  /// 后置
  #[default]
  Environment,
}

impl FacingMode {
  pub fn toggled(self) -> Self {
    match self {
      FacingMode::User => FacingMode::Environment,
      FacingMode::Environment => FacingMode::User,
    }
  }
}

impl FromStr for FacingMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "user" | "front" => Ok(FacingMode::User),
      "environment" | "back" => Ok(FacingMode::Environment),
      other => Err(format!("未知的摄像头朝向: {}", other)),
    }
  }
}

impl fmt::Display for FacingMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FacingMode::User => write!(f, "user"),
      FacingMode::Environment => write!(f, "environment"),
    }
  }
}

/// 某一帧的完整检测结果，整体替换，不做局部修改。
#[derive(Debug, Clone, Default)]
pub struct DetectionSnapshot {
  pub frame_index: u64,
  pub captured_at: DateTime<Utc>,
  pub detections: Arc<[Detection]>,
}

impl DetectionSnapshot {
  pub fn new(frame_index: u64, detections: Vec<Detection>) -> Self {
    Self {
      frame_index,
      captured_at: Utc::now(),
      detections: detections.into(),
    }
  }
}

/// 会话内共享的可变状态：最近一次检测结果、显示开关、摄像头朝向。
///
/// 读者拿到的总是某一帧完整的快照，可以在其它线程中读取。
#[derive(Debug, Default)]
pub struct SessionContext {
  latest: RwLock<Arc<DetectionSnapshot>>,
  display: RwLock<DisplayOptions>,
  facing: RwLock<FacingMode>,
}

impl SessionContext {
  pub fn new(display: DisplayOptions, facing: FacingMode) -> Self {
    Self {
      latest: RwLock::new(Arc::new(DetectionSnapshot::default())),
      display: RwLock::new(display),
      facing: RwLock::new(facing),
    }
  }

  pub fn latest(&self) -> Arc<DetectionSnapshot> {
    let guard = self.latest.read().unwrap_or_else(|e| e.into_inner());
    Arc::clone(&*guard)
  }

  pub fn commit(&self, snapshot: DetectionSnapshot) -> Arc<DetectionSnapshot> {
    let snapshot = Arc::new(snapshot);
    let mut guard = self.latest.write().unwrap_or_else(|e| e.into_inner());
    *guard = Arc::clone(&snapshot);
    snapshot
  }

  pub fn display_options(&self) -> DisplayOptions {
    *self.display.read().unwrap_or_else(|e| e.into_inner())
  }

  pub fn set_display_options(&self, options: DisplayOptions) {
    *self.display.write().unwrap_or_else(|e| e.into_inner()) = options;
  }

  pub fn facing_mode(&self) -> FacingMode {
    *self.facing.read().unwrap_or_else(|e| e.into_inner())
  }

  pub fn set_facing_mode(&self, facing: FacingMode) {
    *self.facing.write().unwrap_or_else(|e| e.into_inner()) = facing;
  }

  /// 切换摄像头朝向，返回新的朝向
  pub fn toggle_facing_mode(&self) -> FacingMode {
    let mut guard = self.facing.write().unwrap_or_else(|e| e.into_inner());
    *guard = guard.toggled();
    *guard
  }
}

/// 检测会话：调度器、流水线、绘制与共享状态的组合。
pub struct DetectionSession<A, S, C: Clock = MonotonicClock> {
  scheduler: FrameScheduler<C>,
  pipeline: Pipeline<A>,
  renderer: Renderer,
  surface: S,
  context: Arc<SessionContext>,
}

impl<A: InferenceAdapter, S: Surface, C: Clock> DetectionSession<A, S, C> {
  pub fn new(
    pipeline: Pipeline<A>,
    renderer: Renderer,
    surface: S,
    scheduler: FrameScheduler<C>,
  ) -> Self {
    Self {
      scheduler,
      pipeline,
      renderer,
      surface,
      context: Arc::new(SessionContext::default()),
    }
  }

  pub fn with_context(mut self, context: Arc<SessionContext>) -> Self {
    self.context = context;
    self
  }

  pub fn context(&self) -> Arc<SessionContext> {
    Arc::clone(&self.context)
  }

  pub fn surface(&self) -> &S {
    &self.surface
  }

  pub fn renderer(&self) -> &Renderer {
    &self.renderer
  }

  pub fn state(&self) -> SchedulerState {
    self.scheduler.state()
  }

  pub fn stop_handle(&self) -> StopHandle {
    self.scheduler.stop_handle()
  }

  pub fn start(&mut self) -> Result<(), SchedulerError> {
    self.scheduler.start()
  }

  pub fn stop(&mut self) {
    self.scheduler.stop()
  }

  /// 对一帧执行一次调度；被接受且成功时绘制并提交新的快照。
  ///
  /// 前置摄像头（`FacingMode::User`）的帧先做水平镜像再检测与绘制。
  pub fn tick(&mut self, frame: &RgbFrame) -> TickOutcome<Arc<DetectionSnapshot>> {
    let frame = match self.context.facing_mode() {
      FacingMode::User => Cow::Owned(frame.mirrored()),
      FacingMode::Environment => Cow::Borrowed(frame),
    };
    let frame = &*frame;
    let pipeline = &mut self.pipeline;
    match self.scheduler.tick(|| pipeline.detect(frame)) {
      TickOutcome::Processed(detections) => {
        let options = self.context.display_options();
        self
          .renderer
          .render(&mut self.surface, frame, &detections, &options);
        let snapshot = self
          .context
          .commit(DetectionSnapshot::new(frame.index(), detections));
        debug!(
          "提交第 {} 帧快照, {} 个目标",
          snapshot.frame_index,
          snapshot.detections.len()
        );
        TickOutcome::Processed(snapshot)
      }
      TickOutcome::Inactive => TickOutcome::Inactive,
      TickOutcome::Throttled => TickOutcome::Throttled,
      TickOutcome::Failed(e) => TickOutcome::Failed(e),
      TickOutcome::Discarded => {
        info!("丢弃第 {} 帧的检测结果", frame.index());
        TickOutcome::Discarded
      }
    }
  }

  pub fn export_record(&self) -> ExportRecord {
    ExportRecord::from_snapshot(&self.context.latest(), self.renderer.catalog())
  }

  pub fn share_text(&self) -> String {
    share_text(&self.context.latest().detections)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detection::BoundingBox;
  use std::thread;

  fn detection(name: &str) -> Detection {
    Detection {
      bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
      class_id: 0,
      class_name: name.to_string(),
      confidence: 0.9,
    }
  }

  #[test]
  fn readers_see_whole_snapshots() {
    let context = Arc::new(SessionContext::default());
    assert!(context.latest().detections.is_empty());

    let writer = {
      let context = Arc::clone(&context);
      thread::spawn(move || {
        for i in 1..=50u64 {
          let detections = (0..i).map(|_| detection("cup")).collect();
          context.commit(DetectionSnapshot::new(i, detections));
        }
      })
    };
    for _ in 0..50 {
      let snapshot = context.latest();
      assert_eq!(snapshot.detections.len() as u64, snapshot.frame_index);
    }
    writer.join().unwrap();
    assert_eq!(context.latest().frame_index, 50);
  }

  #[test]
  fn facing_mode_toggles() {
    let context = SessionContext::new(DisplayOptions::default(), FacingMode::User);
    assert_eq!(context.toggle_facing_mode(), FacingMode::Environment);
    assert_eq!(context.facing_mode(), FacingMode::Environment);
    assert_eq!("front".parse::<FacingMode>(), Ok(FacingMode::User));
    assert!("sideways".parse::<FacingMode>().is_err());
  }
}
