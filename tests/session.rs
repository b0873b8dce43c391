// 该文件是 Kanjian （看见） 项目的一部分。
// tests/session.rs - 检测会话集成测试
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

use std::{collections::VecDeque, time::Duration};

use image::{Rgb, RgbImage};

use kanjian::{
  catalog::ProductCatalog,
  config::DetectionConfig,
  detection::BoundingBox,
  frame::RgbFrame,
  input::{FrameSource, InputError},
  labels::ClassLabelTable,
  model::{InferenceAdapter, InferenceError},
  output::{Canvas, NoneOutput},
  pipeline::{Pipeline, TickError},
  postprocess::{ConfidenceMode, OutputLayout},
  render::Renderer,
  scheduler::{Clock, FrameScheduler, ManualClock, SchedulerState, TickOutcome},
  session::{DetectionSession, FacingMode},
  task::{ContinuousTask, OneShotTask, SessionError, Task},
  tensor::Tensor,
};

const NUM_CLASSES: usize = 5;

/// 每次返回同一条逐类别记录；`fail_on` 中的调用序号返回错误，
/// `truncate_on` 中的调用序号返回少一个元素的输出。
struct FixedAdapter {
  confidence: ConfidenceMode,
  calls: usize,
  fail_on: Vec<usize>,
  truncate_on: Vec<usize>,
}

impl FixedAdapter {
  fn new(confidence: ConfidenceMode) -> Self {
    Self {
      confidence,
      calls: 0,
      fail_on: Vec::new(),
      truncate_on: Vec::new(),
    }
  }

  fn truncating_on(mut self, calls: &[usize]) -> Self {
    self.truncate_on = calls.to_vec();
    self
  }

  fn failing_on(mut self, calls: &[usize]) -> Self {
    self.fail_on = calls.to_vec();
    self
  }
}

impl InferenceAdapter for FixedAdapter {
  fn output_layout(&self) -> OutputLayout {
    OutputLayout::per_class(NUM_CLASSES, self.confidence)
  }

  fn run(&mut self, _input: &Tensor) -> Result<Tensor, InferenceError> {
    self.calls += 1;
    if self.fail_on.contains(&self.calls) {
      return Err(InferenceError::RunError("模拟推理失败".to_string()));
    }
    let mut record = vec![10.0, 10.0, 20.0, 20.0, 0.9];
    let mut scores = vec![0.01; NUM_CLASSES];
    scores[3] = 0.95;
    record.extend(scores);
    if self.truncate_on.contains(&self.calls) {
      record.pop();
    }
    Ok(Tensor::from_flat(record))
  }
}

fn labels() -> ClassLabelTable {
  ClassLabelTable::new(["person", "bottle", "chair", "cup", "laptop"])
}

fn session(
  adapter: FixedAdapter,
  clock: ManualClock,
) -> DetectionSession<FixedAdapter, Canvas, ManualClock> {
  let config = DetectionConfig::new(0.5, 15.0, (640, 640)).unwrap();
  let pipeline = Pipeline::new(adapter, labels(), config);
  let scheduler = FrameScheduler::with_clock(config.frame_interval(), clock);
  DetectionSession::new(
    pipeline,
    Renderer::new(ProductCatalog::default()),
    Canvas::new(),
    scheduler,
  )
}

/// 预设好的帧序列，每读取一帧时钟前进 `step`。
struct ScriptedSource {
  frames: VecDeque<Result<RgbFrame, InputError>>,
  clock: ManualClock,
  step: Duration,
}

impl ScriptedSource {
  fn new(script: &[bool], clock: ManualClock, step: Duration) -> Self {
    let frames = script
      .iter()
      .enumerate()
      .map(|(i, ok)| {
        if *ok {
          Ok(RgbFrame::with_shape(64, 48).with_index(i as u64, 0))
        } else {
          Err(InputError::SchemeMismatch("摄像头断开".to_string()))
        }
      })
      .collect();
    Self {
      frames,
      clock,
      step,
    }
  }
}

impl Iterator for ScriptedSource {
  type Item = Result<RgbFrame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let frame = self.frames.pop_front()?;
    self.clock.advance(self.step);
    Some(frame)
  }
}

impl FrameSource for ScriptedSource {
  fn frame_size(&self) -> Option<(u32, u32)> {
    Some((64, 48))
  }
}

fn assert_close(a: f32, b: f32) {
  assert!((a - b).abs() < 1e-4, "{} != {}", a, b);
}

#[test]
fn detections_are_scaled_to_the_frame() {
  let config = DetectionConfig::new(0.5, 15.0, (640, 640)).unwrap();
  let mut pipeline = Pipeline::new(FixedAdapter::new(ConfidenceMode::Objectness), labels(), config);

  let wide = pipeline.detect(&RgbFrame::with_shape(1280, 480)).unwrap();
  assert_eq!(wide.len(), 1);
  assert_eq!(wide[0].class_id, 3);
  assert_eq!(wide[0].class_name, "cup");
  assert_close(wide[0].confidence, 0.9);
  assert_eq!(wide[0].bbox, BoundingBox::new(20.0, 7.5, 40.0, 15.0));

  let tall = pipeline.detect(&RgbFrame::with_shape(1280, 720)).unwrap();
  assert_eq!(tall[0].bbox, BoundingBox::new(20.0, 11.25, 40.0, 22.5));
}

#[test]
fn combined_confidence_multiplies_class_score() {
  let config = DetectionConfig::new(0.5, 15.0, (640, 640)).unwrap();
  let mut pipeline = Pipeline::new(
    FixedAdapter::new(ConfidenceMode::ObjectnessTimesClass),
    labels(),
    config,
  );
  let out = pipeline.detect(&RgbFrame::with_shape(640, 640)).unwrap();
  assert_close(out[0].confidence, 0.855);

  let strict = DetectionConfig::new(0.9, 15.0, (640, 640)).unwrap();
  let mut pipeline = Pipeline::new(
    FixedAdapter::new(ConfidenceMode::ObjectnessTimesClass),
    labels(),
    strict,
  );
  assert!(pipeline.detect(&RgbFrame::with_shape(640, 640)).unwrap().is_empty());
}

#[test]
fn empty_frame_fails_before_inference() {
  let config = DetectionConfig::default();
  let mut pipeline = Pipeline::new(FixedAdapter::new(ConfidenceMode::Objectness), labels(), config);
  let result = pipeline.detect(&RgbFrame::with_shape(0, 0));
  assert!(matches!(result, Err(TickError::Preprocess(_))));
  assert_eq!(pipeline.adapter().calls, 0);
}

#[test]
fn scheduler_holds_target_rate() {
  let clock = ManualClock::new();
  let mut scheduler = FrameScheduler::with_clock(
    DetectionConfig::default().frame_interval(),
    clock.clone(),
  );
  scheduler.start().unwrap();

  let mut accepted = Vec::new();
  for _ in 0..100 {
    let now = clock.now();
    if scheduler.tick(|| Ok(())).is_processed() {
      accepted.push(now);
    }
    clock.advance(Duration::from_millis(10));
  }

  assert_eq!(accepted.len(), 15);
  for pair in accepted.windows(2) {
    assert!(pair[1] - pair[0] >= scheduler.interval());
  }
}

#[test]
fn continuous_task_survives_failures() {
  let clock = ManualClock::new();
  let adapter = FixedAdapter::new(ConfidenceMode::Objectness).failing_on(&[2]);
  let mut session = session(adapter, clock.clone());
  let source = ScriptedSource::new(
    &[true, true, false, true, true],
    clock,
    Duration::from_millis(100),
  );

  let summary = ContinuousTask::default()
    .run_task(source, &mut session, NoneOutput)
    .unwrap();

  assert_eq!(summary.frames, 5);
  assert_eq!(summary.capture_failures, 1);
  assert_eq!(summary.failed, 1);
  assert_eq!(summary.processed, 3);
  assert_eq!(summary.detections, 3);

  let record = session.export_record();
  assert_eq!(record.frame_index, 4);
  assert_eq!(record.detections[0].class_name, "cup");
  assert_eq!(session.share_text(), "Today's Fit: cup");
  assert_eq!(session.surface().image().dimensions(), (64, 48));
}

#[test]
fn continuous_task_throttles_fast_sources() {
  let clock = ManualClock::new();
  let mut session = session(FixedAdapter::new(ConfidenceMode::Objectness), clock.clone());
  let source = ScriptedSource::new(&[true; 10], clock, Duration::from_millis(40));

  let summary = ContinuousTask::default()
    .run_task(source, &mut session, NoneOutput)
    .unwrap();

  assert_eq!(summary.processed + summary.dropped, 10);
  assert!(summary.dropped > 0);
  assert!(summary.processed < 10);
}

#[test]
fn consecutive_capture_failures_end_the_session() {
  let clock = ManualClock::new();
  let mut session = session(FixedAdapter::new(ConfidenceMode::Objectness), clock.clone());
  let source = ScriptedSource::new(
    &[true, false, false, false, true],
    clock,
    Duration::from_millis(100),
  );

  let result = ContinuousTask::default()
    .with_max_capture_failures(3)
    .run_task(source, &mut session, NoneOutput);
  assert!(matches!(result, Err(SessionError::SourceLost(3))));
}

#[test]
fn one_shot_reports_inference_failure() {
  let clock = ManualClock::new();
  let adapter = FixedAdapter::new(ConfidenceMode::Objectness).failing_on(&[1]);
  let mut session = session(adapter, clock.clone());
  let source = ScriptedSource::new(&[true], clock, Duration::ZERO);

  let result = OneShotTask.run_task(source, &mut session, NoneOutput);
  assert!(matches!(
    result,
    Err(SessionError::Tick(TickError::Inference(_)))
  ));
}

#[test]
fn stopped_session_ignores_frames() {
  let clock = ManualClock::new();
  let mut session = session(FixedAdapter::new(ConfidenceMode::Objectness), clock);
  session.start().unwrap();
  session.stop_handle().request_stop();

  let outcome = session.tick(&RgbFrame::with_shape(8, 8));
  assert!(matches!(outcome, TickOutcome::Inactive));
  assert!(session.context().latest().detections.is_empty());
}

#[test]
fn malformed_output_fails_only_that_tick() {
  let clock = ManualClock::new();
  let adapter = FixedAdapter::new(ConfidenceMode::Objectness).truncating_on(&[1]);
  let mut session = session(adapter, clock.clone());
  session.start().unwrap();
  let frame = RgbFrame::with_shape(64, 48);

  let outcome = session.tick(&frame);
  assert!(matches!(
    outcome,
    TickOutcome::Failed(TickError::Decode(_))
  ));
  assert_eq!(session.state(), SchedulerState::Running);
  assert!(session.context().latest().detections.is_empty());

  clock.advance(Duration::from_millis(100));
  let outcome = session.tick(&frame);
  assert!(outcome.is_processed());
  assert_eq!(session.context().latest().detections.len(), 1);
}

#[test]
fn user_facing_frames_are_mirrored() {
  let clock = ManualClock::new();
  let mut session = session(FixedAdapter::new(ConfidenceMode::Objectness), clock);
  session.context().set_facing_mode(FacingMode::User);
  session.start().unwrap();

  let mut image = RgbImage::new(64, 48);
  image.put_pixel(0, 47, Rgb([255, 0, 0]));
  assert!(session.tick(&RgbFrame::from(image)).is_processed());

  let canvas = session.surface().image();
  assert_eq!(*canvas.get_pixel(63, 47), Rgb([255, 0, 0]));
  assert_eq!(*canvas.get_pixel(0, 47), Rgb([0, 0, 0]));
}
