// 该文件是 Kanjian （看见） 项目的一部分。
// src/scheduler.rs - 帧调度器
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

//! # 帧调度器
//!
//! 状态机 `Idle -> Running -> Stopped`，按目标帧率接收 tick：
//! 距上一次被接受的 tick 不足一个帧间隔时直接丢帧，不排队。
//! 同一时刻只有一个处理过程在执行；处理过程中收到停止请求时，
//! 其结果被丢弃。

use std::{
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
    mpsc::{self, Receiver, Sender},
  },
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pipeline::TickError;

/// 调度器读取时间的来源，测试中用 [`ManualClock`] 替换。
pub trait Clock {
  /// 自某个固定起点以来经过的时间
  fn now(&self) -> Duration;
}

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
  origin: Instant,
}

impl MonotonicClock {
  pub fn new() -> Self {
    Self {
      origin: Instant::now(),
    }
  }
}

impl Default for MonotonicClock {
  fn default() -> Self {
    Self::new()
  }
}

impl Clock for MonotonicClock {
  fn now(&self) -> Duration {
    self.origin.elapsed()
  }
}

/// 手动推进的时钟，克隆体共享同一时间。
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
  nanos: Arc<AtomicU64>,
}

impl ManualClock {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn advance(&self, by: Duration) {
    self
      .nanos
      .fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
  }

  pub fn set(&self, at: Duration) {
    self.nanos.store(at.as_nanos() as u64, Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now(&self) -> Duration {
    Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
  Idle,
  Running,
  Stopped,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
  #[error("调度器已停止，不能重新启动")]
  Stopped,
}

/// 单次 tick 的结果。
#[derive(Debug)]
pub enum TickOutcome<T> {
  /// 调度器未运行，什么也没做
  Inactive,
  /// 距上次处理不足一个帧间隔，丢帧
  Throttled,
  Processed(T),
  /// 处理失败，调度器继续运行
  Failed(TickError),
  /// 处理期间收到停止请求，结果作废
  Discarded,
}

impl<T> TickOutcome<T> {
  pub fn is_processed(&self) -> bool {
    matches!(self, TickOutcome::Processed(_))
  }
}

/// 可跨线程发送的停止请求句柄。
#[derive(Debug, Clone)]
pub struct StopHandle {
  tx: Sender<()>,
}

impl StopHandle {
  pub fn request_stop(&self) {
    // 调度器已销毁时无需处理
    let _ = self.tx.send(());
  }
}

pub struct FrameScheduler<C: Clock = MonotonicClock> {
  clock: C,
  interval: Duration,
  state: SchedulerState,
  last_accepted: Option<Duration>,
  pending: bool,
  stop_tx: Sender<()>,
  stop_rx: Receiver<()>,
}

impl FrameScheduler<MonotonicClock> {
  pub fn new(interval: Duration) -> Self {
    Self::with_clock(interval, MonotonicClock::new())
  }
}

impl<C: Clock> FrameScheduler<C> {
  pub fn with_clock(interval: Duration, clock: C) -> Self {
    let (stop_tx, stop_rx) = mpsc::channel();
    Self {
      clock,
      interval,
      state: SchedulerState::Idle,
      last_accepted: None,
      pending: false,
      stop_tx,
      stop_rx,
    }
  }

  pub fn state(&self) -> SchedulerState {
    self.state
  }

  pub fn interval(&self) -> Duration {
    self.interval
  }

  pub fn clock(&self) -> &C {
    &self.clock
  }

  /// 是否还有已登记、尚未执行的 tick 回调
  pub fn has_pending_tick(&self) -> bool {
    self.pending
  }

  pub fn stop_handle(&self) -> StopHandle {
    StopHandle {
      tx: self.stop_tx.clone(),
    }
  }

  pub fn start(&mut self) -> Result<(), SchedulerError> {
    self.poll_stop_requests();
    match self.state {
      SchedulerState::Running => Ok(()),
      SchedulerState::Stopped => Err(SchedulerError::Stopped),
      SchedulerState::Idle => {
        info!("调度器启动, 帧间隔 {:.2?}", self.interval);
        self.state = SchedulerState::Running;
        self.register_tick();
        Ok(())
      }
    }
  }

  pub fn stop(&mut self) {
    if self.state != SchedulerState::Stopped {
      info!("调度器停止");
    }
    self.state = SchedulerState::Stopped;
    self.pending = false;
  }

  /// 按节流规则执行一次处理过程。
  pub fn tick<T, F>(&mut self, pass: F) -> TickOutcome<T>
  where
    F: FnOnce() -> Result<T, TickError>,
  {
    self.poll_stop_requests();
    if self.state != SchedulerState::Running || !std::mem::take(&mut self.pending) {
      return TickOutcome::Inactive;
    }

    let now = self.clock.now();
    let interval = self.interval;
    if self
      .last_accepted
      .is_some_and(|last| now.saturating_sub(last) < interval)
    {
      self.register_tick();
      return TickOutcome::Throttled;
    }
    self.last_accepted = Some(now);

    let result = pass();

    self.poll_stop_requests();
    if self.state != SchedulerState::Running {
      debug!("处理期间调度器已停止, 丢弃结果");
      return TickOutcome::Discarded;
    }
    self.register_tick();

    match result {
      Ok(value) => TickOutcome::Processed(value),
      Err(e) => {
        warn!("本帧处理失败: {}", e);
        TickOutcome::Failed(e)
      }
    }
  }

  fn register_tick(&mut self) {
    self.pending = true;
  }

  fn poll_stop_requests(&mut self) {
    if self.stop_rx.try_recv().is_ok() {
      warn!("收到停止请求");
      self.stop();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scheduler() -> (FrameScheduler<ManualClock>, ManualClock) {
    let clock = ManualClock::new();
    let scheduler = FrameScheduler::with_clock(Duration::from_millis(50), clock.clone());
    (scheduler, clock)
  }

  #[test]
  fn idle_scheduler_does_nothing() {
    let (mut scheduler, _) = scheduler();
    let outcome = scheduler.tick(|| -> Result<(), TickError> { panic!("不应执行") });
    assert!(matches!(outcome, TickOutcome::Inactive));
    assert_eq!(scheduler.state(), SchedulerState::Idle);
  }

  #[test]
  fn start_is_idempotent_and_stop_is_final() {
    let (mut scheduler, _) = scheduler();
    scheduler.start().unwrap();
    scheduler.start().unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Running);
    assert!(scheduler.has_pending_tick());

    scheduler.stop();
    scheduler.stop();
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert!(!scheduler.has_pending_tick());
    assert_eq!(scheduler.start(), Err(SchedulerError::Stopped));
  }

  #[test]
  fn ticks_inside_interval_are_throttled() {
    let (mut scheduler, clock) = scheduler();
    scheduler.start().unwrap();

    assert!(scheduler.tick(|| Ok(())).is_processed());
    clock.advance(Duration::from_millis(20));
    assert!(matches!(scheduler.tick(|| Ok(())), TickOutcome::Throttled));
    clock.advance(Duration::from_millis(30));
    assert!(scheduler.tick(|| Ok(())).is_processed());
  }

  #[test]
  fn every_tick_registers_the_next_one() {
    let (mut scheduler, clock) = scheduler();
    assert!(!scheduler.has_pending_tick());
    scheduler.start().unwrap();

    assert!(scheduler.tick(|| Ok(())).is_processed());
    assert!(scheduler.has_pending_tick());
    assert!(matches!(scheduler.tick(|| Ok(())), TickOutcome::Throttled));
    assert!(scheduler.has_pending_tick());
    clock.advance(Duration::from_millis(50));
    let failed = scheduler.tick(|| -> Result<(), TickError> {
      Err(TickError::Decode(crate::postprocess::DecodeError::NoClasses))
    });
    assert!(matches!(failed, TickOutcome::Failed(_)));
    assert!(scheduler.has_pending_tick());
    assert_eq!(scheduler.state(), SchedulerState::Running);
  }

  #[test]
  fn stop_handle_discards_in_flight_result() {
    let (mut scheduler, _) = scheduler();
    let handle = scheduler.stop_handle();
    scheduler.start().unwrap();

    let outcome = scheduler.tick(|| {
      handle.request_stop();
      Ok(42)
    });
    assert!(matches!(outcome, TickOutcome::Discarded));
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert!(matches!(scheduler.tick(|| Ok(1)), TickOutcome::Inactive));
  }
}
