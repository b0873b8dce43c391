// 该文件是 Kanjian （看见） 项目的一部分。
// src/config.rs - 检测参数配置
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

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_TARGET_FPS: f32 = 15.0;
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (640, 640);
/// 模型输入的最大边长
pub const MAX_INPUT_SIDE: u32 = 8192;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("置信度阈值必须位于 [0, 1] 区间内, 实际为 {0}")]
  InvalidThreshold(f32),
  #[error("目标帧率必须为正数, 实际为 {0}")]
  InvalidFps(f32),
  #[error("模型输入尺寸无效: {0}x{1}")]
  InvalidInputSize(u32, u32),
}

/// 会话级检测参数，构造后不可变。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionConfig {
  confidence_threshold: f32,
  target_fps: f32,
  input_size: (u32, u32),
}

impl DetectionConfig {
  pub fn new(
    confidence_threshold: f32,
    target_fps: f32,
    input_size: (u32, u32),
  ) -> Result<Self, ConfigError> {
    if !(0.0..=1.0).contains(&confidence_threshold) {
      return Err(ConfigError::InvalidThreshold(confidence_threshold));
    }
    if !target_fps.is_finite() || target_fps <= 0.0 {
      return Err(ConfigError::InvalidFps(target_fps));
    }
    let valid_side = |side: u32| (1..=MAX_INPUT_SIDE).contains(&side);
    if !valid_side(input_size.0) || !valid_side(input_size.1) {
      return Err(ConfigError::InvalidInputSize(input_size.0, input_size.1));
    }

    Ok(Self {
      confidence_threshold,
      target_fps,
      input_size,
    })
  }

  pub fn confidence_threshold(&self) -> f32 {
    self.confidence_threshold
  }

  pub fn target_fps(&self) -> f32 {
    self.target_fps
  }

  pub fn input_size(&self) -> (u32, u32) {
    self.input_size
  }

  /// 两次被接受的调度之间的最小间隔，即 `1000 / target_fps` 毫秒。
  pub fn frame_interval(&self) -> Duration {
    Duration::from_secs_f64(1.0 / self.target_fps as f64)
  }
}

impl Default for DetectionConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      target_fps: DEFAULT_TARGET_FPS,
      input_size: DEFAULT_INPUT_SIZE,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_out_of_range_values() {
    assert_eq!(
      DetectionConfig::new(1.5, 15.0, (640, 640)),
      Err(ConfigError::InvalidThreshold(1.5))
    );
    assert_eq!(
      DetectionConfig::new(0.5, 0.0, (640, 640)),
      Err(ConfigError::InvalidFps(0.0))
    );
    assert_eq!(
      DetectionConfig::new(0.5, 15.0, (0, 640)),
      Err(ConfigError::InvalidInputSize(0, 640))
    );
    assert_eq!(
      DetectionConfig::new(0.5, 15.0, (70_000, 70_000)),
      Err(ConfigError::InvalidInputSize(70_000, 70_000))
    );
    assert!(DetectionConfig::new(f32::NAN, 15.0, (640, 640)).is_err());
  }

  #[test]
  fn interval_follows_target_fps() {
    let config = DetectionConfig::new(0.5, 15.0, (640, 640)).unwrap();
    let interval = config.frame_interval().as_secs_f64() * 1000.0;
    assert!((interval - 66.666).abs() < 0.01);
  }
}
