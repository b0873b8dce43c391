// 该文件是 Kanjian （看见） 项目的一部分。
// src/detection.rs - 检测结果定义
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

use serde::Serialize;

/// 轴对齐边界框，左上角坐标加宽高，单位为像素。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BoundingBox {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl BoundingBox {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// 由两个对角点构造，角点顺序不限。
  pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    let (left, right) = (x1.min(x2), x1.max(x2));
    let (top, bottom) = (y1.min(y2), y1.max(y2));
    Self::new(left, top, right - left, bottom - top)
  }

  pub fn right(&self) -> f32 {
    self.x + self.width
  }

  pub fn bottom(&self) -> f32 {
    self.y + self.height
  }

  /// 按坐标轴分别缩放，不保持宽高比。
  pub fn scale(self, sx: f32, sy: f32) -> Self {
    Self::new(self.x * sx, self.y * sy, self.width * sx, self.height * sy)
  }

  /// 裁剪到 `[0, width] x [0, height]` 范围内。
  pub fn clamp_to(self, width: f32, height: f32) -> Self {
    let left = self.x.clamp(0.0, width);
    let top = self.y.clamp(0.0, height);
    let right = self.right().clamp(0.0, width);
    let bottom = self.bottom().clamp(0.0, height);
    Self::new(left, top, (right - left).max(0.0), (bottom - top).max(0.0))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  pub bbox: BoundingBox,
  pub class_id: i64,
  pub class_name: String,
  pub confidence: f32,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn corners_are_normalised() {
    let bbox = BoundingBox::from_corners(30.0, 40.0, 10.0, 5.0);
    assert_eq!(bbox, BoundingBox::new(10.0, 5.0, 20.0, 35.0));
  }

  #[test]
  fn clamp_keeps_box_inside_surface() {
    let bbox = BoundingBox::new(-10.0, 90.0, 50.0, 40.0).clamp_to(100.0, 100.0);
    assert_eq!(bbox, BoundingBox::new(0.0, 90.0, 40.0, 10.0));

    let outside = BoundingBox::new(120.0, 10.0, 5.0, 5.0).clamp_to(100.0, 100.0);
    assert_eq!(outside.width, 0.0);
  }
}
