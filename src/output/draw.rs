// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/draw.rs - 基于 RgbImage 的绘制表面
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::{error, info};

use crate::{
  detection::BoundingBox,
  frame::RgbFrame,
  render::{Color, Surface},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_CHAR_WIDTH: f32 = 8.0; // 没有字体时每字符平均宽度（粗略估计）

static EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/font.ttf");

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("字体文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(String),
}

/// 内置的 DejaVu Sans 字体
pub fn embedded_font() -> Result<FontArc, DrawError> {
  FontArc::try_from_slice(EMBEDDED_FONT).map_err(|e| DrawError::InvalidFont(e.to_string()))
}

/// 叠加层画布，默认使用内置字体绘制标签。
#[derive(Clone)]
pub struct Canvas {
  image: RgbImage,
  font: Option<FontArc>,
  font_size: f32,
}

impl Default for Canvas {
  fn default() -> Self {
    let font = embedded_font()
      .inspect_err(|e| error!("无法加载内置字体, 标签将不绘制文字: {}", e))
      .ok();
    Self {
      image: RgbImage::new(0, 0),
      font,
      font_size: LABEL_FONT_SIZE,
    }
  }
}

impl Canvas {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }

  pub fn load_font(path: &Path) -> Result<FontArc, DrawError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data).map_err(|e| DrawError::InvalidFont(e.to_string()))?;
    info!("加载字体: {}", path.display());
    Ok(font)
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  fn pixel_range(&self, rect: &BoundingBox) -> Option<(u32, u32, u32, u32)> {
    let (w, h) = self.image.dimensions();
    let x0 = rect.x.max(0.0).floor() as u32;
    let y0 = rect.y.max(0.0).floor() as u32;
    let x1 = (rect.right().ceil().max(0.0) as u32).min(w);
    let y1 = (rect.bottom().ceil().max(0.0) as u32).min(h);
    (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
  }
}

impl Surface for Canvas {
  fn size(&self) -> (u32, u32) {
    self.image.dimensions()
  }

  fn clear(&mut self, frame: &RgbFrame) {
    self.image = frame
      .to_rgb_image()
      .unwrap_or_else(|| RgbImage::new(frame.width(), frame.height()));
  }

  fn stroke_rect(&mut self, rect: &BoundingBox, color: Color, line_width: u32) {
    let x = rect.x.round() as i32;
    let y = rect.y.round() as i32;
    let w = rect.width.round() as i32;
    let h = rect.height.round() as i32;

    // 边框向内加粗
    for t in 0..line_width as i32 {
      let (tw, th) = (w - 2 * t, h - 2 * t);
      if tw <= 0 || th <= 0 {
        break;
      }
      let rect = Rect::at(x + t, y + t).of_size(tw as u32, th as u32);
      draw_hollow_rect_mut(&mut self.image, rect, Rgb(color));
    }
  }

  fn fill_rect(&mut self, rect: &BoundingBox, color: Color, alpha: f32) {
    let Some((x0, y0, x1, y1)) = self.pixel_range(rect) else {
      return;
    };
    let alpha = alpha.clamp(0.0, 1.0);
    for y in y0..y1 {
      for x in x0..x1 {
        let pixel = self.image.get_pixel_mut(x, y);
        for c in 0..3 {
          let blended = color[c] as f32 * alpha + pixel[c] as f32 * (1.0 - alpha);
          pixel[c] = blended.round() as u8;
        }
      }
    }
  }

  fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color) {
    if let Some(font) = &self.font {
      draw_text_mut(
        &mut self.image,
        Rgb(color),
        x.round() as i32,
        y.round() as i32,
        PxScale::from(self.font_size),
        font,
        text,
      );
    }
  }

  fn measure_text(&self, text: &str) -> f32 {
    match &self.font {
      Some(font) => text_size(PxScale::from(self.font_size), font, text).0 as f32,
      None => text.chars().count() as f32 * LABEL_CHAR_WIDTH,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn gray_frame(width: u32, height: u32) -> RgbFrame {
    RgbFrame::from(RgbImage::from_pixel(width, height, Rgb([100, 100, 100])))
  }

  #[test]
  fn clear_resets_to_frame() {
    let mut canvas = Canvas::new();
    canvas.clear(&gray_frame(8, 4));
    canvas.fill_rect(&BoundingBox::new(0.0, 0.0, 8.0, 4.0), [0, 0, 0], 1.0);
    canvas.clear(&gray_frame(8, 4));
    assert_eq!(canvas.size(), (8, 4));
    assert!(canvas.image().pixels().all(|p| *p == Rgb([100, 100, 100])));
  }

  #[test]
  fn fill_rect_blends_and_clips() {
    let mut canvas = Canvas::new();
    canvas.clear(&gray_frame(4, 4));
    canvas.fill_rect(&BoundingBox::new(2.0, 2.0, 10.0, 10.0), [0, 0, 0], 0.5);
    assert_eq!(*canvas.image().get_pixel(3, 3), Rgb([50, 50, 50]));
    assert_eq!(*canvas.image().get_pixel(1, 1), Rgb([100, 100, 100]));
  }

  #[test]
  fn stroke_rect_draws_two_pixel_border() {
    let mut canvas = Canvas::new();
    canvas.clear(&gray_frame(10, 10));
    canvas.stroke_rect(&BoundingBox::new(1.0, 1.0, 8.0, 8.0), [255, 0, 0], 2);
    let image = canvas.image();
    assert_eq!(*image.get_pixel(1, 1), Rgb([255, 0, 0]));
    assert_eq!(*image.get_pixel(2, 4), Rgb([255, 0, 0]));
    assert_eq!(*image.get_pixel(4, 4), Rgb([100, 100, 100]));

    // 零尺寸框不绘制
    canvas.stroke_rect(&BoundingBox::new(5.0, 5.0, 0.0, 3.0), [0, 255, 0], 2);
  }

  #[test]
  fn default_canvas_draws_label_text() {
    let mut canvas = Canvas::new();
    canvas.clear(&RgbFrame::from(RgbImage::new(80, 24)));
    canvas.fill_text("person 90%", 2.0, 2.0, [255, 255, 255]);

    assert!(canvas.measure_text("person 90%") > 0.0);
    assert!(canvas.image().pixels().any(|p| p[0] > 0));
  }

  #[test]
  fn text_width_is_estimated_without_font() {
    let canvas = Canvas {
      font: None,
      ..Canvas::new()
    };
    assert_eq!(canvas.measure_text("tv 90%"), 48.0);
  }
}
