// 该文件是 Kanjian （看见） 项目的一部分。
// src/render.rs - 检测结果叠加绘制
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

use tracing::trace;

use crate::{
  catalog::{ProductCatalog, ProductInfo},
  detection::{BoundingBox, Detection},
  frame::RgbFrame,
};

pub type Color = [u8; 3];

pub const WHITE: Color = [255, 255, 255];
pub const BLACK: Color = [0, 0, 0];

const BOX_LINE_WIDTH: u32 = 2;
const LABEL_PLATE_HEIGHT: f32 = 20.0;
const LABEL_PLATE_ALPHA: f32 = 0.7;
const INFO_PLATE_ALPHA: f32 = 0.8;
// 文本左侧缩进，底板宽度为文本宽度加两倍缩进
const TEXT_INSET: f32 = 5.0;
const TEXT_TOP_PADDING: f32 = 3.0;

/// 按类别名称查找的框颜色，未列出的类别为白色。
pub const CLASS_COLORS: [(&str, Color); 9] = [
  ("person", [0xFF, 0x00, 0x00]),
  ("car", [0x00, 0x00, 0xFF]),
  ("phone", [0x00, 0xFF, 0x00]),
  ("tv", [0xFF, 0xFF, 0x00]),
  ("laptop", [0xFF, 0x00, 0xFF]),
  ("shoe", [0x00, 0xFF, 0xFF]),
  ("shirt", [0xFF, 0xA5, 0x00]),
  ("pants", [0x80, 0x00, 0x80]),
  ("bag", [0x00, 0x80, 0x00]),
];

pub fn class_color(class_name: &str) -> Color {
  CLASS_COLORS
    .iter()
    .find(|(name, _)| *name == class_name)
    .map(|(_, color)| *color)
    .unwrap_or(WHITE)
}

/// 叠加层绘制的目标表面。坐标单位为像素，文本坐标为左上角。
pub trait Surface {
  fn size(&self) -> (u32, u32);
  /// 用当前帧覆盖整个表面
  fn clear(&mut self, frame: &RgbFrame);
  fn stroke_rect(&mut self, rect: &BoundingBox, color: Color, line_width: u32);
  fn fill_rect(&mut self, rect: &BoundingBox, color: Color, alpha: f32);
  fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color);
  fn measure_text(&self, text: &str) -> f32;
}

/// 商品信息行的显示开关，各自独立。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayOptions {
  pub show_brand: bool,
  pub show_price: bool,
  pub show_description: bool,
}

impl DisplayOptions {
  pub fn any(&self) -> bool {
    self.show_brand || self.show_price || self.show_description
  }

  /// 按 品牌、价格、描述 的顺序返回启用的信息行，空字段不出行。
  pub fn info_lines<'a>(&self, info: &'a ProductInfo) -> Vec<&'a str> {
    [
      (self.show_brand, info.brand.as_str()),
      (self.show_price, info.price.as_str()),
      (self.show_description, info.description.as_str()),
    ]
    .into_iter()
    .filter(|(enabled, text)| *enabled && !text.is_empty())
    .map(|(_, text)| text)
    .collect()
  }
}

pub fn label_text(detection: &Detection) -> String {
  format!(
    "{} {}%",
    detection.class_name,
    (detection.confidence * 100.0).round() as i64
  )
}

#[derive(Debug, Clone, Default)]
pub struct Renderer {
  catalog: ProductCatalog,
}

impl Renderer {
  pub fn new(catalog: ProductCatalog) -> Self {
    Self { catalog }
  }

  pub fn catalog(&self) -> &ProductCatalog {
    &self.catalog
  }

  /// 清空表面为当前帧，再绘制全部检测结果。
  pub fn render<S: Surface + ?Sized>(
    &self,
    surface: &mut S,
    frame: &RgbFrame,
    detections: &[Detection],
    options: &DisplayOptions,
  ) {
    surface.clear(frame);
    for detection in detections {
      self.draw_detection(surface, detection, options);
    }
    trace!("绘制 {} 个检测结果", detections.len());
  }

  fn draw_detection<S: Surface + ?Sized>(
    &self,
    surface: &mut S,
    detection: &Detection,
    options: &DisplayOptions,
  ) {
    let bbox = &detection.bbox;
    let color = class_color(&detection.class_name);
    surface.stroke_rect(bbox, color, BOX_LINE_WIDTH);

    let label = label_text(detection);
    // 框上方放不下时画在框内顶部
    let plate_y = if bbox.y >= LABEL_PLATE_HEIGHT {
      bbox.y - LABEL_PLATE_HEIGHT
    } else {
      bbox.y
    };
    let plate = BoundingBox::new(
      bbox.x,
      plate_y,
      surface.measure_text(&label) + 2.0 * TEXT_INSET,
      LABEL_PLATE_HEIGHT,
    );
    surface.fill_rect(&plate, BLACK, LABEL_PLATE_ALPHA);
    surface.fill_text(
      &label,
      bbox.x + TEXT_INSET,
      plate_y + TEXT_TOP_PADDING,
      color,
    );

    if !options.any() {
      return;
    }
    let Some(info) = self.catalog.get(&detection.class_name) else {
      return;
    };

    let (_, surface_h) = surface.size();
    let mut line_y = bbox.bottom();
    for line in options.info_lines(info) {
      // 超出表面底部时贴底绘制
      let y = line_y.min(surface_h as f32 - LABEL_PLATE_HEIGHT).max(0.0);
      let plate = BoundingBox::new(
        bbox.x,
        y,
        surface.measure_text(line) + 2.0 * TEXT_INSET,
        LABEL_PLATE_HEIGHT,
      );
      surface.fill_rect(&plate, BLACK, INFO_PLATE_ALPHA);
      surface.fill_text(line, bbox.x + TEXT_INSET, y + TEXT_TOP_PADDING, WHITE);
      line_y += LABEL_PLATE_HEIGHT;
    }
  }
}
