// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频输入
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

//! # GStreamer 视频输入
//!
//! 通过 URL 描述管道：
//!
//! - `gst://file/path/to/video.mp4`：解码视频文件
//! - `gst://camera/dev/video0?width=640&height=480&fps=30`：v4l2src 摄像头
//!
//! 两者都可以带 `rotate=90|180|270`。管道末端统一转换为 RGB 并接入 appsink，
//! appsink 只保留最新的两帧，处理不过来时直接丢帧。

use std::{collections::HashMap, time::Instant};

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{RGB_CHANNELS, RgbFrame},
  input::{FrameSource, InputError},
  query_map,
};

#[derive(Error, Debug)]
pub enum GStreamerInputError {
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 错误: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("找不到 appsink 元素")]
  AppSinkNotFound,
  #[error("无法转换为 appsink")]
  AppSinkConversionFailed,
  #[error("无法从 caps 获取视频信息")]
  VideoInfoError,
  #[error("不支持的视频格式")]
  UnsupportedFormat,
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("缓冲区长度异常: 期望 {expected}, 实际 {actual}")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("状态切换错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

enum PipelineItem {
  FileSource(String),
  CameraSource {
    camera: String,
    width: u32,
    height: u32,
    fps: u32,
  },
  VideoFlip(u32),
  TargetFormat,
}

impl PipelineItem {
  fn to_pipeline(&self) -> String {
    match self {
      PipelineItem::FileSource(path) => format!("filesrc location={} ! decodebin", path),
      PipelineItem::CameraSource {
        camera,
        width,
        height,
        fps,
      } => format!(
        "v4l2src device={} ! videoconvert ! video/x-raw,width={},height={},framerate={}/1",
        camera, width, height, fps
      ),
      PipelineItem::VideoFlip(method) => format!("videoflip method={}", method),
      PipelineItem::TargetFormat => "videoconvert ! video/x-raw,format=RGB".to_string(),
    }
  }
}

pub struct GStreamerInputPipelineBuilder {
  items: Vec<PipelineItem>,
  fps: Option<f32>,
}

impl GStreamerInputPipelineBuilder {
  fn video_flip(query: &HashMap<String, String>) -> Option<PipelineItem> {
    match query.get("rotate").map(String::as_str) {
      Some("90") => Some(PipelineItem::VideoFlip(1)),
      Some("180") => Some(PipelineItem::VideoFlip(2)),
      Some("270") => Some(PipelineItem::VideoFlip(3)),
      _ => None,
    }
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let description = format!(
      "{} ! appsink max-buffers=2 drop=true name=sink",
      self
        .items
        .iter()
        .map(PipelineItem::to_pipeline)
        .collect::<Vec<String>>()
        .join(" ! ")
    );
    info!("GStreamer 管道: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("无法创建管道".to_string()))?;
    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;
    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerInput {
      pipeline,
      appsink,
      fps: self.fps,
      frame_size: None,
      frame_index: 0,
      start_time: Instant::now(),
    })
  }
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }
    let query = query_map(url);
    let number = |key: &str, default: u32| {
      query
        .get(key)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
    };

    let mut items = Vec::new();
    let mut fps = None;
    match url.host_str() {
      Some("camera") => {
        let camera_fps = number("fps", 30);
        fps = Some(camera_fps as f32);
        items.push(PipelineItem::CameraSource {
          camera: url.path().to_string(),
          width: number("width", 640),
          height: number("height", 480),
          fps: camera_fps,
        });
      }
      Some("file") => items.push(PipelineItem::FileSource(url.path().to_string())),
      _ => return Err(GStreamerInputError::SchemeMismatch),
    }
    if let Some(flip) = Self::video_flip(&query) {
      items.push(flip);
    }
    items.push(PipelineItem::TargetFormat);

    Ok(Self { items, fps })
  }
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  fps: Option<f32>,
  frame_size: Option<(u32, u32)>,
  frame_index: u64,
  start_time: Instant,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止 GStreamer 管道失败: {}", e);
    }
  }
}

fn convert_sample(sample: &gst::Sample) -> Result<(u32, u32, Vec<u8>), GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有缓冲区".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有 caps".to_string()))?;
  let info = gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
  if info.format() != gst_video::VideoFormat::Rgb {
    return Err(GStreamerInputError::UnsupportedFormat);
  }

  let (width, height) = (info.width(), info.height());
  let stride = info.stride()[0] as usize;
  let row = width as usize * RGB_CHANNELS;
  let map = buffer
    .map_readable()
    .map_err(|e| GStreamerInputError::PipelineError(format!("无法映射缓冲区: {}", e)))?;
  let data = map.as_slice();

  let expected = stride * (height as usize).saturating_sub(1) + row;
  if data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  // 行尾可能有对齐填充
  let mut rgb = Vec::with_capacity(row * height as usize);
  for y in 0..height as usize {
    rgb.extend_from_slice(&data[y * stride..y * stride + row]);
  }
  Ok((width, height, rgb))
}

impl Iterator for GStreamerInput {
  type Item = Result<RgbFrame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let sample = match self.appsink.pull_sample() {
      Ok(sample) => sample,
      Err(e) => {
        // 流结束
        error!("无法拉取样本: {}", e);
        return None;
      }
    };

    let index = self.frame_index;
    self.frame_index += 1;
    let timestamp_ms = self.start_time.elapsed().as_millis() as u64;
    let frame = convert_sample(&sample).and_then(|(width, height, rgb)| {
      self.frame_size = Some((width, height));
      RgbFrame::from_raw(width, height, rgb)
        .map_err(|e| GStreamerInputError::PipelineError(e.to_string()))
    });
    Some(
      frame
        .map(|frame| frame.with_index(index, timestamp_ms))
        .map_err(InputError::from),
    )
  }
}

impl FrameSource for GStreamerInput {
  fn frame_size(&self) -> Option<(u32, u32)> {
    self.frame_size
  }

  fn fps(&self) -> Option<f32> {
    self.fps
  }
}
