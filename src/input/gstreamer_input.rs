// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
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

//! # GStreamer 视频输入模块
//!
//! 用 GStreamer 解码视频文件，替代外部 ffmpeg 进程。
//!
//! ## URL 格式
//!
//! - `gst:///data/coach_drill1.MP4`
//! - `gst:///data/coach_drill1.MP4?rotate=90` - 解码后旋转
//!
//! ## 系统依赖
//!
//! 需要安装 GStreamer 开发库，并启用 `gstreamer_input` 特性。

use std::collections::HashMap;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{VideoFrame, VideoInfo},
  url_path,
};

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  #[error("Unsupported video format")]
  UnsupportedFormat,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

fn video_flip(rotate: Option<&str>) -> Option<String> {
  let (method, direction) = match rotate? {
    "90" => (1, 1),
    "180" => (2, 2),
    "270" => (3, 3),
    _ => return None,
  };
  Some(format!(
    "videoflip method={} video-direction={}",
    method, direction
  ))
}

/// gst-launch 语法中的带引号属性值
fn quote(value: &str) -> String {
  format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn build_pipeline(location: &str, query: &HashMap<String, String>) -> String {
  let mut items = vec![format!("filesrc location={} ! decodebin", quote(location))];
  if let Some(flip) = video_flip(query.get("rotate").map(|s| s.as_ref())) {
    items.push(flip);
  }
  items.push("videoconvert ! video/x-raw,format=RGB".to_string());
  // 比对需要完整帧序列，appsink 不得丢帧
  format!(
    "{} ! appsink max-buffers=4 drop=false sync=false name=sink",
    items.join(" ! ")
  )
}

/// GStreamer 视频输入
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  info: VideoInfo,
  pending: Option<gst::Sample>,
  next_index: u64,
}

impl FromUrlWithScheme for GStreamerInput {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInput {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();
    let location = url_path(url);
    Self::launch(&build_pipeline(&location.to_string_lossy(), &query))
  }
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl GStreamerInput {
  fn launch(description: &str) -> Result<Self, GStreamerInputError> {
    gst::init()?;
    info!("GStreamer pipeline description: {}", description);

    let pipeline = gst::parse::launch(description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    // 预取首帧以确定尺寸与帧率
    let pending = appsink.pull_sample().ok();
    let info = match &pending {
      Some(sample) => sample_info(sample)?,
      None => VideoInfo {
        width: 0,
        height: 0,
        fps: VideoInfo::DEFAULT_FPS,
      },
    };

    Ok(GStreamerInput {
      pipeline,
      appsink,
      info,
      pending,
      next_index: 0,
    })
  }

  pub fn info(&self) -> VideoInfo {
    self.info
  }

  fn pull_sample(&mut self) -> Option<gst::Sample> {
    if let Some(sample) = self.pending.take() {
      return Some(sample);
    }
    // EOS 时 pull_sample 返回错误，视作流结束
    self.appsink.pull_sample().ok()
  }
}

fn sample_info(sample: &gst::Sample) -> Result<VideoInfo, GStreamerInputError> {
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;
  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
  let fps = video_info.fps();
  let fps = if fps.denom() > 0 && fps.numer() > 0 {
    fps.numer() as f64 / fps.denom() as f64
  } else {
    VideoInfo::DEFAULT_FPS
  };
  Ok(VideoInfo {
    width: video_info.width(),
    height: video_info.height(),
    fps,
  })
}

fn convert_sample(sample: gst::Sample, index: u64) -> Result<VideoFrame, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;
  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
  if video_info.format() != gst_video::VideoFormat::Rgb {
    return Err(GStreamerInputError::UnsupportedFormat);
  }

  let width = video_info.width();
  let height = video_info.height();
  let stride = video_info.stride()[0] as usize;
  let row_bytes = width as usize * 3;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  let expected = stride * (height as usize).saturating_sub(1) + row_bytes;
  if data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  // 去掉行对齐填充
  let mut pixels = Vec::with_capacity(row_bytes * height as usize);
  for row in 0..height as usize {
    let start = row * stride;
    pixels.extend_from_slice(&data[start..start + row_bytes]);
  }

  let image = RgbImage::from_raw(width, height, pixels).ok_or(
    GStreamerInputError::BufferSizeMismatch {
      expected: row_bytes * height as usize,
      actual: data.len(),
    },
  )?;
  let fps = sample_info(&sample).map(|i| i.fps)?;
  Ok(VideoFrame::new(image, index, fps))
}

impl Iterator for GStreamerInput {
  type Item = Result<VideoFrame, GStreamerInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let sample = self.pull_sample()?;
    let index = self.next_index;
    self.next_index += 1;
    Some(convert_sample(sample, index).inspect_err(|e| error!("Failed to fetch sample: {}", e)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pipeline_description_includes_rotation() {
    let mut query = HashMap::new();
    query.insert("rotate".to_string(), "180".to_string());
    let desc = build_pipeline("/data/a.mp4", &query);
    assert!(desc.starts_with("filesrc location=\"/data/a.mp4\" ! decodebin"));
    assert!(desc.contains("videoflip method=2"));
    assert!(desc.ends_with("name=sink"));

    let desc = build_pipeline("/data/a.mp4", &HashMap::new());
    assert!(!desc.contains("videoflip"));
  }

  #[test]
  fn locations_with_spaces_are_quoted() {
    let desc = build_pipeline("/data/my drills/coach \"1\".MP4", &HashMap::new());
    assert!(desc.starts_with(r#"filesrc location="/data/my drills/coach \"1\".MP4" ! decodebin"#));
  }
}
