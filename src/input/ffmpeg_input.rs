// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/input/ffmpeg_input.rs - ffmpeg 视频文件输入
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

//! ffmpeg 视频文件输入模块
//!
//! 通过 `ffprobe` 读取视频参数，再启动 `ffmpeg` 子进程把视频解码为
//! RGB24 原始字节流，逐帧读取。
//!
//! ffmpeg 默认按旋转元数据自动旋转画面，手机竖拍视频解码后宽高互换，
//! 帧尺寸以旋转后的显示尺寸为准。
//!
//! # URL 格式
//!
//! - `ffmpeg:///path/to/coach_drill1.MP4`
//! - `ffmpeg:videos/coach_drill1.MP4` - 相对路径
//!
//! # 依赖
//!
//! 此模块需要系统安装 ffmpeg / ffprobe 命令行工具。

use std::collections::HashMap;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{VideoFrame, VideoInfo},
  url_path,
};

#[derive(Error, Debug)]
pub enum FfmpegInputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("ffprobe failed for {path}: {message}")]
  ProbeFailed { path: PathBuf, message: String },
  #[error("ffprobe output error: {0}")]
  ProbeOutputError(#[from] serde_json::Error),
  #[error("No video stream in {0}")]
  NoVideoStream(PathBuf),
  #[error("Invalid video geometry {width}x{height}")]
  InvalidGeometry { width: u32, height: u32 },
  #[error("Decoder stdout unavailable")]
  StdoutUnavailable,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
  #[serde(default)]
  streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
  width: Option<u32>,
  height: Option<u32>,
  r_frame_rate: Option<String>,
  avg_frame_rate: Option<String>,
  #[serde(default)]
  tags: HashMap<String, String>,
  #[serde(default)]
  side_data_list: Vec<ProbeSideData>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
  rotation: Option<f64>,
}

impl ProbeStream {
  /// 显示旋转角度，归一化到 0..360
  fn rotation(&self) -> i64 {
    let degrees = self
      .side_data_list
      .iter()
      .find_map(|d| d.rotation)
      .or_else(|| self.tags.get("rotate").and_then(|r| r.trim().parse().ok()))
      .unwrap_or(0.0);
    (degrees.round() as i64).rem_euclid(360)
  }

  /// 自动旋转后的输出宽高
  fn display_size(&self) -> (u32, u32) {
    let width = self.width.unwrap_or(0);
    let height = self.height.unwrap_or(0);
    match self.rotation() {
      90 | 270 => (height, width),
      _ => (width, height),
    }
  }
}

/// 解析 ffprobe 的帧率字符串，如 `30000/1001` 或 `25`
fn parse_frame_rate(rate: &str) -> Option<f64> {
  let fps = match rate.split_once('/') {
    Some((num, den)) => {
      let num: f64 = num.trim().parse().ok()?;
      let den: f64 = den.trim().parse().ok()?;
      if den == 0.0 {
        return None;
      }
      num / den
    }
    None => rate.trim().parse().ok()?,
  };
  (fps.is_finite() && fps > 0.0).then_some(fps)
}

fn probe(path: &Path) -> Result<VideoInfo, FfmpegInputError> {
  let output = Command::new("ffprobe")
    .arg("-v")
    .arg("error")
    .arg("-select_streams")
    .arg("v:0")
    .arg("-show_entries")
    .arg("stream=width,height,r_frame_rate,avg_frame_rate:stream_tags=rotate:stream_side_data=rotation")
    .arg("-of")
    .arg("json")
    .arg(path)
    .output()?;

  if !output.status.success() {
    return Err(FfmpegInputError::ProbeFailed {
      path: path.to_path_buf(),
      message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    });
  }

  let probe: ProbeOutput = serde_json::from_slice(&output.stdout)?;
  let stream = probe
    .streams
    .into_iter()
    .next()
    .ok_or_else(|| FfmpegInputError::NoVideoStream(path.to_path_buf()))?;

  let (width, height) = stream.display_size();
  let rotation = stream.rotation();
  if rotation != 0 {
    debug!("旋转元数据 {}°: {} 解码为 {}x{}", rotation, path.display(), width, height);
  }
  if width == 0 || height == 0 {
    return Err(FfmpegInputError::InvalidGeometry { width, height });
  }

  let fps = stream
    .avg_frame_rate
    .as_deref()
    .and_then(parse_frame_rate)
    .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
    .unwrap_or_else(|| {
      warn!("无法读取帧率，使用默认值 {}", VideoInfo::DEFAULT_FPS);
      VideoInfo::DEFAULT_FPS
    });

  Ok(VideoInfo { width, height, fps })
}

/// ffmpeg 解码输入
pub struct FfmpegInput {
  path: PathBuf,
  info: VideoInfo,
  child: Child,
  stdout: BufReader<ChildStdout>,
  next_index: u64,
  finished: bool,
}

impl FromUrlWithScheme for FfmpegInput {
  const SCHEME: &'static str = "ffmpeg";
}

impl FromUrl for FfmpegInput {
  type Error = FfmpegInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(FfmpegInputError::SchemeMismatch);
    }
    Self::open(&url_path(url))
  }
}

impl FfmpegInput {
  pub fn open(path: &Path) -> Result<Self, FfmpegInputError> {
    let info = probe(path)?;
    info!(
      "视频参数: {} -> {}x{} @ {:.2} fps",
      path.display(),
      info.width,
      info.height,
      info.fps
    );

    let mut child = Command::new("ffmpeg")
      .arg("-loglevel")
      .arg("error")
      .arg("-i")
      .arg(path)
      .arg("-f")
      .arg("rawvideo")
      .arg("-pix_fmt")
      .arg("rgb24")
      .arg("-")
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::inherit())
      .spawn()?;

    let stdout = child
      .stdout
      .take()
      .ok_or(FfmpegInputError::StdoutUnavailable)?;

    Ok(FfmpegInput {
      path: path.to_path_buf(),
      info,
      child,
      stdout: BufReader::new(stdout),
      next_index: 0,
      finished: false,
    })
  }

  pub fn info(&self) -> VideoInfo {
    self.info
  }

  fn read_frame(&mut self) -> Option<Result<VideoFrame, FfmpegInputError>> {
    let mut data = vec![0u8; self.info.frame_bytes()];
    match self.stdout.read_exact(&mut data) {
      Ok(()) => {}
      Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
        debug!("视频读取结束: {} ({} 帧)", self.path.display(), self.next_index);
        return None;
      }
      Err(e) => return Some(Err(e.into())),
    }

    let index = self.next_index;
    self.next_index += 1;
    let frame = VideoFrame::from_rgb24(data, self.info.width, self.info.height, index, self.info.fps)
      .ok_or(FfmpegInputError::InvalidGeometry {
        width: self.info.width,
        height: self.info.height,
      });
    Some(frame)
  }
}

impl Iterator for FfmpegInput {
  type Item = Result<VideoFrame, FfmpegInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }
    let item = self.read_frame();
    if !matches!(item, Some(Ok(_))) {
      self.finished = true;
    }
    item
  }
}

impl Drop for FfmpegInput {
  fn drop(&mut self) {
    // 提前结束时解码进程可能仍在写管道
    if let Err(e) = self.child.kill() {
      debug!("结束 ffmpeg 进程: {}", e);
    }
    if let Err(e) = self.child.wait() {
      warn!("等待 ffmpeg 进程退出失败: {}", e);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn frame_rate_forms() {
    assert_eq!(parse_frame_rate("25/1"), Some(25.0));
    assert_eq!(parse_frame_rate("30"), Some(30.0));
    let ntsc = parse_frame_rate("30000/1001").unwrap();
    assert!((ntsc - 29.97).abs() < 0.01);
    assert_eq!(parse_frame_rate("0/0"), None);
    assert_eq!(parse_frame_rate("abc"), None);
  }

  fn stream(json: &str) -> ProbeStream {
    let probe: ProbeOutput = serde_json::from_str(json).unwrap();
    probe.streams.into_iter().next().unwrap()
  }

  #[test]
  fn rotated_streams_swap_dimensions() {
    let portrait = stream(
      r#"{"streams":[{"width":1920,"height":1080,"avg_frame_rate":"30/1",
        "side_data_list":[{"side_data_type":"Display Matrix","rotation":-90}]}]}"#,
    );
    assert_eq!(portrait.rotation(), 270);
    assert_eq!(portrait.display_size(), (1080, 1920));

    let tagged = stream(r#"{"streams":[{"width":1920,"height":1080,"tags":{"rotate":"90"}}]}"#);
    assert_eq!(tagged.display_size(), (1080, 1920));

    let flipped = stream(r#"{"streams":[{"width":1920,"height":1080,"tags":{"rotate":"180"}}]}"#);
    assert_eq!(flipped.display_size(), (1920, 1080));

    let plain = stream(r#"{"streams":[{"width":640,"height":360}]}"#);
    assert_eq!(plain.rotation(), 0);
    assert_eq!(plain.display_size(), (640, 360));
  }

  #[test]
  fn probe_json_without_streams_is_empty() {
    let probe: ProbeOutput = serde_json::from_str("{}").unwrap();
    assert!(probe.streams.is_empty());
  }
}
