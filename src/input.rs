// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/input.rs - 视频输入
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{VideoFrame, VideoInfo},
};

mod ffmpeg_input;
pub use self::ffmpeg_input::{FfmpegInput, FfmpegInputError};

mod image_sequence;
pub use self::image_sequence::{ImageSequenceError, ImageSequenceInput};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerInputError};

/// 视频输入源：逐帧产出，读取失败以 `Err` 表示
pub trait VideoInput: Iterator<Item = Result<VideoFrame, InputError>> {
  /// 获取视频流参数
  fn info(&self) -> VideoInfo;
}

#[derive(Error, Debug)]
pub enum InputError {
  #[error("FFmpeg input error: {0}")]
  FfmpegInputError(#[from] FfmpegInputError),
  #[error("Image sequence input error: {0}")]
  ImageSequenceError(#[from] ImageSequenceError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer input error: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("Input not found: {0}")]
  NotFound(PathBuf),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

pub enum InputWrapper {
  Ffmpeg(FfmpegInput),
  ImageSequence(ImageSequenceInput),
  #[cfg(feature = "gstreamer_input")]
  GStreamer(GStreamerInput),
}

impl InputWrapper {
  #[cfg(feature = "gstreamer_input")]
  pub const SCHEMES: &'static [&'static str] = &[
    FfmpegInput::SCHEME,
    ImageSequenceInput::SCHEME,
    GStreamerInput::SCHEME,
  ];
  #[cfg(not(feature = "gstreamer_input"))]
  pub const SCHEMES: &'static [&'static str] = &[FfmpegInput::SCHEME, ImageSequenceInput::SCHEME];

  /// 解析 `ffmpeg:`、`frames:`、`gst:` 形式的输入地址，普通路径返回 `None`
  pub fn parse_url(source: &Path) -> Option<Url> {
    let url = Url::parse(source.to_str()?).ok()?;
    Self::SCHEMES.contains(&url.scheme()).then_some(url)
  }

  /// 按 `scheme://<绝对路径>` 指定解码方式
  pub fn with_scheme(scheme: &str, path: &Path) -> Result<PathBuf, InputError> {
    if !Self::SCHEMES.contains(&scheme) {
      return Err(InputError::SchemeMismatch);
    }
    let absolute = std::path::absolute(path).map_err(|_| InputError::NotFound(path.to_path_buf()))?;
    let url = Url::from_file_path(&absolute).map_err(|()| InputError::NotFound(absolute.clone()))?;
    Ok(PathBuf::from(format!("{}://{}", scheme, url.path())))
  }

  /// 打开输入：输入地址按 scheme 分派；普通路径中目录视为图像序列，其余交给 ffmpeg 解码
  pub fn open(path: &Path) -> Result<Self, InputError> {
    if let Some(url) = Self::parse_url(path) {
      info!("按地址打开: {}", url);
      return Self::from_url(&url);
    }
    if !path.exists() {
      return Err(InputError::NotFound(path.to_path_buf()));
    }

    if path.is_dir() {
      info!("以图像序列方式打开: {}", path.display());
      Ok(InputWrapper::ImageSequence(ImageSequenceInput::open(
        path,
        VideoInfo::DEFAULT_FPS,
      )?))
    } else {
      info!("以 ffmpeg 方式打开: {}", path.display());
      Ok(InputWrapper::Ffmpeg(FfmpegInput::open(path)?))
    }
  }
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      FfmpegInput::SCHEME => Ok(InputWrapper::Ffmpeg(FfmpegInput::from_url(url)?)),
      ImageSequenceInput::SCHEME => Ok(InputWrapper::ImageSequence(
        ImageSequenceInput::from_url(url)?,
      )),
      #[cfg(feature = "gstreamer_input")]
      GStreamerInput::SCHEME => Ok(InputWrapper::GStreamer(GStreamerInput::from_url(url)?)),
      _ => Err(InputError::SchemeMismatch),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Result<VideoFrame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::Ffmpeg(input) => input.next().map(|r| r.map_err(InputError::from)),
      InputWrapper::ImageSequence(input) => input.next().map(|r| r.map_err(InputError::from)),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => input.next().map(|r| r.map_err(InputError::from)),
    }
  }
}

impl VideoInput for InputWrapper {
  fn info(&self) -> VideoInfo {
    match self {
      InputWrapper::Ffmpeg(input) => input.info(),
      InputWrapper::ImageSequence(input) => input.info(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => input.info(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_path_is_reported() {
    let err = InputWrapper::open(Path::new("/definitely/not/here/coach_drill9.MP4"))
      .err()
      .expect("应当报错");
    assert!(matches!(err, InputError::NotFound(_)));
  }

  #[test]
  fn urls_select_the_decoder() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("student drill1");
    std::fs::create_dir_all(&frames).unwrap();
    image::RgbImage::new(4, 2)
      .save(frames.join("frame_0000.png"))
      .unwrap();

    let source = InputWrapper::with_scheme("frames", &frames).unwrap();
    let url = InputWrapper::parse_url(&source).unwrap();
    assert_eq!(url.scheme(), "frames");
    assert_eq!(crate::url_path(&url), frames);

    let mut input = InputWrapper::open(&source).unwrap();
    assert!(matches!(input, InputWrapper::ImageSequence(_)));
    assert_eq!(input.next().unwrap().unwrap().image.dimensions(), (4, 2));
    assert!(input.next().is_none());

    assert!(InputWrapper::parse_url(Path::new("/data/coach_drill1.MP4")).is_none());
    assert!(InputWrapper::parse_url(Path::new("rtmp://host/live")).is_none());
    assert!(matches!(
      InputWrapper::with_scheme("rtmp", &frames),
      Err(InputError::SchemeMismatch)
    ));
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = url::Url::parse("rtmp://example.com/live").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch)
    ));
  }
}
