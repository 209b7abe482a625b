// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/input/image_sequence.rs - 图像序列输入
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

//! 图像序列输入
//!
//! 把目录下按文件名排序的图像文件当作视频帧依次读出。
//! URL 形如 `frames:///data/coach_drill1?fps=30`，帧率缺省为 25。

use std::path::{Path, PathBuf};
use std::vec::IntoIter;

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{VideoFrame, VideoInfo},
  url_path,
};

#[derive(Error, Debug)]
pub enum ImageSequenceError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("Invalid fps: {0}")]
  InvalidFps(String),
  #[error("Frame {path} is {actual:?}, expected {expected:?}")]
  SizeMismatch {
    path: PathBuf,
    expected: (u32, u32),
    actual: (u32, u32),
  },
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

fn is_image_file(path: &Path) -> bool {
  path.is_file()
    && path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
      .unwrap_or(false)
}

pub struct ImageSequenceInput {
  info: VideoInfo,
  files: IntoIter<PathBuf>,
  next_index: u64,
}

impl FromUrlWithScheme for ImageSequenceInput {
  const SCHEME: &'static str = "frames";
}

impl FromUrl for ImageSequenceInput {
  type Error = ImageSequenceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageSequenceError::SchemeMismatch);
    }

    let fps = match url.query_pairs().find(|(k, _)| k == "fps") {
      Some((_, v)) => v
        .parse::<f64>()
        .ok()
        .filter(|fps| *fps > 0.0)
        .ok_or_else(|| ImageSequenceError::InvalidFps(v.to_string()))?,
      None => VideoInfo::DEFAULT_FPS,
    };

    Self::open(&url_path(url), fps)
  }
}

impl ImageSequenceInput {
  /// 打开图像目录；空目录得到零帧输入
  pub fn open(dir: &Path, fps: f64) -> Result<Self, ImageSequenceError> {
    let mut files = std::fs::read_dir(dir)?
      .map(|entry| entry.map(|e| e.path()))
      .collect::<Result<Vec<_>, _>>()?;
    files.retain(|p| is_image_file(p));
    files.sort();

    let (width, height) = match files.first() {
      Some(first) => image::image_dimensions(first)?,
      None => (0, 0),
    };
    debug!(
      "图像序列 {}: {} 帧, {}x{}",
      dir.display(),
      files.len(),
      width,
      height
    );

    Ok(ImageSequenceInput {
      info: VideoInfo { width, height, fps },
      files: files.into_iter(),
      next_index: 0,
    })
  }

  pub fn info(&self) -> VideoInfo {
    self.info
  }

  fn load(&self, path: &Path) -> Result<VideoFrame, ImageSequenceError> {
    let image = ImageReader::open(path)?.decode()?.into_rgb8();
    let expected = (self.info.width, self.info.height);
    if image.dimensions() != expected {
      return Err(ImageSequenceError::SizeMismatch {
        path: path.to_path_buf(),
        expected,
        actual: image.dimensions(),
      });
    }
    Ok(VideoFrame::new(image, self.next_index, self.info.fps))
  }
}

impl Iterator for ImageSequenceInput {
  type Item = Result<VideoFrame, ImageSequenceError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.files.next()?;
    let frame = self.load(&path);
    self.next_index += 1;
    Some(frame)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  fn write_frames(dir: &Path, count: usize) {
    for i in 0..count {
      let img = RgbImage::from_pixel(8, 6, Rgb([i as u8 * 10, 0, 0]));
      img.save(dir.join(format!("frame_{:04}.png", i))).unwrap();
    }
  }

  #[test]
  fn frames_are_read_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path(), 3);
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let input = ImageSequenceInput::open(dir.path(), 10.0).unwrap();
    assert_eq!(input.info().width, 8);
    assert_eq!(input.info().height, 6);

    let frames = input.collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[2].index, 2);
    assert_eq!(frames[2].timestamp_ms, 200);
    assert_eq!(frames[1].image.get_pixel(0, 0)[0], 10);
  }

  #[test]
  fn fps_comes_from_query() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path(), 1);
    let url = Url::parse(&format!("frames://{}?fps=50", dir.path().display())).unwrap();
    let input = ImageSequenceInput::from_url(&url).unwrap();
    assert_eq!(input.info().fps, 50.0);

    let bad = Url::parse(&format!("frames://{}?fps=-1", dir.path().display())).unwrap();
    assert!(matches!(
      ImageSequenceInput::from_url(&bad),
      Err(ImageSequenceError::InvalidFps(_))
    ));
  }

  #[test]
  fn empty_directory_yields_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut input = ImageSequenceInput::open(dir.path(), 25.0).unwrap();
    assert!(input.next().is_none());
  }
}
