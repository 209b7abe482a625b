// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
use std::sync::Mutex;

use thiserror::Error;
use tracing::info;

use crate::{
  FromUrl, FromUrlWithScheme,
  compare::FrameRecord,
  frame::VideoFrame,
  output::{Render, draw::Annotator},
  url_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体加载错误")]
  FontLoadError,
  #[error("帧计数器锁已失效")]
  Poisoned,
}

/// 叠加结果逐帧保存为 `frame_000000.png` 序列，可再作为图像序列输入读回
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  annotator: Annotator<'static>,
  frame_counter: Mutex<u64>,
  /// 额外保存每帧记录的 JSON
  record: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let record = uri.query_pairs().any(|(k, _)| k == "record");
    Ok(Self::new(&url_path(uri))?.with_record(record))
  }
}

/// 是否为本输出写出的文件：`frame_<数字>.png` 或 `frame_<数字>.json`
pub(crate) fn is_frame_file(path: &Path) -> bool {
  let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
    return false;
  };
  let numbered = stem
    .strip_prefix("frame_")
    .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
  numbered && path.extension().is_some_and(|ext| ext == "png" || ext == "json")
}

/// 只删除旧的帧文件，目录中的其他文件保持不动
pub(crate) fn clear_frames(directory: &Path) -> std::io::Result<usize> {
  let mut removed = 0;
  for entry in std::fs::read_dir(directory)? {
    let path = entry?.path();
    if path.is_file() && is_frame_file(&path) {
      std::fs::remove_file(&path)?;
      removed += 1;
    }
  }
  Ok(removed)
}

impl DirectoryRecordOutput {
  pub fn new(directory: &Path) -> Result<Self, DirectoryRecordOutputError> {
    std::fs::create_dir_all(directory)?;
    let stale = clear_frames(directory)?;
    if stale > 0 {
      info!("清理旧帧: {} ({} 个文件)", directory.display(), stale);
    }

    Ok(DirectoryRecordOutput {
      directory: directory.to_path_buf(),
      annotator: Annotator::new().map_err(|_| DirectoryRecordOutputError::FontLoadError)?,
      frame_counter: Mutex::new(0),
      record: false,
    })
  }

  pub fn with_record(mut self, record: bool) -> Self {
    self.record = record;
    self
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  fn frame_id(&self) -> Result<u64, DirectoryRecordOutputError> {
    let mut counter = self
      .frame_counter
      .lock()
      .map_err(|_| DirectoryRecordOutputError::Poisoned)?;
    let id = *counter;
    *counter += 1;
    Ok(id)
  }

  pub fn finish(self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let frames = self
      .frame_counter
      .into_inner()
      .map_err(|_| DirectoryRecordOutputError::Poisoned)?;
    info!("叠加帧已保存: {} ({} 帧)", self.directory.display(), frames);
    Ok(self.directory)
  }
}

impl Render<VideoFrame, FrameRecord> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &VideoFrame, result: &FrameRecord) -> Result<(), Self::Error> {
    let path = self
      .directory
      .join(format!("frame_{:06}.png", self.frame_id()?));

    let mut image = frame.image.clone();
    self.annotator.annotate(&mut image, result);
    image.save(&path)?;

    if self.record {
      let json = serde_json::to_vec(result).map_err(std::io::Error::other)?;
      std::fs::write(path.with_extension("json"), json)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::session::DrillId;
  use image::RgbImage;

  fn record(index: u64) -> FrameRecord {
    FrameRecord {
      drill_id: DrillId(1),
      frame_index: index,
      coach_accuracy: 100.0,
      student_accuracy: 100.0,
      pose_similarity: 100.0,
      coach_ball: None,
      student_ball: None,
      coach_label: "standing".into(),
      student_label: "standing".into(),
      semantic_similarity: 1.0,
    }
  }

  #[test]
  fn frames_are_numbered_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("overlay_drill_1");
    std::fs::create_dir_all(&target).unwrap();
    std::fs::write(target.join("frame_000009.png"), b"stale").unwrap();
    std::fs::write(target.join("frame_000009.json"), b"{}").unwrap();
    std::fs::write(target.join("coach_drill1.MP4"), b"keep").unwrap();
    std::fs::write(target.join("frame_notes.txt"), b"keep").unwrap();

    let url = url::Url::parse(&format!("folder://{}?record", target.display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    for i in 0..2 {
      let frame = VideoFrame::new(RgbImage::new(320, 80), i, 25.0);
      output.render_result(&frame, &record(i)).unwrap();
    }
    assert_eq!(output.finish().unwrap(), target);

    assert!(target.join("frame_000000.png").exists());
    assert!(target.join("frame_000001.json").exists());
    assert!(!target.join("frame_000009.png").exists());
    assert!(!target.join("frame_000009.json").exists());
    assert!(target.join("coach_drill1.MP4").exists());
    assert!(target.join("frame_notes.txt").exists());
  }

  #[test]
  fn only_numbered_frames_are_ours() {
    assert!(is_frame_file(Path::new("/x/frame_000001.png")));
    assert!(is_frame_file(Path::new("frame_12.json")));
    assert!(!is_frame_file(Path::new("frame_.png")));
    assert!(!is_frame_file(Path::new("frame_01a.png")));
    assert!(!is_frame_file(Path::new("frame_000001.jpg")));
    assert!(!is_frame_file(Path::new("coach_drill1.MP4")));
  }
}
