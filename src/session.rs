// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/session.rs - 练习会话与产物路径
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

use std::fmt;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::input::{InputError, InputWrapper};

/// 练习编号，显示为 `Drill N`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DrillId(pub u32);

impl fmt::Display for DrillId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Drill {}", self.0)
  }
}

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("{drill} 缺少{role}视频: {path}")]
  MissingVideo {
    drill: DrillId,
    role: &'static str,
    path: PathBuf,
  },
  #[error("{drill} 无法指定解码方式: {source}")]
  Decoder {
    drill: DrillId,
    #[source]
    source: InputError,
  },
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

impl SessionError {
  pub fn drill(&self) -> Option<DrillId> {
    match self {
      SessionError::MissingVideo { drill, .. } | SessionError::Decoder { drill, .. } => Some(*drill),
      SessionError::IoError(_) => None,
    }
  }
}

const VIDEO_EXTENSIONS: &[&str] = &["MP4", "mp4", "mov", "MOV", "avi", "mkv"];
const COACH_PREFIX: &str = "coach_drill";
const STUDENT_PREFIX: &str = "student_drill";

/// 一组教练 / 学员视频
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrillSession {
  pub drill_id: DrillId,
  pub coach_video: PathBuf,
  pub student_video: PathBuf,
}

/// 按 `{prefix}{N}.{ext}` 或图像序列目录 `{prefix}{N}/` 查找视频
fn find_video(dir: &Path, prefix: &str, drill: DrillId) -> Option<PathBuf> {
  let stem = format!("{}{}", prefix, drill.0);
  VIDEO_EXTENSIONS
    .iter()
    .map(|ext| dir.join(format!("{}.{}", stem, ext)))
    .chain(std::iter::once(dir.join(&stem)))
    .find(|p| p.exists())
}

impl DrillSession {
  pub fn new(drill_id: DrillId, coach_video: PathBuf, student_video: PathBuf) -> Self {
    DrillSession {
      drill_id,
      coach_video,
      student_video,
    }
  }

  /// 在视频目录中按命名约定定位一组视频
  pub fn locate(dir: &Path, drill_id: DrillId) -> Result<Self, SessionError> {
    let missing = |role, prefix: &str| SessionError::MissingVideo {
      drill: drill_id,
      role,
      path: dir.join(format!("{}{}.MP4", prefix, drill_id.0)),
    };
    let coach_video =
      find_video(dir, COACH_PREFIX, drill_id).ok_or_else(|| missing("教练", COACH_PREFIX))?;
    let student_video =
      find_video(dir, STUDENT_PREFIX, drill_id).ok_or_else(|| missing("学员", STUDENT_PREFIX))?;
    Ok(DrillSession::new(drill_id, coach_video, student_video))
  }

  /// 两侧视频改用指定的解码方式打开，如 `gst`
  pub fn with_decoder(self, scheme: &str) -> Result<Self, SessionError> {
    let wrap = |path: &Path| {
      InputWrapper::with_scheme(scheme, path).map_err(|source| SessionError::Decoder {
        drill: self.drill_id,
        source,
      })
    };
    Ok(DrillSession {
      coach_video: wrap(&self.coach_video)?,
      student_video: wrap(&self.student_video)?,
      drill_id: self.drill_id,
    })
  }

  /// 列出目录中出现过的练习编号（教练或学员任一侧存在即算），按编号排序
  pub fn discover(dir: &Path) -> Result<Vec<DrillId>, SessionError> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(dir)? {
      let path = entry?.path();
      let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        continue;
      };
      let number = stem
        .strip_prefix(COACH_PREFIX)
        .or_else(|| stem.strip_prefix(STUDENT_PREFIX));
      if let Some(id) = number.and_then(|n| n.parse::<u32>().ok()) {
        ids.push(DrillId(id));
      }
    }
    ids.sort();
    ids.dedup();
    debug!("发现练习: {:?}", ids);
    Ok(ids)
  }
}

/// 叠加结果的输出形式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OverlayFormat {
  /// 经 ffmpeg 编码的 mp4
  #[default]
  Mp4,
  /// 逐帧 PNG 目录
  Frames,
}

/// 结果目录下的产物路径
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
  pub root: PathBuf,
  pub overlay: OverlayFormat,
}

impl ArtifactLayout {
  pub fn new(root: impl Into<PathBuf>, overlay: OverlayFormat) -> Self {
    ArtifactLayout {
      root: root.into(),
      overlay,
    }
  }

  pub fn csv_path(&self, drill: DrillId) -> PathBuf {
    self.root.join(format!("log_drill_{}.csv", drill.0))
  }

  pub fn overlay_path(&self, drill: DrillId) -> PathBuf {
    match self.overlay {
      OverlayFormat::Mp4 => self.root.join(format!("overlay_drill_{}.mp4", drill.0)),
      OverlayFormat::Frames => self.root.join(format!("overlay_drill_{}", drill.0)),
    }
  }

  pub fn accuracy_chart_path(&self) -> PathBuf {
    self.root.join("pose_accuracy_hist.png")
  }

  pub fn mismatch_chart_path(&self) -> PathBuf {
    self.root.join("pose_accuracy_confusion.png")
  }

  pub fn similarity_chart_path(&self) -> PathBuf {
    self.root.join("benchmark_plot.png")
  }
}
