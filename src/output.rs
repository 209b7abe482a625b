// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/output.rs - 输出定义
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
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  compare::FrameRecord,
  frame::VideoFrame,
  session::OverlayFormat,
};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

pub mod chart;
pub mod csv_export;
pub mod draw;

mod overlay;
pub use self::overlay::{OverlayStats, render_overlay};

mod save_video_file;
pub use self::save_video_file::{SaveVideoFileError, SaveVideoFileOutput};

mod directory_record;
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("保存视频文件错误: {0}")]
  SaveVideoFileError(#[from] SaveVideoFileError),
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 叠加结果输出
pub enum OutputWrapper {
  SaveVideoFileOutput(SaveVideoFileOutput),
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      SaveVideoFileOutput::SCHEME => Ok(OutputWrapper::SaveVideoFileOutput(
        SaveVideoFileOutput::from_url(url)?,
      )),
      DirectoryRecordOutput::SCHEME => Ok(OutputWrapper::DirectoryRecordOutput(
        DirectoryRecordOutput::from_url(url)?,
      )),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl OutputWrapper {
  /// `video:` / `folder:` 地址按地址创建，其余按路径与格式创建
  pub fn open(target: &Path, format: OverlayFormat, fps: f64) -> Result<Self, OutputError> {
    let url = target.to_str().and_then(|s| Url::parse(s).ok()).filter(|url| {
      [SaveVideoFileOutput::SCHEME, DirectoryRecordOutput::SCHEME].contains(&url.scheme())
    });
    match url {
      Some(url) => Self::from_url(&url),
      None => Self::create(format, target, fps),
    }
  }

  pub fn create(format: OverlayFormat, path: &Path, fps: f64) -> Result<Self, OutputError> {
    Ok(match format {
      OverlayFormat::Mp4 => OutputWrapper::SaveVideoFileOutput(SaveVideoFileOutput::new(path, fps)?),
      OverlayFormat::Frames => {
        OutputWrapper::DirectoryRecordOutput(DirectoryRecordOutput::new(path)?)
      }
    })
  }

  /// 完成输出，返回产物路径
  pub fn finish(self) -> Result<PathBuf, OutputError> {
    match self {
      OutputWrapper::SaveVideoFileOutput(output) => Ok(output.finish()?),
      OutputWrapper::DirectoryRecordOutput(output) => Ok(output.finish()?),
    }
  }
}

impl Render<VideoFrame, FrameRecord> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &VideoFrame, result: &FrameRecord) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::SaveVideoFileOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}
