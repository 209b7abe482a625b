// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/output/save_video_file.rs - 保存视频文件
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

//! 视频文件输出模块
//!
//! 把叠加了比对结果的帧先缓存为 PNG 序列，结束时用 ffmpeg 编码为 MP4。
//!
//! # URL 格式
//!
//! - `video:///path/to/overlay_drill_1.mp4` - 默认 25 fps
//! - `video:///path/to/overlay_drill_1.mp4?fps=29.97`
//!
//! 输出分辨率与源帧一致；yuv420p 要求偶数宽高，源帧宽或高为奇数时
//! 在右侧 / 底部补一像素黑边。
//!
//! # 依赖
//!
//! 此模块需要系统安装 ffmpeg 命令行工具来编码视频。

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  compare::FrameRecord,
  frame::{VideoFrame, VideoInfo},
  output::{Render, directory_record::clear_frames, draw::Annotator},
  url_path,
};

#[derive(Error, Debug)]
pub enum SaveVideoFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("视频编码错误: {0}")]
  EncodingError(String),
  #[error("字体加载错误")]
  FontLoadError,
  #[error("参数验证错误: {0}")]
  ValidationError(String),
}

const MIN_FPS: f64 = 1.0;
const MAX_FPS: f64 = 240.0;

/// 视频帧缓存
struct FrameBuffer {
  temp_dir: PathBuf,
  frames: usize,
  /// 首帧宽高
  dimensions: Option<(u32, u32)>,
}

/// 宽或高为奇数时返回补边滤镜
fn even_pad_filter(width: u32, height: u32) -> Option<&'static str> {
  (width % 2 != 0 || height % 2 != 0).then_some("pad=ceil(iw/2)*2:ceil(ih/2)*2")
}

impl FrameBuffer {
  fn new(output_path: &Path) -> Result<Self, SaveVideoFileError> {
    // 在输出文件旁边创建临时目录
    let mut temp_dir = output_path.as_os_str().to_owned();
    temp_dir.push(".frames");
    let temp_dir = PathBuf::from(temp_dir);
    std::fs::create_dir_all(&temp_dir)?;
    // 上次中断留下的帧会被 ffmpeg 一并编码
    let stale = clear_frames(&temp_dir)?;
    if stale > 0 {
      warn!("清理上次残留的 {} 帧: {}", stale, temp_dir.display());
    }

    Ok(FrameBuffer {
      temp_dir,
      frames: 0,
      dimensions: None,
    })
  }

  fn add_frame(&mut self, image: &image::RgbImage) -> Result<(), SaveVideoFileError> {
    let frame_path = self.temp_dir.join(format!("frame_{:06}.png", self.frames));
    image.save(&frame_path)?;
    self.dimensions.get_or_insert(image.dimensions());
    self.frames += 1;
    Ok(())
  }

  fn encode_to_video(&self, output_path: &Path, fps: f64) -> Result<(), SaveVideoFileError> {
    if self.frames == 0 {
      info!("没有帧可以编码为视频，跳过编码过程");
      return Ok(());
    }

    info!(
      "开始编码视频: {} 帧 @ {:.2} fps -> {}",
      self.frames,
      fps,
      output_path.display()
    );

    if let Some(parent) = output_path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)?;
      }
    }

    let mut command = Command::new("ffmpeg");
    command
      .arg("-y")
      .arg("-loglevel")
      .arg("error")
      .arg("-framerate")
      .arg(fps.to_string())
      .arg("-i")
      .arg(self.temp_dir.join("frame_%06d.png"))
      .arg("-c:v")
      .arg("libx264")
      .arg("-pix_fmt")
      .arg("yuv420p");
    if let Some((width, height)) = self.dimensions {
      if let Some(filter) = even_pad_filter(width, height) {
        warn!("源帧 {}x{} 含奇数边，编码时补齐为偶数", width, height);
        command.arg("-vf").arg(filter);
      }
    }
    let ffmpeg_result = command
      .arg("-preset")
      .arg("fast")
      .arg("-crf")
      .arg("23")
      .arg(output_path)
      .output();

    match ffmpeg_result {
      Ok(output) if output.status.success() => {
        info!("视频编码成功: {}", output_path.display());
        Ok(())
      }
      Ok(output) => {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("ffmpeg 错误: {}", stderr);
        Err(SaveVideoFileError::EncodingError(format!(
          "ffmpeg 失败: {}",
          stderr
        )))
      }
      Err(e) => {
        error!("无法执行 ffmpeg: {}", e);
        Err(SaveVideoFileError::EncodingError(format!(
          "无法执行 ffmpeg (请确保已安装): {}",
          e
        )))
      }
    }
  }

  fn cleanup(&self) {
    if let Err(e) = std::fs::remove_dir_all(&self.temp_dir) {
      warn!("清理临时目录失败: {}", e);
    }
  }
}

/// RAII 守卫确保清理总是执行
struct CleanupGuard<'a>(&'a FrameBuffer);

impl Drop for CleanupGuard<'_> {
  fn drop(&mut self) {
    self.0.cleanup();
  }
}

pub struct SaveVideoFileOutput {
  path: PathBuf,
  fps: f64,
  annotator: Annotator<'static>,
  buffer: RefCell<Option<FrameBuffer>>,
}

impl FromUrlWithScheme for SaveVideoFileOutput {
  const SCHEME: &'static str = "video";
}

impl FromUrl for SaveVideoFileOutput {
  type Error = SaveVideoFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveVideoFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let fps = match uri.query_pairs().find(|(k, _)| k == "fps") {
      Some((_, v)) => v
        .parse::<f64>()
        .map_err(|_| SaveVideoFileError::ValidationError(format!("无效的 FPS: {}", v)))?,
      None => VideoInfo::DEFAULT_FPS,
    };

    Self::new(&url_path(uri), fps)
  }
}

impl SaveVideoFileOutput {
  pub fn new(path: &Path, fps: f64) -> Result<Self, SaveVideoFileError> {
    if !(MIN_FPS..=MAX_FPS).contains(&fps) {
      return Err(SaveVideoFileError::ValidationError(format!(
        "FPS {} 超出有效范围 [{}, {}]",
        fps, MIN_FPS, MAX_FPS
      )));
    }

    Ok(SaveVideoFileOutput {
      path: path.to_path_buf(),
      fps,
      annotator: Annotator::new().map_err(|_| SaveVideoFileError::FontLoadError)?,
      buffer: RefCell::new(None),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn push_frame(&self, image: &image::RgbImage) -> Result<(), SaveVideoFileError> {
    let mut buffer_opt = self.buffer.borrow_mut();
    if buffer_opt.is_none() {
      *buffer_opt = Some(FrameBuffer::new(&self.path)?);
      info!("初始化视频帧缓冲区: {}", self.path.display());
    }
    if let Some(buffer) = buffer_opt.as_mut() {
      buffer.add_frame(image)?;
    }
    Ok(())
  }

  /// 编码已缓存的帧并清理临时目录
  pub fn finish(self) -> Result<PathBuf, SaveVideoFileError> {
    if let Some(buffer) = self.buffer.borrow_mut().take() {
      let _cleanup = CleanupGuard(&buffer);
      buffer.encode_to_video(&self.path, self.fps)?;
    }
    Ok(self.path.clone())
  }
}

impl Render<VideoFrame, FrameRecord> for SaveVideoFileOutput {
  type Error = SaveVideoFileError;

  fn render_result(&self, frame: &VideoFrame, result: &FrameRecord) -> Result<(), Self::Error> {
    let mut image = frame.image.clone();
    self.annotator.annotate(&mut image, result);
    self.push_frame(&image)
  }
}

impl Drop for SaveVideoFileOutput {
  fn drop(&mut self) {
    // 未调用 finish 时仍然尝试完成编码
    if let Some(buffer) = self.buffer.borrow_mut().take() {
      let _cleanup = CleanupGuard(&buffer);
      if let Err(e) = buffer.encode_to_video(&self.path, self.fps) {
        error!("编码视频时出错: {}", e);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fps_is_validated() {
    let url = Url::parse("video:///tmp/overlay_drill_1.mp4?fps=29.97").unwrap();
    let output = SaveVideoFileOutput::from_url(&url).unwrap();
    assert_eq!(output.fps, 29.97);
    assert_eq!(output.path(), Path::new("/tmp/overlay_drill_1.mp4"));

    assert!(SaveVideoFileOutput::new(Path::new("/tmp/x.mp4"), 0.0).is_err());
    let wrong = Url::parse("folder:///tmp/x").unwrap();
    assert!(matches!(
      SaveVideoFileOutput::from_url(&wrong),
      Err(SaveVideoFileError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn padding_only_for_odd_sizes() {
    assert_eq!(even_pad_filter(1920, 1080), None);
    assert!(even_pad_filter(1921, 1080).is_some());
    assert!(even_pad_filter(640, 361).is_some());
  }

  #[test]
  fn interrupted_frames_are_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overlay_drill_1.mp4");
    let temp = dir.path().join("overlay_drill_1.mp4.frames");
    std::fs::create_dir_all(&temp).unwrap();
    for i in 0..5 {
      std::fs::write(temp.join(format!("frame_{:06}.png", i)), b"stale").unwrap();
    }

    let mut buffer = FrameBuffer::new(&path).unwrap();
    assert_eq!(buffer.temp_dir, temp);
    buffer.add_frame(&image::RgbImage::new(4, 4)).unwrap();
    assert_eq!(buffer.dimensions, Some((4, 4)));
    assert!(temp.join("frame_000000.png").exists());
    assert!(!temp.join("frame_000001.png").exists());
    assert!(!temp.join("frame_000004.png").exists());
  }

  #[test]
  fn nothing_rendered_encodes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overlay_drill_1.mp4");
    let output = SaveVideoFileOutput::new(&path, 25.0).unwrap();
    assert_eq!(output.finish().unwrap(), path);
    assert!(!path.exists());
  }
}
