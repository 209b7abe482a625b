// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/frame.rs - 视频帧定义
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

use image::RgbImage;

const RGB_CHANNELS: usize = 3;

/// 帧数据
#[derive(Debug, Clone)]
pub struct VideoFrame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引（输入流内部计数，从 0 开始）
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl VideoFrame {
  pub fn new(image: RgbImage, index: u64, fps: f64) -> Self {
    let timestamp_ms = if fps > 0.0 {
      (index as f64 * 1000.0 / fps).round() as u64
    } else {
      0
    };
    Self {
      image,
      index,
      timestamp_ms,
    }
  }

  /// 由 RGB24 原始字节构造帧，长度必须为 `width * height * 3`
  pub fn from_rgb24(data: Vec<u8>, width: u32, height: u32, index: u64, fps: f64) -> Option<Self> {
    if data.len() != RGB_CHANNELS * width as usize * height as usize {
      return None;
    }
    RgbImage::from_raw(width, height, data).map(|image| Self::new(image, index, fps))
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

/// 视频流参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
  pub width: u32,
  pub height: u32,
  pub fps: f64,
}

impl VideoInfo {
  pub const DEFAULT_FPS: f64 = 25.0;

  pub fn frame_bytes(&self) -> usize {
    RGB_CHANNELS * self.width as usize * self.height as usize
  }
}
