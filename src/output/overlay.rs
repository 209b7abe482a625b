// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/output/overlay.rs - 叠加视频生成
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

use tracing::{debug, warn};

use crate::{
  compare::FrameRecord,
  frame::VideoFrame,
  input::InputError,
  output::Render,
};

/// 叠加结果统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayStats {
  /// 已写出的帧数
  pub annotated: u64,
  /// 视频帧不足，部分记录没有叠加
  pub drift: bool,
}

/// 按行号把记录叠加到重新读取的视频帧上
///
/// 第 i 帧对应第 i 条记录；记录用完或视频结束即停止。
pub fn render_overlay<I, R>(
  records: &[FrameRecord],
  frames: I,
  sink: &R,
) -> Result<OverlayStats, R::Error>
where
  I: IntoIterator<Item = Result<VideoFrame, InputError>>,
  R: Render<VideoFrame, FrameRecord>,
{
  let mut annotated = 0u64;
  let mut extra_frames = false;

  for frame in frames {
    let frame = match frame {
      Ok(frame) => frame,
      Err(e) => {
        warn!("叠加时读取视频失败: {}", e);
        break;
      }
    };
    let Some(record) = records.get(annotated as usize) else {
      extra_frames = true;
      break;
    };
    sink.render_result(&frame, record)?;
    annotated += 1;
  }

  // 学员视频比教练视频长时本就有剩余帧，不算偏移
  let drift = (annotated as usize) < records.len();
  if drift {
    warn!(
      "叠加帧数与记录数不一致: 记录 {} 条, 已叠加 {} 帧",
      records.len(),
      annotated
    );
  } else {
    debug!(
      "叠加完成: {} 帧{}",
      annotated,
      if extra_frames { ", 视频剩余帧未叠加" } else { "" }
    );
  }

  Ok(OverlayStats { annotated, drift })
}
