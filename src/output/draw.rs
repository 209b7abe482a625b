// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/output/draw.rs - 比对结果叠加绘制
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

use ab_glyph::{FontRef, InvalidFont, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_circle_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::{compare::FrameRecord, model::BallPosition};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_PADDING: i32 = 6;
const LABEL_ORIGIN: (i32, i32) = (20, 20);
const TEXT_COLOR: [u8; 3] = [255, 255, 255];
const BACKGROUND_COLOR: [u8; 3] = [32, 32, 32];
const BALL_COLOR: [u8; 3] = [255, 64, 0];
const BALL_RADIUS: i32 = 14;

static EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

/// 内嵌字体，叠加文字与图表共用
pub fn embedded_font() -> Result<FontRef<'static>, InvalidFont> {
  FontRef::try_from_slice(EMBEDDED_FONT)
}

/// 叠加在学员视频帧上的说明文字
pub fn overlay_text(record: &FrameRecord) -> String {
  format!(
    "Coach: {:.2}%  Student: {:.2}%  Sim: {:.2}  Action: {}",
    record.coach_accuracy,
    record.student_accuracy,
    record.pose_similarity,
    record.action_pair()
  )
}

/// 在帧上绘制比对结果
pub struct Annotator<'a> {
  font: FontRef<'a>,
  text_color: [u8; 3],
  background_color: [u8; 3],
}

impl Annotator<'static> {
  pub fn new() -> Result<Self, InvalidFont> {
    Ok(Annotator {
      font: embedded_font()?,
      text_color: TEXT_COLOR,
      background_color: BACKGROUND_COLOR,
    })
  }
}

impl<'a> Annotator<'a> {
  fn draw_label(&self, image: &mut RgbImage, text: &str) {
    let scale = PxScale::from(LABEL_FONT_SIZE);
    let (text_w, text_h) = text_size(scale, &self.font, text);

    let (x, y) = LABEL_ORIGIN;
    let max_width = (image.width() as i32 - x).max(0);
    let max_height = (image.height() as i32 - y).max(0);
    let box_w = (text_w as i32 + 2 * LABEL_PADDING).min(max_width);
    let box_h = (text_h as i32 + 2 * LABEL_PADDING).min(max_height);

    // 画面太小时只画文字
    if box_w > 0 && box_h > 0 {
      let rect = Rect::at(x, y).of_size(box_w as u32, box_h as u32);
      draw_filled_rect_mut(image, rect, Rgb(self.background_color));
    }

    draw_text_mut(
      image,
      Rgb(self.text_color),
      x + LABEL_PADDING,
      y + LABEL_PADDING,
      scale,
      &self.font,
      text,
    );
  }

  fn draw_ball(&self, image: &mut RgbImage, ball: &BallPosition) {
    let center = (ball.x as i32, ball.y as i32);
    for r in [BALL_RADIUS, BALL_RADIUS + 1] {
      draw_hollow_circle_mut(image, center, r, Rgb(BALL_COLOR));
    }
  }

  pub fn annotate(&self, image: &mut RgbImage, record: &FrameRecord) {
    if let Some(ball) = &record.student_ball {
      self.draw_ball(image, ball);
    }
    self.draw_label(image, &overlay_text(record));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::session::DrillId;

  fn record() -> FrameRecord {
    FrameRecord {
      drill_id: DrillId(1),
      frame_index: 0,
      coach_accuracy: 88.235,
      student_accuracy: 70.588,
      pose_similarity: 99.1234,
      coach_ball: None,
      student_ball: Some(BallPosition { x: 60, y: 60 }),
      coach_label: "kicking".into(),
      student_label: "running".into(),
      semantic_similarity: 0.8,
    }
  }

  #[test]
  fn overlay_text_layout() {
    assert_eq!(
      overlay_text(&record()),
      "Coach: 88.24%  Student: 70.59%  Sim: 99.12  Action: kicking vs running"
    );
  }

  #[test]
  fn annotation_changes_pixels() {
    let annotator = Annotator::new().unwrap();
    let mut image = RgbImage::new(640, 120);
    annotator.annotate(&mut image, &record());

    // 文字背景
    assert_eq!(*image.get_pixel(LABEL_ORIGIN.0 as u32, LABEL_ORIGIN.1 as u32), Rgb(BACKGROUND_COLOR));
    // 球圈
    assert_eq!(*image.get_pixel(60 + BALL_RADIUS as u32, 60), Rgb(BALL_COLOR));
  }

  #[test]
  fn tiny_frame_does_not_panic() {
    let annotator = Annotator::new().unwrap();
    let mut image = RgbImage::new(8, 8);
    annotator.annotate(&mut image, &record());
  }
}
