// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/output/chart.rs - 折线图
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

//! 以帧序号为横轴的折线图，直接画成 PNG

use std::path::Path;

use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
  draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::info;

use crate::output::draw::embedded_font;

#[derive(Error, Debug)]
pub enum ChartError {
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体加载错误")]
  FontLoadError,
}

const WIDTH: u32 = 800;
const HEIGHT: u32 = 480;
const MARGIN_LEFT: f32 = 72.0;
const MARGIN_RIGHT: f32 = 24.0;
const MARGIN_TOP: f32 = 48.0;
const MARGIN_BOTTOM: f32 = 56.0;
const Y_TICKS: usize = 5;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);

pub const BLUE: Rgb<u8> = Rgb([31, 119, 180]);
pub const ORANGE: Rgb<u8> = Rgb([255, 127, 14]);
pub const GREEN: Rgb<u8> = Rgb([44, 160, 44]);

pub struct Series {
  pub name: String,
  pub color: Rgb<u8>,
  pub points: Vec<(f32, f32)>,
}

impl Series {
  pub fn new(name: &str, color: Rgb<u8>, points: Vec<(f32, f32)>) -> Self {
    Series {
      name: name.to_string(),
      color,
      points,
    }
  }
}

pub struct LineChart {
  title: String,
  x_label: String,
  y_label: String,
  y_range: Option<(f32, f32)>,
  series: Vec<Series>,
}

/// 坐标映射
struct Plot {
  x: (f32, f32),
  y: (f32, f32),
}

impl Plot {
  fn to_pixel(&self, (x, y): (f32, f32)) -> (f32, f32) {
    let w = WIDTH as f32 - MARGIN_LEFT - MARGIN_RIGHT;
    let h = HEIGHT as f32 - MARGIN_TOP - MARGIN_BOTTOM;
    let px = MARGIN_LEFT + (x - self.x.0) / (self.x.1 - self.x.0) * w;
    let py = MARGIN_TOP + h - (y - self.y.0) / (self.y.1 - self.y.0) * h;
    (px, py)
  }
}

fn span(values: impl Iterator<Item = f32>) -> (f32, f32) {
  let (lo, hi) = values
    .filter(|v| v.is_finite())
    .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
      (lo.min(v), hi.max(v))
    });
  if lo > hi {
    (0.0, 1.0)
  } else if lo == hi {
    (lo - 1.0, hi + 1.0)
  } else {
    (lo, hi)
  }
}

impl LineChart {
  pub fn new(title: &str, x_label: &str, y_label: &str) -> Self {
    LineChart {
      title: title.to_string(),
      x_label: x_label.to_string(),
      y_label: y_label.to_string(),
      y_range: None,
      series: Vec::new(),
    }
  }

  /// 固定纵轴范围，不指定时按数据自动选取
  pub fn y_range(mut self, lo: f32, hi: f32) -> Self {
    self.y_range = Some((lo, hi));
    self
  }

  pub fn series(mut self, series: Series) -> Self {
    self.series.push(series);
    self
  }

  fn plot(&self) -> Plot {
    let points = || self.series.iter().flat_map(|s| s.points.iter());
    let x = span(points().map(|p| p.0));
    let y = self
      .y_range
      .filter(|(lo, hi)| lo < hi)
      .unwrap_or_else(|| span(points().map(|p| p.1)));
    Plot { x, y }
  }

  fn draw_axes(&self, image: &mut RgbImage, plot: &Plot, font: &FontRef) {
    let scale = PxScale::from(14.0);
    let left = MARGIN_LEFT;
    let right = WIDTH as f32 - MARGIN_RIGHT;
    let top = MARGIN_TOP;
    let bottom = HEIGHT as f32 - MARGIN_BOTTOM;

    for i in 0..=Y_TICKS {
      let value = plot.y.0 + (plot.y.1 - plot.y.0) * i as f32 / Y_TICKS as f32;
      let (_, py) = plot.to_pixel((plot.x.0, value));
      draw_line_segment_mut(image, (left, py), (right, py), GRID);
      let label = format!("{:.1}", value);
      let (tw, th) = text_size(scale, font, &label);
      draw_text_mut(
        image,
        AXIS,
        (left - 6.0) as i32 - tw as i32,
        py as i32 - th as i32 / 2,
        scale,
        font,
        &label,
      );
    }

    let x_ticks = [plot.x.0, (plot.x.0 + plot.x.1) / 2.0, plot.x.1];
    for value in x_ticks {
      let (px, _) = plot.to_pixel((value, plot.y.0));
      draw_line_segment_mut(image, (px, bottom), (px, bottom + 4.0), AXIS);
      let label = format!("{:.0}", value);
      let (tw, _) = text_size(scale, font, &label);
      draw_text_mut(image, AXIS, px as i32 - tw as i32 / 2, bottom as i32 + 6, scale, font, &label);
    }

    draw_line_segment_mut(image, (left, top), (left, bottom), AXIS);
    draw_line_segment_mut(image, (left, bottom), (right, bottom), AXIS);

    let (tw, _) = text_size(scale, font, &self.x_label);
    draw_text_mut(
      image,
      AXIS,
      ((left + right) / 2.0) as i32 - tw as i32 / 2,
      HEIGHT as i32 - 24,
      scale,
      font,
      &self.x_label,
    );
    draw_text_mut(image, AXIS, 8, (top - 20.0) as i32, scale, font, &self.y_label);

    let title_scale = PxScale::from(20.0);
    let (tw, _) = text_size(title_scale, font, &self.title);
    draw_text_mut(
      image,
      AXIS,
      (WIDTH as i32 - tw as i32) / 2,
      12,
      title_scale,
      font,
      &self.title,
    );
  }

  fn draw_legend(&self, image: &mut RgbImage, font: &FontRef) {
    let scale = PxScale::from(14.0);
    let mut y = MARGIN_TOP as i32 + 6;
    for series in &self.series {
      let (tw, _) = text_size(scale, font, &series.name);
      let x = WIDTH as i32 - MARGIN_RIGHT as i32 - tw as i32 - 24;
      draw_filled_rect_mut(image, Rect::at(x, y + 4).of_size(12, 8), series.color);
      draw_text_mut(image, AXIS, x + 16, y, scale, font, &series.name);
      y += 20;
    }
  }

  pub fn render(&self, font: &FontRef) -> RgbImage {
    let mut image = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);
    let plot = self.plot();
    self.draw_axes(&mut image, &plot, font);

    for series in &self.series {
      let pixels: Vec<_> = series.points.iter().map(|&p| plot.to_pixel(p)).collect();
      match pixels.as_slice() {
        [] => {}
        [only] => draw_filled_circle_mut(&mut image, (only.0 as i32, only.1 as i32), 3, series.color),
        _ => {
          for pair in pixels.windows(2) {
            draw_line_segment_mut(&mut image, pair[0], pair[1], series.color);
            // 加粗一个像素
            draw_line_segment_mut(
              &mut image,
              (pair[0].0, pair[0].1 + 1.0),
              (pair[1].0, pair[1].1 + 1.0),
              series.color,
            );
          }
        }
      }
    }

    self.draw_legend(&mut image, font);
    image
  }

  pub fn save(&self, path: &Path) -> Result<(), ChartError> {
    let font = embedded_font().map_err(|_| ChartError::FontLoadError)?;
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)?;
      }
    }
    self.render(&font).save(path)?;
    info!("图表已保存: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn span_handles_flat_and_empty_data() {
    assert_eq!(span([3.0, 3.0].into_iter()), (2.0, 4.0));
    assert_eq!(span(std::iter::empty()), (0.0, 1.0));
    assert_eq!(span([1.0, f32::NAN, 5.0].into_iter()), (1.0, 5.0));
  }

  #[test]
  fn series_are_drawn_in_their_color() {
    let font = embedded_font().unwrap();
    let chart = LineChart::new("Mismatch", "Frame", "Mismatch")
      .y_range(0.0, 1.0)
      .series(Series::new("a", GREEN, vec![(0.0, 0.5), (10.0, 0.5)]));
    let image = chart.render(&font);
    assert_eq!(image.dimensions(), (WIDTH, HEIGHT));

    let plot = chart.plot();
    let (x, y) = plot.to_pixel((5.0, 0.5));
    assert_eq!(*image.get_pixel(x as u32, y as u32), GREEN);
  }

  #[test]
  fn save_writes_png() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("charts/benchmark_plot.png");
    LineChart::new("t", "x", "y")
      .series(Series::new("s", BLUE, vec![(0.0, 1.0)]))
      .save(&path)
      .unwrap();
    assert_eq!(image::image_dimensions(&path).unwrap(), (WIDTH, HEIGHT));
  }
}
