// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/model/color_ball.rs - 颜色阈值球定位
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

use std::convert::Infallible;

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::{
  distance_transform::Norm,
  filter::gaussian_blur_f32,
  morphology::open,
  region_labelling::{Connectivity, connected_components},
};
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::VideoFrame,
  model::{BallLocatorError, BallPosition, Model},
};

const DEFAULT_MIN_RADIUS: f32 = 10.0;
const BLUR_SIGMA: f32 = 2.0;

/// HSV 绿色区间：色相（度）、饱和度、明度
const HUE_RANGE: (f32, f32) = (58.0, 128.0);
const MIN_SATURATION: f32 = 0.337;
const MIN_VALUE: f32 = 0.0235;

/// 按颜色阈值找球：取最大的绿色连通区域，返回其质心
#[derive(Debug, Clone)]
pub struct ColorBallLocator {
  min_radius: f32,
}

impl Default for ColorBallLocator {
  fn default() -> Self {
    ColorBallLocator {
      min_radius: DEFAULT_MIN_RADIUS,
    }
  }
}

impl FromUrlWithScheme for ColorBallLocator {
  const SCHEME: &'static str = "color";
}

impl FromUrl for ColorBallLocator {
  type Error = BallLocatorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(BallLocatorError::SchemeMismatch(url.scheme().to_string()));
    }

    let mut locator = ColorBallLocator::default();
    if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "min_radius") {
      locator.min_radius = v
        .parse::<f32>()
        .ok()
        .filter(|r| r.is_finite() && *r >= 0.0)
        .ok_or_else(|| BallLocatorError::InvalidParameter(format!("min_radius={}", v)))?;
    }
    Ok(locator)
  }
}

fn is_ball_color(pixel: &Rgb<u8>) -> bool {
  let [r, g, b] = pixel.0.map(|c| c as f32 / 255.0);
  let max = r.max(g).max(b);
  let min = r.min(g).min(b);
  let delta = max - min;

  if max < MIN_VALUE || max == 0.0 || delta / max < MIN_SATURATION {
    return false;
  }

  let hue = if max == r {
    60.0 * ((g - b) / delta).rem_euclid(6.0)
  } else if max == g {
    60.0 * ((b - r) / delta + 2.0)
  } else {
    60.0 * ((r - g) / delta + 4.0)
  };
  (HUE_RANGE.0..=HUE_RANGE.1).contains(&hue)
}

fn ball_mask(image: &RgbImage) -> GrayImage {
  let blurred = gaussian_blur_f32(image, BLUR_SIGMA);
  let mask = GrayImage::from_fn(blurred.width(), blurred.height(), |x, y| {
    if is_ball_color(blurred.get_pixel(x, y)) {
      Luma([255])
    } else {
      Luma([0])
    }
  });
  // 开运算去掉零散噪点
  open(&mask, Norm::LInf, 2)
}

impl ColorBallLocator {
  pub fn new(min_radius: f32) -> Self {
    ColorBallLocator { min_radius }
  }

  pub fn locate(&self, image: &RgbImage) -> Option<BallPosition> {
    let mask = ball_mask(image);
    let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

    // 每个连通区域: (像素数, x 和, y 和)
    let mut regions: Vec<(u64, u64, u64)> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
      let id = label[0] as usize;
      if id == 0 {
        continue;
      }
      if regions.len() < id {
        regions.resize(id, (0, 0, 0));
      }
      let region = &mut regions[id - 1];
      region.0 += 1;
      region.1 += x as u64;
      region.2 += y as u64;
    }

    let (area, sum_x, sum_y) = regions.into_iter().max_by_key(|r| r.0)?;
    let radius = (area as f32 / std::f32::consts::PI).sqrt();
    if radius <= self.min_radius {
      debug!("候选区域过小: 半径 {:.1}", radius);
      return None;
    }

    Some(BallPosition {
      x: (sum_x as f64 / area as f64).round() as u32,
      y: (sum_y as f64 / area as f64).round() as u32,
    })
  }
}

impl Model for ColorBallLocator {
  type Input = VideoFrame;
  type Output = Option<BallPosition>;
  type Error = Infallible;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    Ok(self.locate(&input.image))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use imageproc::drawing::draw_filled_circle_mut;

  #[test]
  fn green_is_ball_color() {
    assert!(is_ball_color(&Rgb([30, 200, 40])));
    assert!(!is_ball_color(&Rgb([200, 30, 40])));
    assert!(!is_ball_color(&Rgb([120, 120, 120])));
    assert!(!is_ball_color(&Rgb([0, 0, 0])));
  }

  #[test]
  fn finds_green_ball_centre() {
    let mut image = RgbImage::from_pixel(160, 120, Rgb([90, 60, 50]));
    draw_filled_circle_mut(&mut image, (100, 40), 20, Rgb([20, 220, 30]));

    let ball = ColorBallLocator::default().locate(&image).unwrap();
    assert!(ball.x.abs_diff(100) <= 1, "{:?}", ball);
    assert!(ball.y.abs_diff(40) <= 1, "{:?}", ball);
  }

  #[test]
  fn small_blob_is_rejected() {
    let mut image = RgbImage::from_pixel(160, 120, Rgb([90, 60, 50]));
    draw_filled_circle_mut(&mut image, (50, 50), 6, Rgb([20, 220, 30]));
    assert_eq!(ColorBallLocator::default().locate(&image), None);
    assert!(ColorBallLocator::new(2.0).locate(&image).is_some());
  }

  #[test]
  fn min_radius_from_query() {
    let url = Url::parse("color:?min_radius=4.5").unwrap();
    assert_eq!(ColorBallLocator::from_url(&url).unwrap().min_radius, 4.5);
    let bad = Url::parse("color:?min_radius=-3").unwrap();
    assert!(ColorBallLocator::from_url(&bad).is_err());
  }
}
