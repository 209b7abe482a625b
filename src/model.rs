// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/model.rs - 模型
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
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::VideoFrame};

/// 单帧推理能力
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 动作标签比对能力：对一组教练 / 学员帧给出各自标签与语义相似度
pub trait ActionModel {
  type Error;

  fn compare_actions(
    &self,
    coach: &VideoFrame,
    student: &VideoFrame,
  ) -> Result<ActionComparison, Self::Error>;
}

/// 身体关键点，坐标归一化到 [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
  pub x: f32,
  pub y: f32,
  pub score: f32,
}

impl Keypoint {
  pub fn new(x: f32, y: f32, score: f32) -> Self {
    Keypoint { x, y, score }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pose {
  pub keypoints: Box<[Keypoint]>,
}

impl Pose {
  /// 未检测到人体
  pub fn empty() -> Self {
    Pose::default()
  }

  pub fn is_empty(&self) -> bool {
    self.keypoints.is_empty()
  }
}

impl From<Vec<Keypoint>> for Pose {
  fn from(keypoints: Vec<Keypoint>) -> Self {
    Pose {
      keypoints: keypoints.into_boxed_slice(),
    }
  }
}

/// 球心像素坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallPosition {
  pub x: u32,
  pub y: u32,
}

impl fmt::Display for BallPosition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "({}, {})", self.x, self.y)
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("无法解析球坐标: {0:?}")]
pub struct ParseBallPositionError(String);

impl FromStr for BallPosition {
  type Err = ParseBallPositionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let err = || ParseBallPositionError(s.to_string());
    let inner = s
      .trim()
      .strip_prefix('(')
      .and_then(|s| s.strip_suffix(')'))
      .ok_or_else(err)?;
    let (x, y) = inner.split_once(',').ok_or_else(err)?;
    Ok(BallPosition {
      x: x.trim().parse().map_err(|_| err())?,
      y: y.trim().parse().map_err(|_| err())?,
    })
  }
}

/// 单帧在标签词表上的得分向量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelScores {
  pub scores: Box<[f32]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionComparison {
  pub coach_label: String,
  pub student_label: String,
  pub similarity: f32,
}

impl ActionComparison {
  /// 标签比对失败时的占位值
  pub fn unknown() -> Self {
    ActionComparison {
      coach_label: UNKNOWN_LABEL.to_string(),
      student_label: UNKNOWN_LABEL.to_string(),
      similarity: 0.0,
    }
  }
}

pub const UNKNOWN_LABEL: &str = "unknown";

pub const DEFAULT_LABELS: [&str; 5] = ["kicking", "dribbling", "standing", "running", "jumping"];

mod color_ball;
pub use self::color_ball::ColorBallLocator;

mod per_frame;
pub use self::per_frame::{PerFrameClassifier, PerFrameError};

mod process;
pub use self::process::{ProcessModel, ProcessModelBuilder, ProcessModelError};

/// 关键点提取能力
pub type KeypointModel = ProcessModel<Pose>;

#[derive(Error, Debug)]
pub enum BallLocatorError {
  #[error("Process model error: {0}")]
  ProcessModelError(#[from] ProcessModelError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
  #[error("Invalid parameter {0}")]
  InvalidParameter(String),
}

const DISABLED_SCHEME: &str = "none";

/// 球定位能力，按 URL 方案选择实现
pub enum BallLocatorWrapper {
  Color(ColorBallLocator),
  Process(ProcessModel<Option<BallPosition>>),
  Disabled,
}

impl FromUrl for BallLocatorWrapper {
  type Error = BallLocatorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ColorBallLocator::SCHEME => Ok(BallLocatorWrapper::Color(ColorBallLocator::from_url(url)?)),
      ProcessModelBuilder::SCHEME => Ok(BallLocatorWrapper::Process(ProcessModel::from_url(url)?)),
      DISABLED_SCHEME => Ok(BallLocatorWrapper::Disabled),
      other => Err(BallLocatorError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Model for BallLocatorWrapper {
  type Input = VideoFrame;
  type Output = Option<BallPosition>;
  type Error = BallLocatorError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    match self {
      BallLocatorWrapper::Color(locator) => match locator.infer(input) {
        Ok(ball) => Ok(ball),
        Err(never) => match never {},
      },
      BallLocatorWrapper::Process(model) => Ok(model.infer(input)?),
      BallLocatorWrapper::Disabled => Ok(None),
    }
  }
}

#[derive(Error, Debug)]
pub enum ActionModelError {
  #[error("Process model error: {0}")]
  ProcessModelError(#[from] ProcessModelError),
  #[error("Per-frame classifier error: {0}")]
  PerFrameError(#[from] PerFrameError<ProcessModelError>),
}

/// 动作标签能力
///
/// - 成对模式：`exec:///opt/clip-pair-server`，一次请求带两帧，直接返回 [`ActionComparison`]
/// - 单帧模式：`exec:///opt/clip-server?mode=single&labels=kicking,running`，
///   每帧返回词表上的得分向量，见 [`PerFrameClassifier`]
pub enum ActionModelWrapper {
  Pair(ProcessModel<ActionComparison>),
  Single(PerFrameClassifier<ProcessModel<LabelScores>>),
}

impl FromUrl for ActionModelWrapper {
  type Error = ActionModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let single = url
      .query_pairs()
      .any(|(k, v)| k == "mode" && v == "single");
    if !single {
      return Ok(ActionModelWrapper::Pair(ProcessModel::from_url(url)?));
    }

    let labels = url
      .query_pairs()
      .find(|(k, _)| k == "labels")
      .map(|(_, v)| {
        v.split(',')
          .map(str::trim)
          .filter(|l| !l.is_empty())
          .map(String::from)
          .collect::<Vec<_>>()
      })
      .filter(|labels| !labels.is_empty())
      .unwrap_or_else(|| DEFAULT_LABELS.iter().map(|l| l.to_string()).collect());

    let model = ProcessModel::from_url(url)?;
    Ok(ActionModelWrapper::Single(PerFrameClassifier::new(
      model, labels,
    )))
  }
}

impl ActionModel for ActionModelWrapper {
  type Error = ActionModelError;

  fn compare_actions(
    &self,
    coach: &VideoFrame,
    student: &VideoFrame,
  ) -> Result<ActionComparison, Self::Error> {
    match self {
      ActionModelWrapper::Pair(model) => Ok(model.compare_actions(coach, student)?),
      ActionModelWrapper::Single(classifier) => Ok(classifier.compare_actions(coach, student)?),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ball_position_text_form() {
    let ball = BallPosition { x: 120, y: 48 };
    assert_eq!(ball.to_string(), "(120, 48)");
    assert_eq!("(120, 48)".parse::<BallPosition>(), Ok(ball));
    assert_eq!(" (120,48) ".parse::<BallPosition>(), Ok(ball));
    assert!("120, 48".parse::<BallPosition>().is_err());
    assert!("(a, 48)".parse::<BallPosition>().is_err());
  }

  #[test]
  fn pose_is_a_plain_json_array() {
    let pose: Pose = serde_json::from_str(r#"[{"x":0.1,"y":0.2,"score":0.8}]"#).unwrap();
    assert_eq!(pose.keypoints[0], Keypoint::new(0.1, 0.2, 0.8));
    assert!(Pose::empty().is_empty());
  }

  #[test]
  fn disabled_ball_locator_finds_nothing() {
    let locator = BallLocatorWrapper::from_url(&Url::parse("none:").unwrap()).unwrap();
    let frame = VideoFrame::new(image::RgbImage::new(4, 4), 0, 25.0);
    assert_eq!(locator.infer(&frame).unwrap(), None);
  }

  #[test]
  fn unknown_ball_scheme_is_rejected() {
    let url = Url::parse("hough:///x").unwrap();
    assert!(matches!(
      BallLocatorWrapper::from_url(&url),
      Err(BallLocatorError::SchemeMismatch(s)) if s == "hough"
    ));
  }
}
