// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/compare.rs - 逐帧比对
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

//! 逐帧比对
//!
//! 两路视频按帧序号对齐，每对帧调用关键点、球定位、动作标签三种能力，
//! 合成一条 [`FrameRecord`]。任一路读不出帧即结束；单帧上的能力失败
//! 以占位值代替，不会中断整个会话。

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
  frame::VideoFrame,
  input::InputError,
  metrics::PoseMetrics,
  model::{ActionComparison, ActionModel, BallPosition, Model, Pose},
  session::DrillId,
};

/// 一对帧的比对结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
  pub drill_id: DrillId,
  pub frame_index: u64,
  pub coach_accuracy: f32,
  pub student_accuracy: f32,
  pub pose_similarity: f32,
  pub coach_ball: Option<BallPosition>,
  pub student_ball: Option<BallPosition>,
  pub coach_label: String,
  pub student_label: String,
  pub semantic_similarity: f32,
}

impl FrameRecord {
  pub fn label_mismatch(&self) -> bool {
    self.coach_label != self.student_label
  }

  /// 叠加在视频上的动作标签对
  pub fn action_pair(&self) -> String {
    format!("{} vs {}", self.coach_label, self.student_label)
  }
}

/// 逐帧比对器，持有三种能力的引用与指标配置
pub struct FrameComparator<'a, P, B, A> {
  keypoints: &'a P,
  ball: &'a B,
  action: &'a A,
  metrics: PoseMetrics,
}

impl<P, B, A> Clone for FrameComparator<'_, P, B, A> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<P, B, A> Copy for FrameComparator<'_, P, B, A> {}

impl<'a, P, B, A> FrameComparator<'a, P, B, A>
where
  P: Model<Input = VideoFrame, Output = Pose> + Sync,
  P::Error: Display,
  B: Model<Input = VideoFrame, Output = Option<BallPosition>> + Sync,
  B::Error: Display,
  A: ActionModel + Sync,
  A::Error: Display,
{
  pub fn new(keypoints: &'a P, ball: &'a B, action: &'a A, metrics: PoseMetrics) -> Self {
    FrameComparator {
      keypoints,
      ball,
      action,
      metrics,
    }
  }

  pub fn metrics(&self) -> PoseMetrics {
    self.metrics
  }

  fn pose_of(&self, frame: &VideoFrame, role: &str) -> Pose {
    self.keypoints.infer(frame).unwrap_or_else(|e| {
      warn!("第 {} 帧{}关键点提取失败: {}", frame.index, role, e);
      Pose::empty()
    })
  }

  fn ball_of(&self, frame: &VideoFrame, role: &str) -> Option<BallPosition> {
    self.ball.infer(frame).unwrap_or_else(|e| {
      warn!("第 {} 帧{}球定位失败: {}", frame.index, role, e);
      None
    })
  }

  fn actions_of(&self, coach: &VideoFrame, student: &VideoFrame) -> ActionComparison {
    self
      .action
      .compare_actions(coach, student)
      .unwrap_or_else(|e| {
        warn!("第 {} 帧动作标签失败: {}", coach.index, e);
        ActionComparison::unknown()
      })
  }

  /// 比对一对帧，三种能力并发调用，全部返回后再合成记录
  pub fn compare_pair(
    &self,
    drill_id: DrillId,
    frame_index: u64,
    coach: &VideoFrame,
    student: &VideoFrame,
  ) -> FrameRecord {
    let ((coach_pose, student_pose), ((coach_ball, student_ball), actions)) = rayon::join(
      || {
        (
          self.pose_of(coach, "教练"),
          self.pose_of(student, "学员"),
        )
      },
      || {
        rayon::join(
          || (self.ball_of(coach, "教练"), self.ball_of(student, "学员")),
          || self.actions_of(coach, student),
        )
      },
    );

    let pose = self.metrics.compare(&coach_pose, &student_pose);
    debug!(
      "{} 第 {} 帧: 教练 {:.1}% 学员 {:.1}% 相似度 {:.2}",
      drill_id, frame_index, pose.coach_accuracy, pose.student_accuracy, pose.pose_similarity
    );

    FrameRecord {
      drill_id,
      frame_index,
      coach_accuracy: pose.coach_accuracy,
      student_accuracy: pose.student_accuracy,
      pose_similarity: pose.pose_similarity,
      coach_ball,
      student_ball,
      coach_label: actions.coach_label,
      student_label: actions.student_label,
      semantic_similarity: actions.similarity,
    }
  }

  /// 惰性比对两路视频，返回的迭代器只能遍历一次
  pub fn run<C, S>(&self, drill_id: DrillId, coach: C, student: S) -> ComparisonRun<'a, P, B, A, C, S>
  where
    C: Iterator<Item = Result<VideoFrame, InputError>>,
    S: Iterator<Item = Result<VideoFrame, InputError>>,
  {
    info!("开始比对 {}", drill_id);
    ComparisonRun {
      comparator: *self,
      drill_id,
      coach,
      student,
      next_index: 0,
      finished: false,
    }
  }
}

pub struct ComparisonRun<'a, P, B, A, C, S> {
  comparator: FrameComparator<'a, P, B, A>,
  drill_id: DrillId,
  coach: C,
  student: S,
  next_index: u64,
  finished: bool,
}

impl<P, B, A, C, S> ComparisonRun<'_, P, B, A, C, S> {
  /// 已产出的记录数
  pub fn emitted(&self) -> u64 {
    self.next_index
  }

  fn read(&mut self, frame: Option<Result<VideoFrame, InputError>>, role: &str) -> Option<VideoFrame> {
    match frame {
      Some(Ok(frame)) => Some(frame),
      Some(Err(e)) => {
        warn!("{} {}视频第 {} 帧读取失败，结束比对: {}", self.drill_id, role, self.next_index, e);
        None
      }
      None => {
        info!("{} {}视频结束，共比对 {} 帧", self.drill_id, role, self.next_index);
        None
      }
    }
  }
}

impl<'a, P, B, A, C, S> Iterator for ComparisonRun<'a, P, B, A, C, S>
where
  P: Model<Input = VideoFrame, Output = Pose> + Sync,
  P::Error: Display,
  B: Model<Input = VideoFrame, Output = Option<BallPosition>> + Sync,
  B::Error: Display,
  A: ActionModel + Sync,
  A::Error: Display,
  C: Iterator<Item = Result<VideoFrame, InputError>>,
  S: Iterator<Item = Result<VideoFrame, InputError>>,
{
  type Item = FrameRecord;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    let coach = self.coach.next();
    let coach = self.read(coach, "教练");
    let student = match coach {
      Some(_) => {
        let student = self.student.next();
        self.read(student, "学员")
      }
      None => None,
    };

    let (Some(coach), Some(student)) = (coach, student) else {
      self.finished = true;
      return None;
    };

    let index = self.next_index;
    self.next_index += 1;
    Some(
      self
        .comparator
        .compare_pair(self.drill_id, index, &coach, &student),
    )
  }
}

impl<P, B, A, C, S> std::iter::FusedIterator for ComparisonRun<'_, P, B, A, C, S>
where
  Self: Iterator,
{
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::metrics::SimilarityPolicy;
  use crate::model::Keypoint;
  use image::RgbImage;

  struct FixedPose;

  impl Model for FixedPose {
    type Input = VideoFrame;
    type Output = Pose;
    type Error = String;

    fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
      if input.index == 2 {
        return Err("模型超时".to_string());
      }
      Ok(vec![Keypoint::new(0.5, 0.5, 0.9), Keypoint::new(0.2, 0.4, 0.8)].into())
    }
  }

  struct NoBall;

  impl Model for NoBall {
    type Input = VideoFrame;
    type Output = Option<BallPosition>;
    type Error = String;

    fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
      Ok(None)
    }
  }

  struct SameAction;

  impl ActionModel for SameAction {
    type Error = String;

    fn compare_actions(
      &self,
      _coach: &VideoFrame,
      _student: &VideoFrame,
    ) -> Result<ActionComparison, Self::Error> {
      Ok(ActionComparison {
        coach_label: "kicking".into(),
        student_label: "kicking".into(),
        similarity: 0.95,
      })
    }
  }

  fn stream(count: u64) -> impl Iterator<Item = Result<VideoFrame, InputError>> {
    (0..count).map(|i| Ok(VideoFrame::new(RgbImage::new(4, 4), i, 25.0)))
  }

  #[test]
  fn shorter_stream_bounds_the_run() {
    let metrics = PoseMetrics::default();
    let comparator = FrameComparator::new(&FixedPose, &NoBall, &SameAction, metrics);
    let records: Vec<_> = comparator.run(DrillId(1), stream(10), stream(7)).collect();
    assert_eq!(records.len(), 7);
    for (i, r) in records.iter().enumerate() {
      assert_eq!(r.frame_index, i as u64);
      assert_eq!(r.drill_id, DrillId(1));
    }
  }

  #[test]
  fn capability_failure_becomes_sentinel() {
    let metrics = PoseMetrics::new(0.3, SimilarityPolicy::BoundedScore);
    let comparator = FrameComparator::new(&FixedPose, &NoBall, &SameAction, metrics);
    let records: Vec<_> = comparator.run(DrillId(2), stream(4), stream(4)).collect();
    assert_eq!(records.len(), 4);

    assert_eq!(records[1].pose_similarity, 100.0);
    assert_eq!(records[2].coach_accuracy, 0.0);
    assert_eq!(records[2].pose_similarity, 0.0);
    assert_eq!(records[2].coach_label, "kicking");
    assert!(records.iter().all(|r| r.coach_ball.is_none() && r.student_ball.is_none()));
  }

  #[test]
  fn decode_error_ends_the_run() {
    let comparator = FrameComparator::new(&FixedPose, &NoBall, &SameAction, PoseMetrics::default());
    let broken = stream(3).chain(std::iter::once(Err(InputError::SchemeMismatch))).chain(stream(3));
    let mut run = comparator.run(DrillId(3), broken, stream(10));
    assert_eq!(run.by_ref().count(), 3);
    assert_eq!(run.emitted(), 3);
    assert!(run.next().is_none());
  }
}
