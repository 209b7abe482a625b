// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/metrics.rs - 姿态指标
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

//! 姿态指标
//!
//! 由两组关键点计算教练准确率、学员准确率与姿态相似度。纯计算，无状态。

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::model::{Keypoint, Pose};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;

/// 关键点距离的归约方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimilarityPolicy {
  /// `max(0, 100 - 平均距离)`，越大越相似，上限 100
  #[default]
  BoundedScore,
  /// 平均距离，越小越相似，无上限
  MeanDistance,
}

impl SimilarityPolicy {
  /// 两组完全相同的关键点得到的值
  pub fn identity(self) -> f32 {
    match self {
      SimilarityPolicy::BoundedScore => 100.0,
      SimilarityPolicy::MeanDistance => 0.0,
    }
  }

  fn reduce(self, mean_distance: f32) -> f32 {
    match self {
      SimilarityPolicy::BoundedScore => (100.0 - mean_distance).max(0.0),
      SimilarityPolicy::MeanDistance => mean_distance,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseComparison {
  pub coach_accuracy: f32,
  pub student_accuracy: f32,
  pub pose_similarity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseMetrics {
  pub threshold: f32,
  pub policy: SimilarityPolicy,
}

impl Default for PoseMetrics {
  fn default() -> Self {
    PoseMetrics {
      threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      policy: SimilarityPolicy::default(),
    }
  }
}

impl PoseMetrics {
  pub fn new(threshold: f32, policy: SimilarityPolicy) -> Self {
    PoseMetrics { threshold, policy }
  }

  fn visible<'a>(&self, pose: &'a Pose) -> impl Iterator<Item = &'a Keypoint> + use<'a> {
    let threshold = self.threshold;
    pose.keypoints.iter().filter(move |kp| kp.score > threshold)
  }

  /// 置信度高于阈值的关键点占比（%），空关键点集为 0
  pub fn accuracy(&self, pose: &Pose) -> f32 {
    let total = pose.keypoints.len();
    if total == 0 {
      return 0.0;
    }
    let visible = self.visible(pose).count();
    if visible == total {
      100.0
    } else {
      (visible as f32 / total as f32 * 100.0).min(100.0)
    }
  }

  /// 按下标对应的关键点距离相似度；可见点为空或数量不一致时为 0
  pub fn similarity(&self, coach: &Pose, student: &Pose) -> f32 {
    let coach: Vec<_> = self.visible(coach).collect();
    let student: Vec<_> = self.visible(student).collect();
    if coach.is_empty() || student.is_empty() || coach.len() != student.len() {
      return 0.0;
    }

    let total: f32 = coach
      .iter()
      .zip(&student)
      .map(|(a, b)| ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt())
      .sum();
    self.policy.reduce(total / coach.len() as f32)
  }

  pub fn compare(&self, coach: &Pose, student: &Pose) -> PoseComparison {
    PoseComparison {
      coach_accuracy: self.accuracy(coach),
      student_accuracy: self.accuracy(student),
      pose_similarity: self.similarity(coach, student),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pose(points: &[(f32, f32, f32)]) -> Pose {
    points
      .iter()
      .map(|&(x, y, s)| Keypoint::new(x, y, s))
      .collect::<Vec<_>>()
      .into()
  }

  /// 简单的确定性伪随机关键点集
  fn generated(seed: u32, len: usize) -> Pose {
    let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
    let mut next = || {
      state ^= state << 13;
      state ^= state >> 17;
      state ^= state << 5;
      (state % 1000) as f32 / 1000.0
    };
    (0..len)
      .map(|_| Keypoint::new(next(), next(), next()))
      .collect::<Vec<_>>()
      .into()
  }

  #[test]
  fn accuracy_is_a_percentage() {
    let metrics = PoseMetrics::default();
    for seed in 0..200 {
      let p = generated(seed, 1 + seed as usize % 17);
      let acc = metrics.accuracy(&p);
      assert!((0.0..=100.0).contains(&acc));
      let all_visible = p.keypoints.iter().all(|kp| kp.score > metrics.threshold);
      assert_eq!(acc == 100.0, all_visible, "seed {}", seed);
    }
  }

  #[test]
  fn accuracy_threshold_is_strict() {
    let metrics = PoseMetrics::default();
    let p = pose(&[(0.1, 0.1, 0.3), (0.2, 0.2, 0.31), (0.3, 0.3, 0.9), (0.4, 0.4, 0.0)]);
    assert_eq!(metrics.accuracy(&p), 50.0);
    assert_eq!(metrics.accuracy(&Pose::empty()), 0.0);
  }

  #[test]
  fn similarity_is_reflexive() {
    for policy in [SimilarityPolicy::BoundedScore, SimilarityPolicy::MeanDistance] {
      let metrics = PoseMetrics::new(0.3, policy);
      for seed in 0..100 {
        let p = generated(seed, 17);
        if metrics.visible(&p).next().is_none() {
          continue;
        }
        assert_eq!(metrics.similarity(&p, &p), policy.identity());
      }
    }
  }

  #[test]
  fn visibility_mismatch_is_zero() {
    for policy in [SimilarityPolicy::BoundedScore, SimilarityPolicy::MeanDistance] {
      let metrics = PoseMetrics::new(0.3, policy);
      let coach = pose(&[(0.1, 0.1, 0.9), (0.5, 0.5, 0.9)]);
      let student = pose(&[(0.1, 0.1, 0.9), (0.5, 0.5, 0.1)]);
      assert_eq!(metrics.similarity(&coach, &student), 0.0);
      assert_eq!(metrics.similarity(&coach, &Pose::empty()), 0.0);
      assert_eq!(metrics.similarity(&Pose::empty(), &Pose::empty()), 0.0);
    }
  }

  #[test]
  fn distance_reduction() {
    let coach = pose(&[(0.0, 0.0, 0.9), (0.0, 0.0, 0.9)]);
    let student = pose(&[(3.0, 4.0, 0.9), (0.0, 0.0, 0.9)]);

    let mean = PoseMetrics::new(0.3, SimilarityPolicy::MeanDistance);
    assert!((mean.similarity(&coach, &student) - 2.5).abs() < 1e-6);

    let bounded = PoseMetrics::default();
    assert!((bounded.similarity(&coach, &student) - 97.5).abs() < 1e-4);

    let far = pose(&[(300.0, 400.0, 0.9), (0.0, 0.0, 0.9)]);
    assert_eq!(bounded.similarity(&coach, &far), 0.0);
  }

  #[test]
  fn compare_fills_all_fields() {
    let metrics = PoseMetrics::default();
    let coach = pose(&[(0.1, 0.1, 0.9), (0.5, 0.5, 0.9)]);
    let result = metrics.compare(&coach, &Pose::empty());
    assert_eq!(result.coach_accuracy, 100.0);
    assert_eq!(result.student_accuracy, 0.0);
    assert_eq!(result.pose_similarity, 0.0);
  }
}
