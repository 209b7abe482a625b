// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/model/per_frame.rs - 单帧标签分类
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

use thiserror::Error;

use crate::{
  frame::VideoFrame,
  model::{ActionComparison, ActionModel, LabelScores, Model},
};

#[derive(Error, Debug)]
pub enum PerFrameError<E> {
  #[error("Model error: {0}")]
  ModelError(E),
  #[error("得分向量长度 {actual} 与词表长度 {expected} 不一致")]
  VocabularyMismatch { expected: usize, actual: usize },
}

/// 单视频模式：两侧各自在固定词表上分类，再比较两个得分向量
pub struct PerFrameClassifier<M> {
  model: M,
  labels: Vec<String>,
}

impl<M> PerFrameClassifier<M>
where
  M: Model<Input = VideoFrame, Output = LabelScores>,
{
  pub fn new(model: M, labels: Vec<String>) -> Self {
    PerFrameClassifier { model, labels }
  }

  /// 返回最佳标签与完整得分向量
  pub fn classify(&self, frame: &VideoFrame) -> Result<(String, LabelScores), PerFrameError<M::Error>> {
    let scores = self.model.infer(frame).map_err(PerFrameError::ModelError)?;
    if scores.scores.len() != self.labels.len() {
      return Err(PerFrameError::VocabularyMismatch {
        expected: self.labels.len(),
        actual: scores.scores.len(),
      });
    }
    let best = argmax(&scores.scores)
      .map(|i| self.labels[i].clone())
      .unwrap_or_else(|| crate::model::UNKNOWN_LABEL.to_string());
    Ok((best, scores))
  }
}

fn argmax(scores: &[f32]) -> Option<usize> {
  scores
    .iter()
    .enumerate()
    .filter(|(_, s)| !s.is_nan())
    .max_by(|a, b| a.1.total_cmp(b.1))
    .map(|(i, _)| i)
}

/// 余弦相似度，任一向量范数为 0 时为 0
fn cosine(a: &[f32], b: &[f32]) -> f32 {
  let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
  let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
  let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
  if norm_a == 0.0 || norm_b == 0.0 {
    0.0
  } else {
    dot / (norm_a * norm_b)
  }
}

impl<M> ActionModel for PerFrameClassifier<M>
where
  M: Model<Input = VideoFrame, Output = LabelScores>,
{
  type Error = PerFrameError<M::Error>;

  fn compare_actions(
    &self,
    coach: &VideoFrame,
    student: &VideoFrame,
  ) -> Result<ActionComparison, Self::Error> {
    let (coach_label, coach_scores) = self.classify(coach)?;
    let (student_label, student_scores) = self.classify(student)?;
    Ok(ActionComparison {
      coach_label,
      student_label,
      similarity: cosine(&coach_scores.scores, &student_scores.scores),
    })
  }
}
