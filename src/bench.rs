// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/bench.rs - 会话汇总与产物生成
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

//! 会话汇总
//!
//! [`DrillBenchmark`] 按帧序号依次接收 [`FrameRecord`]，维护滚动统计，
//! 会话结束后汇总为 [`PlayerSummary`]，并生成 CSV、叠加视频和图表。

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  compare::FrameRecord,
  input::VideoInput,
  output::{
    OutputError, OutputWrapper,
    chart::{self, ChartError, LineChart, Series},
    csv_export::{self, CsvExportError},
    render_overlay,
  },
  session::{ArtifactLayout, DrillId},
};

/// 每隔多少帧输出一次滚动统计
const PROGRESS_EVERY: u64 = 100;

#[derive(Error, Debug)]
pub enum BenchError {
  #[error("{0} 没有任何帧记录，无法汇总")]
  EmptySession(DrillId),
  #[error("帧序号不连续: 期望 {expected}, 实际 {actual}")]
  OutOfOrder { expected: u64, actual: u64 },
  #[error("记录属于 {actual}, 当前会话为 {expected}")]
  DrillMismatch { expected: DrillId, actual: DrillId },
  #[error("CSV 导出错误: {0}")]
  CsvExportError(#[from] CsvExportError),
  #[error("叠加输出错误: {0}")]
  OutputError(#[from] OutputError),
  #[error("图表错误: {0}")]
  ChartError(#[from] ChartError),
}

/// 增量均值
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMean {
  count: u64,
  mean: f64,
}

impl RunningMean {
  pub fn push(&mut self, value: f64) {
    self.count += 1;
    self.mean += (value - self.mean) / self.count as f64;
  }

  pub fn count(&self) -> u64 {
    self.count
  }

  /// 尚无数据时为 `None`
  pub fn mean(&self) -> Option<f64> {
    (self.count > 0).then_some(self.mean)
  }
}

/// 会话滚动统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
  pub coach_accuracy: RunningMean,
  pub student_accuracy: RunningMean,
  pub pose_similarity: RunningMean,
  pub semantic_similarity: RunningMean,
  pub label_mismatches: u64,
  pub coach_ball_hits: u64,
  pub student_ball_hits: u64,
}

impl SessionStats {
  fn push(&mut self, record: &FrameRecord) {
    self.coach_accuracy.push(record.coach_accuracy as f64);
    self.student_accuracy.push(record.student_accuracy as f64);
    self.pose_similarity.push(record.pose_similarity as f64);
    self.semantic_similarity.push(record.semantic_similarity as f64);
    self.label_mismatches += record.label_mismatch() as u64;
    self.coach_ball_hits += record.coach_ball.is_some() as u64;
    self.student_ball_hits += record.student_ball.is_some() as u64;
  }

  pub fn frames(&self) -> u64 {
    self.coach_accuracy.count()
  }

  pub fn mismatch_rate(&self) -> Option<f64> {
    let frames = self.frames();
    (frames > 0).then(|| self.label_mismatches as f64 / frames as f64)
  }
}

impl fmt::Display for SessionStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mean = |m: &RunningMean| m.mean().map_or("-".to_string(), |v| format!("{:.2}", v));
    write!(
      f,
      "帧数 {} | 教练准确率 {} | 学员准确率 {} | 姿态相似度 {} | 语义相似度 {} | 动作不一致 {} | 球检出 {}/{}",
      self.frames(),
      mean(&self.coach_accuracy),
      mean(&self.student_accuracy),
      mean(&self.pose_similarity),
      mean(&self.semantic_similarity),
      self.label_mismatches,
      self.coach_ball_hits,
      self.student_ball_hits,
    )
  }
}

/// 单个球员在单个练习上的汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
  pub player_id: String,
  pub drill_id: DrillId,
  pub coach_average: f64,
  pub student_average: f64,
  pub pose_similarity_average: f64,
  pub created_at: DateTime<Utc>,
}

/// 会话产物
#[derive(Debug, Clone, PartialEq)]
pub struct BenchArtifacts {
  pub csv: PathBuf,
  pub overlay: PathBuf,
  pub overlay_frames: u64,
  pub overlay_drift: bool,
  pub accuracy_chart: PathBuf,
  pub mismatch_chart: PathBuf,
  pub similarity_chart: PathBuf,
}

pub struct DrillBenchmark {
  drill_id: DrillId,
  records: Vec<FrameRecord>,
  stats: SessionStats,
}

impl DrillBenchmark {
  pub fn new(drill_id: DrillId) -> Self {
    DrillBenchmark {
      drill_id,
      records: Vec::new(),
      stats: SessionStats::default(),
    }
  }

  pub fn drill_id(&self) -> DrillId {
    self.drill_id
  }

  /// 追加一条记录，帧序号必须紧接上一条
  pub fn ingest(&mut self, record: FrameRecord) -> Result<(), BenchError> {
    if record.drill_id != self.drill_id {
      return Err(BenchError::DrillMismatch {
        expected: self.drill_id,
        actual: record.drill_id,
      });
    }
    let expected = self.records.len() as u64;
    if record.frame_index != expected {
      return Err(BenchError::OutOfOrder {
        expected,
        actual: record.frame_index,
      });
    }

    self.stats.push(&record);
    self.records.push(record);

    if self.stats.frames() % PROGRESS_EVERY == 0 {
      info!("{} 进度: {}", self.drill_id, self.stats);
    }
    Ok(())
  }

  pub fn records(&self) -> &[FrameRecord] {
    &self.records
  }

  pub fn stats(&self) -> &SessionStats {
    &self.stats
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  /// 三项指标的算术平均；空会话报错而不是返回 0
  pub fn summarize(&self, player_id: &str) -> Result<PlayerSummary, BenchError> {
    if self.records.is_empty() {
      return Err(BenchError::EmptySession(self.drill_id));
    }

    let n = self.records.len() as f64;
    let mean = |f: fn(&FrameRecord) -> f32| self.records.iter().map(|r| f(r) as f64).sum::<f64>() / n;

    let summary = PlayerSummary {
      player_id: player_id.to_string(),
      drill_id: self.drill_id,
      coach_average: mean(|r| r.coach_accuracy),
      student_average: mean(|r| r.student_accuracy),
      pose_similarity_average: mean(|r| r.pose_similarity),
      created_at: Utc::now(),
    };
    debug!("{} 汇总: {:?}", self.drill_id, summary);
    Ok(summary)
  }

  fn points(&self, f: fn(&FrameRecord) -> f32) -> Vec<(f32, f32)> {
    self
      .records
      .iter()
      .map(|r| (r.frame_index as f32, f(r)))
      .collect()
  }

  /// 动作不一致折线的数据点：`(帧序号, 1 或 0)`
  pub fn mismatch_series(&self) -> Vec<(f32, f32)> {
    self.points(|r| r.label_mismatch() as u8 as f32)
  }

  fn save_charts(&self, layout: &ArtifactLayout) -> Result<(), BenchError> {
    let points = |f: fn(&FrameRecord) -> f32| self.points(f);

    LineChart::new("Pose Accuracy Over Time", "Frame", "Accuracy (%)")
      .y_range(0.0, 100.0)
      .series(Series::new("Coach Accuracy", chart::BLUE, points(|r| r.coach_accuracy)))
      .series(Series::new("Student Accuracy", chart::ORANGE, points(|r| r.student_accuracy)))
      .save(&layout.accuracy_chart_path())?;

    LineChart::new("Semantic Action Mismatches", "Frame", "Mismatch")
      .y_range(0.0, 1.0)
      .series(Series::new(
        "Action Mismatch (1 = mismatch)",
        chart::ORANGE,
        self.mismatch_series(),
      ))
      .save(&layout.mismatch_chart_path())?;

    LineChart::new("Semantic Similarity Over Time", "Frame", "Similarity")
      .series(Series::new(
        "Semantic Similarity",
        chart::GREEN,
        points(|r| r.semantic_similarity),
      ))
      .save(&layout.similarity_chart_path())?;

    Ok(())
  }

  /// 生成 CSV、叠加视频与图表，会话状态随之释放
  ///
  /// `student_replay` 为从头重新打开的学员视频。
  pub fn finalize<I: VideoInput>(
    self,
    layout: &ArtifactLayout,
    student_replay: I,
  ) -> Result<BenchArtifacts, BenchError> {
    info!("{} 完成: {}", self.drill_id, self.stats);

    let csv = layout.csv_path(self.drill_id);
    csv_export::write_records(&csv, &self.records)?;

    let overlay_path = layout.overlay_path(self.drill_id);
    let sink = OutputWrapper::create(layout.overlay, &overlay_path, student_replay.info().fps)?;
    let overlay = render_overlay(&self.records, student_replay, &sink)?;
    let overlay_path = sink.finish()?;

    self.save_charts(layout)?;

    Ok(BenchArtifacts {
      csv,
      overlay: overlay_path,
      overlay_frames: overlay.annotated,
      overlay_drift: overlay.drift,
      accuracy_chart: layout.accuracy_chart_path(),
      mismatch_chart: layout.mismatch_chart_path(),
      similarity_chart: layout.similarity_chart_path(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::BallPosition;

  fn record(index: u64, coach: f32, student: f32, sim: f32, labels: (&str, &str)) -> FrameRecord {
    FrameRecord {
      drill_id: DrillId(1),
      frame_index: index,
      coach_accuracy: coach,
      student_accuracy: student,
      pose_similarity: sim,
      coach_ball: Some(BallPosition { x: 1, y: 1 }),
      student_ball: None,
      coach_label: labels.0.into(),
      student_label: labels.1.into(),
      semantic_similarity: 0.5,
    }
  }

  #[test]
  fn running_mean_matches_average() {
    let mut m = RunningMean::default();
    assert_eq!(m.mean(), None);
    for v in [10.0, 20.0, 60.0] {
      m.push(v);
    }
    assert!((m.mean().unwrap() - 30.0).abs() < 1e-9);
  }

  #[test]
  fn summary_is_arithmetic_mean() {
    let mut bench = DrillBenchmark::new(DrillId(1));
    bench.ingest(record(0, 100.0, 50.0, 90.0, ("kicking", "kicking"))).unwrap();
    bench.ingest(record(1, 80.0, 70.0, 70.0, ("kicking", "running"))).unwrap();

    let summary = bench.summarize("player_101").unwrap();
    assert_eq!(summary.player_id, "player_101");
    assert_eq!(summary.drill_id, DrillId(1));
    assert!((summary.coach_average - 90.0).abs() < 1e-9);
    assert!((summary.student_average - 60.0).abs() < 1e-9);
    assert!((summary.pose_similarity_average - 80.0).abs() < 1e-9);

    let stats = bench.stats();
    assert_eq!(stats.frames(), 2);
    assert_eq!(stats.label_mismatches, 1);
    assert_eq!(stats.mismatch_rate(), Some(0.5));
    assert_eq!(stats.coach_ball_hits, 2);
    assert_eq!(stats.student_ball_hits, 0);
  }

  #[test]
  fn empty_session_cannot_be_summarized() {
    let bench = DrillBenchmark::new(DrillId(4));
    assert!(matches!(
      bench.summarize("player_101"),
      Err(BenchError::EmptySession(DrillId(4)))
    ));
  }

  #[test]
  fn ingest_keeps_frame_order() {
    let mut bench = DrillBenchmark::new(DrillId(1));
    assert!(matches!(
      bench.ingest(record(1, 0.0, 0.0, 0.0, ("a", "a"))),
      Err(BenchError::OutOfOrder { expected: 0, actual: 1 })
    ));
    bench.ingest(record(0, 0.0, 0.0, 0.0, ("a", "a"))).unwrap();

    let mut other = record(1, 0.0, 0.0, 0.0, ("a", "a"));
    other.drill_id = DrillId(2);
    assert!(matches!(
      bench.ingest(other),
      Err(BenchError::DrillMismatch { .. })
    ));
    assert_eq!(bench.records().len(), 1);
  }
}
