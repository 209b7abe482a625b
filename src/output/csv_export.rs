// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/output/csv_export.rs - 逐帧记录 CSV 导出
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

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::{
  compare::FrameRecord,
  model::{BallPosition, ParseBallPositionError},
  session::DrillId,
};

#[derive(Error, Debug)]
pub enum CsvExportError {
  #[error("CSV 错误: {0}")]
  CsvError(#[from] csv::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("第 {row} 行球坐标无效: {source}")]
  BallError {
    row: usize,
    source: ParseBallPositionError,
  },
}

/// 列名与 [`FrameRecord`] 字段名一致
pub const HEADER: [&str; 10] = [
  "drill_id",
  "frame_index",
  "coach_accuracy",
  "student_accuracy",
  "pose_similarity",
  "coach_ball",
  "student_ball",
  "coach_label",
  "student_label",
  "semantic_similarity",
];

/// 球坐标写作 `(x, y)`，未检测到时为空
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
  drill_id: DrillId,
  frame_index: u64,
  coach_accuracy: f32,
  student_accuracy: f32,
  pose_similarity: f32,
  coach_ball: Option<String>,
  student_ball: Option<String>,
  coach_label: String,
  student_label: String,
  semantic_similarity: f32,
}

impl From<&FrameRecord> for CsvRow {
  fn from(r: &FrameRecord) -> Self {
    CsvRow {
      drill_id: r.drill_id,
      frame_index: r.frame_index,
      coach_accuracy: r.coach_accuracy,
      student_accuracy: r.student_accuracy,
      pose_similarity: r.pose_similarity,
      coach_ball: r.coach_ball.map(|b| b.to_string()),
      student_ball: r.student_ball.map(|b| b.to_string()),
      coach_label: r.coach_label.clone(),
      student_label: r.student_label.clone(),
      semantic_similarity: r.semantic_similarity,
    }
  }
}

fn parse_ball(value: Option<String>) -> Result<Option<BallPosition>, ParseBallPositionError> {
  match value.as_deref().map(str::trim) {
    None | Some("") => Ok(None),
    Some(text) => text.parse().map(Some),
  }
}

impl CsvRow {
  fn into_record(self, row: usize) -> Result<FrameRecord, CsvExportError> {
    let ball = |v| parse_ball(v).map_err(|source| CsvExportError::BallError { row, source });
    Ok(FrameRecord {
      drill_id: self.drill_id,
      frame_index: self.frame_index,
      coach_accuracy: self.coach_accuracy,
      student_accuracy: self.student_accuracy,
      pose_similarity: self.pose_similarity,
      coach_ball: ball(self.coach_ball)?,
      student_ball: ball(self.student_ball)?,
      coach_label: self.coach_label,
      student_label: self.student_label,
      semantic_similarity: self.semantic_similarity,
    })
  }
}

/// 写出会话的全部记录，已存在的文件会被覆盖
pub fn write_records(path: &Path, records: &[FrameRecord]) -> Result<(), CsvExportError> {
  if let Some(parent) = path.parent() {
    if !parent.as_os_str().is_empty() {
      std::fs::create_dir_all(parent)?;
    }
  }

  // 手动写表头，空会话也有表头
  let mut writer = csv::WriterBuilder::new()
    .has_headers(false)
    .from_path(path)?;
  writer.write_record(HEADER)?;
  for record in records {
    writer.serialize(CsvRow::from(record))?;
  }
  writer.flush()?;

  info!("CSV 已保存: {} ({} 行)", path.display(), records.len());
  Ok(())
}

pub fn read_records(path: &Path) -> Result<Vec<FrameRecord>, CsvExportError> {
  let mut reader = csv::Reader::from_path(path)?;
  reader
    .deserialize::<CsvRow>()
    .enumerate()
    .map(|(i, row)| row?.into_record(i + 1))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(index: u64, ball: Option<BallPosition>) -> FrameRecord {
    FrameRecord {
      drill_id: DrillId(2),
      frame_index: index,
      coach_accuracy: 94.11765,
      student_accuracy: 82.35294,
      pose_similarity: 99.5,
      coach_ball: ball,
      student_ball: None,
      coach_label: "kicking".into(),
      student_label: "running, fast".into(),
      semantic_similarity: 0.912,
    }
  }

  #[test]
  fn header_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/log_drill_2.csv");
    let records = vec![
      record(0, Some(BallPosition { x: 10, y: 20 })),
      record(1, None),
    ];
    write_records(&path, &records).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next().unwrap(), HEADER.join(","));
    let first = lines.next().unwrap();
    assert!(first.starts_with("2,0,"));
    assert!(first.contains("\"(10, 20)\""));

    assert_eq!(read_records(&path).unwrap(), records);
  }

  #[test]
  fn rewriting_replaces_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log_drill_2.csv");
    write_records(&path, &[record(0, None), record(1, None)]).unwrap();
    write_records(&path, &[record(0, None)]).unwrap();
    assert_eq!(read_records(&path).unwrap().len(), 1);
  }

  #[test]
  fn empty_session_still_has_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log_drill_9.csv");
    write_records(&path, &[]).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.trim_end(), HEADER.join(","));
    assert!(read_records(&path).unwrap().is_empty());
  }

  #[test]
  fn bad_ball_cell_reports_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.csv");
    let mut text = HEADER.join(",");
    text.push_str("\n1,0,50,50,100,\"(1, 2)\",,a,a,1\n1,1,50,50,100,oops,,a,a,1\n");
    std::fs::write(&path, text).unwrap();
    assert!(matches!(
      read_records(&path),
      Err(CsvExportError::BallError { row: 2, .. })
    ));
  }
}
