// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/store/postgres.rs - PostgreSQL 存储
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

//! PostgreSQL 存储
//!
//! 管线本身是同步的，这里持有一个单线程 tokio 运行时，逐条 `block_on`。

use chrono::{DateTime, Utc};
use sqlx::{
  PgPool, Row,
  postgres::{PgPoolOptions, PgRow},
};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl,
  bench::PlayerSummary,
  compare::FrameRecord,
  model::BallPosition,
  session::DrillId,
  store::{InsertOutcome, POSTGRES_SCHEMES, Store, StoreError},
};

const MAX_CONNECTIONS: u32 = 4;

const CREATE_PERFORMANCE: &str = r#"
CREATE TABLE IF NOT EXISTS performance (
  id SERIAL PRIMARY KEY,
  drill_id INTEGER NOT NULL,
  frame_num BIGINT NOT NULL,
  coach_acc REAL NOT NULL,
  student_acc REAL NOT NULL,
  pose_sim REAL NOT NULL,
  ball1 TEXT,
  ball2 TEXT,
  coach_label TEXT NOT NULL,
  student_label TEXT NOT NULL,
  clip_sim REAL NOT NULL
)"#;

const CREATE_PLAYER_PERFORMANCE: &str = r#"
CREATE TABLE IF NOT EXISTS player_performance (
  id SERIAL PRIMARY KEY,
  player_id TEXT NOT NULL,
  drill_id INTEGER NOT NULL,
  average_coach_accuracy DOUBLE PRECISION NOT NULL,
  average_student_accuracy DOUBLE PRECISION NOT NULL,
  average_pose_similarity DOUBLE PRECISION NOT NULL,
  created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
  UNIQUE (player_id, drill_id)
)"#;

pub struct PostgresStore {
  runtime: Runtime,
  pool: PgPool,
}

impl FromUrl for PostgresStore {
  type Error = StoreError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if !POSTGRES_SCHEMES.contains(&url.scheme()) {
      return Err(StoreError::SchemeMismatch(url.scheme().to_string()));
    }
    Self::connect(url.as_str())
  }
}

fn drill_column(drill_id: DrillId) -> Result<i32, StoreError> {
  i32::try_from(drill_id.0).map_err(|_| StoreError::InvalidData(format!("练习编号过大: {}", drill_id.0)))
}

fn ball_column(row: &PgRow, column: &str) -> Result<Option<BallPosition>, StoreError> {
  row
    .try_get::<Option<String>, _>(column)?
    .map(|text| {
      text
        .parse()
        .map_err(|e| StoreError::InvalidData(format!("{} 列无法解析 {:?}: {}", column, text, e)))
    })
    .transpose()
}

fn frame_record(row: &PgRow) -> Result<FrameRecord, StoreError> {
  let drill_id: i32 = row.try_get("drill_id")?;
  let frame_num: i64 = row.try_get("frame_num")?;
  Ok(FrameRecord {
    drill_id: DrillId(drill_id as u32),
    frame_index: frame_num as u64,
    coach_accuracy: row.try_get("coach_acc")?,
    student_accuracy: row.try_get("student_acc")?,
    pose_similarity: row.try_get("pose_sim")?,
    coach_ball: ball_column(row, "ball1")?,
    student_ball: ball_column(row, "ball2")?,
    coach_label: row.try_get("coach_label")?,
    student_label: row.try_get("student_label")?,
    semantic_similarity: row.try_get("clip_sim")?,
  })
}

fn player_summary(row: &PgRow) -> Result<PlayerSummary, StoreError> {
  let drill_id: i32 = row.try_get("drill_id")?;
  let created_at: DateTime<Utc> = row.try_get("created_at")?;
  Ok(PlayerSummary {
    player_id: row.try_get("player_id")?,
    drill_id: DrillId(drill_id as u32),
    coach_average: row.try_get("average_coach_accuracy")?,
    student_average: row.try_get("average_student_accuracy")?,
    pose_similarity_average: row.try_get("average_pose_similarity")?,
    created_at,
  })
}

impl PostgresStore {
  pub fn connect(url: &str) -> Result<Self, StoreError> {
    let runtime = Builder::new_current_thread().enable_all().build()?;
    let pool = runtime.block_on(async {
      let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect(url)
        .await?;
      sqlx::query(CREATE_PERFORMANCE).execute(&pool).await?;
      sqlx::query(CREATE_PLAYER_PERFORMANCE).execute(&pool).await?;
      Ok::<_, sqlx::Error>(pool)
    })?;
    info!("已连接数据库");
    Ok(PostgresStore { runtime, pool })
  }
}

impl Store for PostgresStore {
  type Error = StoreError;

  fn insert_frame_record(&self, record: &FrameRecord) -> Result<(), Self::Error> {
    let drill_id = drill_column(record.drill_id)?;
    self.runtime.block_on(
      sqlx::query(
        "INSERT INTO performance \
         (drill_id, frame_num, coach_acc, student_acc, pose_sim, ball1, ball2, coach_label, student_label, clip_sim) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
      )
      .bind(drill_id)
      .bind(record.frame_index as i64)
      .bind(record.coach_accuracy)
      .bind(record.student_accuracy)
      .bind(record.pose_similarity)
      .bind(record.coach_ball.map(|b| b.to_string()))
      .bind(record.student_ball.map(|b| b.to_string()))
      .bind(&record.coach_label)
      .bind(&record.student_label)
      .bind(record.semantic_similarity)
      .execute(&self.pool),
    )?;
    Ok(())
  }

  fn insert_player_summary(&self, summary: &PlayerSummary) -> Result<InsertOutcome, Self::Error> {
    let drill_id = drill_column(summary.drill_id)?;
    let result = self.runtime.block_on(
      sqlx::query(
        "INSERT INTO player_performance \
         (player_id, drill_id, average_coach_accuracy, average_student_accuracy, average_pose_similarity, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (player_id, drill_id) DO NOTHING",
      )
      .bind(&summary.player_id)
      .bind(drill_id)
      .bind(summary.coach_average)
      .bind(summary.student_average)
      .bind(summary.pose_similarity_average)
      .bind(summary.created_at)
      .execute(&self.pool),
    )?;

    if result.rows_affected() == 0 {
      debug!("{} {} 汇总已存在", summary.player_id, summary.drill_id);
      Ok(InsertOutcome::Duplicate)
    } else {
      Ok(InsertOutcome::Inserted)
    }
  }

  fn frame_records(&self, drill_id: DrillId) -> Result<Vec<FrameRecord>, Self::Error> {
    let drill_id = drill_column(drill_id)?;
    let rows = self.runtime.block_on(
      sqlx::query(
        "SELECT drill_id, frame_num, coach_acc, student_acc, pose_sim, ball1, ball2, coach_label, student_label, clip_sim \
         FROM performance WHERE drill_id = $1 ORDER BY frame_num, id",
      )
      .bind(drill_id)
      .fetch_all(&self.pool),
    )?;
    rows.iter().map(frame_record).collect()
  }

  fn player_summaries(&self, player_id: &str) -> Result<Vec<PlayerSummary>, Self::Error> {
    let rows = self.runtime.block_on(
      sqlx::query(
        "SELECT player_id, drill_id, average_coach_accuracy, average_student_accuracy, average_pose_similarity, created_at \
         FROM player_performance WHERE player_id = $1 ORDER BY created_at DESC, drill_id",
      )
      .bind(player_id)
      .fetch_all(&self.pool),
    )?;
    rows.iter().map(player_summary).collect()
  }
}
