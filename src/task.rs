// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/task.rs - 练习任务
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

use std::fmt::Display;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{error, info, warn};

use crate::{
  bench::{BenchArtifacts, DrillBenchmark, PlayerSummary, SessionStats},
  compare::FrameComparator,
  frame::VideoFrame,
  input::InputWrapper,
  model::{ActionModel, BallPosition, Model, Pose},
  session::{ArtifactLayout, DrillId, DrillSession, SessionError},
  store::{InsertOutcome, Store},
};

pub trait Task<I> {
  type Output;
  type Error;
  fn run_task(&self, input: I) -> Result<Self::Output, Self::Error>;
}

/// 汇总写入结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryStatus {
  Inserted,
  Duplicate,
  Failed(String),
}

#[derive(Debug, Clone)]
pub struct DrillReport {
  pub drill_id: DrillId,
  pub stats: SessionStats,
  pub summary: PlayerSummary,
  pub summary_status: SummaryStatus,
  /// 写入失败的逐帧记录数
  pub store_failures: u64,
  pub artifacts: BenchArtifacts,
  pub elapsed: Duration,
}

/// 单个练习从读取到产物的完整流程
pub struct DrillTask<'a, P, B, A, S> {
  comparator: FrameComparator<'a, P, B, A>,
  store: &'a S,
  layout: ArtifactLayout,
  player_id: String,
}

impl<'a, P, B, A, S> DrillTask<'a, P, B, A, S> {
  pub fn new(
    comparator: FrameComparator<'a, P, B, A>,
    store: &'a S,
    layout: ArtifactLayout,
    player_id: impl Into<String>,
  ) -> Self {
    DrillTask {
      comparator,
      store,
      layout,
      player_id: player_id.into(),
    }
  }
}

impl<'s, P, B, A, S> Task<&'s DrillSession> for DrillTask<'_, P, B, A, S>
where
  P: Model<Input = VideoFrame, Output = Pose> + Sync,
  P::Error: Display,
  B: Model<Input = VideoFrame, Output = Option<BallPosition>> + Sync,
  B::Error: Display,
  A: ActionModel + Sync,
  A::Error: Display,
  S: Store,
  S::Error: Display,
{
  type Output = DrillReport;
  type Error = anyhow::Error;

  fn run_task(&self, session: &'s DrillSession) -> Result<Self::Output, Self::Error> {
    let drill_id = session.drill_id;
    let now = Instant::now();
    info!(
      "开始 {}: 教练 {} / 学员 {}",
      drill_id,
      session.coach_video.display(),
      session.student_video.display()
    );

    let coach = InputWrapper::open(&session.coach_video)
      .with_context(|| format!("无法打开教练视频 {}", session.coach_video.display()))?;
    let student = InputWrapper::open(&session.student_video)
      .with_context(|| format!("无法打开学员视频 {}", session.student_video.display()))?;

    let mut bench = DrillBenchmark::new(drill_id);
    let mut store_failures = 0u64;
    for record in self.comparator.run(drill_id, coach, student) {
      if let Err(e) = self.store.insert_frame_record(&record) {
        warn!("{} 第 {} 帧记录写入失败: {}", drill_id, record.frame_index, e);
        store_failures += 1;
      }
      bench.ingest(record)?;
    }
    if store_failures > 0 {
      warn!("{} 共 {} 条记录写入失败", drill_id, store_failures);
    }

    let summary = bench.summarize(&self.player_id)?;
    let summary_status = match self.store.insert_player_summary(&summary) {
      Ok(InsertOutcome::Inserted) => SummaryStatus::Inserted,
      Ok(InsertOutcome::Duplicate) => {
        warn!("{} 的 {} 汇总已存在，保留原记录", self.player_id, drill_id);
        SummaryStatus::Duplicate
      }
      Err(e) => {
        error!("{} 汇总写入失败: {}", drill_id, e);
        SummaryStatus::Failed(e.to_string())
      }
    };

    let stats = bench.stats().clone();
    let replay = InputWrapper::open(&session.student_video)
      .with_context(|| format!("无法重新打开学员视频 {}", session.student_video.display()))?;
    let artifacts = bench.finalize(&self.layout, replay)?;
    if artifacts.overlay_drift {
      warn!("{} 叠加帧数与记录数不一致", drill_id);
    }

    let elapsed = now.elapsed();
    info!("{} 完成，耗时 {:.2?}", drill_id, elapsed);
    Ok(DrillReport {
      drill_id,
      stats,
      summary,
      summary_status,
      store_failures,
      artifacts,
      elapsed,
    })
  }
}

#[derive(Debug)]
pub struct DrillOutcome {
  /// 无法确定练习编号时为 `None`
  pub drill_id: Option<DrillId>,
  pub result: anyhow::Result<DrillReport>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
  pub outcomes: Vec<DrillOutcome>,
}

impl BatchReport {
  pub fn succeeded(&self) -> impl Iterator<Item = &DrillReport> {
    self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
  }

  pub fn failed(&self) -> impl Iterator<Item = (Option<DrillId>, &anyhow::Error)> {
    self
      .outcomes
      .iter()
      .filter_map(|o| o.result.as_ref().err().map(|e| (o.drill_id, e)))
  }

  pub fn all_succeeded(&self) -> bool {
    self.outcomes.iter().all(|o| o.result.is_ok())
  }
}

/// 依次执行多个练习，单个失败不影响其余
pub struct BatchTask<T> {
  drill: T,
}

impl<T> BatchTask<T> {
  pub fn new(drill: T) -> Self {
    BatchTask { drill }
  }
}

impl<T> Task<Vec<Result<DrillSession, SessionError>>> for BatchTask<T>
where
  T: for<'s> Task<&'s DrillSession, Output = DrillReport, Error = anyhow::Error>,
{
  type Output = BatchReport;
  type Error = std::convert::Infallible;

  fn run_task(
    &self,
    sessions: Vec<Result<DrillSession, SessionError>>,
  ) -> Result<Self::Output, Self::Error> {
    info!("开始批量任务，共 {} 个练习", sessions.len());
    let mut report = BatchReport::default();

    for session in sessions {
      let outcome = match session {
        Ok(session) => {
          let result = self.drill.run_task(&session);
          if let Err(e) = &result {
            error!("{} 失败: {:#}", session.drill_id, e);
          }
          DrillOutcome {
            drill_id: Some(session.drill_id),
            result,
          }
        }
        Err(e) => {
          error!("跳过练习: {}", e);
          DrillOutcome {
            drill_id: e.drill(),
            result: Err(e.into()),
          }
        }
      };
      report.outcomes.push(outcome);
    }

    info!(
      "批量任务结束: 成功 {}，失败 {}",
      report.succeeded().count(),
      report.failed().count()
    );
    Ok(report)
  }
}
