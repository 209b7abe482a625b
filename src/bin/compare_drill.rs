// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/bin/compare_drill.rs - 单个练习对比
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use drillbench::{
  args::{MetricsArgs, ModelArgs, OutputArgs, StoreArgs},
  compare::FrameComparator,
  session::{DrillId, DrillSession},
  task::{DrillTask, Task},
};

/// 对比一组指定的教练 / 学员视频
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 教练视频：文件、帧目录或 ffmpeg: / frames: / gst: 地址
  #[arg(long, value_name = "PATH")]
  pub coach: PathBuf,
  /// 学员视频：文件、帧目录或 ffmpeg: / frames: / gst: 地址
  #[arg(long, value_name = "PATH")]
  pub student: PathBuf,
  /// 练习编号
  #[arg(long, value_name = "N", default_value = "1")]
  pub drill: u32,

  #[arg(long, value_name = "ID", default_value = "player_101", env = "DRILLBENCH_PLAYER")]
  pub player_id: String,

  #[command(flatten)]
  pub model: ModelArgs,
  #[command(flatten)]
  pub metrics: MetricsArgs,
  #[command(flatten)]
  pub output: OutputArgs,
  #[command(flatten)]
  pub store: StoreArgs,
}

fn main() -> Result<()> {
  dotenvy::dotenv().ok();
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let args = Args::parse();

  info!("教练视频: {}", args.coach.display());
  info!("学员视频: {}", args.student.display());

  let session = DrillSession::new(DrillId(args.drill), args.coach, args.student);
  let (keypoints, ball, action) = args.model.build()?;
  let store = args.store.open()?;
  let metrics = args.metrics.metrics()?;
  let comparator = FrameComparator::new(&keypoints, &ball, &action, metrics);

  let report =
    DrillTask::new(comparator, &store, args.output.layout(), &args.player_id).run_task(&session)?;

  println!("{}", report.drill_id);
  println!("  {}", report.stats);
  println!("  教练平均准确率: {:.2}%", report.summary.coach_average);
  println!("  学员平均准确率: {:.2}%", report.summary.student_average);
  println!("  平均姿态相似度: {:.2}", report.summary.pose_similarity_average);
  println!("  CSV: {}", report.artifacts.csv.display());
  println!("  叠加: {}", report.artifacts.overlay.display());
  println!("  图表: {}", report.artifacts.accuracy_chart.display());
  println!("        {}", report.artifacts.mismatch_chart.display());
  println!("        {}", report.artifacts.similarity_chart.display());
  println!("  耗时: {:.2?}", report.elapsed);

  Ok(())
}
