// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/main.rs - 批量练习对比主程序
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
  input::InputWrapper,
  session::{DrillId, DrillSession, SessionError},
  task::{BatchTask, DrillTask, SummaryStatus, Task},
};

/// 批量对比教练与学员的练习视频
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 视频目录，按 coach_drill{N} / student_drill{N} 命名
  #[arg(long, value_name = "DIR", default_value = "videos")]
  pub video_dir: PathBuf,

  /// 练习数量，处理 1..=N；不指定时扫描视频目录
  #[arg(long, value_name = "COUNT")]
  pub drills: Option<u32>,

  /// 解码方式: ffmpeg、frames 或 gst（需 gstreamer_input 特性）；缺省按路径判断
  #[arg(long, value_name = "SCHEME")]
  pub decoder: Option<String>,

  /// 球员编号
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

  info!("视频目录: {}", args.video_dir.display());
  info!("结果目录: {}", args.output.results_dir.display());
  info!("存储: {}", args.store.url.scheme());

  let ids = match args.drills {
    Some(n) => (1..=n).map(DrillId).collect(),
    None => DrillSession::discover(&args.video_dir)?,
  };
  anyhow::ensure!(!ids.is_empty(), "{} 中没有找到练习视频", args.video_dir.display());

  if let Some(decoder) = &args.decoder {
    anyhow::ensure!(
      InputWrapper::SCHEMES.contains(&decoder.as_str()),
      "未知的解码方式 {}，可选: {}",
      decoder,
      InputWrapper::SCHEMES.join(", ")
    );
  }

  let sessions = ids
    .into_iter()
    .map(|id| -> Result<DrillSession, SessionError> {
      let session = DrillSession::locate(&args.video_dir, id)?;
      match &args.decoder {
        Some(decoder) => session.with_decoder(decoder),
        None => Ok(session),
      }
    })
    .collect::<Vec<_>>();

  let (keypoints, ball, action) = args.model.build()?;
  let store = args.store.open()?;
  let comparator = FrameComparator::new(&keypoints, &ball, &action, args.metrics.metrics()?);
  let drill = DrillTask::new(comparator, &store, args.output.layout(), &args.player_id);

  let Ok(report) = BatchTask::new(drill).run_task(sessions);

  println!();
  println!("Drillbench 练习对比报告");
  println!("======================");
  println!("球员: {}", args.player_id);
  for outcome in &report.outcomes {
    match &outcome.result {
      Ok(drill) => {
        println!(
          "✅ {}: 教练 {:.2}% / 学员 {:.2}% / 姿态相似度 {:.2}",
          drill.drill_id,
          drill.summary.coach_average,
          drill.summary.student_average,
          drill.summary.pose_similarity_average,
        );
        println!("    {}", drill.stats);
        match &drill.summary_status {
          SummaryStatus::Inserted => {}
          SummaryStatus::Duplicate => println!("    汇总已存在，未覆盖"),
          SummaryStatus::Failed(e) => println!("    汇总写入失败: {}", e),
        }
        if drill.store_failures > 0 {
          println!("    {} 条逐帧记录写入失败", drill.store_failures);
        }
        println!("    CSV: {}", drill.artifacts.csv.display());
        println!(
          "    叠加: {} ({} 帧{})",
          drill.artifacts.overlay.display(),
          drill.artifacts.overlay_frames,
          if drill.artifacts.overlay_drift { "，帧数不一致" } else { "" }
        );
      }
      Err(e) => match outcome.drill_id {
        Some(id) => println!("❌ {}: {:#}", id, e),
        None => println!("❌ {:#}", e),
      },
    }
  }
  println!();
  println!(
    "成功 {} / 失败 {}",
    report.succeeded().count(),
    report.failed().count()
  );

  if !report.all_succeeded() {
    std::process::exit(1);
  }
  Ok(())
}
