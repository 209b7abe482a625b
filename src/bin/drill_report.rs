// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/bin/drill_report.rs - 查询已存储的结果
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
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use drillbench::{
  args::StoreArgs,
  input::{InputWrapper, VideoInput},
  output::{OutputWrapper, csv_export, render_overlay},
  session::{DrillId, OverlayFormat},
  store::Store,
};

/// 查询存储中的球员汇总与逐帧记录
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub store: StoreArgs,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 球员在各练习上的汇总，最新的在前
  Player {
    #[arg(default_value = "player_101")]
    player_id: String,
    /// 以 JSON 输出
    #[arg(long)]
    json: bool,
  },
  /// 某个练习的逐帧记录
  Drill {
    drill: u32,
    /// 导出为 CSV 而不是打印
    #[arg(long, value_name = "FILE")]
    csv: Option<PathBuf>,
  },
  /// 由已导出的 CSV 重新生成叠加结果
  Overlay {
    /// log_drill_{N}.csv
    #[arg(long, value_name = "FILE")]
    csv: PathBuf,
    /// 学员视频：文件、帧目录或 ffmpeg: / frames: / gst: 地址
    #[arg(long, value_name = "PATH")]
    student: PathBuf,
    /// 输出路径，或 video:///x.mp4?fps=30 / folder:///dir?record 地址
    #[arg(long, value_name = "PATH")]
    out: PathBuf,
    #[arg(long, value_enum, default_value_t = OverlayFormat::default())]
    format: OverlayFormat,
  },
}

fn main() -> Result<()> {
  dotenvy::dotenv().ok();
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let args = Args::parse();

  match args.command {
    Command::Player { player_id, json } => {
      let store = args.store.open()?;
      let summaries = store.player_summaries(&player_id)?;
      if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
      }
      if summaries.is_empty() {
        println!("{} 没有汇总记录", player_id);
        return Ok(());
      }
      println!("球员 {}", player_id);
      for s in &summaries {
        println!(
          "  {} | 教练 {:.2}% | 学员 {:.2}% | 姿态相似度 {:.2} | {}",
          s.drill_id,
          s.coach_average,
          s.student_average,
          s.pose_similarity_average,
          s.created_at.format("%Y-%m-%d %H:%M:%S"),
        );
      }
    }
    Command::Drill { drill, csv } => {
      let store = args.store.open()?;
      let drill = DrillId(drill);
      let records = store.frame_records(drill)?;
      if let Some(path) = csv {
        csv_export::write_records(&path, &records)?;
        println!("已导出 {} 条记录到 {}", records.len(), path.display());
        return Ok(());
      }
      println!("{}: {} 帧", drill, records.len());
      for r in &records {
        println!(
          "  #{:<5} 教练 {:6.2}% 学员 {:6.2}% 相似度 {:7.2} 动作 {} ({:.2})",
          r.frame_index,
          r.coach_accuracy,
          r.student_accuracy,
          r.pose_similarity,
          r.action_pair(),
          r.semantic_similarity,
        );
      }
    }
    Command::Overlay {
      csv,
      student,
      out,
      format,
    } => {
      let records = csv_export::read_records(&csv)?;
      let frames = InputWrapper::open(&student)?;
      let sink = OutputWrapper::open(&out, format, frames.info().fps)?;
      let stats = render_overlay(&records, frames, &sink)?;
      let path = sink.finish()?;
      println!(
        "已叠加 {} 帧到 {}{}",
        stats.annotated,
        path.display(),
        if stats.drift { "，帧数与记录数不一致" } else { "" }
      );
    }
  }

  Ok(())
}
