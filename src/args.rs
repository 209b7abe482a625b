// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/args.rs - 命令行参数
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

//! 各个可执行文件共用的参数组

use std::path::PathBuf;

use clap::Args;
use url::Url;

use crate::{
  FromUrl,
  metrics::{DEFAULT_CONFIDENCE_THRESHOLD, PoseMetrics, SimilarityPolicy},
  model::{ActionModelWrapper, BallLocatorWrapper, KeypointModel},
  session::{ArtifactLayout, OverlayFormat},
  store::StoreWrapper,
};

/// 三种能力的地址
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
  /// 关键点提取服务，例如 exec:///opt/pose-server
  #[arg(long, value_name = "URL", env = "DRILLBENCH_KEYPOINTS")]
  pub keypoints: Url,

  /// 球定位: color:、color:?min_radius=12、exec:///path 或 none:
  #[arg(long, value_name = "URL", default_value = "color:", env = "DRILLBENCH_BALL")]
  pub ball: Url,

  /// 动作标签服务，单帧模式加 ?mode=single&labels=kicking,running
  #[arg(long, value_name = "URL", env = "DRILLBENCH_ACTION")]
  pub action: Url,
}

impl ModelArgs {
  pub fn build(&self) -> anyhow::Result<(KeypointModel, BallLocatorWrapper, ActionModelWrapper)> {
    let keypoints = KeypointModel::from_url(&self.keypoints)?;
    let ball = BallLocatorWrapper::from_url(&self.ball)?;
    let action = ActionModelWrapper::from_url(&self.action)?;
    Ok((keypoints, ball, action))
  }
}

#[derive(Args, Debug, Clone, Copy)]
pub struct MetricsArgs {
  /// 关键点置信度阈值，严格大于才计入
  #[arg(long, value_name = "THRESHOLD", default_value_t = DEFAULT_CONFIDENCE_THRESHOLD)]
  pub threshold: f32,

  /// 姿态相似度的归约方式
  #[arg(long, value_enum, default_value_t = SimilarityPolicy::default())]
  pub policy: SimilarityPolicy,
}

impl MetricsArgs {
  pub fn metrics(&self) -> anyhow::Result<PoseMetrics> {
    anyhow::ensure!(
      (0.0..=1.0).contains(&self.threshold),
      "置信度阈值需在 0 到 1 之间: {}",
      self.threshold
    );
    Ok(PoseMetrics::new(self.threshold, self.policy))
  }
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
  /// 结果目录
  #[arg(long, value_name = "DIR", default_value = "results", env = "DRILLBENCH_RESULTS")]
  pub results_dir: PathBuf,

  /// 叠加结果形式
  #[arg(long, value_enum, default_value_t = OverlayFormat::default())]
  pub overlay: OverlayFormat,
}

impl OutputArgs {
  pub fn layout(&self) -> ArtifactLayout {
    ArtifactLayout::new(&self.results_dir, self.overlay)
  }
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
  /// 存储地址: memory:、dir:///path 或 postgres://...
  #[arg(long = "store", value_name = "URL", env = "DATABASE_URL", default_value = "memory:")]
  pub url: Url,
}

impl StoreArgs {
  pub fn open(&self) -> anyhow::Result<StoreWrapper> {
    Ok(StoreWrapper::from_url(&self.url)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct TestCli {
    #[command(flatten)]
    metrics: MetricsArgs,
    #[command(flatten)]
    output: OutputArgs,
  }

  #[test]
  fn defaults() {
    let cli = TestCli::try_parse_from(["test"]).unwrap();
    assert_eq!(cli.metrics.threshold, DEFAULT_CONFIDENCE_THRESHOLD);
    assert_eq!(cli.metrics.policy, SimilarityPolicy::BoundedScore);
    assert_eq!(cli.output.overlay, OverlayFormat::Mp4);
  }

  #[test]
  fn policy_and_overlay_flags() {
    let cli = TestCli::try_parse_from([
      "test",
      "--policy",
      "mean-distance",
      "--overlay",
      "frames",
      "--threshold",
      "0.5",
    ])
    .unwrap();
    assert_eq!(cli.metrics.policy, SimilarityPolicy::MeanDistance);
    assert_eq!(cli.output.overlay, OverlayFormat::Frames);
    assert!(cli.metrics.metrics().is_ok());
  }

  #[test]
  fn threshold_out_of_range() {
    let cli = TestCli::try_parse_from(["test", "--threshold", "1.5"]).unwrap();
    assert!(cli.metrics.metrics().is_err());
  }
}
