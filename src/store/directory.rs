// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/store/directory.rs - 目录存储
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

//! 目录存储
//!
//! ```text
//! <root>/records/drill_<N>.jsonl           逐帧记录，每行一条
//! <root>/summaries/<player>/drill_<N>.json 球员汇总，每个 (球员, 练习) 一个文件
//! ```
//!
//! 汇总先完整写入同目录下的临时文件，再以硬链接发布为最终文件名；
//! 链接目标已存在时失败，由文件系统保证同一键只有一个写入者成功，
//! 读取方也不会看到写了一半的汇总。

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  bench::PlayerSummary,
  compare::FrameRecord,
  session::DrillId,
  store::{InsertOutcome, Store, StoreError},
  url_path,
};

pub struct DirectoryStore {
  root: PathBuf,
  append_lock: Mutex<()>,
  staging: AtomicU64,
}

impl FromUrlWithScheme for DirectoryStore {
  const SCHEME: &'static str = "dir";
}

impl FromUrl for DirectoryStore {
  type Error = StoreError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(StoreError::SchemeMismatch(url.scheme().to_string()));
    }
    Self::open(&url_path(url))
  }
}

impl DirectoryStore {
  pub fn open(root: &Path) -> Result<Self, StoreError> {
    std::fs::create_dir_all(root.join("records"))?;
    std::fs::create_dir_all(root.join("summaries"))?;
    debug!("目录存储: {}", root.display());
    Ok(DirectoryStore {
      root: root.to_path_buf(),
      append_lock: Mutex::new(()),
      staging: AtomicU64::new(0),
    })
  }

  fn records_path(&self, drill_id: DrillId) -> PathBuf {
    self
      .root
      .join("records")
      .join(format!("drill_{}.jsonl", drill_id.0))
  }

  fn player_dir(&self, player_id: &str) -> PathBuf {
    self
      .root
      .join("summaries")
      .join(urlencoding::encode(player_id).as_ref())
  }
}

fn read_json_lines(path: &Path) -> Result<Vec<FrameRecord>, StoreError> {
  let file = match File::open(path) {
    Ok(file) => file,
    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
    Err(e) => return Err(e.into()),
  };

  let mut records = Vec::new();
  for line in BufReader::new(file).lines() {
    let line = line?;
    if line.trim().is_empty() {
      continue;
    }
    match serde_json::from_str(&line) {
      Ok(record) => records.push(record),
      // 中断写入可能留下半行
      Err(e) => warn!("跳过无法解析的记录 {}: {}", path.display(), e),
    }
  }
  Ok(records)
}

fn write_staged(path: &Path, summary: &PlayerSummary) -> Result<(), StoreError> {
  let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
  serde_json::to_writer_pretty(&mut file, summary)?;
  file.sync_all()?;
  Ok(())
}

impl Store for DirectoryStore {
  type Error = StoreError;

  fn insert_frame_record(&self, record: &FrameRecord) -> Result<(), Self::Error> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');

    let _guard = self.append_lock.lock().map_err(|_| StoreError::Poisoned)?;
    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(self.records_path(record.drill_id))?;
    file.write_all(&line)?;
    Ok(())
  }

  fn insert_player_summary(&self, summary: &PlayerSummary) -> Result<InsertOutcome, Self::Error> {
    let dir = self.player_dir(&summary.player_id);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("drill_{}.json", summary.drill_id.0));
    if path.exists() {
      return Ok(InsertOutcome::Duplicate);
    }

    let staged = dir.join(format!(
      ".drill_{}.{}.{}.tmp",
      summary.drill_id.0,
      std::process::id(),
      self.staging.fetch_add(1, Ordering::Relaxed)
    ));
    let published = write_staged(&staged, summary).and_then(|()| {
      match std::fs::hard_link(&staged, &path) {
        Ok(()) => Ok(InsertOutcome::Inserted),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(InsertOutcome::Duplicate),
        Err(e) => Err(e.into()),
      }
    });
    if let Err(e) = std::fs::remove_file(&staged) {
      if e.kind() != ErrorKind::NotFound {
        warn!("清理临时汇总失败 {}: {}", staged.display(), e);
      }
    }
    published
  }

  fn frame_records(&self, drill_id: DrillId) -> Result<Vec<FrameRecord>, Self::Error> {
    let mut records = read_json_lines(&self.records_path(drill_id))?;
    records.sort_by_key(|r| r.frame_index);
    Ok(records)
  }

  fn player_summaries(&self, player_id: &str) -> Result<Vec<PlayerSummary>, Self::Error> {
    let dir = self.player_dir(player_id);
    let entries = match std::fs::read_dir(&dir) {
      Ok(entries) => entries,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(e.into()),
    };

    let mut summaries = Vec::new();
    for entry in entries {
      let path = entry?.path();
      if path.extension().is_some_and(|ext| ext == "json") {
        let summary: PlayerSummary = serde_json::from_reader(BufReader::new(File::open(&path)?))?;
        summaries.push(summary);
      }
    }
    summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.drill_id.cmp(&b.drill_id)));
    Ok(summaries)
  }
}
