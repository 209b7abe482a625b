// 该文件是 Drillbench （练球对比） 项目的一部分。
// src/store/memory.rs - 内存存储
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

use std::collections::{BTreeMap, HashMap, hash_map::Entry};
use std::sync::Mutex;

use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  bench::PlayerSummary,
  compare::FrameRecord,
  session::DrillId,
  store::{InsertOutcome, Store, StoreError},
};

#[derive(Default)]
struct MemoryInner {
  records: BTreeMap<DrillId, Vec<FrameRecord>>,
  summaries: HashMap<(String, DrillId), PlayerSummary>,
}

/// 进程内存储，检查与插入在同一把锁内完成
#[derive(Default)]
pub struct MemoryStore {
  inner: Mutex<MemoryInner>,
}

impl FromUrlWithScheme for MemoryStore {
  const SCHEME: &'static str = "memory";
}

impl FromUrl for MemoryStore {
  type Error = StoreError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(StoreError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(MemoryStore::default())
  }
}

impl MemoryStore {
  fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, StoreError> {
    self.inner.lock().map_err(|_| StoreError::Poisoned)
  }
}

impl Store for MemoryStore {
  type Error = StoreError;

  fn insert_frame_record(&self, record: &FrameRecord) -> Result<(), Self::Error> {
    self
      .lock()?
      .records
      .entry(record.drill_id)
      .or_default()
      .push(record.clone());
    Ok(())
  }

  fn insert_player_summary(&self, summary: &PlayerSummary) -> Result<InsertOutcome, Self::Error> {
    let mut inner = self.lock()?;
    match inner
      .summaries
      .entry((summary.player_id.clone(), summary.drill_id))
    {
      Entry::Occupied(_) => Ok(InsertOutcome::Duplicate),
      Entry::Vacant(slot) => {
        slot.insert(summary.clone());
        Ok(InsertOutcome::Inserted)
      }
    }
  }

  fn frame_records(&self, drill_id: DrillId) -> Result<Vec<FrameRecord>, Self::Error> {
    let mut records = self
      .lock()?
      .records
      .get(&drill_id)
      .cloned()
      .unwrap_or_default();
    records.sort_by_key(|r| r.frame_index);
    Ok(records)
  }

  fn player_summaries(&self, player_id: &str) -> Result<Vec<PlayerSummary>, Self::Error> {
    let mut summaries: Vec<_> = self
      .lock()?
      .summaries
      .values()
      .filter(|s| s.player_id == player_id)
      .cloned()
      .collect();
    summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.drill_id.cmp(&b.drill_id)));
    Ok(summaries)
  }
}
