// 该文件是 Drillbench （练球对比） 项目的一部分。
// tests/store.rs - 存储行为测试
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

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;
use url::Url;

use drillbench::{
  FromUrl,
  bench::PlayerSummary,
  compare::FrameRecord,
  model::BallPosition,
  session::DrillId,
  store::{DirectoryStore, InsertOutcome, MemoryStore, Store, StoreError, StoreWrapper},
};

fn record(drill: u32, index: u64) -> FrameRecord {
  FrameRecord {
    drill_id: DrillId(drill),
    frame_index: index,
    coach_accuracy: 100.0,
    student_accuracy: 75.0,
    pose_similarity: 88.5,
    coach_ball: Some(BallPosition { x: 10, y: 20 }),
    student_ball: None,
    coach_label: "kicking".into(),
    student_label: "running".into(),
    semantic_similarity: 0.42,
  }
}

fn summary(player: &str, drill: u32, minutes: i64, coach: f64) -> PlayerSummary {
  let base = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
  PlayerSummary {
    player_id: player.into(),
    drill_id: DrillId(drill),
    coach_average: coach,
    student_average: 60.0,
    pose_similarity_average: 70.0,
    created_at: base + Duration::minutes(minutes),
  }
}

fn summaries_are_idempotent<S: Store<Error = StoreError>>(store: &S) {
  let first = summary("player_101", 1, 0, 90.0);
  assert_eq!(store.insert_player_summary(&first).unwrap(), InsertOutcome::Inserted);

  let second = summary("player_101", 1, 5, 10.0);
  assert_eq!(store.insert_player_summary(&second).unwrap(), InsertOutcome::Duplicate);

  // 其他球员同一练习不冲突
  let other = summary("player_202", 1, 1, 50.0);
  assert_eq!(store.insert_player_summary(&other).unwrap(), InsertOutcome::Inserted);

  let stored = store.player_summaries("player_101").unwrap();
  assert_eq!(stored, vec![first]);
}

fn summaries_newest_first<S: Store<Error = StoreError>>(store: &S) {
  for (drill, minutes) in [(1, 0), (2, 30), (3, 10)] {
    store
      .insert_player_summary(&summary("player/7", drill, minutes, 80.0))
      .unwrap();
  }
  let drills: Vec<_> = store
    .player_summaries("player/7")
    .unwrap()
    .into_iter()
    .map(|s| s.drill_id)
    .collect();
  assert_eq!(drills, vec![DrillId(2), DrillId(3), DrillId(1)]);
  assert!(store.player_summaries("nobody").unwrap().is_empty());
}

fn records_are_ordered<S: Store<Error = StoreError>>(store: &S) {
  for index in [2, 0, 1] {
    store.insert_frame_record(&record(1, index)).unwrap();
  }
  store.insert_frame_record(&record(2, 0)).unwrap();

  let records = store.frame_records(DrillId(1)).unwrap();
  assert_eq!(
    records.iter().map(|r| r.frame_index).collect::<Vec<_>>(),
    vec![0, 1, 2]
  );
  assert_eq!(records[0], record(1, 0));
  assert_eq!(store.frame_records(DrillId(2)).unwrap().len(), 1);
  assert!(store.frame_records(DrillId(9)).unwrap().is_empty());
}

#[test]
fn memory_store() {
  summaries_are_idempotent(&MemoryStore::default());
  summaries_newest_first(&MemoryStore::default());
  records_are_ordered(&MemoryStore::default());
}

#[test]
fn directory_store() {
  let tmp = TempDir::new().unwrap();
  summaries_are_idempotent(&DirectoryStore::open(&tmp.path().join("a")).unwrap());
  summaries_newest_first(&DirectoryStore::open(&tmp.path().join("b")).unwrap());
  records_are_ordered(&DirectoryStore::open(&tmp.path().join("c")).unwrap());
}

#[test]
fn directory_store_survives_reopen() {
  let tmp = TempDir::new().unwrap();
  let url = Url::from_directory_path(tmp.path()).unwrap();
  let url = Url::parse(&format!("dir://{}", url.path())).unwrap();

  {
    let store = StoreWrapper::from_url(&url).unwrap();
    store.insert_frame_record(&record(1, 0)).unwrap();
    store
      .insert_player_summary(&summary("player_101", 1, 0, 90.0))
      .unwrap();
  }

  let store = StoreWrapper::from_url(&url).unwrap();
  assert_eq!(store.frame_records(DrillId(1)).unwrap(), vec![record(1, 0)]);
  assert_eq!(
    store
      .insert_player_summary(&summary("player_101", 1, 3, 20.0))
      .unwrap(),
    InsertOutcome::Duplicate
  );
}

#[test]
fn concurrent_summary_inserts_have_one_winner() {
  let tmp = TempDir::new().unwrap();
  let stores: Vec<Arc<dyn Store<Error = StoreError> + Send + Sync>> = vec![
    Arc::new(MemoryStore::default()),
    Arc::new(DirectoryStore::open(tmp.path()).unwrap()),
  ];

  for store in stores {
    let handles: Vec<_> = (0..8)
      .map(|i| {
        let store = Arc::clone(&store);
        std::thread::spawn(move || {
          store
            .insert_player_summary(&summary("player_101", 5, i, i as f64))
            .unwrap()
        })
      })
      .collect();
    let inserted = handles
      .into_iter()
      .map(|h| h.join().unwrap())
      .filter(|o| *o == InsertOutcome::Inserted)
      .count();
    assert_eq!(inserted, 1);
    assert_eq!(store.player_summaries("player_101").unwrap().len(), 1);
  }
}

#[test]
fn directory_summaries_are_never_read_half_written() {
  use std::sync::atomic::{AtomicBool, Ordering};

  let tmp = TempDir::new().unwrap();
  let store = Arc::new(DirectoryStore::open(tmp.path()).unwrap());
  let done = Arc::new(AtomicBool::new(false));

  let reader = {
    let store = Arc::clone(&store);
    let done = Arc::clone(&done);
    std::thread::spawn(move || {
      let mut reads = 0u64;
      loop {
        for s in store.player_summaries("p").unwrap() {
          assert_eq!(s.player_id, "p");
        }
        reads += 1;
        if done.load(Ordering::Acquire) {
          return reads;
        }
      }
    })
  };

  for drill in 0..200 {
    assert_eq!(
      store
        .insert_player_summary(&summary("p", drill, drill as i64, 50.0))
        .unwrap(),
      InsertOutcome::Inserted
    );
  }
  done.store(true, Ordering::Release);
  assert!(reader.join().unwrap() > 0);

  assert_eq!(store.player_summaries("p").unwrap().len(), 200);
  // 发布后不残留临时文件
  let leftovers = std::fs::read_dir(tmp.path().join("summaries").join("p"))
    .unwrap()
    .filter(|e| {
      e.as_ref()
        .unwrap()
        .path()
        .extension()
        .is_some_and(|ext| ext == "tmp")
    })
    .count();
  assert_eq!(leftovers, 0);
}
