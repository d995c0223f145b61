//! Level 2: numbers fall one at a time; the player catches them in order.
//!
//! The spawner guarantees every needed value eventually appears: a value is
//! forced from an ordered queue after 3 ticks without a needed spawn or on every
//! 5th tick; otherwise the next expected value has a 60% chance, any unspawned
//! needed value 30%, and a uniformly random pool value the rest.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::config::{CatchCfg, CatchMode};
use crate::validator::{SequenceCursor, Verdict};

const STARVATION_TICKS: u32 = 3;
const FORCED_EVERY: u32 = 5;
const NEXT_EXPECTED_CHANCE: f64 = 0.6;
const ANY_NEEDED_CHANCE: f64 = 0.3;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallingItem {
  pub id: u32,
  pub value: i64,
  /// Horizontal centre, percent of the field width.
  pub x: f64,
  #[serde(skip)]
  pub spawn_frame: u64,
  /// Claimed once; later hits are ignored.
  #[serde(skip)]
  pub processed: bool,
  pub errored: bool,
  /// Needed and expected next when it spawned; letting it fall is a miss.
  #[serde(skip)]
  pub watched: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpawnOutcome {
  /// Too many items on screen; the tick still counts.
  Skipped,
  Spawned { id: u32, value: i64, needed: bool },
  /// Ceiling reached and every needed value shown; no more spawns.
  Halted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitOutcome {
  Ignored,
  Judged { verdict: Verdict, value: i64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpireOutcome {
  /// Already caught or removed.
  Gone,
  Expired { missed: bool, value: i64 },
}

#[derive(Clone, Debug)]
pub struct CatchField {
  mode: CatchMode,
  pool: Vec<i64>,
  items: Vec<FallingItem>,
  next_id: u32,
  needed_queue: Vec<i64>,
  needed_cursor: usize,
  spawned_needed: HashSet<i64>,
  spawn_count: u32,
  ticks_since_needed: u32,
  halted: bool,
  max_on_screen: usize,
  max_spawns: u32,
  fall_ms: u64,
  frame_ms: u64,
  frame: u64,
  platform_x: f64,
  platform_width: f64,
  platform_step: f64,
  catch_line: f64,
}

impl CatchField {
  pub fn new(pool: &[i64], sequence: &[i64], cfg: &CatchCfg, fall_ms: u64, frame_ms: u64) -> Self {
    Self {
      mode: cfg.mode,
      pool: pool.to_vec(),
      items: Vec::new(),
      next_id: 1,
      needed_queue: sequence.to_vec(),
      needed_cursor: 0,
      spawned_needed: HashSet::new(),
      spawn_count: 0,
      ticks_since_needed: 0,
      halted: false,
      max_on_screen: cfg.max_on_screen,
      max_spawns: cfg.max_spawns,
      fall_ms: fall_ms.max(1),
      frame_ms,
      frame: 0,
      platform_x: 50.0,
      platform_width: cfg.platform_width,
      platform_step: cfg.platform_step,
      catch_line: cfg.catch_line,
    }
  }

  pub fn mode(&self) -> CatchMode {
    self.mode
  }

  pub fn items(&self) -> &[FallingItem] {
    &self.items
  }

  pub fn fall_ms(&self) -> u64 {
    self.fall_ms
  }

  pub fn platform_x(&self) -> f64 {
    self.platform_x
  }

  pub fn is_halted(&self) -> bool {
    self.halted
  }

  fn all_needed_spawned(&self, cursor: &SequenceCursor) -> bool {
    cursor.sequence().iter().all(|v| self.spawned_needed.contains(v))
  }

  fn choose_value<R: Rng + ?Sized>(&mut self, rng: &mut R, cursor: &SequenceCursor) -> (i64, bool) {
    let forced_due = self.ticks_since_needed >= STARVATION_TICKS || self.spawn_count % FORCED_EVERY == 0;
    if self.needed_cursor < self.needed_queue.len() && forced_due {
      let value = self.needed_queue[self.needed_cursor];
      self.needed_cursor += 1;
      return (value, true);
    }

    self.ticks_since_needed += 1;
    let all_spawned = self.all_needed_spawned(cursor);
    if !all_spawned {
      if let Some(next) = cursor.expected() {
        if !self.spawned_needed.contains(&next) && rng.gen_bool(NEXT_EXPECTED_CHANCE) {
          return (next, true);
        }
      }
      if rng.gen_bool(ANY_NEEDED_CHANCE) {
        let pending: Vec<i64> =
          cursor.sequence().iter().copied().filter(|v| !self.spawned_needed.contains(v)).collect();
        if let Some(v) = pending.choose(rng) {
          return (*v, true);
        }
      }
    }

    let value = self.pool.choose(rng).copied().unwrap_or_default();
    let needed = cursor.contains(value) && !self.spawned_needed.contains(&value);
    (value, needed)
  }

  /// One spawn-interval tick.
  pub fn spawn_tick<R: Rng + ?Sized>(&mut self, rng: &mut R, cursor: &SequenceCursor) -> SpawnOutcome {
    if self.halted {
      return SpawnOutcome::Halted;
    }
    self.spawn_count += 1;
    if self.items.len() >= self.max_on_screen {
      return SpawnOutcome::Skipped;
    }

    let (value, needed) = self.choose_value(rng, cursor);
    if needed {
      self.spawned_needed.insert(value);
      self.ticks_since_needed = 0;
    }
    let id = self.next_id;
    self.next_id += 1;
    self.items.push(FallingItem {
      id,
      value,
      x: rng.gen_range(4.0..=96.0),
      spawn_frame: self.frame,
      processed: false,
      errored: false,
      watched: needed && cursor.expected() == Some(value),
    });

    if self.spawn_count >= self.max_spawns && self.all_needed_spawned(cursor) {
      self.halted = true;
    }
    SpawnOutcome::Spawned { id, value, needed }
  }

  /// Claim an item. Each item is judged at most once.
  pub fn hit(&mut self, id: u32, cursor: &mut SequenceCursor) -> HitOutcome {
    let Some(pos) = self.items.iter().position(|i| i.id == id) else {
      return HitOutcome::Ignored;
    };
    if self.items[pos].processed {
      return HitOutcome::Ignored;
    }
    let value = self.items[pos].value;
    let verdict = cursor.judge(value);
    if verdict == Verdict::CorrectNext {
      self.items.remove(pos);
      cursor.advance();
    } else {
      let item = &mut self.items[pos];
      item.processed = true;
      item.errored = true;
    }
    HitOutcome::Judged { verdict, value }
  }

  /// Drop an errored item once its highlight is over.
  pub fn remove(&mut self, id: u32) -> bool {
    let before = self.items.len();
    self.items.retain(|i| i.id != id);
    before != self.items.len()
  }

  /// The fall window of an item ended. Only a watched item counts as a miss.
  pub fn expire(&mut self, id: u32) -> ExpireOutcome {
    let Some(pos) = self.items.iter().position(|i| i.id == id) else {
      return ExpireOutcome::Gone;
    };
    let item = self.items.remove(pos);
    if item.processed {
      return ExpireOutcome::Gone;
    }
    ExpireOutcome::Expired { missed: item.watched, value: item.value }
  }

  /// Fall progress of an item, 0 at spawn and 1 at expiry.
  pub fn progress(&self, item: &FallingItem) -> f64 {
    let elapsed = self.frame.saturating_sub(item.spawn_frame) * self.frame_ms;
    (elapsed as f64 / self.fall_ms as f64).min(1.0)
  }

  /// Advance one animation frame; returns ids of unclaimed items touching the platform.
  pub fn advance_frame(&mut self) -> Vec<u32> {
    self.frame += 1;
    if self.mode != CatchMode::Platform {
      return Vec::new();
    }
    let half = self.platform_width / 2.0;
    self
      .items
      .iter()
      .filter(|i| !i.processed)
      .filter(|i| {
        let p = self.progress(i);
        p >= self.catch_line && p < 1.0 && (i.x - self.platform_x).abs() <= half
      })
      .map(|i| i.id)
      .collect()
  }

  pub fn move_platform(&mut self, x: f64) {
    if x.is_finite() {
      self.platform_x = x.clamp(0.0, 100.0);
    }
  }

  pub fn nudge_platform(&mut self, steps: i32) {
    let x = self.platform_x + f64::from(steps) * self.platform_step;
    self.move_platform(x);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  fn field(pool: &[i64], seq: &[i64]) -> CatchField {
    CatchField::new(pool, seq, &CatchCfg::default(), 8000, 16)
  }

  #[test]
  fn every_needed_value_eventually_spawns() {
    let seq = vec![3, 6, 12, 24];
    let pool = vec![3, 6, 12, 24, 41, 43, 47, 50, 52, 55, 57, 59];
    for seed in 0..50 {
      let mut rng = StdRng::seed_from_u64(seed);
      let cursor = SequenceCursor::new(seq.clone());
      let mut f = field(&pool, &seq);
      let mut seen = HashSet::new();
      for _ in 0..40 {
        if let SpawnOutcome::Spawned { value, id, .. } = f.spawn_tick(&mut rng, &cursor) {
          seen.insert(value);
          f.expire(id);
        }
      }
      assert!(seq.iter().all(|v| seen.contains(v)), "seed {seed}: {seen:?}");
    }
  }

  #[test]
  fn concurrency_cap_skips_spawns() {
    let seq = vec![1, 2, 3, 4];
    let mut rng = StdRng::seed_from_u64(9);
    let cursor = SequenceCursor::new(seq.clone());
    let mut f = field(&[1, 2, 3, 4, 50], &seq);
    for _ in 0..6 {
      assert!(matches!(f.spawn_tick(&mut rng, &cursor), SpawnOutcome::Spawned { .. }));
    }
    assert_eq!(f.spawn_tick(&mut rng, &cursor), SpawnOutcome::Skipped);
    assert_eq!(f.items().len(), 6);
  }

  #[test]
  fn spawner_halts_after_ceiling_once_all_needed_seen() {
    let seq = vec![7, 8, 9, 10];
    let mut rng = StdRng::seed_from_u64(5);
    let cursor = SequenceCursor::new(seq.clone());
    let mut cfg = CatchCfg::default();
    cfg.max_spawns = 10;
    let mut f = CatchField::new(&[7, 8, 9, 10, 30], &seq, &cfg, 8000, 16);
    let mut halted = false;
    for _ in 0..40 {
      match f.spawn_tick(&mut rng, &cursor) {
        SpawnOutcome::Spawned { id, .. } => {
          f.expire(id);
        }
        SpawnOutcome::Halted => {
          halted = true;
          break;
        }
        SpawnOutcome::Skipped => {}
      }
    }
    assert!(halted);
    assert!(f.is_halted());
  }

  fn falling(id: u32, value: i64) -> FallingItem {
    FallingItem { id, value, x: 50.0, spawn_frame: 0, processed: false, errored: false, watched: false }
  }

  #[test]
  fn hits_are_idempotent() {
    let seq = vec![5, 6, 7, 8];
    let mut cursor = SequenceCursor::new(seq.clone());
    let mut f = field(&[5, 6, 7, 8], &seq);
    f.items.push(falling(1, 5));
    assert_eq!(f.hit(1, &mut cursor), HitOutcome::Judged { verdict: Verdict::CorrectNext, value: 5 });
    assert_eq!(f.hit(1, &mut cursor), HitOutcome::Ignored);
    assert_eq!(cursor.index(), 1);
    assert!(f.items().is_empty());
  }

  #[test]
  fn wrong_hit_marks_item_and_blocks_reprocessing() {
    let seq = vec![5, 6, 7, 8];
    let mut cursor = SequenceCursor::new(seq.clone());
    let mut f = field(&[5, 6, 7, 8, 99], &seq);
    f.items.push(falling(1, 99));
    f.items.push(falling(2, 7));
    assert_eq!(f.hit(1, &mut cursor), HitOutcome::Judged { verdict: Verdict::Incorrect, value: 99 });
    assert_eq!(f.hit(1, &mut cursor), HitOutcome::Ignored);
    assert_eq!(f.hit(2, &mut cursor), HitOutcome::Judged { verdict: Verdict::CorrectButOutOfOrder, value: 7 });
    assert!(f.items().iter().all(|i| i.errored));
    assert_eq!(f.expire(1), ExpireOutcome::Gone);
    assert!(f.remove(2));
    assert_eq!(cursor.index(), 0);
  }

  #[test]
  fn only_items_watched_at_spawn_count_as_missed() {
    let seq = vec![5, 6, 7, 8];
    let mut f = field(&[5, 6, 7, 8], &seq);
    f.items.push(FallingItem { watched: true, ..falling(100, 5) });
    f.items.push(falling(101, 7));
    f.items.push(falling(102, 5));
    assert_eq!(f.expire(101), ExpireOutcome::Expired { missed: false, value: 7 });
    assert_eq!(f.expire(102), ExpireOutcome::Expired { missed: false, value: 5 });
    assert_eq!(f.expire(100), ExpireOutcome::Expired { missed: true, value: 5 });
    assert_eq!(f.expire(100), ExpireOutcome::Gone);
  }

  #[test]
  fn spawn_watches_needed_items_matching_the_expected_value() {
    let seq = vec![1, 2, 3, 4];
    let mut rng = StdRng::seed_from_u64(11);
    let cursor = SequenceCursor::new(seq.clone());
    let mut f = field(&[1, 2, 3, 4], &seq);
    let mut watched_ones = 0;
    for _ in 0..30 {
      if let SpawnOutcome::Spawned { id, value, needed } = f.spawn_tick(&mut rng, &cursor) {
        let item = f.items().iter().find(|i| i.id == id).cloned().unwrap();
        assert_eq!(item.watched, needed && value == 1);
        watched_ones += usize::from(item.watched);
        f.expire(id);
      }
    }
    assert!(watched_ones >= 1);
  }

  #[test]
  fn fifth_tick_forces_the_next_queued_value() {
    let seq = vec![11, 12, 13, 14];
    let pool = vec![11, 12, 13, 14, 90, 91, 92, 93];
    for seed in 0..30 {
      let mut rng = StdRng::seed_from_u64(seed);
      let cursor = SequenceCursor::new(seq.clone());
      let mut f = field(&pool, &seq);
      for _ in 0..4 {
        if let SpawnOutcome::Spawned { id, .. } = f.spawn_tick(&mut rng, &cursor) {
          f.expire(id);
        }
      }
      let queued = f.needed_queue[f.needed_cursor];
      let forced_before = f.needed_cursor;
      let outcome = f.spawn_tick(&mut rng, &cursor);
      assert_eq!(outcome, SpawnOutcome::Spawned { id: 5, value: queued, needed: true }, "seed {seed}");
      assert_eq!(f.needed_cursor, forced_before + 1);
      assert_eq!(f.ticks_since_needed, 0);
    }
  }

  #[test]
  fn three_ticks_without_a_needed_value_force_one() {
    let seq = vec![11, 12, 13, 14];
    let mut rng = StdRng::seed_from_u64(2);
    let cursor = SequenceCursor::new(seq.clone());
    let mut f = field(&[11, 12, 13, 14, 90], &seq);
    f.spawn_count = 5;
    f.ticks_since_needed = STARVATION_TICKS;
    assert_eq!(f.spawn_tick(&mut rng, &cursor), SpawnOutcome::Spawned { id: 1, value: 11, needed: true });
    assert_eq!(f.needed_cursor, 1);
    assert_eq!(f.ticks_since_needed, 0);

    // Below the starvation threshold and off the fifth tick, nothing is forced.
    f.ticks_since_needed = STARVATION_TICKS - 1;
    f.spawn_tick(&mut rng, &cursor);
    assert_eq!(f.needed_cursor, 1);
  }

  #[test]
  fn platform_collects_items_at_the_catch_line() {
    let seq = vec![5, 6, 7, 8];
    let mut cfg = CatchCfg::default();
    cfg.mode = CatchMode::Platform;
    let mut f = CatchField::new(&[5], &seq, &cfg, 1000, 100);
    f.items.push(FallingItem { x: 20.0, ..falling(1, 5) });
    f.move_platform(20.0);
    for _ in 0..8 {
      assert!(f.advance_frame().is_empty());
    }
    assert_eq!(f.advance_frame(), vec![1]);

    f.nudge_platform(5);
    assert_eq!(f.platform_x(), 40.0);
    assert!(f.advance_frame().is_empty());
  }
}
