//! Per-session timers as tokio tasks.
//!
//! Every fire carries the generation it was armed under. The session drops any
//! fire whose generation is no longer current, so a task that was aborted after
//! its message was already queued cannot touch a newer sub-level.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Recurring timers of a live sub-level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
  /// One second off the clock.
  Countdown,
  /// Level-2 spawn interval.
  Spawn,
  /// Level-2 platform animation frame.
  Frame,
}

/// One-shot actions scheduled after a delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deferred {
  StartSublevel,
  CompleteSublevel,
  FinishWin,
  RemoveItem { id: u32 },
  ExpireItem { id: u32 },
  ClearGridFlag { value: i64 },
  ClearSlotFlash { slot: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FireKind {
  Tick(Tick),
  Deferred(Deferred),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerFire {
  pub generation: u64,
  pub kind: FireKind,
}

/// Which recurring timers a sub-level needs besides the countdown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimerPlan {
  pub spawn_ms: Option<u64>,
  pub frame_ms: Option<u64>,
}

pub struct Scheduler {
  tx: UnboundedSender<TimerFire>,
  recurring: Vec<JoinHandle<()>>,
  spawner: Option<JoinHandle<()>>,
  pending: Vec<JoinHandle<()>>,
}

impl Scheduler {
  pub fn new(tx: UnboundedSender<TimerFire>) -> Self {
    Self { tx, recurring: Vec::new(), spawner: None, pending: Vec::new() }
  }

  /// Start the countdown and whatever else `plan` asks for.
  pub fn arm(&mut self, generation: u64, plan: TimerPlan) {
    self.recurring.push(self.every(generation, 1000, Tick::Countdown));
    if let Some(ms) = plan.frame_ms {
      self.recurring.push(self.every(generation, ms, Tick::Frame));
    }
    if let Some(ms) = plan.spawn_ms {
      if let Some(old) = self.spawner.replace(self.every(generation, ms, Tick::Spawn)) {
        old.abort();
      }
    }
    debug!(target: "game", generation, ?plan, "timers armed");
  }

  pub fn after(&mut self, generation: u64, delay_ms: u64, deferred: Deferred) {
    self.pending.retain(|h| !h.is_finished());
    let tx = self.tx.clone();
    self.pending.push(tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(delay_ms)).await;
      let _ = tx.send(TimerFire { generation, kind: FireKind::Deferred(deferred) });
    }));
  }

  /// Stop spawning but keep the countdown and pending actions.
  pub fn halt_spawner(&mut self) {
    if let Some(h) = self.spawner.take() {
      h.abort();
    }
  }

  /// Abort every timer of the session.
  pub fn disarm(&mut self) {
    let count = self.recurring.len() + self.pending.len() + usize::from(self.spawner.is_some());
    for h in self.recurring.drain(..).chain(self.pending.drain(..)).chain(self.spawner.take()) {
      h.abort();
    }
    if count > 0 {
      debug!(target: "game", count, "timers disarmed");
    }
  }

  #[cfg(test)]
  fn active(&self) -> usize {
    self.recurring.iter().chain(self.pending.iter()).chain(self.spawner.iter()).filter(|h| !h.is_finished()).count()
  }

  fn every(&self, generation: u64, period_ms: u64, tick: Tick) -> JoinHandle<()> {
    let tx = self.tx.clone();
    let period = Duration::from_millis(period_ms.max(1));
    tokio::spawn(async move {
      let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
      interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
      loop {
        interval.tick().await;
        if tx.send(TimerFire { generation, kind: FireKind::Tick(tick) }).is_err() {
          break;
        }
      }
    })
  }
}

impl Drop for Scheduler {
  fn drop(&mut self) {
    self.disarm();
  }
}
