//! Game session: level/sub-level state machine, scoring, and timer reactions.
//!
//! `Session` never touches a socket or a timer. Every operation mutates the
//! session and returns the `Effect`s the connection driver must carry out, in
//! order. Timer fires come back through `on_fire` and are dropped unless their
//! generation matches the live sub-level.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::{CatchMode, GameConfig};
use crate::domain::{Difficulty, FinishReason, RatingRecord, Task, TaskKind};
use crate::expression::{evaluate, generate_expression_task, EvalError};
use crate::rules::{generate_sequence_task, RuleSet};
use crate::runtime::assembly::{AssemblyBoard, AssemblyError, SlotKind};
use crate::runtime::catch::{CatchField, ExpireOutcome, HitOutcome, SpawnOutcome};
use crate::runtime::grid::{GridBoard, PickOutcome};
use crate::runtime::LevelRuntime;
use crate::scheduler::{Deferred, FireKind, Tick, TimerFire, TimerPlan};
use crate::util::{format_number, now_stamp};
use crate::validator::{SequenceCursor, Verdict};

pub const LEVELS: u8 = 3;
pub const SUBLEVELS_PER_LEVEL: u8 = 3;
const ANSWER_EPSILON: f64 = 0.01;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProgressionError {
  #[error("finish level {0} first")]
  LevelLocked(u8),
  #[error("choose a difficulty first")]
  NotStarted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  /// Waiting for a difficulty.
  Lobby,
  /// A sub-level is live and accepts input.
  Playing,
  /// Between sub-levels; input is ignored until the next start.
  Resolving,
  /// All levels cleared; the result is waiting to be saved.
  Won,
  Ended,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
  Info,
  Success,
  Error,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
  Notice { kind: NoticeKind, text: String },
  Hint(String),
  Arm { generation: u64, plan: TimerPlan },
  Disarm,
  HaltSpawner,
  After { generation: u64, delay_ms: u64, deferred: Deferred },
  /// The session is over. `Some` asks for the result to be saved first.
  Close { reason: Option<FinishReason> },
}

fn notice(kind: NoticeKind, text: impl Into<String>) -> Effect {
  Effect::Notice { kind, text: text.into() }
}

pub struct Session {
  cfg: Arc<GameConfig>,
  rng: StdRng,
  player: String,
  difficulty: Option<Difficulty>,
  level: u8,
  sublevel: u8,
  score: f64,
  time_left: i64,
  allow_levels: u8,
  generation: u64,
  phase: Phase,
  hint: String,
  cursor: SequenceCursor,
  task: Option<Task>,
  runtime: Option<LevelRuntime>,
}

impl Session {
  pub fn new(player: String, cfg: Arc<GameConfig>) -> Self {
    Self::with_rng(player, cfg, StdRng::from_entropy())
  }

  pub fn with_rng(player: String, cfg: Arc<GameConfig>, rng: StdRng) -> Self {
    Self {
      cfg,
      rng,
      player,
      difficulty: None,
      level: 1,
      sublevel: 1,
      score: 0.0,
      time_left: 0,
      allow_levels: 1,
      generation: 0,
      phase: Phase::Lobby,
      hint: String::new(),
      cursor: SequenceCursor::default(),
      task: None,
      runtime: None,
    }
  }

  pub fn player(&self) -> &str {
    &self.player
  }
  pub fn difficulty(&self) -> Option<Difficulty> {
    self.difficulty
  }
  pub fn level(&self) -> u8 {
    self.level
  }
  pub fn sublevel(&self) -> u8 {
    self.sublevel
  }
  pub fn score(&self) -> f64 {
    self.score
  }
  pub fn time_left(&self) -> i64 {
    self.time_left
  }
  pub fn allow_levels(&self) -> u8 {
    self.allow_levels
  }
  pub fn generation(&self) -> u64 {
    self.generation
  }
  pub fn phase(&self) -> Phase {
    self.phase
  }
  pub fn rule_text(&self) -> &str {
    &self.hint
  }
  pub fn cursor(&self) -> &SequenceCursor {
    &self.cursor
  }
  pub fn runtime(&self) -> Option<&LevelRuntime> {
    self.runtime.as_ref()
  }

  /// Target of the live expression task.
  pub fn target(&self) -> Option<f64> {
    match self.task.as_ref()?.kind {
      TaskKind::Expression { target, .. } => Some(target),
      TaskKind::Sequence { .. } => None,
    }
  }

  fn multiplier(&self) -> f64 {
    self.difficulty.map(|d| self.cfg.tuning(d).multiplier).unwrap_or(1.0)
  }

  fn add_score(&mut self, base: f64) {
    self.score += base * self.multiplier();
  }

  fn apply_penalty(&mut self) {
    self.score = (self.score - self.cfg.scoring.penalty * self.multiplier()).max(0.0);
  }

  fn bump(&mut self) -> u64 {
    self.generation += 1;
    self.generation
  }

  fn after(&self, delay_ms: u64, deferred: Deferred) -> Effect {
    Effect::After { generation: self.generation, delay_ms, deferred }
  }

  /// Tear down the live sub-level: no task, empty cursor.
  fn drop_task(&mut self) {
    self.cursor.clear();
    self.task = None;
    self.runtime = None;
  }

  #[instrument(level = "info", skip(self), fields(player = %self.player))]
  pub fn select_difficulty(&mut self, difficulty: Difficulty) -> Vec<Effect> {
    if self.phase != Phase::Lobby {
      return vec![notice(NoticeKind::Error, "Difficulty is already chosen")];
    }
    self.difficulty = Some(difficulty);
    self.score = 0.0;
    self.level = 1;
    self.sublevel = 1;
    self.allow_levels = 1;
    self.phase = Phase::Resolving;
    self.bump();
    info!(target: "game", %difficulty, "difficulty selected");
    vec![
      notice(NoticeKind::Info, "Get ready! Starting with level 1"),
      self.after(self.cfg.timing.start_delay_ms, Deferred::StartSublevel),
    ]
  }

  /// Enter `(level, sublevel)` with a fresh task and fresh timers.
  pub fn begin(&mut self, level: u8, sublevel: u8) -> Result<Vec<Effect>, ProgressionError> {
    let difficulty = self.difficulty.ok_or(ProgressionError::NotStarted)?;
    if level > self.allow_levels {
      return Err(ProgressionError::LevelLocked(self.allow_levels));
    }
    self.level = level;
    self.sublevel = sublevel;
    self.drop_task();
    let generation = self.bump();

    let max_number = self.cfg.tuning(difficulty).max_number;
    let task = match level {
      1 => generate_sequence_task(&mut self.rng, RuleSet::Grid, max_number),
      2 => generate_sequence_task(&mut self.rng, RuleSet::Catch, max_number),
      _ => generate_expression_task(&mut self.rng, difficulty),
    };
    let mut plan = TimerPlan::default();
    let runtime = match level {
      1 => LevelRuntime::Grid(GridBoard::new(&task.numbers)),
      2 => {
        plan.spawn_ms = Some(self.cfg.tuning(difficulty).spawn_ms);
        if self.cfg.catch.mode == CatchMode::Platform {
          plan.frame_ms = Some(self.cfg.timing.frame_ms);
        }
        LevelRuntime::Catch(CatchField::new(
          &task.numbers,
          &task.correct_sequence,
          &self.cfg.catch,
          self.cfg.fall_ms(difficulty, level),
          self.cfg.timing.frame_ms,
        ))
      }
      _ => LevelRuntime::Assembly(AssemblyBoard::new(&task.numbers, &task.operators)),
    };

    self.cursor = SequenceCursor::new(task.correct_sequence.clone());
    self.hint = task.rule_text.clone();
    self.time_left = i64::from(self.cfg.sublevel_seconds(difficulty, level));
    self.runtime = Some(runtime);
    self.task = Some(task);
    self.phase = Phase::Playing;
    debug!(target: "game", level, sublevel, generation, rule = %self.hint, answer = ?self.cursor.sequence(), "sub-level started");

    Ok(vec![Effect::Disarm, Effect::Arm { generation, plan }, notice(NoticeKind::Info, self.hint.clone())])
  }

  /// Developer level skip. Unlocks everything first when configured to.
  #[instrument(level = "info", skip(self))]
  pub fn jump_to_level(&mut self, level: u8) -> Vec<Effect> {
    if matches!(self.phase, Phase::Won | Phase::Ended) {
      return Vec::new();
    }
    if !(1..=LEVELS).contains(&level) {
      return vec![notice(NoticeKind::Error, format!("There is no level {level}"))];
    }
    if self.cfg.dev_unlock_all {
      self.allow_levels = LEVELS;
    }
    if self.difficulty.is_none() {
      self.difficulty = Some(Difficulty::Easy);
    }
    match self.begin(level, 1) {
      Ok(effects) => effects,
      Err(e) => vec![notice(NoticeKind::Error, e.to_string())],
    }
  }

  pub fn hint(&self) -> Vec<Effect> {
    if self.hint.is_empty() {
      return vec![notice(NoticeKind::Info, "No rule yet")];
    }
    vec![Effect::Hint(self.hint.clone())]
  }

  fn sequence_feedback(&mut self, verdict: Verdict, value: i64, reward: f64) -> Vec<Effect> {
    if verdict == Verdict::CorrectNext {
      self.add_score(reward);
      if self.cursor.is_complete() {
        return self.solved();
      }
      let next = self.cursor.expected().map(|v| v.to_string()).unwrap_or_default();
      return vec![notice(NoticeKind::Success, format!("Correct! Next: {next}"))];
    }
    self.apply_penalty();
    let expected = self.cursor.expected().map(|v| v.to_string()).unwrap_or_default();
    debug!(target: "game", value, ?verdict, score = self.score, "wrong pick");
    let text = match verdict {
      Verdict::CorrectButOutOfOrder => format!("That number is right, but pick {expected} first"),
      _ => format!("Wrong. Next: {expected}"),
    };
    vec![notice(NoticeKind::Error, text)]
  }

  /// Level 1: click a card.
  pub fn pick(&mut self, value: i64) -> Vec<Effect> {
    if self.phase != Phase::Playing {
      return Vec::new();
    }
    let Some(LevelRuntime::Grid(board)) = self.runtime.as_mut() else {
      return Vec::new();
    };
    let PickOutcome::Judged(verdict) = board.pick(value, &mut self.cursor) else {
      return Vec::new();
    };
    let mut effects = self.sequence_feedback(verdict, value, self.cfg.scoring.base_points / 3.0);
    if verdict != Verdict::CorrectNext {
      effects.push(self.after(self.cfg.timing.error_flash_ms, Deferred::ClearGridFlag { value }));
    }
    effects
  }

  fn hit(&mut self, id: u32) -> Vec<Effect> {
    let Some(LevelRuntime::Catch(field)) = self.runtime.as_mut() else {
      return Vec::new();
    };
    let HitOutcome::Judged { verdict, value } = field.hit(id, &mut self.cursor) else {
      return Vec::new();
    };
    let mut effects = self.sequence_feedback(verdict, value, self.cfg.scoring.base_points / 2.0);
    if verdict != Verdict::CorrectNext {
      effects.push(self.after(self.cfg.timing.error_remove_ms, Deferred::RemoveItem { id }));
    }
    effects
  }

  /// Level 2, click mode: claim a falling item.
  pub fn catch_item(&mut self, id: u32) -> Vec<Effect> {
    if self.phase != Phase::Playing || self.catch_mode() != Some(CatchMode::Click) {
      return Vec::new();
    }
    self.hit(id)
  }

  fn catch_mode(&self) -> Option<CatchMode> {
    match &self.runtime {
      Some(LevelRuntime::Catch(field)) => Some(field.mode()),
      _ => None,
    }
  }

  fn platform(&mut self) -> Option<&mut CatchField> {
    if self.phase != Phase::Playing {
      return None;
    }
    match self.runtime.as_mut() {
      Some(LevelRuntime::Catch(field)) if field.mode() == CatchMode::Platform => Some(field),
      _ => None,
    }
  }

  pub fn move_platform(&mut self, x: f64) -> Vec<Effect> {
    if let Some(field) = self.platform() {
      field.move_platform(x);
    }
    Vec::new()
  }

  pub fn nudge_platform(&mut self, delta: i32) -> Vec<Effect> {
    if let Some(field) = self.platform() {
      field.nudge_platform(delta);
    }
    Vec::new()
  }

  fn assembly(&mut self) -> Option<&mut AssemblyBoard> {
    if self.phase != Phase::Playing {
      return None;
    }
    match self.runtime.as_mut() {
      Some(LevelRuntime::Assembly(board)) => Some(board),
      _ => None,
    }
  }

  pub fn drop_card(&mut self, card_id: u32, slot: usize) -> Vec<Effect> {
    let Some(board) = self.assembly() else {
      return Vec::new();
    };
    match board.drop_card(card_id, slot) {
      Ok(_) => Vec::new(),
      Err(AssemblyError::KindMismatch { slot, expected }) => {
        let text = match expected {
          SlotKind::Number => "Only a number fits here",
          SlotKind::Operator => "Only an operation fits here",
        };
        vec![notice(NoticeKind::Error, text), self.after(self.cfg.timing.slot_flash_ms, Deferred::ClearSlotFlash { slot })]
      }
      Err(e) => vec![notice(NoticeKind::Error, e.to_string())],
    }
  }

  pub fn clear_slot(&mut self, slot: usize) -> Vec<Effect> {
    let Some(board) = self.assembly() else {
      return Vec::new();
    };
    match board.clear_slot(slot) {
      Ok(_) => Vec::new(),
      Err(e) => vec![notice(NoticeKind::Error, e.to_string())],
    }
  }

  pub fn return_card(&mut self, card_id: u32) -> Vec<Effect> {
    let Some(board) = self.assembly() else {
      return Vec::new();
    };
    match board.return_card(card_id) {
      Ok(_) => Vec::new(),
      Err(e) => vec![notice(NoticeKind::Error, e.to_string())],
    }
  }

  pub fn slot_hint(&self, slot: usize) -> Vec<Effect> {
    match AssemblyBoard::slot_hint(slot) {
      Ok(text) => vec![Effect::Hint(text.to_string())],
      Err(e) => vec![notice(NoticeKind::Error, e.to_string())],
    }
  }

  /// Level 3: evaluate the five slots against the target.
  #[instrument(level = "debug", skip(self))]
  pub fn check_expression(&mut self) -> Vec<Effect> {
    let Some(board) = self.assembly() else {
      return Vec::new();
    };
    let parts = match board.assembled() {
      Ok(parts) => parts,
      Err(_) => return vec![notice(NoticeKind::Error, "Fill all slots")],
    };
    let Some(TaskKind::Expression { target, solution }) = self.task.as_ref().map(|t| t.kind.clone()) else {
      return Vec::new();
    };
    let result = match evaluate(parts.a, parts.op1, parts.b, parts.op2, parts.c) {
      Ok(r) => r,
      Err(EvalError::DivisionByZero) => return vec![notice(NoticeKind::Error, "Division by zero!")],
    };
    if (result - target).abs() < ANSWER_EPSILON {
      self.add_score(self.cfg.scoring.base_points);
      return self.solved();
    }
    self.apply_penalty();
    let target = format_number(target);
    vec![notice(
      NoticeKind::Error,
      format!(
        "Wrong, got {}, need {target}. Correct solution: {} = {target}",
        format_number(result),
        solution.render()
      ),
    )]
  }

  /// Answer complete: freeze the clock and schedule completion.
  fn solved(&mut self) -> Vec<Effect> {
    self.phase = Phase::Resolving;
    self.bump();
    info!(target: "game", level = self.level, sublevel = self.sublevel, time_left = self.time_left, score = self.score, "sub-level solved");
    vec![
      Effect::Disarm,
      notice(NoticeKind::Success, format!("Sub-level {} complete!", self.sublevel)),
      self.after(self.cfg.timing.solve_delay_ms, Deferred::CompleteSublevel),
    ]
  }

  fn timed_out(&mut self) -> Vec<Effect> {
    self.phase = Phase::Resolving;
    self.drop_task();
    self.bump();
    info!(target: "game", level = self.level, sublevel = self.sublevel, score = self.score, "sub-level timed out");
    vec![
      Effect::Disarm,
      notice(NoticeKind::Error, "Time's up!"),
      notice(NoticeKind::Error, "Sub-level failed. Try again"),
      self.after(self.cfg.timing.transition_delay_ms, Deferred::StartSublevel),
    ]
  }

  /// Award the time bonus and move to the next sub-level, level, or the win.
  fn complete_sublevel(&mut self) -> Vec<Effect> {
    self.drop_task();
    let mut effects = Vec::new();
    let bonus = (self.time_left as f64 * self.multiplier()).round().max(0.0);
    if bonus > 0.0 {
      self.score += bonus;
      effects.push(notice(NoticeKind::Success, format!("Time bonus: +{bonus}")));
    }

    if self.sublevel < SUBLEVELS_PER_LEVEL {
      self.sublevel += 1;
    } else if self.level < LEVELS {
      self.level += 1;
      self.sublevel = 1;
      self.allow_levels = self.allow_levels.max(self.level);
      effects.push(notice(NoticeKind::Success, format!("Level {} unlocked", self.level)));
    } else {
      self.phase = Phase::Won;
      info!(target: "game", player = %self.player, score = self.score, "game won");
      effects.push(notice(NoticeKind::Success, "All levels cleared!"));
      effects.push(self.after(self.cfg.timing.transition_delay_ms, Deferred::FinishWin));
      return effects;
    }
    effects.push(self.after(self.cfg.timing.transition_delay_ms, Deferred::StartSublevel));
    effects
  }

  fn spawn(&mut self) -> Vec<Effect> {
    let generation = self.generation;
    let Some(LevelRuntime::Catch(field)) = self.runtime.as_mut() else {
      return Vec::new();
    };
    match field.spawn_tick(&mut self.rng, &self.cursor) {
      SpawnOutcome::Spawned { id, value, needed } => {
        debug!(target: "game", id, value, needed, "item spawned");
        vec![Effect::After { generation, delay_ms: field.fall_ms(), deferred: Deferred::ExpireItem { id } }]
      }
      SpawnOutcome::Halted => vec![Effect::HaltSpawner],
      SpawnOutcome::Skipped => Vec::new(),
    }
  }

  fn frame(&mut self) -> Vec<Effect> {
    let Some(LevelRuntime::Catch(field)) = self.runtime.as_mut() else {
      return Vec::new();
    };
    let mut effects = Vec::new();
    for id in field.advance_frame() {
      if self.phase != Phase::Playing {
        break;
      }
      effects.extend(self.hit(id));
    }
    effects
  }

  fn expire(&mut self, id: u32) -> Vec<Effect> {
    let Some(LevelRuntime::Catch(field)) = self.runtime.as_mut() else {
      return Vec::new();
    };
    match field.expire(id) {
      ExpireOutcome::Expired { missed: true, value } => {
        self.apply_penalty();
        debug!(target: "game", id, value, "needed item missed");
        vec![notice(NoticeKind::Error, "Missed a needed number")]
      }
      _ => Vec::new(),
    }
  }

  /// React to a timer. `None` when the fire belongs to an older generation.
  pub fn on_fire(&mut self, fire: TimerFire) -> Option<Vec<Effect>> {
    if fire.generation != self.generation || self.phase == Phase::Ended {
      debug!(target: "game", fired = fire.generation, current = self.generation, kind = ?fire.kind, "stale timer ignored");
      return None;
    }
    let effects = match fire.kind {
      FireKind::Tick(Tick::Countdown) if self.phase == Phase::Playing => {
        self.time_left -= 1;
        if self.time_left <= 0 {
          self.time_left = 0;
          self.timed_out()
        } else {
          Vec::new()
        }
      }
      FireKind::Tick(Tick::Spawn) if self.phase == Phase::Playing => self.spawn(),
      FireKind::Tick(Tick::Frame) if self.phase == Phase::Playing => self.frame(),
      FireKind::Tick(_) => Vec::new(),
      FireKind::Deferred(Deferred::StartSublevel) => match self.begin(self.level, self.sublevel) {
        Ok(effects) => effects,
        Err(e) => vec![notice(NoticeKind::Error, e.to_string())],
      },
      FireKind::Deferred(Deferred::CompleteSublevel) => self.complete_sublevel(),
      FireKind::Deferred(Deferred::FinishWin) => vec![Effect::Close { reason: Some(FinishReason::Win) }],
      FireKind::Deferred(Deferred::ExpireItem { id }) => self.expire(id),
      FireKind::Deferred(Deferred::RemoveItem { id }) => {
        if let Some(LevelRuntime::Catch(field)) = self.runtime.as_mut() {
          field.remove(id);
        }
        Vec::new()
      }
      FireKind::Deferred(Deferred::ClearGridFlag { value }) => {
        if let Some(LevelRuntime::Grid(board)) = self.runtime.as_mut() {
          board.clear_flag(value);
        }
        Vec::new()
      }
      FireKind::Deferred(Deferred::ClearSlotFlash { slot }) => {
        if let Some(LevelRuntime::Assembly(board)) = self.runtime.as_mut() {
          board.clear_flash(slot);
        }
        Vec::new()
      }
    };
    Some(effects)
  }

  /// Player pressed "finish". Before a difficulty is chosen this is a plain exit.
  #[instrument(level = "info", skip(self), fields(player = %self.player))]
  pub fn finish(&mut self) -> Vec<Effect> {
    match self.phase {
      Phase::Ended => Vec::new(),
      _ if self.difficulty.is_none() => self.exit(),
      Phase::Won => vec![Effect::Close { reason: Some(FinishReason::Win) }],
      _ => vec![Effect::Close { reason: Some(FinishReason::Manual) }],
    }
  }

  /// Leave without saving anything.
  pub fn exit(&mut self) -> Vec<Effect> {
    let mut effects = self.close();
    effects.push(Effect::Close { reason: None });
    effects
  }

  /// Stop every timer for good.
  pub fn close(&mut self) -> Vec<Effect> {
    self.phase = Phase::Ended;
    self.drop_task();
    self.bump();
    vec![Effect::Disarm]
  }

  /// Leaderboard record describing the session so far.
  pub fn closing_record(&self, reason: FinishReason) -> Result<RatingRecord, ProgressionError> {
    let difficulty = self.difficulty.ok_or(ProgressionError::NotStarted)?;
    Ok(RatingRecord {
      name: self.player.clone(),
      score: self.score.round() as i64,
      max_level: self.level,
      difficulty,
      date: now_stamp(),
      reason,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{ExpressionSolution, Operator};

  fn session_with(cfg: GameConfig) -> Session {
    Session::with_rng("Tester".into(), Arc::new(cfg), StdRng::seed_from_u64(42))
  }

  fn session() -> Session {
    session_with(GameConfig::default())
  }

  fn deferred(effects: &[Effect]) -> Option<TimerFire> {
    effects.iter().find_map(|e| match e {
      Effect::After { generation, deferred, .. } => {
        Some(TimerFire { generation: *generation, kind: FireKind::Deferred(*deferred) })
      }
      _ => None,
    })
  }

  fn tick(s: &Session, tick: Tick) -> TimerFire {
    TimerFire { generation: s.generation(), kind: FireKind::Tick(tick) }
  }

  fn started(difficulty: Difficulty) -> Session {
    let mut s = session();
    let effects = s.select_difficulty(difficulty);
    let start = deferred(&effects).expect("start scheduled");
    s.on_fire(start).expect("current");
    s
  }

  /// Replace the live level-1 board with a known one.
  fn with_grid(s: &mut Session, numbers: &[i64], answer: &[i64]) {
    s.runtime = Some(LevelRuntime::Grid(GridBoard::new(numbers)));
    s.cursor = SequenceCursor::new(answer.to_vec());
  }

  fn with_expression(s: &mut Session) {
    let solution = ExpressionSolution { a: 6, op1: Operator::Mul, b: 3, op2: Operator::Sub, c: 4 };
    s.level = 3;
    s.runtime = Some(LevelRuntime::Assembly(AssemblyBoard::new(
      &[6, 3, 4, 9],
      &[Operator::Mul, Operator::Sub, Operator::Add],
    )));
    s.cursor = SequenceCursor::default();
    s.task = Some(Task {
      rule_text: "Build an expression equal to 14".into(),
      numbers: vec![6, 3, 4, 9],
      operators: vec![Operator::Mul, Operator::Sub, Operator::Add],
      correct_sequence: Vec::new(),
      kind: TaskKind::Expression { target: 14.0, solution },
    });
  }

  #[test]
  fn difficulty_starts_level_one_after_delay() {
    let mut s = session();
    let effects = s.select_difficulty(Difficulty::Easy);
    assert!(effects.iter().any(|e| matches!(e, Effect::After { delay_ms: 500, deferred: Deferred::StartSublevel, .. })));
    assert_eq!(s.phase(), Phase::Resolving);

    let effects = s.on_fire(deferred(&effects).unwrap()).unwrap();
    assert_eq!(s.phase(), Phase::Playing);
    assert_eq!((s.level(), s.sublevel()), (1, 1));
    assert_eq!(s.time_left(), 70);
    assert!(s.cursor().sequence().len() >= 4);
    assert!(!s.rule_text().is_empty());
    assert!(effects.contains(&Effect::Arm { generation: s.generation(), plan: TimerPlan::default() }));
    assert!(matches!(s.runtime(), Some(LevelRuntime::Grid(_))));
  }

  #[test]
  fn difficulty_is_chosen_once() {
    let mut s = started(Difficulty::Medium);
    let effects = s.select_difficulty(Difficulty::Hard);
    assert!(matches!(&effects[0], Effect::Notice { kind: NoticeKind::Error, .. }));
    assert_eq!(s.difficulty(), Some(Difficulty::Medium));
  }

  #[test]
  fn solving_the_grid_scores_and_schedules_completion() {
    let mut s = started(Difficulty::Easy);
    let answer = s.cursor().sequence().to_vec();
    let mut last = Vec::new();
    for v in &answer {
      last = s.pick(*v);
    }
    let expected = answer.len() as f64 * 100.0 / 3.0;
    assert!((s.score() - expected).abs() < 1e-9);
    assert_eq!(s.phase(), Phase::Resolving);
    assert_eq!(last[0], Effect::Disarm);

    let before = s.score();
    let effects = s.on_fire(deferred(&last).unwrap()).unwrap();
    assert!((s.score() - (before + 70.0)).abs() < 1e-9);
    assert_eq!(s.sublevel(), 2);
    assert!(matches!(deferred(&effects), Some(TimerFire { kind: FireKind::Deferred(Deferred::StartSublevel), .. })));
  }

  #[test]
  fn wrong_picks_penalise_but_never_below_zero() {
    let mut s = started(Difficulty::Medium);
    with_grid(&mut s, &[4, 6, 9, 11, 2], &[2, 4, 6]);

    let effects = s.pick(6);
    assert_eq!(s.score(), 0.0);
    assert!(effects.iter().any(|e| matches!(e, Effect::Notice { text, .. } if text.contains("pick 2 first"))));
    assert!(effects.iter().any(|e| matches!(e, Effect::After { deferred: Deferred::ClearGridFlag { value: 6 }, .. })));

    s.pick(2);
    assert!((s.score() - 50.0).abs() < 1e-9);
    s.pick(9);
    assert!((s.score() - 35.0).abs() < 1e-9);
    for _ in 0..5 {
      s.pick(11);
    }
    assert_eq!(s.score(), 0.0);
    assert_eq!(s.cursor().index(), 1);
  }

  #[test]
  fn countdown_timeout_restarts_same_sublevel_with_fresh_task() {
    let mut s = started(Difficulty::Easy);
    with_grid(&mut s, &[4, 6, 9, 11, 2], &[2, 4, 6]);
    s.pick(2);
    s.pick(9);
    let score = s.score();
    s.time_left = 1;

    let effects = s.on_fire(tick(&s, Tick::Countdown)).unwrap();
    assert_eq!(s.time_left(), 0);
    assert_eq!(s.phase(), Phase::Resolving);
    assert_eq!(s.cursor().index(), 0);
    assert!(s.cursor().sequence().is_empty());
    assert!(s.runtime().is_none());
    assert!(effects.iter().any(|e| matches!(e, Effect::Notice { text, .. } if text == "Time's up!")));

    s.on_fire(deferred(&effects).unwrap()).unwrap();
    assert_eq!((s.level(), s.sublevel()), (1, 1));
    assert_eq!(s.time_left(), 70);
    assert_eq!(s.score(), score);
    assert_eq!(s.phase(), Phase::Playing);
  }

  #[test]
  fn stale_fires_are_ignored() {
    let mut s = started(Difficulty::Easy);
    let old = tick(&s, Tick::Countdown);
    s.on_fire(tick(&s, Tick::Countdown)).unwrap();
    assert_eq!(s.time_left(), 69);

    let restart = s.jump_to_level(1);
    assert!(restart.contains(&Effect::Disarm));
    assert!(s.on_fire(old).is_none());
    assert_eq!(s.time_left(), 70);
  }

  #[test]
  fn levels_unlock_monotonically() {
    let mut s = started(Difficulty::Easy);
    assert!(matches!(&s.jump_to_level(2)[0], Effect::Notice { kind: NoticeKind::Error, .. }));
    assert_eq!(s.allow_levels(), 1);

    s.sublevel = 3;
    s.time_left = 0;
    let effects = s.complete_sublevel();
    assert_eq!((s.level(), s.sublevel(), s.allow_levels()), (2, 1, 2));
    s.on_fire(deferred(&effects).unwrap()).unwrap();
    assert!(matches!(s.runtime(), Some(LevelRuntime::Catch(_))));
    assert_eq!(s.time_left(), 65);

    s.jump_to_level(1);
    assert_eq!(s.level(), 1);
    assert_eq!(s.allow_levels(), 2);
    s.jump_to_level(2);
    assert_eq!(s.level(), 2);
    assert!(matches!(&s.jump_to_level(3)[0], Effect::Notice { kind: NoticeKind::Error, .. }));
    assert_eq!(s.allow_levels(), 2);
  }

  #[test]
  fn dev_jump_unlocks_everything_and_defaults_to_easy() {
    let mut s = session_with(GameConfig { dev_unlock_all: true, ..GameConfig::default() });
    s.jump_to_level(3);
    assert_eq!(s.difficulty(), Some(Difficulty::Easy));
    assert_eq!(s.allow_levels(), 3);
    assert_eq!(s.level(), 3);
    assert!(s.target().is_some());
    assert!(matches!(s.runtime(), Some(LevelRuntime::Assembly(_))));
  }

  #[test]
  fn final_sublevel_wins_the_game() {
    let mut s = started(Difficulty::Hard);
    s.level = 3;
    s.sublevel = 3;
    s.allow_levels = 3;
    s.time_left = 10;
    let effects = s.complete_sublevel();
    assert_eq!(s.phase(), Phase::Won);
    assert!((s.score() - 20.0).abs() < 1e-9);

    let close = s.on_fire(deferred(&effects).unwrap()).unwrap();
    assert_eq!(close, vec![Effect::Close { reason: Some(FinishReason::Win) }]);
    // a failed save leaves the session open; finishing again keeps the win
    assert_eq!(s.finish(), vec![Effect::Close { reason: Some(FinishReason::Win) }]);
  }

  #[test]
  fn finish_before_difficulty_is_a_plain_exit() {
    let mut s = session();
    let effects = s.finish();
    assert_eq!(effects, vec![Effect::Disarm, Effect::Close { reason: None }]);
    assert_eq!(s.phase(), Phase::Ended);
    assert_eq!(s.closing_record(FinishReason::Manual), Err(ProgressionError::NotStarted));
  }

  #[test]
  fn manual_finish_produces_rounded_record() {
    let mut s = started(Difficulty::Easy);
    with_grid(&mut s, &[4, 6, 9, 11, 2], &[2, 4, 6]);
    s.pick(2);
    assert_eq!(s.finish(), vec![Effect::Close { reason: Some(FinishReason::Manual) }]);
    let record = s.closing_record(FinishReason::Manual).unwrap();
    assert_eq!(record.name, "Tester");
    assert_eq!(record.score, 33);
    assert_eq!(record.max_level, 1);
    assert_eq!(record.difficulty, Difficulty::Easy);
    assert_eq!(record.date.len(), "2024-01-01 12:00".len());

    assert_eq!(s.close(), vec![Effect::Disarm]);
    assert!(s.on_fire(tick(&s, Tick::Countdown)).is_none());
  }

  #[test]
  fn expression_check_scores_or_reveals_solution() {
    let mut s = started(Difficulty::Medium);
    with_expression(&mut s);
    assert_eq!(s.check_expression(), vec![notice(NoticeKind::Error, "Fill all slots")]);

    for (card, slot) in [(1, 0), (7, 1), (2, 2), (6, 3), (3, 4)] {
      assert!(s.drop_card(card, slot).is_empty());
    }
    s.score = 20.0;
    let effects = s.check_expression();
    assert_eq!(
      effects,
      vec![notice(NoticeKind::Error, "Wrong, got 5, need 14. Correct solution: 6 * 3 - 4 = 14")]
    );
    assert!((s.score() - 5.0).abs() < 1e-9);

    s.drop_card(5, 1);
    let effects = s.check_expression();
    assert_eq!(s.phase(), Phase::Resolving);
    assert!((s.score() - 155.0).abs() < 1e-9);
    assert!(matches!(deferred(&effects), Some(TimerFire { kind: FireKind::Deferred(Deferred::CompleteSublevel), .. })));
  }

  #[test]
  fn operator_in_number_slot_flashes() {
    let mut s = started(Difficulty::Easy);
    with_expression(&mut s);
    let effects = s.drop_card(5, 0);
    assert!(matches!(&effects[0], Effect::Notice { kind: NoticeKind::Error, .. }));
    let flash = deferred(&effects).unwrap();
    assert_eq!(flash.kind, FireKind::Deferred(Deferred::ClearSlotFlash { slot: 0 }));
    s.on_fire(flash).unwrap();
    let Some(LevelRuntime::Assembly(board)) = s.runtime() else { panic!("assembly") };
    assert!(!board.is_flashing(0));
    assert_eq!(s.slot_hint(1), vec![Effect::Hint("An operation goes here".into())]);
  }

  #[test]
  fn catching_is_idempotent_through_the_session() {
    let mut s = started(Difficulty::Easy);
    s.allow_levels = 2;
    s.begin(2, 1).unwrap();
    let expected = s.cursor().expected().unwrap();

    let mut target = None;
    for _ in 0..5 {
      let effects = s.on_fire(tick(&s, Tick::Spawn)).unwrap();
      let Some(Effect::After { deferred: Deferred::ExpireItem { id }, delay_ms, .. }) = effects.first() else {
        continue;
      };
      assert_eq!(*delay_ms, 8000);
      let Some(LevelRuntime::Catch(field)) = s.runtime() else { panic!("catch") };
      if field.items().iter().any(|i| i.id == *id && i.value == expected) {
        target = Some(*id);
        break;
      }
    }
    let id = target.expect("expected value spawned within five ticks");
    s.catch_item(id);
    assert!((s.score() - 50.0).abs() < 1e-9);
    assert!(s.catch_item(id).is_empty());
    assert!((s.score() - 50.0).abs() < 1e-9);
    assert_eq!(s.cursor().index(), 1);
  }

  #[test]
  fn missed_expected_item_costs_points() {
    let mut s = started(Difficulty::Easy);
    s.allow_levels = 2;
    s.begin(2, 1).unwrap();
    s.score = 30.0;
    let expected = s.cursor().expected().unwrap();
    let mut missed = false;
    for _ in 0..5 {
      let effects = s.on_fire(tick(&s, Tick::Spawn)).unwrap();
      let Some(fire) = deferred(&effects) else { continue };
      let FireKind::Deferred(Deferred::ExpireItem { id }) = fire.kind else { continue };
      let Some(LevelRuntime::Catch(field)) = s.runtime() else { panic!("catch") };
      if field.items().iter().any(|i| i.id == id && i.value == expected) {
        let effects = s.on_fire(fire).unwrap();
        assert_eq!(effects, vec![notice(NoticeKind::Error, "Missed a needed number")]);
        missed = true;
        break;
      }
    }
    assert!(missed);
    assert!((s.score() - 20.0).abs() < 1e-9);
    assert_eq!(s.cursor().index(), 0);
  }

  #[test]
  fn hint_repeats_the_rule() {
    let s = session();
    assert_eq!(s.hint(), vec![notice(NoticeKind::Info, "No rule yet")]);
    let s = started(Difficulty::Easy);
    assert_eq!(s.hint(), vec![Effect::Hint(s.rule_text().to_string())]);
  }
}
