//! Loading game tuning (difficulty table, scoring, timing, catch mode, storage) from TOML.
//!
//! See `GameConfig` for the expected schema. Every section is optional; a missing
//! or broken file yields the built-in defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::domain::Difficulty;

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct GameConfig {
  pub scoring: ScoringCfg,
  pub timing: TimingCfg,
  pub difficulty: DifficultyTable,
  pub catch: CatchCfg,
  pub storage: StorageCfg,
  /// Developer shortcut: a level jump unlocks every level first.
  pub dev_unlock_all: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ScoringCfg {
  pub base_points: f64,
  pub penalty: f64,
}

impl Default for ScoringCfg {
  fn default() -> Self {
    Self { base_points: 100.0, penalty: 10.0 }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TimingCfg {
  pub min_sublevel_seconds: u32,
  pub per_level_time_cut: u32,
  pub start_delay_ms: u64,
  pub solve_delay_ms: u64,
  pub transition_delay_ms: u64,
  pub error_flash_ms: u64,
  pub slot_flash_ms: u64,
  pub error_remove_ms: u64,
  pub frame_ms: u64,
}

impl Default for TimingCfg {
  fn default() -> Self {
    Self {
      min_sublevel_seconds: 25,
      per_level_time_cut: 5,
      start_delay_ms: 500,
      solve_delay_ms: 500,
      transition_delay_ms: 1500,
      error_flash_ms: 450,
      slot_flash_ms: 400,
      error_remove_ms: 500,
      frame_ms: 16,
    }
  }
}

/// Fixed tuning values of one difficulty.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct DifficultyTuning {
  /// Base seconds per sub-level.
  pub time: u32,
  /// Base fall window of a level-2 item, in seconds.
  pub fall_duration: f64,
  /// Level-2 spawn interval.
  pub spawn_ms: u64,
  pub multiplier: f64,
  pub max_number: i64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DifficultyTable {
  pub easy: DifficultyTuning,
  pub medium: DifficultyTuning,
  pub hard: DifficultyTuning,
}

impl Default for DifficultyTable {
  fn default() -> Self {
    Self {
      easy: DifficultyTuning { time: 70, fall_duration: 9.0, spawn_ms: 1200, multiplier: 1.0, max_number: 60 },
      medium: DifficultyTuning { time: 55, fall_duration: 7.0, spawn_ms: 950, multiplier: 1.5, max_number: 100 },
      hard: DifficultyTuning { time: 45, fall_duration: 6.0, spawn_ms: 800, multiplier: 2.0, max_number: 150 },
    }
  }
}

impl DifficultyTable {
  pub fn get(&self, difficulty: Difficulty) -> &DifficultyTuning {
    match difficulty {
      Difficulty::Easy => &self.easy,
      Difficulty::Medium => &self.medium,
      Difficulty::Hard => &self.hard,
    }
  }
}

/// How level-2 items are claimed.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CatchMode {
  /// The player clicks a falling item.
  #[default]
  Click,
  /// Items are claimed when they reach a player-steered platform.
  Platform,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CatchCfg {
  pub mode: CatchMode,
  pub max_on_screen: usize,
  pub max_spawns: u32,
  /// Platform width in percent of the field.
  pub platform_width: f64,
  /// Platform movement per nudge, in percent of the field.
  pub platform_step: f64,
  /// Fall progress (0..1) at which an item reaches the platform.
  pub catch_line: f64,
  pub min_fall_seconds: f64,
}

impl Default for CatchCfg {
  fn default() -> Self {
    Self {
      mode: CatchMode::Click,
      max_on_screen: 6,
      max_spawns: 100,
      platform_width: 16.0,
      platform_step: 4.0,
      catch_line: 0.88,
      min_fall_seconds: 3.8,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StorageCfg {
  pub path: PathBuf,
  pub quota_bytes: usize,
}

impl Default for StorageCfg {
  fn default() -> Self {
    Self { path: PathBuf::from("./data/numquest.json"), quota_bytes: 5_000_000 }
  }
}

impl GameConfig {
  pub fn tuning(&self, difficulty: Difficulty) -> &DifficultyTuning {
    self.difficulty.get(difficulty)
  }

  /// Seconds on the clock when a sub-level of `level` starts.
  pub fn sublevel_seconds(&self, difficulty: Difficulty, level: u8) -> u32 {
    let base = self.tuning(difficulty).time;
    let cut = u32::from(level.saturating_sub(1)) * self.timing.per_level_time_cut;
    base.saturating_sub(cut).max(self.timing.min_sublevel_seconds)
  }

  /// Level-2 fall window in milliseconds, shorter on later levels.
  pub fn fall_ms(&self, difficulty: Difficulty, level: u8) -> u64 {
    let base = self.tuning(difficulty).fall_duration;
    let secs = (base - f64::from(level) * 0.5).clamp(self.catch.min_fall_seconds.min(base), base);
    (secs * 1000.0).round() as u64
  }
}

/// Load `GameConfig` from GAME_CONFIG_PATH. On any IO/parse error, returns defaults.
pub fn load_game_config_from_env() -> GameConfig {
  let Ok(path) = std::env::var("GAME_CONFIG_PATH") else {
    info!(target: "numquest", "GAME_CONFIG_PATH not set; using built-in tuning");
    return GameConfig::default();
  };
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<GameConfig>(&s) {
      Ok(cfg) => {
        info!(target: "numquest", %path, catch_mode = ?cfg.catch.mode, "Loaded game config (TOML)");
        cfg
      }
      Err(e) => {
        error!(target: "numquest", %path, error = %e, "Failed to parse TOML config; using defaults");
        GameConfig::default()
      }
    },
    Err(e) => {
      error!(target: "numquest", %path, error = %e, "Failed to read TOML config file; using defaults");
      GameConfig::default()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sublevel_time_shrinks_per_level_but_not_below_floor() {
    let cfg = GameConfig::default();
    assert_eq!(cfg.sublevel_seconds(Difficulty::Easy, 1), 70);
    assert_eq!(cfg.sublevel_seconds(Difficulty::Easy, 3), 60);
    assert_eq!(cfg.sublevel_seconds(Difficulty::Hard, 3), 35);

    let mut tight = GameConfig::default();
    tight.difficulty.hard.time = 27;
    assert_eq!(tight.sublevel_seconds(Difficulty::Hard, 3), 25);
  }

  #[test]
  fn fall_window_is_level_scaled_and_clamped() {
    let cfg = GameConfig::default();
    assert_eq!(cfg.fall_ms(Difficulty::Easy, 2), 8000);
    assert_eq!(cfg.fall_ms(Difficulty::Hard, 2), 5000);

    let mut fast = GameConfig::default();
    fast.difficulty.hard.fall_duration = 4.0;
    assert_eq!(fast.fall_ms(Difficulty::Hard, 2), 3800);
  }

  #[test]
  fn partial_toml_keeps_defaults_for_missing_fields() {
    let src = r#"
      dev_unlock_all = true
      [scoring]
      penalty = 5.0
      [difficulty.easy]
      time = 90
      fall_duration = 10.0
      spawn_ms = 1000
      multiplier = 1.0
      max_number = 40
      [catch]
      mode = "platform"
    "#;
    let cfg: GameConfig = toml::from_str(src).expect("config");
    assert!(cfg.dev_unlock_all);
    assert_eq!(cfg.scoring.penalty, 5.0);
    assert_eq!(cfg.scoring.base_points, 100.0);
    assert_eq!(cfg.difficulty.easy.max_number, 40);
    assert_eq!(cfg.difficulty.hard.max_number, 150);
    assert_eq!(cfg.catch.mode, CatchMode::Platform);
    assert_eq!(cfg.catch.max_on_screen, 6);
  }

  #[test]
  fn bundled_sample_matches_defaults() {
    let cfg: GameConfig = toml::from_str(include_str!("../game.toml")).expect("sample config");
    let defaults = GameConfig::default();
    assert_eq!(cfg.difficulty.medium, defaults.difficulty.medium);
    assert_eq!(cfg.timing.frame_ms, defaults.timing.frame_ms);
    assert_eq!(cfg.storage.path, defaults.storage.path);
    assert_eq!(cfg.catch.mode, CatchMode::Click);
  }
}
