//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Binding a validated player name
//!   - Saving a finished game (rating upsert + last result)
//!   - Ranked rating rows and the last-result summary

use thiserror::Error;
use tracing::{info, instrument};

use crate::domain::RatingRecord;
use crate::identity::{validate_name, NameError};
use crate::leaderboard::SortState;
use crate::protocol::{LastResultOut, RatingRow};
use crate::storage::{Storage, StorageError};

#[derive(Debug, Error)]
pub enum RegisterError {
  #[error(transparent)]
  Invalid(#[from] NameError),
  #[error(transparent)]
  Storage(#[from] StorageError),
}

#[instrument(level = "info", skip(storage, raw), fields(raw_len = raw.len()))]
pub fn register_player(storage: &Storage, raw: &str) -> Result<String, RegisterError> {
  let name = validate_name(raw)?;
  storage.set_current_player(&name)?;
  info!(target: "storage", %name, "Player bound");
  Ok(name)
}

/// Save a finished game: rating upsert, then last result. Success is reported only
/// when both writes succeed. A failed second write leaves the upsert in place;
/// both writes are idempotent, so retrying the save converges.
#[instrument(level = "info", skip(storage, record), fields(name = %record.name, score = record.score, reason = record.reason.as_str()))]
pub fn persist_result(storage: &Storage, record: &RatingRecord) -> Result<(), StorageError> {
  storage.upsert_rating(record.clone())?;
  storage.save_last_result(record)?;
  info!(target: "storage", "Result saved");
  Ok(())
}

pub fn rating_rows(storage: &Storage, sort: SortState) -> Vec<RatingRow> {
  let mut list = storage.rating_list();
  sort.apply(&mut list);
  list.into_iter().enumerate().map(|(i, record)| RatingRow { rank: i + 1, record }).collect()
}

pub fn last_result(storage: &Storage) -> LastResultOut {
  let record = storage.last_result();
  let name = storage.current_player().or_else(|| record.as_ref().map(|r| r.name.clone()));
  let best_score = name.and_then(|n| storage.player_records(&n).iter().map(|r| r.score).max());
  LastResultOut { record, best_score }
}
