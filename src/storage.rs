//! Device-local persistence of the current player, the rating, and the last result.
//!
//! Reads never fail: a missing, unreadable, or corrupted value yields the empty
//! default and a log line. Writes return `StorageError` so the caller can keep
//! the player where they are instead of losing the result.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::domain::RatingRecord;

pub const KEY_CURRENT_PLAYER: &str = "currentPlayerName";
pub const KEY_RATING: &str = "playersRating";
pub const KEY_LAST_RESULT: &str = "lastGameResult";

/// Serialized rating size above which a warning is logged.
const RATING_WARN_BYTES: usize = 1_000_000;

#[derive(Debug, Error)]
pub enum StorageError {
  #[error("storage unavailable: {0}")]
  Unavailable(String),
  #[error("storage quota exceeded: {needed} of {quota} bytes")]
  QuotaExceeded { needed: usize, quota: usize },
  #[error("serialization failed: {0}")]
  Serialize(#[from] serde_json::Error),
}

impl From<std::io::Error> for StorageError {
  fn from(e: std::io::Error) -> Self {
    StorageError::Unavailable(e.to_string())
  }
}

/// String key-value store in the manner of browser `localStorage`.
pub trait KeyValueStore: Send {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
  fn set(&mut self, key: &str, value: String) -> Result<(), StorageError>;
  fn remove(&mut self, key: &str) -> Result<(), StorageError>;
  fn keys(&self) -> Result<Vec<String>, StorageError>;
  fn clear(&mut self) -> Result<(), StorageError>;
}

fn footprint(entries: &BTreeMap<String, String>) -> usize {
  entries.iter().map(|(k, v)| k.len() + v.len()).sum()
}

fn check_quota(entries: &BTreeMap<String, String>, key: &str, value: &str, quota: usize) -> Result<(), StorageError> {
  let current = footprint(entries) - entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
  let needed = current + key.len() + value.len();
  if needed > quota {
    return Err(StorageError::QuotaExceeded { needed, quota });
  }
  Ok(())
}

#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: BTreeMap<String, String>,
  quota: Option<usize>,
}

impl MemoryStore {
  pub fn with_quota(quota: usize) -> Self {
    Self { entries: BTreeMap::new(), quota: Some(quota) }
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    Ok(self.entries.get(key).cloned())
  }

  fn set(&mut self, key: &str, value: String) -> Result<(), StorageError> {
    if let Some(quota) = self.quota {
      check_quota(&self.entries, key, &value, quota)?;
    }
    self.entries.insert(key.to_string(), value);
    Ok(())
  }

  fn remove(&mut self, key: &str) -> Result<(), StorageError> {
    self.entries.remove(key);
    Ok(())
  }

  fn keys(&self) -> Result<Vec<String>, StorageError> {
    Ok(self.entries.keys().cloned().collect())
  }

  fn clear(&mut self) -> Result<(), StorageError> {
    self.entries.clear();
    Ok(())
  }
}

/// All entries as one JSON object in a single file, rewritten on every change.
#[derive(Debug)]
pub struct FileStore {
  path: PathBuf,
  quota: usize,
  entries: BTreeMap<String, String>,
}

impl FileStore {
  /// Open or create the store. A file that is not a JSON object of strings starts empty.
  pub fn open(path: impl Into<PathBuf>, quota: usize) -> Result<Self, StorageError> {
    let path = path.into();
    let entries = match std::fs::read_to_string(&path) {
      Ok(raw) => match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
        Ok(entries) => entries,
        Err(e) => {
          warn!(target: "storage", path = %path.display(), error = %e, "Store file is corrupted; starting empty");
          BTreeMap::new()
        }
      },
      Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
      Err(e) => return Err(e.into()),
    };
    info!(target: "storage", path = %path.display(), keys = entries.len(), "Opened file store");
    Ok(Self { path, quota, entries })
  }

  fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
    if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
      std::fs::create_dir_all(dir)?;
    }
    let body = serde_json::to_string(entries)?;
    let tmp = self.path.with_extension("tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, &self.path)?;
    Ok(())
  }

  /// Persist `next` and adopt it only when the write succeeded.
  fn commit(&mut self, next: BTreeMap<String, String>) -> Result<(), StorageError> {
    self.flush(&next)?;
    self.entries = next;
    Ok(())
  }
}

impl KeyValueStore for FileStore {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    Ok(self.entries.get(key).cloned())
  }

  fn set(&mut self, key: &str, value: String) -> Result<(), StorageError> {
    check_quota(&self.entries, key, &value, self.quota)?;
    let mut next = self.entries.clone();
    next.insert(key.to_string(), value);
    self.commit(next)
  }

  fn remove(&mut self, key: &str) -> Result<(), StorageError> {
    if !self.entries.contains_key(key) {
      return Ok(());
    }
    let mut next = self.entries.clone();
    next.remove(key);
    self.commit(next)
  }

  fn keys(&self) -> Result<Vec<String>, StorageError> {
    Ok(self.entries.keys().cloned().collect())
  }

  fn clear(&mut self) -> Result<(), StorageError> {
    self.commit(BTreeMap::new())
  }
}

fn parse_rating(raw: Option<String>) -> Vec<RatingRecord> {
  let Some(raw) = raw else {
    return Vec::new();
  };
  let items = match serde_json::from_str::<Value>(&raw) {
    Ok(Value::Array(items)) => items,
    Ok(_) => {
      warn!(target: "storage", "Rating is not a list; treating as empty");
      return Vec::new();
    }
    Err(e) => {
      warn!(target: "storage", error = %e, "Rating is corrupted; treating as empty");
      return Vec::new();
    }
  };
  items
    .into_iter()
    .filter_map(|item| match serde_json::from_value::<RatingRecord>(item) {
      Ok(r) => Some(r),
      Err(e) => {
        debug!(target: "storage", error = %e, "Skipping malformed rating entry");
        None
      }
    })
    .collect()
}

/// Player, rating, and last-result persistence over any `KeyValueStore`.
pub struct Storage {
  store: Mutex<Box<dyn KeyValueStore>>,
}

impl Storage {
  pub fn new(store: impl KeyValueStore + 'static) -> Self {
    Self { store: Mutex::new(Box::new(store)) }
  }

  /// File-backed storage; falls back to memory when the file cannot be opened.
  pub fn open_or_memory(path: &Path, quota: usize) -> Self {
    match FileStore::open(path, quota) {
      Ok(store) => Self::new(store),
      Err(e) => {
        error!(target: "storage", path = %path.display(), error = %e, "File store unavailable; results last until restart");
        Self::new(MemoryStore::with_quota(quota))
      }
    }
  }

  fn with_store<T>(&self, f: impl FnOnce(&mut dyn KeyValueStore) -> Result<T, StorageError>) -> Result<T, StorageError> {
    let mut guard = self.store.lock().map_err(|_| StorageError::Unavailable("store lock poisoned".into()))?;
    f(guard.as_mut())
  }

  fn read(&self, key: &str) -> Option<String> {
    match self.with_store(|s| s.get(key)) {
      Ok(v) => v,
      Err(e) => {
        error!(target: "storage", key, error = %e, "Read failed; using default");
        None
      }
    }
  }

  fn write(&self, key: &str, value: String) -> Result<(), StorageError> {
    self.with_store(|s| s.set(key, value)).map_err(|e| {
      error!(target: "storage", key, error = %e, "Write failed");
      e
    })
  }

  fn delete(&self, key: &str) -> Result<(), StorageError> {
    self.with_store(|s| s.remove(key)).map_err(|e| {
      error!(target: "storage", key, error = %e, "Remove failed");
      e
    })
  }

  pub fn set_current_player(&self, name: &str) -> Result<(), StorageError> {
    self.write(KEY_CURRENT_PLAYER, name.to_string())
  }

  /// Bound player name, `None` when nobody signed in.
  pub fn current_player(&self) -> Option<String> {
    self.read(KEY_CURRENT_PLAYER).filter(|n| !n.is_empty())
  }

  pub fn clear_current_player(&self) -> Result<(), StorageError> {
    self.delete(KEY_CURRENT_PLAYER)
  }

  /// Stored rating in stored order. Anything that is not a list reads as empty;
  /// entries that are not valid records are skipped.
  pub fn rating_list(&self) -> Vec<RatingRecord> {
    parse_rating(self.read(KEY_RATING))
  }

  /// Keep one record per name (the higher score wins), sorted by score descending.
  /// The read and the write happen under one lock so concurrent saves never drop a record.
  pub fn upsert_rating(&self, record: RatingRecord) -> Result<(), StorageError> {
    self
      .with_store(|store| {
        let current = store.get(KEY_RATING).unwrap_or_else(|e| {
          error!(target: "storage", key = KEY_RATING, error = %e, "Read failed; using default");
          None
        });
        let mut list = parse_rating(current);
        match list.iter_mut().find(|r| r.name == record.name) {
          Some(existing) if record.score > existing.score => *existing = record,
          Some(_) => {}
          None => list.push(record),
        }
        list.sort_by(|a, b| b.score.cmp(&a.score));
        let data = serde_json::to_string(&list)?;
        if data.len() > RATING_WARN_BYTES {
          warn!(target: "storage", bytes = data.len(), "Rating is getting large; the quota may run out");
        }
        store.set(KEY_RATING, data)
      })
      .map_err(|e| {
        error!(target: "storage", key = KEY_RATING, error = %e, "Write failed");
        e
      })
  }

  pub fn save_last_result(&self, record: &RatingRecord) -> Result<(), StorageError> {
    self.write(KEY_LAST_RESULT, serde_json::to_string(record)?)
  }

  pub fn last_result(&self) -> Option<RatingRecord> {
    let raw = self.read(KEY_LAST_RESULT)?;
    match serde_json::from_str(&raw) {
      Ok(r) => Some(r),
      Err(e) => {
        warn!(target: "storage", error = %e, "Last result is corrupted; ignoring");
        None
      }
    }
  }

  pub fn player_records(&self, name: &str) -> Vec<RatingRecord> {
    self.rating_list().into_iter().filter(|r| r.name == name).collect()
  }

  pub fn clear_rating(&self) -> Result<(), StorageError> {
    self.delete(KEY_RATING)
  }

  pub fn clear_all_player_data(&self) -> Result<(), StorageError> {
    for key in [KEY_CURRENT_PLAYER, KEY_RATING, KEY_LAST_RESULT] {
      self.delete(key)?;
    }
    info!(target: "storage", "All player data cleared");
    Ok(())
  }
}
