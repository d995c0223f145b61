//! Sortable projection of the rating list.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::domain::RatingRecord;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
  Name,
  Score,
  MaxLevel,
  Difficulty,
  Date,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDir {
  Asc,
  Desc,
}

impl SortDir {
  fn flip(self) -> Self {
    match self {
      SortDir::Asc => SortDir::Desc,
      SortDir::Desc => SortDir::Asc,
    }
  }
}

/// Active sort column. Defaults to score, highest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortState {
  pub field: SortField,
  pub dir: SortDir,
}

impl Default for SortState {
  fn default() -> Self {
    Self { field: SortField::Score, dir: SortDir::Desc }
  }
}

impl SortState {
  /// Clicking the active column flips it; another column starts ascending.
  pub fn toggle(&mut self, field: SortField) {
    if self.field == field {
      self.dir = self.dir.flip();
    } else {
      *self = Self { field, dir: SortDir::Asc };
    }
  }

  fn compare(&self, a: &RatingRecord, b: &RatingRecord) -> Ordering {
    let ord = match self.field {
      SortField::Name => a.name.cmp(&b.name),
      SortField::Score => a.score.cmp(&b.score),
      SortField::MaxLevel => a.max_level.cmp(&b.max_level),
      SortField::Difficulty => a.difficulty.as_str().cmp(b.difficulty.as_str()),
      SortField::Date => a.date.cmp(&b.date),
    };
    match self.dir {
      SortDir::Asc => ord,
      SortDir::Desc => ord.reverse(),
    }
  }

  /// Stable sort of `list` by the active column.
  pub fn apply(&self, list: &mut [RatingRecord]) {
    list.sort_by(|a, b| self.compare(a, b));
  }
}
