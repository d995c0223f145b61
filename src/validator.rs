//! "Next expected item" matcher shared by the grid and catch levels.
//!
//! `judge` is a pure query; the caller decides what a verdict costs or earns and
//! calls `advance` itself on `CorrectNext`.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
  /// The candidate is exactly the value expected now.
  CorrectNext,
  /// The candidate belongs to the answer but is not the one expected now.
  CorrectButOutOfOrder,
  /// The candidate is not part of the answer.
  Incorrect,
}

/// The active answer plus a cursor into it. `index` stays in `0..=sequence.len()`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SequenceCursor {
  sequence: Vec<i64>,
  index: usize,
}

impl SequenceCursor {
  pub fn new(sequence: Vec<i64>) -> Self {
    Self { sequence, index: 0 }
  }

  pub fn sequence(&self) -> &[i64] {
    &self.sequence
  }

  pub fn index(&self) -> usize {
    self.index
  }

  pub fn expected(&self) -> Option<i64> {
    self.sequence.get(self.index).copied()
  }

  pub fn contains(&self, value: i64) -> bool {
    self.sequence.contains(&value)
  }

  pub fn judge(&self, value: i64) -> Verdict {
    match self.expected() {
      Some(expected) if expected == value => Verdict::CorrectNext,
      // Already-reproduced members count too: they are still "right, but not now".
      _ if self.sequence.contains(&value) => Verdict::CorrectButOutOfOrder,
      _ => Verdict::Incorrect,
    }
  }

  /// Move past the expected value. Saturates at the sequence length.
  pub fn advance(&mut self) {
    if self.index < self.sequence.len() {
      self.index += 1;
    }
  }

  /// Non-empty answer fully reproduced.
  pub fn is_complete(&self) -> bool {
    !self.sequence.is_empty() && self.index == self.sequence.len()
  }

  pub fn clear(&mut self) {
    self.sequence.clear();
    self.index = 0;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn in_order_picks_complete_the_sequence() {
    let mut cur = SequenceCursor::new(vec![2, 4, 6]);
    for v in [2, 4, 6] {
      assert_eq!(cur.judge(v), Verdict::CorrectNext);
      cur.advance();
    }
    assert!(cur.is_complete());
    assert_eq!(cur.expected(), None);
  }

  #[test]
  fn later_member_is_out_of_order_never_next() {
    let cur = SequenceCursor::new(vec![2, 4, 6]);
    assert_eq!(cur.judge(6), Verdict::CorrectButOutOfOrder);
    assert_eq!(cur.judge(4), Verdict::CorrectButOutOfOrder);
    assert_eq!(cur.judge(9), Verdict::Incorrect);
    assert_eq!(cur.index(), 0);
  }

  #[test]
  fn every_index_rejects_non_expected_members() {
    let seq = vec![10, 20, 30, 40];
    for idx in 0..seq.len() {
      let mut cur = SequenceCursor::new(seq.clone());
      for _ in 0..idx {
        cur.advance();
      }
      for (j, v) in seq.iter().enumerate() {
        let verdict = cur.judge(*v);
        if j == idx {
          assert_eq!(verdict, Verdict::CorrectNext);
        } else {
          assert_eq!(verdict, Verdict::CorrectButOutOfOrder);
        }
      }
    }
  }

  #[test]
  fn advance_saturates() {
    let mut cur = SequenceCursor::new(vec![1]);
    cur.advance();
    cur.advance();
    assert_eq!(cur.index(), 1);
    cur.clear();
    assert!(!cur.is_complete());
    assert_eq!(cur.judge(1), Verdict::Incorrect);
  }
}
