//! Level 1: every candidate is on screen at once; the player clicks them in order.

use serde::Serialize;

use crate::validator::{SequenceCursor, Verdict};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GridCard {
  pub value: i64,
  /// Permanently claimed by a correct pick.
  pub selected: bool,
  /// Short-lived error highlight after a wrong pick.
  pub errored: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PickOutcome {
  /// Unknown value or a card that is already selected.
  Ignored,
  Judged(Verdict),
}

#[derive(Clone, Debug, Default)]
pub struct GridBoard {
  cards: Vec<GridCard>,
}

impl GridBoard {
  pub fn new(numbers: &[i64]) -> Self {
    Self {
      cards: numbers.iter().map(|v| GridCard { value: *v, selected: false, errored: false }).collect(),
    }
  }

  pub fn cards(&self) -> &[GridCard] {
    &self.cards
  }

  /// Click a card. A wrong pick flags the card but leaves it clickable.
  pub fn pick(&mut self, value: i64, cursor: &mut SequenceCursor) -> PickOutcome {
    let Some(card) = self.cards.iter_mut().find(|c| c.value == value) else {
      return PickOutcome::Ignored;
    };
    if card.selected {
      return PickOutcome::Ignored;
    }
    let verdict = cursor.judge(value);
    if verdict == Verdict::CorrectNext {
      card.selected = true;
      card.errored = false;
      cursor.advance();
    } else {
      card.errored = true;
    }
    PickOutcome::Judged(verdict)
  }

  pub fn clear_flag(&mut self, value: i64) {
    if let Some(card) = self.cards.iter_mut().find(|c| c.value == value) {
      card.errored = false;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scenario() -> (GridBoard, SequenceCursor) {
    (GridBoard::new(&[4, 6, 9, 11, 2]), SequenceCursor::new(vec![2, 4, 6]))
  }

  #[test]
  fn ordered_clicks_solve_the_board() {
    let (mut board, mut cursor) = scenario();
    for v in [2, 4, 6] {
      assert_eq!(board.pick(v, &mut cursor), PickOutcome::Judged(Verdict::CorrectNext));
    }
    assert!(cursor.is_complete());
    assert_eq!(board.cards().iter().filter(|c| c.selected).count(), 3);
  }

  #[test]
  fn wrong_click_keeps_card_clickable() {
    let (mut board, mut cursor) = scenario();
    assert_eq!(board.pick(6, &mut cursor), PickOutcome::Judged(Verdict::CorrectButOutOfOrder));
    assert_eq!(board.pick(9, &mut cursor), PickOutcome::Judged(Verdict::Incorrect));
    assert_eq!(cursor.index(), 0);
    board.clear_flag(6);
    assert_eq!(board.pick(2, &mut cursor), PickOutcome::Judged(Verdict::CorrectNext));
    assert_eq!(board.pick(4, &mut cursor), PickOutcome::Judged(Verdict::CorrectNext));
    assert_eq!(board.pick(6, &mut cursor), PickOutcome::Judged(Verdict::CorrectNext));
  }

  #[test]
  fn selected_card_is_processed_once() {
    let (mut board, mut cursor) = scenario();
    board.pick(2, &mut cursor);
    assert_eq!(board.pick(2, &mut cursor), PickOutcome::Ignored);
    assert_eq!(cursor.index(), 1);
    assert_eq!(board.pick(77, &mut cursor), PickOutcome::Ignored);
  }
}
