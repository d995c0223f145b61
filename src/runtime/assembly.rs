//! Level 3: drag numbers and operators into five typed slots.

use serde::Serialize;
use thiserror::Error;

use crate::domain::Operator;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
  Number,
  Operator,
}

/// number, operator, number, operator, number
pub const SLOT_KINDS: [SlotKind; 5] =
  [SlotKind::Number, SlotKind::Operator, SlotKind::Number, SlotKind::Operator, SlotKind::Number];

const SLOT_LABELS: [&str; 5] = ["Number 1", "Operation 1", "Number 2", "Operation 2", "Number 3"];

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CardValue {
  Number(i64),
  Operator(Operator),
}

impl CardValue {
  pub fn kind(&self) -> SlotKind {
    match self {
      CardValue::Number(_) => SlotKind::Number,
      CardValue::Operator(_) => SlotKind::Operator,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
  pub id: u32,
  pub value: CardValue,
  /// Slot currently holding this card; `None` while it sits in its source pool.
  pub placed_in: Option<usize>,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyError {
  #[error("unknown card {0}")]
  UnknownCard(u32),
  #[error("unknown slot {0}")]
  UnknownSlot(usize),
  #[error("slot {slot} only takes a {expected:?}")]
  KindMismatch { slot: usize, expected: SlotKind },
  #[error("card {0} is already in a slot")]
  CardInUse(u32),
  #[error("fill all slots first")]
  Incomplete,
}

/// The five slot values, ready for evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Assembled {
  pub a: f64,
  pub op1: Operator,
  pub b: f64,
  pub op2: Operator,
  pub c: f64,
}

#[derive(Clone, Debug, Default)]
pub struct AssemblyBoard {
  cards: Vec<Card>,
  slots: [Option<u32>; 5],
  flashing: [bool; 5],
}

impl AssemblyBoard {
  pub fn new(numbers: &[i64], operators: &[Operator]) -> Self {
    let values = numbers
      .iter()
      .map(|n| CardValue::Number(*n))
      .chain(operators.iter().map(|o| CardValue::Operator(*o)));
    Self {
      cards: values.enumerate().map(|(i, value)| Card { id: i as u32 + 1, value, placed_in: None }).collect(),
      slots: [None; 5],
      flashing: [false; 5],
    }
  }

  pub fn cards(&self) -> &[Card] {
    &self.cards
  }

  pub fn slot_card(&self, slot: usize) -> Option<&Card> {
    let id = (*self.slots.get(slot)?)?;
    self.card(id)
  }

  pub fn is_flashing(&self, slot: usize) -> bool {
    self.flashing.get(slot).copied().unwrap_or(false)
  }

  pub fn label(slot: usize) -> &'static str {
    SLOT_LABELS.get(slot).copied().unwrap_or("?")
  }

  fn card(&self, id: u32) -> Option<&Card> {
    self.cards.iter().find(|c| c.id == id)
  }

  fn card_mut(&mut self, id: u32) -> Result<&mut Card, AssemblyError> {
    self.cards.iter_mut().find(|c| c.id == id).ok_or(AssemblyError::UnknownCard(id))
  }

  /// Drop a card from its source pool into a slot. Returns the evicted occupant.
  pub fn drop_card(&mut self, card_id: u32, slot: usize) -> Result<Option<u32>, AssemblyError> {
    let expected = *SLOT_KINDS.get(slot).ok_or(AssemblyError::UnknownSlot(slot))?;
    let card = self.card_mut(card_id)?;
    if card.placed_in.is_some() {
      return Err(AssemblyError::CardInUse(card_id));
    }
    if card.value.kind() != expected {
      self.flashing[slot] = true;
      return Err(AssemblyError::KindMismatch { slot, expected });
    }
    card.placed_in = Some(slot);

    let evicted = self.slots[slot].replace(card_id);
    if let Some(old) = evicted {
      self.card_mut(old)?.placed_in = None;
    }
    Ok(evicted)
  }

  /// Send a slot's occupant back to its pool (slot click or context-menu clear).
  pub fn clear_slot(&mut self, slot: usize) -> Result<Option<u32>, AssemblyError> {
    let occupant = self.slots.get_mut(slot).ok_or(AssemblyError::UnknownSlot(slot))?.take();
    if let Some(id) = occupant {
      self.card_mut(id)?.placed_in = None;
    }
    Ok(occupant)
  }

  /// A placed card dragged back onto its source pool; clears the slot it came from.
  pub fn return_card(&mut self, card_id: u32) -> Result<Option<usize>, AssemblyError> {
    let card = self.card_mut(card_id)?;
    let Some(slot) = card.placed_in.take() else {
      return Ok(None);
    };
    self.slots[slot] = None;
    Ok(Some(slot))
  }

  pub fn clear_flash(&mut self, slot: usize) {
    if let Some(f) = self.flashing.get_mut(slot) {
      *f = false;
    }
  }

  /// What a slot accepts, for the context-menu hint.
  pub fn slot_hint(slot: usize) -> Result<&'static str, AssemblyError> {
    match SLOT_KINDS.get(slot) {
      Some(SlotKind::Number) => Ok("A number goes here"),
      Some(SlotKind::Operator) => Ok("An operation goes here"),
      None => Err(AssemblyError::UnknownSlot(slot)),
    }
  }

  /// All five slot values, or `Incomplete`.
  pub fn assembled(&self) -> Result<Assembled, AssemblyError> {
    let mut values = [None; 5];
    for (i, v) in values.iter_mut().enumerate() {
      *v = self.slot_card(i).map(|c| c.value);
    }
    match values {
      [Some(CardValue::Number(a)), Some(CardValue::Operator(op1)), Some(CardValue::Number(b)), Some(CardValue::Operator(op2)), Some(CardValue::Number(c))] => {
        Ok(Assembled { a: a as f64, op1, b: b as f64, op2, c: c as f64 })
      }
      _ => Err(AssemblyError::Incomplete),
    }
  }
}
