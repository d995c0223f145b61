//! Domain models: difficulty, operators, generated tasks, and the persisted rating record.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rules::Rule;

/// Chosen once per game session.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  pub fn as_str(self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }
}

impl fmt::Display for Difficulty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The four arithmetic operators of the expression level.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Operator {
  #[serde(rename = "+")]
  Add,
  #[serde(rename = "-")]
  Sub,
  #[serde(rename = "*")]
  Mul,
  #[serde(rename = "/")]
  Div,
}

impl Operator {
  pub const ALL: [Operator; 4] = [Operator::Add, Operator::Sub, Operator::Mul, Operator::Div];

  /// `*` and `/` bind tighter than `+` and `-`.
  pub fn is_high_priority(self) -> bool {
    matches!(self, Operator::Mul | Operator::Div)
  }

  pub fn symbol(self) -> &'static str {
    match self {
      Operator::Add => "+",
      Operator::Sub => "-",
      Operator::Mul => "*",
      Operator::Div => "/",
    }
  }

  pub fn parse(s: &str) -> Option<Operator> {
    match s.trim() {
      "+" => Some(Operator::Add),
      "-" | "−" => Some(Operator::Sub),
      "*" | "×" => Some(Operator::Mul),
      "/" | "÷" => Some(Operator::Div),
      _ => None,
    }
  }
}

impl fmt::Display for Operator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.symbol())
  }
}

/// Order in which a sequence must be reproduced.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
  Ascending,
  Descending,
}

impl Direction {
  pub fn sort(self, values: &mut [i64]) {
    match self {
      Direction::Ascending => values.sort_unstable(),
      Direction::Descending => values.sort_unstable_by(|a, b| b.cmp(a)),
    }
  }

  pub fn word(self) -> &'static str {
    match self {
      Direction::Ascending => "ascending",
      Direction::Descending => "descending",
    }
  }
}

/// The three operands and two operators that produce an expression target.
#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct ExpressionSolution {
  pub a: i64,
  pub op1: Operator,
  pub b: i64,
  pub op2: Operator,
  pub c: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TaskKind {
  /// Levels 1 and 2: reproduce `correct_sequence` in order.
  Sequence { rule: Rule, direction: Direction },
  /// Level 3: assemble an expression equal to `target`.
  Expression { target: f64, solution: ExpressionSolution },
}

/// Generated puzzle for exactly one sub-level.
#[derive(Clone, Debug, PartialEq)]
pub struct Task {
  pub rule_text: String,
  /// Candidate numbers, shuffled. Sequence tasks never repeat a value.
  pub numbers: Vec<i64>,
  /// Candidate operators (expression tasks only).
  pub operators: Vec<Operator>,
  /// Unique accepted answer order (empty for expression tasks).
  pub correct_sequence: Vec<i64>,
  pub kind: TaskKind,
}

/// How a game session ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
  /// Kept for records written before win/manual were distinguished.
  Finish,
  Win,
  Manual,
}

impl FinishReason {
  pub fn as_str(self) -> &'static str {
    match self {
      FinishReason::Finish => "finish",
      FinishReason::Win => "win",
      FinishReason::Manual => "manual",
    }
  }
}

/// Leaderboard entry persisted by the storage collaborator.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RatingRecord {
  pub name: String,
  pub score: i64,
  pub max_level: u8,
  pub difficulty: Difficulty,
  pub date: String,
  pub reason: FinishReason,
}
