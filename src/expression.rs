//! Two-operator expression evaluation, canonical formatting, and the level-3 generator.
//!
//! Precedence follows school arithmetic: `*` and `/` bind tighter than `+` and `-`,
//! and operators of the same class evaluate left to right.

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;
use tracing::debug;

use crate::domain::{Difficulty, ExpressionSolution, Operator, Task, TaskKind};
use crate::util::{format_number, has_at_most_two_decimals, round2};

/// Generator retry budget before falling back to a plain sum.
pub const MAX_ATTEMPTS: usize = 50;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EvalError {
  #[error("division by zero")]
  DivisionByZero,
}

fn apply(lhs: f64, op: Operator, rhs: f64) -> Result<f64, EvalError> {
  match op {
    Operator::Add => Ok(lhs + rhs),
    Operator::Sub => Ok(lhs - rhs),
    Operator::Mul => Ok(lhs * rhs),
    Operator::Div if rhs == 0.0 => Err(EvalError::DivisionByZero),
    Operator::Div => Ok(lhs / rhs),
  }
}

/// Unrounded value of `a op1 b op2 c`.
fn evaluate_raw(a: f64, op1: Operator, b: f64, op2: Operator, c: f64) -> Result<f64, EvalError> {
  if !op1.is_high_priority() && op2.is_high_priority() {
    apply(a, op1, apply(b, op2, c)?)
  } else {
    apply(apply(a, op1, b)?, op2, c)
  }
}

/// Evaluate `a op1 b op2 c` with precedence, rounded to two decimals.
pub fn evaluate(a: f64, op1: Operator, b: f64, op2: Operator, c: f64) -> Result<f64, EvalError> {
  evaluate_raw(a, op1, b, op2, c).map(round2)
}

/// Render an expression, parenthesising the right pair when it binds first.
pub fn format_expression(a: f64, op1: Operator, b: f64, op2: Operator, c: f64) -> String {
  let (a, b, c) = (format_number(a), format_number(b), format_number(c));
  if !op1.is_high_priority() && op2.is_high_priority() {
    format!("{a} {op1} ({b} {op2} {c})")
  } else {
    format!("{a} {op1} {b} {op2} {c}")
  }
}

impl ExpressionSolution {
  pub fn evaluate(&self) -> Result<f64, EvalError> {
    evaluate(self.a as f64, self.op1, self.b as f64, self.op2, self.c as f64)
  }

  pub fn render(&self) -> String {
    format_expression(self.a as f64, self.op1, self.b as f64, self.op2, self.c as f64)
  }
}

/// Operand range and operator set per difficulty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperandRange {
  pub min: i64,
  pub max: i64,
  pub allow_division: bool,
  pub decoys: usize,
}

pub fn operand_range(difficulty: Difficulty) -> OperandRange {
  match difficulty {
    Difficulty::Easy => OperandRange { min: 1, max: 12, allow_division: false, decoys: 2 },
    Difficulty::Medium => OperandRange { min: 1, max: 25, allow_division: true, decoys: 2 },
    Difficulty::Hard => OperandRange { min: 5, max: 50, allow_division: true, decoys: 3 },
  }
}

impl OperandRange {
  fn operators(&self) -> &'static [Operator] {
    if self.allow_division {
      &Operator::ALL
    } else {
      &Operator::ALL[..3]
    }
  }
}

/// Accept a candidate result, or say why not.
fn accept(solution: &ExpressionSolution, range: &OperandRange) -> Option<f64> {
  let raw = evaluate_raw(solution.a as f64, solution.op1, solution.b as f64, solution.op2, solution.c as f64).ok()?;
  if raw < 0.0 || raw > (range.max * 3) as f64 {
    return None;
  }
  if !has_at_most_two_decimals(raw) {
    return None;
  }
  let uses_division = solution.op1 == Operator::Div || solution.op2 == Operator::Div;
  if uses_division && raw.fract().abs() > 1e-9 {
    return None;
  }
  Some(round2(raw))
}

fn sample_solution<R: Rng + ?Sized>(rng: &mut R, range: &OperandRange) -> ExpressionSolution {
  let ops = range.operators();
  let op1 = ops[rng.gen_range(0..ops.len())];
  let op2 = ops[rng.gen_range(0..ops.len())];
  let a = rng.gen_range(range.min..=range.max);
  let b = if op1 == Operator::Div {
    // Divisor of `a` within range so the first step is exact.
    let divisors: Vec<i64> = (range.min.max(1)..=a.min(range.max)).filter(|d| a % d == 0).collect();
    match divisors.choose(rng) {
      Some(d) => *d,
      None => rng.gen_range(range.min..=a.min(range.max).max(range.min)),
    }
  } else {
    rng.gen_range(range.min..=range.max)
  };
  let c = rng.gen_range(range.min..=range.max);
  ExpressionSolution { a, op1, b, op2, c }
}

/// Fallback when the retry budget is exhausted: a plain sum.
fn safe_solution<R: Rng + ?Sized>(rng: &mut R) -> ExpressionSolution {
  ExpressionSolution {
    a: rng.gen_range(2..=10),
    op1: Operator::Add,
    b: rng.gen_range(1..=9),
    op2: Operator::Add,
    c: rng.gen_range(1..=9),
  }
}

/// Produce a solvable level-3 task for `difficulty`.
pub fn generate_expression_task<R: Rng + ?Sized>(rng: &mut R, difficulty: Difficulty) -> Task {
  let range = operand_range(difficulty);

  let mut found = None;
  for attempt in 0..MAX_ATTEMPTS {
    let candidate = sample_solution(rng, &range);
    if let Some(target) = accept(&candidate, &range) {
      debug!(target: "game", attempt, expression = %candidate.render(), target, "Expression accepted");
      found = Some((candidate, target));
      break;
    }
  }
  let (solution, target) = match found {
    Some(v) => v,
    None => {
      let s = safe_solution(rng);
      debug!(target: "game", %difficulty, expression = %s.render(), "Expression retries exhausted; using plain sum");
      (s, (s.a + s.b + s.c) as f64)
    }
  };

  let operands = [solution.a, solution.b, solution.c];
  let mut numbers: Vec<i64> = operands.to_vec();
  let decoy_space: Vec<i64> = (range.min..=range.max).filter(|n| !operands.contains(n)).collect();
  numbers.extend(decoy_space.choose_multiple(rng, range.decoys).copied());
  numbers.shuffle(rng);

  let mut operators = vec![solution.op1, solution.op2];
  let mut spare: Vec<Operator> = range
    .operators()
    .iter()
    .copied()
    .filter(|op| *op != solution.op1 && *op != solution.op2)
    .collect();
  spare.shuffle(rng);
  operators.extend(spare.into_iter().take(2));
  operators.shuffle(rng);

  Task {
    rule_text: format!("Build an expression equal to {}", format_number(target)),
    numbers,
    operators,
    correct_sequence: Vec::new(),
    kind: TaskKind::Expression { target, solution },
  }
}
