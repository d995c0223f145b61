//! Number rules and the sequence-task generators of the grid (level 1) and catch (level 2) levels.
//!
//! Flow:
//! 1) `pick_rule` samples a rule (and its parameters) from the level's rule set.
//! 2) `generate` seeds a few values that satisfy the rule, adds random noise,
//!    deduplicates, then recomputes the *complete* satisfying subset of the merged
//!    pool, since noise may satisfy the rule by accident.
//! 3) That subset, sorted in the announced direction, is the answer.
//!
//! Progression rules are closed sets (their terms); their noise is drawn strictly
//! above the largest term and never equals the term that would extend them.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::domain::{Direction, Task, TaskKind};
use crate::util::is_prime;

/// Shortest answer a sequence task may have.
pub const MIN_SEQUENCE: usize = 4;
/// Smallest candidate value.
pub const MIN_CANDIDATE: i64 = 2;
/// Generators need room for four satisfying values plus noise.
pub const MIN_NUMBER_BOUND: i64 = 60;

const TOP_UP_ROUNDS: usize = 16;

const PRIMES: &[i64] = &[
  2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, //
  53, 59, 61, 67, 71, 73, 79, 83, 89, 97, //
  101, 103, 107, 109, 113, 127, 131, 137, 139, 149,
];

/// Which level's rule set a task is drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleSet {
  /// Level 1: static number grid.
  Grid,
  /// Level 2: falling numbers.
  Catch,
}

impl RuleSet {
  fn verb(self) -> &'static str {
    match self {
      RuleSet::Grid => "Pick",
      RuleSet::Catch => "Catch",
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
  Even,
  MultiplesOf { k: i64 },
  Primes,
  ArithmeticProgression { start: i64, step: i64, len: usize },
  GeometricProgression { start: i64, ratio: i64, len: usize },
  ConsecutiveRun { start: i64, len: usize },
}

impl Rule {
  /// Ascending terms of a progression rule; `None` for open rules.
  pub fn terms(&self) -> Option<Vec<i64>> {
    match *self {
      Rule::ArithmeticProgression { start, step, len } => Some((0..len as i64).map(|i| start + i * step).collect()),
      Rule::GeometricProgression { start, ratio, len } => {
        Some((0..len as u32).map(|i| start * ratio.pow(i)).collect())
      }
      Rule::ConsecutiveRun { start, len } => Some((0..len as i64).map(|i| start + i).collect()),
      _ => None,
    }
  }

  /// The term that would continue a progression past its last one.
  fn next_term(&self) -> Option<i64> {
    match *self {
      Rule::ArithmeticProgression { start, step, len } => Some(start + len as i64 * step),
      Rule::GeometricProgression { start, ratio, len } => Some(start * ratio.pow(len as u32)),
      Rule::ConsecutiveRun { start, len } => Some(start + len as i64),
      _ => None,
    }
  }

  pub fn matches(&self, n: i64) -> bool {
    match self {
      Rule::Even => n % 2 == 0,
      Rule::MultiplesOf { k } => *k != 0 && n % k == 0,
      Rule::Primes => is_prime(n),
      _ => self.terms().is_some_and(|t| t.contains(&n)),
    }
  }

  fn subject(&self) -> String {
    match self {
      Rule::Even => "all even numbers".into(),
      Rule::MultiplesOf { k } => format!("all multiples of {k}"),
      Rule::Primes => "all prime numbers".into(),
      Rule::ArithmeticProgression { step, .. } => format!("the arithmetic progression (step {step})"),
      Rule::GeometricProgression { ratio, .. } => format!("the geometric progression (ratio {ratio})"),
      Rule::ConsecutiveRun { .. } => "the consecutive numbers".into(),
    }
  }

  pub fn describe(&self, set: RuleSet, direction: Direction, first: i64) -> String {
    format!("{} {} in {} order, starting with {}", set.verb(), self.subject(), direction.word(), first)
  }
}

fn random_direction<R: Rng + ?Sized>(rng: &mut R) -> Direction {
  if rng.gen_bool(0.5) {
    Direction::Ascending
  } else {
    Direction::Descending
  }
}

fn prime_table(max: i64) -> Vec<i64> {
  PRIMES.iter().copied().filter(|p| *p <= max).collect()
}

fn dedup(values: impl IntoIterator<Item = i64>) -> Vec<i64> {
  let mut out: Vec<i64> = Vec::new();
  for v in values {
    if !out.contains(&v) {
      out.push(v);
    }
  }
  out
}

/// Sample a rule (with parameters and direction) from a level's rule set.
pub fn pick_rule<R: Rng + ?Sized>(rng: &mut R, set: RuleSet, max_number: i64) -> (Rule, Direction) {
  let max = max_number.max(MIN_NUMBER_BOUND);
  match set {
    RuleSet::Grid => {
      let direction = random_direction(rng);
      let rule = match rng.gen_range(0..4) {
        0 => Rule::Even,
        1 => Rule::MultiplesOf { k: rng.gen_range(2..=9) },
        2 => {
          let max_start = ((max - 8) / 2).clamp(MIN_CANDIDATE, 8);
          Rule::ArithmeticProgression { start: rng.gen_range(MIN_CANDIDATE..=max_start), step: 2, len: 5 }
        }
        _ => Rule::Primes,
      };
      (rule, direction)
    }
    RuleSet::Catch => match rng.gen_range(0..3) {
      0 => (Rule::GeometricProgression { start: rng.gen_range(2..=5), ratio: 2, len: 4 }, Direction::Ascending),
      1 => (Rule::ConsecutiveRun { start: rng.gen_range(3..=15), len: 4 }, Direction::Ascending),
      _ => (Rule::MultiplesOf { k: rng.gen_range(2..=9) }, random_direction(rng)),
    },
  }
}

/// Pick a rule for `set` and build its task.
pub fn generate_sequence_task<R: Rng + ?Sized>(rng: &mut R, set: RuleSet, max_number: i64) -> Task {
  let (rule, direction) = pick_rule(rng, set, max_number);
  generate(rng, &rule, direction, set, max_number)
}

/// Build a task for a concrete rule.
pub fn generate<R: Rng + ?Sized>(rng: &mut R, rule: &Rule, direction: Direction, set: RuleSet, max_number: i64) -> Task {
  let max = max_number.max(MIN_NUMBER_BOUND);
  let (numbers, sequence) = match (rule, set) {
    (Rule::Even, _) => {
      let hi = max * 7 / 10;
      let seed = |rng: &mut R| {
        let n = rng.gen_range(MIN_CANDIDATE..=hi);
        if n % 2 == 0 { n } else { n + 1 }
      };
      let guaranteed: Vec<i64> = (0..6).map(|_| seed(rng)).collect();
      let noise: Vec<i64> = (0..18).map(|_| rng.gen_range(MIN_CANDIDATE..=max)).collect();
      settle_open(rng, rule, direction, guaranteed.into_iter().chain(noise).collect(), max, seed)
    }
    (Rule::MultiplesOf { k }, RuleSet::Grid) => {
      let k = *k;
      let max_factor = (max / k).clamp(2, 15);
      let seed = |rng: &mut R| rng.gen_range(2..=max_factor) * k;
      let guaranteed: Vec<i64> = (0..6).map(|_| seed(rng)).collect();
      let noise: Vec<i64> = (0..18).map(|_| rng.gen_range(5..=max)).collect();
      settle_open(rng, rule, direction, guaranteed.into_iter().chain(noise).collect(), max, seed)
    }
    (Rule::MultiplesOf { k }, RuleSet::Catch) => {
      // Four consecutive multiples; noise may add more, which then join the answer.
      let k = *k;
      let start_factor = rng.gen_range(1..=(max / k - 3).clamp(1, 8));
      let run: Vec<i64> = (0..4).map(|i| (start_factor + i) * k).collect();
      let noise_hi = max.min(MIN_NUMBER_BOUND);
      let noise: Vec<i64> = (0..12)
        .map(|_| loop {
          let n = rng.gen_range(MIN_CANDIDATE..=noise_hi);
          if !run.contains(&n) {
            break n;
          }
        })
        .collect();
      let max_factor = (max / k).max(2);
      let seed = |rng: &mut R| rng.gen_range(1..=max_factor) * k;
      settle_open(rng, rule, direction, run.into_iter().chain(noise).collect(), max, seed)
    }
    (Rule::Primes, _) => {
      let table = prime_table(max);
      let guaranteed: Vec<i64> = table.choose_multiple(rng, 5).copied().collect();
      let noise: Vec<i64> = (0..20).map(|_| rng.gen_range(MIN_CANDIDATE..=max)).collect();
      let seed = |rng: &mut R| *table.choose(rng).unwrap_or(&2);
      settle_open(rng, rule, direction, guaranteed.into_iter().chain(noise).collect(), max, seed)
    }
    (Rule::ArithmeticProgression { .. }, _) => settle_progression(rng, rule, direction, 15, max),
    (Rule::GeometricProgression { .. } | Rule::ConsecutiveRun { .. }, _) => {
      settle_progression(rng, rule, direction, 12, max)
    }
  };

  let first = sequence.first().copied().unwrap_or_default();
  let rule_text = rule.describe(set, direction, first);
  debug!(target: "game", ?rule, ?direction, pool = numbers.len(), answer = sequence.len(), "Sequence task generated");
  Task {
    rule_text,
    numbers,
    operators: Vec::new(),
    correct_sequence: sequence,
    kind: TaskKind::Sequence { rule: rule.clone(), direction },
  }
}

/// Merge, top up to `MIN_SEQUENCE` satisfying values, and derive the full answer.
fn settle_open<R: Rng + ?Sized>(
  rng: &mut R,
  rule: &Rule,
  direction: Direction,
  pool: Vec<i64>,
  max: i64,
  mut seed: impl FnMut(&mut R) -> i64,
) -> (Vec<i64>, Vec<i64>) {
  let mut pool = dedup(pool.into_iter().filter(|n| (MIN_CANDIDATE..=max).contains(n)));
  let satisfying = |pool: &[i64]| pool.iter().filter(|n| rule.matches(**n)).count();

  let mut rounds = 0;
  while satisfying(&pool) < MIN_SEQUENCE && rounds < TOP_UP_ROUNDS {
    for _ in 0..MIN_SEQUENCE {
      let v = seed(rng);
      if (MIN_CANDIDATE..=max).contains(&v) && !pool.contains(&v) {
        pool.push(v);
      }
    }
    rounds += 1;
  }
  if satisfying(&pool) < MIN_SEQUENCE {
    // Deterministic sweep; only reachable with pathological seeds.
    let missing: Vec<i64> = (MIN_CANDIDATE..=max).filter(|n| rule.matches(*n) && !pool.contains(n)).collect();
    let need = MIN_SEQUENCE - satisfying(&pool);
    pool.extend(missing.into_iter().take(need));
  }

  let mut sequence: Vec<i64> = pool.iter().copied().filter(|n| rule.matches(*n)).collect();
  direction.sort(&mut sequence);
  pool.shuffle(rng);
  (pool, sequence)
}

/// Terms plus noise strictly above the largest term.
fn settle_progression<R: Rng + ?Sized>(
  rng: &mut R,
  rule: &Rule,
  direction: Direction,
  noise_len: usize,
  max: i64,
) -> (Vec<i64>, Vec<i64>) {
  let terms = rule.terms().unwrap_or_default();
  let top = terms.iter().copied().max().unwrap_or(MIN_CANDIDATE);
  let next = rule.next_term();
  let space: Vec<i64> = ((top + 1)..=max).filter(|n| Some(*n) != next).collect();
  let noise: Vec<i64> = (0..noise_len).filter_map(|_| space.choose(rng).copied()).collect();

  let mut pool = dedup(terms.iter().copied().chain(noise));
  pool.shuffle(rng);
  let mut sequence = terms;
  direction.sort(&mut sequence);
  (pool, sequence)
}
