//! Player name validation.

use thiserror::Error;

pub const MIN_NAME_CHARS: usize = 2;
pub const MAX_NAME_CHARS: usize = 15;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NameError {
  #[error("name must not be empty")]
  Empty,
  #[error("at least 2 characters")]
  TooShort,
  #[error("no more than 15 characters")]
  TooLong,
  #[error("letters, digits and spaces only")]
  InvalidCharacters,
}

fn allowed(c: char) -> bool {
  c.is_ascii_alphanumeric() || c.is_whitespace() || matches!(c, 'А'..='Я' | 'а'..='я' | 'Ё' | 'ё')
}

/// Validate a display name and return it trimmed.
pub fn validate_name(raw: &str) -> Result<String, NameError> {
  let name = raw.trim();
  let len = name.chars().count();
  if len == 0 {
    return Err(NameError::Empty);
  }
  if len < MIN_NAME_CHARS {
    return Err(NameError::TooShort);
  }
  if len > MAX_NAME_CHARS {
    return Err(NameError::TooLong);
  }
  if !name.chars().all(allowed) {
    return Err(NameError::InvalidCharacters);
  }
  Ok(name.to_string())
}
