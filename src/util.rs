//! Small utility helpers used across modules.

/// Round to two decimal places.
pub fn round2(x: f64) -> f64 {
  (x * 100.0).round() / 100.0
}

/// True when `x` has at most two decimal digits (up to float noise).
pub fn has_at_most_two_decimals(x: f64) -> bool {
  let scaled = x * 100.0;
  (scaled - scaled.round()).abs() < 1e-6
}

/// Trial-division primality test; plenty for numbers below a few hundred.
pub fn is_prime(n: i64) -> bool {
  if n < 2 {
    return false;
  }
  let mut i = 2;
  while i * i <= n {
    if n % i == 0 {
      return false;
    }
    i += 1;
  }
  true
}

/// Render a countdown as `MM:SS`; negative input shows as zero.
pub fn format_clock(seconds: i64) -> String {
  let s = seconds.max(0);
  format!("{:02}:{:02}", s / 60, s % 60)
}

/// Render a number without a trailing `.0`, keeping at most two decimals.
pub fn format_number(x: f64) -> String {
  let r = round2(x);
  if r.fract() == 0.0 {
    format!("{:.0}", r)
  } else {
    let s = format!("{:.2}", r);
    s.trim_end_matches('0').to_string()
  }
}

/// Local wall-clock timestamp used on rating records (`YYYY-MM-DD HH:MM`).
pub fn now_stamp() -> String {
  chrono::Local::now().format("%Y-%m-%d %H:%M").to_string()
}
