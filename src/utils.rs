use std::error::Error;

/// Boxed static error type
pub type Err = Box<dyn Error + 'static>;

/// Takes a list where each element is a set of choices, and returns every way of
/// picking one element from each set, leftmost choice varying fastest.
///
/// ```
/// let v = vec![
///   vec![1],
///   vec![2, 3],
///   vec![4, 5],
/// ];
///
/// assert_eq!(ccgforest::utils::combinations(&v), vec![
///   vec![1, 2, 4],
///   vec![1, 3, 4],
///   vec![1, 2, 5],
///   vec![1, 3, 5],
/// ]);
/// ```
pub fn combinations<T>(list: &[Vec<T>]) -> Vec<Vec<T>>
where
  T: Clone,
{
  if list.is_empty() || list.iter().any(|choices| choices.is_empty()) {
    return Vec::new();
  }

  let mut picks = vec![0; list.len()];
  let mut out = Vec::new();
  loop {
    out.push(
      picks
        .iter()
        .zip(list.iter())
        .map(|(&idx, choices)| choices[idx].clone())
        .collect(),
    );

    // odometer increment, leftmost digit first
    let mut pos = 0;
    loop {
      if pos == picks.len() {
        return out;
      }
      picks[pos] += 1;
      if picks[pos] < list[pos].len() {
        break;
      }
      picks[pos] = 0;
      pos += 1;
    }
  }
}

/// log(exp(a) + exp(b)), stable for large magnitudes and for -inf operands
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
  if a == f64::NEG_INFINITY {
    return b;
  }
  if b == f64::NEG_INFINITY {
    return a;
  }
  let (hi, lo) = if a > b { (a, b) } else { (b, a) };
  hi + (lo - hi).exp().ln_1p()
}

/// Relative tolerance under which two log scores count as tied
pub const SCORE_TOLERANCE: f64 = 1e-9;

/// True if `a` and `b` are equal up to rounding. The tolerance is relative for large
/// magnitudes and absolute near zero; infinities only tie with themselves.
pub fn scores_tie(a: f64, b: f64) -> bool {
  if a == b {
    return true;
  }
  if !a.is_finite() || !b.is_finite() {
    return false;
  }
  (a - b).abs() <= SCORE_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

/// log-sum-exp over an iterator; -inf for an empty one
pub fn log_sum_exp_all(values: impl IntoIterator<Item = f64>) -> f64 {
  values
    .into_iter()
    .fold(f64::NEG_INFINITY, log_sum_exp)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_combinations_empty_choice() {
    let v: Vec<Vec<u8>> = vec![vec![1], vec![]];
    assert!(combinations(&v).is_empty());
  }

  #[test]
  fn test_log_sum_exp() {
    let s = log_sum_exp(2f64.ln(), 3f64.ln());
    assert!((s.exp() - 5.0).abs() < 1e-9);
    assert_eq!(log_sum_exp(f64::NEG_INFINITY, 1.5), 1.5);
    assert_eq!(log_sum_exp_all(Vec::new()), f64::NEG_INFINITY);
    assert!((log_sum_exp(1000.0, 1000.0) - (1000.0 + 2f64.ln())).abs() < 1e-9);
  }

  #[test]
  fn test_scores_tie() {
    assert!(scores_tie(0.1 + 0.2, 0.3));
    assert!(scores_tie(-1e6, -1e6 * (1.0 + 1e-12)));
    assert!(!scores_tie(1.0, 1.001));
    assert!(scores_tie(f64::NEG_INFINITY, f64::NEG_INFINITY));
    assert!(!scores_tie(f64::NEG_INFINITY, -1e300));
  }
}
