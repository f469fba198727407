use crate::make_error;
use eyre::Report;
use ndarray::{ArrayBase, Data, Ix1};

/// Tolerance for the frequencies to be considered summing to 1
pub const FREQUENCY_SUM_TOLERANCE: f64 = 1e-6;

pub fn validate_length<S: Data<Elem = f64>>(
  name: &str,
  values: &ArrayBase<S, Ix1>,
  expected_len: usize,
) -> Result<(), Report> {
  if values.len() != expected_len {
    return make_error!(
      "Expected {expected_len} values for '{name}', but found {}",
      values.len()
    );
  }
  Ok(())
}

/// Checks that a non-negative finite value is given
pub fn validate_non_negative(name: &str, value: f64) -> Result<(), Report> {
  if !value.is_finite() || value < 0.0 {
    return make_error!("Parameter '{name}' should be a non-negative finite number, but found {name}={value}");
  }
  Ok(())
}

/// Rates: correct length, every entry finite and non-negative
pub fn validate_rates<S: Data<Elem = f64>>(
  name: &str,
  rates: &ArrayBase<S, Ix1>,
  expected_len: usize,
) -> Result<(), Report> {
  validate_length(name, rates, expected_len)?;
  if let Some((i, r)) = rates.iter().enumerate().find(|(_, r)| !r.is_finite() || **r < 0.0) {
    return make_error!("Rates '{name}' should be non-negative finite numbers, but found {name}[{i}]={r}");
  }
  Ok(())
}

/// Frequencies: correct length, entries in [0, 1], summing to 1
pub fn validate_frequencies<S: Data<Elem = f64>>(
  name: &str,
  freqs: &ArrayBase<S, Ix1>,
  expected_len: usize,
) -> Result<(), Report> {
  validate_length(name, freqs, expected_len)?;
  if let Some((i, f)) = freqs
    .iter()
    .enumerate()
    .find(|(_, f)| !f.is_finite() || !(0.0..=1.0).contains(*f))
  {
    return make_error!("Frequencies '{name}' should be between 0 and 1, but found {name}[{i}]={f}");
  }
  let sum = freqs.sum();
  if (sum - 1.0).abs() > FREQUENCY_SUM_TOLERANCE {
    return make_error!("Frequencies '{name}' should sum to 1, but they sum to {sum}");
  }
  Ok(())
}

/// Elapsed time along a branch
pub fn validate_time(t: f64) -> Result<(), Report> {
  if !t.is_finite() || t < 0.0 {
    return make_error!("Elapsed time should be a non-negative finite number, but found t={t}");
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::array;
  use rstest::rstest;

  #[rstest]
  fn accepts_valid_frequencies() -> Result<(), Report> {
    validate_frequencies("pi", &array![0.1, 0.2, 0.3, 0.4], 4)?;
    Ok(())
  }

  #[rstest]
  #[case(array![0.25, 0.25, 0.25], 4)]
  #[case(array![0.5, 0.5, 0.5, -0.5], 4)]
  #[case(array![0.3, 0.3, 0.3, 0.3], 4)]
  #[case(array![f64::NAN, 0.5, 0.25, 0.25], 4)]
  fn rejects_invalid_frequencies(#[case] freqs: ndarray::Array1<f64>, #[case] n: usize) {
    assert!(validate_frequencies("pi", &freqs, n).is_err());
  }

  #[rstest]
  fn rejects_negative_rates() {
    assert!(validate_rates("rates", &array![1.0, -1.0, 1.0], 3).is_err());
    assert!(validate_rates("rates", &array![1.0, 0.0, 1.0], 3).is_ok());
  }

  #[rstest]
  #[case(-1.0)]
  #[case(f64::INFINITY)]
  #[case(f64::NAN)]
  fn rejects_invalid_time(#[case] t: f64) {
    assert!(validate_time(t).is_err());
  }
}
