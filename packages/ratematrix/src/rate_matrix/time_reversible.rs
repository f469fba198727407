use crate::make_error;
use crate::rate_matrix::base::RateMatrixBase;
use crate::utils::validate::{validate_frequencies, validate_rates};
use eyre::Report;
use ndarray::prelude::*;

/// Number of unordered pairs of distinct states
#[inline]
pub const fn num_exchangeabilities(num_states: usize) -> usize {
  num_states * (num_states - 1) / 2
}

/// Position of the unordered pair `{i, j}` (with `i != j`) in the row-major upper triangle of an `n×n` matrix.
///
/// For 4 nucleotides the order is AC, AG, AT, CG, CT, GT.
#[inline]
pub const fn pair_index(i: usize, j: usize, num_states: usize) -> usize {
  let (lo, hi) = if i < j { (i, j) } else { (j, i) };
  lo * num_states - lo * (lo + 1) / 2 + (hi - lo - 1)
}

/// Rate matrix satisfying detailed balance, parameterized by symmetric exchangeability rates `r` and stationary
/// frequencies `pi`, so that `Q[i][j] = r(i,j)·pi[j]` for `i != j`.
#[derive(Clone, Debug)]
pub struct TimeReversibleRateMatrix {
  base: RateMatrixBase,
  exchangeability_rates: Array1<f64>,
}

impl TimeReversibleRateMatrix {
  /// Unit exchangeabilities and uniform frequencies
  pub fn new(num_states: usize) -> Result<Self, Report> {
    let base = RateMatrixBase::new(num_states)?;
    if num_states < 2 {
      return make_error!("Time-reversible rate matrix should have at least 2 states, but found {num_states}");
    }
    Ok(Self {
      base,
      exchangeability_rates: Array1::ones(num_exchangeabilities(num_states)),
    })
  }

  #[inline]
  pub const fn base(&self) -> &RateMatrixBase {
    &self.base
  }

  #[inline]
  pub fn base_mut(&mut self) -> &mut RateMatrixBase {
    &mut self.base
  }

  #[inline]
  pub const fn exchangeability_rates(&self) -> &Array1<f64> {
    &self.exchangeability_rates
  }

  #[inline]
  pub const fn stationary_frequencies(&self) -> &Array1<f64> {
    self.base.pi()
  }

  /// Exchangeability of the unordered pair `{i, j}`
  #[inline]
  pub fn exchangeability(&self, i: usize, j: usize) -> f64 {
    self.exchangeability_rates[pair_index(i, j, self.base.num_states())]
  }

  /// Records new exchangeability rates, in row-major upper-triangle order
  pub fn set_exchangeability_rates(&mut self, rates: Array1<f64>) -> Result<(), Report> {
    validate_rates("exchangeability_rates", &rates, num_exchangeabilities(self.base.num_states()))?;
    self.exchangeability_rates = rates;
    self.base.mark_stale();
    Ok(())
  }

  /// Records new stationary frequencies. They are expected to be normalized already and are not rescaled.
  pub fn set_stationary_frequencies(&mut self, pi: Array1<f64>) -> Result<(), Report> {
    validate_frequencies("pi", &pi, self.base.num_states())?;
    self.base.set_pi(pi)?;
    self.base.mark_stale();
    Ok(())
  }

  /// `Q[i][j] = r(i,j)·pi[j]` and `Q[j][i] = r(i,j)·pi[i]` for every pair
  pub fn compute_off_diagonal(&mut self) {
    let n = self.base.num_states();
    let pi = self.base.pi().clone();
    let Q = self.base.Q_mut();
    let mut k = 0;
    for i in 0..n {
      for j in (i + 1)..n {
        let r = self.exchangeability_rates[k];
        Q[[i, j]] = r * pi[j];
        Q[[j, i]] = r * pi[i];
        k += 1;
      }
    }
  }

  /// Off-diagonal entries, then the diagonal, then optionally scales to the given average rate
  pub fn rebuild_generator(&mut self, average_rate: Option<f64>) -> Result<(), Report> {
    self.compute_off_diagonal();
    self.base.set_diagonal();
    if let Some(rate) = average_rate {
      self.base.rescale_to_average_rate(rate)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pretty_assert_ulps_eq;
  use approx::assert_abs_diff_eq;
  use rstest::rstest;

  #[rstest]
  fn indexes_nucleotide_pairs() {
    let pairs: Vec<usize> = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]
      .iter()
      .map(|&(i, j)| pair_index(i, j, 4))
      .collect();
    assert_eq!(pairs, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(pair_index(3, 1, 4), pair_index(1, 3, 4));
  }

  #[rstest]
  fn indexes_every_pair_once() {
    let n = 20;
    let mut seen = vec![false; num_exchangeabilities(n)];
    for i in 0..n {
      for j in (i + 1)..n {
        let k = pair_index(i, j, n);
        assert!(!seen[k]);
        seen[k] = true;
      }
    }
    assert!(seen.iter().all(|&s| s));
  }

  #[rstest]
  fn builds_reversible_generator() -> Result<(), Report> {
    let mut m = TimeReversibleRateMatrix::new(4)?;
    m.set_exchangeability_rates(array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
    m.set_stationary_frequencies(array![0.1, 0.2, 0.3, 0.4])?;
    m.rebuild_generator(Some(1.0))?;

    let Q = m.base().Q();
    assert_abs_diff_eq!(Q.sum_axis(Axis(1)), Array1::<f64>::zeros(4), epsilon = 1e-14);
    assert!(m.base().check_time_reversibility(1e-12));
    pretty_assert_ulps_eq!(m.base().average_rate(), 1.0, epsilon = 1e-14);
    // Ratio of Q entries follows pi of the target state
    pretty_assert_ulps_eq!(Q[[0, 3]] / Q[[3, 0]], 4.0, epsilon = 1e-12);
    pretty_assert_ulps_eq!(m.exchangeability(3, 2), 6.0);
    Ok(())
  }

  #[rstest]
  fn setters_mark_stale_without_normalizing() -> Result<(), Report> {
    let mut m = TimeReversibleRateMatrix::new(3)?;
    m.base_mut().mark_current();
    m.set_stationary_frequencies(array![0.2, 0.3, 0.5])?;
    assert_eq!(m.base().state(), crate::rate_matrix::base::UpdateState::Stale);
    assert_eq!(m.stationary_frequencies(), &array![0.2, 0.3, 0.5]);
    Ok(())
  }

  #[rstest]
  fn rejects_invalid_parameters() -> Result<(), Report> {
    let mut m = TimeReversibleRateMatrix::new(4)?;
    assert!(m.set_exchangeability_rates(array![1.0, 1.0, 1.0]).is_err());
    assert!(m.set_exchangeability_rates(array![1.0, 1.0, 1.0, 1.0, 1.0, -1.0]).is_err());
    assert!(m.set_stationary_frequencies(array![0.5, 0.5]).is_err());
    assert!(m.set_stationary_frequencies(array![0.5, 0.5, 0.5, 0.5]).is_err());
    assert!(TimeReversibleRateMatrix::new(1).is_err());
    Ok(())
  }
}
