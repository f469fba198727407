use crate::utils::ndarray::clamp_min;
use crate::utils::validate::validate_length;
use crate::{make_error, make_internal_error};
use eyre::{Report, WrapErr};
use log::debug;
use ndarray::prelude::*;
use ndarray_linalg::Solve;
use strum_macros::Display;

/// Whether the generator reflects the latest parameter values.
///
/// Setters move a matrix to `Stale`. Only a successful `update()` moves it back to `Current`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum UpdateState {
  Stale,
  Current,
}

/// Storage and model-independent operations shared by every rate matrix: the state count, the generator `Q` and
/// the stationary distribution `pi`.
#[derive(Clone, Debug)]
pub struct RateMatrixBase {
  num_states: usize,
  Q: Array2<f64>,
  pi: Array1<f64>,
  state: UpdateState,
}

impl RateMatrixBase {
  /// Placeholder generator filled with ones, with uniform `pi`. Must be updated before use.
  pub fn new(num_states: usize) -> Result<Self, Report> {
    if num_states == 0 {
      return make_error!("Rate matrix should have at least one state, but found num_states={num_states}");
    }
    Ok(Self {
      num_states,
      Q: Array2::ones((num_states, num_states)),
      pi: Array1::from_elem(num_states, 1.0 / num_states as f64),
      state: UpdateState::Stale,
    })
  }

  #[inline]
  pub const fn num_states(&self) -> usize {
    self.num_states
  }

  #[inline]
  pub const fn Q(&self) -> &Array2<f64> {
    &self.Q
  }

  #[inline]
  pub fn Q_mut(&mut self) -> &mut Array2<f64> {
    &mut self.Q
  }

  #[inline]
  pub const fn pi(&self) -> &Array1<f64> {
    &self.pi
  }

  pub fn set_pi(&mut self, pi: Array1<f64>) -> Result<(), Report> {
    validate_length("pi", &pi, self.num_states)?;
    self.pi = pi;
    Ok(())
  }

  #[inline]
  pub const fn state(&self) -> UpdateState {
    self.state
  }

  #[inline]
  pub fn mark_stale(&mut self) {
    self.state = UpdateState::Stale;
  }

  #[inline]
  pub fn mark_current(&mut self) {
    self.state = UpdateState::Current;
  }

  /// Expected number of events per unit time at stationarity: `-Σ_i pi[i]·Q[i][i]`
  pub fn average_rate(&self) -> f64 {
    -self.pi.dot(&self.Q.diag())
  }

  /// Scales `Q` so that its average rate becomes `rate`
  pub fn rescale_to_average_rate(&mut self, rate: f64) -> Result<(), Report> {
    if !rate.is_finite() || rate <= 0.0 {
      return make_error!("Target average rate should be a positive finite number, but found {rate}");
    }
    let current = self.average_rate();
    if !current.is_finite() || current <= 0.0 {
      return make_error!(
        "Unable to rescale a degenerate rate matrix: its average rate is {current}. \
         At least one state with non-zero stationary frequency should have a non-zero outgoing rate."
      );
    }
    self.Q *= rate / current;
    Ok(())
  }

  /// Sets each diagonal entry to minus the sum of the off-diagonal entries of its row
  pub fn set_diagonal(&mut self) {
    for (i, mut row) in self.Q.rows_mut().into_iter().enumerate() {
      row[i] = 0.0;
      let sum = row.sum();
      row[i] = -sum;
    }
  }

  /// Detailed balance check: `Σ_{i<j} |pi_i·Q_ij - pi_j·Q_ji| < tolerance`
  pub fn check_time_reversibility(&self, tolerance: f64) -> bool {
    let n = self.num_states;
    let total: f64 = (0..n)
      .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
      .map(|(i, j)| (self.pi[i] * self.Q[[i, j]] - self.pi[j] * self.Q[[j, i]]).abs())
      .sum();
    total < tolerance
  }

  /// Solves `pi·Q = 0` subject to `Σ pi = 1` by LU factorization.
  ///
  /// Negative components within round-off of zero are clamped. Reducible chains have no unique solution and are
  /// reported as errors.
  pub fn calculate_stationary_frequencies(&self) -> Result<Array1<f64>, Report> {
    let n = self.num_states;
    if n == 1 {
      return Ok(array![1.0]);
    }

    // One equation of Qᵀ·x = 0 is redundant, since the rows of Q sum to zero. It is replaced with Σx = 1.
    let mut A = self.Q.t().to_owned();
    A.row_mut(n - 1).fill(1.0);
    let mut b = Array1::<f64>::zeros(n);
    b[n - 1] = 1.0;

    let x = A
      .solve_into(b)
      .wrap_err("When solving for stationary frequencies of rate matrix. Is the chain reducible?")?;

    if let Some((i, xi)) = x.iter().enumerate().find(|(_, xi)| !xi.is_finite() || **xi < -1e-8) {
      return make_error!(
        "Rate matrix has no valid stationary distribution: found pi[{i}]={xi}. The chain might be reducible."
      );
    }

    let x = clamp_min(&x, 0.0);
    let sum = x.sum();
    if !(sum > 0.0) {
      return make_internal_error!("Stationary frequencies sum to {sum}");
    }
    debug!("Stationary frequencies solved by LU factorization: {x}");
    Ok(x / sum)
  }

  /// Largest total outgoing rate of any state: `max_i(-Q[i][i])`
  pub fn dominating_rate(&self) -> f64 {
    self.Q.diag().iter().fold(0.0, |acc, &q| acc.max(-q))
  }

  /// Rate of the `from -> to` change, scaled by `rate`
  pub fn rate(&self, from: usize, to: usize, rate: f64) -> Result<f64, Report> {
    let n = self.num_states;
    if from >= n || to >= n {
      return make_error!("State index out of bounds: requested rate {from} -> {to}, but there are {n} states");
    }
    Ok(self.Q[[from, to]] * rate)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pretty_assert_ulps_eq;
  use approx::assert_abs_diff_eq;
  use rstest::rstest;

  fn base_with(Q: Array2<f64>, pi: Array1<f64>) -> RateMatrixBase {
    let mut base = RateMatrixBase::new(Q.nrows()).unwrap();
    *base.Q_mut() = Q;
    base.set_pi(pi).unwrap();
    base
  }

  #[rstest]
  fn creates_placeholder() -> Result<(), Report> {
    let base = RateMatrixBase::new(3)?;
    assert_eq!(base.state(), UpdateState::Stale);
    assert_eq!(base.Q(), &Array2::<f64>::ones((3, 3)));
    pretty_assert_ulps_eq!(base.pi().sum(), 1.0);
    Ok(())
  }

  #[rstest]
  fn rejects_zero_states() {
    assert!(RateMatrixBase::new(0).is_err());
  }

  #[rstest]
  fn sets_diagonal_to_negative_row_sum() {
    let mut base = base_with(
      array![[7.0, 1.0, 2.0], [0.5, 7.0, 0.5], [0.0, 3.0, 7.0]],
      array![0.2, 0.3, 0.5],
    );
    base.set_diagonal();
    pretty_assert_ulps_eq!(base.Q().diag(), array![-3.0, -1.0, -3.0]);
    pretty_assert_ulps_eq!(base.Q().sum_axis(Axis(1)), Array1::<f64>::zeros(3));
  }

  #[rstest]
  fn computes_average_rate() {
    let base = base_with(array![[-1.0, 1.0], [3.0, -3.0]], array![0.75, 0.25]);
    pretty_assert_ulps_eq!(base.average_rate(), 1.5);
  }

  #[rstest]
  #[case(1.0)]
  #[case(3.0)]
  #[case(0.01)]
  fn rescales_to_average_rate(#[case] target: f64) -> Result<(), Report> {
    let mut base = base_with(array![[-1.0, 1.0], [3.0, -3.0]], array![0.75, 0.25]);
    base.rescale_to_average_rate(target)?;
    pretty_assert_ulps_eq!(base.average_rate(), target, epsilon = 1e-14);
    Ok(())
  }

  #[rstest]
  fn rejects_rescaling_degenerate_matrix() {
    let mut base = base_with(Array2::zeros((3, 3)), array![0.2, 0.3, 0.5]);
    assert!(base.rescale_to_average_rate(1.0).is_err());
    assert!(base.Q().iter().all(|q| q.is_finite()));
  }

  #[rstest]
  fn checks_time_reversibility() {
    let reversible = base_with(array![[-1.0, 1.0], [3.0, -3.0]], array![0.75, 0.25]);
    assert!(reversible.check_time_reversibility(1e-12));

    let cyclic = base_with(
      array![[-1.0, 1.0, 0.0], [0.0, -1.0, 1.0], [1.0, 0.0, -1.0]],
      array![1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
    );
    assert!(!cyclic.check_time_reversibility(1e-12));
  }

  #[rstest]
  fn solves_stationary_frequencies() -> Result<(), Report> {
    let base = base_with(
      array![[-1.0, 1.0, 0.0], [0.0, -2.0, 2.0], [0.5, 0.0, -0.5]],
      array![1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
    );
    let pi = base.calculate_stationary_frequencies()?;
    assert_abs_diff_eq!(pi.sum(), 1.0, epsilon = 1e-14);
    assert_abs_diff_eq!(pi.dot(base.Q()), Array1::<f64>::zeros(3), epsilon = 1e-14);
    // Balance of flows around the cycle: pi_0·1 = pi_1·2 = pi_2·0.5
    assert_abs_diff_eq!(pi, array![2.0 / 7.0, 1.0 / 7.0, 4.0 / 7.0], epsilon = 1e-14);
    Ok(())
  }

  #[rstest]
  fn computes_dominating_rate() {
    let base = base_with(array![[-1.0, 1.0, 0.0], [0.0, -2.0, 2.0], [0.5, 0.0, -0.5]], array![0.3, 0.3, 0.4]);
    pretty_assert_ulps_eq!(base.dominating_rate(), 2.0);
  }

  #[rstest]
  fn looks_up_rate() -> Result<(), Report> {
    let base = base_with(array![[-1.0, 1.0], [3.0, -3.0]], array![0.75, 0.25]);
    pretty_assert_ulps_eq!(base.rate(1, 0, 2.0)?, 6.0);
    assert!(base.rate(2, 0, 1.0).is_err());
    assert!(base.rate(0, 2, 1.0).is_err());
    Ok(())
  }
}
