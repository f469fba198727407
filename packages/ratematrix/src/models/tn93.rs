//! Closed-form transition probabilities of the Tamura-Nei 1993 family.
//!
//! With purine transition rate `κR`, pyrimidine transition rate `κY` and unit transversion rate, the generator
//! rescaled to an average rate of 1 has `β = 1 / (2·(πA·πG·κR + πC·πT·κY + πR·πY))`. HKY85, T92 and the
//! restricted TIM all reduce to this form.
//!
//! See: Tamura and Nei (1993). Estimation of the number of nucleotide substitutions in the control region of
//! mitochondrial DNA in humans and chimpanzees. Mol Biol Evol 10 (3): 512–526.

use crate::alphabet::nucleotide::{is_purine, A, C, G, T};
use crate::make_error;
use eyre::Report;
use ndarray::prelude::*;

/// Unit transversion rate of the rescaled generator
pub fn tn93_beta(pi: &Array1<f64>, kappa_r: f64, kappa_y: f64) -> f64 {
  let pi_r = pi[A] + pi[G];
  let pi_y = pi[C] + pi[T];
  1.0 / (2.0 * (pi[A] * pi[G] * kappa_r + pi[C] * pi[T] * kappa_y + pi_r * pi_y))
}

/// The closed form divides by the total purine and pyrimidine frequencies
pub fn check_tn93_frequencies(pi: &Array1<f64>) -> Result<(), Report> {
  let pi_r = pi[A] + pi[G];
  let pi_y = pi[C] + pi[T];
  if pi_r <= 0.0 || pi_y <= 0.0 {
    return make_error!(
      "Both purine and pyrimidine frequencies should be positive, but found pi_R={pi_r}, pi_Y={pi_y}"
    );
  }
  Ok(())
}

pub fn tn93_transition_probabilities(pi: &Array1<f64>, kappa_r: f64, kappa_y: f64, t: f64, P: &mut Array2<f64>) {
  let beta = tn93_beta(pi, kappa_r, kappa_y);
  let pi_r = pi[A] + pi[G];
  let pi_y = pi[C] + pi[T];
  let e1 = (-beta * t).exp();

  // Per target group: total frequency and decay of the within-group component
  let group = |j: usize| {
    if is_purine(j) {
      (pi_r, (-beta * t * (pi_r * kappa_r + 1.0 - pi_r)).exp())
    } else {
      (pi_y, (-beta * t * (pi_y * kappa_y + 1.0 - pi_y)).exp())
    }
  };

  for ((i, j), p) in P.indexed_iter_mut() {
    let (pi_group, e_group) = group(j);
    let common = pi[j] + pi[j] * (1.0 / pi_group - 1.0) * e1;
    *p = if i == j {
      common + (pi_group - pi[j]) / pi_group * e_group
    } else if is_purine(i) == is_purine(j) {
      common - pi[j] / pi_group * e_group
    } else {
      pi[j] * (1.0 - e1)
    };
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::rate_matrix::exponentiate::expm_taylor;
  use crate::rate_matrix::time_reversible::TimeReversibleRateMatrix;
  use approx::assert_abs_diff_eq;
  use rstest::rstest;

  fn tn93_generator(pi: &Array1<f64>, kappa_r: f64, kappa_y: f64) -> Result<Array2<f64>, Report> {
    let mut m = TimeReversibleRateMatrix::new(4)?;
    m.set_exchangeability_rates(array![1.0, kappa_r, 1.0, 1.0, kappa_y, 1.0])?;
    m.set_stationary_frequencies(pi.clone())?;
    m.rebuild_generator(Some(1.0))?;
    Ok(m.base().Q().clone())
  }

  #[rstest]
  #[case(array![0.25, 0.25, 0.25, 0.25], 1.0, 1.0, 0.3)]
  #[case(array![0.1, 0.2, 0.3, 0.4], 2.0, 2.0, 0.5)]
  #[case(array![0.3, 0.2, 0.2, 0.3], 4.0, 0.5, 1.2)]
  #[case(array![0.05, 0.45, 0.15, 0.35], 10.0, 3.0, 0.05)]
  fn matches_matrix_exponential(
    #[case] pi: Array1<f64>,
    #[case] kappa_r: f64,
    #[case] kappa_y: f64,
    #[case] t: f64,
  ) -> Result<(), Report> {
    let Q = tn93_generator(&pi, kappa_r, kappa_y)?;
    let mut P = Array2::zeros((4, 4));
    tn93_transition_probabilities(&pi, kappa_r, kappa_y, t, &mut P);
    assert_abs_diff_eq!(P, expm_taylor(&Q, t), epsilon = 1e-9);
    Ok(())
  }

  #[rstest]
  fn rejects_missing_nucleotide_group() {
    assert!(check_tn93_frequencies(&array![0.5, 0.0, 0.5, 0.0]).is_err());
    assert!(check_tn93_frequencies(&array![0.0, 0.5, 0.0, 0.5]).is_err());
    assert!(check_tn93_frequencies(&array![0.5, 0.0, 0.0, 0.5]).is_ok());
  }
}
