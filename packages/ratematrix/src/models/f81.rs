use crate::alphabet::nucleotide::{nucleotide_labels, NUM_NUCLEOTIDES};
use crate::rate_matrix::base::RateMatrixBase;
use crate::rate_matrix::rate_matrix::RateMatrix;
use crate::rate_matrix::time_reversible::TimeReversibleRateMatrix;
use eyre::Report;
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[derive(Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct F81Params {
  /// Stationary nucleotide frequencies, in order A, C, G, T
  #[default(array![0.25, 0.25, 0.25, 0.25])]
  pub pi: Array1<f64>,
}

/// Felsenstein 1981 model: unequal base frequencies, a single substitution rate.
///
/// See: Felsenstein (1981). Evolutionary trees from DNA sequences: a maximum likelihood approach.
/// J Mol Evol 17 (6): 368–376. doi:10.1007/BF01734359
#[derive(Clone, Debug)]
pub struct F81 {
  reversible: TimeReversibleRateMatrix,
  beta: f64,
}

impl F81 {
  pub fn new(F81Params { pi }: F81Params) -> Result<Self, Report> {
    let mut reversible = TimeReversibleRateMatrix::new(NUM_NUCLEOTIDES)?;
    reversible.set_stationary_frequencies(pi)?;
    Self { reversible, beta: 1.0 }.into_updated()
  }

  pub fn set_stationary_frequencies(&mut self, pi: Array1<f64>) -> Result<(), Report> {
    self.reversible.set_stationary_frequencies(pi)
  }

  /// Unit exchangeability after rescaling, `1/(1 - Σπ²)`
  pub const fn beta(&self) -> f64 {
    self.beta
  }
}

impl RateMatrix for F81 {
  fn base(&self) -> &RateMatrixBase {
    self.reversible.base()
  }

  fn base_mut(&mut self) -> &mut RateMatrixBase {
    self.reversible.base_mut()
  }

  fn name(&self) -> &'static str {
    "F81"
  }

  fn update(&mut self) -> Result<(), Report> {
    if !self.needs_update() {
      return Ok(());
    }
    self.reversible.rebuild_generator(Some(1.0))?;
    let pi = self.stationary_frequencies();
    self.beta = 1.0 / (1.0 - pi.dot(pi));
    self.base_mut().mark_current();
    debug!("Updated {}: closed form, beta={}", self.name(), self.beta);
    Ok(())
  }

  fn compute_transition_probabilities(&self, t: f64, P: &mut Array2<f64>) -> Result<(), Report> {
    let pi = self.stationary_frequencies();
    let e = (-self.beta * t).exp();
    for ((i, j), p) in P.indexed_iter_mut() {
      *p = if i == j {
        pi[j] + (1.0 - pi[j]) * e
      } else {
        pi[j] * (1.0 - e)
      };
    }
    Ok(())
  }

  fn box_clone(&self) -> Box<dyn RateMatrix> {
    Box::new(self.clone())
  }

  fn state_labels(&self) -> Vec<String> {
    nucleotide_labels()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pretty_assert_ulps_eq;
  use crate::rate_matrix::base::UpdateState;
  use approx::assert_abs_diff_eq;
  use rstest::rstest;

  #[rstest]
  fn matches_jc_for_uniform_frequencies() -> Result<(), Report> {
    let f81 = F81::new(F81Params::default())?;
    pretty_assert_ulps_eq!(f81.beta(), 4.0 / 3.0, epsilon = 1e-14);
    let P = f81.transition_probabilities(0.2)?;
    let e = (-0.2 * 4.0 / 3.0_f64).exp();
    pretty_assert_ulps_eq!(P[[1, 1]], 0.25 + 0.75 * e, epsilon = 1e-14);
    Ok(())
  }

  #[rstest]
  fn converges_to_stationary_frequencies() -> Result<(), Report> {
    let pi = array![0.1, 0.2, 0.3, 0.4];
    let f81 = F81::new(F81Params { pi: pi.clone() })?;
    let P = f81.transition_probabilities(500.0)?;
    for row in P.rows() {
      assert_abs_diff_eq!(row, pi.view(), epsilon = 1e-12);
    }
    Ok(())
  }

  #[rstest]
  fn closed_form_matches_generator() -> Result<(), Report> {
    let f81 = F81::new(F81Params {
      pi: array![0.1, 0.2, 0.3, 0.4],
    })?;
    let mut P = Array2::zeros((4, 4));
    f81.base().exponentiate_by_scaling_and_squaring(0.7, &mut P)?;
    assert_abs_diff_eq!(f81.transition_probabilities(0.7)?, P, epsilon = 1e-9);
    Ok(())
  }

  #[rstest]
  fn setter_requires_update() -> Result<(), Report> {
    let mut f81 = F81::new(F81Params::default())?;
    f81.set_stationary_frequencies(array![0.4, 0.3, 0.2, 0.1])?;
    assert_eq!(f81.state(), UpdateState::Stale);
    assert!(f81.transition_probabilities(0.1).is_err());
    f81.update()?;
    assert!(f81.transition_probabilities(0.1).is_ok());
    Ok(())
  }
}
