use crate::alphabet::nucleotide::{nucleotide_labels, NUM_NUCLEOTIDES};
use crate::rate_matrix::base::RateMatrixBase;
use crate::rate_matrix::rate_matrix::RateMatrix;
use crate::rate_matrix::time_reversible::TimeReversibleRateMatrix;
use crate::spectral::engine::{require_engine, SpectralTransitionEngine};
use crate::utils::validate::validate_non_negative;
use eyre::Report;
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[derive(Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct K81Params {
  /// Transition rate, A<->G and C<->T
  #[default = 1.0]
  pub kappa1: f64,

  /// Second transversion class rate, A<->T and C<->G. The other transversions have rate 1.
  #[default = 1.0]
  pub kappa2: f64,

  #[default(array![0.25, 0.25, 0.25, 0.25])]
  pub pi: Array1<f64>,
}

/// Kimura 1981 three-parameter model, with unequal base frequencies.
///
/// See: Kimura (1981). Estimation of evolutionary distances between homologous nucleotide sequences.
/// PNAS 78 (1): 454–458. doi:10.1073/pnas.78.1.454
#[derive(Clone, Debug)]
pub struct K81 {
  reversible: TimeReversibleRateMatrix,
  kappa1: f64,
  kappa2: f64,
  engine: Option<SpectralTransitionEngine>,
}

impl K81 {
  pub fn new(K81Params { kappa1, kappa2, pi }: K81Params) -> Result<Self, Report> {
    let mut k81 = Self {
      reversible: TimeReversibleRateMatrix::new(NUM_NUCLEOTIDES)?,
      kappa1,
      kappa2,
      engine: None,
    };
    k81.set_kappas(kappa1, kappa2)?;
    k81.reversible.set_stationary_frequencies(pi)?;
    k81.into_updated()
  }

  pub fn set_kappas(&mut self, kappa1: f64, kappa2: f64) -> Result<(), Report> {
    validate_non_negative("kappa1", kappa1)?;
    validate_non_negative("kappa2", kappa2)?;
    self.kappa1 = kappa1;
    self.kappa2 = kappa2;
    // AC, AG, AT, CG, CT, GT
    self
      .reversible
      .set_exchangeability_rates(array![1.0, kappa1, kappa2, kappa2, kappa1, 1.0])
  }

  pub fn set_stationary_frequencies(&mut self, pi: Array1<f64>) -> Result<(), Report> {
    self.reversible.set_stationary_frequencies(pi)
  }

  pub const fn kappas(&self) -> (f64, f64) {
    (self.kappa1, self.kappa2)
  }
}

impl RateMatrix for K81 {
  fn base(&self) -> &RateMatrixBase {
    self.reversible.base()
  }

  fn base_mut(&mut self) -> &mut RateMatrixBase {
    self.reversible.base_mut()
  }

  fn name(&self) -> &'static str {
    "K81"
  }

  fn update(&mut self) -> Result<(), Report> {
    if !self.needs_update() {
      return Ok(());
    }
    self.reversible.rebuild_generator(Some(1.0))?;
    self.engine = Some(SpectralTransitionEngine::from_reversible_rate_matrix(
      self.rate_matrix(),
      self.stationary_frequencies(),
    )?);
    self.base_mut().mark_current();
    debug!("Updated {}: kappa1={}, kappa2={}", self.name(), self.kappa1, self.kappa2);
    Ok(())
  }

  fn compute_transition_probabilities(&self, t: f64, P: &mut Array2<f64>) -> Result<(), Report> {
    require_engine(&self.engine, self.name())?.transition_probabilities_into(t, P)
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
  use crate::models::gtr::{GTRParams, GTR};
  use approx::assert_abs_diff_eq;
  use rstest::rstest;

  #[rstest]
  fn equals_constrained_gtr() -> Result<(), Report> {
    let pi = array![0.3, 0.2, 0.1, 0.4];
    let k81 = K81::new(K81Params {
      kappa1: 4.0,
      kappa2: 0.5,
      pi: pi.clone(),
    })?;
    let gtr = GTR::new(GTRParams {
      exchangeability_rates: array![1.0, 4.0, 0.5, 0.5, 4.0, 1.0],
      pi,
    })?;
    assert_abs_diff_eq!(k81.rate_matrix(), gtr.rate_matrix(), epsilon = 1e-14);
    assert_abs_diff_eq!(
      k81.transition_probabilities(0.4)?,
      gtr.transition_probabilities(0.4)?,
      epsilon = 1e-12
    );
    Ok(())
  }

  #[rstest]
  fn has_symmetric_transition_probabilities_for_uniform_frequencies() -> Result<(), Report> {
    let k81 = K81::new(K81Params {
      kappa1: 2.0,
      kappa2: 3.0,
      ..K81Params::default()
    })?;
    let P = k81.transition_probabilities(0.5)?;
    assert_abs_diff_eq!(P, P.t().to_owned(), epsilon = 1e-13);
    Ok(())
  }
}
