use crate::alphabet::nucleotide::{nucleotide_labels, NUM_NUCLEOTIDES};
use crate::models::tn93::{check_tn93_frequencies, tn93_transition_probabilities};
use crate::rate_matrix::base::RateMatrixBase;
use crate::rate_matrix::rate_matrix::RateMatrix;
use crate::rate_matrix::time_reversible::TimeReversibleRateMatrix;
use crate::utils::validate::validate_non_negative;
use eyre::Report;
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[derive(Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct HKY85Params {
  /// Transition/transversion rate ratio
  #[default = 1.0]
  pub kappa: f64,

  /// Stationary nucleotide frequencies, in order A, C, G, T
  #[default(array![0.25, 0.25, 0.25, 0.25])]
  pub pi: Array1<f64>,
}

/// Hasegawa-Kishino-Yano 1985 model: unequal base frequencies and a transition/transversion ratio `kappa`.
///
/// See: Hasegawa, Kishino, Yano (1985). Dating of the human-ape splitting by a molecular clock of mitochondrial
/// DNA. J Mol Evol 22 (2): 160–174. doi:10.1007/BF02101694
#[derive(Clone, Debug)]
pub struct HKY85 {
  reversible: TimeReversibleRateMatrix,
  kappa: f64,
}

impl HKY85 {
  pub fn new(HKY85Params { kappa, pi }: HKY85Params) -> Result<Self, Report> {
    let mut hky = Self {
      reversible: TimeReversibleRateMatrix::new(NUM_NUCLEOTIDES)?,
      kappa,
    };
    hky.set_kappa(kappa)?;
    hky.set_stationary_frequencies(pi)?;
    hky.into_updated()
  }

  pub const fn kappa(&self) -> f64 {
    self.kappa
  }

  pub fn set_kappa(&mut self, kappa: f64) -> Result<(), Report> {
    validate_non_negative("kappa", kappa)?;
    self.kappa = kappa;
    self.reversible.set_exchangeability_rates(array![1.0, kappa, 1.0, 1.0, kappa, 1.0])
  }

  pub fn set_stationary_frequencies(&mut self, pi: Array1<f64>) -> Result<(), Report> {
    self.reversible.set_stationary_frequencies(pi)
  }
}

impl RateMatrix for HKY85 {
  fn base(&self) -> &RateMatrixBase {
    self.reversible.base()
  }

  fn base_mut(&mut self) -> &mut RateMatrixBase {
    self.reversible.base_mut()
  }

  fn name(&self) -> &'static str {
    "HKY85"
  }

  fn update(&mut self) -> Result<(), Report> {
    if !self.needs_update() {
      return Ok(());
    }
    check_tn93_frequencies(self.stationary_frequencies())?;
    self.reversible.rebuild_generator(Some(1.0))?;
    self.base_mut().mark_current();
    debug!("Updated {}: closed form, kappa={}", self.name(), self.kappa);
    Ok(())
  }

  fn compute_transition_probabilities(&self, t: f64, P: &mut Array2<f64>) -> Result<(), Report> {
    tn93_transition_probabilities(self.stationary_frequencies(), self.kappa, self.kappa, t, P);
    Ok(())
  }

  fn box_clone(&self) -> Box<dyn RateMatrix> {
    Box::new(self.clone())
  }

  fn state_labels(&self) -> Vec<String> {
    nucleotide_labels()
  }
}
