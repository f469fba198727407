use crate::alphabet::nucleotide::{nucleotide_labels, NUM_NUCLEOTIDES};
use crate::rate_matrix::base::RateMatrixBase;
use crate::rate_matrix::rate_matrix::RateMatrix;
use crate::rate_matrix::time_reversible::TimeReversibleRateMatrix;
use crate::spectral::engine::{require_engine, SpectralTransitionEngine};
use crate::utils::validate::validate_rates;
use eyre::Report;
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Number of free rates: AC, AG=CT, AT, CG, GT
pub const TVM_NUM_RATES: usize = 5;

#[derive(Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct TVMParams {
  /// Rates in order AC, AG (shared with CT), AT, CG, GT
  #[default(Array1::ones(TVM_NUM_RATES))]
  pub rates: Array1<f64>,

  #[default(array![0.25, 0.25, 0.25, 0.25])]
  pub pi: Array1<f64>,
}

/// Transversion model: GTR with both transitions sharing one rate
#[derive(Clone, Debug)]
pub struct TVM {
  reversible: TimeReversibleRateMatrix,
  engine: Option<SpectralTransitionEngine>,
}

impl TVM {
  pub fn new(TVMParams { rates, pi }: TVMParams) -> Result<Self, Report> {
    let mut tvm = Self {
      reversible: TimeReversibleRateMatrix::new(NUM_NUCLEOTIDES)?,
      engine: None,
    };
    tvm.set_rates(&rates)?;
    tvm.reversible.set_stationary_frequencies(pi)?;
    tvm.into_updated()
  }

  pub fn set_rates(&mut self, rates: &Array1<f64>) -> Result<(), Report> {
    validate_rates("rates", rates, TVM_NUM_RATES)?;
    let [ac, transition, at, cg, gt] = [rates[0], rates[1], rates[2], rates[3], rates[4]];
    self
      .reversible
      .set_exchangeability_rates(array![ac, transition, at, cg, transition, gt])
  }

  pub fn set_stationary_frequencies(&mut self, pi: Array1<f64>) -> Result<(), Report> {
    self.reversible.set_stationary_frequencies(pi)
  }
}

impl RateMatrix for TVM {
  fn base(&self) -> &RateMatrixBase {
    self.reversible.base()
  }

  fn base_mut(&mut self) -> &mut RateMatrixBase {
    self.reversible.base_mut()
  }

  fn name(&self) -> &'static str {
    "TVM"
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
    debug!(
      "Updated {}: exchangeabilities {}",
      self.name(),
      self.reversible.exchangeability_rates()
    );
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
