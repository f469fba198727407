use crate::alphabet::nucleotide::{nucleotide_labels, NUM_NUCLEOTIDES};
use crate::make_error;
use crate::rate_matrix::base::RateMatrixBase;
use crate::rate_matrix::rate_matrix::RateMatrix;
use crate::rate_matrix::time_reversible::{num_exchangeabilities, TimeReversibleRateMatrix};
use crate::spectral::engine::{require_engine, SpectralTransitionEngine};
use eyre::Report;
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[derive(Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct GTRParams {
  /// Symmetric exchangeability rates, in row-major upper-triangle order (AC, AG, AT, CG, CT, GT for nucleotides)
  #[default(Array1::ones(6))]
  pub exchangeability_rates: Array1<f64>,

  /// Stationary frequencies
  #[default(array![0.25, 0.25, 0.25, 0.25])]
  pub pi: Array1<f64>,
}

/// General time-reversible model over any number of states.
///
/// `Q[i][j] = r(i,j)·pi[j]`, scaled to an average rate of 1. Transition probabilities are computed from the
/// symmetric eigendecomposition of the generator.
///
/// See: Tavaré (1986). Some probabilistic and statistical problems in the analysis of DNA sequences.
/// Lectures on Mathematics in the Life Sciences 17: 57–86.
#[derive(Clone, Debug)]
pub struct GTR {
  reversible: TimeReversibleRateMatrix,
  engine: Option<SpectralTransitionEngine>,
}

impl GTR {
  pub fn new(GTRParams { exchangeability_rates, pi }: GTRParams) -> Result<Self, Report> {
    let num_states = pi.len();
    if exchangeability_rates.len() != num_exchangeabilities(num_states.max(1)) {
      return make_error!(
        "Number of exchangeability rates should be n(n-1)/2 for n={num_states} states, but found {}",
        exchangeability_rates.len()
      );
    }
    let mut reversible = TimeReversibleRateMatrix::new(num_states)?;
    reversible.set_exchangeability_rates(exchangeability_rates)?;
    reversible.set_stationary_frequencies(pi)?;
    Self {
      reversible,
      engine: None,
    }
    .into_updated()
  }

  pub fn exchangeability_rates(&self) -> &Array1<f64> {
    self.reversible.exchangeability_rates()
  }

  pub fn set_exchangeability_rates(&mut self, rates: Array1<f64>) -> Result<(), Report> {
    self.reversible.set_exchangeability_rates(rates)
  }

  pub fn set_stationary_frequencies(&mut self, pi: Array1<f64>) -> Result<(), Report> {
    self.reversible.set_stationary_frequencies(pi)
  }

  pub const fn engine(&self) -> Option<&SpectralTransitionEngine> {
    self.engine.as_ref()
  }
}

impl RateMatrix for GTR {
  fn base(&self) -> &RateMatrixBase {
    self.reversible.base()
  }

  fn base_mut(&mut self) -> &mut RateMatrixBase {
    self.reversible.base_mut()
  }

  fn name(&self) -> &'static str {
    "GTR"
  }

  fn update(&mut self) -> Result<(), Report> {
    if !self.needs_update() {
      return Ok(());
    }
    self.reversible.rebuild_generator(Some(1.0))?;
    let engine =
      SpectralTransitionEngine::from_reversible_rate_matrix(self.rate_matrix(), self.stationary_frequencies())?;
    debug!(
      "Updated {}: {} states, complex spectrum: {}",
      self.name(),
      self.num_states(),
      engine.is_complex()
    );
    self.engine = Some(engine);
    self.base_mut().mark_current();
    Ok(())
  }

  fn compute_transition_probabilities(&self, t: f64, P: &mut Array2<f64>) -> Result<(), Report> {
    require_engine(&self.engine, self.name())?.transition_probabilities_into(t, P)
  }

  fn box_clone(&self) -> Box<dyn RateMatrix> {
    Box::new(self.clone())
  }

  fn state_labels(&self) -> Vec<String> {
    if self.num_states() == NUM_NUCLEOTIDES {
      nucleotide_labels()
    } else {
      (0..self.num_states()).map(|i| i.to_string()).collect()
    }
  }
}
