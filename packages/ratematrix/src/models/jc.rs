use crate::alphabet::nucleotide::{nucleotide_labels, NUM_NUCLEOTIDES};
use crate::rate_matrix::base::RateMatrixBase;
use crate::rate_matrix::rate_matrix::RateMatrix;
use crate::rate_matrix::time_reversible::{num_exchangeabilities, TimeReversibleRateMatrix};
use eyre::Report;
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[derive(Copy, Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct JC69Params {
  /// Number of states
  #[default = 4]
  pub num_states: usize,
}

/// Jukes-Cantor 1969 model, generalized to any number of states.
///
/// This model assumes equal concentrations of all states and equal transition rates between them. With the
/// average rate normalized to 1, every off-diagonal rate is `1/(n-1)`.
///
/// See: Jukes and Cantor (1969). Evolution of Protein Molecules. New York: Academic Press. pp. 21–132
#[derive(Clone, Debug)]
pub struct JC69 {
  reversible: TimeReversibleRateMatrix,
}

impl JC69 {
  pub fn new(JC69Params { num_states }: JC69Params) -> Result<Self, Report> {
    let mut reversible = TimeReversibleRateMatrix::new(num_states)?;
    let n = num_states as f64;
    reversible.set_exchangeability_rates(Array1::from_elem(num_exchangeabilities(num_states), n / (n - 1.0)))?;
    Self { reversible }.into_updated()
  }
}

impl RateMatrix for JC69 {
  fn base(&self) -> &RateMatrixBase {
    self.reversible.base()
  }

  fn base_mut(&mut self) -> &mut RateMatrixBase {
    self.reversible.base_mut()
  }

  fn name(&self) -> &'static str {
    "JC69"
  }

  fn update(&mut self) -> Result<(), Report> {
    if !self.needs_update() {
      return Ok(());
    }
    self.reversible.rebuild_generator(None)?;
    self.base_mut().mark_current();
    debug!("Updated {}: closed form, {} states", self.name(), self.num_states());
    Ok(())
  }

  fn compute_transition_probabilities(&self, t: f64, P: &mut Array2<f64>) -> Result<(), Report> {
    let n = self.num_states() as f64;
    let e = (-t * n / (n - 1.0)).exp();
    let p_same = 1.0 / n + (1.0 - 1.0 / n) * e;
    let p_diff = 1.0 / n - e / n;
    P.fill(p_diff);
    P.diag_mut().fill(p_same);
    Ok(())
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
