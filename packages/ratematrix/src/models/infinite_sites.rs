use crate::make_error;
use crate::rate_matrix::base::RateMatrixBase;
use crate::rate_matrix::rate_matrix::RateMatrix;
use eyre::Report;
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[derive(Copy, Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct InfiniteSitesParams {
  /// Ancestral state plus the derived states
  #[default = 2]
  pub num_states: usize,
}

/// Each site mutates at most once: the ancestral state 0 changes at rate 1 into one of the `n-1` derived states,
/// chosen uniformly, and derived states never change again.
///
/// The chain has no stationary distribution with mass on the ancestral state. Frequencies are reported as uniform
/// over the derived states.
#[derive(Clone, Debug)]
pub struct InfiniteSites {
  base: RateMatrixBase,
}

impl InfiniteSites {
  pub fn new(InfiniteSitesParams { num_states }: InfiniteSitesParams) -> Result<Self, Report> {
    if num_states < 2 {
      return make_error!("Infinite sites model should have at least 2 states, but found {num_states}");
    }
    Self {
      base: RateMatrixBase::new(num_states)?,
    }
    .into_updated()
  }
}

impl RateMatrix for InfiniteSites {
  fn base(&self) -> &RateMatrixBase {
    &self.base
  }

  fn base_mut(&mut self) -> &mut RateMatrixBase {
    &mut self.base
  }

  fn name(&self) -> &'static str {
    "InfiniteSites"
  }

  fn update(&mut self) -> Result<(), Report> {
    if !self.needs_update() {
      return Ok(());
    }
    let n = self.num_states();
    let rate = 1.0 / (n - 1) as f64;

    let Q = self.base.Q_mut();
    Q.fill(0.0);
    Q.row_mut(0).fill(rate);
    self.base.set_diagonal();

    let mut pi = Array1::from_elem(n, rate);
    pi[0] = 0.0;
    self.base.set_pi(pi)?;

    self.base.mark_current();
    debug!("Updated {}: closed form, {} derived states", self.name(), n - 1);
    Ok(())
  }

  fn compute_transition_probabilities(&self, t: f64, P: &mut Array2<f64>) -> Result<(), Report> {
    let n = self.num_states();
    let stay = (-t).exp();
    P.fill(0.0);
    P.diag_mut().fill(1.0);
    P[[0, 0]] = stay;
    P.slice_mut(s![0, 1..]).fill((1.0 - stay) / (n - 1) as f64);
    Ok(())
  }

  fn box_clone(&self) -> Box<dyn RateMatrix> {
    Box::new(self.clone())
  }
}
