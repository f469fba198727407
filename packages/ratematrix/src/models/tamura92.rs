use crate::alphabet::nucleotide::{nucleotide_labels, NUM_NUCLEOTIDES};
use crate::make_error;
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

#[derive(Copy, Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct T92Params {
  /// Transition/transversion rate ratio
  #[default = 1.0]
  pub kappa: f64,

  /// Combined frequency of G and C
  #[default = 0.5]
  pub gc_content: f64,
}

/// Tamura 1992 model: HKY85 with frequencies determined by the GC content alone.
///
/// See: Tamura (1992). Estimation of the number of nucleotide substitutions when there are strong
/// transition-transversion and G+C-content biases. Mol Biol Evol 9 (4): 678–687.
#[derive(Clone, Debug)]
pub struct T92 {
  reversible: TimeReversibleRateMatrix,
  kappa: f64,
  gc_content: f64,
}

impl T92 {
  pub fn new(T92Params { kappa, gc_content }: T92Params) -> Result<Self, Report> {
    let mut t92 = Self {
      reversible: TimeReversibleRateMatrix::new(NUM_NUCLEOTIDES)?,
      kappa,
      gc_content,
    };
    t92.set_kappa(kappa)?;
    t92.set_gc_content(gc_content)?;
    t92.into_updated()
  }

  pub const fn kappa(&self) -> f64 {
    self.kappa
  }

  pub const fn gc_content(&self) -> f64 {
    self.gc_content
  }

  pub fn set_kappa(&mut self, kappa: f64) -> Result<(), Report> {
    validate_non_negative("kappa", kappa)?;
    self.kappa = kappa;
    self.reversible.set_exchangeability_rates(array![1.0, kappa, 1.0, 1.0, kappa, 1.0])
  }

  /// Sets `pi = ((1-gc)/2, gc/2, gc/2, (1-gc)/2)`
  pub fn set_gc_content(&mut self, gc_content: f64) -> Result<(), Report> {
    if !(0.0..=1.0).contains(&gc_content) {
      return make_error!("GC content should be in range [0, 1], but found gc_content={gc_content}");
    }
    self.gc_content = gc_content;
    let at = (1.0 - gc_content) / 2.0;
    let gc = gc_content / 2.0;
    self.reversible.set_stationary_frequencies(array![at, gc, gc, at])
  }
}

impl RateMatrix for T92 {
  fn base(&self) -> &RateMatrixBase {
    self.reversible.base()
  }

  fn base_mut(&mut self) -> &mut RateMatrixBase {
    self.reversible.base_mut()
  }

  fn name(&self) -> &'static str {
    "T92"
  }

  fn update(&mut self) -> Result<(), Report> {
    if !self.needs_update() {
      return Ok(());
    }
    check_tn93_frequencies(self.stationary_frequencies())?;
    self.reversible.rebuild_generator(Some(1.0))?;
    self.base_mut().mark_current();
    debug!(
      "Updated {}: closed form, kappa={}, gc_content={}",
      self.name(),
      self.kappa,
      self.gc_content
    );
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
