use crate::alphabet::nucleotide::{nucleotide_labels, NUM_NUCLEOTIDES};
use crate::models::tn93::{check_tn93_frequencies, tn93_transition_probabilities};
use crate::rate_matrix::base::RateMatrixBase;
use crate::rate_matrix::rate_matrix::RateMatrix;
use crate::rate_matrix::time_reversible::TimeReversibleRateMatrix;
use crate::spectral::engine::{require_engine, SpectralTransitionEngine};
use crate::utils::validate::validate_non_negative;
use approx::relative_eq;
use eyre::Report;
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

const CLOSED_FORM_RELATIVE_TOLERANCE: f64 = 1e-12;

#[derive(Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct TIMParams {
  /// A<->G rate
  #[default = 1.0]
  pub kappa_ag: f64,

  /// C<->T rate
  #[default = 1.0]
  pub kappa_ct: f64,

  /// A<->C and G<->T rate
  #[default = 1.0]
  pub r_ac_gt: f64,

  /// A<->T and C<->G rate
  #[default = 1.0]
  pub r_at_cg: f64,

  /// Stationary nucleotide frequencies, in order A, C, G, T
  #[default(array![0.25, 0.25, 0.25, 0.25])]
  pub pi: Array1<f64>,
}

/// Transition model: separate purine and pyrimidine transition rates and two transversion rates.
///
/// When both transversion rates are equal, the model is Tamura-Nei 1993 and transition probabilities use the
/// closed form. Otherwise they come from the eigendecomposition of the generator.
#[derive(Clone, Debug)]
pub struct TIM {
  reversible: TimeReversibleRateMatrix,
  params: TIMParams,
  engine: Option<SpectralTransitionEngine>,
}

impl TIM {
  pub fn new(params: TIMParams) -> Result<Self, Report> {
    let mut tim = Self {
      reversible: TimeReversibleRateMatrix::new(NUM_NUCLEOTIDES)?,
      params: params.clone(),
      engine: None,
    };
    tim.set_rates(params.kappa_ag, params.kappa_ct, params.r_ac_gt, params.r_at_cg)?;
    tim.set_stationary_frequencies(params.pi)?;
    tim.into_updated()
  }

  pub fn set_rates(&mut self, kappa_ag: f64, kappa_ct: f64, r_ac_gt: f64, r_at_cg: f64) -> Result<(), Report> {
    validate_non_negative("kappa_ag", kappa_ag)?;
    validate_non_negative("kappa_ct", kappa_ct)?;
    validate_non_negative("r_ac_gt", r_ac_gt)?;
    validate_non_negative("r_at_cg", r_at_cg)?;
    self.params.kappa_ag = kappa_ag;
    self.params.kappa_ct = kappa_ct;
    self.params.r_ac_gt = r_ac_gt;
    self.params.r_at_cg = r_at_cg;
    // AC, AG, AT, CG, CT, GT
    self
      .reversible
      .set_exchangeability_rates(array![r_ac_gt, kappa_ag, r_at_cg, r_at_cg, kappa_ct, r_ac_gt])
  }

  pub fn set_stationary_frequencies(&mut self, pi: Array1<f64>) -> Result<(), Report> {
    self.reversible.set_stationary_frequencies(pi.clone())?;
    self.params.pi = pi;
    Ok(())
  }

  pub const fn params(&self) -> &TIMParams {
    &self.params
  }

  /// Equal positive transversion rates reduce the model to Tamura-Nei. Rates equal up to round-off count as equal.
  pub fn has_closed_form(&self) -> bool {
    let TIMParams { r_ac_gt, r_at_cg, .. } = self.params;
    r_ac_gt > 0.0 && relative_eq!(r_ac_gt, r_at_cg, max_relative = CLOSED_FORM_RELATIVE_TOLERANCE)
  }
}

impl RateMatrix for TIM {
  fn base(&self) -> &RateMatrixBase {
    self.reversible.base()
  }

  fn base_mut(&mut self) -> &mut RateMatrixBase {
    self.reversible.base_mut()
  }

  fn name(&self) -> &'static str {
    "TIM"
  }

  fn update(&mut self) -> Result<(), Report> {
    if !self.needs_update() {
      return Ok(());
    }
    self.reversible.rebuild_generator(Some(1.0))?;
    if self.has_closed_form() {
      check_tn93_frequencies(self.stationary_frequencies())?;
      self.engine = None;
      debug!("Updated {}: closed form", self.name());
    } else {
      self.engine = Some(SpectralTransitionEngine::from_reversible_rate_matrix(
        self.rate_matrix(),
        self.stationary_frequencies(),
      )?);
      debug!("Updated {}: spectral", self.name());
    }
    self.base_mut().mark_current();
    Ok(())
  }

  fn compute_transition_probabilities(&self, t: f64, P: &mut Array2<f64>) -> Result<(), Report> {
    if self.has_closed_form() {
      let r = 0.5 * (self.params.r_ac_gt + self.params.r_at_cg);
      tn93_transition_probabilities(
        self.stationary_frequencies(),
        self.params.kappa_ag / r,
        self.params.kappa_ct / r,
        t,
        P,
      );
      Ok(())
    } else {
      require_engine(&self.engine, self.name())?.transition_probabilities_into(t, P)
    }
  }

  fn box_clone(&self) -> Box<dyn RateMatrix> {
    Box::new(self.clone())
  }

  fn state_labels(&self) -> Vec<String> {
    nucleotide_labels()
  }
}
