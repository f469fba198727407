use crate::alphabet::codon::{classify_codon_substitution, CodonSubstitution, NUM_SENSE_CODONS, SENSE_CODONS};
use crate::make_error;
use crate::rate_matrix::base::RateMatrixBase;
use crate::rate_matrix::rate_matrix::RateMatrix;
use crate::spectral::engine::{require_engine, SpectralTransitionEngine};
use crate::utils::validate::{validate_frequencies, validate_non_negative};
use eyre::Report;
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Fixation factor of a change into a codon from one with zero preference
const ESCAPE_FROM_FORBIDDEN_CODON: f64 = 100.0;

#[derive(Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct SencaParams {
  #[default = 1.0]
  pub kappa: f64,

  #[default = 1.0]
  pub omega: f64,

  /// Site-specific codon preferences, which are also the stationary frequencies
  #[default(Array1::from_elem(NUM_SENSE_CODONS, 1.0 / NUM_SENSE_CODONS as f64))]
  pub codon_preferences: Array1<f64>,
}

/// Codon model with site-specific codon preferences.
///
/// Mutation follows the HKY-style codon classes (`kappa` for transitions, `omega` for amino acid changes), scaled
/// by the Halpern-Bruno fixation factor of the preferences `x` of the source and `y` of the target codon:
/// `h(x, y) = ln(y/x) / (1 - x/y)`. The resulting generator is reversible with respect to the preferences.
///
/// See: Halpern, Bruno (1998). Evolutionary distances for protein-coding sequences: modeling site-specific residue
/// frequencies. Mol Biol Evol 15 (7): 910–917.
#[derive(Clone, Debug)]
pub struct Senca {
  base: RateMatrixBase,
  kappa: f64,
  omega: f64,
  engine: Option<SpectralTransitionEngine>,
}

impl Senca {
  pub fn new(params: SencaParams) -> Result<Self, Report> {
    let mut senca = Self {
      base: RateMatrixBase::new(NUM_SENSE_CODONS)?,
      kappa: params.kappa,
      omega: params.omega,
      engine: None,
    };
    senca.set_kappa(params.kappa)?;
    senca.set_omega(params.omega)?;
    senca.set_codon_preferences(params.codon_preferences)?;
    senca.into_updated()
  }

  pub fn set_kappa(&mut self, kappa: f64) -> Result<(), Report> {
    validate_non_negative("kappa", kappa)?;
    self.kappa = kappa;
    self.base.mark_stale();
    Ok(())
  }

  pub fn set_omega(&mut self, omega: f64) -> Result<(), Report> {
    validate_non_negative("omega", omega)?;
    self.omega = omega;
    self.base.mark_stale();
    Ok(())
  }

  pub fn set_codon_preferences(&mut self, preferences: Array1<f64>) -> Result<(), Report> {
    validate_frequencies("codon_preferences", &preferences, NUM_SENSE_CODONS)?;
    self.base.set_pi(preferences)?;
    self.base.mark_stale();
    Ok(())
  }

  /// Derivation of stationary frequencies from the codon preferences of several sites. Not available yet.
  pub fn compute_state_frequencies(&self) -> Result<Array1<f64>, Report> {
    make_error!("Computing state frequencies of the {} model is not implemented", self.name())
  }

  fn substitution_rate(&self, kind: CodonSubstitution) -> f64 {
    match kind {
      CodonSubstitution::MultipleOrNone => 0.0,
      CodonSubstitution::SynonymousTransition => self.kappa,
      CodonSubstitution::SynonymousTransversion => 1.0,
      CodonSubstitution::NonSynonymousTransition => self.kappa * self.omega,
      CodonSubstitution::NonSynonymousTransversion => self.omega,
    }
  }

  fn compute_off_diagonal(&mut self) {
    let pi = self.base.pi().clone();
    let mut Q = Array2::zeros((NUM_SENSE_CODONS, NUM_SENSE_CODONS));
    for (i, from) in SENSE_CODONS.iter().enumerate() {
      for (j, to) in SENSE_CODONS.iter().enumerate().skip(i + 1) {
        let rate = self.substitution_rate(classify_codon_substitution(from, to));
        Q[[i, j]] = rate * fixation_factor(pi[i], pi[j]);
        Q[[j, i]] = rate * fixation_factor(pi[j], pi[i]);
      }
    }
    *self.base.Q_mut() = Q;
  }
}

/// Halpern-Bruno factor of a change from a codon with preference `x` into one with preference `y`
pub fn fixation_factor(x: f64, y: f64) -> f64 {
  if x == y {
    1.0
  } else if x == 0.0 {
    ESCAPE_FROM_FORBIDDEN_CODON
  } else if y == 0.0 {
    0.0
  } else {
    (y / x).ln() / (1.0 - x / y)
  }
}

impl RateMatrix for Senca {
  fn base(&self) -> &RateMatrixBase {
    &self.base
  }

  fn base_mut(&mut self) -> &mut RateMatrixBase {
    &mut self.base
  }

  fn name(&self) -> &'static str {
    "Senca"
  }

  fn update(&mut self) -> Result<(), Report> {
    if !self.needs_update() {
      return Ok(());
    }
    self.compute_off_diagonal();
    self.base.set_diagonal();
    self.base.rescale_to_average_rate(1.0)?;
    let engine = SpectralTransitionEngine::from_reversible_rate_matrix(self.base.Q(), self.base.pi())?;
    debug!(
      "Updated {}: kappa={}, omega={}, complex spectrum: {}",
      self.name(),
      self.kappa,
      self.omega,
      engine.is_complex()
    );
    self.engine = Some(engine);
    self.base.mark_current();
    Ok(())
  }

  fn compute_transition_probabilities(&self, t: f64, P: &mut Array2<f64>) -> Result<(), Report> {
    require_engine(&self.engine, self.name())?.transition_probabilities_into(t, P)
  }

  fn box_clone(&self) -> Box<dyn RateMatrix> {
    Box::new(self.clone())
  }

  fn state_labels(&self) -> Vec<String> {
    SENSE_CODONS.iter().map(ToString::to_string).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::codon_hky::{CodonHKYParams, CodonHKY};
  use crate::pretty_assert_ulps_eq;
  use approx::assert_abs_diff_eq;
  use rstest::rstest;

  fn skewed_preferences() -> Array1<f64> {
    let pi = Array1::from_iter((0..NUM_SENSE_CODONS).map(|i| 1.0 + (i % 7) as f64));
    &pi / pi.sum()
  }

  #[rstest]
  #[case(0.2, 0.2, 1.0)]
  #[case(0.0, 0.3, 100.0)]
  #[case(0.3, 0.0, 0.0)]
  #[case(0.1, 0.2, 2.0_f64.ln() / 0.5)]
  fn computes_fixation_factor(#[case] x: f64, #[case] y: f64, #[case] expected: f64) {
    pretty_assert_ulps_eq!(fixation_factor(x, y), expected);
  }

  #[rstest]
  fn uniform_preferences_give_codon_hky() -> Result<(), Report> {
    let senca = Senca::new(SencaParams {
      kappa: 2.0,
      omega: 0.4,
      ..SencaParams::default()
    })?;
    let codon_hky = CodonHKY::new(CodonHKYParams {
      kappa: 2.0,
      omega: 0.4,
      ..CodonHKYParams::default()
    })?;
    assert_abs_diff_eq!(senca.rate_matrix() * 3.0, codon_hky.rate_matrix().clone(), epsilon = 1e-12);
    Ok(())
  }

  #[rstest]
  fn is_reversible_with_respect_to_preferences() -> Result<(), Report> {
    let senca = Senca::new(SencaParams {
      kappa: 3.0,
      omega: 0.2,
      codon_preferences: skewed_preferences(),
    })?;
    assert!(senca.check_time_reversibility(1e-12));
    pretty_assert_ulps_eq!(senca.average_rate(), 1.0, epsilon = 1e-12);
    let P = senca.transition_probabilities(500.0)?;
    assert_abs_diff_eq!(P.row(0), skewed_preferences().view(), epsilon = 1e-8);
    Ok(())
  }

  #[rstest]
  fn state_frequency_computation_is_not_available() -> Result<(), Report> {
    let senca = Senca::new(SencaParams::default())?;
    assert!(senca.compute_state_frequencies().is_err());
    Ok(())
  }
}
