use crate::alphabet::codon::{classify_codon_substitution, CodonSubstitution, NUM_SENSE_CODONS, SENSE_CODONS};
use crate::alphabet::nucleotide::NUM_NUCLEOTIDES;
use crate::make_error;
use crate::rate_matrix::base::RateMatrixBase;
use crate::rate_matrix::rate_matrix::RateMatrix;
use crate::rate_matrix::time_reversible::{num_exchangeabilities, TimeReversibleRateMatrix};
use crate::spectral::engine::{require_engine, SpectralTransitionEngine};
use crate::utils::validate::{validate_frequencies, validate_non_negative};
use eyre::Report;
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Codon models count time in expected nucleotide substitutions, three per codon site
const CODON_AVERAGE_RATE: f64 = 3.0;

#[derive(Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct CodonHKYParams {
  /// Transition/transversion rate ratio
  #[default = 1.0]
  pub kappa: f64,

  /// Non-synonymous/synonymous rate ratio (dN/dS)
  #[default = 1.0]
  pub omega: f64,

  /// Nucleotide frequencies, in order A, C, G, T
  #[default(array![0.25, 0.25, 0.25, 0.25])]
  pub nucleotide_frequencies: Array1<f64>,
}

/// Codon model over the 61 sense codons of the standard genetic code, with HKY-style nucleotide mutation and
/// selection on amino acid changes (Goldman-Yang 1994, with codon frequencies from nucleotide frequencies).
///
/// Codons differing at more than one position do not exchange directly. A single-position change is scaled by
/// `kappa` if it is a transition and by `omega` if it changes the amino acid. The frequency of a codon is the
/// product of its nucleotide frequencies, normalized over sense codons.
#[derive(Clone, Debug)]
pub struct CodonHKY {
  reversible: TimeReversibleRateMatrix,
  kappa: f64,
  omega: f64,
  nucleotide_frequencies: Array1<f64>,
  engine: Option<SpectralTransitionEngine>,
}

impl CodonHKY {
  pub fn new(params: CodonHKYParams) -> Result<Self, Report> {
    let mut codon_hky = Self {
      reversible: TimeReversibleRateMatrix::new(NUM_SENSE_CODONS)?,
      kappa: params.kappa,
      omega: params.omega,
      nucleotide_frequencies: params.nucleotide_frequencies.clone(),
      engine: None,
    };
    codon_hky.set_kappa(params.kappa)?;
    codon_hky.set_omega(params.omega)?;
    codon_hky.set_nucleotide_frequencies(params.nucleotide_frequencies)?;
    codon_hky.into_updated()
  }

  pub const fn kappa(&self) -> f64 {
    self.kappa
  }

  pub const fn omega(&self) -> f64 {
    self.omega
  }

  pub const fn nucleotide_frequencies(&self) -> &Array1<f64> {
    &self.nucleotide_frequencies
  }

  pub fn set_kappa(&mut self, kappa: f64) -> Result<(), Report> {
    validate_non_negative("kappa", kappa)?;
    self.kappa = kappa;
    self.base_mut().mark_stale();
    Ok(())
  }

  pub fn set_omega(&mut self, omega: f64) -> Result<(), Report> {
    validate_non_negative("omega", omega)?;
    self.omega = omega;
    self.base_mut().mark_stale();
    Ok(())
  }

  pub fn set_nucleotide_frequencies(&mut self, nucleotide_frequencies: Array1<f64>) -> Result<(), Report> {
    validate_frequencies("nucleotide_frequencies", &nucleotide_frequencies, NUM_NUCLEOTIDES)?;
    self.nucleotide_frequencies = nucleotide_frequencies;
    self.base_mut().mark_stale();
    Ok(())
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

  fn codon_frequencies(&self) -> Result<Array1<f64>, Report> {
    let pi_nuc = &self.nucleotide_frequencies;
    let pi = Array1::from_iter(
      SENSE_CODONS
        .iter()
        .map(|codon| codon.nucleotides().iter().map(|&n| pi_nuc[n]).product::<f64>()),
    );
    let total = pi.sum();
    if total <= 0.0 {
      return make_error!(
        "Nucleotide frequencies {pi_nuc} leave every sense codon with zero frequency. Codon frequencies cannot be normalized."
      );
    }
    Ok(pi / total)
  }

  fn exchangeabilities(&self) -> Array1<f64> {
    let mut rates = Array1::zeros(num_exchangeabilities(NUM_SENSE_CODONS));
    let mut k = 0;
    for (i, from) in SENSE_CODONS.iter().enumerate() {
      for to in &SENSE_CODONS[(i + 1)..] {
        rates[k] = self.substitution_rate(classify_codon_substitution(from, to));
        k += 1;
      }
    }
    rates
  }
}

impl RateMatrix for CodonHKY {
  fn base(&self) -> &RateMatrixBase {
    self.reversible.base()
  }

  fn base_mut(&mut self) -> &mut RateMatrixBase {
    self.reversible.base_mut()
  }

  fn name(&self) -> &'static str {
    "CodonHKY"
  }

  fn update(&mut self) -> Result<(), Report> {
    if !self.needs_update() {
      return Ok(());
    }
    let pi = self.codon_frequencies()?;
    let rates = self.exchangeabilities();
    self.reversible.set_stationary_frequencies(pi)?;
    self.reversible.set_exchangeability_rates(rates)?;
    self.reversible.rebuild_generator(Some(CODON_AVERAGE_RATE))?;
    self.engine = Some(SpectralTransitionEngine::from_reversible_rate_matrix(
      self.rate_matrix(),
      self.stationary_frequencies(),
    )?);
    self.base_mut().mark_current();
    debug!(
      "Updated {}: kappa={}, omega={}, nucleotide frequencies {}",
      self.name(),
      self.kappa,
      self.omega,
      self.nucleotide_frequencies
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
    SENSE_CODONS.iter().map(ToString::to_string).collect()
  }
}
