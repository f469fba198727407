use crate::alphabet::nucleotide::{NUCLEOTIDES, NUM_NUCLEOTIDES};
use crate::make_error;
use crate::rate_matrix::base::RateMatrixBase;
use crate::rate_matrix::rate_matrix::RateMatrix;
use crate::rate_matrix::time_reversible::{num_exchangeabilities, pair_index, TimeReversibleRateMatrix};
use crate::spectral::engine::{require_engine, SpectralTransitionEngine};
use crate::utils::validate::{validate_frequencies, validate_non_negative, validate_rates};
use eyre::Report;
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

pub const NUM_DOUBLETS: usize = NUM_NUCLEOTIDES * NUM_NUCLEOTIDES;

/// Watson-Crick pairs AT, CG, GC, TA, as doublet indices
pub const CANONICAL_DOUBLETS: [usize; 4] = [3, 6, 9, 12];

/// Expected nucleotide substitutions per doublet per unit time
const DOUBLET_AVERAGE_SUBSTITUTIONS: f64 = 2.0;

#[inline]
const fn doublet_nucleotides(doublet: usize) -> (usize, usize) {
  (doublet / NUM_NUCLEOTIDES, doublet % NUM_NUCLEOTIDES)
}

#[inline]
fn is_canonical(doublet: usize) -> bool {
  CANONICAL_DOUBLETS.contains(&doublet)
}

#[derive(Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct DoubletEpistaticGTRParams {
  /// Nucleotide exchangeabilities AC, AG, AT, CG, CT, GT, shared by both positions
  #[default(Array1::from_elem(6, 1.0 / 6.0))]
  pub nucleotide_exchange_rates: Array1<f64>,

  /// Epistasis: relative rate of simultaneous changes between canonical pairs
  #[default = 0.0]
  pub d: f64,

  /// Stationary frequencies of the 16 doublets, first nucleotide major
  #[default(Array1::from_elem(NUM_DOUBLETS, 1.0 / NUM_DOUBLETS as f64))]
  pub doublet_frequencies: Array1<f64>,
}

/// GTR over pairs of nucleotides, such as paired stem positions of RNA, where a compensatory double change from one
/// Watson-Crick pair to another may happen in a single step.
///
/// Single-position changes use the nucleotide exchangeability of the changing position. Double changes are allowed
/// only between canonical doublets, with exchangeability `d·r(x1,y1)·r(x2,y2)`. Since a double change counts as two
/// substitutions, the generator is normalized to 2 expected nucleotide substitutions per doublet.
#[derive(Clone, Debug)]
pub struct DoubletEpistaticGTR {
  reversible: TimeReversibleRateMatrix,
  nucleotide_exchange_rates: Array1<f64>,
  d: f64,
  engine: Option<SpectralTransitionEngine>,
}

impl DoubletEpistaticGTR {
  pub fn new(params: DoubletEpistaticGTRParams) -> Result<Self, Report> {
    let mut model = Self {
      reversible: TimeReversibleRateMatrix::new(NUM_DOUBLETS)?,
      nucleotide_exchange_rates: params.nucleotide_exchange_rates.clone(),
      d: params.d,
      engine: None,
    };
    model.set_nucleotide_exchange_rates(params.nucleotide_exchange_rates)?;
    model.set_d(params.d)?;
    model.set_doublet_frequencies(params.doublet_frequencies)?;
    model.into_updated()
  }

  pub fn set_nucleotide_exchange_rates(&mut self, rates: Array1<f64>) -> Result<(), Report> {
    validate_rates(
      "nucleotide_exchange_rates",
      &rates,
      num_exchangeabilities(NUM_NUCLEOTIDES),
    )?;
    self.nucleotide_exchange_rates = rates;
    self.base_mut().mark_stale();
    Ok(())
  }

  pub fn set_d(&mut self, d: f64) -> Result<(), Report> {
    validate_non_negative("d", d)?;
    self.d = d;
    self.base_mut().mark_stale();
    Ok(())
  }

  pub fn set_doublet_frequencies(&mut self, pi: Array1<f64>) -> Result<(), Report> {
    validate_frequencies("doublet_frequencies", &pi, NUM_DOUBLETS)?;
    self.reversible.set_stationary_frequencies(pi)
  }

  pub const fn d(&self) -> f64 {
    self.d
  }

  fn nucleotide_rate(&self, from: usize, to: usize) -> f64 {
    self.nucleotide_exchange_rates[pair_index(from, to, NUM_NUCLEOTIDES)]
  }

  fn doublet_exchangeability(&self, from: usize, to: usize) -> f64 {
    let (x1, x2) = doublet_nucleotides(from);
    let (y1, y2) = doublet_nucleotides(to);
    match (x1 != y1, x2 != y2) {
      (true, false) => self.nucleotide_rate(x1, y1),
      (false, true) => self.nucleotide_rate(x2, y2),
      (true, true) if is_canonical(from) && is_canonical(to) => {
        self.d * self.nucleotide_rate(x1, y1) * self.nucleotide_rate(x2, y2)
      }
      _ => 0.0,
    }
  }

  /// Expected number of nucleotide substitutions per unit time, with double changes counted twice
  fn expected_substitutions(&self) -> f64 {
    let Q = self.rate_matrix();
    let pi = self.stationary_frequencies();
    let mut total = 0.0;
    for i in 0..NUM_DOUBLETS {
      let (x1, x2) = doublet_nucleotides(i);
      for j in (0..NUM_DOUBLETS).filter(|&j| j != i) {
        let (y1, y2) = doublet_nucleotides(j);
        let hits = usize::from(x1 != y1) + usize::from(x2 != y2);
        total += pi[i] * Q[[i, j]] * hits as f64;
      }
    }
    total
  }
}

impl RateMatrix for DoubletEpistaticGTR {
  fn base(&self) -> &RateMatrixBase {
    self.reversible.base()
  }

  fn base_mut(&mut self) -> &mut RateMatrixBase {
    self.reversible.base_mut()
  }

  fn name(&self) -> &'static str {
    "DoubletEpistaticGTR"
  }

  fn update(&mut self) -> Result<(), Report> {
    if !self.needs_update() {
      return Ok(());
    }
    let rates = Array1::from_iter(
      (0..NUM_DOUBLETS)
        .flat_map(|i| ((i + 1)..NUM_DOUBLETS).map(move |j| (i, j)))
        .map(|(i, j)| self.doublet_exchangeability(i, j)),
    );
    self.reversible.set_exchangeability_rates(rates)?;
    self.reversible.rebuild_generator(None)?;

    let substitutions = self.expected_substitutions();
    if !substitutions.is_finite() || substitutions <= 0.0 {
      return make_error!(
        "Unable to normalize doublet rate matrix: expected number of substitutions is {substitutions}. \
         At least one nucleotide exchange rate and doublet frequency should be positive."
      );
    }
    *self.base_mut().Q_mut() *= DOUBLET_AVERAGE_SUBSTITUTIONS / substitutions;

    self.engine = Some(SpectralTransitionEngine::from_reversible_rate_matrix(
      self.rate_matrix(),
      self.stationary_frequencies(),
    )?);
    self.base_mut().mark_current();
    debug!("Updated {}: d={}, average rate {}", self.name(), self.d, self.average_rate());
    Ok(())
  }

  fn compute_transition_probabilities(&self, t: f64, P: &mut Array2<f64>) -> Result<(), Report> {
    require_engine(&self.engine, self.name())?.transition_probabilities_into(t, P)
  }

  fn box_clone(&self) -> Box<dyn RateMatrix> {
    Box::new(self.clone())
  }

  fn state_labels(&self) -> Vec<String> {
    (0..NUM_DOUBLETS)
      .map(|i| {
        let (x, y) = doublet_nucleotides(i);
        format!("{}{}", NUCLEOTIDES[x], NUCLEOTIDES[y])
      })
      .collect()
  }
}
