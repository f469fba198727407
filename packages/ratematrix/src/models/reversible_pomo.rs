use crate::alphabet::nucleotide::NUM_NUCLEOTIDES;
use crate::alphabet::pomo::{PoMoState, PoMoStateSpace};
use crate::rate_matrix::base::RateMatrixBase;
use crate::rate_matrix::rate_matrix::RateMatrix;
use crate::rate_matrix::time_reversible::{num_exchangeabilities, pair_index};
use crate::spectral::engine::{require_engine, SpectralTransitionEngine};
use crate::utils::validate::{validate_frequencies, validate_rates};
use eyre::Report;
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[derive(Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct ReversiblePoMoParams {
  /// Number of allele copies `N` in the virtual population
  #[default = 10]
  pub population_size: usize,

  /// Mutation exchangeabilities, in order AC, AG, AT, CG, CT, GT
  #[default(Array1::ones(6))]
  pub exchangeability_rates: Array1<f64>,

  /// Nucleotide frequencies of the mutation process, in order A, C, G, T
  #[default(array![0.25, 0.25, 0.25, 0.25])]
  pub nucleotide_frequencies: Array1<f64>,
}

/// Reversible polymorphism-aware model: a virtual population of `N` allele copies evolves by GTR mutation from
/// fixed states and by neutral Moran drift within polymorphic states.
///
/// | from                       | to                         | rate            |
/// |----------------------------|----------------------------|-----------------|
/// | fixed `a`                  | `N-1` copies of `a`, 1 `b` | `ρ(a,b)·π_b`    |
/// | `i` copies of `a`, rest `b`| `i ± 1` copies of `a`      | `i(N-i)/N`      |
///
/// Detailed balance holds with respect to `π_a` for fixed states and `ρ(a,b)·π_a·π_b·N/(i(N-i))` for polymorphic
/// ones (before normalization), which gives the stationary frequencies in closed form. The generator is scaled to
/// an average rate of 1.
///
/// See: Borges, Szöllősi, Kosiol (2019). Quantifying GC-biased gene conversion in great ape genomes using
/// polymorphism-aware models. Genetics 212 (4): 1321–1336.
#[derive(Clone, Debug)]
pub struct ReversiblePoMo {
  base: RateMatrixBase,
  space: PoMoStateSpace,
  exchangeability_rates: Array1<f64>,
  nucleotide_frequencies: Array1<f64>,
  engine: Option<SpectralTransitionEngine>,
}

impl ReversiblePoMo {
  pub fn new(params: ReversiblePoMoParams) -> Result<Self, Report> {
    let space = PoMoStateSpace::new(params.population_size)?;
    let mut model = Self {
      base: RateMatrixBase::new(space.num_states())?,
      space,
      exchangeability_rates: Array1::ones(num_exchangeabilities(NUM_NUCLEOTIDES)),
      nucleotide_frequencies: Array1::from_elem(NUM_NUCLEOTIDES, 0.25),
      engine: None,
    };
    model.set_exchangeability_rates(params.exchangeability_rates)?;
    model.set_nucleotide_frequencies(params.nucleotide_frequencies)?;
    model.into_updated()
  }

  pub const fn state_space(&self) -> &PoMoStateSpace {
    &self.space
  }

  pub const fn exchangeability_rates(&self) -> &Array1<f64> {
    &self.exchangeability_rates
  }

  pub const fn nucleotide_frequencies(&self) -> &Array1<f64> {
    &self.nucleotide_frequencies
  }

  pub fn set_exchangeability_rates(&mut self, rates: Array1<f64>) -> Result<(), Report> {
    validate_rates("exchangeability_rates", &rates, num_exchangeabilities(NUM_NUCLEOTIDES))?;
    self.exchangeability_rates = rates;
    self.base.mark_stale();
    Ok(())
  }

  pub fn set_nucleotide_frequencies(&mut self, pi: Array1<f64>) -> Result<(), Report> {
    validate_frequencies("nucleotide_frequencies", &pi, NUM_NUCLEOTIDES)?;
    self.nucleotide_frequencies = pi;
    self.base.mark_stale();
    Ok(())
  }

  fn exchangeability(&self, a: usize, b: usize) -> f64 {
    self.exchangeability_rates[pair_index(a, b, NUM_NUCLEOTIDES)]
  }

  fn fill_rate_matrix(&mut self) -> Result<(), Report> {
    let n = self.space.num_states();
    let N = self.space.population_size();
    let mut Q = Array2::<f64>::zeros((n, n));
    for from in 0..n {
      match self.space.state(from)? {
        PoMoState::Fixed(a) => {
          for b in (0..NUM_NUCLEOTIDES).filter(|&b| b != a) {
            let (first, second, count) = if a < b { (a, b, N - 1) } else { (b, a, 1) };
            Q[[from, self.space.index(first, second, count)?]] =
              self.exchangeability(a, b) * self.nucleotide_frequencies[b];
          }
        }
        PoMoState::Polymorphic { first, second, count } => {
          let drift = (count * (N - count)) as f64 / N as f64;
          Q[[from, self.space.index(first, second, count + 1)?]] = drift;
          Q[[from, self.space.index(first, second, count - 1)?]] = drift;
        }
      }
    }
    *self.base.Q_mut() = Q;
    self.base.set_diagonal();
    Ok(())
  }

  /// Stationary frequencies in closed form
  fn closed_form_stationary_frequencies(&self) -> Result<Array1<f64>, Report> {
    let N = self.space.population_size() as f64;
    let pi = &self.nucleotide_frequencies;
    let weights = (0..self.space.num_states())
      .map(|index| -> Result<f64, Report> {
        Ok(match self.space.state(index)? {
          PoMoState::Fixed(a) => pi[a],
          PoMoState::Polymorphic { first, second, count } => {
            let i = count as f64;
            self.exchangeability(first, second) * pi[first] * pi[second] * N / (i * (N - i))
          }
        })
      })
      .collect::<Result<Array1<f64>, Report>>()?;
    let total = weights.sum();
    Ok(weights / total)
  }
}

impl RateMatrix for ReversiblePoMo {
  fn base(&self) -> &RateMatrixBase {
    &self.base
  }

  fn base_mut(&mut self) -> &mut RateMatrixBase {
    &mut self.base
  }

  fn name(&self) -> &'static str {
    "ReversiblePoMo"
  }

  fn update(&mut self) -> Result<(), Report> {
    if !self.needs_update() {
      return Ok(());
    }
    self.fill_rate_matrix()?;
    let pi = self.closed_form_stationary_frequencies()?;
    self.base.set_pi(pi)?;
    self.base.rescale_to_average_rate(1.0)?;
    let engine = SpectralTransitionEngine::from_reversible_rate_matrix(self.base.Q(), self.base.pi())?;
    debug!(
      "Updated {}: N={}, {} states",
      self.name(),
      self.space.population_size(),
      self.num_states()
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
    self.space.labels()
  }
}
