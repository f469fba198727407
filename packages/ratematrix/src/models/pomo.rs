use crate::alphabet::nucleotide::NUM_NUCLEOTIDES;
use crate::alphabet::pomo::{PoMoState, PoMoStateSpace};
use crate::rate_matrix::base::RateMatrixBase;
use crate::rate_matrix::rate_matrix::RateMatrix;
use crate::spectral::engine::{require_engine, SpectralTransitionEngine};
use crate::utils::validate::validate_rates;
use eyre::{Report, WrapErr};
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Number of directed nucleotide mutations
const NUM_MUTATION_RATES: usize = NUM_NUCLEOTIDES * (NUM_NUCLEOTIDES - 1);

#[derive(Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct PoMoParams {
  /// Number of allele copies `N` in the virtual population
  #[default = 10]
  pub population_size: usize,

  /// Directed mutation rates in row-major order, skipping the diagonal: AC, AG, AT, CA, CG, CT, GA, GC, GT, TA, TC, TG
  #[default(Array1::from_elem(12, 0.01))]
  pub mutation_rates: Array1<f64>,

  /// Relative fitness of each nucleotide, in order A, C, G, T
  #[default(Array1::ones(4))]
  pub fitness: Array1<f64>,
}

/// Polymorphism-aware model with directional mutation and selection: a virtual population of `N` allele copies
/// evolves by mutation from fixed states and by a Moran process with fitness within polymorphic states.
///
/// | from                        | to                         | rate                                   |
/// |-----------------------------|----------------------------|----------------------------------------|
/// | fixed `a`                   | `N-1` copies of `a`, 1 `b` | `μ(a,b)`                               |
/// | `i` copies of `a`, rest `b` | `i + 1` copies of `a`      | `f_a·i / (f_a·i + f_b·(N-i)) · (N-i)/N` |
/// | `i` copies of `a`, rest `b` | `i - 1` copies of `a`      | `f_b·(N-i) / (f_a·i + f_b·(N-i)) · i/N` |
///
/// One copy is chosen to reproduce with probability proportional to fitness, and one copy of the other allele is
/// replaced. The chain is not reversible in general. Its stationary distribution is solved for, and transition
/// probabilities come from the general eigendecomposition. No rescaling is applied.
///
/// See: De Maio, Schrempf, Kosiol (2015). PoMo: an allele frequency-based approach for species tree estimation.
/// Syst. Biol. 64 (6): 1018–1031.
#[derive(Clone, Debug)]
pub struct PoMo {
  base: RateMatrixBase,
  space: PoMoStateSpace,
  mutation_rates: Array2<f64>,
  fitness: Array1<f64>,
  engine: Option<SpectralTransitionEngine>,
}

impl PoMo {
  pub fn new(params: PoMoParams) -> Result<Self, Report> {
    let space = PoMoStateSpace::new(params.population_size)?;
    let mut model = Self {
      base: RateMatrixBase::new(space.num_states())?,
      space,
      mutation_rates: Array2::zeros((NUM_NUCLEOTIDES, NUM_NUCLEOTIDES)),
      fitness: Array1::ones(NUM_NUCLEOTIDES),
      engine: None,
    };
    model.set_mutation_rates(&params.mutation_rates)?;
    model.set_fitness(params.fitness)?;
    model.into_updated()
  }

  pub const fn state_space(&self) -> &PoMoStateSpace {
    &self.space
  }

  /// Mutation rates as a 4×4 matrix with zero diagonal
  pub const fn mutation_rates(&self) -> &Array2<f64> {
    &self.mutation_rates
  }

  pub const fn fitness(&self) -> &Array1<f64> {
    &self.fitness
  }

  /// Records directed mutation rates, given in row-major order with the diagonal skipped
  pub fn set_mutation_rates(&mut self, rates: &Array1<f64>) -> Result<(), Report> {
    validate_rates("mutation_rates", rates, NUM_MUTATION_RATES)?;
    let off_diagonal =
      (0..NUM_NUCLEOTIDES).flat_map(|a| (0..NUM_NUCLEOTIDES).filter(move |&b| b != a).map(move |b| (a, b)));
    self.mutation_rates.fill(0.0);
    for ((a, b), &rate) in off_diagonal.zip(rates.iter()) {
      self.mutation_rates[[a, b]] = rate;
    }
    self.base.mark_stale();
    Ok(())
  }

  /// Takes mutation rates from the off-diagonal of a 4×4 nucleotide rate matrix, e.g. the generator of a
  /// nucleotide model
  pub fn set_mutation_rates_from_matrix(&mut self, Q: &Array2<f64>) -> Result<(), Report> {
    let rates: Array1<f64> = Q
      .indexed_iter()
      .filter(|((a, b), _)| a != b)
      .map(|(_, &rate)| rate)
      .collect();
    self.set_mutation_rates(&rates)
  }

  pub fn set_fitness(&mut self, fitness: Array1<f64>) -> Result<(), Report> {
    validate_rates("fitness", &fitness, NUM_NUCLEOTIDES)?;
    self.fitness = fitness;
    self.base.mark_stale();
    Ok(())
  }

  /// Moran step rates `(i -> i+1, i -> i-1)` for `i` copies of `a` and `N - i` copies of `b`
  fn moran_rates(&self, a: usize, b: usize, count: usize) -> (f64, f64) {
    let N = self.space.population_size() as f64;
    let i = count as f64;
    let (fa, fb) = (self.fitness[a] * i, self.fitness[b] * (N - i));
    let total = fa + fb;
    if total > 0.0 {
      (fa / total * (N - i) / N, fb / total * i / N)
    } else {
      (0.0, 0.0)
    }
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
            Q[[from, self.space.index(first, second, count)?]] = self.mutation_rates[[a, b]];
          }
        }
        PoMoState::Polymorphic { first, second, count } => {
          let (up, down) = self.moran_rates(first, second, count);
          Q[[from, self.space.index(first, second, count + 1)?]] = up;
          Q[[from, self.space.index(first, second, count - 1)?]] = down;
        }
      }
    }
    *self.base.Q_mut() = Q;
    self.base.set_diagonal();
    Ok(())
  }
}

impl RateMatrix for PoMo {
  fn base(&self) -> &RateMatrixBase {
    &self.base
  }

  fn base_mut(&mut self) -> &mut RateMatrixBase {
    &mut self.base
  }

  fn name(&self) -> &'static str {
    "PoMo"
  }

  fn update(&mut self) -> Result<(), Report> {
    if !self.needs_update() {
      return Ok(());
    }
    self.fill_rate_matrix()?;
    let pi = self
      .base
      .calculate_stationary_frequencies()
      .wrap_err("When updating PoMo model. Are all mutation rates zero?")?;
    self.base.set_pi(pi)?;
    let engine = SpectralTransitionEngine::from_rate_matrix(self.base.Q())?;
    debug!(
      "Updated {}: N={}, {} states, average rate {}, complex spectrum: {}",
      self.name(),
      self.space.population_size(),
      self.num_states(),
      self.average_rate(),
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
    self.space.labels()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::alphabet::nucleotide::{A, C, G, T};
  use crate::pretty_assert_ulps_eq;
  use approx::assert_abs_diff_eq;
  use rstest::rstest;

  fn model(population_size: usize, fitness: Array1<f64>) -> Result<PoMo, Report> {
    PoMo::new(PoMoParams {
      population_size,
      mutation_rates: array![0.01, 0.03, 0.01, 0.02, 0.01, 0.04, 0.05, 0.01, 0.01, 0.01, 0.03, 0.02],
      fitness,
    })
  }

  #[rstest]
  fn lays_out_mutation_rates_row_major() -> Result<(), Report> {
    let m = model(4, Array1::ones(4))?;
    let mu = m.mutation_rates();
    pretty_assert_ulps_eq!(mu.diag(), Array1::<f64>::zeros(4));
    pretty_assert_ulps_eq!(mu[[A, T]], 0.01);
    pretty_assert_ulps_eq!(mu[[C, T]], 0.04);
    pretty_assert_ulps_eq!(mu[[G, A]], 0.05);
    pretty_assert_ulps_eq!(mu[[T, C]], 0.03);

    let space = m.state_space();
    let Q = m.rate_matrix();
    pretty_assert_ulps_eq!(Q[[G, space.index(A, G, 1)?]], 0.05);
    pretty_assert_ulps_eq!(Q[[A, space.index(A, G, 3)?]], 0.03);
    Ok(())
  }

  #[rstest]
  fn neutral_drift_is_moran() -> Result<(), Report> {
    let m = model(5, Array1::ones(4))?;
    let space = m.state_space();
    let Q = m.rate_matrix();
    for count in 1..5 {
      let from = space.index(C, G, count)?;
      let expected = (count * (5 - count)) as f64 / 25.0;
      assert_abs_diff_eq!(Q[[from, space.index(C, G, count + 1)?]], expected, epsilon = 1e-15);
      assert_abs_diff_eq!(Q[[from, space.index(C, G, count - 1)?]], expected, epsilon = 1e-15);
    }
    Ok(())
  }

  #[rstest]
  fn selection_favours_fitter_allele() -> Result<(), Report> {
    let m = model(6, array![1.0, 1.0, 1.5, 1.0])?;
    let space = m.state_space();
    let Q = m.rate_matrix();
    let from = space.index(A, G, 3)?;
    // Three copies of each: G reproduces 1.5 times as often as A
    assert_abs_diff_eq!(Q[[from, space.index(A, G, 2)?]], 1.5 / 2.5 * 0.5, epsilon = 1e-15);
    assert_abs_diff_eq!(Q[[from, space.index(A, G, 4)?]], 1.0 / 2.5 * 0.5, epsilon = 1e-15);
    // Boundary: last copy of A is lost
    let last = space.index(A, G, 1)?;
    assert_abs_diff_eq!(Q[[last, G]], 7.5 / 8.5 / 6.0, epsilon = 1e-15);

    let neutral = model(6, Array1::ones(4))?;
    assert!(m.stationary_frequencies()[G] > neutral.stationary_frequencies()[G]);
    Ok(())
  }

  #[rstest]
  fn neutral_symmetric_mutation_is_reversible() -> Result<(), Report> {
    let m = PoMo::new(PoMoParams {
      population_size: 4,
      mutation_rates: Array1::from_elem(12, 0.02),
      fitness: Array1::ones(4),
    })?;
    assert!(m.check_time_reversibility(1e-12));
    let pi = m.stationary_frequencies();
    assert_abs_diff_eq!(pi.slice(s![..4]).to_owned(), Array1::from_elem(4, pi[0]), epsilon = 1e-12);
    Ok(())
  }

  #[rstest]
  fn solves_stationary_distribution() -> Result<(), Report> {
    let m = model(5, array![1.2, 0.8, 1.0, 1.1])?;
    let pi = m.stationary_frequencies();
    pretty_assert_ulps_eq!(pi.sum(), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(pi.dot(m.rate_matrix()), Array1::<f64>::zeros(m.num_states()), epsilon = 1e-12);
    let mut expected = Array2::zeros((m.num_states(), m.num_states()));
    m.base().exponentiate_by_scaling_and_squaring(2.0, &mut expected)?;
    assert_abs_diff_eq!(m.transition_probabilities(2.0)?, expected, epsilon = 1e-9);
    Ok(())
  }

  #[rstest]
  fn takes_mutation_rates_from_nucleotide_matrix() -> Result<(), Report> {
    let mut m = model(3, Array1::ones(4))?;
    let Q = array![
      [-0.6, 0.1, 0.2, 0.3],
      [0.1, -0.6, 0.3, 0.2],
      [0.2, 0.3, -0.6, 0.1],
      [0.3, 0.2, 0.1, -0.6],
    ];
    m.set_mutation_rates_from_matrix(&Q)?;
    m.update()?;
    pretty_assert_ulps_eq!(m.mutation_rates()[[G, C]], 0.3);
    pretty_assert_ulps_eq!(m.mutation_rates()[[G, G]], 0.0);
    Ok(())
  }

  #[rstest]
  fn rejects_invalid_parameters() {
    assert!(model(1, Array1::ones(4)).is_err());
    assert!(model(4, array![1.0, -1.0, 1.0, 1.0]).is_err());
    assert!(PoMo::new(PoMoParams {
      mutation_rates: Array1::from_elem(6, 0.01),
      ..PoMoParams::default()
    })
    .is_err());
    assert!(PoMo::new(PoMoParams {
      mutation_rates: Array1::zeros(12),
      ..PoMoParams::default()
    })
    .is_err());
  }
}
