use crate::make_error;
use crate::make_internal_error;
use crate::rate_matrix::base::RateMatrixBase;
use crate::rate_matrix::rate_matrix::RateMatrix;
use crate::spectral::engine::{require_engine, SpectralTransitionEngine};
use crate::utils::validate::validate_non_negative;
use eyre::{Report, WrapErr};
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[derive(Copy, Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct FlowTwoPopulationsParams {
  /// Number of allele copies in each population, `(N1, N2)`
  #[default([4, 4])]
  pub population_sizes: [usize; 2],

  /// Mutation rates `(A->a, a->A)`
  #[default([0.001, 0.001])]
  pub mu: [f64; 2],

  /// Allele flow rates `(1->2, 2->1)`
  #[default([0.0, 0.0])]
  pub lambda: [f64; 2],

  /// Drift and selection strengths `(a, A)`: scale decrease and increase of allele `A` in polymorphic populations
  #[default([1.0, 1.0])]
  pub sigma: [f64; 2],
}

/// Bi-allelic locus shared by two populations of fixed size, with mutation, allele flow between the populations,
/// and drift with selection within each of them.
///
/// A state is the pair of counts `(f1, f2)` of allele `A`, with `0 <= f1 <= N1` and `0 <= f2 <= N2`, enumerated
/// with `f1` major. Only changes of one count by one unit have non-zero rates:
///
/// | from                 | change | rate                                              |
/// |----------------------|--------|---------------------------------------------------|
/// | `f1 = N1`            | f1 - 1 | `μ0/N1 + (N2-f2)·λ1/N2`                           |
/// | `f2 = N2`            | f2 - 1 | `μ0/N2 + (N1-f1)·λ0/N1`                           |
/// | `f1 = 0`             | f1 + 1 | `μ1/N1 + f2·λ1/N2`                                |
/// | `f2 = 0`             | f2 + 1 | `μ1/N2 + f1·λ0/N1`                                |
/// | `0 < f1 < N1`        | f1 + 1 | `f1(N1-f1)·σ1/N1² + (N1-f1)·f2·λ1/(N1·N2)`        |
/// | `0 < f1 < N1`        | f1 - 1 | `f1(N1-f1)·σ0/N1² + f1·(N2-f2)·λ1/(N1·N2)`        |
/// | `0 < f2 < N2`        | f2 + 1 | `f2(N2-f2)·σ1/N2² + (N2-f2)·f1·λ0/(N1·N2)`        |
/// | `0 < f2 < N2`        | f2 - 1 | `f2(N2-f2)·σ0/N2² + f2·(N1-f1)·λ0/(N1·N2)`        |
///
/// The generator is not reversible in general. Its stationary distribution is solved for, and transition
/// probabilities come from the general (possibly complex) eigendecomposition. No rescaling is applied.
#[derive(Clone, Debug)]
pub struct FlowTwoPopulations {
  base: RateMatrixBase,
  population_sizes: [usize; 2],
  mu: [f64; 2],
  lambda: [f64; 2],
  sigma: [f64; 2],
  engine: Option<SpectralTransitionEngine>,
}

impl FlowTwoPopulations {
  pub fn new(params: FlowTwoPopulationsParams) -> Result<Self, Report> {
    let [n1, n2] = params.population_sizes;
    if n1 == 0 || n2 == 0 {
      return make_error!("Population sizes should be at least 1, but found N1={n1}, N2={n2}");
    }
    let mut model = Self {
      base: RateMatrixBase::new((n1 + 1) * (n2 + 1))?,
      population_sizes: params.population_sizes,
      mu: params.mu,
      lambda: params.lambda,
      sigma: params.sigma,
      engine: None,
    };
    model.set_mu(params.mu)?;
    model.set_lambda(params.lambda)?;
    model.set_sigma(params.sigma)?;
    model.into_updated()
  }

  pub const fn population_sizes(&self) -> [usize; 2] {
    self.population_sizes
  }

  pub fn set_mu(&mut self, mu: [f64; 2]) -> Result<(), Report> {
    validate_pair("mu", mu)?;
    self.mu = mu;
    self.base.mark_stale();
    Ok(())
  }

  pub fn set_lambda(&mut self, lambda: [f64; 2]) -> Result<(), Report> {
    validate_pair("lambda", lambda)?;
    self.lambda = lambda;
    self.base.mark_stale();
    Ok(())
  }

  pub fn set_sigma(&mut self, sigma: [f64; 2]) -> Result<(), Report> {
    validate_pair("sigma", sigma)?;
    self.sigma = sigma;
    self.base.mark_stale();
    Ok(())
  }

  /// Allele counts `(f1, f2)` of a state
  pub const fn allele_counts(&self, state: usize) -> (usize, usize) {
    let n2 = self.population_sizes[1];
    (state / (n2 + 1), state % (n2 + 1))
  }

  fn off_diagonal_rate(&self, from: usize, to: usize) -> Result<f64, Report> {
    let (f1, f2) = self.allele_counts(from);
    let (g1, g2) = self.allele_counts(to);
    let d1 = g1 as i64 - f1 as i64;
    let d2 = g2 as i64 - f2 as i64;
    if d1.abs() + d2.abs() != 1 {
      return Ok(0.0);
    }

    let [n1, n2] = self.population_sizes.map(|n| n as f64);
    let (f1, f2) = (f1 as f64, f2 as f64);
    let [mu0, mu1] = self.mu;
    let [lambda0, lambda1] = self.lambda;
    let [sigma0, sigma1] = self.sigma;
    let interior1 = f1 > 0.0 && f1 < n1;
    let interior2 = f2 > 0.0 && f2 < n2;

    let rate = match (d1, d2) {
      (-1, 0) if f1 == n1 => mu0 / n1 + (n2 - f2) * lambda1 / n2,
      (0, -1) if f2 == n2 => mu0 / n2 + (n1 - f1) * lambda0 / n1,
      (1, 0) if f1 == 0.0 => mu1 / n1 + f2 * lambda1 / n2,
      (0, 1) if f2 == 0.0 => mu1 / n2 + f1 * lambda0 / n1,
      (1, 0) if interior1 => f1 * (n1 - f1) * sigma1 / (n1 * n1) + (n1 - f1) * f2 * lambda1 / (n1 * n2),
      (-1, 0) if interior1 => f1 * (n1 - f1) * sigma0 / (n1 * n1) + f1 * (n2 - f2) * lambda1 / (n1 * n2),
      (0, 1) if interior2 => f2 * (n2 - f2) * sigma1 / (n2 * n2) + (n2 - f2) * f1 * lambda0 / (n1 * n2),
      (0, -1) if interior2 => f2 * (n2 - f2) * sigma0 / (n2 * n2) + f2 * (n1 - f1) * lambda0 / (n1 * n2),
      _ => {
        return make_internal_error!(
          "Unexpected change of allele counts from ({f1}, {f2}) by ({d1}, {d2}) with population sizes ({n1}, {n2})"
        )
      }
    };
    Ok(rate)
  }

  fn compute_off_diagonal(&mut self) -> Result<(), Report> {
    let n = self.base.num_states();
    let mut Q = Array2::zeros((n, n));
    for ((i, j), q) in Q.indexed_iter_mut() {
      if i != j {
        *q = self.off_diagonal_rate(i, j)?;
      }
    }
    *self.base.Q_mut() = Q;
    Ok(())
  }
}

fn validate_pair(name: &str, values: [f64; 2]) -> Result<(), Report> {
  for (i, value) in values.into_iter().enumerate() {
    validate_non_negative(&format!("{name}[{i}]"), value)?;
  }
  Ok(())
}

impl RateMatrix for FlowTwoPopulations {
  fn base(&self) -> &RateMatrixBase {
    &self.base
  }

  fn base_mut(&mut self) -> &mut RateMatrixBase {
    &mut self.base
  }

  fn name(&self) -> &'static str {
    "FlowTwoPopulations"
  }

  fn update(&mut self) -> Result<(), Report> {
    if !self.needs_update() {
      return Ok(());
    }
    self.compute_off_diagonal()?;
    self.base.set_diagonal();
    let pi = self
      .base
      .calculate_stationary_frequencies()
      .wrap_err("When updating two-population gene flow model. Are all mutation and drift rates zero?")?;
    self.base.set_pi(pi)?;
    let engine = SpectralTransitionEngine::from_rate_matrix(self.base.Q())?;
    debug!(
      "Updated {}: {} states, average rate {}, complex spectrum: {}",
      self.name(),
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
    (0..self.num_states())
      .map(|state| {
        let (f1, f2) = self.allele_counts(state);
        format!("{f1}|{f2}")
      })
      .collect()
  }
}
