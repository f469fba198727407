use crate::make_error;
use crate::models::free_k::TransitionMethod;
use crate::rate_matrix::base::RateMatrixBase;
use crate::rate_matrix::rate_matrix::RateMatrix;
use crate::rate_matrix::stochastic_mapping::UniformizedJumpChain;
use crate::spectral::engine::{require_engine, SpectralTransitionEngine};
use crate::utils::ndarray::{clamp_min_inplace, normalize_rows_inplace};
use crate::utils::validate::validate_rates;
use eyre::{Report, WrapErr};
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[derive(Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct CovarionParams {
  /// Number of character states within each rate class
  #[default = 4]
  pub num_states_per_class: usize,

  #[default = 2]
  pub num_classes: usize,

  /// One `n×n` matrix of substitution rates per class. Diagonals are ignored. All ones when not given.
  pub class_rate_matrices: Option<Vec<Array2<f64>>>,

  /// `k×k` rates of switching between classes. Diagonal is ignored. All ones when not given.
  pub switch_rates: Option<Array2<f64>>,

  /// Multiplier of the substitution rates of each class. All ones when not given.
  pub clock_rates: Option<Array1<f64>>,

  /// Whether to scale the generator to an average rate of 1
  #[default = true]
  pub rescale: bool,

  pub method: TransitionMethod,
}

/// Covarion (covariotide) model: a character evolves under one of `k` rate classes at a time, and switches between
/// classes without changing state.
///
/// The state `(class c, character j)` has index `c·n + j`. Its generator has `k×k` blocks of size `n×n`:
/// block `(c, c)` holds the substitution rates of class `c` times its clock rate, and block `(c, d)` with `c != d` is
/// `switch_rates[c][d]·I`.
///
/// See: Tuffley, Steel (1998). Modeling the covarion hypothesis of nucleotide substitution. Math. Biosci. 147:
/// 63–91.
#[derive(Clone, Debug)]
pub struct Covarion {
  base: RateMatrixBase,
  num_states_per_class: usize,
  num_classes: usize,
  class_rate_matrices: Vec<Array2<f64>>,
  switch_rates: Array2<f64>,
  clock_rates: Array1<f64>,
  rescale: bool,
  method: TransitionMethod,
  engine: Option<SpectralTransitionEngine>,
  jump_chain: Option<UniformizedJumpChain>,
}

impl Covarion {
  pub fn new(params: CovarionParams) -> Result<Self, Report> {
    let CovarionParams {
      num_states_per_class: n,
      num_classes: k,
      class_rate_matrices,
      switch_rates,
      clock_rates,
      rescale,
      method,
    } = params;
    if n < 1 || k < 1 || n * k < 2 {
      return make_error!(
        "Covarion model should have at least 2 states in total, but found {n} states per class and {k} classes"
      );
    }

    let mut model = Self {
      base: RateMatrixBase::new(n * k)?,
      num_states_per_class: n,
      num_classes: k,
      class_rate_matrices: vec![Array2::ones((n, n)); k],
      switch_rates: Array2::ones((k, k)),
      clock_rates: Array1::ones(k),
      rescale,
      method,
      engine: None,
      jump_chain: None,
    };
    if let Some(matrices) = class_rate_matrices {
      model.set_class_rate_matrices(matrices)?;
    }
    if let Some(switch_rates) = switch_rates {
      model.set_switch_rates(switch_rates)?;
    }
    if let Some(clock_rates) = clock_rates {
      model.set_clock_rates(clock_rates)?;
    }
    model.into_updated()
  }

  #[inline]
  pub const fn num_states_per_class(&self) -> usize {
    self.num_states_per_class
  }

  #[inline]
  pub const fn num_classes(&self) -> usize {
    self.num_classes
  }

  pub fn class_rate_matrices(&self) -> &[Array2<f64>] {
    &self.class_rate_matrices
  }

  pub const fn switch_rates(&self) -> &Array2<f64> {
    &self.switch_rates
  }

  pub const fn clock_rates(&self) -> &Array1<f64> {
    &self.clock_rates
  }

  pub fn set_class_rate_matrices(&mut self, matrices: Vec<Array2<f64>>) -> Result<(), Report> {
    if matrices.len() != self.num_classes {
      return make_error!(
        "Expected one rate matrix per class ({}), but found {}",
        self.num_classes,
        matrices.len()
      );
    }
    for (class, matrix) in matrices.iter().enumerate() {
      validate_off_diagonal(&format!("class_rate_matrices[{class}]"), matrix, self.num_states_per_class)?;
    }
    self.class_rate_matrices = matrices;
    self.base.mark_stale();
    Ok(())
  }

  pub fn set_switch_rates(&mut self, switch_rates: Array2<f64>) -> Result<(), Report> {
    validate_off_diagonal("switch_rates", &switch_rates, self.num_classes)?;
    self.switch_rates = switch_rates;
    self.base.mark_stale();
    Ok(())
  }

  pub fn set_clock_rates(&mut self, clock_rates: Array1<f64>) -> Result<(), Report> {
    validate_rates("clock_rates", &clock_rates, self.num_classes)?;
    self.clock_rates = clock_rates;
    self.base.mark_stale();
    Ok(())
  }

  pub fn set_method(&mut self, method: TransitionMethod) {
    if method != self.method {
      self.method = method;
      self.base.mark_stale();
    }
  }

  /// `(class, character state)` of a state index
  #[inline]
  pub const fn class_and_state(&self, index: usize) -> (usize, usize) {
    (index / self.num_states_per_class, index % self.num_states_per_class)
  }

  /// Probability of each class at stationarity
  pub fn class_frequencies(&self) -> Array1<f64> {
    let n = self.num_states_per_class;
    let pi = self.base.pi();
    Array1::from_shape_fn(self.num_classes, |class| pi.slice(s![class * n..(class + 1) * n]).sum())
  }

  fn fill_rate_matrix(&mut self) {
    let n = self.num_states_per_class;
    let k = self.num_classes;
    let mut Q = Array2::<f64>::zeros((n * k, n * k));
    for c in 0..k {
      let mut block = Q.slice_mut(s![c * n..(c + 1) * n, c * n..(c + 1) * n]);
      block.assign(&(&self.class_rate_matrices[c] * self.clock_rates[c]));
      for d in (0..k).filter(|&d| d != c) {
        let switch_rate = self.switch_rates[[c, d]];
        for j in 0..n {
          Q[[c * n + j, d * n + j]] = switch_rate;
        }
      }
    }
    *self.base.Q_mut() = Q;
    self.base.set_diagonal();
  }
}

fn validate_off_diagonal(name: &str, matrix: &Array2<f64>, size: usize) -> Result<(), Report> {
  if matrix.shape() != [size, size] {
    return make_error!("Matrix '{name}' should have shape [{size}, {size}], but found {:?}", matrix.shape());
  }
  let off_diagonal: Array1<f64> = matrix
    .indexed_iter()
    .filter(|((i, j), _)| i != j)
    .map(|(_, &rate)| rate)
    .collect();
  validate_rates(name, &off_diagonal, size * (size - 1))
}

impl RateMatrix for Covarion {
  fn base(&self) -> &RateMatrixBase {
    &self.base
  }

  fn base_mut(&mut self) -> &mut RateMatrixBase {
    &mut self.base
  }

  fn name(&self) -> &'static str {
    "Covarion"
  }

  fn update(&mut self) -> Result<(), Report> {
    if !self.needs_update() {
      return Ok(());
    }
    self.fill_rate_matrix();
    let pi = self
      .base
      .calculate_stationary_frequencies()
      .wrap_err("When updating covarion model. Are some classes unreachable by switching?")?;
    self.base.set_pi(pi)?;
    if self.rescale {
      self.base.rescale_to_average_rate(1.0)?;
    }

    self.engine = None;
    self.jump_chain = None;
    match self.method {
      TransitionMethod::Eigen => {
        self.engine = Some(SpectralTransitionEngine::from_rate_matrix(self.base.Q())?);
      }
      TransitionMethod::Uniformization => {
        self.jump_chain = Some(UniformizedJumpChain::new(&self.base));
      }
      TransitionMethod::ScalingAndSquaring => {}
    }

    self.base.mark_current();
    debug!(
      "Updated {}: {} classes of {} states, method {}, class frequencies {}",
      self.name(),
      self.num_classes,
      self.num_states_per_class,
      self.method,
      self.class_frequencies()
    );
    Ok(())
  }

  fn compute_transition_probabilities(&self, t: f64, P: &mut Array2<f64>) -> Result<(), Report> {
    match self.method {
      TransitionMethod::Eigen => require_engine(&self.engine, self.name())?.transition_probabilities_into(t, P)?,
      TransitionMethod::ScalingAndSquaring => self.base.exponentiate_by_scaling_and_squaring(t, P)?,
      TransitionMethod::Uniformization => match &self.jump_chain {
        Some(chain) => P.assign(&chain.transition_probabilities(t)?),
        None => return make_error!("Rate matrix '{}' has no uniformized jump chain", self.name()),
      },
    }
    clamp_min_inplace(P, 0.0);
    normalize_rows_inplace(P);
    Ok(())
  }

  fn box_clone(&self) -> Box<dyn RateMatrix> {
    Box::new(self.clone())
  }

  fn state_labels(&self) -> Vec<String> {
    (0..self.num_states())
      .map(|index| {
        let (class, state) = self.class_and_state(index);
        format!("{state}@{class}")
      })
      .collect()
  }
}
