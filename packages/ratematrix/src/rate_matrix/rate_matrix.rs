use crate::make_error;
use crate::rate_matrix::base::{RateMatrixBase, UpdateState};
use crate::rate_matrix::stochastic_mapping::StochasticMapping;
use crate::utils::validate::{validate_non_negative, validate_time};
use eyre::Report;
use itertools::Itertools;
use ndarray::prelude::*;
use rand::RngCore;
use std::fmt::{Debug, Display};
use std::io::Write;
use std::iter::zip;

/// Generator of a finite-state continuous-time Markov chain, together with its transition probabilities
/// `P(t) = exp(Q·t)`.
///
/// Parameter setters of concrete models only record the new value and mark the matrix stale. `update()` rebuilds
/// the generator and any cached factorization. Transition probabilities are available only while the matrix is
/// current.
pub trait RateMatrix: Debug + Send + Sync {
  fn base(&self) -> &RateMatrixBase;

  fn base_mut(&mut self) -> &mut RateMatrixBase;

  /// Short model name, for messages
  fn name(&self) -> &'static str;

  /// Rebuilds the generator from the current parameters. Does nothing when already current.
  fn update(&mut self) -> Result<(), Report>;

  /// Fills `P` with `exp(Q·t)`. Called only on a current matrix, with a valid `t` and a correctly shaped `P`.
  fn compute_transition_probabilities(&self, t: f64, P: &mut Array2<f64>) -> Result<(), Report>;

  fn box_clone(&self) -> Box<dyn RateMatrix>;

  /// Labels of states, for printing
  fn state_labels(&self) -> Vec<String> {
    (0..self.num_states()).map(|i| i.to_string()).collect()
  }

  #[inline]
  fn num_states(&self) -> usize {
    self.base().num_states()
  }

  #[inline]
  fn rate_matrix(&self) -> &Array2<f64> {
    self.base().Q()
  }

  #[inline]
  fn stationary_frequencies(&self) -> &Array1<f64> {
    self.base().pi()
  }

  #[inline]
  fn state(&self) -> UpdateState {
    self.base().state()
  }

  #[inline]
  fn needs_update(&self) -> bool {
    self.state() == UpdateState::Stale
  }

  fn average_rate(&self) -> f64 {
    self.base().average_rate()
  }

  fn check_time_reversibility(&self, tolerance: f64) -> bool {
    self.base().check_time_reversibility(tolerance)
  }

  /// Fails when parameters changed since the last update
  fn ensure_current(&self) -> Result<(), Report> {
    if self.needs_update() {
      return make_error!(
        "Rate matrix '{}' has pending parameter changes. \
         It should be updated before computing transition probabilities.",
        self.name()
      );
    }
    Ok(())
  }

  /// Transition probabilities over elapsed time `t`, written into the caller-owned `P`
  fn calculate_transition_probabilities(&self, t: f64, P: &mut Array2<f64>) -> Result<(), Report> {
    self.ensure_current()?;
    validate_time(t)?;
    let n = self.num_states();
    if P.shape() != [n, n] {
      return make_error!(
        "Transition probability matrix should have shape [{n}, {n}], but found {:?}",
        P.shape()
      );
    }
    self.compute_transition_probabilities(t, P)
  }

  /// Transition probabilities along a branch from `start_age` to `end_age` (ages decrease towards the present) with
  /// the given clock `rate`, i.e. over elapsed time `rate·(start_age - end_age)`
  fn calculate_transition_probabilities_between(
    &self,
    start_age: f64,
    end_age: f64,
    rate: f64,
    P: &mut Array2<f64>,
  ) -> Result<(), Report> {
    validate_non_negative("rate", rate)?;
    self.calculate_transition_probabilities(rate * (start_age - end_age), P)
  }

  /// Allocating variant of [`RateMatrix::calculate_transition_probabilities`]
  fn transition_probabilities(&self, t: f64) -> Result<Array2<f64>, Report> {
    let n = self.num_states();
    let mut P = Array2::zeros((n, n));
    self.calculate_transition_probabilities(t, &mut P)?;
    Ok(P)
  }

  /// `n`-th power of the uniformized jump matrix `R = I + Q/λ*`, with `λ*` the dominating rate
  fn stochastic_matrix(&self, n: usize) -> Result<Array2<f64>, Report> {
    self.ensure_current()?;
    Ok(self.base().stochastic_matrix(n))
  }

  /// Substitution history along a branch from `start_age` to `end_age`, conditioned on both end states.
  /// See [`RateMatrixBase::simulate_stochastic_mapping`].
  fn simulate_stochastic_mapping(
    &self,
    start_age: f64,
    end_age: f64,
    rate: f64,
    start_state: usize,
    end_state: usize,
    rng: &mut dyn RngCore,
  ) -> Result<Option<StochasticMapping>, Report> {
    self.ensure_current()?;
    self
      .base()
      .simulate_stochastic_mapping(start_age, end_age, rate, start_state, end_state, rng)
  }

  /// Consumes a stale matrix and returns the updated one
  fn into_updated(mut self) -> Result<Self, Report>
  where
    Self: Sized,
  {
    self.update()?;
    Ok(self)
  }

  fn print(&self, w: &mut dyn Write) -> Result<(), Report> {
    let labels = self.state_labels();
    writeln!(w, "Model: {} ({} states, {})", self.name(), self.num_states(), self.state())?;
    writeln!(w, "Average rate: {:.6}", self.average_rate())?;

    writeln!(w, "\nEquilibrium frequencies (pi_i):")?;
    for (label, p) in zip(&labels, self.stationary_frequencies()) {
      writeln!(w, "{label}:\t{p:.4}")?;
    }

    writeln!(w, "\nRates from i->j (Q_ij):")?;
    writeln!(w, "\t{}", labels.iter().join("\t"))?;
    for (label, Qi) in zip(&labels, self.rate_matrix().rows()) {
      writeln!(w, "{label}\t{}", Qi.iter().map(|Qij| format!("{Qij:.4}")).join("\t"))?;
    }
    writeln!(w)?;
    Ok(())
  }
}

impl Clone for Box<dyn RateMatrix> {
  fn clone(&self) -> Self {
    self.box_clone()
  }
}

impl Display for dyn RateMatrix {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut buf = vec![];
    self.print(&mut buf).map_err(|_| std::fmt::Error)?;
    write!(f, "{}", String::from_utf8_lossy(&buf))
  }
}
