//! Endpoint-conditioned sampling of substitution histories by uniformization.
//!
//! The continuous-time chain is embedded into a discrete jump chain `R = I + Q/λ*`, with `λ*` the dominating
//! rate, driven by a Poisson process of rate `λ*`. Jumps of `R` from a state to itself are virtual and are removed
//! from the sampled history.
//!
//! See: Hobolth, Stone (2009). Simulation from endpoint-conditioned, continuous-time Markov chains on a finite
//! state space, with applications to molecular evolution. Ann. Appl. Stat. 3 (3): 1204–1231.

use crate::rate_matrix::base::RateMatrixBase;
use crate::utils::random::sample_weighted_index;
use crate::utils::validate::{validate_non_negative, validate_time};
use crate::{make_error, make_internal_report};
use eyre::Report;
use log::{debug, trace};
use ndarray::prelude::*;
use rand::Rng;
use statrs::distribution::{Discrete, Poisson};
use std::iter::once;

/// Sampled history along one branch: the visited states, and the time spent in each of them
#[derive(Clone, Debug, PartialEq)]
pub struct StochasticMapping {
  pub states: Vec<usize>,
  pub times: Vec<f64>,
}

/// Powers `R^0, R^1, ...` of the uniformized jump matrix, computed on demand
#[derive(Clone, Debug)]
pub struct UniformizedJumpChain {
  dominating_rate: f64,
  powers: Vec<Array2<f64>>,
}

impl UniformizedJumpChain {
  pub fn new(base: &RateMatrixBase) -> Self {
    let n = base.num_states();
    let dominating_rate = base.dominating_rate();
    let identity = Array2::<f64>::eye(n);
    let jump = if dominating_rate > 0.0 {
      base.Q() / dominating_rate + &identity
    } else {
      identity.clone()
    };
    Self {
      dominating_rate,
      powers: vec![identity, jump],
    }
  }

  #[inline]
  pub const fn dominating_rate(&self) -> f64 {
    self.dominating_rate
  }

  /// `R^n`
  pub fn power(&mut self, n: usize) -> &Array2<f64> {
    self.extend_to(n);
    &self.powers[n]
  }

  /// Makes sure `R^0 ..= R^n` are available
  pub fn extend_to(&mut self, n: usize) {
    while self.powers.len() <= n {
      let next = self.powers[self.powers.len() - 1].dot(&self.powers[1]);
      self.powers.push(next);
    }
  }

  #[inline]
  pub fn powers(&self) -> &[Array2<f64>] {
    &self.powers
  }

  /// `exp(Q·t) = Σ_k Poisson(k; λ*·t)·R^k`, truncated after `ceil(4 + 6·sqrt(λ*·t) + λ*·t)` terms.
  ///
  /// When `λ*·t` exceeds [`MAX_UNIFORMIZATION_LAMBDA`], the sum is taken over `t/2^h`, with `h` the fewest halvings
  /// bringing it below the cutoff, and the result is squared `h` times. This bounds the number of terms by
  /// `ceil(4 + 6·sqrt(64) + 64) = 116`.
  ///
  /// Powers beyond the cached ones are computed on the fly and are not kept.
  ///
  /// See: Tataru, Hobolth (2011). Comparison of methods for calculating conditional expectations of sufficient
  /// statistics for continuous time Markov chains. BMC Bioinformatics 12: 465.
  pub fn transition_probabilities(&self, t: f64) -> Result<Array2<f64>, Report> {
    validate_time(t)?;
    let halvings = num_halvings(self.dominating_rate * t);
    if halvings > 0 {
      trace!("Uniformization over t={t}: summing over t/2^{halvings} and squaring back");
    }
    let mut P = self.uniformized_sum(t / 2.0_f64.powi(halvings))?;
    for _ in 0..halvings {
      P = P.dot(&P);
    }
    Ok(P)
  }

  fn uniformized_sum(&self, t: f64) -> Result<Array2<f64>, Report> {
    let lambda = self.dominating_rate * t;
    let mut P = Array2::<f64>::zeros(self.powers[0].raw_dim());
    let mut uncached: Option<Array2<f64>> = None;
    for k in 0..num_uniformization_terms(lambda) {
      let weight = poisson_pmf(lambda, k)?;
      if let Some(power) = self.powers.get(k) {
        P.scaled_add(weight, power);
      } else {
        let previous = uncached.as_ref().unwrap_or(&self.powers[self.powers.len() - 1]);
        let power = previous.dot(&self.powers[1]);
        P.scaled_add(weight, &power);
        uncached = Some(power);
      }
    }
    Ok(P)
  }
}

/// Largest expected number of uniformized events `λ*·t` summed over directly
pub const MAX_UNIFORMIZATION_LAMBDA: f64 = 64.0;

fn num_uniformization_terms(lambda: f64) -> usize {
  (4.0 + 6.0 * lambda.sqrt() + lambda).ceil() as usize
}

/// Fewest halvings of `lambda` bringing it to at most [`MAX_UNIFORMIZATION_LAMBDA`]
fn num_halvings(lambda: f64) -> i32 {
  if lambda <= MAX_UNIFORMIZATION_LAMBDA {
    0
  } else {
    (lambda / MAX_UNIFORMIZATION_LAMBDA).log2().ceil() as i32
  }
}

impl RateMatrixBase {
  /// `n`-th power of the uniformized jump matrix `R = I + Q/dominating_rate`
  pub fn stochastic_matrix(&self, n: usize) -> Array2<f64> {
    UniformizedJumpChain::new(self).power(n).clone()
  }

  /// Samples a substitution history along a branch from `start_age` to `end_age` (ages decrease towards the
  /// present), which starts in `start_state` and ends in `end_state`.
  ///
  /// Returns `None` when the number of events fails to converge, in which case the caller should reject the
  /// sample.
  pub fn simulate_stochastic_mapping<R: Rng + ?Sized>(
    &self,
    start_age: f64,
    end_age: f64,
    rate: f64,
    start_state: usize,
    end_state: usize,
    rng: &mut R,
  ) -> Result<Option<StochasticMapping>, Report> {
    let n = self.num_states();
    if start_state >= n || end_state >= n {
      return make_error!(
        "State index out of bounds: requested mapping {start_state} -> {end_state}, but there are {n} states"
      );
    }
    let branch_length = start_age - end_age;
    validate_time(branch_length)?;
    validate_non_negative("rate", rate)?;

    let t = branch_length * rate;
    let mut P = Array2::zeros((n, n));
    self.exponentiate_by_scaling_and_squaring(t, &mut P)?;
    let prob_transition_ctmc = P[[start_state, end_state]];
    if !(prob_transition_ctmc > 0.0) {
      return make_error!(
        "Unable to map substitutions {start_state} -> {end_state}: end state is unreachable over time {t}"
      );
    }

    let mut chain = UniformizedJumpChain::new(self);
    let lambda = t * chain.dominating_rate();
    let max_events = 20 + (5.0 * lambda).ceil() as usize;

    // Inverse transform sampling of the number of events, conditioned on the end state
    let mut g = rng.gen::<f64>() * (1.0 - 1e-3) * prob_transition_ctmc;
    let mut num_events = 0;
    loop {
      let prob_total = poisson_pmf(lambda, num_events)? * chain.power(num_events)[[start_state, end_state]];
      g -= prob_total;
      if g <= 0.0 {
        break;
      }
      if num_events > max_events {
        debug!(
          "Stochastic mapping {start_state} -> {end_state} did not converge after {num_events} events (lambda={lambda})"
        );
        return Ok(None);
      }
      num_events += 1;
    }

    chain.extend_to(num_events);
    let powers = chain.powers();
    let R_1 = &powers[1];

    let mut states = Vec::with_capacity(num_events + 1);
    states.push(start_state);
    for event in 0..num_events {
      let prev_state = states[event];
      let R_left = &powers[num_events - event - 1];
      let weights: Vec<f64> = (0..n).map(|j| R_1[[prev_state, j]] * R_left[[j, end_state]]).collect();
      let total = weights.iter().sum();
      let next_state = sample_weighted_index(weights, total, rng).ok_or_else(|| {
        make_internal_report!("Stochastic mapping: no admissible state after {prev_state} at event {event}")
      })?;
      states.push(next_state);
    }

    let mut times: Vec<f64> = once(0.0)
      .chain((0..num_events).map(|_| rng.gen::<f64>() * branch_length))
      .collect();
    times.sort_by(f64::total_cmp);

    // Drop virtual events, i.e. jumps of the uniformized chain from a state to itself
    let mut kept_states = vec![states[0]];
    let mut kept_times = vec![0.0];
    for (&state, &time) in states.iter().zip(&times).skip(1) {
      if kept_states.last() != Some(&state) {
        kept_states.push(state);
        kept_times.push(time);
      }
    }

    let durations = kept_times
      .iter()
      .zip(kept_times.iter().skip(1).chain(once(&branch_length)))
      .map(|(begin, end)| end - begin)
      .collect();

    Ok(Some(StochasticMapping {
      states: kept_states,
      times: durations,
    }))
  }
}

fn poisson_pmf(lambda: f64, k: usize) -> Result<f64, Report> {
  if lambda == 0.0 {
    return Ok(if k == 0 { 1.0 } else { 0.0 });
  }
  Ok(Poisson::new(lambda)?.pmf(k as u64))
}
