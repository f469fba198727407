use crate::make_error;
use crate::rate_matrix::base::RateMatrixBase;
use crate::rate_matrix::rate_matrix::RateMatrix;
use crate::spectral::engine::{require_engine, SpectralTransitionEngine};
use crate::utils::validate::validate_rates;
use eyre::Report;
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Largest number of areas. The state space has `2^K` ranges.
pub const MAX_NUM_AREAS: usize = 10;

#[derive(Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct DECParams {
  /// Number of areas `K`
  #[default = 3]
  pub num_areas: usize,

  /// `K×K` rates of dispersal from an occupied area (row) to an unoccupied one (column). Diagonal is ignored.
  /// All ones when not given.
  pub dispersal_rates: Option<Array2<f64>>,

  /// Rate of local extinction in each area. All ones when not given.
  pub extirpation_rates: Option<Array1<f64>>,

  /// Relative weight of ranges of each size `0..=K`: dispersal into a range of size `s` is scaled by
  /// `w[s]/max(w)`. All ones when not given.
  pub range_size_weights: Option<Array1<f64>>,

  /// Whether to scale the generator so that the mean exit rate over all ranges is 1
  #[default = true]
  pub rescale: bool,
}

/// Anagenetic part of the dispersal-extinction-cladogenesis model of geographic ranges.
///
/// A range is a subset of `K` areas, encoded as a bit set: bit `j` of the state index is set when area `j` is
/// occupied. Ranges change one area at a time:
///
/// - an occupied area `j` is lost at rate `e[j]`
/// - an unoccupied area `j` is gained at rate `w[s+1]/max(w) · Σ_{k occupied} d[k][j]`, for a range of size `s`
///
/// The empty range (state 0) is absorbing, so the stationary distribution is concentrated on it. Unlike other
/// models, rescaling normalizes the unweighted mean exit rate `-Σ_i Q[i][i] / 2^K`.
///
/// See: Ree, Smith (2008). Maximum likelihood inference of geographic range evolution by dispersal, local
/// extinction, and cladogenesis. Syst. Biol. 57 (1): 4–14.
#[derive(Clone, Debug)]
pub struct DEC {
  base: RateMatrixBase,
  num_areas: usize,
  dispersal_rates: Array2<f64>,
  extirpation_rates: Array1<f64>,
  range_size_weights: Array1<f64>,
  rescale: bool,
  engine: Option<SpectralTransitionEngine>,
}

impl DEC {
  pub fn new(params: DECParams) -> Result<Self, Report> {
    let DECParams {
      num_areas: K,
      dispersal_rates,
      extirpation_rates,
      range_size_weights,
      rescale,
    } = params;
    if !(1..=MAX_NUM_AREAS).contains(&K) {
      return make_error!("Number of areas should be between 1 and {MAX_NUM_AREAS}, but found {K}");
    }
    let mut model = Self {
      base: RateMatrixBase::new(1 << K)?,
      num_areas: K,
      dispersal_rates: Array2::ones((K, K)),
      extirpation_rates: Array1::ones(K),
      range_size_weights: Array1::ones(K + 1),
      rescale,
      engine: None,
    };
    if let Some(rates) = dispersal_rates {
      model.set_dispersal_rates(rates)?;
    }
    if let Some(rates) = extirpation_rates {
      model.set_extirpation_rates(rates)?;
    }
    if let Some(weights) = range_size_weights {
      model.set_range_size_weights(weights)?;
    }
    model.into_updated()
  }

  #[inline]
  pub const fn num_areas(&self) -> usize {
    self.num_areas
  }

  pub const fn dispersal_rates(&self) -> &Array2<f64> {
    &self.dispersal_rates
  }

  pub const fn extirpation_rates(&self) -> &Array1<f64> {
    &self.extirpation_rates
  }

  pub const fn range_size_weights(&self) -> &Array1<f64> {
    &self.range_size_weights
  }

  pub fn set_dispersal_rates(&mut self, rates: Array2<f64>) -> Result<(), Report> {
    let K = self.num_areas;
    if rates.shape() != [K, K] {
      return make_error!("Dispersal rates should have shape [{K}, {K}], but found {:?}", rates.shape());
    }
    let flat: Array1<f64> = rates.iter().copied().collect();
    validate_rates("dispersal_rates", &flat, K * K)?;
    self.dispersal_rates = rates;
    self.base.mark_stale();
    Ok(())
  }

  pub fn set_extirpation_rates(&mut self, rates: Array1<f64>) -> Result<(), Report> {
    validate_rates("extirpation_rates", &rates, self.num_areas)?;
    self.extirpation_rates = rates;
    self.base.mark_stale();
    Ok(())
  }

  pub fn set_range_size_weights(&mut self, weights: Array1<f64>) -> Result<(), Report> {
    validate_rates("range_size_weights", &weights, self.num_areas + 1)?;
    if !weights.iter().any(|&w| w > 0.0) {
      return make_error!("At least one range size weight should be positive, but found {weights}");
    }
    self.range_size_weights = weights;
    self.base.mark_stale();
    Ok(())
  }

  /// Areas of a range, in increasing order
  pub fn areas(&self, range: usize) -> Vec<usize> {
    (0..self.num_areas).filter(|&j| is_occupied(range, j)).collect()
  }

  /// Mean of the exit rates `-Q[i][i]` over all ranges, each counted once
  pub fn mean_exit_rate(&self) -> f64 {
    -self.base.Q().diag().mean().unwrap_or(0.0)
  }

  fn fill_rate_matrix(&mut self) {
    let n = self.base.num_states();
    let max_weight = self.range_size_weights.fold(0.0, |acc: f64, &w| acc.max(w));
    let mut Q = Array2::<f64>::zeros((n, n));
    for range in 1..n {
      let occupied = self.areas(range);
      let weight = self.range_size_weights.get(occupied.len() + 1).map_or(0.0, |w| w / max_weight);
      for j in 0..self.num_areas {
        let target = range ^ (1 << j);
        Q[[range, target]] = if is_occupied(range, j) {
          self.extirpation_rates[j]
        } else {
          weight * occupied.iter().map(|&k| self.dispersal_rates[[k, j]]).sum::<f64>()
        };
      }
    }
    *self.base.Q_mut() = Q;
    self.base.set_diagonal();
  }

  fn rescale_to_mean_exit_rate(&mut self) -> Result<(), Report> {
    let mean = self.mean_exit_rate();
    if !(mean > 0.0) {
      return make_error!("Unable to rescale range model: all dispersal and extirpation rates are zero");
    }
    *self.base.Q_mut() /= mean;
    Ok(())
  }
}

#[inline]
const fn is_occupied(range: usize, area: usize) -> bool {
  range & (1 << area) != 0
}

impl RateMatrix for DEC {
  fn base(&self) -> &RateMatrixBase {
    &self.base
  }

  fn base_mut(&mut self) -> &mut RateMatrixBase {
    &mut self.base
  }

  fn name(&self) -> &'static str {
    "DEC"
  }

  fn update(&mut self) -> Result<(), Report> {
    if !self.needs_update() {
      return Ok(());
    }
    self.fill_rate_matrix();
    if self.rescale {
      self.rescale_to_mean_exit_rate()?;
    }
    let mut pi = Array1::zeros(self.num_states());
    pi[0] = 1.0;
    self.base.set_pi(pi)?;
    let engine = SpectralTransitionEngine::from_rate_matrix(self.base.Q())?;
    debug!(
      "Updated {}: {} areas, mean exit rate {}, complex spectrum: {}",
      self.name(),
      self.num_areas,
      self.mean_exit_rate(),
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

  /// `-` for the empty range, otherwise the occupied areas as letters, e.g. `AC`
  fn state_labels(&self) -> Vec<String> {
    (0..self.num_states())
      .map(|range| {
        if range == 0 {
          return "-".to_owned();
        }
        self
          .areas(range)
          .into_iter()
          .map(|j| char::from(b'A' + j as u8))
          .collect()
      })
      .collect()
  }
}
