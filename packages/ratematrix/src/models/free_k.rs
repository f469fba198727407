use crate::make_error;
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
use strum_macros::{Display, EnumIter, EnumString};

/// Algorithm for `exp(Q·t)`
#[derive(Copy, Clone, Debug, PartialEq, Eq, SmartDefault, Display, EnumIter, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum TransitionMethod {
  #[default]
  Eigen,
  ScalingAndSquaring,
  Uniformization,
}

#[derive(Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct FreeKParams {
  #[default = 4]
  pub num_states: usize,

  /// Off-diagonal rates in row-major order, skipping the diagonal: `n(n-1)` values. All ones when not given.
  pub transition_rates: Option<Array1<f64>>,

  /// Whether to scale the generator to an average rate of 1
  #[default = true]
  pub rescale: bool,

  pub method: TransitionMethod,
}

/// Unconstrained generator over `n` states: every off-diagonal rate is a free parameter.
///
/// The chain is not reversible in general and its eigenvalues may be complex. Stationary frequencies are solved
/// for. Rows of computed transition probabilities are renormalized to sum to 1.
#[derive(Clone, Debug)]
pub struct FreeK {
  base: RateMatrixBase,
  transition_rates: Array1<f64>,
  rescale: bool,
  method: TransitionMethod,
  engine: Option<SpectralTransitionEngine>,
  jump_chain: Option<UniformizedJumpChain>,
}

impl FreeK {
  pub fn new(params: FreeKParams) -> Result<Self, Report> {
    let FreeKParams {
      num_states,
      transition_rates,
      rescale,
      method,
    } = params;
    if num_states < 2 {
      return make_error!("Free rate matrix should have at least 2 states, but found {num_states}");
    }
    let mut model = Self {
      base: RateMatrixBase::new(num_states)?,
      transition_rates: Array1::ones(num_states * (num_states - 1)),
      rescale,
      method,
      engine: None,
      jump_chain: None,
    };
    if let Some(rates) = transition_rates {
      model.set_transition_rates(rates)?;
    }
    model.into_updated()
  }

  pub const fn transition_rates(&self) -> &Array1<f64> {
    &self.transition_rates
  }

  pub const fn method(&self) -> TransitionMethod {
    self.method
  }

  pub fn set_transition_rates(&mut self, rates: Array1<f64>) -> Result<(), Report> {
    let n = self.base.num_states();
    validate_rates("transition_rates", &rates, n * (n - 1))?;
    self.transition_rates = rates;
    self.base.mark_stale();
    Ok(())
  }

  pub fn set_method(&mut self, method: TransitionMethod) {
    if method != self.method {
      self.method = method;
      self.base.mark_stale();
    }
  }

  fn fill_rate_matrix(&mut self) {
    let n = self.base.num_states();
    let off_diagonal = (0..n).flat_map(|i| (0..n).filter(move |&j| j != i).map(move |j| (i, j)));
    let Q = self.base.Q_mut();
    Q.fill(0.0);
    for ((i, j), &rate) in off_diagonal.zip(self.transition_rates.iter()) {
      Q[[i, j]] = rate;
    }
    self.base.set_diagonal();
  }
}

impl RateMatrix for FreeK {
  fn base(&self) -> &RateMatrixBase {
    &self.base
  }

  fn base_mut(&mut self) -> &mut RateMatrixBase {
    &mut self.base
  }

  fn name(&self) -> &'static str {
    "FreeK"
  }

  fn update(&mut self) -> Result<(), Report> {
    if !self.needs_update() {
      return Ok(());
    }
    self.fill_rate_matrix();
    let pi = self
      .base
      .calculate_stationary_frequencies()
      .wrap_err("When updating free rate matrix")?;
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
      "Updated {}: {} states, method {}, average rate {}, complex spectrum: {}",
      self.name(),
      self.num_states(),
      self.method,
      self.average_rate(),
      self.engine.as_ref().map_or(false, SpectralTransitionEngine::is_complex)
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
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pretty_assert_ulps_eq;
  use approx::assert_abs_diff_eq;
  use rstest::rstest;
  use std::str::FromStr;
  use strum::IntoEnumIterator;

  fn cyclic_rates() -> Array1<f64> {
    // 0 -> 1 -> 2 -> 0 dominates, which gives a complex spectrum
    array![5.0, 0.1, 0.1, 5.0, 5.0, 0.1]
  }

  #[rstest]
  fn fills_rates_row_major() -> Result<(), Report> {
    let model = FreeK::new(FreeKParams {
      num_states: 3,
      transition_rates: Some(array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
      rescale: false,
      ..FreeKParams::default()
    })?;
    pretty_assert_ulps_eq!(
      model.rate_matrix().clone(),
      array![[-3.0, 1.0, 2.0], [3.0, -7.0, 4.0], [5.0, 6.0, -11.0]]
    );
    let pi = model.stationary_frequencies();
    assert_abs_diff_eq!(pi.dot(model.rate_matrix()), Array1::<f64>::zeros(3), epsilon = 1e-12);
    Ok(())
  }

  #[rstest]
  fn has_complex_spectrum_for_cyclic_flow() -> Result<(), Report> {
    let model = FreeK::new(FreeKParams {
      num_states: 3,
      transition_rates: Some(cyclic_rates()),
      ..FreeKParams::default()
    })?;
    assert!(model.engine.as_ref().map_or(false, SpectralTransitionEngine::is_complex));
    assert!(!model.check_time_reversibility(1e-6));
    pretty_assert_ulps_eq!(model.average_rate(), 1.0, epsilon = 1e-12);
    Ok(())
  }

  #[rstest]
  #[case(0.01)]
  #[case(0.5)]
  #[case(3.0)]
  fn methods_agree(#[case] t: f64) -> Result<(), Report> {
    let results = TransitionMethod::iter()
      .map(|method| {
        FreeK::new(FreeKParams {
          num_states: 3,
          transition_rates: Some(cyclic_rates()),
          method,
          ..FreeKParams::default()
        })?
        .transition_probabilities(t)
      })
      .collect::<Result<Vec<_>, Report>>()?;
    assert_abs_diff_eq!(results[0], results[1], epsilon = 1e-8);
    assert_abs_diff_eq!(results[0], results[2], epsilon = 1e-6);
    Ok(())
  }

  #[rstest]
  fn parses_method_names() -> Result<(), Report> {
    assert_eq!(
      TransitionMethod::from_str("scaling_and_squaring")?,
      TransitionMethod::ScalingAndSquaring
    );
    assert_eq!(TransitionMethod::Uniformization.to_string(), "uniformization");
    Ok(())
  }

  #[rstest]
  fn changing_method_requires_update() -> Result<(), Report> {
    let mut model = FreeK::new(FreeKParams::default())?;
    model.set_method(TransitionMethod::Uniformization);
    assert!(model.transition_probabilities(0.1).is_err());
    model.update()?;
    let P = model.transition_probabilities(0.1)?;
    for row in P.rows() {
      pretty_assert_ulps_eq!(row.sum(), 1.0, epsilon = 1e-14);
    }
    Ok(())
  }

  #[rstest]
  fn rejects_wrong_number_of_rates() {
    assert!(FreeK::new(FreeKParams {
      num_states: 3,
      transition_rates: Some(array![1.0, 2.0, 3.0]),
      ..FreeKParams::default()
    })
    .is_err());
  }
}
