use crate::{make_error, make_internal_error, make_internal_report};
use crate::spectral::eigen_system::EigenSystem;
use eyre::Report;
use log::trace;
use ndarray::prelude::*;
use ndarray_linalg::c64;

/// Precomputed products `C[i][j][k] = V[i][k]·V⁻¹[k][j]`, laid out so that the `k` axis is contiguous.
#[derive(Clone, Debug)]
pub enum CoefficientTensor {
  Real(Array3<f64>),
  Complex(Array3<c64>),
}

/// Transition probabilities of an arbitrary generator, by way of its eigendecomposition.
///
/// Factorization and the coefficient tensor are computed once per parameter change (O(n³) each). Evaluating
/// `P(t)[i][j] = Σ_k C[i][j][k]·exp(λ_k·t)` at a new `t` then costs one `n²×n` matrix-vector product.
#[derive(Clone, Debug)]
pub struct SpectralTransitionEngine {
  eigen_system: EigenSystem,
  cijk: CoefficientTensor,
}

impl SpectralTransitionEngine {
  pub fn new(eigen_system: EigenSystem) -> Self {
    let cijk = match &eigen_system {
      EigenSystem::Real { v, v_inv, .. } => CoefficientTensor::Real(calculate_cijk(v, v_inv)),
      EigenSystem::Complex { v, v_inv, .. } => CoefficientTensor::Complex(calculate_cijk(v, v_inv)),
    };
    Self { eigen_system, cijk }
  }

  /// Engine for a generator with no known symmetry
  pub fn from_rate_matrix(Q: &Array2<f64>) -> Result<Self, Report> {
    Ok(Self::new(EigenSystem::decompose(Q)?))
  }

  /// Engine for a generator which is reversible with respect to `pi`
  pub fn from_reversible_rate_matrix(Q: &Array2<f64>, pi: &Array1<f64>) -> Result<Self, Report> {
    Ok(Self::new(EigenSystem::decompose_reversible(Q, pi)?))
  }

  #[inline]
  pub const fn eigen_system(&self) -> &EigenSystem {
    &self.eigen_system
  }

  #[inline]
  pub const fn coefficients(&self) -> &CoefficientTensor {
    &self.cijk
  }

  #[inline]
  pub const fn is_complex(&self) -> bool {
    self.eigen_system.is_complex()
  }

  #[inline]
  pub fn num_states(&self) -> usize {
    self.eigen_system.num_states()
  }

  /// Fills `P` with `exp(Q·t)`. Negative entries, which only arise from round-off, are set to 0.
  /// For a complex spectrum, the imaginary part of the sum is discarded.
  pub fn transition_probabilities_into(&self, t: f64, P: &mut Array2<f64>) -> Result<(), Report> {
    let n = self.num_states();
    if P.shape() != [n, n] {
      return make_error!(
        "Transition probability matrix should have shape [{n}, {n}], but found {:?}",
        P.shape()
      );
    }

    match (&self.eigen_system, &self.cijk) {
      (EigenSystem::Real { eigvals, .. }, CoefficientTensor::Real(cijk)) => {
        trace!("Evaluating real spectral transition probabilities at t={t}");
        let exp_lt = eigvals.mapv(|lambda| (lambda * t).exp());
        let sums = cijk.view().into_shape((n * n, n))?.dot(&exp_lt);
        P.iter_mut().zip(sums.iter()).for_each(|(p, &s)| *p = s.max(0.0));
      }
      (EigenSystem::Complex { eigvals, .. }, CoefficientTensor::Complex(cijk)) => {
        trace!("Evaluating complex spectral transition probabilities at t={t}");
        let exp_lt = eigvals.mapv(|lambda| (lambda * t).exp());
        let sums = cijk.view().into_shape((n * n, n))?.dot(&exp_lt);
        P.iter_mut().zip(sums.iter()).for_each(|(p, s)| *p = s.re.max(0.0));
      }
      _ => return make_internal_error!("Coefficient tensor does not match the eigen system it was built from"),
    }

    Ok(())
  }

  /// Allocating variant of [`Self::transition_probabilities_into`]
  pub fn transition_probabilities(&self, t: f64) -> Result<Array2<f64>, Report> {
    let n = self.num_states();
    let mut P = Array2::zeros((n, n));
    self.transition_probabilities_into(t, &mut P)?;
    Ok(P)
  }
}

/// Engine of a model which went through at least one successful update
pub fn require_engine<'a>(
  engine: &'a Option<SpectralTransitionEngine>,
  model_name: &str,
) -> Result<&'a SpectralTransitionEngine, Report> {
  engine
    .as_ref()
    .ok_or_else(|| make_internal_report!("Rate matrix '{model_name}' has no spectral factorization"))
}

fn calculate_cijk<T: ndarray::LinalgScalar>(v: &Array2<T>, v_inv: &Array2<T>) -> Array3<T> {
  let n = v.nrows();
  Array3::from_shape_fn((n, n, n), |(i, j, k)| v[[i, k]] * v_inv[[k, j]])
}
