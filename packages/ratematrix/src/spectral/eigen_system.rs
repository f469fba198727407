use crate::{make_error, make_internal_error};
use eyre::{Report, WrapErr};
use log::{debug, warn};
use ndarray::prelude::*;
use ndarray_linalg::UPLO::Lower;
use ndarray_linalg::{c64, Eig, Eigh, Inverse};

/// Eigendecomposition `Q = V·diag(λ)·V⁻¹` of a rate matrix.
///
/// The factorization is real when every eigenvalue is real, which is always the case for time-reversible
/// generators. Otherwise eigenvalues and eigenvectors come in complex conjugate pairs and are kept complex.
#[derive(Clone, Debug)]
pub enum EigenSystem {
  Real {
    eigvals: Array1<f64>,
    v: Array2<f64>,
    v_inv: Array2<f64>,
  },
  Complex {
    eigvals: Array1<c64>,
    v: Array2<c64>,
    v_inv: Array2<c64>,
  },
}

impl EigenSystem {
  /// Factors an arbitrary real square matrix with the general (non-symmetric) eigensolver.
  pub fn decompose(Q: &Array2<f64>) -> Result<Self, Report> {
    check_square(Q)?;

    let (eigvals, v): (Array1<c64>, Array2<c64>) =
      Q.eig().wrap_err("When computing eigendecomposition of rate matrix")?;

    if has_real_spectrum(&eigvals, spectral_scale(Q)) {
      let v_re = v.mapv(|z| z.re);
      match v_re.inv() {
        Ok(v_inv) => {
          let result = Self::Real {
            eigvals: eigvals.mapv(|lambda| lambda.re),
            v: v_re,
            v_inv,
          };
          if result.check_finite().is_ok() {
            return Ok(result);
          }
          debug!("Real eigendecomposition is not finite: keeping the complex one");
        }
        Err(err) => debug!("Real parts of eigenvectors are not invertible ({err}): keeping the complex ones"),
      }
    }

    let v_inv = v.inv().wrap_err("When inverting complex eigenvector matrix")?;
    let result = Self::Complex { eigvals, v, v_inv };
    result.check_finite()?;
    Ok(result)
  }

  /// Factors a generator which satisfies detailed balance with respect to `pi`.
  ///
  /// The similarity transform `S = D^{1/2}·Q·D^{-1/2}` with `D = diag(pi)` is symmetric for a reversible `Q`, so
  /// the symmetric eigensolver applies and yields an orthonormal `U`. Then `V = D^{-1/2}·U` and `V⁻¹ = Uᵀ·D^{1/2}`
  /// with no matrix inversion. Frequencies with zero entries make the transform singular, in which case the general
  /// solver is used.
  pub fn decompose_reversible(Q: &Array2<f64>, pi: &Array1<f64>) -> Result<Self, Report> {
    check_square(Q)?;
    let n = Q.nrows();
    if pi.len() != n {
      return make_error!(
        "Length of stationary frequencies ({}) does not match the number of states ({n})",
        pi.len()
      );
    }

    if pi.iter().any(|&p| !(p > 0.0)) {
      warn!("Stationary frequencies contain zeros: falling back to general eigendecomposition");
      let result = Self::decompose(Q)?;
      if result.is_complex() {
        warn!("Reversible rate matrix has a complex spectrum. Is it really reversible?");
      }
      return Ok(result);
    }

    let sqrt_pi = pi.mapv(f64::sqrt);
    let inv_sqrt_pi = sqrt_pi.mapv(f64::recip);

    let S = {
      let S = Array2::from_shape_fn((n, n), |(i, j)| sqrt_pi[i] * Q[[i, j]] * inv_sqrt_pi[j]);
      0.5 * (&S + &S.t())
    };

    let (eigvals, U) = S.eigh(Lower).wrap_err("When computing symmetric eigendecomposition of rate matrix")?;

    let v = &U * &inv_sqrt_pi.view().insert_axis(Axis(1));
    let v_inv = &U.t() * &sqrt_pi.view().insert_axis(Axis(0));

    let result = Self::Real { eigvals, v, v_inv };
    result.check_finite()?;
    Ok(result)
  }

  pub const fn is_complex(&self) -> bool {
    matches!(self, Self::Complex { .. })
  }

  pub fn num_states(&self) -> usize {
    match self {
      Self::Real { eigvals, .. } => eigvals.len(),
      Self::Complex { eigvals, .. } => eigvals.len(),
    }
  }

  pub fn real_eigenvalues(&self) -> Array1<f64> {
    match self {
      Self::Real { eigvals, .. } => eigvals.clone(),
      Self::Complex { eigvals, .. } => eigvals.mapv(|lambda| lambda.re),
    }
  }

  /// Imaginary parts of eigenvalues. All zeros for a real factorization.
  pub fn imaginary_eigenvalues(&self) -> Array1<f64> {
    match self {
      Self::Real { eigvals, .. } => Array1::zeros(eigvals.len()),
      Self::Complex { eigvals, .. } => eigvals.mapv(|lambda| lambda.im),
    }
  }

  /// Reassembles `V·diag(λ)·V⁻¹` (real part)
  pub fn reconstruct(&self) -> Array2<f64> {
    match self {
      Self::Real { eigvals, v, v_inv } => (v * eigvals).dot(v_inv),
      Self::Complex { eigvals, v, v_inv } => (v * eigvals).dot(v_inv).mapv(|z| z.re),
    }
  }

  fn check_finite(&self) -> Result<(), Report> {
    let finite = match self {
      Self::Real { eigvals, v, v_inv } => {
        eigvals.iter().chain(v.iter()).chain(v_inv.iter()).all(|x| x.is_finite())
      }
      Self::Complex { eigvals, v, v_inv } => eigvals
        .iter()
        .chain(v.iter())
        .chain(v_inv.iter())
        .all(|z| z.re.is_finite() && z.im.is_finite()),
    };
    if !finite {
      return make_internal_error!("Eigendecomposition of rate matrix produced non-finite values");
    }
    Ok(())
  }
}

fn check_square(Q: &Array2<f64>) -> Result<(), Report> {
  if Q.nrows() != Q.ncols() || Q.is_empty() {
    return make_error!(
      "Eigendecomposition requires a non-empty square matrix, but found shape {:?}",
      Q.shape()
    );
  }
  if let Some(x) = Q.iter().find(|x| !x.is_finite()) {
    return make_error!("Rate matrix contains non-finite entry {x}");
  }
  Ok(())
}

/// Relative size of imaginary parts of eigenvalues below which they are treated as round-off
const IMAGINARY_TOLERANCE: f64 = 1e-12;

/// Magnitude of the spectrum of a generator: its largest exit rate `max_i(-Q[i][i])`, and at least 1
fn spectral_scale(Q: &Array2<f64>) -> f64 {
  Q.diag().iter().fold(1.0, |acc: f64, &q| acc.max(-q))
}

/// Whether every eigenvalue is real up to round-off relative to `scale`
fn has_real_spectrum(eigvals: &Array1<c64>, scale: f64) -> bool {
  eigvals.iter().all(|lambda| lambda.im.abs() <= IMAGINARY_TOLERANCE * scale)
}
