use crate::make_error;
use crate::rate_matrix::base::RateMatrixBase;
use crate::utils::validate::validate_time;
use eyre::Report;
use ndarray::prelude::*;

/// Number of halvings before the Taylor approximation, and of squarings after it
const SCALING_STEPS: i32 = 8;

impl RateMatrixBase {
  /// `exp(Q·t)` by scaling and squaring with a 4th order Taylor approximant.
  ///
  /// See: Moler, Van Loan (2003). Nineteen dubious ways to compute the exponential of a matrix, twenty-five years
  /// later. SIAM Review 45 (1): 3–49. doi:10.1137/S00361445024180
  pub fn exponentiate_by_scaling_and_squaring(&self, t: f64, P: &mut Array2<f64>) -> Result<(), Report> {
    validate_time(t)?;
    let n = self.num_states();
    if P.shape() != [n, n] {
      return make_error!(
        "Transition probability matrix should have shape [{n}, {n}], but found {:?}",
        P.shape()
      );
    }
    P.assign(&expm_taylor(self.Q(), t));
    Ok(())
  }
}

pub(crate) fn expm_taylor(Q: &Array2<f64>, t: f64) -> Array2<f64> {
  let n = Q.nrows();
  let A = Q * (t / 2.0_f64.powi(SCALING_STEPS));
  let A2 = A.dot(&A);
  let A3 = A.dot(&A2);
  let A4 = A.dot(&A3);

  let mut P = Array2::<f64>::eye(n) + &A + &(A2 / 2.0) + &(A3 / 6.0) + &(A4 / 24.0);
  for _ in 0..SCALING_STEPS {
    P = P.dot(&P);
  }
  P
}
