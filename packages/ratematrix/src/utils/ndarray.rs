use ndarray::{Array, Array2, Dimension};
#[cfg(test)]
use ndarray::{ArrayBase, Data, ShapeBuilder};
#[cfg(test)]
use ndarray_rand::RandomExt;
#[cfg(test)]
use rand::{distributions::Uniform, Rng};

/// Clamp each element to at least `lower`
pub fn clamp_min<T: Copy + PartialOrd, D: Dimension>(a: &Array<T, D>, lower: T) -> Array<T, D> {
  a.mapv(|x| num_traits::clamp_min(x, lower))
}

/// Clamp each element to at least `lower`, in place
pub fn clamp_min_inplace<T: Copy + PartialOrd, D: Dimension>(a: &mut Array<T, D>, lower: T) {
  a.mapv_inplace(|x| num_traits::clamp_min(x, lower));
}

/// Divides each row by its sum. Rows summing to zero are left untouched.
pub fn normalize_rows_inplace(a: &mut Array2<f64>) {
  for mut row in a.rows_mut() {
    let sum = row.sum();
    if sum > 0.0 {
      row /= sum;
    }
  }
}

/// Largest absolute elementwise difference between two arrays of the same shape
#[cfg(test)]
pub fn max_abs_diff<S1, S2, D>(a: &ArrayBase<S1, D>, b: &ArrayBase<S2, D>) -> f64
where
  S1: Data<Elem = f64>,
  S2: Data<Elem = f64>,
  D: Dimension,
{
  a.iter().zip(b.iter()).fold(0.0, |acc, (x, y)| acc.max((x - y).abs()))
}

/// Array filled with uniform random numbers from `[0, 1)`
#[cfg(test)]
pub fn random<D: Dimension, Sh: ShapeBuilder<Dim = D>, R: Rng>(shape: Sh, rng: &mut R) -> Array<f64, D> {
  Array::<f64, D>::random_using(shape, Uniform::new(0.0, 1.0), rng)
}
