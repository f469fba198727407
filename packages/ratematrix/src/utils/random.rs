use rand::SeedableRng;
use rand::Rng;
use rand_isaac::Isaac64Rng;

/// Random number generator for stochastic mapping. A fixed seed makes a run reproducible.
pub fn get_random_number_generator(seed: Option<u64>) -> (impl Rng + Send + Sync + Clone) {
  match seed {
    None => Isaac64Rng::from_entropy(),
    Some(seed) => Isaac64Rng::seed_from_u64(seed),
  }
}

/// Samples an index with probability proportional to `weights[i]`, given their precomputed `total`.
///
/// Returns `None` when the total weight is not positive.
pub fn sample_weighted_index(
  weights: impl IntoIterator<Item = f64>,
  total: f64,
  rng: &mut (impl Rng + ?Sized),
) -> Option<usize> {
  if !(total > 0.0) {
    return None;
  }
  let mut u = rng.gen::<f64>() * total;
  let mut last_positive = None;
  for (i, w) in weights.into_iter().enumerate() {
    if w > 0.0 {
      last_positive = Some(i);
    }
    u -= w;
    if u <= 0.0 && w > 0.0 {
      return Some(i);
    }
  }
  // Round-off can leave a tiny positive remainder after the last weight
  last_positive
}
