use crate::alphabet::nucleotide::{A, C, G, NUCLEOTIDES, NUM_NUCLEOTIDES, T};
use crate::make_error;
use eyre::Report;

/// Unordered nucleotide pairs which may be polymorphic, in the order of their blocks in the state space
pub const NUCLEOTIDE_PAIRS: [(usize, usize); 6] = [(A, C), (A, G), (A, T), (C, G), (C, T), (G, T)];

/// State of a population of `N` allele copies at a bi-allelic site
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PoMoState {
  /// Every copy carries the same nucleotide
  Fixed(usize),

  /// `count` copies of `first` and `N - count` copies of `second`, with `0 < count < N`
  Polymorphic { first: usize, second: usize, count: usize },
}

/// Layout of the polymorphism-aware state space for a virtual population of `N` copies.
///
/// The 4 fixed states come first, in nucleotide order. Then one block of `N - 1` polymorphic states per pair of
/// [`NUCLEOTIDE_PAIRS`], ordered by increasing count of the first nucleotide.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PoMoStateSpace {
  population_size: usize,
}

impl PoMoStateSpace {
  pub fn new(population_size: usize) -> Result<Self, Report> {
    if population_size < 2 {
      return make_error!("Virtual population size should be at least 2, but found N={population_size}");
    }
    Ok(Self { population_size })
  }

  #[inline]
  pub const fn population_size(&self) -> usize {
    self.population_size
  }

  #[inline]
  pub const fn num_states(&self) -> usize {
    NUM_NUCLEOTIDES + NUCLEOTIDE_PAIRS.len() * (self.population_size - 1)
  }

  pub fn state(&self, index: usize) -> Result<PoMoState, Report> {
    if index >= self.num_states() {
      return make_error!(
        "State index {index} is out of bounds for a population of N={} ({} states)",
        self.population_size,
        self.num_states()
      );
    }
    if index < NUM_NUCLEOTIDES {
      return Ok(PoMoState::Fixed(index));
    }
    let block_len = self.population_size - 1;
    let (pair, offset) = ((index - NUM_NUCLEOTIDES) / block_len, (index - NUM_NUCLEOTIDES) % block_len);
    let (first, second) = NUCLEOTIDE_PAIRS[pair];
    Ok(PoMoState::Polymorphic {
      first,
      second,
      count: offset + 1,
    })
  }

  /// Inverse of [`Self::state`]. A count of 0 or `N` designates the corresponding fixed state.
  pub fn index(&self, first: usize, second: usize, count: usize) -> Result<usize, Report> {
    let n = self.population_size;
    if count == n {
      return Ok(first);
    }
    if count == 0 {
      return Ok(second);
    }
    if count > n {
      return make_error!("Allele count should be at most N={n}, but found {count}");
    }
    match NUCLEOTIDE_PAIRS.iter().position(|&pair| pair == (first, second)) {
      Some(pair) => Ok(NUM_NUCLEOTIDES + pair * (n - 1) + count - 1),
      None => make_error!("Nucleotides ({first}, {second}) do not form an ordered polymorphic pair"),
    }
  }

  /// `A`, `C`, ... for fixed states and e.g. `7A3C` for polymorphic ones
  pub fn labels(&self) -> Vec<String> {
    let n = self.population_size;
    (0..self.num_states())
      .map(|index| match self.state(index) {
        Ok(PoMoState::Fixed(nuc)) => NUCLEOTIDES[nuc].to_string(),
        Ok(PoMoState::Polymorphic { first, second, count }) => {
          format!("{count}{}{}{}", NUCLEOTIDES[first], n - count, NUCLEOTIDES[second])
        }
        Err(_) => index.to_string(),
      })
      .collect()
  }
}
