//! Codon state space of the standard genetic code.
//!
//! Codons are enumerated AAA, AAC, ..., TTT over the nucleotide order A, C, G, T, with the stop codons removed,
//! which leaves 61 sense codons.

use crate::alphabet::nucleotide::{is_transition, NUCLEOTIDES, NUM_NUCLEOTIDES};
use crate::make_error;
use eyre::Report;
use lazy_static::lazy_static;
use std::fmt::{Display, Formatter};
use strum_macros::Display as StrumDisplay;

/// Amino acid encoded by each of the 64 codons, `*` for stop
pub const STANDARD_GENETIC_CODE: &[u8; 64] = b"KNKNTTTTRSRSIIMIQHQHPPPPRRRRLLLLEDEDAAAAGGGGVVVV*Y*YSSSS*CWCLFLF";

pub const NUM_CODONS: usize = 64;

pub const NUM_SENSE_CODONS: usize = 61;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Codon {
  nucs: [usize; 3],
}

impl Codon {
  /// Codon from its index among all 64 codons
  pub fn from_raw_index(index: usize) -> Result<Self, Report> {
    if index >= NUM_CODONS {
      return make_error!("Codon index should be less than {NUM_CODONS}, but found {index}");
    }
    Ok(Self {
      nucs: [
        index / (NUM_NUCLEOTIDES * NUM_NUCLEOTIDES),
        (index / NUM_NUCLEOTIDES) % NUM_NUCLEOTIDES,
        index % NUM_NUCLEOTIDES,
      ],
    })
  }

  pub const fn raw_index(&self) -> usize {
    (self.nucs[0] * NUM_NUCLEOTIDES + self.nucs[1]) * NUM_NUCLEOTIDES + self.nucs[2]
  }

  #[inline]
  pub const fn nucleotides(&self) -> &[usize; 3] {
    &self.nucs
  }

  pub fn amino_acid(&self) -> char {
    char::from(STANDARD_GENETIC_CODE[self.raw_index()])
  }

  pub fn is_stop(&self) -> bool {
    self.amino_acid() == '*'
  }
}

impl Display for Codon {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    for &n in &self.nucs {
      write!(f, "{}", NUCLEOTIDES[n])?;
    }
    Ok(())
  }
}

lazy_static! {
  /// The 61 sense codons, in state order
  pub static ref SENSE_CODONS: Vec<Codon> = (0..NUM_CODONS)
    .filter_map(|i| Codon::from_raw_index(i).ok())
    .filter(|codon| !codon.is_stop())
    .collect();
}

/// Kind of a single codon-to-codon substitution
#[derive(Copy, Clone, Debug, PartialEq, Eq, StrumDisplay)]
pub enum CodonSubstitution {
  /// More than one position changes, or no position changes
  MultipleOrNone,
  SynonymousTransition,
  SynonymousTransversion,
  NonSynonymousTransition,
  NonSynonymousTransversion,
}

pub fn classify_codon_substitution(from: &Codon, to: &Codon) -> CodonSubstitution {
  let mut changed = from
    .nucleotides()
    .iter()
    .zip(to.nucleotides())
    .filter(|(a, b)| a != b);

  let (&a, &b) = match (changed.next(), changed.next()) {
    (Some(change), None) => change,
    _ => return CodonSubstitution::MultipleOrNone,
  };

  let synonymous = from.amino_acid() == to.amino_acid();
  match (synonymous, is_transition(a, b)) {
    (true, true) => CodonSubstitution::SynonymousTransition,
    (true, false) => CodonSubstitution::SynonymousTransversion,
    (false, true) => CodonSubstitution::NonSynonymousTransition,
    (false, false) => CodonSubstitution::NonSynonymousTransversion,
  }
}
