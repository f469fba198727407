/// Nucleotide states, in the order used for every nucleotide, doublet and codon model
pub const NUCLEOTIDES: [char; 4] = ['A', 'C', 'G', 'T'];

pub const NUM_NUCLEOTIDES: usize = NUCLEOTIDES.len();

pub const A: usize = 0;
pub const C: usize = 1;
pub const G: usize = 2;
pub const T: usize = 3;

pub fn nucleotide_labels() -> Vec<String> {
  NUCLEOTIDES.iter().map(char::to_string).collect()
}

#[inline]
pub const fn is_purine(nuc: usize) -> bool {
  nuc == A || nuc == G
}

/// A<->G and C<->T
#[inline]
pub const fn is_transition(from: usize, to: usize) -> bool {
  from != to && is_purine(from) == is_purine(to)
}
