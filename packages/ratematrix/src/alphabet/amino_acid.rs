/// Amino acid states, in the order of the empirical amino acid matrices (Ala, Arg, Asn, ...)
pub const AMINO_ACIDS: [char; 20] = [
  'A', 'R', 'N', 'D', 'C', 'Q', 'E', 'G', 'H', 'I', 'L', 'K', 'M', 'F', 'P', 'S', 'T', 'W', 'Y', 'V',
];

pub const NUM_AMINO_ACIDS: usize = AMINO_ACIDS.len();
