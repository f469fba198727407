pub mod amino_acid;
pub mod codon;
pub mod nucleotide;
pub mod pomo;
