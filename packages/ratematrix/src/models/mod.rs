pub mod codon_hky;
pub mod covarion;
pub mod dec;
pub mod doublet_epistatic_gtr;
pub mod f81;
pub mod flow_two_populations;
pub mod free_k;
pub mod get_model;
pub mod gtr;
pub mod hky;
pub mod infinite_sites;
pub mod jc;
pub mod kimura81;
pub mod pomo;
pub mod reversible_pomo;
pub mod senca;
pub mod tamura92;
pub mod tim;
pub mod tn93;
pub mod tvm;
pub mod wag;

#[cfg(test)]
mod tests;
