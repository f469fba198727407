pub mod base;
pub mod exponentiate;
pub mod rate_matrix;
pub mod stochastic_mapping;
pub mod time_reversible;
