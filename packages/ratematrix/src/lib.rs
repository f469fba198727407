#![allow(non_snake_case)]

pub mod alphabet;
pub mod models;
pub mod rate_matrix;
pub mod spectral;
pub mod utils;
