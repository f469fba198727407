pub mod eigen_system;
pub mod engine;
