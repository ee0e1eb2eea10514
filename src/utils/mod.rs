pub mod generator;
pub mod jwt;
