//! Deterministic infrastructure shared by fixtures.

pub mod rng;

pub use rng::TestRng;
