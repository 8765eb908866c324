//! Helper utilities for integration tests.

pub mod assertions;
pub mod read_generator;

pub use assertions::*;
pub use read_generator::*;
