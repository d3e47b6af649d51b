//! Configuration constants for page geometry, the on-disk header, and
//! engine limits. See [`constants`] for the dependency notes.

mod constants;

pub use constants::*;
