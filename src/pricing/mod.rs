//! Numerical option valuation.
//!
//! The only pricing scheme in this crate is the general additive binomial
//! lattice with early-exercise adjustment. It is a pure computation layer:
//! no I/O, no retained state between calls.

pub mod lattice;

pub use lattice::{AmericanBinomial, LatticeError};
