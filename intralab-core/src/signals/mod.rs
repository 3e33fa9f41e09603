//! Signal detection.
//!
//! Signals depend on candle data only, never on position or equity state.

pub mod crossover;

pub use crossover::{Crossover, CrossoverDetector, SignalError};
