//! Helpers shared by the experiment binaries.
//!
//! - **`perf`**: wall-clock timing and peak resident memory of a closure, used
//!   to compare the arbitrary-precision and fixed-width model builders.

pub mod perf;
