//! Construction algorithms for coalescent models.
//!
//! [`spectral`] builds the eigen-decomposition coefficients in exact rational
//! arithmetic and converts them to floating point once.

pub mod spectral;

pub use spectral::{
    DEFAULT_TOLERANCE, ExactEvaluation, ExactScalar, ExactSpectrum, MAX_CHECKED_LINEAGES,
    build_model, build_model_checked, build_model_with_tolerance,
};
