//! Post-detection validation
//!
//! - [`classifier`]: decides whether a clip is a loop or a one-shot
//! - [`tempo`]: octave-error correction of raw tempo estimates

pub mod classifier;
pub mod tempo;

pub use classifier::SampleTypeClassifier;
pub use tempo::{CorrectionLabel, TempoBand, TempoCorrection, TempoValidation, TempoValidator};
