//! Cadence Core - tempo, key and spectral analysis of audio samples
//!
//! Entry point is [`AnalysisEngine`]: hand it a file path (and optionally a
//! loop / one-shot hint) and get back a [`FeatureRecord`] with octave-corrected
//! tempo and 0-100 confidences.

pub mod accuracy;
pub mod analysis;
pub mod audio_file;
pub mod confidence;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod genre;
pub mod music;
pub mod record;
pub mod stats;
pub mod types;
pub mod validation;

pub use config::EngineConfig;
pub use engine::AnalysisEngine;
pub use error::{AnalysisError, AudioError};
pub use record::{AnalysisMetadata, FeatureRecord};
pub use stats::StatisticsSnapshot;
pub use types::*;
