//! Feature analyzers and the selector that chooses between them
//!
//! Two analyzers produce the same [`RawFeatures`] shape:
//!
//! - [`essentia::EssentiaAnalyzer`] (feature `essentia`): Essentia rhythm and
//!   key extraction in an isolated subprocess, with native confidences
//! - [`baseline::BaselineAnalyzer`]: pure-Rust DSP, always available, with
//!   assumed confidences
//!
//! [`selector::AnalyzerSelector`] prefers the primary and falls back to the
//! baseline whenever the primary is missing, failed to start or fails on a
//! particular request.

pub mod baseline;
#[cfg(feature = "essentia")]
pub mod essentia;
pub mod selector;

pub use baseline::BaselineAnalyzer;
#[cfg(feature = "essentia")]
pub use essentia::EssentiaAnalyzer;
pub use selector::{AnalyzerSelector, PrimaryCapability, Selection};

use crate::audio_file::AudioClip;
use crate::confidence::Confidence;
use crate::dsp::SpectralDescriptors;
use crate::error::AnalysisResult;
use crate::music::MusicalKey;
use crate::types::{AnalyzerKind, SampleType};
use std::time::Duration;

/// Per-call parameters handed to an analyzer
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub sample_type: SampleType,
    /// Tempo range raw detection searches
    pub detection_min_bpm: f64,
    pub detection_max_bpm: f64,
    /// Budget for the whole analyzer call
    pub timeout: Duration,
}

/// Raw tempo before octave validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoEstimate {
    pub bpm: f64,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyEstimate {
    pub key: MusicalKey,
    pub confidence: Confidence,
    /// Template correlation or key strength, when the analyzer reports one
    pub clarity: Option<f32>,
}

/// Everything an analyzer extracted from one clip
#[derive(Debug, Clone, PartialEq)]
pub struct RawFeatures {
    pub tempo: Option<TempoEstimate>,
    pub key: Option<KeyEstimate>,
    pub spectral: SpectralDescriptors,
    /// Algorithm description recorded in metadata (e.g. "essentia-multifeature")
    pub method: String,
}

/// A tempo/key/spectral feature extractor
///
/// Implementations must be usable from several threads at once; the engine
/// shares one instance across all callers.
pub trait FeatureAnalyzer: Send + Sync {
    fn kind(&self) -> AnalyzerKind;

    /// Short identifier used in logs and errors
    fn name(&self) -> &'static str;

    fn analyze(&self, clip: &AudioClip, request: &AnalysisRequest) -> AnalysisResult<RawFeatures>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted analyzers for selector and engine tests

    use super::*;
    use crate::error::AnalysisError;

    pub enum Behavior {
        Tempo(f64, Confidence),
        Fail(&'static str),
        Sleep(Duration),
    }

    pub struct ScriptedAnalyzer {
        pub kind: AnalyzerKind,
        pub behavior: Behavior,
    }

    impl ScriptedAnalyzer {
        pub fn primary(behavior: Behavior) -> Box<dyn FeatureAnalyzer> {
            Box::new(Self {
                kind: AnalyzerKind::Primary,
                behavior,
            })
        }

        pub fn baseline(behavior: Behavior) -> Box<dyn FeatureAnalyzer> {
            Box::new(Self {
                kind: AnalyzerKind::Baseline,
                behavior,
            })
        }
    }

    impl FeatureAnalyzer for ScriptedAnalyzer {
        fn kind(&self) -> AnalyzerKind {
            self.kind
        }

        fn name(&self) -> &'static str {
            "scripted"
        }

        fn analyze(&self, _clip: &AudioClip, _request: &AnalysisRequest) -> AnalysisResult<RawFeatures> {
            let tempo = match &self.behavior {
                Behavior::Tempo(bpm, confidence) => Some(TempoEstimate {
                    bpm: *bpm,
                    confidence: *confidence,
                }),
                Behavior::Fail(reason) => return Err(AnalysisError::Backend(reason.to_string())),
                Behavior::Sleep(duration) => {
                    std::thread::sleep(*duration);
                    None
                }
            };
            Ok(RawFeatures {
                tempo,
                key: Some(KeyEstimate {
                    key: MusicalKey::new(9, true),
                    confidence: Confidence::Measured(0.8),
                    clarity: Some(0.8),
                }),
                spectral: SpectralDescriptors {
                    centroid_hz: Some(2400.0),
                    harmonic_percussive_ratio: Some(1.5),
                    ..SpectralDescriptors::default()
                },
                method: format!("scripted-{}", self.kind),
            })
        }
    }
}
