//! Pure-Rust baseline analyzer
//!
//! Autocorrelation of spectral flux for tempo, Krumhansl-Kessler template
//! matching for key. Neither method yields a calibrated confidence, so both
//! are reported as [`Confidence::assumed`].

use super::{AnalysisRequest, FeatureAnalyzer, KeyEstimate, RawFeatures, TempoEstimate};
use crate::audio_file::AudioClip;
use crate::confidence::Confidence;
use crate::dsp::{key, onset, tempo, SpectralDescriptors, Spectrogram};
use crate::error::AnalysisResult;
use crate::types::{AnalyzerKind, FRAME_SIZE, HOP_SIZE};

pub const BASELINE_METHOD: &str = "baseline-autocorrelation";

#[derive(Debug, Clone, Default)]
pub struct BaselineAnalyzer;

impl BaselineAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl FeatureAnalyzer for BaselineAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Baseline
    }

    fn name(&self) -> &'static str {
        "baseline"
    }

    fn analyze(&self, clip: &AudioClip, request: &AnalysisRequest) -> AnalysisResult<RawFeatures> {
        let spec = Spectrogram::compute(&clip.samples, FRAME_SIZE, HOP_SIZE, clip.sample_rate)?;

        let flux = onset::spectral_flux(&spec);
        let tempo = tempo::estimate_tempo(
            &flux,
            spec.frame_rate(),
            request.detection_min_bpm,
            request.detection_max_bpm,
        )
        .map(|estimate| TempoEstimate {
            bpm: estimate.bpm,
            confidence: Confidence::assumed(),
        });

        let key = key::detect_key(&clip.samples, clip.sample_rate)?.map(|detection| KeyEstimate {
            key: detection.key,
            confidence: Confidence::assumed(),
            clarity: Some(detection.correlation),
        });

        let spectral = SpectralDescriptors::describe(&clip.samples, &spec);

        log::debug!(
            "analyze: baseline on {}: tempo {:?}, key {:?}",
            clip.source.display(),
            tempo.map(|t| t.bpm),
            key.map(|k| k.key.name())
        );

        Ok(RawFeatures {
            tempo,
            key,
            spectral,
            method: BASELINE_METHOD.to_string(),
        })
    }
}
