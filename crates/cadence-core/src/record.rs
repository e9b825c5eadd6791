//! Analysis output
//!
//! A [`FeatureRecord`] is built once per call and handed to the caller;
//! nothing in the engine keeps a reference to it.

use crate::dsp::SpectralDescriptors;
use crate::types::{AnalyzerKind, SampleType};
use crate::validation::TempoCorrection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Validated, confidence-scored features of one clip
///
/// All confidences are on the 0-100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub duration_seconds: f64,
    pub tempo_bpm: Option<f64>,
    pub tempo_confidence: Option<u8>,
    /// Key name such as "Am" or "F#"
    pub musical_key: Option<String>,
    pub key_confidence: Option<u8>,
    pub genre: Option<String>,
    pub genre_confidence: Option<u8>,
    pub spectral: SpectralDescriptors,
    pub analysis_metadata: AnalysisMetadata,
}

/// How a record was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub analyzer: AnalyzerKind,
    /// Algorithm that produced tempo and key, e.g. "essentia-multifeature"
    pub method: String,
    pub sample_type: SampleType,
    /// Whether `sample_type` came from the caller rather than classification
    pub sample_type_hinted: bool,
    /// Tempo as detected, before octave correction
    pub raw_tempo_bpm: Option<f64>,
    /// Native tempo confidence fraction, before normalization
    pub raw_tempo_confidence: Option<f32>,
    /// false when the analyzer could not measure its own confidence
    pub confidence_measured: bool,
    pub correction: Option<TempoCorrection>,
    /// `None` when the band was not consulted (one-shots, no tempo)
    pub tempo_in_range: Option<bool>,
    pub prior_used: bool,
    pub fallback_reason: Option<String>,
    pub key_clarity: Option<f32>,
    pub processing_time_ms: u64,
    pub analyzed_at: DateTime<Utc>,
}

impl FeatureRecord {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Whether the tempo was octave-corrected
    pub fn is_corrected(&self) -> bool {
        self.analysis_metadata.correction.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::CorrectionLabel;

    fn record() -> FeatureRecord {
        FeatureRecord {
            duration_seconds: 4.0,
            tempo_bpm: Some(90.0),
            tempo_confidence: Some(82),
            musical_key: Some("Am".to_string()),
            key_confidence: Some(70),
            genre: None,
            genre_confidence: None,
            spectral: SpectralDescriptors::default(),
            analysis_metadata: AnalysisMetadata {
                analyzer: AnalyzerKind::Primary,
                method: "essentia-multifeature".to_string(),
                sample_type: SampleType::Loop,
                sample_type_hinted: false,
                raw_tempo_bpm: Some(180.0),
                raw_tempo_confidence: Some(0.75),
                confidence_measured: true,
                correction: Some(TempoCorrection {
                    factor: 0.5,
                    label: CorrectionLabel::new(180.0, 90.0),
                }),
                tempo_in_range: Some(true),
                prior_used: true,
                fallback_reason: None,
                key_clarity: Some(0.5),
                processing_time_ms: 120,
                analyzed_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_json_shape() {
        let json: serde_json::Value = serde_json::from_str(&record().to_json().unwrap()).unwrap();
        let metadata = &json["analysis_metadata"];
        assert!(metadata.is_object());
        assert_eq!(metadata["analyzer"], "primary");
        assert_eq!(metadata["sample_type"], "loop");
        assert_eq!(metadata["correction"]["label"], "180.0→90.0");
        assert_eq!(json["musical_key"], "Am");
    }

    #[test]
    fn test_json_roundtrip() {
        let original = record();
        let parsed: FeatureRecord = serde_json::from_str(&original.to_json().unwrap()).unwrap();
        assert_eq!(parsed, original);
        assert!(parsed.is_corrected());
    }
}
