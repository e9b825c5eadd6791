//! Loop / one-shot classification
//!
//! A clip is a one-shot when it is short and carries a single dominant
//! transient. Anything that doesn't clearly look like a one-shot is a
//! loop: skipping a correction on a real one-shot costs nothing, while a
//! wrongly skipped loop keeps its octave error.

use crate::config::ClassifierConfig;
use crate::dsp::onset::TransientProfile;
use crate::types::SampleType;

#[derive(Debug, Clone)]
pub struct SampleTypeClassifier {
    max_one_shot_seconds: f64,
}

impl SampleTypeClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            max_one_shot_seconds: config.one_shot_max_duration_seconds,
        }
    }

    pub fn max_one_shot_seconds(&self) -> f64 {
        self.max_one_shot_seconds
    }

    /// Whether a transient profile is worth computing for this duration
    pub fn needs_profile(&self, duration_seconds: f64) -> bool {
        duration_seconds.is_finite() && duration_seconds >= 0.0 && duration_seconds < self.max_one_shot_seconds
    }

    pub fn classify(&self, duration_seconds: f64, profile: Option<&TransientProfile>) -> SampleType {
        if !self.needs_profile(duration_seconds) {
            return SampleType::Loop;
        }

        match profile {
            Some(p) if p.dominant_transients > 1 => SampleType::Loop,
            _ => SampleType::OneShot,
        }
    }
}

impl Default for SampleTypeClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}
