//! Analysis engine
//!
//! Orchestrates one analysis call:
//!
//! 1. Decode the file into a mono 44.1 kHz clip
//! 2. Classify loop / one-shot (a caller hint wins)
//! 3. Run the selected analyzer, falling back to the baseline
//! 4. Octave-correct the raw tempo
//! 5. Normalize every confidence to 0-100
//! 6. Record correction statistics and build the [`FeatureRecord`]
//!
//! The engine holds no per-call state; one instance can be shared across
//! threads and `analyze` called concurrently.

use crate::analysis::{AnalysisRequest, AnalyzerSelector, PrimaryCapability, Selection};
use crate::audio_file::{load_clip, AudioClip};
use crate::config::EngineConfig;
use crate::confidence::{normalize, OUT_OF_RANGE_CONFIDENCE_CAP};
use crate::dsp::onset;
use crate::error::{AnalysisError, AudioError};
use crate::genre::classify_genre;
use crate::record::{AnalysisMetadata, FeatureRecord};
use crate::stats::{StatisticsSnapshot, StatisticsTracker};
use crate::types::{AnalyzerKind, SampleType};
use crate::validation::{SampleTypeClassifier, TempoBand, TempoValidator};
use chrono::Utc;
use std::path::Path;
use std::time::Instant;

pub struct AnalysisEngine {
    config: EngineConfig,
    selector: AnalyzerSelector,
    classifier: SampleTypeClassifier,
    validator: TempoValidator,
    stats: StatisticsTracker,
}

impl AnalysisEngine {
    /// Create an engine, probing for the primary analyzer
    pub fn new(config: EngineConfig) -> Self {
        let capability = PrimaryCapability::detect(&config);
        Self::with_capability(config, capability)
    }

    /// Create an engine with an explicit primary capability and the default
    /// baseline analyzer
    ///
    /// `use_primary_analyzer: false` overrides any capability.
    pub fn with_capability(config: EngineConfig, capability: PrimaryCapability) -> Self {
        let capability = if config.use_primary_analyzer {
            capability
        } else {
            PrimaryCapability::Disabled
        };
        let selector = AnalyzerSelector::with_baseline(capability, config.analysis_timeout());
        Self::with_selector(config, selector)
    }

    pub fn with_selector(mut config: EngineConfig, mut selector: AnalyzerSelector) -> Self {
        config.validate();
        if !config.use_primary_analyzer {
            selector.disable_primary();
        }
        let classifier = SampleTypeClassifier::new(&config.classifier);
        let validator = TempoValidator::new(TempoBand::new(config.tempo.band_min_bpm, config.tempo.band_max_bpm));
        Self {
            config,
            selector,
            classifier,
            validator,
            stats: StatisticsTracker::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Analyzer that requests will try first
    pub fn active_analyzer(&self) -> AnalyzerKind {
        self.selector.select()
    }

    /// Analyze an audio file
    ///
    /// `hint` overrides loop / one-shot classification.
    pub fn analyze(&self, path: &Path, hint: Option<SampleType>) -> Result<FeatureRecord, AudioError> {
        let clip = load_clip(path).map_err(|e| {
            log::error!("analyze: failed to load {}: {}", path.display(), e);
            AudioError::from_analysis(path, e)
        })?;
        self.analyze_clip(&clip, hint)
    }

    /// Analyze an already decoded clip
    pub fn analyze_clip(&self, clip: &AudioClip, hint: Option<SampleType>) -> Result<FeatureRecord, AudioError> {
        let start = Instant::now();

        if clip.is_empty() {
            return Err(AudioError::new(
                &clip.source,
                "clip contains no samples",
                Some(AnalysisError::InvalidInput("empty clip".to_string())),
            ));
        }

        let duration_seconds = clip.duration_seconds();
        let (sample_type, sample_type_hinted) = match hint {
            Some(sample_type) => (sample_type, true),
            None => (self.classify(clip), false),
        };

        let request = AnalysisRequest {
            sample_type,
            detection_min_bpm: self.config.tempo.detection_min_bpm as f64,
            detection_max_bpm: self.config.tempo.detection_max_bpm as f64,
            timeout: self.config.analysis_timeout(),
        };

        let Selection {
            features,
            kind,
            analyzer,
            fallback_reason,
        } = self.selector.run(clip, &request).map_err(|e| {
            log::error!("analyze_clip: every analyzer failed on {}: {}", clip.source.display(), e);
            AudioError::new(&clip.source, format!("all analyzers failed: {}", e), Some(e))
        })?;

        let validation = features
            .tempo
            .map(|estimate| (estimate, self.validator.validate(estimate.bpm, sample_type)));

        let tempo_confidence = validation.as_ref().map(|(estimate, v)| {
            let confidence = normalize(estimate.confidence);
            if v.in_range == Some(false) {
                confidence.min(OUT_OF_RANGE_CONFIDENCE_CAP)
            } else {
                confidence
            }
        });

        let genre = if self.config.enable_genre_classification && kind == AnalyzerKind::Primary {
            classify_genre(validation.as_ref().map(|(_, v)| v.bpm), &features.spectral)
        } else {
            None
        };

        let confidence_measured = features
            .tempo
            .map(|t| t.confidence.is_measured())
            .or_else(|| features.key.map(|k| k.confidence.is_measured()))
            .unwrap_or(false);

        let correction = validation.as_ref().and_then(|(_, v)| v.correction.clone());
        let prior_used = validation.as_ref().is_some_and(|(_, v)| v.prior_used);
        self.stats.record(correction.as_ref().map(|c| &c.label), prior_used);

        let record = FeatureRecord {
            duration_seconds,
            tempo_bpm: validation.as_ref().map(|(_, v)| v.bpm),
            tempo_confidence,
            musical_key: features.key.map(|k| k.key.name()),
            key_confidence: features.key.map(|k| normalize(k.confidence)),
            genre: genre.as_ref().map(|g| g.genre.clone()),
            genre_confidence: genre.as_ref().map(|g| normalize(g.confidence)),
            spectral: features.spectral,
            analysis_metadata: AnalysisMetadata {
                analyzer: kind,
                method: features.method,
                sample_type,
                sample_type_hinted,
                raw_tempo_bpm: validation.as_ref().map(|(_, v)| v.raw_bpm),
                raw_tempo_confidence: features.tempo.map(|t| t.confidence.raw()),
                confidence_measured,
                correction,
                tempo_in_range: validation.as_ref().and_then(|(_, v)| v.in_range),
                prior_used,
                fallback_reason,
                key_clarity: features.key.and_then(|k| k.clarity),
                processing_time_ms: start.elapsed().as_millis() as u64,
                analyzed_at: Utc::now(),
            },
        };

        log::info!(
            "analyze_clip: {} -> {} via {} ({:?} BPM, key {:?})",
            clip.source.display(),
            sample_type,
            analyzer,
            record.tempo_bpm,
            record.musical_key
        );

        Ok(record)
    }

    pub fn statistics_snapshot(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    fn classify(&self, clip: &AudioClip) -> SampleType {
        let duration = clip.duration_seconds();
        let profile = if self.classifier.needs_profile(duration) {
            match onset::transient_profile(&clip.samples, clip.sample_rate) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    log::warn!("classify: transient detection failed on {}: {}", clip.source.display(), e);
                    None
                }
            }
        } else {
            None
        };
        self.classifier.classify(duration, profile.as_ref())
    }
}
