//! Analyzer selection and fallback
//!
//! Whether the primary analyzer can run is decided once, up front, and
//! injected as a [`PrimaryCapability`]. At call time the selector tries the
//! primary (if ready) and re-runs the same request through the baseline on
//! any failure or timeout.

use super::{AnalysisRequest, BaselineAnalyzer, FeatureAnalyzer, RawFeatures};
use crate::audio_file::AudioClip;
use crate::config::EngineConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::types::AnalyzerKind;
use std::time::{Duration, Instant};

/// Availability of the primary analyzer
pub enum PrimaryCapability {
    /// Turned off by configuration
    Disabled,
    /// Not compiled in or its runtime is missing
    Unavailable(String),
    /// Present, but construction failed
    InitFailed(String),
    Ready(Box<dyn FeatureAnalyzer>),
}

impl PrimaryCapability {
    /// Probe for the primary analyzer according to `config`
    pub fn detect(config: &EngineConfig) -> Self {
        if !config.use_primary_analyzer {
            return PrimaryCapability::Disabled;
        }
        Self::probe(config)
    }

    #[cfg(feature = "essentia")]
    fn probe(config: &EngineConfig) -> Self {
        match super::EssentiaAnalyzer::new(config) {
            Ok(analyzer) => PrimaryCapability::Ready(Box::new(analyzer)),
            Err(e) => PrimaryCapability::InitFailed(e.to_string()),
        }
    }

    #[cfg(not(feature = "essentia"))]
    fn probe(_config: &EngineConfig) -> Self {
        PrimaryCapability::Unavailable("built without the `essentia` feature".to_string())
    }

    /// Why the primary won't be used, if it won't
    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            PrimaryCapability::Disabled => Some("disabled by configuration"),
            PrimaryCapability::Unavailable(reason) | PrimaryCapability::InitFailed(reason) => Some(reason.as_str()),
            PrimaryCapability::Ready(_) => None,
        }
    }
}

impl std::fmt::Debug for PrimaryCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimaryCapability::Disabled => f.write_str("Disabled"),
            PrimaryCapability::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
            PrimaryCapability::InitFailed(reason) => f.debug_tuple("InitFailed").field(reason).finish(),
            PrimaryCapability::Ready(analyzer) => f.debug_tuple("Ready").field(&analyzer.name()).finish(),
        }
    }
}

/// Result of routing one request
#[derive(Debug, Clone)]
pub struct Selection {
    pub features: RawFeatures,
    pub kind: AnalyzerKind,
    /// Name of the analyzer that produced `features`
    pub analyzer: &'static str,
    /// Why the primary analyzer did not service this request
    pub fallback_reason: Option<String>,
}

pub struct AnalyzerSelector {
    primary: Option<Box<dyn FeatureAnalyzer>>,
    baseline: Box<dyn FeatureAnalyzer>,
    /// Recorded on every baseline result while the primary is unavailable
    standing_reason: Option<String>,
    timeout: Duration,
}

impl AnalyzerSelector {
    /// Build a selector, logging once if the primary can't be used
    pub fn new(capability: PrimaryCapability, baseline: Box<dyn FeatureAnalyzer>, timeout: Duration) -> Self {
        let (primary, standing_reason) = match capability {
            PrimaryCapability::Ready(analyzer) => {
                log::info!("AnalyzerSelector: primary analyzer '{}' ready", analyzer.name());
                (Some(analyzer), None)
            }
            PrimaryCapability::Disabled => {
                log::info!("AnalyzerSelector: primary analyzer disabled, using baseline");
                (None, None)
            }
            PrimaryCapability::Unavailable(reason) => {
                log::warn!("AnalyzerSelector: primary analyzer unavailable ({}), using baseline", reason);
                (None, Some(AnalysisError::Unavailable(reason).to_string()))
            }
            PrimaryCapability::InitFailed(reason) => {
                log::warn!("AnalyzerSelector: primary analyzer failed to initialize ({}), using baseline", reason);
                (None, Some(AnalysisError::InitFailed(reason).to_string()))
            }
        };

        Self {
            primary,
            baseline,
            standing_reason,
            timeout,
        }
    }

    /// Selector with the default baseline analyzer
    pub fn with_baseline(capability: PrimaryCapability, timeout: Duration) -> Self {
        Self::new(capability, Box::new(BaselineAnalyzer::new()), timeout)
    }

    /// Route every request to the baseline from now on
    pub fn disable_primary(&mut self) {
        if let Some(primary) = self.primary.take() {
            log::info!("AnalyzerSelector: primary analyzer '{}' disabled, using baseline", primary.name());
        }
        self.standing_reason = None;
    }

    /// Which analyzer a request will try first
    pub fn select(&self) -> AnalyzerKind {
        if self.primary.is_some() {
            AnalyzerKind::Primary
        } else {
            AnalyzerKind::Baseline
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a request, falling back to the baseline on primary failure
    ///
    /// Only fails when the baseline itself fails.
    pub fn run(&self, clip: &AudioClip, request: &AnalysisRequest) -> AnalysisResult<Selection> {
        let mut fallback_reason = self.standing_reason.clone();

        if let Some(primary) = &self.primary {
            match run_timed(primary.as_ref(), clip, request, self.timeout) {
                Ok(features) => {
                    return Ok(Selection {
                        features,
                        kind: primary.kind(),
                        analyzer: primary.name(),
                        fallback_reason: None,
                    });
                }
                Err(e) => {
                    log::error!(
                        "run: {} analyzer failed on {}: {}; falling back to baseline",
                        primary.name(),
                        clip.source.display(),
                        e
                    );
                    fallback_reason = Some(e.to_string());
                }
            }
        }

        let features = run_timed(self.baseline.as_ref(), clip, request, self.timeout)?;
        Ok(Selection {
            features,
            kind: self.baseline.kind(),
            analyzer: self.baseline.name(),
            fallback_reason,
        })
    }
}

/// Call an analyzer, treating an overrun of `limit` as failure
fn run_timed(
    analyzer: &dyn FeatureAnalyzer,
    clip: &AudioClip,
    request: &AnalysisRequest,
    limit: Duration,
) -> AnalysisResult<RawFeatures> {
    let start = Instant::now();
    let features = analyzer.analyze(clip, request)?;
    let elapsed = start.elapsed();
    if elapsed > limit {
        return Err(AnalysisError::Timeout {
            analyzer: analyzer.name(),
            elapsed,
            limit,
        });
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testing::{Behavior, ScriptedAnalyzer};
    use crate::confidence::Confidence;
    use crate::types::SampleType;

    fn clip() -> AudioClip {
        AudioClip::from_mono(vec![0.0; 4410], 44100, "clip.wav")
    }

    fn request(timeout: Duration) -> AnalysisRequest {
        AnalysisRequest {
            sample_type: SampleType::Loop,
            detection_min_bpm: 40.0,
            detection_max_bpm: 208.0,
            timeout,
        }
    }

    fn baseline() -> Box<dyn FeatureAnalyzer> {
        ScriptedAnalyzer::baseline(Behavior::Tempo(120.0, Confidence::assumed()))
    }

    #[test]
    fn test_primary_serves_when_ready() {
        let primary = ScriptedAnalyzer::primary(Behavior::Tempo(178.2, Confidence::Measured(0.9)));
        let selector = AnalyzerSelector::new(PrimaryCapability::Ready(primary), baseline(), Duration::from_secs(5));
        assert_eq!(selector.select(), AnalyzerKind::Primary);

        let selection = selector.run(&clip(), &request(Duration::from_secs(5))).unwrap();
        assert_eq!(selection.kind, AnalyzerKind::Primary);
        assert_eq!(selection.features.tempo.unwrap().bpm, 178.2);
        assert!(selection.fallback_reason.is_none());
    }

    #[test]
    fn test_runtime_failure_falls_back() {
        let primary = ScriptedAnalyzer::primary(Behavior::Fail("corrupted frame"));
        let selector = AnalyzerSelector::new(PrimaryCapability::Ready(primary), baseline(), Duration::from_secs(5));

        let selection = selector.run(&clip(), &request(Duration::from_secs(5))).unwrap();
        assert_eq!(selection.kind, AnalyzerKind::Baseline);
        assert_eq!(selection.features.tempo.unwrap().bpm, 120.0);
        assert!(selection.fallback_reason.unwrap().contains("corrupted frame"));
    }

    #[test]
    fn test_timeout_falls_back() {
        let primary = ScriptedAnalyzer::primary(Behavior::Sleep(Duration::from_millis(60)));
        let limit = Duration::from_millis(10);
        let selector = AnalyzerSelector::new(PrimaryCapability::Ready(primary), baseline(), limit);

        let selection = selector.run(&clip(), &request(limit)).unwrap();
        assert_eq!(selection.kind, AnalyzerKind::Baseline);
        assert!(selection.fallback_reason.unwrap().contains("exceeded"));
    }

    #[test]
    fn test_baseline_failure_is_an_error() {
        let selector = AnalyzerSelector::new(
            PrimaryCapability::Disabled,
            ScriptedAnalyzer::baseline(Behavior::Fail("boom")),
            Duration::from_secs(5),
        );
        let err = selector.run(&clip(), &request(Duration::from_secs(5))).unwrap_err();
        assert!(matches!(err, AnalysisError::Backend(_)));
    }

    #[test]
    fn test_baseline_timeout_is_an_error() {
        let limit = Duration::from_millis(10);
        let selector = AnalyzerSelector::new(
            PrimaryCapability::Ready(ScriptedAnalyzer::primary(Behavior::Fail("corrupted frame"))),
            ScriptedAnalyzer::baseline(Behavior::Sleep(Duration::from_millis(60))),
            limit,
        );
        let err = selector.run(&clip(), &request(limit)).unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(err, AnalysisError::Timeout { analyzer: "scripted", .. }));
    }

    #[test]
    fn test_disable_primary_drops_ready_analyzer() {
        let primary = ScriptedAnalyzer::primary(Behavior::Tempo(178.2, Confidence::Measured(0.9)));
        let mut selector = AnalyzerSelector::new(PrimaryCapability::Ready(primary), baseline(), Duration::from_secs(5));
        selector.disable_primary();
        assert_eq!(selector.select(), AnalyzerKind::Baseline);

        let selection = selector.run(&clip(), &request(Duration::from_secs(5))).unwrap();
        assert_eq!(selection.kind, AnalyzerKind::Baseline);
        assert!(selection.fallback_reason.is_none());
    }

    #[test]
    fn test_standing_reason_recorded_when_unavailable() {
        let selector = AnalyzerSelector::new(
            PrimaryCapability::Unavailable("no runtime".to_string()),
            baseline(),
            Duration::from_secs(5),
        );
        let selection = selector.run(&clip(), &request(Duration::from_secs(5))).unwrap();
        assert_eq!(selection.fallback_reason.as_deref(), Some("Analyzer unavailable: no runtime"));
    }

    #[test]
    fn test_unavailable_primary_uses_baseline() {
        for capability in [
            PrimaryCapability::Disabled,
            PrimaryCapability::Unavailable("no runtime".to_string()),
            PrimaryCapability::InitFailed("bad install".to_string()),
        ] {
            let selector = AnalyzerSelector::new(capability, baseline(), Duration::from_secs(5));
            assert_eq!(selector.select(), AnalyzerKind::Baseline);
            let selection = selector.run(&clip(), &request(Duration::from_secs(5))).unwrap();
            assert_eq!(selection.kind, AnalyzerKind::Baseline);
        }
    }

    #[test]
    fn test_disabled_by_config() {
        let config = EngineConfig {
            use_primary_analyzer: false,
            ..EngineConfig::default()
        };
        let capability = PrimaryCapability::detect(&config);
        assert!(matches!(capability, PrimaryCapability::Disabled));
        assert_eq!(capability.unavailable_reason(), Some("disabled by configuration"));
    }

    #[cfg(not(feature = "essentia"))]
    #[test]
    fn test_missing_feature_is_unavailable() {
        let capability = PrimaryCapability::detect(&EngineConfig::default());
        assert!(matches!(capability, PrimaryCapability::Unavailable(_)));
    }
}
