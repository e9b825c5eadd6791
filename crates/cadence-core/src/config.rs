//! Engine configuration
//!
//! Configuration is stored as YAML. Default location:
//! `<config dir>/cadence/config.yaml`. Environment variables
//! (`USE_PRIMARY_ANALYZER`, `ENABLE_GENRE_CLASSIFICATION`, `TEMPO_METHOD`,
//! `ANALYSIS_TIMEOUT_SECONDS`) override file values at construction time.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Master enable for the primary (Essentia) analyzer
    pub use_primary_analyzer: bool,
    /// Separate gate for genre tagging (primary analyzer only)
    pub enable_genre_classification: bool,
    /// Tempo algorithm variant used inside the primary analyzer
    pub tempo_method: TempoMethod,
    /// Upper bound for a single analyzer call
    pub analysis_timeout_seconds: u64,
    /// Tempo detection and validation ranges
    pub tempo: TempoConfig,
    /// Sample-type classification settings
    pub classifier: ClassifierConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_primary_analyzer: true,
            enable_genre_classification: false,
            tempo_method: TempoMethod::default(),
            analysis_timeout_seconds: 30,
            tempo: TempoConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup (normally `std::env::var`)
    ///
    /// Unparseable values are logged and ignored.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("USE_PRIMARY_ANALYZER") {
            match parse_bool(&raw) {
                Some(value) => self.use_primary_analyzer = value,
                None => log::warn!("config: ignoring USE_PRIMARY_ANALYZER={:?}", raw),
            }
        }

        if let Some(raw) = lookup("ENABLE_GENRE_CLASSIFICATION") {
            match parse_bool(&raw) {
                Some(value) => self.enable_genre_classification = value,
                None => log::warn!("config: ignoring ENABLE_GENRE_CLASSIFICATION={:?}", raw),
            }
        }

        if let Some(raw) = lookup("TEMPO_METHOD") {
            match TempoMethod::parse(&raw) {
                Some(method) => self.tempo_method = method,
                None => log::warn!(
                    "config: unknown TEMPO_METHOD={:?}, keeping {}",
                    raw,
                    self.tempo_method
                ),
            }
        }

        if let Some(raw) = lookup("ANALYSIS_TIMEOUT_SECONDS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.analysis_timeout_seconds = secs,
                _ => log::warn!("config: ignoring ANALYSIS_TIMEOUT_SECONDS={:?}", raw),
            }
        }

        self.validate();
        self
    }

    /// Clamp values to usable ranges
    pub fn validate(&mut self) {
        self.analysis_timeout_seconds = self.analysis_timeout_seconds.clamp(1, 3600);
        self.tempo.validate();
        self.classifier.validate();
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_seconds)
    }
}

/// Tempo algorithm variants of the primary analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TempoMethod {
    /// RhythmExtractor2013 with the multifeature beat tracker (default)
    ///
    /// Combines several onset detection functions and reports a confidence.
    #[default]
    Multifeature,

    /// RhythmExtractor2013 with the Degara beat tracker
    ///
    /// Faster, but Essentia reports no confidence for this method.
    Degara,

    /// PercivalBpmEstimator
    ///
    /// Tempo only (no beat positions, no confidence).
    Percival,
}

impl TempoMethod {
    pub const fn all() -> &'static [TempoMethod] {
        &[TempoMethod::Multifeature, TempoMethod::Degara, TempoMethod::Percival]
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            TempoMethod::Multifeature => "multifeature",
            TempoMethod::Degara => "degara",
            TempoMethod::Percival => "percival",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::all()
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
    }

    /// Whether Essentia produces a native confidence for this method
    pub const fn reports_confidence(&self) -> bool {
        matches!(self, TempoMethod::Multifeature)
    }
}

impl std::fmt::Display for TempoMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tempo ranges
///
/// The detection range is what raw trackers search; the band is the
/// plausible range loops are corrected into.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// Lower edge of the plausible loop tempo band
    pub band_min_bpm: f64,
    /// Upper edge of the plausible loop tempo band
    pub band_max_bpm: f64,
    /// Minimum tempo raw detection searches for (Essentia range: 40-180)
    pub detection_min_bpm: i32,
    /// Maximum tempo raw detection searches for (Essentia range: 60-250)
    pub detection_max_bpm: i32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            band_min_bpm: 60.0,
            band_max_bpm: 180.0,
            detection_min_bpm: 40,
            detection_max_bpm: 208,
        }
    }
}

impl TempoConfig {
    pub fn validate(&mut self) {
        // Essentia constraints: min_tempo in [40, 180], max_tempo in [60, 250]
        self.detection_min_bpm = self.detection_min_bpm.clamp(40, 180);
        self.detection_max_bpm = self.detection_max_bpm.clamp(60, 250);
        if self.detection_min_bpm >= self.detection_max_bpm {
            self.detection_max_bpm = (self.detection_min_bpm + 20).min(250);
        }

        if !self.band_min_bpm.is_finite() || self.band_min_bpm <= 0.0 {
            self.band_min_bpm = 60.0;
        }
        if !self.band_max_bpm.is_finite() || self.band_max_bpm <= self.band_min_bpm {
            // Keep at least one octave so every tempo has an in-band relative
            self.band_max_bpm = self.band_min_bpm * 2.0;
        }
    }
}

/// Sample-type classification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Clips shorter than this may be one-shots
    pub one_shot_max_duration_seconds: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            one_shot_max_duration_seconds: 1.5,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&mut self) {
        if !self.one_shot_max_duration_seconds.is_finite() {
            self.one_shot_max_duration_seconds = 1.5;
        }
        self.one_shot_max_duration_seconds = self.one_shot_max_duration_seconds.clamp(0.0, 10.0);
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Get the default config file path
///
/// Returns: `<config dir>/cadence/config.yaml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cadence")
        .join("config.yaml")
}

/// Load configuration from a YAML file
///
/// If the file doesn't exist, returns default config.
/// If the file exists but is invalid, logs a warning and returns default config.
pub fn load_config(path: &Path) -> EngineConfig {
    if !path.exists() {
        log::info!("load_config: no config at {:?}, using defaults", path);
        return EngineConfig::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<EngineConfig>(&contents) {
            Ok(mut config) => {
                config.validate();
                log::info!(
                    "load_config: tempo band {:.0}-{:.0} BPM, one-shots under {:.2}s, {} analyzer ({})",
                    config.tempo.band_min_bpm,
                    config.tempo.band_max_bpm,
                    config.classifier.one_shot_max_duration_seconds,
                    if config.use_primary_analyzer { "primary" } else { "baseline" },
                    config.tempo_method
                );
                config
            }
            Err(e) => {
                log::warn!("load_config: {:?} is not valid YAML config ({}), using defaults", path, e);
                EngineConfig::default()
            }
        },
        Err(e) => {
            log::warn!("load_config: cannot read {:?} ({}), using defaults", path, e);
            EngineConfig::default()
        }
    }
}

/// Save configuration to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &EngineConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;

    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("save_config: wrote {:?}", path);
    Ok(())
}
