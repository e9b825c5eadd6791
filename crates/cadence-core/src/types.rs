//! Core types shared across the analysis engine

use serde::{Deserialize, Serialize};

/// Sample rate every clip is converted to before analysis (Essentia standard)
pub const ANALYSIS_SAMPLE_RATE: u32 = 44100;

/// STFT frame size used by the tempo and spectral pipelines
pub const FRAME_SIZE: usize = 2048;

/// STFT hop size used by the tempo and spectral pipelines
pub const HOP_SIZE: usize = 512;

/// What kind of material a clip contains
///
/// Selects which tempo correction policy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SampleType {
    /// Repeating material with clear periodicity
    #[default]
    Loop,
    /// A single hit with no periodicity to validate
    OneShot,
}

impl SampleType {
    /// Label used in metadata and on the command line
    pub const fn as_str(&self) -> &'static str {
        match self {
            SampleType::Loop => "loop",
            SampleType::OneShot => "one-shot",
        }
    }

    /// Parse a caller-supplied hint
    ///
    /// Accepts `loop`, `one-shot`, `oneshot` and `one_shot` (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "loop" => Some(SampleType::Loop),
            "one-shot" | "oneshot" | "one_shot" => Some(SampleType::OneShot),
            _ => None,
        }
    }
}

impl std::fmt::Display for SampleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SampleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown sample type '{}' (expected loop or one-shot)", s))
    }
}

/// Which analyzer serviced a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerKind {
    /// Optional high-accuracy analyzer with native confidence signals
    Primary,
    /// Always-available fallback with assumed confidence
    Baseline,
}

impl AnalyzerKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AnalyzerKind::Primary => "primary",
            AnalyzerKind::Baseline => "baseline",
        }
    }
}

impl std::fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_type_parse() {
        assert_eq!(SampleType::parse("loop"), Some(SampleType::Loop));
        assert_eq!(SampleType::parse("One-Shot"), Some(SampleType::OneShot));
        assert_eq!(SampleType::parse("oneshot"), Some(SampleType::OneShot));
        assert_eq!(SampleType::parse("drone"), None);
    }

    #[test]
    fn test_serde_labels() {
        assert_eq!(serde_json::to_string(&SampleType::OneShot).unwrap(), "\"one-shot\"");
        assert_eq!(serde_json::to_string(&AnalyzerKind::Baseline).unwrap(), "\"baseline\"");
    }
}
