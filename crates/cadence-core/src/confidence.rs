//! Confidence normalization
//!
//! Analyzers report confidence in different shapes: Essentia gives
//! measured values on its own scales, the baseline has nothing to report.
//! Every value is wrapped in [`Confidence`] at the analyzer boundary and
//! mapped onto a common 0-100 integer scale here.

use serde::{Deserialize, Serialize};

/// Fraction used when an analyzer has no native confidence signal
pub const ASSUMED_CONFIDENCE: f32 = 0.65;

/// Upper bound for tempo confidence when no octave of the raw tempo
/// fell inside the plausible band
pub const OUT_OF_RANGE_CONFIDENCE_CAP: u8 = 25;

/// Confidence as reported by an analyzer, as a fraction (1.0 = certain)
///
/// Measured values may exceed 1.0 or be negative; they are clamped on
/// normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Confidence {
    /// Derived from the signal by the analyzer
    Measured(f32),
    /// Fixed prior used when the analyzer cannot measure confidence
    Assumed(f32),
}

impl Confidence {
    /// The default assumed confidence
    pub const fn assumed() -> Self {
        Confidence::Assumed(ASSUMED_CONFIDENCE)
    }

    pub const fn is_measured(&self) -> bool {
        matches!(self, Confidence::Measured(_))
    }

    /// Raw fraction before normalization
    pub const fn raw(&self) -> f32 {
        match self {
            Confidence::Measured(v) | Confidence::Assumed(v) => *v,
        }
    }

    pub fn normalized(&self) -> u8 {
        normalize(*self)
    }
}

/// Map a confidence onto the 0-100 scale
///
/// Never fails: NaN maps to 0, out-of-range values are clamped.
pub fn normalize(confidence: Confidence) -> u8 {
    let fraction = confidence.raw();
    if fraction.is_nan() {
        return 0;
    }
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measured_scaling() {
        assert_eq!(normalize(Confidence::Measured(0.0)), 0);
        assert_eq!(normalize(Confidence::Measured(0.424)), 42);
        assert_eq!(normalize(Confidence::Measured(1.0)), 100);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        assert_eq!(normalize(Confidence::Measured(3.7)), 100);
        assert_eq!(normalize(Confidence::Measured(-0.2)), 0);
        assert_eq!(normalize(Confidence::Measured(f32::INFINITY)), 100);
        assert_eq!(normalize(Confidence::Measured(f32::NEG_INFINITY)), 0);
        assert_eq!(normalize(Confidence::Measured(f32::NAN)), 0);
    }

    #[test]
    fn test_assumed_default() {
        let assumed = Confidence::assumed();
        assert!(!assumed.is_measured());
        assert_eq!(assumed.normalized(), 65);
    }

    #[test]
    fn test_normalized_always_in_range() {
        let mut value = -10.0f32;
        while value < 10.0 {
            assert!(normalize(Confidence::Measured(value)) <= 100);
            assert!(normalize(Confidence::Assumed(value)) <= 100);
            value += 0.37;
        }
    }
}
