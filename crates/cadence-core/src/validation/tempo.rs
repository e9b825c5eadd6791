//! Octave-error correction
//!
//! Tempo trackers mis-detect by a power of two (half, double, quadruple)
//! far more often than by any other ratio. For loops, the raw estimate is
//! moved to whichever octave relative lands closest to the centre of a
//! plausible band. Unusual but genuine tempos that have no in-band octave
//! relative are left alone and flagged.

use crate::types::SampleType;
use serde::{Deserialize, Serialize};

/// Octave multipliers tried against the band, in tie-break order
/// (smaller multiplier wins a tie, so halving beats doubling)
const OCTAVE_MULTIPLIERS: [f64; 5] = [0.25, 0.5, 1.0, 2.0, 4.0];

/// Distances closer than this count as a tie
const TIE_EPSILON: f64 = 1e-9;

/// Plausible tempo range for loop material (inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoBand {
    pub min_bpm: f64,
    pub max_bpm: f64,
}

impl TempoBand {
    pub const fn new(min_bpm: f64, max_bpm: f64) -> Self {
        Self { min_bpm, max_bpm }
    }

    pub fn center(&self) -> f64 {
        (self.min_bpm + self.max_bpm) / 2.0
    }

    pub fn contains(&self, bpm: f64) -> bool {
        bpm >= self.min_bpm && bpm <= self.max_bpm
    }
}

impl Default for TempoBand {
    fn default() -> Self {
        Self::new(60.0, 180.0)
    }
}

/// Diagnostic label for a correction, formatted `"<raw>→<corrected>"`
/// with one decimal on each side
///
/// Only constructed through [`CorrectionLabel::new`] so the statistics
/// histogram stays machine-parseable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrectionLabel(String);

impl CorrectionLabel {
    pub const SEPARATOR: char = '→';

    pub fn new(raw_bpm: f64, corrected_bpm: f64) -> Self {
        Self(format!("{:.1}{}{:.1}", raw_bpm, Self::SEPARATOR, corrected_bpm))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split a label back into (raw, corrected)
    pub fn parse(label: &str) -> Option<(f64, f64)> {
        let (raw, corrected) = label.split_once(Self::SEPARATOR)?;
        Some((raw.trim().parse().ok()?, corrected.trim().parse().ok()?))
    }
}

impl std::fmt::Display for CorrectionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A correction that was applied to a raw tempo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoCorrection {
    /// Multiplier applied to the raw tempo
    pub factor: f64,
    pub label: CorrectionLabel,
}

/// Outcome of validating one raw tempo
#[derive(Debug, Clone, PartialEq)]
pub struct TempoValidation {
    pub raw_bpm: f64,
    /// Final tempo (`raw_bpm * correction.factor` when corrected)
    pub bpm: f64,
    pub correction: Option<TempoCorrection>,
    /// Whether the final tempo lies in the band; `None` when the band
    /// was not consulted (one-shots)
    pub in_range: Option<bool>,
    /// Whether the tempo band was consulted
    pub prior_used: bool,
}

impl TempoValidation {
    pub fn is_corrected(&self) -> bool {
        self.correction.is_some()
    }

    fn unchanged(raw_bpm: f64, in_range: Option<bool>, prior_used: bool) -> Self {
        Self {
            raw_bpm,
            bpm: raw_bpm,
            correction: None,
            in_range,
            prior_used,
        }
    }
}

/// Octave-error corrector for raw tempo estimates
#[derive(Debug, Clone, Default)]
pub struct TempoValidator {
    band: TempoBand,
}

impl TempoValidator {
    pub fn new(band: TempoBand) -> Self {
        Self { band }
    }

    pub fn band(&self) -> TempoBand {
        self.band
    }

    pub fn validate(&self, raw_bpm: f64, sample_type: SampleType) -> TempoValidation {
        if sample_type == SampleType::OneShot {
            return TempoValidation::unchanged(raw_bpm, None, false);
        }

        if !raw_bpm.is_finite() || raw_bpm <= 0.0 {
            log::debug!("validate: raw tempo {} is not usable, leaving as-is", raw_bpm);
            return TempoValidation::unchanged(raw_bpm, Some(false), false);
        }

        let center = self.band.center();
        let mut best: Option<(f64, f64)> = None; // (multiplier, distance)

        for &multiplier in OCTAVE_MULTIPLIERS.iter() {
            let candidate = raw_bpm * multiplier;
            if !self.band.contains(candidate) {
                continue;
            }
            let distance = (candidate - center).abs();
            match best {
                Some((_, best_distance)) if distance >= best_distance - TIE_EPSILON => {}
                _ => best = Some((multiplier, distance)),
            }
        }

        let Some((factor, _)) = best else {
            log::debug!(
                "validate: no octave of {:.2} BPM falls in {}-{} BPM",
                raw_bpm,
                self.band.min_bpm,
                self.band.max_bpm
            );
            return TempoValidation::unchanged(raw_bpm, Some(false), true);
        };

        if factor == 1.0 {
            return TempoValidation::unchanged(raw_bpm, Some(true), true);
        }

        let corrected = raw_bpm * factor;
        let label = CorrectionLabel::new(raw_bpm, corrected);
        log::debug!("validate: octave correction {} (x{})", label, factor);

        TempoValidation {
            raw_bpm,
            bpm: corrected,
            correction: Some(TempoCorrection { factor, label }),
            in_range: Some(true),
            prior_used: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> TempoValidator {
        TempoValidator::new(TempoBand::default())
    }

    #[test]
    fn test_one_shot_is_never_altered() {
        let v = validator();
        for raw in [15.0, 45.0, 90.0, 178.2, 400.0, f64::NAN] {
            let result = v.validate(raw, SampleType::OneShot);
            assert!(result.correction.is_none());
            assert!(!result.prior_used);
            assert_eq!(result.in_range, None);
            assert!(result.bpm == raw || (raw.is_nan() && result.bpm.is_nan()));
        }
    }

    #[test]
    fn test_double_and_half_tempo_are_repaired() {
        let v = validator();

        let doubled = v.validate(180.0, SampleType::Loop);
        assert_eq!(doubled.bpm, 90.0);
        assert_eq!(doubled.correction.as_ref().unwrap().label.as_str(), "180.0→90.0");
        assert_eq!(doubled.correction.as_ref().unwrap().factor, 0.5);

        let halved = v.validate(45.0, SampleType::Loop);
        assert_eq!(halved.bpm, 90.0);
        assert_eq!(halved.correction.as_ref().unwrap().label.as_str(), "45.0→90.0");

        let t = 100.0;
        assert_eq!(v.validate(t * 2.0, SampleType::Loop).bpm, t);
        assert_eq!(v.validate(t * 0.5, SampleType::Loop).bpm, t);
    }

    #[test]
    fn test_scenario_178_2() {
        let result = validator().validate(178.2, SampleType::Loop);
        assert!((result.bpm - 89.1).abs() < 1e-9);
        assert!((result.bpm - 90.0).abs() <= 2.0);
        assert_eq!(result.correction.unwrap().label.as_str(), "178.2→89.1");
        assert_eq!(result.in_range, Some(true));
        assert!(result.prior_used);
    }

    #[test]
    fn test_quadruple_errors() {
        let v = validator();
        let slow = v.validate(30.0, SampleType::Loop);
        assert_eq!(slow.bpm, 120.0);
        assert_eq!(slow.correction.unwrap().factor, 4.0);

        let fast = v.validate(480.0, SampleType::Loop);
        assert_eq!(fast.bpm, 120.0);
        assert_eq!(fast.correction.unwrap().factor, 0.25);
    }

    #[test]
    fn test_tie_prefers_halving() {
        // 160 and 80 are both 40 BPM from the band centre
        let result = validator().validate(160.0, SampleType::Loop);
        assert_eq!(result.bpm, 80.0);
        assert_eq!(result.correction.unwrap().label.as_str(), "160.0→80.0");
    }

    #[test]
    fn test_in_band_tempo_left_alone() {
        let result = validator().validate(124.0, SampleType::Loop);
        assert_eq!(result.bpm, 124.0);
        assert!(result.correction.is_none());
        assert_eq!(result.in_range, Some(true));
        assert!(result.prior_used);
    }

    #[test]
    fn test_no_in_band_candidate_is_flagged() {
        // 1000 * 0.25 = 250 is still above the band
        let result = validator().validate(1000.0, SampleType::Loop);
        assert_eq!(result.bpm, 1000.0);
        assert!(result.correction.is_none());
        assert_eq!(result.in_range, Some(false));

        let unusable = validator().validate(0.0, SampleType::Loop);
        assert_eq!(unusable.in_range, Some(false));
        assert!(!unusable.prior_used);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let v = validator();
        // Below 22.5 or above 640 BPM the best octave lies outside the
        // +/-2 octave candidate window, so a second pass can still move it
        let mut raw = 25.0;
        while raw <= 640.0 {
            let first = v.validate(raw, SampleType::Loop);
            let second = v.validate(first.bpm, SampleType::Loop);
            if first.in_range == Some(true) {
                assert_eq!(second.bpm, first.bpm, "raw {} not idempotent", raw);
                assert!(second.correction.is_none(), "raw {} corrected twice", raw);
            }
            raw += 0.7;
        }
    }

    #[test]
    fn test_correction_matches_factor() {
        let v = validator();
        for raw in [33.3, 47.5, 91.0, 178.2, 222.0, 512.0] {
            let result = v.validate(raw, SampleType::Loop);
            if let Some(correction) = &result.correction {
                assert_eq!(result.bpm, raw * correction.factor);
            }
        }
    }

    #[test]
    fn test_label_parse() {
        let label = CorrectionLabel::new(178.24, 89.12);
        assert_eq!(label.as_str(), "178.2→89.1");
        assert_eq!(CorrectionLabel::parse(label.as_str()), Some((178.2, 89.1)));
        assert_eq!(CorrectionLabel::parse("178.2->89.1"), None);
    }

    #[test]
    fn test_custom_band() {
        let v = TempoValidator::new(TempoBand::new(160.0, 190.0));
        let result = v.validate(87.0, SampleType::Loop);
        assert_eq!(result.bpm, 174.0);
    }
}
