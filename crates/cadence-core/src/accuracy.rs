//! Tempo accuracy audit against a labeled corpus
//!
//! Labels are plain text, one `path,bpm` pair per line. Blank lines, lines
//! starting with `#` and a `path,bpm` header are skipped. Relative paths
//! are resolved against the label file's directory.

use crate::error::{AnalysisError, AnalysisResult, AudioError};
use crate::record::FeatureRecord;
use std::path::{Path, PathBuf};

/// A detected tempo within this many BPM of the label counts as correct
pub const DEFAULT_TOLERANCE_BPM: f64 = 2.0;

const OCTAVE_RATIOS: [f64; 4] = [0.25, 0.5, 2.0, 4.0];

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSample {
    pub path: PathBuf,
    pub expected_bpm: f64,
}

/// Parse a label file's contents
pub fn parse_labels(text: &str, base_dir: &Path) -> AnalysisResult<Vec<LabeledSample>> {
    let mut samples = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (path, bpm) = line.rsplit_once(',').ok_or_else(|| {
            AnalysisError::InvalidInput(format!("line {}: expected `path,bpm`", line_no + 1))
        })?;
        let (path, bpm) = (path.trim(), bpm.trim());

        if line_no == 0 && bpm.eq_ignore_ascii_case("bpm") {
            continue;
        }

        let expected_bpm: f64 = bpm
            .parse()
            .ok()
            .filter(|b: &f64| b.is_finite() && *b > 0.0)
            .ok_or_else(|| AnalysisError::InvalidInput(format!("line {}: invalid tempo {:?}", line_no + 1, bpm)))?;

        let path = PathBuf::from(path);
        let path = if path.is_absolute() { path } else { base_dir.join(path) };

        samples.push(LabeledSample { path, expected_bpm });
    }

    Ok(samples)
}

/// How one detected tempo compares with its label
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Correct,
    /// Off by a factor of 2 or 4
    OctaveError,
    Wrong,
    MissingTempo,
    Failed(String),
}

pub fn score(expected_bpm: f64, detected_bpm: Option<f64>, tolerance_bpm: f64) -> Outcome {
    let Some(detected) = detected_bpm else {
        return Outcome::MissingTempo;
    };

    if (detected - expected_bpm).abs() <= tolerance_bpm {
        Outcome::Correct
    } else if OCTAVE_RATIOS
        .iter()
        .any(|ratio| (detected - expected_bpm * ratio).abs() <= tolerance_bpm * ratio.max(1.0))
    {
        Outcome::OctaveError
    } else {
        Outcome::Wrong
    }
}

/// Aggregate results of an audit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccuracyReport {
    pub tolerance_bpm: f64,
    pub total: usize,
    pub correct: usize,
    pub octave_errors: usize,
    pub wrong: usize,
    pub missing: usize,
    pub failed: usize,
    /// Correct results that needed an octave correction to get there
    pub rescued_by_correction: usize,
}

impl AccuracyReport {
    pub fn new(tolerance_bpm: f64) -> Self {
        Self {
            tolerance_bpm,
            ..Self::default()
        }
    }

    /// Score one analysis result and fold it in
    pub fn add(&mut self, sample: &LabeledSample, result: &Result<FeatureRecord, AudioError>) -> Outcome {
        let outcome = match result {
            Ok(record) => score(sample.expected_bpm, record.tempo_bpm, self.tolerance_bpm),
            Err(e) => Outcome::Failed(e.to_string()),
        };

        self.total += 1;
        match &outcome {
            Outcome::Correct => {
                self.correct += 1;
                if result.as_ref().is_ok_and(|r| r.is_corrected()) {
                    self.rescued_by_correction += 1;
                }
            }
            Outcome::OctaveError => self.octave_errors += 1,
            Outcome::Wrong => self.wrong += 1,
            Outcome::MissingTempo => self.missing += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
        outcome
    }

    /// Fraction of samples within tolerance
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

impl std::fmt::Display for AccuracyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Tempo accuracy (tolerance ±{:.1} BPM)", self.tolerance_bpm)?;
        writeln!(f, "  samples:              {}", self.total)?;
        writeln!(f, "  correct:              {} ({:.1}%)", self.correct, self.accuracy() * 100.0)?;
        writeln!(f, "  fixed by correction:  {}", self.rescued_by_correction)?;
        writeln!(f, "  octave errors:        {}", self.octave_errors)?;
        writeln!(f, "  wrong:                {}", self.wrong)?;
        writeln!(f, "  no tempo:             {}", self.missing)?;
        writeln!(f, "  failed:               {}", self.failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels() {
        let text = "path,bpm\n# drums\nloops/a.wav, 120\n\n/abs/b.flac,89.5\n";
        let labels = parse_labels(text, Path::new("/corpus")).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].path, PathBuf::from("/corpus/loops/a.wav"));
        assert_eq!(labels[0].expected_bpm, 120.0);
        assert_eq!(labels[1].path, PathBuf::from("/abs/b.flac"));
    }

    #[test]
    fn test_parse_labels_rejects_garbage() {
        assert!(parse_labels("a.wav", Path::new(".")).is_err());
        assert!(parse_labels("a.wav,fast", Path::new(".")).is_err());
        assert!(parse_labels("a.wav,-5", Path::new(".")).is_err());
    }

    #[test]
    fn test_score() {
        assert_eq!(score(120.0, Some(121.5), 2.0), Outcome::Correct);
        assert_eq!(score(120.0, Some(240.0), 2.0), Outcome::OctaveError);
        assert_eq!(score(120.0, Some(60.3), 2.0), Outcome::OctaveError);
        assert_eq!(score(120.0, Some(100.0), 2.0), Outcome::Wrong);
        assert_eq!(score(120.0, None, 2.0), Outcome::MissingTempo);
    }

    #[test]
    fn test_report_counts() {
        let sample = LabeledSample {
            path: PathBuf::from("missing.wav"),
            expected_bpm: 120.0,
        };
        let mut report = AccuracyReport::new(DEFAULT_TOLERANCE_BPM);
        let failed = Err(AudioError::new("missing.wav", "not found", None));
        assert!(matches!(report.add(&sample, &failed), Outcome::Failed(_)));
        assert_eq!(report.total, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.accuracy(), 0.0);
        assert!(report.to_string().contains("failed:               1"));
    }
}
