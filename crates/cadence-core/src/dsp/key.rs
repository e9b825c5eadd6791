//! Key detection by chroma template matching
//!
//! Chroma is accumulated over the whole clip and correlated against the 24
//! rotated Krumhansl-Kessler profiles; the best Pearson correlation wins.

use super::stft::Spectrogram;
use crate::error::AnalysisResult;
use crate::music::MusicalKey;

/// Long frames for pitch resolution (~5.4 Hz bins at 44.1 kHz)
const CHROMA_FRAME_SIZE: usize = 8192;
const CHROMA_HOP_SIZE: usize = 4096;

const CHROMA_MIN_HZ: f32 = 100.0;
const CHROMA_MAX_HZ: f32 = 5000.0;

/// Krumhansl-Kessler major key profile, index 0 = tonic
const MAJOR_PROFILE: [f32; 12] = [6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88];

/// Krumhansl-Kessler minor key profile, index 0 = tonic
const MINOR_PROFILE: [f32; 12] = [6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyDetection {
    pub key: MusicalKey,
    /// Pearson correlation of the winning template (-1 to 1)
    pub correlation: f32,
}

/// 12-bin pitch-class energy profile, C = 0
pub fn chroma(spec: &Spectrogram) -> [f32; 12] {
    let mut chroma = [0.0f32; 12];

    for frame in &spec.frames {
        for (bin, &mag) in frame.iter().enumerate().skip(1) {
            let freq = spec.bin_frequency(bin);
            if !(CHROMA_MIN_HZ..=CHROMA_MAX_HZ).contains(&freq) {
                continue;
            }
            let semitones_from_a = (12.0 * (freq / 440.0).log2()).round() as i32;
            let pitch_class = (semitones_from_a + 9).rem_euclid(12) as usize;
            chroma[pitch_class] += mag * mag;
        }
    }

    chroma
}

/// Detect the key of a mono clip; `None` when the clip has no tonal energy
pub fn detect_key(samples: &[f32], sample_rate: u32) -> AnalysisResult<Option<KeyDetection>> {
    let spec = Spectrogram::compute(samples, CHROMA_FRAME_SIZE, CHROMA_HOP_SIZE, sample_rate)?;
    Ok(match_key(&chroma(&spec)))
}

/// Correlate a chroma vector against all 24 key templates
pub fn match_key(chroma: &[f32; 12]) -> Option<KeyDetection> {
    let total: f32 = chroma.iter().sum();
    if !(total > f32::EPSILON) {
        return None;
    }

    let mut best: Option<KeyDetection> = None;
    for root in 0..12u8 {
        for (minor, profile) in [(false, &MAJOR_PROFILE), (true, &MINOR_PROFILE)] {
            let rotated: [f32; 12] = std::array::from_fn(|pc| profile[(pc + 12 - root as usize) % 12]);
            let correlation = pearson(chroma, &rotated);
            if best.map_or(true, |b| correlation > b.correlation) {
                best = Some(KeyDetection {
                    key: MusicalKey::new(root, minor),
                    correlation,
                });
            }
        }
    }

    if let Some(detection) = &best {
        log::debug!(
            "match_key: {} (r={:.3})",
            detection.key.name(),
            detection.correlation
        );
    }
    best
}

fn pearson(a: &[f32; 12], b: &[f32; 12]) -> f32 {
    let mean_a = a.iter().sum::<f32>() / 12.0;
    let mean_b = b.iter().sum::<f32>() / 12.0;

    let mut cov = 0.0f32;
    let mut var_a = 0.0f32;
    let mut var_b = 0.0f32;
    for i in 0..12 {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom > f32::EPSILON {
        cov / denom
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chord(freqs: &[f32], seconds: f32) -> Vec<f32> {
        let sr = 44100.0;
        (0..(sr * seconds) as usize)
            .map(|i| {
                let t = i as f32 / sr;
                freqs
                    .iter()
                    .map(|f| (2.0 * std::f32::consts::PI * f * t).sin())
                    .sum::<f32>()
                    * 0.2
            })
            .collect()
    }

    #[test]
    fn test_c_major_triad() {
        let samples = chord(&[523.25, 659.26, 783.99], 2.0);
        let detection = detect_key(&samples, 44100).unwrap().unwrap();
        assert_eq!(detection.key.name(), "C");
        assert!(detection.correlation > 0.5);
    }

    #[test]
    fn test_chroma_pitch_classes() {
        let spec = Spectrogram::compute(&chord(&[440.0], 1.0), 8192, 4096, 44100).unwrap();
        let c = chroma(&spec);
        let loudest = c
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(loudest, 9);
    }

    #[test]
    fn test_silence_has_no_key() {
        assert!(detect_key(&vec![0.0; 44100], 44100).unwrap().is_none());
    }

    #[test]
    fn test_template_matches_itself() {
        // A minor profile rotated to A
        let chroma: [f32; 12] = std::array::from_fn(|pc| MINOR_PROFILE[(pc + 3) % 12]);
        let detection = match_key(&chroma).unwrap();
        assert_eq!(detection.key, MusicalKey::new(9, true));
        assert!((detection.correlation - 1.0).abs() < 1e-4);
    }
}
