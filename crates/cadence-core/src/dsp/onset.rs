//! Onset detection: spectral flux and transient peak picking

use super::stft::Spectrogram;
use crate::error::AnalysisResult;

/// Frame size for transient detection (~23 ms at 44.1 kHz)
const TRANSIENT_FRAME_SIZE: usize = 1024;
const TRANSIENT_HOP_SIZE: usize = 256;

/// Peaks closer than this are merged into one transient
const MIN_PEAK_SEPARATION_SECONDS: f32 = 0.05;

/// Threshold in standard deviations above the mean flux
const PEAK_THRESHOLD_STDDEVS: f32 = 1.5;

/// A transient is dominant when it reaches this fraction of the strongest one
const DOMINANT_RATIO: f32 = 0.5;

/// Summary of the transients found in a clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransientProfile {
    /// Every flux peak above the adaptive threshold
    pub transient_count: usize,
    /// Peaks at least half as strong as the strongest
    pub dominant_transients: usize,
}

/// Half-wave rectified, log-compressed spectral flux, one value per frame
///
/// The first frame is compared against silence.
pub fn spectral_flux(spec: &Spectrogram) -> Vec<f32> {
    let mut flux = Vec::with_capacity(spec.frames.len());
    let mut previous = vec![0.0f32; spec.num_bins()];

    for frame in &spec.frames {
        let mut sum = 0.0f32;
        for (bin, &mag) in frame.iter().enumerate() {
            let compressed = (1.0 + 100.0 * mag).ln();
            let diff = compressed - previous[bin];
            if diff > 0.0 {
                sum += diff;
            }
            previous[bin] = compressed;
        }
        flux.push(sum);
    }

    flux
}

/// Pick peaks from an onset envelope
///
/// Returns `(frame, value)` pairs sorted by frame. Stronger peaks win when
/// two candidates are closer than `min_separation` frames.
pub fn pick_peaks(envelope: &[f32], min_separation: usize) -> Vec<(usize, f32)> {
    if envelope.is_empty() {
        return Vec::new();
    }

    let n = envelope.len() as f32;
    let mean = envelope.iter().sum::<f32>() / n;
    let variance = envelope.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    let threshold = mean + PEAK_THRESHOLD_STDDEVS * variance.sqrt();

    let mut candidates: Vec<(usize, f32)> = envelope
        .iter()
        .enumerate()
        .filter(|&(i, &v)| {
            let left = if i > 0 { envelope[i - 1] } else { f32::MIN };
            let right = envelope.get(i + 1).copied().unwrap_or(f32::MIN);
            v > threshold && v >= left && v >= right
        })
        .map(|(i, &v)| (i, v))
        .collect();

    candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut accepted: Vec<(usize, f32)> = Vec::new();
    for (frame, value) in candidates {
        if accepted.iter().all(|&(f, _)| f.abs_diff(frame) >= min_separation) {
            accepted.push((frame, value));
        }
    }

    accepted.sort_by_key(|&(frame, _)| frame);
    accepted
}

/// Count transients and dominant transients in a mono clip
pub fn transient_profile(samples: &[f32], sample_rate: u32) -> AnalysisResult<TransientProfile> {
    let spec = Spectrogram::compute(samples, TRANSIENT_FRAME_SIZE, TRANSIENT_HOP_SIZE, sample_rate)?;
    let flux = spectral_flux(&spec);

    let min_separation = ((MIN_PEAK_SEPARATION_SECONDS * spec.frame_rate()).round() as usize).max(1);
    let peaks = pick_peaks(&flux, min_separation);

    let strongest = peaks.iter().map(|&(_, v)| v).fold(0.0f32, f32::max);
    let dominant_transients = peaks
        .iter()
        .filter(|&&(_, v)| v >= strongest * DOMINANT_RATIO)
        .count();

    log::debug!(
        "transient_profile: {} transients ({} dominant) over {} frames",
        peaks.len(),
        dominant_transients,
        flux.len()
    );

    Ok(TransientProfile {
        transient_count: peaks.len(),
        dominant_transients,
    })
}
