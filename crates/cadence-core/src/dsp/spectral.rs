//! Spectral and timbral descriptors
//!
//! All frame-level descriptors are averaged over voiced frames only, so
//! leading or trailing silence doesn't drag the averages toward zero.

use super::stft::Spectrogram;
use serde::{Deserialize, Serialize};

const ROLLOFF_FRACTION: f32 = 0.85;

/// Number of mel bands feeding the cepstrum
const MEL_BANDS: usize = 40;
pub const MFCC_COEFFICIENTS: usize = 13;

/// Median filter lengths for harmonic/percussive separation
const HPSS_TIME_KERNEL: usize = 17;
const HPSS_FREQ_KERNEL: usize = 17;
const HPSS_MAX_FRAMES: usize = 1024;
/// Bins above this are ignored by the separation (~11 kHz at 2048/44.1k)
const HPSS_MAX_BINS: usize = 512;

/// Frames quieter than this fraction of the loudest frame count as silence
const VOICED_RELATIVE_ENERGY: f32 = 1e-6;
const SILENCE_AMPLITUDE: f32 = 1e-6;

const EPS: f32 = 1e-10;

/// Descriptors of a clip's spectrum; every field is `None` for silence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectralDescriptors {
    pub centroid_hz: Option<f32>,
    pub rolloff_hz: Option<f32>,
    pub bandwidth_hz: Option<f32>,
    /// Geometric / arithmetic mean of the power spectrum (0 = tonal, 1 = noise)
    pub flatness: Option<f32>,
    /// Sign changes per sample
    pub zero_crossing_rate: Option<f32>,
    /// Harmonic to percussive energy ratio
    pub harmonic_percussive_ratio: Option<f32>,
    /// Mean mel-frequency cepstral coefficients
    pub mfcc: Option<Vec<f32>>,
}

impl SpectralDescriptors {
    /// Compute descriptors from the clip and its spectrogram
    pub fn describe(samples: &[f32], spec: &Spectrogram) -> Self {
        let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        if spec.is_empty() || !(peak > SILENCE_AMPLITUDE) {
            return Self::default();
        }

        let frequencies: Vec<f32> = (0..spec.num_bins()).map(|b| spec.bin_frequency(b)).collect();
        let voiced = voiced_frames(spec);
        if voiced.is_empty() {
            return Self::default();
        }

        let mut centroid_sum = 0.0f64;
        let mut rolloff_sum = 0.0f64;
        let mut bandwidth_sum = 0.0f64;
        let mut flatness_sum = 0.0f64;

        for frame in voiced.iter().map(|&i| &spec.frames[i]) {
            let mag_sum: f32 = frame.iter().sum::<f32>().max(EPS);
            let centroid = frame.iter().zip(&frequencies).map(|(m, f)| m * f).sum::<f32>() / mag_sum;
            let spread = frame
                .iter()
                .zip(&frequencies)
                .map(|(m, f)| m * (f - centroid).powi(2))
                .sum::<f32>()
                / mag_sum;

            centroid_sum += centroid as f64;
            bandwidth_sum += spread.sqrt() as f64;
            rolloff_sum += rolloff(frame, &frequencies) as f64;
            flatness_sum += flatness(frame) as f64;
        }

        let count = voiced.len() as f64;
        Self {
            centroid_hz: Some((centroid_sum / count) as f32),
            rolloff_hz: Some((rolloff_sum / count) as f32),
            bandwidth_hz: Some((bandwidth_sum / count) as f32),
            flatness: Some((flatness_sum / count) as f32),
            zero_crossing_rate: Some(zero_crossing_rate(samples)),
            harmonic_percussive_ratio: harmonic_percussive_ratio(spec),
            mfcc: Some(mfcc(spec, &voiced)),
        }
    }
}

fn voiced_frames(spec: &Spectrogram) -> Vec<usize> {
    let energies: Vec<f32> = spec
        .frames
        .iter()
        .map(|f| f.iter().map(|m| m * m).sum())
        .collect();
    let loudest = energies.iter().fold(0.0f32, |a, &b| a.max(b));
    let threshold = (loudest * VOICED_RELATIVE_ENERGY).max(EPS);
    energies
        .iter()
        .enumerate()
        .filter(|&(_, &e)| e > threshold)
        .map(|(i, _)| i)
        .collect()
}

fn rolloff(frame: &[f32], frequencies: &[f32]) -> f32 {
    let total: f32 = frame.iter().map(|m| m * m).sum();
    let target = total * ROLLOFF_FRACTION;
    let mut cumulative = 0.0f32;
    for (m, &f) in frame.iter().zip(frequencies) {
        cumulative += m * m;
        if cumulative >= target {
            return f;
        }
    }
    frequencies.last().copied().unwrap_or(0.0)
}

fn flatness(frame: &[f32]) -> f32 {
    let n = frame.len() as f32;
    let log_sum: f32 = frame.iter().map(|m| (m * m + EPS).ln()).sum();
    let arithmetic = frame.iter().map(|m| m * m + EPS).sum::<f32>() / n;
    ((log_sum / n).exp() / arithmetic).clamp(0.0, 1.0)
}

pub fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / (samples.len() - 1) as f32
}

/// Median-filter separation: horizontal ridges are harmonic, vertical
/// ridges percussive
fn harmonic_percussive_ratio(spec: &Spectrogram) -> Option<f32> {
    let frames: Vec<&[f32]> = spec
        .frames
        .iter()
        .take(HPSS_MAX_FRAMES)
        .map(|f| &f[..f.len().min(HPSS_MAX_BINS)])
        .collect();
    let num_frames = frames.len();
    let num_bins = frames.first()?.len();

    let mut harmonic_energy = 0.0f64;
    let mut percussive_energy = 0.0f64;
    let mut window = Vec::with_capacity(HPSS_TIME_KERNEL.max(HPSS_FREQ_KERNEL));

    for t in 0..num_frames {
        for b in 0..num_bins {
            let (t0, t1) = kernel_bounds(t, HPSS_TIME_KERNEL, num_frames);
            window.clear();
            window.extend(frames[t0..t1].iter().map(|f| f[b]));
            let h = median(&mut window);

            let (b0, b1) = kernel_bounds(b, HPSS_FREQ_KERNEL, num_bins);
            window.clear();
            window.extend_from_slice(&frames[t][b0..b1]);
            let p = median(&mut window);

            harmonic_energy += (h * h) as f64;
            percussive_energy += (p * p) as f64;
        }
    }

    if percussive_energy <= EPS as f64 {
        return None;
    }
    Some((harmonic_energy / percussive_energy) as f32)
}

fn kernel_bounds(center: usize, kernel: usize, len: usize) -> (usize, usize) {
    let half = kernel / 2;
    (center.saturating_sub(half), (center + half + 1).min(len))
}

fn median(values: &mut [f32]) -> f32 {
    let mid = values.len() / 2;
    *values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b)).1
}

/// Mean MFCCs over the given frames
fn mfcc(spec: &Spectrogram, frames: &[usize]) -> Vec<f32> {
    let filterbank = create_mel_filterbank(MEL_BANDS, spec.frame_size, spec.sample_rate as f32);
    let mut mean = vec![0.0f32; MFCC_COEFFICIENTS];

    let mut log_mel = vec![0.0f32; MEL_BANDS];
    for frame in frames.iter().map(|&i| &spec.frames[i]) {
        for (band, filter) in filterbank.iter().enumerate() {
            let energy: f32 = filter.iter().zip(frame).map(|(w, m)| w * m * m).sum();
            log_mel[band] = (energy + EPS).ln();
        }
        for (k, coeff) in mean.iter_mut().enumerate() {
            *coeff += dct_ii(&log_mel, k);
        }
    }

    let count = frames.len().max(1) as f32;
    mean.iter_mut().for_each(|c| *c /= count);
    mean
}

/// Orthonormal DCT-II coefficient `k`
fn dct_ii(input: &[f32], k: usize) -> f32 {
    let n = input.len() as f32;
    let sum: f32 = input
        .iter()
        .enumerate()
        .map(|(i, &x)| x * (std::f32::consts::PI * k as f32 * (i as f32 + 0.5) / n).cos())
        .sum();
    let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
    sum * scale
}

/// Triangular mel filters, each with `frame_size / 2 + 1` weights
fn create_mel_filterbank(n_bands: usize, frame_size: usize, sample_rate: f32) -> Vec<Vec<f32>> {
    let n_bins = frame_size / 2 + 1;
    let mel_max = hz_to_mel(sample_rate / 2.0);

    let n_points = n_bands + 2;
    let bin_points: Vec<f32> = (0..n_points)
        .map(|i| mel_max * i as f32 / (n_points - 1) as f32)
        .map(|mel| mel_to_hz(mel) * frame_size as f32 / sample_rate)
        .collect();

    bin_points
        .windows(3)
        .map(|edges| {
            let (left, center, right) = (edges[0], edges[1], edges[2]);
            (0..n_bins)
                .map(|bin| {
                    let bin_f = bin as f32;
                    if bin_f >= left && bin_f <= center && center > left {
                        (bin_f - left) / (center - left)
                    } else if bin_f > center && bin_f <= right && right > center {
                        (right - bin_f) / (right - center)
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44100;

    fn sine(freq: f32, seconds: f32) -> Vec<f32> {
        (0..(SR as f32 * seconds) as usize)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32).sin() * 0.5)
            .collect()
    }

    /// Deterministic white-ish noise (xorshift)
    fn noise(seconds: f32) -> Vec<f32> {
        let mut state = 0x2545_f491_u32;
        (0..(SR as f32 * seconds) as usize)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) - 0.5
            })
            .collect()
    }

    fn describe(samples: &[f32]) -> SpectralDescriptors {
        let spec = Spectrogram::compute(samples, 2048, 512, SR).unwrap();
        SpectralDescriptors::describe(samples, &spec)
    }

    #[test]
    fn test_mel_hz_roundtrip() {
        let hz = 1000.0;
        let back = mel_to_hz(hz_to_mel(hz));
        assert!((back - hz).abs() < 0.1, "Roundtrip: {} -> {}", hz, back);
    }

    #[test]
    fn test_sine_descriptors() {
        let d = describe(&sine(1000.0, 1.0));
        let centroid = d.centroid_hz.unwrap();
        assert!((centroid - 1000.0).abs() < 100.0, "centroid {}", centroid);
        assert!(d.flatness.unwrap() < 0.1);
        // 1 kHz crosses zero 2000 times per second
        let zcr = d.zero_crossing_rate.unwrap();
        assert!((zcr - 2000.0 / SR as f32).abs() < 0.002, "zcr {}", zcr);
        assert_eq!(d.mfcc.as_ref().unwrap().len(), MFCC_COEFFICIENTS);
    }

    #[test]
    fn test_noise_is_brighter_and_flatter_than_sine() {
        let tone = describe(&sine(500.0, 1.0));
        let hiss = describe(&noise(1.0));
        assert!(hiss.centroid_hz.unwrap() > tone.centroid_hz.unwrap());
        assert!(hiss.flatness.unwrap() > tone.flatness.unwrap());
        assert!(hiss.rolloff_hz.unwrap() > 10000.0);
    }

    #[test]
    fn test_steady_tone_is_harmonic() {
        let d = describe(&sine(440.0, 1.0));
        assert!(d.harmonic_percussive_ratio.unwrap() > 1.0);
    }

    #[test]
    fn test_silence_yields_nothing() {
        assert_eq!(describe(&vec![0.0; SR as usize]), SpectralDescriptors::default());
        assert_eq!(describe(&[]), SpectralDescriptors::default());
    }

    #[test]
    fn test_filterbank_shape() {
        let bank = create_mel_filterbank(MEL_BANDS, 2048, 44100.0);
        assert_eq!(bank.len(), MEL_BANDS);
        assert!(bank.iter().all(|f| f.len() == 1025));
        assert!(bank.iter().all(|f| f.iter().any(|&w| w > 0.0)));
    }
}
