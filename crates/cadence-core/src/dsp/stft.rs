//! Short-time Fourier transform (magnitude only)

use crate::error::{AnalysisError, AnalysisResult};
use realfft::RealFftPlanner;

/// Magnitude spectrogram, one `Vec` of `frame_size / 2 + 1` bins per frame
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub frames: Vec<Vec<f32>>,
    pub frame_size: usize,
    pub hop_size: usize,
    pub sample_rate: u32,
}

impl Spectrogram {
    /// Compute a Hann-windowed magnitude spectrogram
    ///
    /// Input shorter than one frame is zero-padded into a single frame;
    /// empty input yields no frames.
    pub fn compute(
        samples: &[f32],
        frame_size: usize,
        hop_size: usize,
        sample_rate: u32,
    ) -> AnalysisResult<Self> {
        if frame_size < 2 || hop_size == 0 {
            return Err(AnalysisError::InvalidInput(format!(
                "invalid STFT parameters: frame {} hop {}",
                frame_size, hop_size
            )));
        }

        let num_frames = if samples.is_empty() {
            0
        } else if samples.len() <= frame_size {
            1
        } else {
            (samples.len() - frame_size) / hop_size + 1
        };

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(frame_size);

        let window = hann_window(frame_size);

        let mut frames = Vec::with_capacity(num_frames);
        let mut scratch = fft.make_scratch_vec();
        let mut frame_buf = vec![0.0f32; frame_size];
        let mut spectrum = fft.make_output_vec();

        for frame_idx in 0..num_frames {
            let start = frame_idx * hop_size;
            let end = (start + frame_size).min(samples.len());

            frame_buf.iter_mut().for_each(|s| *s = 0.0);
            for (i, &sample) in samples[start..end].iter().enumerate() {
                frame_buf[i] = sample * window[i];
            }

            fft.process_with_scratch(&mut frame_buf, &mut spectrum, &mut scratch)
                .map_err(|e| AnalysisError::Backend(format!("FFT failed: {:?}", e)))?;

            frames.push(spectrum.iter().map(|c| c.norm()).collect());
        }

        Ok(Self {
            frames,
            frame_size,
            hop_size,
            sample_rate,
        })
    }

    pub fn num_bins(&self) -> usize {
        self.frame_size / 2 + 1
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Centre frequency of a bin in Hz
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.frame_size as f32
    }

    /// Frames per second
    pub fn frame_rate(&self) -> f32 {
        self.sample_rate as f32 / self.hop_size as f32
    }
}

pub(crate) fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}
