//! Audio file loading
//!
//! Any format symphonia can probe (WAV, AIFF, FLAC, MP3, OGG...) is decoded,
//! mixed down to mono and resampled to [`ANALYSIS_SAMPLE_RATE`] so both
//! analyzers see identical input.

use crate::error::{AnalysisError, AnalysisResult};
use crate::types::ANALYSIS_SAMPLE_RATE;
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decoded mono audio ready for analysis
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// File the clip was decoded from
    pub source: PathBuf,
}

impl AudioClip {
    /// Wrap already-decoded mono samples
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32, source: impl Into<PathBuf>) -> Self {
        Self {
            samples,
            sample_rate,
            source: source.into(),
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Decode a file into a mono clip at the analysis sample rate
pub fn load_clip(path: &Path) -> AnalysisResult<AudioClip> {
    if !path.is_file() {
        return Err(AnalysisError::NotFound(path.to_path_buf()));
    }

    let (interleaved, sample_rate, channels) = decode_audio(path)?;
    let mono = mix_to_mono(&interleaved, channels);
    if mono.is_empty() {
        return Err(AnalysisError::decode(path, "no audio samples decoded"));
    }

    let samples = if sample_rate == ANALYSIS_SAMPLE_RATE {
        mono
    } else {
        log::debug!(
            "load_clip: resampling {} from {} Hz to {} Hz",
            path.display(),
            sample_rate,
            ANALYSIS_SAMPLE_RATE
        );
        resample(mono, sample_rate, ANALYSIS_SAMPLE_RATE)?
    };

    log::debug!(
        "load_clip: {} decoded ({} samples, {} ch source)",
        path.display(),
        samples.len(),
        channels
    );

    Ok(AudioClip::from_mono(samples, ANALYSIS_SAMPLE_RATE, path))
}

/// Decode to interleaved f32, returning (samples, sample_rate, channels)
fn decode_audio(path: &Path) -> AnalysisResult<(Vec<f32>, u32, usize)> {
    let file = File::open(path).map_err(|e| AnalysisError::decode(path, e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AnalysisError::decode(path, format!("unsupported format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AnalysisError::decode(path, "no audio track found"))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AnalysisError::decode(path, "unknown sample rate"))?;
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1).max(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AnalysisError::decode(path, e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                log::warn!("decode_audio: error reading packet from {}: {}", path.display(), e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("decode_audio: skipping bad packet in {}: {}", path.display(), e);
                continue;
            }
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    Ok((samples, sample_rate, channels))
}

fn mix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Sinc resampling of a mono signal in a single pass
fn resample(samples: Vec<f32>, from_rate: u32, to_rate: u32) -> AnalysisResult<Vec<f32>> {
    if samples.is_empty() || from_rate == to_rate {
        return Ok(samples);
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let input_len = samples.len();
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, input_len, 1)
        .map_err(|e| AnalysisError::Backend(format!("failed to create resampler: {}", e)))?;

    let delay = resampler.output_delay();
    let mut output = resampler
        .process(&[samples], None)
        .map_err(|e| AnalysisError::Backend(format!("resampling failed: {}", e)))?
        .swap_remove(0);

    // Flush the filter tail so the delay can be trimmed without losing the end
    let tail = resampler
        .process_partial::<Vec<f32>>(None, None)
        .map_err(|e| AnalysisError::Backend(format!("resampling failed: {}", e)))?;
    if let Some(channel) = tail.into_iter().next() {
        output.extend(channel);
    }

    let expected = (input_len as f64 * ratio).round() as usize;
    let trimmed: Vec<f32> = output.into_iter().skip(delay).take(expected).collect();
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_wav(dir: &TempDir, name: &str, sample_rate: u32, channels: u16, frames: &[f32]) -> PathBuf {
        let path = dir.path().join(name);
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &s in frames {
            for _ in 0..channels {
                writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    fn sine(freq: f32, sample_rate: u32, seconds: f32) -> Vec<f32> {
        (0..(sample_rate as f32 * seconds) as usize)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_load_mono_wav() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir, "tone.wav", 44100, 1, &sine(440.0, 44100, 1.0));

        let clip = load_clip(&path).unwrap();
        assert_eq!(clip.sample_rate, ANALYSIS_SAMPLE_RATE);
        assert_eq!(clip.samples.len(), 44100);
        assert!((clip.duration_seconds() - 1.0).abs() < 1e-6);
        assert_eq!(clip.source, path);
    }

    #[test]
    fn test_stereo_is_mixed_down() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir, "stereo.wav", 44100, 2, &sine(440.0, 44100, 0.5));

        let clip = load_clip(&path).unwrap();
        assert_eq!(clip.samples.len(), 22050);
        let peak = clip.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.5).abs() < 0.01, "peak {}", peak);
    }

    #[test]
    fn test_resampled_to_analysis_rate() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir, "48k.wav", 48000, 1, &sine(440.0, 48000, 1.0));

        let clip = load_clip(&path).unwrap();
        assert_eq!(clip.sample_rate, ANALYSIS_SAMPLE_RATE);
        assert!((clip.duration_seconds() - 1.0).abs() < 0.01, "duration {}", clip.duration_seconds());
    }

    #[test]
    fn test_missing_file() {
        let err = load_clip(Path::new("/nonexistent/clip.wav")).unwrap_err();
        assert!(matches!(err, AnalysisError::NotFound(_)));
    }

    #[test]
    fn test_zero_byte_file_is_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.wav");
        File::create(&path).unwrap();

        let err = load_clip(&path).unwrap_err();
        assert!(matches!(err, AnalysisError::Decode { .. }));
    }
}
