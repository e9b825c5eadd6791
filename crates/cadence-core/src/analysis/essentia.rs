//! Essentia-backed primary analyzer
//!
//! Essentia's C++ library is not thread-safe (global logging, FFT plan
//! caches and algorithm registries), so every analysis runs in its own
//! `procspawn` subprocess. Samples travel through a temp file rather than
//! procspawn's IPC channel, which struggles with large buffers.
//!
//! Binaries using this analyzer must call `procspawn::init()` at the top of
//! `main`.

use super::{AnalysisRequest, FeatureAnalyzer, KeyEstimate, RawFeatures, TempoEstimate};
use crate::audio_file::AudioClip;
use crate::config::{EngineConfig, TempoMethod};
use crate::confidence::Confidence;
use crate::dsp::{SpectralDescriptors, Spectrogram};
use crate::error::{AnalysisError, AnalysisResult};
use crate::music::MusicalKey;
use crate::types::{AnalyzerKind, FRAME_SIZE, HOP_SIZE};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Upper end of RhythmExtractor2013's multifeature confidence scale
const MULTIFEATURE_CONFIDENCE_MAX: f32 = 5.32;

/// Budget for the startup probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(20);

/// RAII guard for temp file cleanup; deletes the file on drop
struct TempFileGuard {
    path: PathBuf,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to cleanup temp file {:?}: {}", self.path, e);
            }
        }
    }
}

/// Distinguishes temp files of concurrent calls within one process
static TEMP_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_sample_path() -> PathBuf {
    let seq = TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("cadence_audio_{}_{}.bin", std::process::id(), seq))
}

/// Settings shipped to the subprocess
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubprocessJob {
    samples_path: String,
    sample_count: usize,
    sample_rate: f32,
    method: TempoMethod,
    min_tempo: i32,
    max_tempo: i32,
}

/// Values computed inside the subprocess
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EssentiaOutput {
    bpm: f32,
    /// Only reported by the multifeature beat tracker
    bpm_confidence: Option<f32>,
    key: String,
    scale: String,
    key_strength: f32,
}

/// Primary analyzer backed by Essentia
#[derive(Debug, Clone)]
pub struct EssentiaAnalyzer {
    method: TempoMethod,
}

impl EssentiaAnalyzer {
    /// Create the analyzer, verifying that Essentia can actually be loaded
    /// and configured in a subprocess
    pub fn new(config: &EngineConfig) -> AnalysisResult<Self> {
        let method = config.tempo_method;

        let mut handle = procspawn::spawn(method, |method| probe_essentia(method).map_err(|e| format!("{:#}", e)));
        let outcome = handle.join_timeout(PROBE_TIMEOUT);
        if outcome.as_ref().is_err_and(|e| e.is_timeout()) {
            let _ = handle.kill();
        }

        match outcome {
            Ok(Ok(())) => {
                log::info!("EssentiaAnalyzer::new: ready (tempo method {})", method);
                Ok(Self { method })
            }
            Ok(Err(reason)) => Err(AnalysisError::InitFailed(reason)),
            Err(e) => Err(AnalysisError::InitFailed(format!("probe subprocess failed: {}", e))),
        }
    }

    pub fn method(&self) -> TempoMethod {
        self.method
    }

    fn run_subprocess(&self, clip: &AudioClip, request: &AnalysisRequest) -> AnalysisResult<EssentiaOutput> {
        let temp_path = temp_sample_path();
        let _temp_guard = TempFileGuard::new(temp_path.clone());

        {
            let mut file = std::fs::File::create(&temp_path)
                .map_err(|e| AnalysisError::Backend(format!("failed to create temp file {:?}: {}", temp_path, e)))?;
            file.write_all(bytemuck::cast_slice(&clip.samples))
                .map_err(|e| AnalysisError::Backend(format!("failed to write samples: {}", e)))?;
        }

        let job = SubprocessJob {
            samples_path: temp_path.to_string_lossy().to_string(),
            sample_count: clip.samples.len(),
            sample_rate: clip.sample_rate as f32,
            method: self.method,
            min_tempo: request.detection_min_bpm.round() as i32,
            max_tempo: request.detection_max_bpm.round() as i32,
        };

        let mut handle = procspawn::spawn(job, |job| run_job(&job).map_err(|e| format!("{:#}", e)));

        match handle.join_timeout(request.timeout) {
            Ok(result) => result.map_err(AnalysisError::Backend),
            Err(e) if e.is_timeout() => {
                let _ = handle.kill();
                Err(AnalysisError::Timeout {
                    analyzer: "essentia",
                    elapsed: request.timeout,
                    limit: request.timeout,
                })
            }
            Err(e) => Err(AnalysisError::Backend(format!("analysis subprocess failed: {}", e))),
        }
    }
}

impl FeatureAnalyzer for EssentiaAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Primary
    }

    fn name(&self) -> &'static str {
        "essentia"
    }

    fn analyze(&self, clip: &AudioClip, request: &AnalysisRequest) -> AnalysisResult<RawFeatures> {
        if clip.samples.len() < FRAME_SIZE {
            return Err(AnalysisError::InvalidInput(format!(
                "{} samples is too short for Essentia",
                clip.samples.len()
            )));
        }

        let output = self.run_subprocess(clip, request)?;

        let tempo = (output.bpm.is_finite() && output.bpm > 0.0).then(|| TempoEstimate {
            bpm: output.bpm as f64,
            confidence: match output.bpm_confidence {
                Some(c) => Confidence::Measured(c / MULTIFEATURE_CONFIDENCE_MAX),
                None => Confidence::assumed(),
            },
        });

        let key = MusicalKey::from_key_scale(&output.key, &output.scale).map(|key| KeyEstimate {
            key,
            confidence: Confidence::Measured(output.key_strength),
            clarity: Some(output.key_strength),
        });
        if key.is_none() {
            log::warn!("analyze: unrecognized Essentia key {:?} {:?}", output.key, output.scale);
        }

        let spec = Spectrogram::compute(&clip.samples, FRAME_SIZE, HOP_SIZE, clip.sample_rate)?;
        let spectral = SpectralDescriptors::describe(&clip.samples, &spec);

        Ok(RawFeatures {
            tempo,
            key,
            spectral,
            method: format!("essentia-{}", self.method),
        })
    }
}

/// Build (but don't run) the configured algorithms
fn probe_essentia(method: TempoMethod) -> anyhow::Result<()> {
    use essentia::algorithm::rhythm::rhythm_extractor_2013::RhythmExtractor2013;
    use essentia::algorithm::tonal::key_extractor::KeyExtractor;
    use essentia::essentia::Essentia;

    let essentia = Essentia::new();
    if method != TempoMethod::Percival {
        essentia
            .create::<RhythmExtractor2013>()
            .method(method.as_str())
            .context("Failed to set method")?
            .configure()
            .context("Failed to configure RhythmExtractor2013")?;
    }
    essentia
        .create::<KeyExtractor>()
        .profile_type("edma")
        .context("Failed to set profile_type")?
        .configure()
        .context("Failed to configure KeyExtractor")?;
    Ok(())
}

/// Subprocess body: read samples back from the temp file and analyze them
fn run_job(job: &SubprocessJob) -> anyhow::Result<EssentiaOutput> {
    let mut file = std::fs::File::open(&job.samples_path)
        .with_context(|| format!("Failed to open {}", job.samples_path))?;
    let mut bytes = vec![0u8; job.sample_count * std::mem::size_of::<f32>()];
    file.read_exact(&mut bytes).context("Failed to read samples")?;
    let samples: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    let (bpm, bpm_confidence) = detect_tempo(&samples, job)?;
    let (key, scale, key_strength) = detect_key(&samples, job.sample_rate)?;

    Ok(EssentiaOutput {
        bpm,
        bpm_confidence,
        key,
        scale,
        key_strength,
    })
}

fn detect_tempo(samples: &[f32], job: &SubprocessJob) -> anyhow::Result<(f32, Option<f32>)> {
    use essentia::algorithm::rhythm::percival_bpm_estimator::PercivalBpmEstimator;
    use essentia::algorithm::rhythm::rhythm_extractor_2013::RhythmExtractor2013;
    use essentia::data::GetFromDataContainer;
    use essentia::essentia::Essentia;

    let essentia = Essentia::new();

    if job.method == TempoMethod::Percival {
        let mut percival = essentia
            .create::<PercivalBpmEstimator>()
            .sample_rate(job.sample_rate)
            .context("Failed to set sample_rate")?
            .min_bpm(job.min_tempo)
            .context("Failed to set min_bpm")?
            .max_bpm(job.max_tempo)
            .context("Failed to set max_bpm")?
            .configure()
            .context("Failed to configure PercivalBpmEstimator")?;

        let result = percival
            .compute(samples)
            .context("PercivalBpmEstimator computation failed")?;
        let bpm: f32 = result.bpm().context("Failed to get BPM output")?.get();
        return Ok((bpm, None));
    }

    let mut rhythm = essentia
        .create::<RhythmExtractor2013>()
        .min_tempo(job.min_tempo)
        .context("Failed to set min_tempo")?
        .max_tempo(job.max_tempo)
        .context("Failed to set max_tempo")?
        .method(job.method.as_str())
        .context("Failed to set method")?
        .configure()
        .context("Failed to configure RhythmExtractor2013")?;

    let result = rhythm
        .compute(samples)
        .context("RhythmExtractor2013 computation failed")?;

    let bpm: f32 = result.bpm().context("Failed to get BPM output")?.get();

    // Degara leaves the confidence output at zero
    let confidence = if job.method.reports_confidence() {
        let value: f32 = result.confidence().context("Failed to get confidence output")?.get();
        Some(value)
    } else {
        None
    };

    Ok((bpm, confidence))
}

fn detect_key(samples: &[f32], sample_rate: f32) -> anyhow::Result<(String, String, f32)> {
    use essentia::algorithm::tonal::key_extractor::KeyExtractor;
    use essentia::data::GetFromDataContainer;
    use essentia::essentia::Essentia;

    let essentia = Essentia::new();
    let mut key_algo = essentia
        .create::<KeyExtractor>()
        .profile_type("edma")
        .context("Failed to set profile_type")?
        .sample_rate(sample_rate)
        .context("Failed to set sample_rate")?
        .configure()
        .context("Failed to configure KeyExtractor")?;

    let result = key_algo.compute(samples).context("KeyExtractor computation failed")?;

    let key: String = result.key().context("Failed to get key output")?.get();
    let scale: String = result.scale().context("Failed to get scale output")?.get();
    let strength: f32 = result.strength().context("Failed to get strength output")?.get();

    Ok((key, scale, strength))
}
