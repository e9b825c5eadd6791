//! Autocorrelation tempo estimation over an onset envelope

/// Dominant periodicity of an onset envelope
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodEstimate {
    pub bpm: f64,
    /// Normalized autocorrelation at the chosen lag (0-1)
    pub strength: f32,
}

/// Estimate the tempo of an onset envelope sampled at `frame_rate` Hz
///
/// Searches lags corresponding to `min_bpm..=max_bpm`. Returns `None` for
/// silent envelopes or envelopes shorter than two periods of `min_bpm`.
pub fn estimate_tempo(envelope: &[f32], frame_rate: f32, min_bpm: f64, max_bpm: f64) -> Option<PeriodEstimate> {
    if envelope.is_empty() || frame_rate <= 0.0 || min_bpm <= 0.0 || max_bpm <= min_bpm {
        return None;
    }

    let frame_rate = frame_rate as f64;
    let min_lag = ((60.0 * frame_rate / max_bpm).floor() as usize).max(1);
    let max_lag = (60.0 * frame_rate / min_bpm).ceil() as usize;

    let n = envelope.len();
    if n < max_lag * 2 {
        log::debug!("estimate_tempo: envelope of {} frames is too short (need {})", n, max_lag * 2);
        return None;
    }

    let mean = envelope.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let centered: Vec<f64> = envelope.iter().map(|&v| v as f64 - mean).collect();

    let r0: f64 = centered.iter().map(|v| v * v).sum();
    if r0 <= f64::EPSILON {
        return None;
    }

    // Biased estimate: longer lags are penalised by their shorter overlap,
    // which favours the fastest plausible period over its multiples
    let autocorr = |lag: usize| -> f64 {
        centered[..n - lag]
            .iter()
            .zip(&centered[lag..])
            .map(|(a, b)| a * b)
            .sum::<f64>()
            / r0
    };

    let search_end = (max_lag + 1).min(n - 1);
    let values: Vec<f64> = (min_lag.saturating_sub(1)..=search_end).map(autocorr).collect();
    let offset = min_lag.saturating_sub(1);

    let (best_idx, best_value) = values
        .iter()
        .enumerate()
        .skip(1)
        .take(values.len().saturating_sub(2))
        .filter(|&(i, &v)| v >= values[i - 1] && v >= values[i + 1])
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, &v)| (i, v))?;

    if best_value <= 0.0 {
        return None;
    }

    // Parabolic interpolation around the peak
    let (y0, y1, y2) = (values[best_idx - 1], best_value, values[best_idx + 1]);
    let denom = y0 - 2.0 * y1 + y2;
    let shift = if denom.abs() > f64::EPSILON {
        (0.5 * (y0 - y2) / denom).clamp(-0.5, 0.5)
    } else {
        0.0
    };
    let lag = (best_idx + offset) as f64 + shift;

    let bpm = 60.0 * frame_rate / lag;
    log::debug!("estimate_tempo: lag {:.2} frames -> {:.2} BPM (r={:.3})", lag, bpm, best_value);

    Some(PeriodEstimate {
        bpm,
        strength: best_value.clamp(0.0, 1.0) as f32,
    })
}
