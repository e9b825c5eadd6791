//! Genre tagging from tempo and timbre
//!
//! Each genre is a prototype (typical tempo, spectral brightness and
//! harmonic/percussive balance). A clip is scored against every prototype
//! and the best match wins; its share of the total score is the confidence.

use crate::confidence::Confidence;
use crate::dsp::SpectralDescriptors;

struct GenreProfile {
    name: &'static str,
    bpm: f64,
    bpm_width: f64,
    centroid_hz: f32,
    /// Typical harmonic/percussive energy ratio
    hpr: f32,
}

const PROFILES: &[GenreProfile] = &[
    GenreProfile { name: "hip-hop", bpm: 90.0, bpm_width: 8.0, centroid_hz: 1600.0, hpr: 1.5 },
    GenreProfile { name: "downtempo", bpm: 100.0, bpm_width: 10.0, centroid_hz: 1400.0, hpr: 3.0 },
    GenreProfile { name: "house", bpm: 124.0, bpm_width: 4.0, centroid_hz: 2400.0, hpr: 1.5 },
    GenreProfile { name: "techno", bpm: 132.0, bpm_width: 5.0, centroid_hz: 2800.0, hpr: 1.0 },
    GenreProfile { name: "trance", bpm: 138.0, bpm_width: 4.0, centroid_hz: 3200.0, hpr: 3.0 },
    GenreProfile { name: "dubstep", bpm: 140.0, bpm_width: 4.0, centroid_hz: 1800.0, hpr: 1.0 },
    GenreProfile { name: "drum-and-bass", bpm: 174.0, bpm_width: 6.0, centroid_hz: 3000.0, hpr: 1.0 },
    GenreProfile { name: "ambient", bpm: 70.0, bpm_width: 15.0, centroid_hz: 1200.0, hpr: 8.0 },
];

/// Width of the brightness match, in natural-log units of Hz
const CENTROID_LOG_WIDTH: f32 = 0.5;
/// Width of the harmonic/percussive match, in natural-log units
const HPR_LOG_WIDTH: f32 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct GenreEstimate {
    pub genre: String,
    pub confidence: Confidence,
}

/// Tag a clip; `None` when tempo or brightness is unknown
pub fn classify_genre(bpm: Option<f64>, spectral: &SpectralDescriptors) -> Option<GenreEstimate> {
    let bpm = bpm.filter(|b| b.is_finite() && *b > 0.0)?;
    let centroid = spectral.centroid_hz.filter(|c| *c > 0.0)?;
    let hpr = spectral.harmonic_percussive_ratio.filter(|h| *h > 0.0);

    let scores: Vec<(&'static str, f64)> = PROFILES
        .iter()
        .map(|profile| {
            let tempo = gaussian((bpm - profile.bpm) / profile.bpm_width);
            let brightness = gaussian(((centroid / profile.centroid_hz).ln() / CENTROID_LOG_WIDTH) as f64);
            let balance = hpr.map_or(1.0, |h| gaussian(((h / profile.hpr).ln() / HPR_LOG_WIDTH) as f64));
            (profile.name, tempo * brightness * balance)
        })
        .collect();

    let total: f64 = scores.iter().map(|(_, s)| s).sum();
    let (name, best) = scores.into_iter().max_by(|a, b| a.1.total_cmp(&b.1))?;
    if !(total > 0.0) || !(best > 0.0) {
        return None;
    }

    log::debug!("classify_genre: {} ({:.2} of total score)", name, best / total);

    Some(GenreEstimate {
        genre: name.to_string(),
        confidence: Confidence::Measured((best / total) as f32),
    })
}

fn gaussian(z: f64) -> f64 {
    (-0.5 * z * z).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectral(centroid: f32, hpr: f32) -> SpectralDescriptors {
        SpectralDescriptors {
            centroid_hz: Some(centroid),
            harmonic_percussive_ratio: Some(hpr),
            ..SpectralDescriptors::default()
        }
    }

    #[test]
    fn test_prototypes_classify_as_themselves() {
        for profile in PROFILES {
            let estimate = classify_genre(Some(profile.bpm), &spectral(profile.centroid_hz, profile.hpr)).unwrap();
            assert_eq!(estimate.genre, profile.name);
        }
    }

    #[test]
    fn test_confidence_is_a_fraction() {
        let estimate = classify_genre(Some(174.0), &spectral(3000.0, 1.0)).unwrap();
        assert_eq!(estimate.genre, "drum-and-bass");
        assert!(estimate.confidence.is_measured());
        let c = estimate.confidence.raw();
        assert!(c > 0.5 && c <= 1.0);
    }

    #[test]
    fn test_missing_inputs() {
        assert!(classify_genre(None, &spectral(2000.0, 1.0)).is_none());
        assert!(classify_genre(Some(120.0), &SpectralDescriptors::default()).is_none());
    }
}
