//! Pure-Rust signal processing used by the baseline analyzer
//!
//! Spectral descriptors and transient profiles are also used on the primary
//! path, since they don't depend on which analyzer detects tempo and key.

pub mod key;
pub mod onset;
pub mod spectral;
pub mod stft;
pub mod tempo;

pub use spectral::SpectralDescriptors;
pub use stft::Spectrogram;
