//! Musical key representation
//!
//! Shared by both analyzers so key strings look the same regardless of
//! which one serviced a request ("Am", "C#", "F#m", ...).

use serde::{Deserialize, Serialize};

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Musical key with root note and scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MusicalKey {
    /// Root note as semitone offset from C (0=C, 1=C#, 2=D, ..., 11=B)
    pub root: u8,
    /// true = minor, false = major
    pub minor: bool,
}

impl MusicalKey {
    pub const fn new(root: u8, minor: bool) -> Self {
        Self {
            root: root % 12,
            minor,
        }
    }

    /// Parse key string like "Am", "C#m", "F", "Bb"
    ///
    /// Supported formats:
    /// - Single letter: C, D, E, F, G, A, B
    /// - With sharp: C#, D#, F#, G#, A#
    /// - With flat: Db, Eb, Gb, Ab, Bb
    /// - Minor suffix: Am, C#m, Bbm, "A minor"
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let mut chars = s.chars().peekable();

        let base_root = match chars.next()?.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };

        let root = match chars.peek() {
            Some('#') => {
                chars.next();
                (base_root + 1) % 12
            }
            Some('b') => {
                chars.next();
                (base_root + 11) % 12
            }
            _ => base_root,
        };

        let remaining = chars.collect::<String>().trim().to_lowercase();
        let minor = remaining.starts_with('m') && !remaining.starts_with("maj");

        Some(Self { root, minor })
    }

    /// Build from Essentia's separate key/scale outputs ("A", "minor")
    pub fn from_key_scale(key: &str, scale: &str) -> Option<Self> {
        let mut parsed = Self::parse(key)?;
        parsed.minor = scale.trim().eq_ignore_ascii_case("minor");
        Some(parsed)
    }

    /// Canonical name, normalized to sharps ("Bb" minor becomes "A#m")
    pub fn name(&self) -> String {
        let note = NOTE_NAMES[self.root as usize % 12];
        if self.minor {
            format!("{}m", note)
        } else {
            note.to_string()
        }
    }
}

impl std::fmt::Display for MusicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}
