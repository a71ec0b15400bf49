// SPDX-License-Identifier: GPL-3.0-or-later
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub mod database;

pub use database::{DatabaseError, TextDatabase};

// ============================================================================
// Database records
// ============================================================================

/// One localized line as shipped by the game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub text_key: String,
    pub official_translation: String,
    pub source_file: String,
    /// Event-name template such as `vo_{text_key}`.
    pub audio_rule: Option<String>,
    pub terms: Vec<String>,
    /// The original-language line the key was derived from, when the database carries it.
    pub source_text: Option<String>,
    /// Event name declared directly on the record.
    pub audio_event: Option<String>,
}

impl Match {
    /// Identity of a record across the whole database.
    pub fn identity(&self) -> String {
        format!("{}::{}", self.source_file, self.text_key)
    }
}

/// All records sharing one normalized key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseEntry {
    pub key: String,
    pub matches: Vec<Match>,
}

impl DatabaseEntry {
    pub fn primary(&self) -> Option<&Match> {
        self.matches.first()
    }
}

// ============================================================================
// Recognition input
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Bounding quadrilateral, clockwise from top-left.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Quad(pub [Point; 4]);

impl Quad {
    pub fn from_rect(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self([
            Point { x: left, y: top },
            Point { x: right, y: top },
            Point { x: right, y: bottom },
            Point { x: left, y: bottom },
        ])
    }

    pub fn top(&self) -> f32 {
        self.0.iter().map(|p| p.y).fold(f32::INFINITY, f32::min)
    }

    pub fn bottom(&self) -> f32 {
        self.0.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn left(&self) -> f32 {
        self.0.iter().map(|p| p.x).fold(f32::INFINITY, f32::min)
    }

    pub fn right(&self) -> f32 {
        self.0.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn height(&self) -> f32 {
        (self.bottom() - self.top()).max(0.0)
    }

    pub fn center_y(&self) -> f32 {
        (self.top() + self.bottom()) / 2.0
    }

    pub fn union(&self, other: &Quad) -> Quad {
        Quad::from_rect(
            self.left().min(other.left()),
            self.top().min(other.top()),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }
}

/// One line produced by the recognition backend.
///
/// Confidence is informational; nothing in the engine gates on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedLine {
    pub text: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub quad: Quad,
}

fn default_confidence() -> f32 {
    1.0
}

impl RecognizedLine {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            quad: Quad::default(),
        }
    }

    pub fn with_quad(mut self, quad: Quad) -> Self {
        self.quad = quad;
        self
    }
}

/// Consecutive lines grouped into an optional title plus body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub title: Option<String>,
    pub body: Option<String>,
}

impl Segment {
    /// Title and body joined by a single space, for containment checks.
    pub fn combined_text(&self) -> String {
        match (&self.title, &self.body) {
            (Some(title), Some(body)) => format!("{} {}", title, body),
            (Some(title), None) => title.clone(),
            (None, Some(body)) => body.clone(),
            (None, None) => String::new(),
        }
    }
}

// ============================================================================
// Resolution results
// ============================================================================

/// How a match was found. Ordered from strongest to weakest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPath {
    Exact,
    Containment,
    Fuzzy,
    Recovery,
}

impl ResolutionPath {
    /// Lower is stronger. Fuzzy and recovery results share a rank.
    pub fn rank(self) -> u8 {
        match self {
            ResolutionPath::Exact => 0,
            ResolutionPath::Containment => 1,
            ResolutionPath::Fuzzy | ResolutionPath::Recovery => 2,
        }
    }
}

impl std::fmt::Display for ResolutionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionPath::Exact => write!(f, "exact"),
            ResolutionPath::Containment => write!(f, "containment"),
            ResolutionPath::Fuzzy => write!(f, "fuzzy"),
            ResolutionPath::Recovery => write!(f, "recovery"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedMatch {
    pub entry: Arc<DatabaseEntry>,
    /// Weighted score after penalties, in [0, 1].
    pub score: f32,
    /// Similarity before penalties.
    pub raw_score: f32,
    pub matched_key: String,
    pub query_key: String,
    pub path: ResolutionPath,
}

// ============================================================================
// Audio
// ============================================================================

/// Which derivation produced an event-name candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateRule {
    Declared,
    Template,
    /// A known event name similar to the record's own names.
    Indexed,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioCandidate {
    pub name: String,
    pub rule: CandidateRule,
    pub hash: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Ogg,
    Mp3,
    Flac,
}

impl AudioFormat {
    /// Probe order for cached files.
    pub const PRIORITY: [AudioFormat; 4] = [
        AudioFormat::Wav,
        AudioFormat::Ogg,
        AudioFormat::Mp3,
        AudioFormat::Flac,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "wav" => Some(AudioFormat::Wav),
            "ogg" => Some(AudioFormat::Ogg),
            "mp3" => Some(AudioFormat::Mp3),
            "flac" => Some(AudioFormat::Flac),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetOrigin {
    HashDirect,
    ExternalSource,
    BankDecoded,
}

impl std::fmt::Display for AssetOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetOrigin::HashDirect => write!(f, "hash-direct"),
            AssetOrigin::ExternalSource => write!(f, "external-source"),
            AssetOrigin::BankDecoded => write!(f, "bank-decoded"),
        }
    }
}

/// A playable file in the local cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioAsset {
    pub path: PathBuf,
    pub format: AudioFormat,
    pub origin: AssetOrigin,
    /// Numeric id the file is cached under; the FNV-1a hash of the event name.
    pub cache_key: u32,
    pub event_name: String,
}
