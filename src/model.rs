//! Export data model
//!
//! Markers and blocks come from the lyrics editor; segments, mix parameters
//! and output formats are what the export pipeline works with.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ExportError, Result};

/// Structural role of a lyric section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Verse,
    Chorus,
    Bridge,
    Prechorus,
    Intro,
    Outro,
    Blank,
    #[default]
    Unknown,
}

/// A user-placed timestamp bound to one lyric line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub id: String,
    pub line_index: i64,
    /// Position in the source track, in seconds
    pub time: f64,
    #[serde(default)]
    pub block_type: BlockType,
    #[serde(default)]
    pub color: Option<String>,
}

impl Marker {
    pub fn new(id: impl Into<String>, line_index: i64, time: f64) -> Self {
        Self {
            id: id.into(),
            line_index,
            time,
            block_type: BlockType::Unknown,
            color: None,
        }
    }
}

/// A contiguous lyric section (verse, chorus, ...) spanning a range of lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: String,
    pub name: String,
    pub line_indices: BTreeSet<i64>,
    #[serde(rename = "type", default)]
    pub block_type: BlockType,
}

impl Block {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        lines: impl IntoIterator<Item = i64>,
        block_type: BlockType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            line_indices: lines.into_iter().collect(),
            block_type,
        }
    }

    /// Inclusive `(first, last)` line range, or None for an empty block
    pub fn line_range(&self) -> Option<(i64, i64)> {
        let first = *self.line_indices.first()?;
        let last = *self.line_indices.last()?;
        Some((first, last))
    }
}

/// A resolved source-time range for one exported block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub block_id: String,
    pub label: String,
}

impl Segment {
    /// Source duration in seconds
    #[inline]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Live mix settings, sampled once at export start
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixParams {
    pub playback_rate: f64,
    pub instrumental_gain: f32,
    pub vocals_gain: f32,
}

impl Default for MixParams {
    fn default() -> Self {
        Self {
            playback_rate: 1.0,
            instrumental_gain: 1.0,
            vocals_gain: 1.0,
        }
    }
}

impl MixParams {
    /// Reject rates and gains the scheduler cannot work with
    pub fn validate(&self) -> Result<()> {
        if !self.playback_rate.is_finite() || self.playback_rate <= 0.0 {
            return Err(ExportError::InvalidMixParams {
                reason: format!("playback rate must be > 0, got {}", self.playback_rate),
            });
        }
        for (name, gain) in [
            ("instrumental", self.instrumental_gain),
            ("vocals", self.vocals_gain),
        ] {
            if !gain.is_finite() || gain < 0.0 {
                return Err(ExportError::InvalidMixParams {
                    reason: format!("{} gain must be >= 0, got {}", name, gain),
                });
            }
        }
        Ok(())
    }

    /// Static gain for the given stem
    pub fn gain_for(&self, stem: StemKind) -> f32 {
        match stem {
            StemKind::Instrumental => self.instrumental_gain,
            StemKind::Vocals => self.vocals_gain,
        }
    }
}

/// One of the two stems of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemKind {
    Instrumental,
    Vocals,
}

impl fmt::Display for StemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StemKind::Instrumental => write!(f, "instrumental"),
            StemKind::Vocals => write!(f, "vocals"),
        }
    }
}

/// Encoded output container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp3,
    Wav,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Wav => "wav",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "audio/mpeg",
            OutputFormat::Wav => "audio/wav",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Ok(OutputFormat::Mp3),
            "wav" => Ok(OutputFormat::Wav),
            other => Err(format!("unsupported output format '{}' (use mp3 or wav)", other)),
        }
    }
}
