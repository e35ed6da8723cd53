//! Host ports
//!
//! The exporter reads lyrics, mix state and track metadata through these
//! traits. `StaticSession` implements all of them from a JSON snapshot and
//! backs the CLI and the tests.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Block, Marker, MixParams};

/// Marker timeline and lyric blocks of the current track
pub trait LyricsSource: Send + Sync {
    fn markers(&self) -> Vec<Marker>;
    fn blocks(&self) -> Vec<Block>;
}

/// Live mix state
pub trait MixSource: Send + Sync {
    fn playback_rate(&self) -> f64;
    fn instrumental_gain(&self) -> f32;
    fn vocals_gain(&self) -> f32;
    /// Full track length in seconds; 0 when unknown
    fn duration_secs(&self) -> f64;

    /// Snapshot of the mix, taken once per export
    fn mix_params(&self) -> MixParams {
        MixParams {
            playback_rate: self.playback_rate(),
            instrumental_gain: self.instrumental_gain(),
            vocals_gain: self.vocals_gain(),
        }
    }
}

/// Metadata and stem locations of the current track
pub trait TrackSource: Send + Sync {
    fn title(&self) -> Option<String>;
    fn instrumental_url(&self) -> Option<String>;
    fn vocals_url(&self) -> Option<String>;
}

/// A complete editor session frozen into one value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticSession {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub instrumental: Option<String>,
    #[serde(default)]
    pub vocals: Option<String>,
    #[serde(default)]
    pub duration_secs: f64,
    #[serde(default)]
    pub mix: MixParams,
    #[serde(default)]
    pub markers: Vec<Marker>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl StaticSession {
    /// Load a session snapshot from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Resolve relative stem paths against `base`
    pub fn rebase_stems(&mut self, base: &Path) {
        for url in [&mut self.instrumental, &mut self.vocals].into_iter().flatten() {
            if url.contains("://") || Path::new(url.as_str()).is_absolute() {
                continue;
            }
            *url = base.join(url.as_str()).to_string_lossy().into_owned();
        }
    }
}

impl LyricsSource for StaticSession {
    fn markers(&self) -> Vec<Marker> {
        self.markers.clone()
    }

    fn blocks(&self) -> Vec<Block> {
        self.blocks.clone()
    }
}

impl MixSource for StaticSession {
    fn playback_rate(&self) -> f64 {
        self.mix.playback_rate
    }

    fn instrumental_gain(&self) -> f32 {
        self.mix.instrumental_gain
    }

    fn vocals_gain(&self) -> f32 {
        self.mix.vocals_gain
    }

    fn duration_secs(&self) -> f64 {
        self.duration_secs
    }
}

impl TrackSource for StaticSession {
    fn title(&self) -> Option<String> {
        self.title.clone()
    }

    fn instrumental_url(&self) -> Option<String> {
        self.instrumental.clone()
    }

    fn vocals_url(&self) -> Option<String> {
        self.vocals.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BlockType;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const SESSION_JSON: &str = r#"{
        "title": "Demo",
        "instrumental": "stems/inst.wav",
        "durationSecs": 180.0,
        "mix": { "playbackRate": 1.25, "instrumentalGain": 0.8, "vocalsGain": 0.0 },
        "markers": [
            { "id": "m0", "lineIndex": 0, "time": 10.0, "blockType": "verse" },
            { "id": "m1", "lineIndex": 2, "time": 25.0 }
        ],
        "blocks": [
            { "id": "v1", "name": "Verse 1", "lineIndices": [0, 1], "type": "verse" }
        ]
    }"#;

    #[test]
    fn test_parses_session_json() {
        let session: StaticSession = serde_json::from_str(SESSION_JSON).unwrap();

        assert_eq!(session.title(), Some("Demo".to_string()));
        assert_eq!(session.vocals_url(), None);
        assert_eq!(session.markers().len(), 2);
        assert_eq!(session.markers()[0].block_type, BlockType::Verse);
        assert_eq!(session.blocks()[0].line_range(), Some((0, 1)));
        assert_eq!(
            session.mix_params(),
            MixParams {
                playback_rate: 1.25,
                instrumental_gain: 0.8,
                vocals_gain: 0.0,
            }
        );
    }

    #[test]
    fn test_load_and_rebase() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(SESSION_JSON.as_bytes())
            .unwrap();

        let mut session = StaticSession::from_json_file(&path).unwrap();
        session.vocals = Some("https://cdn.example/v.mp3".to_string());
        session.rebase_stems(dir.path());

        assert_eq!(
            session.instrumental_url(),
            Some(dir.path().join("stems/inst.wav").to_string_lossy().into_owned())
        );
        assert_eq!(session.vocals_url(), Some("https://cdn.example/v.mp3".to_string()));
    }

    #[test]
    fn test_missing_fields_default() {
        let session: StaticSession = serde_json::from_str("{}").unwrap();
        assert_eq!(session, StaticSession::default());
        assert_eq!(session.playback_rate(), 1.0);
    }
}
