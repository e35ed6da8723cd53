//! Export configuration
//!
//! Every field has a default, so a config file only needs to name the
//! values it overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ExportError, Result};

/// Samples per channel in one MPEG-1 Layer III frame
pub const MPEG_FRAME_SAMPLES: usize = 1152;

/// Default output sample rate (44.1kHz, the MP3 target)
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Default ceiling on the rendered output (10 minutes)
pub const DEFAULT_MAX_DURATION_SECS: f64 = 600.0;

/// Default de-click fade at every splice point
pub const DEFAULT_FADE_MS: f64 = 2.0;

/// Default MP3 bitrate
pub const DEFAULT_BITRATE_KBPS: u32 = 320;

/// Export engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Output sample rate. `None` renders at the instrumental stem's rate.
    pub output_sample_rate: Option<u32>,
    /// Maximum total output duration in seconds
    pub max_duration_secs: f64,
    /// Length of the linear fade at each segment edge, in milliseconds
    pub fade_ms: f64,
    /// MP3 bitrate in kbps
    pub bitrate_kbps: u32,
    /// Frames per `encode` message; a multiple of 1152
    pub chunk_frames: usize,
    /// Capacity of the request and reply channels to the encoder thread
    pub queue_depth: usize,
    /// Watchdog for encoder replies, in seconds
    pub encoder_timeout_secs: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_sample_rate: Some(DEFAULT_SAMPLE_RATE),
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            fade_ms: DEFAULT_FADE_MS,
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
            chunk_frames: MPEG_FRAME_SAMPLES,
            queue_depth: 16,
            encoder_timeout_secs: 30,
        }
    }
}

impl ExportConfig {
    /// Load a configuration from a JSON file and validate it
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ExportConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Encoder watchdog as a Duration
    pub fn encoder_timeout(&self) -> Duration {
        Duration::from_secs(self.encoder_timeout_secs)
    }

    /// Check that the configuration describes a workable export
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| -> Result<()> { Err(ExportError::InvalidConfig { reason }) };

        if self.output_sample_rate == Some(0) {
            return invalid("output sample rate must be > 0".to_string());
        }
        if !self.max_duration_secs.is_finite() || self.max_duration_secs <= 0.0 {
            return invalid(format!(
                "max duration must be > 0, got {}",
                self.max_duration_secs
            ));
        }
        if !self.fade_ms.is_finite() || self.fade_ms < 0.0 {
            return invalid(format!("fade must be >= 0 ms, got {}", self.fade_ms));
        }
        if !(8..=320).contains(&self.bitrate_kbps) {
            return invalid(format!(
                "bitrate must be within 8..=320 kbps, got {}",
                self.bitrate_kbps
            ));
        }
        if self.chunk_frames == 0 || self.chunk_frames % MPEG_FRAME_SAMPLES != 0 {
            return invalid(format!(
                "chunk size must be a non-zero multiple of {}, got {}",
                MPEG_FRAME_SAMPLES, self.chunk_frames
            ));
        }
        if self.queue_depth == 0 {
            return invalid("queue depth must be > 0".to_string());
        }
        if self.encoder_timeout_secs == 0 {
            return invalid("encoder timeout must be > 0".to_string());
        }
        Ok(())
    }
}
