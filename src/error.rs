//! Error handling for Blockmix
//!
//! Every failure an export can hit, with recovery hints for the UI layer.

use std::time::Duration;

use thiserror::Error;

use crate::model::StemKind;

/// Result type alias for Blockmix operations
pub type Result<T> = std::result::Result<T, ExportError>;

/// Main error type for export operations
#[derive(Error, Debug)]
pub enum ExportError {
    // Selection / resolution errors
    #[error("No blocks selected for export")]
    NoBlocksSelected,

    #[error("Block '{block_id}' could not be resolved: {reason}")]
    UnresolvedSegment { block_id: String, reason: String },

    #[error("None of the {requested} selected blocks resolved to a time range")]
    NoSegmentsResolved { requested: usize },

    // Limits
    #[error("Output duration {duration_secs:.1}s exceeds the limit of {max_secs:.0}s")]
    DurationExceeded { duration_secs: f64, max_secs: f64 },

    #[error("Invalid mix parameters: {reason}")]
    InvalidMixParams { reason: String },

    #[error("Invalid export configuration: {reason}")]
    InvalidConfig { reason: String },

    // Stem errors
    #[error("No source available for the {stem} stem")]
    MissingStem { stem: StemKind },

    #[error("Failed to load {stem} stem: {reason}")]
    Decode {
        stem: StemKind,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Encoder errors
    #[error("Encoder failed to start: {reason}")]
    EncoderInit { reason: String },

    #[error("Encoder failed mid-stream: {reason}")]
    EncoderRuntime { reason: String },

    #[error("Timed out after {after:?} waiting for {stage}")]
    TimedOut { stage: &'static str, after: Duration },

    #[error("Export cancelled")]
    Cancelled,

    #[error("Another export is already in progress")]
    ExportInProgress,

    #[error("Export task failed: {reason}")]
    TaskFailed { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ExportError {
    /// Build a decode error for the given stem without an underlying source
    pub fn decode(stem: StemKind, reason: impl Into<String>) -> Self {
        ExportError::Decode {
            stem,
            reason: reason.into(),
            source: None,
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            ExportError::NoBlocksSelected => "NO_BLOCKS_SELECTED",
            ExportError::UnresolvedSegment { .. } => "UNRESOLVED_SEGMENT",
            ExportError::NoSegmentsResolved { .. } => "NO_SEGMENTS_RESOLVED",
            ExportError::DurationExceeded { .. } => "DURATION_EXCEEDED",
            ExportError::InvalidMixParams { .. } => "INVALID_MIX_PARAMS",
            ExportError::InvalidConfig { .. } => "INVALID_CONFIG",
            ExportError::MissingStem { .. } => "MISSING_STEM",
            ExportError::Decode { .. } => "DECODE_ERROR",
            ExportError::EncoderInit { .. } => "ENCODER_INIT_ERROR",
            ExportError::EncoderRuntime { .. } => "ENCODER_RUNTIME_ERROR",
            ExportError::TimedOut { .. } => "TIMED_OUT",
            ExportError::Cancelled => "CANCELLED",
            ExportError::ExportInProgress => "EXPORT_IN_PROGRESS",
            ExportError::TaskFailed { .. } => "TASK_FAILED",
            ExportError::Io(_) => "IO_ERROR",
            ExportError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors are handled locally (skipped block, vocals dropped)
    /// or can succeed on a plain retry.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ExportError::UnresolvedSegment { .. } => true,
            ExportError::Decode { stem, .. } => *stem == StemKind::Vocals,
            ExportError::ExportInProgress => true,
            ExportError::TimedOut { .. } => true,
            ExportError::Cancelled => true,
            _ => false,
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ExportError::NoBlocksSelected => vec!["Select at least one block to export"],
            ExportError::UnresolvedSegment { .. } | ExportError::NoSegmentsResolved { .. } => vec![
                "Place a marker on the first line of each selected block",
                "Check that the track duration is known",
            ],
            ExportError::DurationExceeded { .. } => vec![
                "Select fewer blocks",
                "Increase the playback rate to shorten the output",
            ],
            ExportError::MissingStem { .. } => vec!["Load a track with an instrumental stem first"],
            ExportError::Decode { .. } => vec![
                "Check that the stem file exists and plays in another application",
                "Supported formats: MP3, WAV, FLAC, OGG",
            ],
            ExportError::EncoderInit { .. } => vec![
                "Try a standard bitrate (128, 192, 256 or 320 kbps)",
                "Export as WAV instead",
            ],
            ExportError::EncoderRuntime { .. } | ExportError::TimedOut { .. } => {
                vec!["Retry the export", "Export as WAV instead"]
            }
            ExportError::ExportInProgress => vec!["Wait for the running export to finish"],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = ExportError::DurationExceeded {
            duration_secs: 650.0,
            max_secs: 600.0,
        };
        assert_eq!(err.error_code(), "DURATION_EXCEEDED");
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("650.0"));
    }

    #[test]
    fn test_decode_recoverable_only_for_vocals() {
        assert!(ExportError::decode(StemKind::Vocals, "bad header").is_recoverable());
        assert!(!ExportError::decode(StemKind::Instrumental, "bad header").is_recoverable());
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = ExportError::NoSegmentsResolved { requested: 3 };
        assert!(!err.recovery_suggestions().is_empty());
        assert!(ExportError::Cancelled.recovery_suggestions().is_empty());
    }
}
