//! Blockmix - Block-Based Audio Export Engine
//!
//! Renders the lyric blocks a user selected (verse, chorus, ...) from a
//! two-stem karaoke mix into one continuous audio file, played back-to-back
//! at the session's tempo with short de-click fades at every splice.
//!
//! # Architecture
//!
//! The pipeline runs leaves-first:
//! - Resolver: selected blocks to source-time segments via the marker timeline
//! - Stems: fetch, decode and cache the instrumental and vocal stems
//! - Scheduler: lay segments out back-to-back with fade envelopes
//! - Renderer: deterministic offline mix into one stereo buffer
//! - Codec: chunked MP3/WAV encoding on a dedicated worker thread
//!
//! [`BlockExporter`] ties the stages together behind the host ports in
//! [`session`].

pub mod cli;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod exporter;
pub mod model;
pub mod session;

pub use config::ExportConfig;
pub use error::{ExportError, Result};
pub use exporter::{BlockExporter, ExportPreview, ExportRequest, ExportedAudio, PreviewEntry};
pub use model::{Block, BlockType, Marker, MixParams, OutputFormat, Segment, StemKind};
pub use session::{LyricsSource, MixSource, StaticSession, TrackSource};
