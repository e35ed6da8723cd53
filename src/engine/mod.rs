//! Export Engine Module
//!
//! The offline half of the export pipeline:
//! - Block time resolution
//! - Stem fetching, decoding and caching
//! - Mix scheduling with de-click envelopes
//! - Deterministic offline rendering
//! - Duration guard and output naming

pub mod buffer;
pub mod decode;
pub mod guard;
pub mod renderer;
pub mod resolver;
pub mod scheduler;
pub mod stems;

pub use buffer::{db_to_linear, linear_to_db, AudioBuffer, ChannelLayout};
pub use guard::{ensure_within_limit, output_file_name};
pub use renderer::{OfflineRenderer, RenderedAudio};
pub use resolver::{resolve, Resolution};
pub use scheduler::{build_plan, GainEnvelope, RenderPlan, ScheduledSegment, Voice};
pub use stems::{DefaultFetcher, LoadedStems, StemFetcher, StemSource};
