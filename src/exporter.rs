//! Block exporter
//!
//! Drives one export end to end: resolve the selected blocks, load the
//! stems, plan, render, encode, and name the result. One exporter serves one
//! editor session; it caches stems across exports and refuses to run two
//! exports at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::codec::mp3::effective_bitrate;
use crate::codec::{EncodeProgress, StreamingEncoder};
use crate::config::ExportConfig;
use crate::engine::buffer::calculate_peak;
use crate::engine::guard::{ensure_within_limit, output_file_name};
use crate::engine::renderer::OfflineRenderer;
use crate::engine::resolver::{resolve, Resolution};
use crate::engine::scheduler::{build_plan, RenderPlan};
use crate::engine::stems::StemSource;
use crate::error::{ExportError, Result};
use crate::model::{MixParams, OutputFormat};
use crate::session::{LyricsSource, MixSource, TrackSource};

// ============================================================================
// Request / Result
// ============================================================================

/// What to export
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    /// Block ids in playback order
    pub block_ids: Vec<String>,
    #[serde(default)]
    pub format: OutputFormat,
    /// Overrides the configured MP3 bitrate
    #[serde(default)]
    pub bitrate_kbps: Option<u32>,
}

impl ExportRequest {
    pub fn new<I, S>(block_ids: I, format: OutputFormat) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            block_ids: block_ids.into_iter().map(Into::into).collect(),
            format,
            bitrate_kbps: None,
        }
    }

    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = Some(kbps);
        self
    }
}

/// A finished export
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedAudio {
    /// The encoded file
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub filename: String,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: usize,
    pub format: OutputFormat,
    /// Bitrate actually used; None for WAV
    pub bitrate_kbps: Option<u32>,
    /// Skipped blocks and other degradations
    pub warnings: Vec<String>,
    pub job_id: Uuid,
    /// Hex SHA-256 of `bytes`
    pub sha256: String,
}

impl ExportedAudio {
    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

/// Output timeline of a selection, computed without touching audio
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPreview {
    pub entries: Vec<PreviewEntry>,
    pub playback_rate: f64,
    pub total_source_secs: f64,
    pub total_output_secs: f64,
    pub filename: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewEntry {
    pub block_id: String,
    pub label: String,
    pub source_start: f64,
    pub source_end: f64,
    pub output_start: f64,
    pub output_duration: f64,
}

// ============================================================================
// Exporter
// ============================================================================

/// Export engine bound to one editor session
pub struct BlockExporter {
    lyrics: Arc<dyn LyricsSource>,
    mix: Arc<dyn MixSource>,
    track: Arc<dyn TrackSource>,
    stems: StemSource,
    config: ExportConfig,
    renderer: OfflineRenderer,
    in_flight: Mutex<()>,
    cancel: Arc<AtomicBool>,
}

impl BlockExporter {
    /// Create an exporter over the given ports
    ///
    /// # Errors
    /// * `InvalidConfig` - The configuration failed validation
    pub fn new(
        lyrics: Arc<dyn LyricsSource>,
        mix: Arc<dyn MixSource>,
        track: Arc<dyn TrackSource>,
        config: ExportConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            lyrics,
            mix,
            track,
            stems: StemSource::default(),
            config,
            renderer: OfflineRenderer::new(),
            in_flight: Mutex::new(()),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Create an exporter whose ports are all served by one session object
    pub fn for_session<S>(session: Arc<S>, config: ExportConfig) -> Result<Self>
    where
        S: LyricsSource + MixSource + TrackSource + 'static,
    {
        Self::new(session.clone(), session.clone(), session, config)
    }

    /// Replace the stem source (e.g. to plug in a custom fetcher)
    pub fn with_stem_source(mut self, stems: StemSource) -> Self {
        self.stems = stems;
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn stems(&self) -> &StemSource {
        &self.stems
    }

    /// Whether an export is running right now
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_locked()
    }

    /// Ask the running export to stop at its next checkpoint.
    ///
    /// A cancel issued while idle stops the next export before it loads stems.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Flag shared with the running export, for cancelling from elsewhere
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Resolve a selection against the current lyrics
    pub fn resolve(&self, block_ids: &[String]) -> Resolution {
        resolve(
            block_ids,
            &self.lyrics.blocks(),
            &self.lyrics.markers(),
            self.mix.duration_secs(),
        )
    }

    /// Lay out a selection on the output timeline and check the ceiling
    ///
    /// # Errors
    /// * `NoBlocksSelected` / `NoSegmentsResolved` - Nothing to export
    /// * `InvalidMixParams` - The live mix cannot be rendered
    /// * `DurationExceeded` - The selection is too long at the current rate
    pub fn preview(&self, block_ids: &[String], format: OutputFormat) -> Result<ExportPreview> {
        let mix = self.mix.mix_params();
        let resolution = self.checked_resolution(block_ids, &mix)?;

        let mut cursor = 0.0;
        let entries = resolution
            .segments
            .iter()
            .map(|segment| {
                let output_duration = segment.duration() / mix.playback_rate;
                let entry = PreviewEntry {
                    block_id: segment.block_id.clone(),
                    label: segment.label.clone(),
                    source_start: segment.start,
                    source_end: segment.end,
                    output_start: cursor,
                    output_duration,
                };
                cursor += output_duration;
                entry
            })
            .collect();

        Ok(ExportPreview {
            entries,
            playback_rate: mix.playback_rate,
            total_source_secs: resolution.total_source_secs(),
            total_output_secs: cursor,
            filename: output_file_name(self.track.title().as_deref(), mix.playback_rate, format),
            warnings: resolution.warnings(),
        })
    }

    /// Run a complete export
    pub fn export(&self, request: &ExportRequest) -> Result<ExportedAudio> {
        self.export_with_progress(request, |_| {})
    }

    /// Run a complete export, reporting encoder progress
    ///
    /// # Errors
    /// * `ExportInProgress` - Another export on this exporter is running
    /// * `NoBlocksSelected` / `NoSegmentsResolved` - Nothing to export
    /// * `DurationExceeded` - Checked before stems are loaded or rendered
    /// * `MissingStem` / `Decode` - The instrumental stem is unavailable
    /// * `EncoderInit` / `EncoderRuntime` / `TimedOut` - Encoding failed
    /// * `Cancelled` - [`cancel`](Self::cancel) was called
    pub fn export_with_progress<F>(&self, request: &ExportRequest, progress: F) -> Result<ExportedAudio>
    where
        F: FnMut(EncodeProgress),
    {
        let _guard = self
            .in_flight
            .try_lock()
            .ok_or(ExportError::ExportInProgress)?;

        let job_id = Uuid::new_v4();
        info!(
            "[{}] Export started: {} blocks as {}",
            job_id,
            request.block_ids.len(),
            request.format
        );

        let result = self.run(job_id, request, progress);
        // Cleared while the guard is still held so no cancel aimed at this export is lost
        self.cancel.store(false, Ordering::SeqCst);
        match &result {
            Ok(exported) => info!(
                "[{}] Export finished: {} ({} bytes, {:.2}s)",
                job_id,
                exported.filename,
                exported.size_bytes(),
                exported.duration_secs
            ),
            Err(e) => warn!("[{}] Export failed: {}", job_id, e),
        }
        result
    }

    /// Run the blocking export on tokio's blocking pool
    #[cfg(feature = "async-bridge")]
    pub async fn export_async(self: Arc<Self>, request: ExportRequest) -> Result<ExportedAudio> {
        tokio::task::spawn_blocking(move || self.export(&request))
            .await
            .map_err(|e| ExportError::TaskFailed {
                reason: e.to_string(),
            })?
    }

    fn run<F>(&self, job_id: Uuid, request: &ExportRequest, progress: F) -> Result<ExportedAudio>
    where
        F: FnMut(EncodeProgress),
    {
        let mix = self.mix.mix_params();
        let resolution = self.checked_resolution(&request.block_ids, &mix)?;
        let mut warnings = resolution.warnings();

        let bitrate_kbps = request.bitrate_kbps.unwrap_or(self.config.bitrate_kbps);
        if !(8..=320).contains(&bitrate_kbps) {
            return Err(ExportError::InvalidConfig {
                reason: format!("bitrate must be within 8..=320 kbps, got {}", bitrate_kbps),
            });
        }
        self.check_cancel()?;

        let stems = self.stems.ensure_loaded(
            self.track.instrumental_url().as_deref(),
            self.track.vocals_url().as_deref(),
        )?;
        warnings.extend(stems.warnings.iter().cloned());
        self.check_cancel()?;

        let plan: RenderPlan = build_plan(&resolution.segments, &stems, &mix, &self.config)?;
        info!(
            "[{}] Rendering {} segments, {:.2}s at rate {:.3}",
            job_id,
            plan.segments.len(),
            plan.total_output_secs,
            plan.playback_rate
        );
        let rendered = self.renderer.render(&plan);
        let peak_db = calculate_peak(&rendered.audio);
        if peak_db > 0.0 {
            warn!("[{}] Mix peaks at {:+.1} dBFS and will clip", job_id, peak_db);
        }
        self.check_cancel()?;

        let bytes = StreamingEncoder::new(&self.config)
            .with_cancel_flag(Arc::clone(&self.cancel))
            .encode_with_progress(&rendered, request.format, bitrate_kbps, progress)?;

        let sha256 = format!("{:x}", Sha256::digest(&bytes));
        Ok(ExportedAudio {
            filename: output_file_name(
                self.track.title().as_deref(),
                mix.playback_rate,
                request.format,
            ),
            duration_secs: rendered.duration_secs,
            sample_rate: rendered.sample_rate(),
            channels: rendered.channels(),
            format: request.format,
            bitrate_kbps: match request.format {
                OutputFormat::Mp3 => Some(effective_bitrate(bitrate_kbps)),
                OutputFormat::Wav => None,
            },
            warnings,
            job_id,
            sha256,
            bytes,
        })
    }

    /// Resolve a selection and apply the checks that need no audio
    fn checked_resolution(&self, block_ids: &[String], mix: &MixParams) -> Result<Resolution> {
        if block_ids.is_empty() {
            return Err(ExportError::NoBlocksSelected);
        }
        mix.validate()?;

        let resolution = self.resolve(block_ids);
        if resolution.segments.is_empty() {
            return Err(ExportError::NoSegmentsResolved {
                requested: block_ids.len(),
            });
        }
        ensure_within_limit(
            resolution.total_source_secs() / mix.playback_rate,
            self.config.max_duration_secs,
        )?;
        Ok(resolution)
    }

    fn check_cancel(&self) -> Result<()> {
        if self.cancel.load(Ordering::SeqCst) {
            return Err(ExportError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::{AudioBuffer, ChannelLayout};
    use crate::model::{Block, BlockType, Marker};
    use crate::session::StaticSession;
    use approx::assert_relative_eq;

    fn session(vocals: bool) -> StaticSession {
        StaticSession {
            title: Some("Song".to_string()),
            instrumental: Some("mem://inst".to_string()),
            vocals: vocals.then(|| "mem://voc".to_string()),
            duration_secs: 60.0,
            mix: MixParams::default(),
            markers: vec![
                Marker::new("m0", 0, 1.0),
                Marker::new("m1", 1, 2.0),
                Marker::new("m2", 2, 3.5),
                Marker::new("m3", 3, 5.0),
            ],
            blocks: vec![
                Block::new("verse", "Verse", [0, 1], BlockType::Verse),
                Block::new("chorus", "Chorus", [2], BlockType::Chorus),
                Block::new("lost", "Lost", [7, 8], BlockType::Bridge),
            ],
        }
    }

    fn tone(secs: f64, sample_rate: u32) -> AudioBuffer {
        let frames = (secs * sample_rate as f64) as usize;
        let mut buffer = AudioBuffer::new(frames, ChannelLayout::Stereo, sample_rate);
        for ch in 0..2 {
            for (i, s) in buffer.channel_mut(ch).iter_mut().enumerate() {
                *s = (i as f32 * 0.03).sin() * 0.4;
            }
        }
        buffer
    }

    fn exporter(session: StaticSession) -> BlockExporter {
        let config = ExportConfig {
            output_sample_rate: Some(8000),
            ..ExportConfig::default()
        };
        let exporter = BlockExporter::for_session(Arc::new(session), config).unwrap();
        exporter.stems().insert_decoded("mem://inst", tone(10.0, 8000));
        exporter.stems().insert_decoded("mem://voc", tone(10.0, 8000));
        exporter
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_wav_export_metadata() {
        let exporter = exporter(session(true));
        let request = ExportRequest::new(["verse", "chorus"], OutputFormat::Wav);

        let exported = exporter.export(&request).unwrap();
        assert_eq!(exported.filename, "Song.wav");
        assert_eq!(exported.sample_rate, 8000);
        assert_eq!(exported.channels, 2);
        assert_eq!(exported.bitrate_kbps, None);
        assert_relative_eq!(exported.duration_secs, 4.0);
        assert_eq!(exported.size_bytes(), 44 + 4 * 8000 * 4);
        assert_eq!(exported.sha256.len(), 64);
        assert!(exported.warnings.is_empty());
        assert!(!exporter.is_busy());
    }

    #[test]
    fn test_unresolved_block_is_a_warning() {
        let exporter = exporter(session(true));
        let request = ExportRequest::new(["lost", "verse"], OutputFormat::Wav);

        let exported = exporter.export(&request).unwrap();
        assert_relative_eq!(exported.duration_secs, 2.5);
        assert_eq!(exported.warnings.len(), 1);
        assert!(exported.warnings[0].contains("lost"));
    }

    #[test]
    fn test_nothing_to_export() {
        let exporter = exporter(session(true));

        let err = exporter.export(&ExportRequest::default()).unwrap_err();
        assert!(matches!(err, ExportError::NoBlocksSelected));

        let err = exporter
            .export(&ExportRequest::new(["lost"], OutputFormat::Wav))
            .unwrap_err();
        assert!(matches!(err, ExportError::NoSegmentsResolved { requested: 1 }));
    }

    #[test]
    fn test_preview_lays_out_timeline() {
        let mut session = session(true);
        session.mix.playback_rate = 1.5;
        let exporter = exporter(session);

        let preview = exporter.preview(&ids(&["chorus", "verse"]), OutputFormat::Mp3).unwrap();
        assert_eq!(preview.filename, "Song__BPM150.mp3");
        assert_eq!(preview.entries[0].block_id, "chorus");
        assert_relative_eq!(preview.entries[1].output_start, 1.0);
        assert_relative_eq!(preview.total_source_secs, 4.0);
        assert_relative_eq!(preview.total_output_secs, 4.0 / 1.5);
    }

    #[test]
    fn test_bad_bitrate_override_rejected() {
        let exporter = exporter(session(true));
        let request = ExportRequest::new(["verse"], OutputFormat::Mp3).with_bitrate(1000);

        let err = exporter.export(&request).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_concurrent_export_is_rejected() {
        let exporter = exporter(session(true));
        let _held = exporter.in_flight.lock();

        let err = exporter
            .export(&ExportRequest::new(["verse"], OutputFormat::Wav))
            .unwrap_err();
        assert!(matches!(err, ExportError::ExportInProgress));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_cancel_during_encode() {
        let exporter = exporter(session(true));
        let handle = exporter.cancel_handle();

        let err = exporter
            .export_with_progress(&ExportRequest::new(["verse", "chorus"], OutputFormat::Wav), |_| {
                handle.store(true, Ordering::SeqCst)
            })
            .unwrap_err();
        assert!(matches!(err, ExportError::Cancelled));

        // The next export starts with a cleared flag
        assert!(exporter
            .export(&ExportRequest::new(["verse"], OutputFormat::Wav))
            .is_ok());
    }

    #[test]
    fn test_cancel_before_export_is_not_lost() {
        let exporter = exporter(session(true));
        exporter.cancel();

        let err = exporter
            .export(&ExportRequest::new(["verse"], OutputFormat::Wav))
            .unwrap_err();
        assert!(matches!(err, ExportError::Cancelled));
        assert!(!exporter.cancel_handle().load(Ordering::SeqCst));

        assert!(exporter
            .export(&ExportRequest::new(["verse"], OutputFormat::Wav))
            .is_ok());
    }

    struct Offline;

    impl crate::engine::stems::StemFetcher for Offline {
        fn fetch(&self, url: &str) -> std::io::Result<Vec<u8>> {
            Err(std::io::Error::new(std::io::ErrorKind::NotConnected, url.to_string()))
        }
    }

    #[test]
    fn test_custom_stem_source_failure_names_instrumental() {
        let exporter = BlockExporter::for_session(Arc::new(session(false)), ExportConfig::default())
            .unwrap()
            .with_stem_source(StemSource::new(Box::new(Offline)));

        let err = exporter
            .export(&ExportRequest::new(["verse"], OutputFormat::Wav))
            .unwrap_err();
        assert!(matches!(
            err,
            ExportError::Decode {
                stem: crate::model::StemKind::Instrumental,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = ExportConfig {
            chunk_frames: 1000,
            ..ExportConfig::default()
        };
        let result = BlockExporter::for_session(Arc::new(session(false)), config);
        assert!(matches!(result, Err(ExportError::InvalidConfig { .. })));
    }
}
