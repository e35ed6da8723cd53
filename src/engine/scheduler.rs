//! Mix scheduling
//!
//! Lays the resolved segments out back-to-back on the output timeline and
//! attaches one voice per stem to each, with a short linear fade at both
//! edges so the splices do not click.

use std::sync::Arc;

use log::debug;
use num_traits::ToPrimitive;

use crate::config::ExportConfig;
use crate::engine::buffer::AudioBuffer;
use crate::engine::guard::ensure_within_limit;
use crate::engine::stems::LoadedStems;
use crate::error::Result;
use crate::model::{MixParams, Segment, StemKind};

/// Rendered output is always stereo
pub const OUTPUT_CHANNELS: usize = 2;

/// Convert a time in seconds to the nearest frame index
#[inline]
pub fn secs_to_frames(secs: f64, sample_rate: u32) -> usize {
    (secs * sample_rate as f64)
        .round()
        .to_usize()
        .unwrap_or(0)
}

// ============================================================================
// Gain Envelope
// ============================================================================

/// Trapezoidal gain over a segment's local output window
///
/// Rises linearly from 0 to 1 over `fade` seconds, holds, then falls back
/// to 0 over the last `fade` seconds. `fade` never exceeds half the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainEnvelope {
    /// Window length in output seconds
    pub duration: f64,
    /// Length of each ramp in seconds
    pub fade: f64,
}

impl GainEnvelope {
    pub fn new(duration: f64, fade: f64) -> Self {
        let duration = duration.max(0.0);
        Self {
            duration,
            fade: fade.max(0.0).min(duration / 2.0),
        }
    }

    /// Gain at local time `t` (seconds from the window start)
    pub fn gain_at(&self, t: f64) -> f64 {
        if t < 0.0 || t > self.duration {
            return 0.0;
        }
        if self.fade <= 0.0 {
            return if t < self.duration { 1.0 } else { 0.0 };
        }
        let rise = t / self.fade;
        let fall = (self.duration - t) / self.fade;
        rise.min(fall).min(1.0)
    }
}

// ============================================================================
// Render Plan
// ============================================================================

/// One stem playing one segment
#[derive(Debug, Clone)]
pub struct Voice {
    pub stem: StemKind,
    pub buffer: Arc<AudioBuffer>,
    /// Read position in the stem, in source seconds
    pub source_start: f64,
    /// Source seconds consumed by this voice
    pub source_duration: f64,
    /// Static stem gain from the mix
    pub gain: f32,
    pub envelope: GainEnvelope,
}

/// A segment placed on the output timeline
#[derive(Debug, Clone)]
pub struct ScheduledSegment {
    pub segment: Segment,
    /// Position on the output timeline, in seconds
    pub output_start: f64,
    pub output_duration: f64,
    /// First output frame (inclusive)
    pub frame_start: usize,
    /// Last output frame (exclusive); equals the next segment's `frame_start`
    pub frame_end: usize,
    pub voices: Vec<Voice>,
}

/// Everything the offline renderer needs
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub sample_rate: u32,
    pub channels: usize,
    pub playback_rate: f64,
    pub total_output_secs: f64,
    pub total_frames: usize,
    pub segments: Vec<ScheduledSegment>,
}

impl RenderPlan {
    /// Total source seconds covered by the plan
    pub fn total_source_secs(&self) -> f64 {
        self.segments.iter().map(|s| s.segment.duration()).sum()
    }
}

/// Build the offline render plan for the resolved segments
///
/// The output rate is the configured one, or the instrumental stem's rate
/// when the config leaves it open.
///
/// # Errors
/// * `InvalidMixParams` - Non-positive rate or negative gain
/// * `DurationExceeded` - The laid-out output exceeds the configured ceiling
pub fn build_plan(
    segments: &[Segment],
    stems: &LoadedStems,
    mix: &MixParams,
    config: &ExportConfig,
) -> Result<RenderPlan> {
    mix.validate()?;

    let rate = mix.playback_rate;
    let sample_rate = config.output_sample_rate.unwrap_or(stems.sample_rate);

    let total_output_secs: f64 = segments
        .iter()
        .filter(|s| s.duration() > 0.0)
        .map(|s| s.duration() / rate)
        .sum();
    ensure_within_limit(total_output_secs, config.max_duration_secs)?;

    let total_frames = secs_to_frames(total_output_secs, sample_rate);
    let fade = config.fade_ms / 1000.0;

    let mut stem_list: Vec<(StemKind, &Arc<AudioBuffer>)> =
        vec![(StemKind::Instrumental, &stems.instrumental)];
    if let Some(vocals) = &stems.vocals {
        stem_list.push((StemKind::Vocals, vocals));
    }

    let mut scheduled = Vec::with_capacity(segments.len());
    let mut cursor = 0.0_f64;

    for segment in segments {
        let source_duration = segment.duration();
        if source_duration <= 0.0 {
            continue;
        }
        let output_duration = source_duration / rate;

        let frame_start = secs_to_frames(cursor, sample_rate).min(total_frames);
        let frame_end = secs_to_frames(cursor + output_duration, sample_rate).min(total_frames);

        let envelope = GainEnvelope::new(output_duration, fade);
        let voices = stem_list
            .iter()
            .map(|(stem, buffer)| Voice {
                stem: *stem,
                buffer: Arc::clone(*buffer),
                source_start: segment.start,
                source_duration,
                gain: mix.gain_for(*stem),
                envelope,
            })
            .collect();

        debug!(
            "Scheduled '{}': out [{:.3}s +{:.3}s) frames [{}, {}) fade {:.4}s",
            segment.block_id, cursor, output_duration, frame_start, frame_end, envelope.fade
        );

        scheduled.push(ScheduledSegment {
            segment: segment.clone(),
            output_start: cursor,
            output_duration,
            frame_start,
            frame_end,
            voices,
        });
        cursor += output_duration;
    }

    if let Some(last) = scheduled.last_mut() {
        last.frame_end = total_frames;
    }

    Ok(RenderPlan {
        sample_rate,
        channels: OUTPUT_CHANNELS,
        playback_rate: rate,
        total_output_secs,
        total_frames,
        segments: scheduled,
    })
}

// ============================================================================
// Tests
// ============================================================================
