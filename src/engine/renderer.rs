//! Offline renderer
//!
//! Renders a RenderPlan into one stereo buffer. Each voice is read with
//! linear interpolation at `playback_rate` source seconds per output second,
//! which resamples the stem to the output rate in the same step (tempo and
//! pitch move together). Rendering is single-threaded and allocation-free
//! after the output buffer is created, so identical plans produce
//! bit-identical output.

use log::info;

use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::engine::scheduler::{RenderPlan, ScheduledSegment, Voice};

/// Result of an offline render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedAudio {
    /// Stereo output at the plan's sample rate
    pub audio: AudioBuffer,
    pub duration_secs: f64,
}

impl RenderedAudio {
    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.audio.channels()
    }

    pub fn frames(&self) -> usize {
        self.audio.len()
    }
}

/// Deterministic non-real-time mixer
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineRenderer;

impl OfflineRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Render the whole plan and return the finished buffer
    pub fn render(&self, plan: &RenderPlan) -> RenderedAudio {
        let mut audio = AudioBuffer::new(plan.total_frames, ChannelLayout::Stereo, plan.sample_rate);

        for scheduled in &plan.segments {
            for voice in &scheduled.voices {
                mix_voice(&mut audio, scheduled, voice, plan.playback_rate);
            }
        }

        info!(
            "Rendered {} segments into {} frames ({:.2}s @ {} Hz)",
            plan.segments.len(),
            audio.len(),
            plan.total_output_secs,
            plan.sample_rate
        );

        RenderedAudio {
            duration_secs: audio.duration_secs(),
            audio,
        }
    }
}

/// Add one voice into the output over its segment's frame range
fn mix_voice(out: &mut AudioBuffer, scheduled: &ScheduledSegment, voice: &Voice, rate: f64) {
    let output_rate = out.sample_rate as f64;
    let stem = voice.buffer.as_ref();
    let stem_rate = stem.sample_rate as f64;
    let source_end = voice.source_start + voice.source_duration;

    let frame_end = scheduled.frame_end.min(out.len());
    if scheduled.frame_start >= frame_end || stem.is_empty() || stem_rate <= 0.0 {
        return;
    }

    for ch in 0..out.channels() {
        let input = stem.channel_or_mono(ch);
        let output = &mut out.channel_mut(ch)[scheduled.frame_start..frame_end];

        for (offset, sample) in output.iter_mut().enumerate() {
            let frame = scheduled.frame_start + offset;
            let local = frame as f64 / output_rate - scheduled.output_start;
            let envelope = voice.envelope.gain_at(local);
            if envelope <= 0.0 {
                continue;
            }

            let source_secs = voice.source_start + local * rate;
            if source_secs < 0.0 || source_secs >= source_end {
                continue;
            }

            let value = interpolate(input, source_secs * stem_rate);
            *sample += (value as f64 * envelope) as f32 * voice.gain;
        }
    }
}

/// Linear interpolation at a fractional sample position; silence past the end
#[inline]
fn interpolate(input: &[f32], position: f64) -> f32 {
    let index = position.floor();
    if index < 0.0 {
        return 0.0;
    }
    let index = index as usize;
    let Some(&a) = input.get(index) else {
        return 0.0;
    };
    let b = input.get(index + 1).copied().unwrap_or(a);
    let frac = (position - index as f64) as f32;
    a + (b - a) * frac
}
