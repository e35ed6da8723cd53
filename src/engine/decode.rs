//! Stem decoding
//!
//! Turns fetched stem bytes (MP3, WAV, FLAC, OGG) into planar float buffers
//! at the file's native sample rate. Resampling happens later, in the
//! renderer, together with the playback-rate change.

use std::io::{Cursor, ErrorKind};

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::error::{ExportError, Result};
use crate::model::StemKind;

/// Decode an in-memory audio file into an AudioBuffer
///
/// # Arguments
/// * `bytes` - The complete encoded file
/// * `extension` - File extension used as a format hint, if known
/// * `stem` - Which stem is being decoded (for error reporting)
///
/// # Errors
/// * `Decode` - Unknown container, missing track, more than two channels,
///   or no decodable audio
pub fn decode_stem(bytes: Vec<u8>, extension: Option<&str>, stem: StemKind) -> Result<AudioBuffer> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_error(stem, "unrecognised audio container", e))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| ExportError::decode(stem, "file has no audio track"))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| ExportError::decode(stem, "unknown sample rate"))?;
    let mut channels = codec_params.channels.map(|c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| decode_error(stem, "unsupported codec", e))?;

    let mut interleaved: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(decode_error(stem, "failed to read packet", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let count = *channels.get_or_insert(spec.channels.count());
                if count != spec.channels.count() {
                    return Err(ExportError::decode(
                        stem,
                        "channel count changed mid-stream",
                    ));
                }
                let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                sample_buf.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(sample_buf.samples());
            }
            Err(SymphoniaError::DecodeError(msg)) => {
                // Corrupt frames are skipped, the rest of the stem stays usable
                warn!("Skipping corrupt packet in {} stem: {}", stem, msg);
            }
            Err(e) => return Err(decode_error(stem, "decoder failure", e)),
        }
    }

    let channels = channels.unwrap_or(0);
    let layout = ChannelLayout::from_count(channels).ok_or_else(|| {
        ExportError::decode(
            stem,
            format!("{}-channel audio (only mono/stereo supported)", channels),
        )
    })?;

    let buffer = AudioBuffer::from_interleaved(&interleaved, layout, sample_rate);
    if buffer.is_empty() {
        return Err(ExportError::decode(stem, "stem contains no audio"));
    }

    debug!(
        "Decoded {} stem: {} ch, {} Hz, {:.2}s",
        stem,
        buffer.channels(),
        buffer.sample_rate,
        buffer.duration_secs()
    );

    Ok(buffer)
}

fn decode_error(stem: StemKind, reason: &str, source: SymphoniaError) -> ExportError {
    ExportError::Decode {
        stem,
        reason: format!("{}: {}", reason, source),
        source: Some(Box::new(source)),
    }
}

// ============================================================================
// Tests
// ============================================================================
