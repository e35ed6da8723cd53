//! WAV frame encoder
//!
//! The RIFF header carries the data size, so samples are buffered and the
//! whole file is written by hound on flush.

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use super::worker::FrameEncoder;
use super::EncoderSettings;

/// 16-bit PCM WAV writer
pub struct WavFrameEncoder {
    spec: WavSpec,
    interleaved: Vec<i16>,
}

impl WavFrameEncoder {
    pub fn new(settings: &EncoderSettings) -> Self {
        Self {
            spec: WavSpec {
                channels: settings.num_channels as u16,
                sample_rate: settings.sample_rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
            interleaved: Vec::new(),
        }
    }
}

impl FrameEncoder for WavFrameEncoder {
    fn encode(&mut self, left: &[i16], right: &[i16]) -> Result<Vec<u8>, String> {
        if self.spec.channels == 1 {
            self.interleaved.extend_from_slice(left);
        } else {
            self.interleaved.reserve(left.len() * 2);
            for (&l, &r) in left.iter().zip(right) {
                self.interleaved.push(l);
                self.interleaved.push(r);
            }
        }
        Ok(Vec::new())
    }

    fn flush(&mut self) -> Result<Vec<u8>, String> {
        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.interleaved.len() * 2));
        {
            let mut writer = WavWriter::new(&mut cursor, self.spec)
                .map_err(|e| format!("WAV header write failed: {}", e))?;
            for &sample in &self.interleaved {
                writer
                    .write_sample(sample)
                    .map_err(|e| format!("WAV write failed: {}", e))?;
            }
            writer
                .finalize()
                .map_err(|e| format!("WAV finalize failed: {}", e))?;
        }
        self.interleaved.clear();
        Ok(cursor.into_inner())
    }
}
