//! MP3 frame encoder (LAME)

use mp3lame_encoder::{Bitrate, Builder, DualPcm, Encoder, FlushNoGap, Quality};

use super::worker::FrameEncoder;
use super::EncoderSettings;

/// Bytes reserved for LAME's final flush
const FLUSH_RESERVE: usize = 7200;

/// Constant-bitrate steps offered by the encoder
const CBR_STEPS: [u32; 16] = [
    8, 16, 24, 32, 40, 48, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];

/// Nearest supported bitrate at or below `kbps`, never below 8
pub fn effective_bitrate(kbps: u32) -> u32 {
    CBR_STEPS
        .iter()
        .rev()
        .copied()
        .find(|&step| step <= kbps)
        .unwrap_or(CBR_STEPS[0])
}

fn lame_bitrate(kbps: u32) -> Bitrate {
    match effective_bitrate(kbps) {
        8 => Bitrate::Kbps8,
        16 => Bitrate::Kbps16,
        24 => Bitrate::Kbps24,
        32 => Bitrate::Kbps32,
        40 => Bitrate::Kbps40,
        48 => Bitrate::Kbps48,
        64 => Bitrate::Kbps64,
        80 => Bitrate::Kbps80,
        96 => Bitrate::Kbps96,
        112 => Bitrate::Kbps112,
        128 => Bitrate::Kbps128,
        160 => Bitrate::Kbps160,
        192 => Bitrate::Kbps192,
        224 => Bitrate::Kbps224,
        256 => Bitrate::Kbps256,
        _ => Bitrate::Kbps320,
    }
}

/// LAME CBR encoder fed with 16-bit stereo chunks
pub struct Mp3FrameEncoder {
    encoder: Encoder,
}

impl Mp3FrameEncoder {
    pub fn new(settings: &EncoderSettings) -> Result<Self, String> {
        let mut builder = Builder::new().ok_or_else(|| "LAME encoder init failed".to_string())?;

        builder
            .set_num_channels(settings.num_channels)
            .map_err(|e| format!("LAME set channels failed: {:?}", e))?;
        builder
            .set_sample_rate(settings.sample_rate)
            .map_err(|e| format!("LAME set sample rate failed: {:?}", e))?;
        builder
            .set_brate(lame_bitrate(settings.bitrate_kbps))
            .map_err(|e| format!("LAME set bitrate failed: {:?}", e))?;
        builder
            .set_quality(Quality::Best)
            .map_err(|e| format!("LAME set quality failed: {:?}", e))?;

        let encoder = builder
            .build()
            .map_err(|e| format!("LAME build failed: {:?}", e))?;

        Ok(Self { encoder })
    }
}

impl FrameEncoder for Mp3FrameEncoder {
    fn encode(&mut self, left: &[i16], right: &[i16]) -> Result<Vec<u8>, String> {
        let mut output = Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(left.len()));
        let written = self
            .encoder
            .encode(DualPcm { left, right }, output.spare_capacity_mut())
            .map_err(|e| format!("LAME encode failed: {:?}", e))?;

        // SAFETY: LAME wrote exactly `written` bytes into the spare capacity
        unsafe {
            output.set_len(written);
        }
        Ok(output)
    }

    fn flush(&mut self) -> Result<Vec<u8>, String> {
        let mut output = Vec::with_capacity(FLUSH_RESERVE);
        let written = self
            .encoder
            .flush::<FlushNoGap>(output.spare_capacity_mut())
            .map_err(|e| format!("LAME flush failed: {:?}", e))?;

        // SAFETY: LAME wrote exactly `written` bytes into the spare capacity
        unsafe {
            output.set_len(written);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(320, 320)]
    #[test_case(300, 256)]
    #[test_case(128, 128)]
    #[test_case(100, 96)]
    #[test_case(64, 64)]
    #[test_case(56, 48)]
    #[test_case(32, 32)]
    #[test_case(8, 8)]
    #[test_case(4, 8)]
    fn test_effective_bitrate(requested: u32, expected: u32) {
        assert_eq!(effective_bitrate(requested), expected);
    }

    #[test]
    fn test_encodes_sine_to_mpeg_frames() {
        let settings = EncoderSettings {
            num_channels: 2,
            sample_rate: 44_100,
            bitrate_kbps: 128,
        };
        let mut encoder = Mp3FrameEncoder::new(&settings).unwrap();

        let tone: Vec<i16> = (0..44_100)
            .map(|i| ((i as f32 * 440.0 * std::f32::consts::TAU / 44_100.0).sin() * 8000.0) as i16)
            .collect();

        let mut bytes = Vec::new();
        for chunk in tone.chunks(1152) {
            bytes.extend(encoder.encode(chunk, chunk).unwrap());
        }
        bytes.extend(encoder.flush().unwrap());

        // Roughly 128 kbps for one second
        assert!(bytes.len() > 10_000, "only {} bytes", bytes.len());
        assert!(bytes.windows(2).any(|w| w[0] == 0xFF && w[1] & 0xE0 == 0xE0));
    }

    #[test]
    fn test_low_bitrate_makes_smaller_stream() {
        let tone: Vec<i16> = (0..44_100)
            .map(|i| ((i as f32 * 440.0 * std::f32::consts::TAU / 44_100.0).sin() * 8000.0) as i16)
            .collect();
        let encode_at = |kbps: u32| {
            let settings = EncoderSettings {
                num_channels: 2,
                sample_rate: 44_100,
                bitrate_kbps: kbps,
            };
            let mut encoder = Mp3FrameEncoder::new(&settings).unwrap();
            let mut bytes = Vec::new();
            for chunk in tone.chunks(1152) {
                bytes.extend(encoder.encode(chunk, chunk).unwrap());
            }
            bytes.extend(encoder.flush().unwrap());
            bytes.len()
        };

        // One second at 64 kbps is about 8 KB, well under the 128 kbps stream
        let low = encode_at(64);
        let high = encode_at(128);
        assert!(low < high * 3 / 4, "64 kbps {} bytes vs 128 kbps {}", low, high);
    }
}
