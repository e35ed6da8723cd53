//! Float to 16-bit PCM conversion

use crate::engine::buffer::AudioBuffer;

/// Convert one float sample to i16
///
/// Clamps to `[-1, 1]` first; negative values scale by 32768 and the rest
/// by 32767 so both full-scale ends map exactly.
#[inline]
pub fn to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Iterator over `(left, right)` i16 chunks of a stereo buffer
///
/// Every chunk holds `chunk_frames` frames except possibly the last.
/// Mono buffers feed the same channel to both sides.
pub struct PcmChunks<'a> {
    audio: &'a AudioBuffer,
    chunk_frames: usize,
    position: usize,
}

impl<'a> PcmChunks<'a> {
    pub fn new(audio: &'a AudioBuffer, chunk_frames: usize) -> Self {
        Self {
            audio,
            chunk_frames: chunk_frames.max(1),
            position: 0,
        }
    }
}

impl Iterator for PcmChunks<'_> {
    type Item = (Vec<i16>, Vec<i16>);

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.audio.len();
        if self.position >= total {
            return None;
        }
        let end = (self.position + self.chunk_frames).min(total);
        let range = self.position..end;
        self.position = end;

        let left = self.audio.channel_or_mono(0)[range.clone()]
            .iter()
            .copied()
            .map(to_i16)
            .collect();
        let right = self.audio.channel_or_mono(1)[range]
            .iter()
            .copied()
            .map(to_i16)
            .collect();
        Some((left, right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::ChannelLayout;
    use test_case::test_case;

    #[test_case(0.0, 0 ; "silence")]
    #[test_case(1.0, 32767 ; "positive full scale")]
    #[test_case(-1.0, -32768 ; "negative full scale")]
    #[test_case(1.7, 32767 ; "clipped high")]
    #[test_case(-3.0, -32768 ; "clipped low")]
    #[test_case(0.5, 16383 ; "half positive truncates")]
    #[test_case(-0.5, -16384 ; "half negative")]
    fn test_to_i16(input: f32, expected: i16) {
        assert_eq!(to_i16(input), expected);
    }

    #[test]
    fn test_chunks_cover_buffer_in_order() {
        let mut audio = AudioBuffer::new(2500, ChannelLayout::Stereo, 8000);
        for (i, s) in audio.channel_mut(0).iter_mut().enumerate() {
            *s = i as f32 / 4000.0;
        }

        let chunks: Vec<_> = PcmChunks::new(&audio, 1152).collect();
        let sizes: Vec<usize> = chunks.iter().map(|(l, _)| l.len()).collect();
        assert_eq!(sizes, vec![1152, 1152, 196]);

        let left: Vec<i16> = chunks.iter().flat_map(|(l, _)| l.iter().copied()).collect();
        let expected: Vec<i16> = audio.channel(0).iter().copied().map(to_i16).collect();
        assert_eq!(left, expected);
        assert!(chunks.iter().all(|(_, r)| r.iter().all(|&s| s == 0)));
    }

    #[test]
    fn test_mono_feeds_both_sides() {
        let mut audio = AudioBuffer::new(10, ChannelLayout::Mono, 8000);
        audio.channel_mut(0).fill(0.25);

        let (left, right) = PcmChunks::new(&audio, 1152).next().unwrap();
        assert_eq!(left, right);
        assert_eq!(left[0], 8191);
    }

    #[test]
    fn test_empty_buffer_has_no_chunks() {
        let audio = AudioBuffer::new(0, ChannelLayout::Stereo, 8000);
        assert_eq!(PcmChunks::new(&audio, 1152).count(), 0);
    }
}
