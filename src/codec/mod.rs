//! Streaming Encoder Module
//!
//! The rendered PCM is pushed through a dedicated encoder thread in
//! MPEG-frame-sized chunks over bounded channels:
//! - `pcm`: float to 16-bit conversion and chunking
//! - `worker`: the encoder thread and its message loop
//! - `mp3` / `wav`: frame encoders run inside the worker
//! - `encoder`: the caller-side pump with backpressure and watchdog

pub mod encoder;
pub mod mp3;
pub mod pcm;
pub mod wav;
pub mod worker;

pub use encoder::StreamingEncoder;
pub use worker::{EncoderFactory, EncoderWorker, FrameEncoder};

/// Encoder parameters sent with the `Init` message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub num_channels: u8,
    pub sample_rate: u32,
    pub bitrate_kbps: u32,
}

/// Messages from the caller to the encoder thread
#[derive(Debug)]
pub enum EncoderRequest {
    /// Open the encoder; answered by `Inited` or `Error`
    Init(EncoderSettings),
    /// One chunk of 16-bit PCM; answered by zero or more `Data`
    Encode { left: Vec<i16>, right: Vec<i16> },
    /// No more chunks; answered by `Done`, after which the thread exits
    Flush,
}

/// Messages from the encoder thread back to the caller
#[derive(Debug, PartialEq, Eq)]
pub enum EncoderReply {
    Inited,
    Data { buffer: Vec<u8> },
    Done { buffer: Vec<u8> },
    /// Terminal; the caller tears the worker down
    Error { message: String },
}

/// Pump progress, reported after every chunk handed to the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeProgress {
    pub frames_sent: usize,
    pub total_frames: usize,
}

impl EncodeProgress {
    /// Completed fraction in `[0, 1]`
    pub fn fraction(&self) -> f32 {
        if self.total_frames == 0 {
            return 1.0;
        }
        self.frames_sent as f32 / self.total_frames as f32
    }
}
