//! Caller-side encode pump
//!
//! Converts the rendered buffer to 16-bit chunks and feeds them to the
//! encoder thread. Sends never block: when the request queue is full the
//! pump drains replies for a short slice and retries, so neither side can
//! wedge the other. A watchdog fails the export when the worker makes no
//! progress for `timeout`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, TrySendError};
use log::{debug, info, warn};

use super::mp3::Mp3FrameEncoder;
use super::pcm::PcmChunks;
use super::wav::WavFrameEncoder;
use super::worker::{EncoderFactory, EncoderWorker, FrameEncoder};
use super::{EncodeProgress, EncoderReply, EncoderRequest, EncoderSettings};
use crate::config::ExportConfig;
use crate::engine::renderer::RenderedAudio;
use crate::error::{ExportError, Result};
use crate::model::OutputFormat;

/// How long one drain slice waits for a reply while the queue is full
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Factory for the frame encoder of an output format
pub fn factory_for(format: OutputFormat) -> EncoderFactory {
    match format {
        OutputFormat::Mp3 => Box::new(|settings: &EncoderSettings| {
            Mp3FrameEncoder::new(settings).map(|e| Box::new(e) as Box<dyn FrameEncoder>)
        }),
        OutputFormat::Wav => Box::new(|settings: &EncoderSettings| {
            Ok(Box::new(WavFrameEncoder::new(settings)) as Box<dyn FrameEncoder>)
        }),
    }
}

/// Chunked encoder front-end
#[derive(Debug, Clone)]
pub struct StreamingEncoder {
    chunk_frames: usize,
    queue_depth: usize,
    timeout: Duration,
    cancel: Option<Arc<AtomicBool>>,
}

impl StreamingEncoder {
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            chunk_frames: config.chunk_frames,
            queue_depth: config.queue_depth,
            timeout: config.encoder_timeout(),
            cancel: None,
        }
    }

    /// Abort the pump when `flag` becomes true
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Override the watchdog interval
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Encode the rendered audio into a complete file
    ///
    /// # Errors
    /// * `EncoderInit` - The worker could not open the encoder
    /// * `EncoderRuntime` - The worker failed or vanished mid-stream
    /// * `TimedOut` - No reply within the watchdog interval
    /// * `Cancelled` - The cancel flag was raised
    pub fn encode(
        &self,
        rendered: &RenderedAudio,
        format: OutputFormat,
        bitrate_kbps: u32,
    ) -> Result<Vec<u8>> {
        self.encode_with(rendered, format, bitrate_kbps, factory_for(format), |_| {})
    }

    /// Same as [`encode`](Self::encode), reporting progress after each chunk
    pub fn encode_with_progress<F>(
        &self,
        rendered: &RenderedAudio,
        format: OutputFormat,
        bitrate_kbps: u32,
        progress: F,
    ) -> Result<Vec<u8>>
    where
        F: FnMut(EncodeProgress),
    {
        self.encode_with(rendered, format, bitrate_kbps, factory_for(format), progress)
    }

    /// Run the pump against an arbitrary frame encoder
    pub fn encode_with<F>(
        &self,
        rendered: &RenderedAudio,
        format: OutputFormat,
        bitrate_kbps: u32,
        factory: EncoderFactory,
        progress: F,
    ) -> Result<Vec<u8>>
    where
        F: FnMut(EncodeProgress),
    {
        let settings = EncoderSettings {
            num_channels: rendered.channels().min(2) as u8,
            sample_rate: rendered.sample_rate(),
            bitrate_kbps,
        };
        info!(
            "Encoding {} frames to {} ({} kbps, {}-frame chunks)",
            rendered.frames(),
            format,
            bitrate_kbps,
            self.chunk_frames
        );

        let worker = EncoderWorker::spawn(factory, self.queue_depth)?;
        let mut pump = Pump {
            worker: &worker,
            timeout: self.timeout,
            cancel: self.cancel.as_deref(),
            last_progress: Instant::now(),
            inited: false,
            output: Vec::new(),
        };

        let result = pump.run(rendered, settings, self.chunk_frames, progress);
        match &result {
            Ok(bytes) => debug!("Encoder produced {} bytes", bytes.len()),
            Err(e) => warn!("Encoding aborted: {}", e),
        }
        worker.terminate();
        result
    }
}

/// State of one encode run
struct Pump<'a> {
    worker: &'a EncoderWorker,
    timeout: Duration,
    cancel: Option<&'a AtomicBool>,
    last_progress: Instant,
    inited: bool,
    output: Vec<u8>,
}

impl Pump<'_> {
    fn run<F>(
        &mut self,
        rendered: &RenderedAudio,
        settings: EncoderSettings,
        chunk_frames: usize,
        mut progress: F,
    ) -> Result<Vec<u8>>
    where
        F: FnMut(EncodeProgress),
    {
        self.send(EncoderRequest::Init(settings))?;
        while !self.inited {
            if self.wait_reply("encoder init")? {
                return Err(self.vanished());
            }
        }

        let total_frames = rendered.frames();
        let mut frames_sent = 0;
        for (left, right) in PcmChunks::new(&rendered.audio, chunk_frames) {
            let frames = left.len();
            self.send(EncoderRequest::Encode { left, right })?;
            frames_sent += frames;
            progress(EncodeProgress {
                frames_sent,
                total_frames,
            });
            self.drain()?;
        }

        self.send(EncoderRequest::Flush)?;
        loop {
            if self.wait_reply("encoder flush")? {
                return Ok(std::mem::take(&mut self.output));
            }
        }
    }

    fn check_cancel(&self) -> Result<()> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::SeqCst) => Err(ExportError::Cancelled),
            _ => Ok(()),
        }
    }

    fn check_deadline(&self, stage: &'static str) -> Result<()> {
        if self.last_progress.elapsed() >= self.timeout {
            return Err(ExportError::TimedOut {
                stage,
                after: self.timeout,
            });
        }
        Ok(())
    }

    /// Queue a request, draining replies while the queue is full
    fn send(&mut self, request: EncoderRequest) -> Result<()> {
        let worker = self.worker;
        let requests = worker.requests().ok_or_else(|| self.vanished())?;
        let mut pending = request;
        loop {
            self.check_cancel()?;
            match requests.try_send(pending) {
                Ok(()) => {
                    self.last_progress = Instant::now();
                    return Ok(());
                }
                Err(TrySendError::Full(back)) => {
                    pending = back;
                    self.wait_reply("encoder queue")?;
                }
                Err(TrySendError::Disconnected(_)) => {
                    // The worker may have left an Error behind before exiting
                    self.drain()?;
                    return Err(self.vanished());
                }
            }
        }
    }

    /// Wait one poll slice for a reply; true once `Done` has arrived
    fn wait_reply(&mut self, stage: &'static str) -> Result<bool> {
        self.check_cancel()?;
        let worker = self.worker;
        let replies = worker.replies().ok_or_else(|| self.vanished())?;
        match replies.recv_timeout(POLL_INTERVAL) {
            Ok(reply) => self.handle(reply),
            Err(RecvTimeoutError::Timeout) => {
                self.check_deadline(stage)?;
                Ok(false)
            }
            Err(RecvTimeoutError::Disconnected) => Err(self.vanished()),
        }
    }

    /// Collect every reply that is already waiting
    fn drain(&mut self) -> Result<()> {
        let worker = self.worker;
        let Some(replies) = worker.replies() else {
            return Ok(());
        };
        while let Ok(reply) = replies.try_recv() {
            self.handle(reply)?;
        }
        Ok(())
    }

    fn handle(&mut self, reply: EncoderReply) -> Result<bool> {
        self.last_progress = Instant::now();
        match reply {
            EncoderReply::Inited => {
                self.inited = true;
                Ok(false)
            }
            EncoderReply::Data { buffer } => {
                self.output.extend_from_slice(&buffer);
                Ok(false)
            }
            EncoderReply::Done { buffer } => {
                self.output.extend_from_slice(&buffer);
                Ok(true)
            }
            EncoderReply::Error { message } if self.inited => {
                Err(ExportError::EncoderRuntime { reason: message })
            }
            EncoderReply::Error { message } => Err(ExportError::EncoderInit { reason: message }),
        }
    }

    fn vanished(&self) -> ExportError {
        let reason = "encoder thread exited unexpectedly".to_string();
        if self.inited {
            ExportError::EncoderRuntime { reason }
        } else {
            ExportError::EncoderInit { reason }
        }
    }
}
