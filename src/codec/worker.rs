//! Encoder thread
//!
//! Owns the frame encoder for one export. Requests are handled strictly in
//! arrival order and replies are sent in the same order, so `Data` payloads
//! concatenate into a valid stream with `Done` last. The thread exits after
//! `Done`, after an `Error`, or when the caller hangs up.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, warn};

use super::{EncoderReply, EncoderRequest, EncoderSettings};

/// Encoder running inside the worker thread
pub trait FrameEncoder {
    /// Encode one chunk, returning whatever bytes are ready (possibly none)
    fn encode(&mut self, left: &[i16], right: &[i16]) -> Result<Vec<u8>, String>;

    /// Finish the stream and return the remaining bytes
    fn flush(&mut self) -> Result<Vec<u8>, String>;
}

/// Builds the frame encoder once `Init` arrives
pub type EncoderFactory =
    Box<dyn FnOnce(&EncoderSettings) -> Result<Box<dyn FrameEncoder>, String> + Send>;

/// Handle to a running encoder thread
pub struct EncoderWorker {
    requests: Option<Sender<EncoderRequest>>,
    replies: Option<Receiver<EncoderReply>>,
    handle: Option<JoinHandle<()>>,
}

impl EncoderWorker {
    /// Start a worker with request and reply channels of `queue_depth` slots
    pub fn spawn(factory: EncoderFactory, queue_depth: usize) -> std::io::Result<Self> {
        let (request_tx, request_rx) = bounded(queue_depth.max(1));
        let (reply_tx, reply_rx) = bounded(queue_depth.max(1));

        let handle = thread::Builder::new()
            .name("blockmix-encoder".to_string())
            .spawn(move || run(factory, request_rx, reply_tx))?;

        Ok(Self {
            requests: Some(request_tx),
            replies: Some(reply_rx),
            handle: Some(handle),
        })
    }

    pub fn requests(&self) -> Option<&Sender<EncoderRequest>> {
        self.requests.as_ref()
    }

    pub fn replies(&self) -> Option<&Receiver<EncoderReply>> {
        self.replies.as_ref()
    }

    /// Hang up both channels and reap the thread if it has already stopped
    ///
    /// A thread stuck inside the encoder is detached rather than joined; it
    /// exits on its next channel operation.
    pub fn terminate(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.requests.take();
        self.replies.take();

        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                if handle.join().is_err() {
                    warn!("Encoder thread panicked");
                }
            } else {
                debug!("Detaching busy encoder thread");
            }
        }
    }
}

impl Drop for EncoderWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker message loop
fn run(factory: EncoderFactory, requests: Receiver<EncoderRequest>, replies: Sender<EncoderReply>) {
    let mut factory = Some(factory);
    let mut encoder: Option<Box<dyn FrameEncoder>> = None;

    for request in requests.iter() {
        let reply = match request {
            EncoderRequest::Init(settings) => match open(&mut factory, &settings) {
                Ok(opened) => {
                    debug!(
                        "Encoder opened: {} ch, {} Hz, {} kbps",
                        settings.num_channels, settings.sample_rate, settings.bitrate_kbps
                    );
                    encoder = Some(opened);
                    EncoderReply::Inited
                }
                Err(message) => EncoderReply::Error { message },
            },
            EncoderRequest::Encode { left, right } if left.len() != right.len() => {
                EncoderReply::Error {
                    message: format!(
                        "channel length mismatch: {} left vs {} right",
                        left.len(),
                        right.len()
                    ),
                }
            }
            EncoderRequest::Encode { left, right } => match encoder.as_mut() {
                Some(enc) => match enc.encode(&left, &right) {
                    Ok(buffer) if buffer.is_empty() => continue,
                    Ok(buffer) => EncoderReply::Data { buffer },
                    Err(message) => EncoderReply::Error { message },
                },
                None => EncoderReply::Error {
                    message: "encoder not initialized".to_string(),
                },
            },
            EncoderRequest::Flush => match encoder.as_mut() {
                Some(enc) => match enc.flush() {
                    Ok(buffer) => EncoderReply::Done { buffer },
                    Err(message) => EncoderReply::Error { message },
                },
                None => EncoderReply::Error {
                    message: "encoder not initialized".to_string(),
                },
            },
        };

        let terminal = matches!(reply, EncoderReply::Done { .. } | EncoderReply::Error { .. });
        if replies.send(reply).is_err() {
            debug!("Caller hung up, encoder thread exiting");
            return;
        }
        if terminal {
            return;
        }
    }
}

fn open(
    factory: &mut Option<EncoderFactory>,
    settings: &EncoderSettings,
) -> Result<Box<dyn FrameEncoder>, String> {
    let factory = factory
        .take()
        .ok_or_else(|| "encoder already initialized".to_string())?;
    if !(1..=2).contains(&settings.num_channels) {
        return Err(format!(
            "unsupported channel count {}",
            settings.num_channels
        ));
    }
    if settings.sample_rate == 0 {
        return Err("sample rate must be > 0".to_string());
    }
    factory(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Emits each chunk's first left sample as a byte
    struct Echo;

    impl FrameEncoder for Echo {
        fn encode(&mut self, left: &[i16], _right: &[i16]) -> Result<Vec<u8>, String> {
            Ok(left.first().map(|&s| vec![s as u8]).unwrap_or_default())
        }

        fn flush(&mut self) -> Result<Vec<u8>, String> {
            Ok(vec![0xFF])
        }
    }

    fn echo_factory() -> EncoderFactory {
        Box::new(|_| Ok(Box::new(Echo) as Box<dyn FrameEncoder>))
    }

    fn settings() -> EncoderSettings {
        EncoderSettings {
            num_channels: 2,
            sample_rate: 44_100,
            bitrate_kbps: 320,
        }
    }

    fn collect(worker: &EncoderWorker) -> Vec<EncoderReply> {
        worker.replies().unwrap().iter().collect()
    }

    #[test]
    fn test_replies_follow_request_order() {
        let worker = EncoderWorker::spawn(echo_factory(), 64).unwrap();
        let tx = worker.requests().unwrap();

        tx.send(EncoderRequest::Init(settings())).unwrap();
        for i in 1..=5_i16 {
            tx.send(EncoderRequest::Encode {
                left: vec![i; 4],
                right: vec![0; 4],
            })
            .unwrap();
        }
        // Empty chunk produces no Data
        tx.send(EncoderRequest::Encode {
            left: vec![],
            right: vec![],
        })
        .unwrap();
        tx.send(EncoderRequest::Flush).unwrap();

        let replies = collect(&worker);
        let mut expected = vec![EncoderReply::Inited];
        for i in 1..=5_u8 {
            expected.push(EncoderReply::Data { buffer: vec![i] });
        }
        expected.push(EncoderReply::Done { buffer: vec![0xFF] });
        assert_eq!(replies, expected);

        worker.terminate();
    }

    #[test]
    fn test_encode_before_init_is_an_error() {
        let worker = EncoderWorker::spawn(echo_factory(), 4).unwrap();
        worker
            .requests()
            .unwrap()
            .send(EncoderRequest::Encode {
                left: vec![1],
                right: vec![1],
            })
            .unwrap();

        let replies = collect(&worker);
        assert!(matches!(replies.as_slice(), [EncoderReply::Error { .. }]));
    }

    #[test]
    fn test_factory_error_is_reported() {
        let factory: EncoderFactory = Box::new(|_| Err("no codec".to_string()));
        let worker = EncoderWorker::spawn(factory, 4).unwrap();
        worker
            .requests()
            .unwrap()
            .send(EncoderRequest::Init(settings()))
            .unwrap();

        assert_eq!(
            collect(&worker),
            vec![EncoderReply::Error {
                message: "no codec".to_string()
            }]
        );
    }

    #[test]
    fn test_rejects_unsupported_channel_count() {
        let worker = EncoderWorker::spawn(echo_factory(), 4).unwrap();
        worker
            .requests()
            .unwrap()
            .send(EncoderRequest::Init(EncoderSettings {
                num_channels: 6,
                ..settings()
            }))
            .unwrap();

        assert!(matches!(collect(&worker).as_slice(), [EncoderReply::Error { .. }]));
    }

    #[test]
    fn test_terminate_without_flush() {
        let worker = EncoderWorker::spawn(echo_factory(), 4).unwrap();
        worker
            .requests()
            .unwrap()
            .send(EncoderRequest::Init(settings()))
            .unwrap();
        worker.terminate();
    }
}
