//! Stream sessions
//!
//! A session owns one decode pass over one byte channel: it drives the
//! frame decoder, dispatches frames in arrival order, and settles in
//! exactly one of completed / errored / cancelled.

use std::fmt::Display;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::decoder::FrameDecoder;
use super::frame::Frame;
use crate::config::StreamConfig;

/// Callbacks for one generation stream
///
/// `on_complete` and `on_error` are mutually exclusive and fire at most
/// once per session; after cancellation nothing fires at all.
pub trait StreamObserver {
    /// A decoded frame, in arrival order
    fn on_frame(&mut self, frame: Frame);
    /// The stream ended (final frame seen, or the channel closed cleanly)
    fn on_complete(&mut self);
    /// The transport failed; the session is over
    fn on_error(&mut self, message: String);
}

/// Stream lifecycle events for channel-based consumers
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Frame(Frame),
    Completed,
    Error(String),
}

/// Forwards callbacks into an unbounded channel; send failures mean the
/// consumer went away and are ignored
impl StreamObserver for mpsc::UnboundedSender<StreamEvent> {
    fn on_frame(&mut self, frame: Frame) {
        let _ = self.send(StreamEvent::Frame(frame));
    }

    fn on_complete(&mut self) {
        let _ = self.send(StreamEvent::Completed);
    }

    fn on_error(&mut self, message: String) {
        let _ = self.send(StreamEvent::Error(message));
    }
}

/// One cancellable decode pass over one byte channel
pub struct StreamSession {
    cancel: CancellationToken,
    config: StreamConfig,
}

impl StreamSession {
    pub fn new() -> Self {
        Self::with_config(StreamConfig::default())
    }

    pub fn with_config(config: StreamConfig) -> Self {
        Self {
            cancel: CancellationToken::new(),
            config,
        }
    }

    /// Token the caller keeps to cancel this session
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive the channel to completion, dispatching into `observer`
    ///
    /// Consumes the session: one session, one pass. Cancellation wins over
    /// pending reads and suppresses every later callback.
    pub async fn run<S, B, E, O>(self, mut channel: S, observer: &mut O)
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
        O: StreamObserver,
    {
        let mut decoder = match self.config.max_unit_bytes {
            Some(cap) => FrameDecoder::with_max_unit_bytes(cap),
            None => FrameDecoder::new(),
        };
        let idle = self.config.idle_timeout();
        let mut delivered = 0usize;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("Stream session cancelled after {} frames", delivered);
                    return;
                }
                _ = idle_wait(idle) => {
                    warn!("Stream idle timeout after {} frames", delivered);
                    observer.on_error(format!(
                        "stream idle timeout after {:?}",
                        idle.unwrap_or_default()
                    ));
                    return;
                }
                next = channel.next() => match next {
                    Some(Ok(chunk)) => {
                        let frames = decoder.feed(chunk.as_ref());
                        match dispatch(frames, observer, &self.cancel, &mut delivered) {
                            Dispatch::Pending => {}
                            Dispatch::Completed => {
                                info!("Stream finished after {} frames", delivered);
                                return;
                            }
                            Dispatch::Cancelled => return,
                        }
                    }
                    Some(Err(e)) => {
                        warn!("Stream transport error after {} frames: {}", delivered, e);
                        observer.on_error(e.to_string());
                        return;
                    }
                    None => {
                        // A close without the sentinel still ends the stream cleanly
                        let frames = decoder.flush();
                        match dispatch(frames, observer, &self.cancel, &mut delivered) {
                            Dispatch::Pending => observer.on_complete(),
                            Dispatch::Completed | Dispatch::Cancelled => {}
                        }
                        info!("Stream channel closed after {} frames", delivered);
                        return;
                    }
                },
            }
        }
    }
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

async fn idle_wait(window: Option<Duration>) {
    match window {
        Some(window) => tokio::time::sleep(window).await,
        None => std::future::pending::<()>().await,
    }
}

enum Dispatch {
    /// All frames delivered, none final
    Pending,
    /// Final frame delivered and `on_complete` fired
    Completed,
    /// Cancellation observed mid-batch; remaining frames dropped
    Cancelled,
}

/// Deliver decoded frames in order, stopping at the final frame or at a
/// cancellation observed between frames
fn dispatch<O: StreamObserver>(
    frames: Vec<Frame>,
    observer: &mut O,
    cancel: &CancellationToken,
    delivered: &mut usize,
) -> Dispatch {
    let mut frames = frames.into_iter();
    while let Some(frame) = frames.next() {
        if cancel.is_cancelled() {
            debug!("Cancelled mid-batch, dropping {} frames", 1 + frames.count());
            return Dispatch::Cancelled;
        }
        let is_final = frame.is_final;
        *delivered += 1;
        observer.on_frame(frame);
        if is_final {
            observer.on_complete();
            let undelivered = frames.count();
            if undelivered > 0 {
                debug!("Dropping {} frames decoded after the final frame", undelivered);
            }
            return Dispatch::Completed;
        }
    }
    Dispatch::Pending
}
