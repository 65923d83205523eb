//! Gapless queue of audio sources.
//!
//! The producer side ([`QueueHandle`]) appends ready-made sources; the
//! consumer side ([`StreamQueue`]) is itself an [`AudioSource`] that plays
//! them back to back and pads with silence whenever nothing is queued.
//!
//! The two sides talk over an unbounded channel, so appending never waits on
//! the real-time consumer and the consumer never takes a lock: it owns the
//! source it is currently playing and only touches the channel, with a
//! non-blocking `try_recv`, when that source runs dry.

use crate::audio::source::{AudioSource, Frame, SILENCE};
use crate::error::{PromtuneError, Result};
use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

enum Entry {
    Source(Box<dyn AudioSource>),
    /// Fired once every entry queued before it has been consumed.
    Drained(oneshot::Sender<()>),
}

/// Counters shared by both sides of the queue.
#[derive(Debug, Default)]
pub struct QueueStats {
    appended: AtomicU64,
    consumed: AtomicU64,
    underruns: AtomicU64,
}

impl QueueStats {
    /// Sources appended so far.
    pub fn appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }

    /// Sources played to exhaustion and dropped.
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    /// Pulls padded with silence before the queue finished.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

/// Create a connected producer handle and consumer queue.
pub fn stream_queue() -> (QueueHandle, StreamQueue) {
    let (tx, rx) = unbounded();
    let stats = Arc::new(QueueStats::default());
    (
        QueueHandle {
            tx,
            stats: Arc::clone(&stats),
        },
        StreamQueue {
            rx,
            current: None,
            finished: false,
            stats,
        },
    )
}

/// Producer side of the stream queue.
#[derive(Clone)]
pub struct QueueHandle {
    tx: Sender<Entry>,
    stats: Arc<QueueStats>,
}

impl QueueHandle {
    /// Append sources to the back of the queue, preserving their order.
    ///
    /// # Errors
    /// Returns `PlaybackInterrupted` if the consumer side has been dropped.
    pub fn append<I>(&self, sources: I) -> Result<()>
    where
        I: IntoIterator<Item = Box<dyn AudioSource>>,
    {
        for source in sources {
            self.tx
                .send(Entry::Source(source))
                .map_err(|_| PromtuneError::PlaybackInterrupted)?;
            self.stats.appended.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Append a single source.
    pub fn push<S: AudioSource + 'static>(&self, source: S) -> Result<()> {
        self.append([Box::new(source) as Box<dyn AudioSource>])
    }

    /// Mark the end of the stream.
    ///
    /// The returned future resolves once the consumer has played everything
    /// appended before this call.
    pub fn finish(&self) -> Drained {
        let (tx, rx) = oneshot::channel();
        // If the consumer is gone the sender is dropped here and `Drained`
        // resolves to `PlaybackInterrupted`.
        self.tx.send(Entry::Drained(tx)).ok();
        Drained { rx }
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

/// Completion future returned by [`QueueHandle::finish`].
pub struct Drained {
    rx: oneshot::Receiver<()>,
}

impl Future for Drained {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.map_err(|_| PromtuneError::PlaybackInterrupted))
    }
}

/// Consumer side of the stream queue.
pub struct StreamQueue {
    rx: Receiver<Entry>,
    current: Option<Box<dyn AudioSource>>,
    finished: bool,
    stats: Arc<QueueStats>,
}

impl StreamQueue {
    /// Make the next queued source current, firing any completion markers
    /// passed on the way. Returns false if nothing is queued.
    fn advance(&mut self) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(Entry::Source(source)) => {
                    self.current = Some(source);
                    return true;
                }
                Ok(Entry::Drained(done)) => {
                    self.finished = true;
                    done.send(()).ok();
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn fill_silence(&mut self, buf: &mut [Frame]) {
        buf.fill(SILENCE);
        if !self.finished {
            self.stats.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

impl AudioSource for StreamQueue {
    /// Always fills the whole buffer.
    fn produce(&mut self, buf: &mut [Frame]) -> (usize, bool) {
        let mut filled = 0;
        while filled < buf.len() {
            if self.current.is_none() && !self.advance() {
                self.fill_silence(&mut buf[filled..]);
                break;
            }

            let Some(source) = self.current.as_mut() else {
                break;
            };
            let (n, more) = source.produce(&mut buf[filled..]);
            filled += n;

            if !more {
                self.current = None;
                self.stats.consumed.fetch_add(1, Ordering::Relaxed);
            } else if n == 0 {
                // Source has nothing right now but is not done; keep it and pad.
                self.fill_silence(&mut buf[filled..]);
                break;
            }
        }
        (buf.len(), true)
    }
}
