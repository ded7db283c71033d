use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use std::{fmt, mem};

use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, trace, warn};

use crate::buffer::{Descriptor, Flags};
use crate::config::{StreamConfig, TimeoutPolicy};
use crate::error::{Error, ErrorKind, Result};
use crate::io::pool::FramePool;
use crate::io::{Driver, Stream};
use crate::timestamp::Timestamp;

/// Cooperative cancellation signal for a capture loop
///
/// Clones share the same signal. Cancelling is permanent.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    cancelled: AtomicBool,
    // dropped on cancel, which wakes every receiver
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        CancelToken {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(tx)),
                signal: rx,
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        if let Ok(mut trigger) = self.inner.trigger.lock() {
            trigger.take();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Receiver that becomes ready (disconnected) once the token is cancelled
    fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    /// Sleeps for `duration` unless cancelled earlier; returns whether the token was cancelled
    fn sleep(&self, duration: Duration) -> bool {
        match self.signal().recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => self.is_cancelled(),
            _ => true,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A captured frame
///
/// Holds a copy of the payload, so it stays valid after the mapped buffer it was taken from has
/// been handed back to the driver. The storage returns to its [`FramePool`] on drop.
pub struct Frame {
    data: Vec<u8>,
    pool: Arc<FramePool>,
    /// Index of the buffer the frame was captured into
    pub index: u32,
    pub sequence: u32,
    pub timestamp: Timestamp,
    pub flags: Flags,
}

impl Frame {
    fn copy_from(pool: &Arc<FramePool>, payload: &[u8], desc: &Descriptor) -> Self {
        let mut data = pool.get(payload.len());
        data.copy_from_slice(payload);

        Frame {
            data,
            pool: pool.clone(),
            index: desc.index,
            sequence: desc.sequence,
            timestamp: desc.timestamp,
            flags: desc.flags,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether the driver flagged the payload as corrupted
    pub fn is_corrupt(&self) -> bool {
        self.flags.contains(Flags::ERROR)
    }

    /// Takes the payload out of the pool's reach
    pub fn into_vec(mut self) -> Vec<u8> {
        mem::take(&mut self.data)
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.pool.put(mem::take(&mut self.data));
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("sequence", &self.sequence)
            .field("timestamp", &self.timestamp)
            .field("flags", &self.flags)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Consumer side of a capture loop
///
/// Yields frames in capture order. When the loop ends on an error, that error is yielded once
/// after the last frame; the iterator then returns `None` for good.
pub struct Frames {
    frames: Receiver<Frame>,
    errors: Receiver<Error>,
    done: bool,
}

impl Frames {
    /// Waits at most `timeout` for the next item
    ///
    /// Returns `None` if nothing arrived in time and the loop is still running.
    pub fn next_timeout(&mut self, timeout: Duration) -> Option<Result<Frame>> {
        match self.frames.recv_timeout(timeout) {
            Ok(frame) => Some(Ok(frame)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => self.finish(),
        }
    }

    /// Number of frames waiting to be consumed
    pub fn pending(&self) -> usize {
        self.frames.len()
    }

    fn finish(&mut self) -> Option<Result<Frame>> {
        if self.done {
            return None;
        }
        self.done = true;
        self.errors.try_recv().ok().map(Err)
    }
}

impl Iterator for Frames {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.frames.recv() {
            Ok(frame) => Some(Ok(frame)),
            Err(_) => self.finish(),
        }
    }
}

struct Worker<D: Driver> {
    stream: Stream<D>,
    pool: Arc<FramePool>,
    frames: Sender<Frame>,
    errors: Sender<Error>,
    cancel: CancelToken,
    timeout_policy: TimeoutPolicy,
    frame_period: Option<Duration>,
}

/// Moves a started stream onto a capture thread
///
/// The hand-off channel holds one frame per buffer, so the loop blocks once it is that many
/// frames ahead of the consumer. Joining the returned handle gives the stream back.
pub(crate) fn spawn<D: Driver + 'static>(
    stream: Stream<D>,
    config: &StreamConfig,
    pool: Arc<FramePool>,
    cancel: CancelToken,
) -> Result<(JoinHandle<Stream<D>>, Frames)> {
    let (frame_tx, frame_rx) = bounded(stream.len());
    let (error_tx, error_rx) = bounded(1);

    let worker = Worker {
        stream,
        pool,
        frames: frame_tx,
        errors: error_tx,
        cancel,
        timeout_policy: config.timeout_policy,
        frame_period: config.frame_period(),
    };

    let handle = thread::Builder::new()
        .name("v4l-capture".into())
        .spawn(move || worker.run())
        .map_err(|e| Error::os("spawn capture thread", e))?;

    Ok((
        handle,
        Frames {
            frames: frame_rx,
            errors: error_rx,
            done: false,
        },
    ))
}

impl<D: Driver> Worker<D> {
    fn run(mut self) -> Stream<D> {
        debug!("capture loop started with {} buffers", self.stream.len());

        match self.capture() {
            Ok(()) => debug!("capture loop stopped"),
            Err(e) => {
                error!("capture loop terminated: {}", e);
                // capacity 1 and a single sender, this cannot block
                let _ = self.errors.try_send(e);
            }
        }

        // dropping the senders closes the frame sequence
        self.stream
    }

    fn capture(&mut self) -> Result<()> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let started = Instant::now();

            match self.stream.wait() {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Timeout => match self.timeout_policy {
                    TimeoutPolicy::Retry => {
                        warn!("{}, waiting again", e);
                        continue;
                    }
                    TimeoutPolicy::Abort => return Err(e),
                },
                Err(e) => return Err(e),
            }

            let desc = match self.stream.dequeue() {
                Ok(desc) => desc,
                Err(e) if e.kind() == ErrorKind::Temporary => {
                    trace!("dequeue not ready: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let frame = Frame::copy_from(&self.pool, self.stream.payload(&desc)?, &desc);
            // the copy is taken, the driver may refill the buffer
            self.stream.queue(desc.index)?;

            select! {
                send(self.frames, frame) -> res => {
                    if res.is_err() {
                        debug!("frame consumer went away");
                        return Ok(());
                    }
                }
                recv(self.cancel.signal()) -> _ => return Ok(()),
            }

            if let Some(period) = self.frame_period {
                let elapsed = started.elapsed();
                if elapsed < period && self.cancel.sleep(period - elapsed) {
                    return Ok(());
                }
            }
        }
    }
}
