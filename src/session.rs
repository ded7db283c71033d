use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, info, warn};

use crate::buffer::Descriptor;
use crate::capability::Capabilities;
use crate::config::StreamConfig;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::io::{capture, CancelToken, Driver, FramePool, Frames, Stream};

/// Lifecycle state of a [`Session`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Device is open, no buffers are allocated
    Opened,
    /// Buffers are mapped and streaming is on
    Streaming,
    /// Streaming is on and a capture thread owns the buffers
    Capturing,
    /// Device handle was released
    Closed,
}

impl State {
    fn as_str(&self) -> &'static str {
        match self {
            State::Opened => "opened",
            State::Streaming => "streaming",
            State::Capturing => "capturing",
            State::Closed => "closed",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capture session of a single device
///
/// Owns the device, the buffer pool and the streaming state, and enforces the order in which
/// they are set up and torn down: buffers are allocated and mapped before streaming is turned
/// on, and streaming is turned off before they are unmapped.
///
/// # Example
///
/// ```no_run
/// use v4l_stream::io::CancelToken;
/// use v4l_stream::{Session, StreamConfig};
///
/// let mut session = Session::open("/dev/video0", StreamConfig::default())?;
/// session.start_stream(4)?;
///
/// let cancel = CancelToken::new();
/// for frame in session.capture(cancel.clone())?.take(10) {
///     let frame = frame?;
///     println!("frame {}: {} bytes", frame.sequence, frame.len());
/// }
///
/// session.close()?;
/// # Ok::<(), v4l_stream::Error>(())
/// ```
pub struct Session<D: Driver = Device> {
    driver: Option<Arc<D>>,
    caps: Capabilities,
    config: StreamConfig,
    pool: Arc<FramePool>,

    stream: Option<Stream<D>>,
    worker: Option<JoinHandle<Stream<D>>>,
    cancel: Option<CancelToken>,
    state: State,
}

impl Session<Device> {
    /// Opens the device node at `path` for capturing
    pub fn open<P: AsRef<Path>>(path: P, config: StreamConfig) -> Result<Self> {
        let dev = Device::with_path(path)?;
        Self::with_driver(Arc::new(dev), config)
    }
}

impl<D: Driver> Session<D> {
    /// Wraps an already opened driver
    ///
    /// Fails with [`Error::Unsupported`] unless the device can capture video through streaming
    /// I/O.
    pub fn with_driver(driver: Arc<D>, config: StreamConfig) -> Result<Self> {
        let caps = driver.query_caps()?;
        if !caps.supports_capture() {
            return Err(Error::Unsupported("video capture"));
        }
        if !caps.supports_streaming() {
            return Err(Error::Unsupported("streaming I/O"));
        }
        info!("opened {} ({}) on {}", caps.card, caps.driver, caps.bus);

        Ok(Session {
            driver: Some(driver),
            caps,
            config,
            pool: Arc::new(FramePool::default()),
            stream: None,
            worker: None,
            cancel: None,
            state: State::Opened,
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Pool the captured frames are copied into
    pub fn frame_pool(&self) -> &Arc<FramePool> {
        &self.pool
    }

    fn expect_state(&self, op: &'static str, allowed: &[State]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::State {
                op,
                state: self.state.as_str(),
            })
        }
    }

    /// Starts streaming with the configured [`StreamConfig::buffer_count`]
    pub fn start(&mut self) -> Result<u32> {
        self.start_stream(self.config.buffer_count)
    }

    /// Allocates and maps `count` buffers, queues all of them and turns streaming on
    ///
    /// Returns the number of buffers granted by the driver. On failure nothing stays allocated.
    pub fn start_stream(&mut self, count: u32) -> Result<u32> {
        self.expect_state("start stream", &[State::Opened])?;
        let driver = match &self.driver {
            Some(driver) => driver.clone(),
            None => {
                return Err(Error::State {
                    op: "start stream",
                    state: State::Closed.as_str(),
                })
            }
        };

        let mut stream = Stream::with_buffers(driver, count)?;
        stream.set_timeout(self.config.timeout);

        if let Err(e) = stream.start() {
            if let Err(release_err) = stream.release() {
                warn!("failed to release buffers after failed start: {}", release_err);
            }
            return Err(e);
        }

        let granted = stream.len() as u32;
        self.stream = Some(stream);
        self.state = State::Streaming;
        debug!("streaming with {} buffers", granted);
        Ok(granted)
    }

    /// Fetches the next frame on the caller's thread without copying it
    ///
    /// The slice borrows the mapped buffer and is invalidated by the next call.
    pub fn next_frame(&mut self) -> Result<(&[u8], Descriptor)> {
        self.expect_state("read frame", &[State::Streaming])?;
        match self.stream.as_mut() {
            Some(stream) => stream.next(),
            None => Err(Error::State {
                op: "read frame",
                state: "stream is gone",
            }),
        }
    }

    /// Stops capturing, turns streaming off and unmaps all buffers
    ///
    /// A running capture thread is cancelled and joined first. This also cleans up after a
    /// capture loop that already ended on an error.
    pub fn stop_stream(&mut self) -> Result<()> {
        self.expect_state("stop stream", &[State::Streaming, State::Capturing])?;

        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(stream) => self.stream = Some(stream),
                Err(_) => {
                    // the stream was dropped while unwinding, which stopped and released it
                    self.state = State::Opened;
                    return Err(Error::Worker);
                }
            }
        }

        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = stream.stop() {
                // buffers stay mapped and owned by the session, stopping may be retried
                self.state = State::Streaming;
                return Err(e);
            }
        }

        self.state = State::Opened;
        match self.stream.take() {
            Some(stream) => stream.release(),
            None => Ok(()),
        }
    }

    /// Stops streaming if necessary and releases the device
    ///
    /// Calling this more than once is fine; it also runs on drop.
    pub fn close(&mut self) -> Result<()> {
        if self.state == State::Closed {
            return Ok(());
        }

        let stopped = match self.state {
            State::Streaming | State::Capturing => self.stop_stream(),
            _ => Ok(()),
        };

        // a stream that could not be stopped gives up its mappings when dropped
        self.stream = None;
        self.driver = None;
        self.state = State::Closed;
        debug!("session closed");
        stopped
    }
}

impl<D: Driver + 'static> Session<D> {
    /// Hands the stream to a capture thread and returns the frame sequence
    ///
    /// The sequence ends when `cancel` is triggered, when the session is stopped or when the
    /// loop fails; in the last case the error is its final item.
    pub fn capture(&mut self, cancel: CancelToken) -> Result<Frames> {
        self.expect_state("capture", &[State::Streaming])?;
        let stream = self.stream.take().ok_or(Error::State {
            op: "capture",
            state: "stream is gone",
        })?;

        let spawned = capture::spawn(stream, &self.config, self.pool.clone(), cancel.clone());
        let (worker, frames) = match spawned {
            Ok(spawned) => spawned,
            Err(e) => {
                // the stream was released when the thread could not take it
                self.state = State::Opened;
                return Err(e);
            }
        };

        self.worker = Some(worker);
        self.cancel = Some(cancel);
        self.state = State::Capturing;
        Ok(frames)
    }
}

impl<D: Driver> Drop for Session<D> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to close session: {}", e);
        }
    }
}
