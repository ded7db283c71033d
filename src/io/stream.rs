use std::{sync::Arc, time::Duration};

use log::{debug, trace, warn};

use crate::buffer::Descriptor;
use crate::config::StreamConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::io::arena::{Arena, MappedBuffer};
use crate::io::queue::{Queue, State};
use crate::io::Driver;

/// Stream of mapped buffers
///
/// An arena instance is used internally for buffer handling, a [`Queue`] tracks which side owns
/// each buffer. Dropping an active stream turns streaming off before the buffers are unmapped.
pub struct Stream<D: Driver> {
    driver: Arc<D>,
    queue: Queue,
    arena: Arena<D>,
    timeout: Duration,
    active: bool,
    // buffer handed out by `next`, requeued on the following call
    pending: Option<u32>,
}

impl<D: Driver> Stream<D> {
    /// Returns a stream for frame capturing
    ///
    /// Allocates and maps `count` buffers (or as many as the driver grants).
    ///
    /// # Arguments
    ///
    /// * `driver` - Driver of the device to stream from
    /// * `count` - Desired number of buffers
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use v4l_stream::io::Stream;
    /// use v4l_stream::Device;
    ///
    /// let dev = Arc::new(Device::new(0)?);
    /// let stream = Stream::with_buffers(dev, 4)?;
    /// # Ok::<(), v4l_stream::Error>(())
    /// ```
    pub fn with_buffers(driver: Arc<D>, count: u32) -> Result<Self> {
        let mut arena = Arena::new(driver.clone());
        let granted = arena.allocate(count)?;

        Ok(Stream {
            driver,
            queue: Queue::new(granted as usize),
            arena,
            timeout: StreamConfig::DEFAULT_TIMEOUT,
            active: false,
            pending: None,
        })
    }

    /// Whether streaming is currently turned on
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Sets the readiness wait window used by [`Stream::wait`] and [`Stream::next`]
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of buffers in the pool
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Returns the buffer pool
    pub fn arena(&self) -> &Arena<D> {
        &self.arena
    }

    pub fn state(&self, index: u32) -> Option<State> {
        self.queue.state(index)
    }

    /// Get the buffer at the specified index
    pub fn get(&self, index: u32) -> Option<&MappedBuffer> {
        self.arena.get(index)
    }

    /// Queues every free buffer and turns streaming on
    ///
    /// If streaming cannot be turned on, the driver is told to drop the queued buffers again.
    pub fn start(&mut self) -> Result<()> {
        if self.active {
            return Ok(());
        }

        let free: Vec<u32> = self.queue.indices(State::Free).collect();
        let started = free
            .into_iter()
            .try_for_each(|index| self.queue(index))
            .and_then(|_| self.driver.stream_on());

        if let Err(e) = started {
            // stream-off also dequeues everything the driver holds
            if let Err(off_err) = self.driver.stream_off() {
                warn!("failed to reset queue after failed start: {}", off_err);
            }
            self.queue.reset();
            return Err(e);
        }

        self.active = true;
        debug!("stream on with {} buffers queued", self.queue.queued());
        Ok(())
    }

    /// Turns streaming off
    ///
    /// The driver implicitly hands every buffer back, so all buffers are free afterwards.
    pub fn stop(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }

        self.driver.stream_off()?;
        self.active = false;
        self.pending = None;
        self.queue.reset();
        debug!("stream off");
        Ok(())
    }

    /// Insert a buffer into the drivers' incoming queue
    pub fn queue(&mut self, index: u32) -> Result<()> {
        self.queue.check_enqueue(index)?;
        self.driver
            .queue_buffer(index)
            .map_err(|e| e.with_index(index))?;
        self.queue.enqueue(index)?;

        if self.pending == Some(index) {
            self.pending = None;
        }
        Ok(())
    }

    /// Remove a buffer from the drivers' outgoing queue
    ///
    /// Does not block. The returned index is checked against the pool before it is trusted.
    pub fn dequeue(&mut self) -> Result<Descriptor> {
        let desc = self.driver.dequeue_buffer()?;
        self.queue.complete(desc.index)?;

        if desc.is_corrupt() {
            warn!("buffer {} flagged as corrupted by the driver", desc.index);
        }
        trace!(
            "dequeued buffer {} seq {} ({} bytes)",
            desc.index,
            desc.sequence,
            desc.bytesused
        );
        Ok(desc)
    }

    /// Block until a filled buffer can be dequeued or the timeout passed
    pub fn wait(&self) -> Result<()> {
        self.driver.wait_readable(self.timeout)
    }

    /// Payload of a dequeued buffer
    ///
    /// Only buffers in the [`State::Ready`] state have a payload. The length is clamped to the
    /// mapped size.
    pub fn payload(&self, desc: &Descriptor) -> Result<&[u8]> {
        if self.queue.state(desc.index) != Some(State::Ready) {
            return Err(Error::Buffer {
                index: desc.index,
                reason: "buffer holds no frame",
                kind: ErrorKind::BadArgument,
            });
        }

        let buf = self.arena.get(desc.index).ok_or(Error::Buffer {
            index: desc.index,
            reason: "buffer is not mapped",
            kind: ErrorKind::System,
        })?;

        let data = buf.data();
        let used = desc.bytesused as usize;
        if used > data.len() {
            warn!(
                "buffer {} reports {} bytes used but maps {}",
                desc.index,
                used,
                data.len()
            );
        }
        Ok(&data[..used.min(data.len())])
    }

    /// Fetch a new frame
    ///
    /// The buffer returned by the previous call is requeued first, streaming is started if
    /// necessary. The returned slice borrows the mapped memory, so it cannot outlive the next
    /// call.
    pub fn next(&mut self) -> Result<(&[u8], Descriptor)> {
        if !self.active {
            self.start()?;
        } else if let Some(index) = self.pending {
            // stays pending until the driver accepted it, so a failed requeue can be retried
            self.queue(index)?;
        }

        let desc = loop {
            self.wait()?;
            match self.dequeue() {
                Ok(desc) => break desc,
                // woken up without a buffer, e.g. an event
                Err(e) if e.kind() == ErrorKind::Temporary => continue,
                Err(e) => return Err(e),
            }
        };
        self.pending = Some(desc.index);

        Ok((self.payload(&desc)?, desc))
    }

    /// Turns streaming off, unmaps every buffer and frees them in the driver
    ///
    /// If streaming cannot be turned off, the buffers are left mapped.
    pub fn release(mut self) -> Result<()> {
        self.stop()?;
        self.arena.release()
    }
}

impl<D: Driver> Drop for Stream<D> {
    fn drop(&mut self) {
        // the arena is dropped (and unmapped) after this, so streaming must be off by then
        if let Err(e) = self.stop() {
            // device vanished, nothing left to stop
            if e.raw_os_error() == Some(libc::ENODEV) {
                return;
            }
            // the driver may still write into queued buffers, they must stay mapped
            warn!("failed to stop stream, leaving buffers mapped: {}", e);
            self.arena.abandon();
        }
    }
}
