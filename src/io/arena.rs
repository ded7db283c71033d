use std::sync::Arc;

use log::{debug, warn};

use crate::buffer::Location;
use crate::error::{Error, ErrorKind, Result};
use crate::io::Driver;
use crate::memory::{Mapping, Memory};

/// Fewest buffers that still let the driver fill one while the application drains another
pub const MIN_BUFFERS: u32 = 2;

/// One memory-mapped buffer of a pool
#[derive(Debug)]
pub struct MappedBuffer {
    index: u32,
    mapping: Mapping,
}

impl MappedBuffer {
    /// Index of the buffer, stable for the lifetime of the pool
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Size of the mapped region
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// View of the whole mapped region
    pub fn data(&self) -> &[u8] {
        self.mapping.as_slice()
    }
}

/// Manage mapped buffers
///
/// The arena negotiates the pool size with the driver, maps every granted buffer and releases
/// both again. Buffers must only be released after streaming was turned off; [`Stream`] takes
/// care of that ordering.
///
/// [`Stream`]: crate::io::Stream
pub struct Arena<D: Driver> {
    driver: Arc<D>,
    bufs: Vec<MappedBuffer>,
    requested: u32,
    granted: u32,
}

impl<D: Driver> Arena<D> {
    /// Returns a new buffer manager instance
    ///
    /// You usually do not need to use this directly.
    /// A [`Stream`](crate::io::Stream) creates its own arena.
    ///
    /// # Arguments
    ///
    /// * `driver` - Driver of the device the buffers belong to
    pub fn new(driver: Arc<D>) -> Self {
        Arena {
            driver,
            bufs: Vec::new(),
            requested: 0,
            granted: 0,
        }
    }

    /// Negotiates the pool size and maps every granted buffer
    ///
    /// Returns the number of buffers granted by the driver. Nothing stays allocated on failure.
    pub fn allocate(&mut self, count: u32) -> Result<u32> {
        let granted = self.request(count)?;

        if let Err(e) = self.map_all() {
            self.free();
            return Err(e);
        }

        Ok(granted)
    }

    /// Asks the driver for `count` buffers and checks the grant
    ///
    /// The driver may grant fewer buffers than requested. A grant below [`MIN_BUFFERS`] is
    /// handed back to the driver and reported as [`Error::Capacity`].
    pub fn request(&mut self, count: u32) -> Result<u32> {
        if count == 0 {
            return Err(Error::Buffer {
                index: 0,
                reason: "at least one buffer must be requested",
                kind: ErrorKind::BadArgument,
            });
        }
        if self.granted != 0 {
            return Err(Error::State {
                op: "request buffers",
                state: "buffers are allocated",
            });
        }

        let granted = self.driver.request_buffers(count)?;
        debug!("requested {} buffers, driver granted {}", count, granted);

        if granted < MIN_BUFFERS {
            if granted > 0 {
                if let Err(e) = self.driver.request_buffers(0) {
                    warn!("failed to free insufficient buffer grant: {}", e);
                }
            }
            return Err(Error::Capacity {
                requested: count,
                granted,
            });
        }

        self.requested = count;
        self.granted = granted;
        Ok(granted)
    }

    /// Maps every granted buffer into the process
    ///
    /// If one buffer fails, the ones already mapped are unmapped again before returning.
    pub fn map_all(&mut self) -> Result<()> {
        if !self.bufs.is_empty() {
            return Err(Error::State {
                op: "map buffers",
                state: "buffers are mapped",
            });
        }

        for index in 0..self.granted {
            match self.map(index) {
                Ok(buf) => self.bufs.push(buf),
                Err(e) => {
                    if let Err(unmap_err) = self.unmap_all() {
                        warn!("failed to roll back partial mapping: {}", unmap_err);
                    }
                    return Err(e);
                }
            }
        }

        debug!("mapped {} buffers", self.bufs.len());
        Ok(())
    }

    fn map(&self, index: u32) -> Result<MappedBuffer> {
        let desc = self.driver.query_buffer(index)?;
        let offset = match desc.location {
            Location::Offset(offset) => offset,
            _ => {
                return Err(Error::Buffer {
                    index,
                    reason: "driver did not report a map offset",
                    kind: ErrorKind::System,
                })
            }
        };

        let mapping = self
            .driver
            .map(offset, desc.length as usize)
            .map_err(|e| e.with_index(index))?;

        Ok(MappedBuffer { index, mapping })
    }

    /// Unmaps every buffer
    ///
    /// All mappings are handed back even if some fail; the first error is returned.
    pub fn unmap_all(&mut self) -> Result<()> {
        let mut result = Ok(());
        for buf in self.bufs.drain(..) {
            let index = buf.index;
            if let Err(e) = self.driver.unmap(buf.mapping) {
                if result.is_ok() {
                    result = Err(e.with_index(index));
                }
            }
        }

        result
    }

    /// Unmaps all buffers and frees the driver allocation
    ///
    /// Streaming must be off. Calling this on an empty arena does nothing.
    pub fn release(&mut self) -> Result<()> {
        if self.granted == 0 && self.bufs.is_empty() {
            return Ok(());
        }

        let unmapped = self.unmap_all();

        // free all buffers by requesting 0
        let freed = self.driver.request_buffers(0).map(|_| ());
        self.granted = 0;
        debug!("released buffer pool");

        unmapped.and(freed)
    }

    /// Forgets every buffer without unmapping or freeing it
    ///
    /// Used when streaming could not be turned off; the mappings live on until the process exits.
    pub(crate) fn abandon(&mut self) {
        if !self.bufs.is_empty() {
            warn!("abandoning {} mapped buffers", self.bufs.len());
        }
        self.bufs.clear();
        self.granted = 0;
    }

    fn free(&mut self) {
        if let Err(e) = self.driver.request_buffers(0) {
            warn!("failed to free buffers: {}", e);
        }
        self.granted = 0;
    }

    /// Number of buffers granted by the driver
    pub fn len(&self) -> usize {
        self.granted as usize
    }

    pub fn is_empty(&self) -> bool {
        self.granted == 0
    }

    /// Number of buffers asked for in the last successful request
    pub fn requested(&self) -> u32 {
        self.requested
    }

    pub fn memory(&self) -> Memory {
        Memory::Mmap
    }

    /// Size of the largest buffer in bytes
    pub fn buffer_size(&self) -> usize {
        self.bufs.iter().map(MappedBuffer::len).max().unwrap_or(0)
    }

    pub fn get(&self, index: u32) -> Option<&MappedBuffer> {
        self.bufs.get(index as usize)
    }

    pub fn buffers(&self) -> &[MappedBuffer] {
        &self.bufs
    }
}

impl<D: Driver> Drop for Arena<D> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            // ENODEV means the device is gone (unplugged, bus reset) and took its buffers along
            if e.raw_os_error() != Some(libc::ENODEV) {
                warn!("failed to release buffers: {}", e);
            }
        }
    }
}
