use std::time::Duration;

use crate::buffer::Descriptor;
use crate::capability::Capabilities;
use crate::error::Result;
use crate::memory::Mapping;

/// Kernel operations used by the streaming engine
///
/// Every method maps to exactly one driver call. All buffers are single-planar video capture
/// buffers using [`Memory::Mmap`], so no method takes a type or memory argument.
/// Implementations classify failures into [`ErrorKind`] and never return
/// [`ErrorKind::Interrupted`].
///
/// [`Memory::Mmap`]: crate::memory::Memory::Mmap
/// [`ErrorKind`]: crate::ErrorKind
/// [`ErrorKind::Interrupted`]: crate::ErrorKind::Interrupted
pub trait Driver: Send + Sync {
    /// Query device capabilities
    fn query_caps(&self) -> Result<Capabilities>;

    /// Request `count` buffers, returns the number actually granted
    ///
    /// A count of zero frees all buffers.
    fn request_buffers(&self, count: u32) -> Result<u32>;

    /// Describe an allocated buffer (offset and length for mapping)
    fn query_buffer(&self, index: u32) -> Result<Descriptor>;

    /// Hand a buffer to the driver to be filled
    fn queue_buffer(&self, index: u32) -> Result<Descriptor>;

    /// Take back a filled buffer
    ///
    /// Does not block; returns a [`ErrorKind::Temporary`] error if nothing is ready.
    ///
    /// [`ErrorKind::Temporary`]: crate::ErrorKind::Temporary
    fn dequeue_buffer(&self) -> Result<Descriptor>;

    fn stream_on(&self) -> Result<()>;

    fn stream_off(&self) -> Result<()>;

    /// Map `length` bytes at `offset` of the device memory into the process
    fn map(&self, offset: u32, length: usize) -> Result<Mapping>;

    /// Release a mapping created by [`Driver::map`]
    fn unmap(&self, mapping: Mapping) -> Result<()>;

    /// Block until a buffer can be dequeued or `timeout` passed
    ///
    /// Signals must not cut the wait short. A timeout is reported as
    /// [`Error::Timeout`](crate::Error::Timeout).
    fn wait_readable(&self, timeout: Duration) -> Result<()>;
}
