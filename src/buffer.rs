use bitflags::bitflags;
use std::{convert::TryFrom, fmt, os::unix::io::RawFd};

use crate::error::{Error, ErrorKind};
use crate::memory::Memory;
use crate::timestamp::Timestamp;
use crate::v4l2::videodev::v4l2_buffer;

bitflags! {
    #[allow(clippy::unreadable_literal)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u32 {
        /// Buffer is mapped
        const MAPPED                = 0x00000001;
        /// Buffer is queued for processing
        const QUEUED                = 0x00000002;
        /// Buffer is ready
        const DONE                  = 0x00000004;
        /// Image is a keyframe (I-frame)
        const KEYFRAME              = 0x00000008;
        /// Image is a P-frame
        const PFRAME                = 0x00000010;
        /// Image is a B-frame
        const BFRAME                = 0x00000020;
        /// Buffer is ready, but the data contained within is corrupted
        const ERROR                 = 0x00000040;
        /// Buffer is added to an unqueued request
        const IN_REQUEST            = 0x00000080;
        /// Timecode field is valid
        const TIMECODE              = 0x00000100;
        /// Don't return the capture buffer until OUTPUT timestamp changes
        const M2M_HOLD_CAPTURE_BUF  = 0x00000200;
        /// Buffer is prepared for queuing
        const PREPARED              = 0x00000400;
        /// Cache handling flags
        const NO_CACHE_INVALIDATE   = 0x00000800;
        const NO_CACHE_CLEAN        = 0x00001000;
        /// Timestamp type
        const TIMESTAMP_MONOTONIC   = 0x00002000;
        const TIMESTAMP_COPY        = 0x00004000;
        /// Timestamp sources
        const TSTAMP_SRC_SOE        = 0x00010000;
        /// mem2mem encoder/decoder
        const LAST                  = 0x00100000;
        /// request_fd is valid
        const REQUEST_FD            = 0x00800000;
    }
}

impl From<u32> for Flags {
    fn from(flags: u32) -> Self {
        Self::from_bits_retain(flags)
    }
}

impl From<Flags> for u32 {
    fn from(flags: Flags) -> Self {
        flags.bits()
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where the payload of a buffer lives
///
/// This is the `m` union of `struct v4l2_buffer`, resolved by the memory type the buffer was
/// requested with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Offset to pass to mmap(2) for [`Memory::Mmap`] buffers
    Offset(u32),
    /// Userspace address for [`Memory::UserPtr`] buffers
    UserPtr(usize),
    /// DMA-BUF file descriptor for [`Memory::DmaBuf`] buffers
    Fd(RawFd),
    /// Overlay buffers carry no location
    None,
}

/// Buffer description as reported by the driver for a single call
///
/// Every query, queue and dequeue returns a fresh descriptor; nothing in it stays valid once the
/// buffer changes hands again.
#[derive(Debug, Clone, Copy)]
pub struct Descriptor {
    /// Index of the buffer in the pool
    pub index: u32,
    /// Number of bytes holding payload
    pub bytesused: u32,
    /// Buffer flags
    pub flags: Flags,
    /// Field order
    pub field: u32,
    /// Time of capture (usually set by the driver)
    pub timestamp: Timestamp,
    /// Sequence number, counting the frames
    pub sequence: u32,
    /// Memory type the buffer was allocated with
    pub memory: Memory,
    /// Location of the payload
    pub location: Location,
    /// Size of the buffer (not the payload) in bytes
    pub length: u32,
}

impl Descriptor {
    /// Returns a descriptor for a memory-mapped buffer
    ///
    /// # Arguments
    ///
    /// * `index` - Buffer index
    /// * `offset` - Map offset reported by the driver
    /// * `length` - Size of the buffer
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_stream::buffer::{Descriptor, Location};
    ///
    /// let desc = Descriptor::mapped(2, 0x2000, 614400);
    /// assert_eq!(desc.location, Location::Offset(0x2000));
    /// ```
    pub fn mapped(index: u32, offset: u32, length: u32) -> Self {
        Descriptor {
            index,
            bytesused: 0,
            flags: Flags::MAPPED,
            field: 0,
            timestamp: Timestamp::default(),
            sequence: 0,
            memory: Memory::Mmap,
            location: Location::Offset(offset),
            length,
        }
    }

    /// Whether the driver marked the payload as corrupted
    pub fn is_corrupt(&self) -> bool {
        self.flags.contains(Flags::ERROR)
    }
}

impl TryFrom<v4l2_buffer> for Descriptor {
    type Error = Error;

    fn try_from(buf: v4l2_buffer) -> Result<Self, Self::Error> {
        let memory = Memory::try_from(buf.memory).map_err(|_| Error::Buffer {
            index: buf.index,
            reason: "unknown memory type",
            kind: ErrorKind::System,
        })?;

        // the union member is selected by the memory type
        let location = unsafe {
            match memory {
                Memory::Mmap => Location::Offset(buf.m.offset),
                Memory::UserPtr => Location::UserPtr(buf.m.userptr as usize),
                Memory::DmaBuf => Location::Fd(buf.m.fd),
                Memory::Overlay => Location::None,
            }
        };

        Ok(Descriptor {
            index: buf.index,
            bytesused: buf.bytesused,
            flags: Flags::from(buf.flags),
            field: buf.field,
            timestamp: buf.timestamp.into(),
            sequence: buf.sequence,
            memory,
            location,
            length: buf.length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v4l2::videodev::V4L2_MEMORY_MMAP;

    #[test]
    fn decode_mapped_buffer() {
        let mut raw = v4l2_buffer::capture(V4L2_MEMORY_MMAP);
        raw.index = 2;
        raw.bytesused = 614400;
        raw.length = 614400;
        raw.flags = 0x0000_2005;
        raw.sequence = 7;
        raw.m.offset = 0x0009_6000;

        let desc = Descriptor::try_from(raw).unwrap();
        assert_eq!(desc.index, 2);
        assert_eq!(desc.bytesused, 614400);
        assert_eq!(desc.memory, Memory::Mmap);
        assert_eq!(desc.location, Location::Offset(0x0009_6000));
        assert!(desc.flags.contains(Flags::MAPPED | Flags::DONE));
        assert!(!desc.is_corrupt());
    }

    #[test]
    fn decode_dmabuf_location() {
        let mut raw = v4l2_buffer::capture(4);
        raw.m.fd = 17;

        let desc = Descriptor::try_from(raw).unwrap();
        assert_eq!(desc.location, Location::Fd(17));
    }

    #[test]
    fn reject_unknown_memory() {
        let raw = v4l2_buffer::capture(9);
        let err = Descriptor::try_from(raw).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::System);
    }

    #[test]
    fn unknown_flags_survive() {
        let flags = Flags::from(0x4000_0040);
        assert!(flags.contains(Flags::ERROR));
        assert_eq!(u32::from(flags), 0x4000_0040);
    }
}
