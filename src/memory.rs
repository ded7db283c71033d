use std::{convert::TryFrom, fmt, ptr::NonNull, slice};

/// Memory used for buffer exchange
#[allow(clippy::unreadable_literal)]
#[rustfmt::skip]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Memory {
    Mmap        = 1,
    UserPtr     = 2,
    Overlay     = 3,
    DmaBuf      = 4,
}

impl TryFrom<u32> for Memory {
    type Error = ();

    fn try_from(repr: u32) -> Result<Self, Self::Error> {
        match repr {
            1 => Ok(Memory::Mmap),
            2 => Ok(Memory::UserPtr),
            3 => Ok(Memory::Overlay),
            4 => Ok(Memory::DmaBuf),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Memory::Mmap => write!(f, "memory-mapped"),
            Memory::UserPtr => write!(f, "user pointer"),
            Memory::Overlay => write!(f, "overlay"),
            Memory::DmaBuf => write!(f, "DMA buffered"),
        }
    }
}

/// Memory-mapped region
///
/// The backing memory belongs to the driver and is mapped into the process address space. A
/// mapping is created by [`Driver::map`] and consumed by [`Driver::unmap`], so it can only be
/// released once. Dropping a mapping does not unmap it; the arena hands every mapping back to
/// the driver after streaming was turned off.
///
/// [`Driver::map`]: crate::io::Driver::map
/// [`Driver::unmap`]: crate::io::Driver::unmap
pub struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
}

// The region is plain memory; synchronisation with the driver happens through the queue.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    /// Wraps a region returned by a mapping call
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes until the mapping is handed back to the
    /// driver that created it.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        Mapping { ptr, len }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read-only view of the whole region
    ///
    /// The driver may write to the memory whenever the buffer is queued, so the contents are
    /// only meaningful between dequeue and the next queue of the same index.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapping")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}
