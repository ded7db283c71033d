use std::convert::TryFrom;
use std::os::raw::{c_int, c_void};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::{mem, sync::Arc, time::Duration};

use log::{debug, warn};

use crate::buffer::Descriptor;
use crate::capability::Capabilities;
use crate::error::{Error, ErrorKind, Result};
use crate::io::Driver;
use crate::memory::Mapping;
use crate::pselect;
use crate::v4l2;
use crate::v4l2::videodev::{
    v4l2_buffer, v4l2_capability, v4l2_requestbuffers, V4L2_BUF_TYPE_VIDEO_CAPTURE,
    V4L2_MEMORY_MMAP,
};

/// Device handle for low-level access.
///
/// Acquiring a handle facilitates (possibly mutating) interactions with the device. The file
/// descriptor is closed when the handle is dropped.
#[derive(Debug)]
pub struct Handle {
    fd: c_int,
}

impl Handle {
    fn new(fd: c_int) -> Self {
        Handle { fd }
    }

    /// Returns the raw file descriptor
    pub fn fd(&self) -> c_int {
        self.fd
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Err(e) = v4l2::close(self.fd) {
            warn!("failed to close fd {}: {}", self.fd, e);
        }
    }
}

/// Linux capture device abstraction
///
/// The node is opened non-blocking: dequeueing never sleeps in the kernel, readiness is awaited
/// with [`Driver::wait_readable`] instead.
pub struct Device {
    handle: Arc<Handle>,
    path: PathBuf,
}

impl Device {
    /// Returns a capture device by index
    ///
    /// Devices are usually enumerated by the system.
    /// An index of zero thus represents the first device the system got to know about.
    ///
    /// # Arguments
    ///
    /// * `index` - Index (0: first, 1: second, ..)
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_stream::Device;
    /// let dev = Device::new(0);
    /// ```
    pub fn new(index: usize) -> Result<Self> {
        Self::with_path(format!("/dev/video{}", index))
    }

    /// Returns a capture device by path
    ///
    /// Linux device nodes are usually found in /dev/videoX or /sys/class/video4linux/videoX.
    ///
    /// # Arguments
    ///
    /// * `path` - Path (e.g. "/dev/video0")
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_stream::Device;
    /// let dev = Device::with_path("/dev/video0");
    /// ```
    pub fn with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let fd = v4l2::open(path, libc::O_RDWR | libc::O_NONBLOCK)?;
        debug!("opened {} as fd {}", path.display(), fd);

        Ok(Device {
            handle: Arc::new(Handle::new(fd)),
            path: PathBuf::from(path),
        })
    }

    /// Returns the raw device handle
    pub fn handle(&self) -> Arc<Handle> {
        self.handle.clone()
    }

    /// Returns the path the device was opened with
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ioctl<T>(&self, request: v4l2::vidioc::_IOC_TYPE, arg: &mut T) -> Result<()> {
        unsafe { v4l2::ioctl(self.handle.fd(), request, arg as *mut T as *mut c_void) }
    }

    fn buffer_ioctl(&self, request: v4l2::vidioc::_IOC_TYPE, index: u32) -> Result<Descriptor> {
        let mut v4l2_buf = v4l2_buffer {
            index,
            ..v4l2_buffer::capture(V4L2_MEMORY_MMAP)
        };
        self.ioctl(request, &mut v4l2_buf)
            .map_err(|e| e.with_index(index))?;

        Descriptor::try_from(v4l2_buf)
    }

    fn stream_ioctl(&self, request: v4l2::vidioc::_IOC_TYPE) -> Result<()> {
        let mut typ = V4L2_BUF_TYPE_VIDEO_CAPTURE as c_int;
        self.ioctl(request, &mut typ)
    }
}

impl Driver for Device {
    fn query_caps(&self) -> Result<Capabilities> {
        let mut v4l2_caps: v4l2_capability = unsafe { mem::zeroed() };
        self.ioctl(v4l2::vidioc::VIDIOC_QUERYCAP, &mut v4l2_caps)?;

        Ok(Capabilities::from(v4l2_caps))
    }

    fn request_buffers(&self, count: u32) -> Result<u32> {
        let mut v4l2_reqbufs = v4l2_requestbuffers {
            count,
            type_: V4L2_BUF_TYPE_VIDEO_CAPTURE,
            memory: V4L2_MEMORY_MMAP,
            ..unsafe { mem::zeroed() }
        };
        self.ioctl(v4l2::vidioc::VIDIOC_REQBUFS, &mut v4l2_reqbufs)?;

        Ok(v4l2_reqbufs.count)
    }

    fn query_buffer(&self, index: u32) -> Result<Descriptor> {
        self.buffer_ioctl(v4l2::vidioc::VIDIOC_QUERYBUF, index)
    }

    fn queue_buffer(&self, index: u32) -> Result<Descriptor> {
        self.buffer_ioctl(v4l2::vidioc::VIDIOC_QBUF, index)
    }

    fn dequeue_buffer(&self) -> Result<Descriptor> {
        let mut v4l2_buf = v4l2_buffer::capture(V4L2_MEMORY_MMAP);
        self.ioctl(v4l2::vidioc::VIDIOC_DQBUF, &mut v4l2_buf)?;

        Descriptor::try_from(v4l2_buf)
    }

    fn stream_on(&self) -> Result<()> {
        self.stream_ioctl(v4l2::vidioc::VIDIOC_STREAMON)
    }

    fn stream_off(&self) -> Result<()> {
        self.stream_ioctl(v4l2::vidioc::VIDIOC_STREAMOFF)
    }

    fn map(&self, offset: u32, length: usize) -> Result<Mapping> {
        let ptr = unsafe { v4l2::mmap(self.handle.fd(), length, offset as libc::off_t)? };
        let ptr = NonNull::new(ptr as *mut u8).ok_or(Error::Buffer {
            index: 0,
            reason: "mmap returned a null mapping",
            kind: ErrorKind::System,
        })?;

        Ok(unsafe { Mapping::from_raw_parts(ptr, length) })
    }

    fn unmap(&self, mapping: Mapping) -> Result<()> {
        unsafe { v4l2::munmap(mapping.as_ptr() as *mut c_void, mapping.len()) }
    }

    fn wait_readable(&self, timeout: Duration) -> Result<()> {
        pselect::wait_readable(self.handle.fd(), timeout)
    }
}
