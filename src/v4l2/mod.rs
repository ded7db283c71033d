use std::ffi::CString;
use std::os::raw::{c_int, c_void};
use std::os::unix::ffi::OsStrExt;
use std::{io, path::Path};

use crate::error::{Error, Result};

pub mod videodev;
pub mod vidioc;

/// A convenience wrapper around open(2).
///
/// Returns the file descriptor on success. The call is restarted if a signal interrupts it.
///
/// # Arguments
///
/// * `path` - Path to the device node
/// * `flags` - Open flags
///
/// # Example
///
/// ```
/// use v4l_stream::v4l2;
///
/// let fd = v4l2::open("/dev/video0", libc::O_RDWR | libc::O_NONBLOCK);
/// ```
pub fn open<P: AsRef<Path>>(path: P, flags: i32) -> Result<c_int> {
    let c_path = CString::new(path.as_ref().as_os_str().as_bytes()).map_err(|_| {
        Error::os(
            "open",
            io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"),
        )
    })?;

    loop {
        let fd = unsafe { libc::open(c_path.as_ptr(), flags) };
        if fd != -1 {
            return Ok(fd);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(Error::os("open", err));
        }
    }
}

/// A convenience wrapper around close(2).
///
/// # Arguments
///
/// * `fd` - File descriptor of a previously opened device
pub fn close(fd: c_int) -> Result<()> {
    // close(2) must not be retried on EINTR, the descriptor is gone either way
    if unsafe { libc::close(fd) } == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(Error::os("close", err));
        }
    }

    Ok(())
}

/// A convenience wrapper around ioctl(2).
///
/// Interrupted calls are restarted transparently; every other failure is classified and reported
/// together with the command name.
///
/// # Arguments
///
/// * `fd` - File descriptor
/// * `request` - IO control code (see [`vidioc`])
/// * `argp` - Pointer to memory region holding the argument type
///
/// # Safety
///
/// `argp` must point to a live, writable value whose layout matches the size encoded in
/// `request`.
pub unsafe fn ioctl(fd: c_int, request: vidioc::_IOC_TYPE, argp: *mut c_void) -> Result<()> {
    loop {
        /*
         * The libc crate declares ioctl() with different argument types on different
         * platforms. syscall() takes the same arguments everywhere.
         */
        let ret = libc::syscall(libc::SYS_ioctl, fd, request, argp);
        if ret != -1 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(Error::os(vidioc::name(request), err));
        }
    }
}

/// A convenience wrapper around mmap(2), always creating a shared read/write mapping.
///
/// # Arguments
///
/// * `fd` - File descriptor representing an opened device
/// * `length` - Length of the mapped region
/// * `offset` - Offset reported by the driver for the buffer
///
/// # Safety
///
/// The returned region aliases driver memory. It must be passed to [`munmap`] with the same
/// length exactly once, and must not be accessed afterwards.
pub unsafe fn mmap(fd: c_int, length: usize, offset: libc::off_t) -> Result<*mut c_void> {
    let ptr = libc::mmap(
        std::ptr::null_mut(),
        length,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED,
        fd,
        offset,
    );

    if ptr == libc::MAP_FAILED {
        Err(Error::os("mmap", io::Error::last_os_error()))
    } else {
        Ok(ptr)
    }
}

/// A convenience wrapper around munmap(2).
///
/// # Safety
///
/// `start` and `length` must be the pair returned by a previous [`mmap`] call.
pub unsafe fn munmap(start: *mut c_void, length: usize) -> Result<()> {
    if libc::munmap(start, length) == -1 {
        Err(Error::os("munmap", io::Error::last_os_error()))
    } else {
        Ok(())
    }
}
