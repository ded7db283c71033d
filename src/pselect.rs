use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};
use std::{io, mem, ptr};

use crate::error::{Error, Result};

#[derive(Clone, Copy)]
pub struct FdSet(libc::fd_set);

impl FdSet {
    pub fn new() -> FdSet {
        unsafe {
            let mut raw_fd_set = mem::MaybeUninit::<libc::fd_set>::uninit();
            libc::FD_ZERO(raw_fd_set.as_mut_ptr());
            FdSet(raw_fd_set.assume_init())
        }
    }

    pub fn set(&mut self, fd: RawFd) {
        unsafe {
            libc::FD_SET(fd, &mut self.0);
        }
    }
}

impl Default for FdSet {
    fn default() -> Self {
        Self::new()
    }
}

fn to_fdset_ptr(opt: Option<&mut FdSet>) -> *mut libc::fd_set {
    match opt {
        None => ptr::null_mut(),
        Some(&mut FdSet(ref mut raw_fd_set)) => raw_fd_set,
    }
}

pub fn pselect(
    nfds: libc::c_int,
    readfds: Option<&mut FdSet>,
    timeout: Option<&libc::timespec>,
) -> io::Result<usize> {
    let timeout = match timeout {
        None => ptr::null(),
        Some(ts) => ts as *const libc::timespec,
    };

    match unsafe {
        libc::pselect(
            nfds,
            to_fdset_ptr(readfds),
            ptr::null_mut(),
            ptr::null_mut(),
            timeout,
            ptr::null(),
        )
    } {
        -1 => Err(io::Error::last_os_error()),
        res => Ok(res as usize),
    }
}

pub fn make_timespec(duration: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: duration.subsec_nanos() as _,
    }
}

/// Blocks until `fd` is readable or `timeout` elapsed
///
/// A signal restarts the wait with whatever remains of the window.
pub fn wait_readable(fd: RawFd, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut readfds = FdSet::new();
        readfds.set(fd);

        match pselect(fd + 1, Some(&mut readfds), Some(&make_timespec(remaining))) {
            Ok(0) => return Err(Error::Timeout(timeout)),
            Ok(_) => return Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::EINTR) => continue,
            Err(e) => return Err(Error::os("pselect", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn pipe() -> (RawFd, RawFd) {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        (fds[0], fds[1])
    }

    #[test]
    fn times_out_without_data() {
        let (rx, tx) = pipe();
        let err = wait_readable(rx, Duration::from_millis(20)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);

        unsafe {
            libc::close(rx);
            libc::close(tx);
        }
    }

    #[test]
    fn ready_with_data() {
        let (rx, tx) = pipe();
        let byte = 1u8;
        assert_eq!(
            unsafe { libc::write(tx, &byte as *const u8 as *const libc::c_void, 1) },
            1
        );
        wait_readable(rx, Duration::from_secs(1)).unwrap();

        unsafe {
            libc::close(rx);
            libc::close(tx);
        }
    }
}
