use std::{fmt, io, time::Duration};

use thiserror::Error;

/// Coarse classification of a failure, decided once where the OS error is observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Driver or hardware fault, the session cannot continue
    System,
    /// Caller or protocol misuse, fatal for the call only
    BadArgument,
    /// Operation or feature not implemented by the device
    Unsupported,
    /// Nothing happened within the wait window
    Timeout,
    /// Transient condition, the same call may succeed later
    Temporary,
    /// A signal interrupted the call; retried internally and never returned
    Interrupted,
}

impl ErrorKind {
    /// Classifies a raw errno value
    pub fn from_errno(errno: i32) -> Self {
        match errno {
            libc::EBADF | libc::ENOMEM | libc::ENODEV | libc::EIO | libc::ENXIO | libc::EFAULT => {
                ErrorKind::System
            }
            libc::EINTR => ErrorKind::Interrupted,
            libc::EINVAL => ErrorKind::BadArgument,
            libc::ENOTTY => ErrorKind::Unsupported,
            libc::ETIMEDOUT => ErrorKind::Timeout,
            // EWOULDBLOCK == EAGAIN on Linux
            libc::EAGAIN | libc::EBUSY | libc::EMFILE | libc::ENFILE => ErrorKind::Temporary,
            _ => ErrorKind::System,
        }
    }

    /// Whether retrying the same operation can succeed without tearing down the session
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::Temporary | ErrorKind::Interrupted
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::System => "system error",
            ErrorKind::BadArgument => "bad argument",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Temporary => "temporary error",
            ErrorKind::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// A system call failed
    #[error("{op}{}: {kind}: {source}", buffer_context(.index))]
    Os {
        op: &'static str,
        index: Option<u32>,
        kind: ErrorKind,
        #[source]
        source: io::Error,
    },

    /// The driver granted fewer buffers than streaming needs
    #[error("insufficient buffer memory: requested {requested}, driver granted {granted}")]
    Capacity { requested: u32, granted: u32 },

    /// The device did not become readable in time
    #[error("wait for device ready: timeout after {0:?}")]
    Timeout(Duration),

    /// A buffer transition was rejected
    #[error("buffer {index}: {reason}")]
    Buffer {
        index: u32,
        reason: &'static str,
        kind: ErrorKind,
    },

    /// The device lacks a capability the operation depends on
    #[error("device does not support {0}")]
    Unsupported(&'static str),

    /// The operation is not valid in the current lifecycle state
    #[error("cannot {op} while {state}")]
    State {
        op: &'static str,
        state: &'static str,
    },

    /// The capture thread died without reporting an error
    #[error("capture worker panicked")]
    Worker,
}

impl Error {
    /// Wraps an OS error, classifying it by errno
    pub fn os(op: &'static str, source: io::Error) -> Self {
        let kind = match source.raw_os_error() {
            Some(errno) => ErrorKind::from_errno(errno),
            None if source.kind() == io::ErrorKind::TimedOut => ErrorKind::Timeout,
            None if source.kind() == io::ErrorKind::InvalidInput => ErrorKind::BadArgument,
            None => ErrorKind::System,
        };

        Error::Os {
            op,
            index: None,
            kind,
            source,
        }
    }

    /// Wraps a raw errno value, mostly useful for driver implementations
    pub fn from_errno(op: &'static str, errno: i32) -> Self {
        Self::os(op, io::Error::from_raw_os_error(errno))
    }

    /// Attaches the buffer index the failing call operated on
    pub fn with_index(self, index: u32) -> Self {
        match self {
            Error::Os {
                op, kind, source, ..
            } => Error::Os {
                op,
                index: Some(index),
                kind,
                source,
            },
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Os { kind, .. } => *kind,
            Error::Capacity { .. } => ErrorKind::System,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Buffer { kind, .. } => *kind,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::State { .. } => ErrorKind::BadArgument,
            Error::Worker => ErrorKind::System,
        }
    }

    /// Raw errno of the underlying OS error, if any
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Os { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

fn buffer_context(index: &Option<u32>) -> String {
    match index {
        Some(index) => format!(" (buffer {})", index),
        None => String::new(),
    }
}
