use std::mem;

use crate::v4l2::videodev::{v4l2_buffer, v4l2_capability, v4l2_requestbuffers};

#[cfg(not(target_env = "musl"))]
#[allow(non_camel_case_types)]
pub type _IOC_TYPE = std::os::raw::c_ulong;
#[cfg(target_env = "musl")]
#[allow(non_camel_case_types)]
pub type _IOC_TYPE = std::os::raw::c_int;

// linux ioctl.h
const _IOC_NRBITS: u32 = 8;
const _IOC_TYPEBITS: u32 = 8;
const _IOC_SIZEBITS: u32 = 14;
const _IOC_DIRBITS: u32 = 2;

const _IOC_NRSHIFT: u32 = 0;
const _IOC_TYPESHIFT: u32 = _IOC_NRSHIFT + _IOC_NRBITS;
const _IOC_SIZESHIFT: u32 = _IOC_TYPESHIFT + _IOC_TYPEBITS;
const _IOC_DIRSHIFT: u32 = _IOC_SIZESHIFT + _IOC_SIZEBITS;

const _IOC_NRMASK: u32 = (1 << _IOC_NRBITS) - 1;
const _IOC_TYPEMASK: u32 = (1 << _IOC_TYPEBITS) - 1;
const _IOC_SIZEMASK: u32 = (1 << _IOC_SIZEBITS) - 1;
const _IOC_DIRMASK: u32 = (1 << _IOC_DIRBITS) - 1;

/// Data transfer direction of an ioctl, seen from userspace
///
/// `Write` means userspace writes and the kernel reads, `Read` the opposite.
#[allow(clippy::unreadable_literal)]
#[rustfmt::skip]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    None        = 0,
    Write       = 1,
    Read        = 2,
    ReadWrite   = 3,
}

impl Direction {
    const fn from_bits(bits: u32) -> Self {
        match bits & _IOC_DIRMASK {
            0 => Direction::None,
            1 => Direction::Write,
            2 => Direction::Read,
            _ => Direction::ReadWrite,
        }
    }
}

/// Encodes a command word from its four fields.
///
/// Values wider than their field are truncated, exactly like the C macro.
///
/// # Arguments
///
/// * `dir` - Transfer direction
/// * `kind` - Type tag, `b'V'` for all video4linux commands
/// * `nr` - Operation number
/// * `size` - Size of the argument structure in bytes
pub const fn ioc(dir: Direction, kind: u8, nr: u8, size: usize) -> u32 {
    ((dir as u32 & _IOC_DIRMASK) << _IOC_DIRSHIFT)
        | ((kind as u32) << _IOC_TYPESHIFT)
        | ((nr as u32) << _IOC_NRSHIFT)
        | ((size as u32 & _IOC_SIZEMASK) << _IOC_SIZESHIFT)
}

/// Command without an argument
pub const fn io(kind: u8, nr: u8) -> u32 {
    ioc(Direction::None, kind, nr, 0)
}

/// Command whose argument is filled in by the kernel
pub const fn ior(kind: u8, nr: u8, size: usize) -> u32 {
    ioc(Direction::Read, kind, nr, size)
}

/// Command whose argument is read by the kernel
pub const fn iow(kind: u8, nr: u8, size: usize) -> u32 {
    ioc(Direction::Write, kind, nr, size)
}

/// Command whose argument travels both ways
pub const fn iowr(kind: u8, nr: u8, size: usize) -> u32 {
    ioc(Direction::ReadWrite, kind, nr, size)
}

pub const fn direction(cmd: u32) -> Direction {
    Direction::from_bits(cmd >> _IOC_DIRSHIFT)
}

pub const fn kind(cmd: u32) -> u8 {
    ((cmd >> _IOC_TYPESHIFT) & _IOC_TYPEMASK) as u8
}

pub const fn number(cmd: u32) -> u8 {
    ((cmd >> _IOC_NRSHIFT) & _IOC_NRMASK) as u8
}

pub const fn size(cmd: u32) -> usize {
    ((cmd >> _IOC_SIZESHIFT) & _IOC_SIZEMASK) as usize
}

macro_rules! vidioc {
    ($enc:ident, $nr:expr, $arg:ty) => {
        $enc(b'V', $nr, mem::size_of::<$arg>()) as _IOC_TYPE
    };
}

pub const VIDIOC_QUERYCAP: _IOC_TYPE = vidioc!(ior, 0, v4l2_capability);
pub const VIDIOC_REQBUFS: _IOC_TYPE = vidioc!(iowr, 8, v4l2_requestbuffers);
pub const VIDIOC_QUERYBUF: _IOC_TYPE = vidioc!(iowr, 9, v4l2_buffer);
pub const VIDIOC_QBUF: _IOC_TYPE = vidioc!(iowr, 15, v4l2_buffer);
pub const VIDIOC_DQBUF: _IOC_TYPE = vidioc!(iowr, 17, v4l2_buffer);
pub const VIDIOC_STREAMON: _IOC_TYPE = vidioc!(iow, 18, std::os::raw::c_int);
pub const VIDIOC_STREAMOFF: _IOC_TYPE = vidioc!(iow, 19, std::os::raw::c_int);

/// Human readable name of a command, used for error context
pub fn name(request: _IOC_TYPE) -> &'static str {
    match request {
        VIDIOC_QUERYCAP => "VIDIOC_QUERYCAP",
        VIDIOC_REQBUFS => "VIDIOC_REQBUFS",
        VIDIOC_QUERYBUF => "VIDIOC_QUERYBUF",
        VIDIOC_QBUF => "VIDIOC_QBUF",
        VIDIOC_DQBUF => "VIDIOC_DQBUF",
        VIDIOC_STREAMON => "VIDIOC_STREAMON",
        VIDIOC_STREAMOFF => "VIDIOC_STREAMOFF",
        _ => "ioctl",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let dirs = [
            Direction::None,
            Direction::Write,
            Direction::Read,
            Direction::ReadWrite,
        ];
        for dir in dirs {
            for kind_tag in [0u8, b'V', b'd', 0xff] {
                for nr in [0u8, 1, 17, 103, 0xff] {
                    for sz in [0usize, 4, 20, 88, 104, 0x3fff] {
                        let cmd = ioc(dir, kind_tag, nr, sz);
                        assert_eq!(direction(cmd), dir);
                        assert_eq!(kind(cmd), kind_tag);
                        assert_eq!(number(cmd), nr);
                        assert_eq!(size(cmd), sz);
                    }
                }
            }
        }
    }

    #[test]
    fn field_layout() {
        assert_eq!(ioc(Direction::None, 0, 0xff, 0), 0x0000_00ff);
        assert_eq!(ioc(Direction::None, 0xff, 0, 0), 0x0000_ff00);
        assert_eq!(ioc(Direction::None, 0, 0, 0x3fff), 0x3fff_0000);
        assert_eq!(ioc(Direction::ReadWrite, 0, 0, 0), 0xc000_0000);
        assert_eq!(io(b'V', 70), 0x0000_5646);
    }

    #[test]
    fn oversized_argument_is_truncated() {
        assert_eq!(size(iowr(b'V', 1, 0x4000)), 0);
    }

    #[test]
    #[cfg(all(target_os = "linux", target_pointer_width = "64"))]
    fn matches_kernel_abi() {
        assert_eq!(VIDIOC_QUERYCAP as u32, 0x8068_5600);
        assert_eq!(VIDIOC_REQBUFS as u32, 0xc014_5608);
        assert_eq!(VIDIOC_QUERYBUF as u32, 0xc058_5609);
        assert_eq!(VIDIOC_QBUF as u32, 0xc058_560f);
        assert_eq!(VIDIOC_DQBUF as u32, 0xc058_5611);
        assert_eq!(VIDIOC_STREAMON as u32, 0x4004_5612);
        assert_eq!(VIDIOC_STREAMOFF as u32, 0x4004_5613);
    }
}
