//! Memory-mapped streaming capture for Video4Linux2 devices
//!
//! The crate negotiates a pool of driver buffers, maps them into the process and drives the
//! queue/dequeue protocol that passes them between driver and application. Frames are read
//! either synchronously through a borrowed view of the mapped memory ([`io::Stream::next`]) or
//! from a capture thread that copies them out ([`Session::capture`]).
//!
//! ```no_run
//! use v4l_stream::{Session, StreamConfig};
//!
//! let config = StreamConfig::default().buffer_count(4);
//! let mut session = Session::open("/dev/video0", config)?;
//! let granted = session.start()?;
//! println!("streaming with {} buffers", granted);
//!
//! let (data, desc) = session.next_frame()?;
//! println!("buffer {} holds {} bytes", desc.index, data.len());
//! # Ok::<(), v4l_stream::Error>(())
//! ```

pub mod v4l2;

pub mod buffer;
pub mod capability;
pub mod config;
pub mod device;
pub mod error;
pub mod io;
pub mod memory;
pub mod session;
pub mod timestamp;

mod pselect;

pub use capability::Capabilities;
pub use config::{StreamConfig, TimeoutPolicy};
pub use device::Device;
pub use error::{Error, ErrorKind, Result};
pub use memory::Memory;
pub use session::Session;
pub use timestamp::Timestamp;
