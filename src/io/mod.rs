pub mod arena;
pub mod capture;
pub mod driver;
pub mod pool;
pub mod queue;
pub mod stream;

pub use arena::{Arena, MappedBuffer, MIN_BUFFERS};
pub use capture::{CancelToken, Frame, Frames};
pub use driver::Driver;
pub use pool::{FramePool, PoolStats};
pub use queue::{Queue, State};
pub use stream::Stream;
