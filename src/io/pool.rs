use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Reusable byte buffers for frames copied out of the mapped pool
///
/// Buffers grow on demand and keep their capacity when handed back, so a capture running at a
/// steady resolution stops allocating after the first few frames.
#[derive(Debug)]
pub struct FramePool {
    free: Mutex<Vec<Vec<u8>>>,
    default_capacity: usize,

    gets: AtomicU64,
    puts: AtomicU64,
    allocs: AtomicU64,
    resizes: AtomicU64,
}

/// Cumulative usage counters of a [`FramePool`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub gets: u64,
    pub puts: u64,
    pub allocs: u64,
    pub resizes: u64,
}

impl PoolStats {
    /// Buffers handed out and not returned yet
    pub fn outstanding(&self) -> u64 {
        self.gets.saturating_sub(self.puts)
    }

    /// Share of `get` calls served without a fresh allocation
    pub fn hit_rate(&self) -> f64 {
        if self.gets == 0 {
            return 0.0;
        }
        self.gets.saturating_sub(self.allocs) as f64 / self.gets as f64
    }
}

impl FramePool {
    /// 640x480 YUYV needs 600 KiB, so 1 MiB covers the common cases without a resize
    pub const DEFAULT_CAPACITY: usize = 1024 * 1024;

    pub fn new(default_capacity: usize) -> Self {
        FramePool {
            free: Mutex::new(Vec::new()),
            default_capacity,
            gets: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            allocs: AtomicU64::new(0),
            resizes: AtomicU64::new(0),
        }
    }

    /// Returns a zeroed buffer of exactly `size` bytes
    pub fn get(&self, size: usize) -> Vec<u8> {
        self.gets.fetch_add(1, Ordering::Relaxed);

        let reused = self.free.lock().ok().and_then(|mut free| free.pop());
        let mut buf = match reused {
            Some(buf) => buf,
            None => {
                self.allocs.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(self.default_capacity)
            }
        };

        if buf.capacity() < size {
            self.resizes.fetch_add(1, Ordering::Relaxed);
            // twice the size so a slowly growing payload does not resize every frame
            let capacity = (size * 2).max(self.default_capacity);
            buf = Vec::with_capacity(capacity);
        }

        buf.clear();
        buf.resize(size, 0);
        buf
    }

    /// Hands a buffer back for reuse
    ///
    /// Buffers without capacity are dropped.
    pub fn put(&self, buf: Vec<u8>) {
        if buf.capacity() == 0 {
            return;
        }

        self.puts.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut free) = self.free.lock() {
            free.push(buf);
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            gets: self.gets.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            allocs: self.allocs.load(Ordering::Relaxed),
            resizes: self.resizes.load(Ordering::Relaxed),
        }
    }

    /// Clears the counters, pooled buffers are kept
    pub fn reset_stats(&self) {
        self.gets.store(0, Ordering::Relaxed);
        self.puts.store(0, Ordering::Relaxed);
        self.allocs.store(0, Ordering::Relaxed);
        self.resizes.store(0, Ordering::Relaxed);
    }
}

impl Default for FramePool {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_returned_buffers() {
        let pool = FramePool::new(1024);

        let buf = pool.get(100);
        assert_eq!(buf.len(), 100);
        pool.put(buf);

        let buf = pool.get(200);
        assert_eq!(buf.len(), 200);
        assert!(buf.iter().all(|b| *b == 0));

        let stats = pool.stats();
        assert_eq!(stats.gets, 2);
        assert_eq!(stats.puts, 1);
        assert_eq!(stats.allocs, 1);
        assert_eq!(stats.resizes, 0);
        assert_eq!(stats.outstanding(), 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn grows_for_large_frames() {
        let pool = FramePool::new(16);

        let buf = pool.get(64);
        assert_eq!(buf.len(), 64);
        assert!(buf.capacity() >= 128);
        assert_eq!(pool.stats().resizes, 1);
    }

    #[test]
    fn ignores_empty_buffers() {
        let pool = FramePool::new(16);
        pool.put(Vec::new());
        assert_eq!(pool.stats().puts, 0);

        pool.reset_stats();
        assert_eq!(pool.stats(), PoolStats::default());
    }
}
