use std::{fmt, time};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
/// Timestamp consisting of a seconds and a microseconds component
pub struct Timestamp {
    pub sec: i64,
    pub usec: i64,
}

impl Timestamp {
    /// Returns a timestamp representation
    ///
    /// # Arguments
    ///
    /// * `sec` - Seconds
    /// * `usec` - Microseconds
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_stream::Timestamp;
    /// let ts = Timestamp::new(5, 5);
    /// ```
    pub fn new(sec: i64, usec: i64) -> Self {
        Timestamp { sec, usec }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let floating: f64 = self.sec as f64 + self.usec as f64 / 1_000_000.0;
        write!(f, "{} [s]", floating)
    }
}

impl From<libc::timeval> for Timestamp {
    fn from(tv: libc::timeval) -> Self {
        #[allow(clippy::unnecessary_cast)]
        Timestamp {
            sec: tv.tv_sec as i64,
            usec: tv.tv_usec as i64,
        }
    }
}

impl From<time::Duration> for Timestamp {
    fn from(duration: time::Duration) -> Self {
        Timestamp::new(
            duration.as_secs() as i64,
            duration.subsec_micros() as i64,
        )
    }
}

impl From<Timestamp> for time::Duration {
    fn from(ts: Timestamp) -> Self {
        time::Duration::from_secs(ts.sec.max(0) as u64)
            + time::Duration::from_micros(ts.usec.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn duration_conversion() {
        let ts = Timestamp::from(Duration::from_micros(5_000_250));
        assert_eq!(ts, Timestamp::new(5, 250));
        assert_eq!(Duration::from(ts), Duration::from_micros(5_000_250));
    }

    #[test]
    fn from_timeval() {
        let tv = libc::timeval {
            tv_sec: 12,
            tv_usec: 345,
        };
        assert_eq!(Timestamp::from(tv), Timestamp::new(12, 345));
    }
}
