use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What the capture loop does when no frame arrives within the wait window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TimeoutPolicy {
    /// Keep waiting; loss of signal is a normal condition for capture hardware
    #[default]
    Retry,
    /// End the frame sequence with a timeout error
    Abort,
}

/// Streaming configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StreamConfig {
    /// Number of buffers to request from the driver
    pub buffer_count: u32,
    /// Readiness wait window
    pub timeout: Duration,
    pub timeout_policy: TimeoutPolicy,
    /// Optional pacing of the capture loop, in frames per second
    pub frame_rate: Option<u32>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamConfig {
    pub const DEFAULT_BUFFER_COUNT: u32 = 4;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new() -> Self {
        StreamConfig {
            buffer_count: Self::DEFAULT_BUFFER_COUNT,
            timeout: Self::DEFAULT_TIMEOUT,
            timeout_policy: TimeoutPolicy::default(),
            frame_rate: None,
        }
    }

    pub fn buffer_count(mut self, count: u32) -> Self {
        self.buffer_count = count;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }

    /// Pace the capture loop to at most `fps` frames per second
    pub fn frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = if fps == 0 { None } else { Some(fps) };
        self
    }

    /// Duration of one frame when pacing is enabled
    ///
    /// A frame rate of zero disables pacing.
    pub fn frame_period(&self) -> Option<Duration> {
        self.frame_rate
            .filter(|fps| *fps > 0)
            .map(|fps| Duration::from_secs(1) / fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.buffer_count, 4);
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.timeout_policy, TimeoutPolicy::Retry);
        assert_eq!(config.frame_period(), None);
    }

    #[test]
    fn builder() {
        let config = StreamConfig::new()
            .buffer_count(6)
            .timeout(Duration::from_millis(500))
            .timeout_policy(TimeoutPolicy::Abort)
            .frame_rate(25);
        assert_eq!(config.buffer_count, 6);
        assert_eq!(config.timeout_policy, TimeoutPolicy::Abort);
        assert_eq!(config.frame_period(), Some(Duration::from_millis(40)));

        assert_eq!(config.frame_rate(0).frame_rate, None);
    }

    #[test]
    fn zero_frame_rate_disables_pacing() {
        let config = StreamConfig {
            frame_rate: Some(0),
            ..Default::default()
        };
        assert_eq!(config.frame_period(), None);
    }
}
