//! Tunables for a capture device.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Capture engine configuration.
///
/// The defaults are the values the engine is specified with; they only need
/// changing for unusual drivers or for tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Number of buffers requested from the driver.
    pub buffer_request: u32,
    /// Fewest granted buffers that still allow streaming.
    pub min_buffers: u32,
    /// Retry applied when queueing a buffer hits `EAGAIN`/`ENOMEM`.
    pub queue_retry: RetryPolicy,
    /// Timeout of one readiness wait inside `capture`.
    pub wait_timeout: Duration,
    /// Treat a failed crop-capability query as fatal during `open`.
    pub strict_crop: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_request: 4,
            min_buffers: 2,
            queue_retry: RetryPolicy::default(),
            wait_timeout: Duration::from_millis(40),
            strict_crop: true,
        }
    }
}
