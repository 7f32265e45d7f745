//! Compiled-in service configuration.

use crate::engine::DEFAULT_PIXEL_BUDGET;
use crate::handlers::RetryPolicy;
use std::net::SocketAddr;
use std::time::Duration;

/// Delay between listener bind attempts
pub const RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Service settings. There are no flags or environment overrides; the binary
/// starts from [`Config::default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub reconnect_delay: Duration,
    /// Frame buffers the camera may lend out at once
    pub camera_slots: usize,
    /// Largest bitmap the engine will allocate, in pixels
    pub pixel_budget: usize,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            reconnect_delay: RECONNECT_DELAY,
            camera_slots: 1,
            pixel_budget: DEFAULT_PIXEL_BUDGET,
            retry: RetryPolicy::unbounded(),
        }
    }
}

impl Config {
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_camera_slots(mut self, slots: usize) -> Self {
        self.camera_slots = slots.max(1);
        self
    }

    pub fn with_pixel_budget(mut self, pixels: usize) -> Self {
        self.pixel_budget = pixels;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
