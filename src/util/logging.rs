//! # Logging Utilities
//!
//! Rate limiting for warnings that can fire once per frame, and hex dumps of
//! frame contents for protocol debugging.
//!
//! ```rust
//! use d7a_phy::util::logging::{log_frame_hex, LogThrottle};
//!
//! let mut throttle = LogThrottle::new(1000, 5); // 5 messages per second
//! if throttle.allow() {
//!     log::warn!("No buffer for frame, dropping");
//! }
//! log_frame_hex("RX payload", &[0x01, 0x02, 0x03]);
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Largest number of payload bytes written by [`log_frame_hex`].
const MAX_LOG_BYTES: usize = 64;

/// Rate limiter for log messages.
///
/// Allows at most `cap` messages per window; the window restarts with the
/// first message after it expired.
#[derive(Debug)]
pub struct LogThrottle {
    window: Duration,
    cap: u32,
    count: u32,
    suppressed: u64,
    t0: Instant,
}

impl LogThrottle {
    /// Create a throttle allowing `cap` messages per `window_ms` milliseconds.
    pub fn new(window_ms: u64, cap: u32) -> Self {
        Self {
            window: Duration::from_millis(window_ms),
            cap,
            count: 0,
            suppressed: 0,
            t0: Instant::now(),
        }
    }

    /// Returns `true` if the message should be logged.
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.t0) > self.window {
            if self.suppressed > 0 {
                log::debug!("{} log messages suppressed", self.suppressed);
            }
            self.t0 = now;
            self.count = 0;
            self.suppressed = 0;
        }

        self.count = self.count.saturating_add(1);
        let allowed = self.count <= self.cap;
        if !allowed {
            self.suppressed += 1;
        }
        allowed
    }

    /// Messages rejected in the current window.
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    /// Start a new window immediately.
    pub fn reset(&mut self) {
        self.t0 = Instant::now();
        self.count = 0;
        self.suppressed = 0;
    }
}

/// Independent throttles keyed by message category.
#[derive(Debug, Default)]
pub struct ThrottleManager {
    throttles: HashMap<&'static str, LogThrottle>,
}

impl ThrottleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the throttle for `category`, creating it on first use.
    pub fn allow(&mut self, category: &'static str, window_ms: u64, cap: u32) -> bool {
        self.throttles
            .entry(category)
            .or_insert_with(|| LogThrottle::new(window_ms, cap))
            .allow()
    }
}

/// Log frame data in hex at debug level, truncated to 64 bytes.
pub fn log_frame_hex(prefix: &str, data: &[u8]) {
    if !log::log_enabled!(target: "d7a::frame", log::Level::Debug) {
        return;
    }
    let shown = &data[..data.len().min(MAX_LOG_BYTES)];
    let hex_str = crate::util::hex::format_hex_compact(shown);
    if data.len() > MAX_LOG_BYTES {
        log::debug!(target: "d7a::frame", "{prefix}: {hex_str} ... ({} bytes total)", data.len());
    } else {
        log::debug!(target: "d7a::frame", "{prefix}: {hex_str}");
    }
}

/// Log a warning with throttling
#[macro_export]
macro_rules! log_warn_throttled {
    ($throttle:expr, $($arg:tt)*) => {
        if $throttle.allow() {
            log::warn!($($arg)*);
        }
    };
}
