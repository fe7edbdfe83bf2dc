//! # RSSI Validity Tracking
//!
//! An RSSI reading is only trustworthy once the receiver has been listening
//! for a settling period. The tracker is armed whenever RX is entered with new
//! settings, cleared whenever RX is left, and becomes valid exactly once per
//! arming.

use std::time::Duration;

/// Value returned by `get_rssi` while no valid measurement exists.
pub const RSSI_INVALID: i16 = 0x7FFF;

#[derive(Debug, Clone)]
pub struct RssiTracker {
    settle: Duration,
    armed_at: Option<Duration>,
    valid: bool,
    last: i16,
}

impl RssiTracker {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            armed_at: None,
            valid: false,
            last: RSSI_INVALID,
        }
    }

    pub fn settle_time(&self) -> Duration {
        self.settle
    }

    /// Start the settling period at `now`.
    pub fn arm(&mut self, now: Duration) {
        self.armed_at = Some(now);
        self.valid = false;
    }

    /// Leave RX: no measurement until re-armed.
    pub fn invalidate(&mut self) {
        self.armed_at = None;
        self.valid = false;
    }

    pub fn armed_at(&self) -> Option<Duration> {
        self.armed_at
    }

    /// If the settling period has just elapsed, take a measurement and
    /// return it. Returns `Some` at most once per arming.
    pub fn poll(&mut self, now: Duration, measure: impl FnOnce() -> i16) -> Option<i16> {
        if self.valid {
            return None;
        }
        let armed_at = self.armed_at?;
        if now.saturating_sub(armed_at) < self.settle {
            return None;
        }
        self.last = measure();
        self.valid = true;
        Some(self.last)
    }

    /// A frame was received; its RSSI becomes the last measurement.
    pub fn record_frame(&mut self, rssi: i16) {
        if self.valid {
            self.last = rssi;
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Last measurement, or [`RSSI_INVALID`].
    pub fn value(&self) -> i16 {
        if self.valid {
            self.last
        } else {
            RSSI_INVALID
        }
    }
}
