//! # Hardware Abstraction Layer for the PHY Driver
//!
//! Chip-specific register access lives behind [`RadioHal`]. The driver calls
//! it from the cooperative context to change the transceiver mode, and the
//! platform's interrupt glue reports what the hardware did through
//! [`HwEvent`]s passed to `Radio::handle_event`.

use crate::phy::channel::{RxConfig, TxConfig};
use crate::phy::packet::CrcStatus;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that can occur during HAL operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HalError {
    #[error("Timeout waiting for operation")]
    Timeout,

    #[error("Transceiver fault: {0}")]
    Fault(String),
}

/// Hardware abstraction for a half-duplex sub-GHz transceiver.
pub trait RadioHal: Send {
    /// Put the transceiver in its idle (low power) mode.
    fn enter_idle(&mut self) -> Result<(), HalError>;

    /// Tune to `cfg` and start scanning for frames.
    fn start_rx(&mut self, cfg: &RxConfig) -> Result<(), HalError>;

    /// Start transmitting `data` with `cfg`. Completion is reported with
    /// [`HwEvent::TxDone`].
    fn start_tx(&mut self, cfg: &TxConfig, data: &[u8]) -> Result<(), HalError>;

    /// Read the instantaneous RSSI in dBm.
    fn measure_rssi(&mut self) -> i16;

    /// Supported EIRP range in dBm, inclusive.
    fn eirp_range(&self) -> (i8, i8);

    /// Largest frame the transceiver can send or receive.
    fn max_packet_len(&self) -> usize;
}

/// Events raised by the hardware, delivered in the restricted context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwEvent {
    /// A syncword was detected and the frame length is known.
    SyncDetected { length: usize },
    /// A frame was received completely.
    RxDone {
        data: Vec<u8>,
        lqi: u8,
        rssi: i16,
        crc: CrcStatus,
    },
    /// Reception of the current frame failed.
    RxFault,
    /// The transmission started by `start_tx` concluded.
    TxDone { ok: bool },
}

/// Monotonic time source for timestamps and RSSI settling.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// [`Clock`] backed by `std::time::Instant`.
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}
