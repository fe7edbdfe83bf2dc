//! # Simulated Transceiver
//!
//! A [`RadioHal`] implementation without hardware, used by the gateway demo
//! and the tests. Every mode change is recorded so callers can check what the
//! driver asked the transceiver to do, and faults can be injected.

use crate::phy::channel::{RxConfig, TxConfig};
use crate::phy::hal::{Clock, HalError, RadioHal};
use crate::phy::packet::MAX_PACKET_LEN;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A transceiver command recorded by [`SimulatedHal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimOp {
    Idle,
    Rx(RxConfig),
    Tx { cfg: TxConfig, data: Vec<u8> },
}

#[derive(Debug)]
struct SimState {
    ops: Vec<SimOp>,
    noise_floor: i16,
    fail_next_rx: bool,
    fail_next_tx: bool,
    fail_next_idle: bool,
}

/// Shared view on a [`SimulatedHal`] after it was moved into the driver.
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All commands issued so far.
    pub fn ops(&self) -> Vec<SimOp> {
        self.lock().ops.clone()
    }

    pub fn last_op(&self) -> Option<SimOp> {
        self.lock().ops.last().cloned()
    }

    /// Payloads handed to `start_tx`, in order.
    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        self.lock()
            .ops
            .iter()
            .filter_map(|op| match op {
                SimOp::Tx { data, .. } => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_ops(&self) {
        self.lock().ops.clear();
    }

    /// RSSI reported by `measure_rssi`.
    pub fn set_noise_floor(&self, rssi: i16) {
        self.lock().noise_floor = rssi;
    }

    pub fn fail_next_rx(&self) {
        self.lock().fail_next_rx = true;
    }

    pub fn fail_next_tx(&self) {
        self.lock().fail_next_tx = true;
    }

    pub fn fail_next_idle(&self) {
        self.lock().fail_next_idle = true;
    }
}

/// Hardware-free transceiver with a -39..=10 dBm power range.
#[derive(Debug)]
pub struct SimulatedHal {
    handle: SimHandle,
    eirp_range: (i8, i8),
    max_packet_len: usize,
}

impl SimulatedHal {
    pub fn new() -> Self {
        Self {
            handle: SimHandle {
                state: Arc::new(Mutex::new(SimState {
                    ops: Vec::new(),
                    noise_floor: -100,
                    fail_next_rx: false,
                    fail_next_tx: false,
                    fail_next_idle: false,
                })),
            },
            eirp_range: (-39, 10),
            max_packet_len: MAX_PACKET_LEN,
        }
    }

    pub fn with_max_packet_len(mut self, len: usize) -> Self {
        self.max_packet_len = len;
        self
    }

    pub fn with_eirp_range(mut self, min: i8, max: i8) -> Self {
        self.eirp_range = (min, max);
        self
    }

    pub fn handle(&self) -> SimHandle {
        self.handle.clone()
    }
}

impl Default for SimulatedHal {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioHal for SimulatedHal {
    fn enter_idle(&mut self) -> Result<(), HalError> {
        let mut state = self.handle.lock();
        if std::mem::take(&mut state.fail_next_idle) {
            return Err(HalError::Timeout);
        }
        state.ops.push(SimOp::Idle);
        Ok(())
    }

    fn start_rx(&mut self, cfg: &RxConfig) -> Result<(), HalError> {
        let mut state = self.handle.lock();
        if std::mem::take(&mut state.fail_next_rx) {
            return Err(HalError::Fault("PLL lock lost".into()));
        }
        state.ops.push(SimOp::Rx(*cfg));
        Ok(())
    }

    fn start_tx(&mut self, cfg: &TxConfig, data: &[u8]) -> Result<(), HalError> {
        let mut state = self.handle.lock();
        if std::mem::take(&mut state.fail_next_tx) {
            return Err(HalError::Fault("PA ramp failed".into()));
        }
        state.ops.push(SimOp::Tx {
            cfg: *cfg,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn measure_rssi(&mut self) -> i16 {
        self.handle.lock().noise_floor
    }

    fn eirp_range(&self) -> (i8, i8) {
        self.eirp_range
    }

    fn max_packet_len(&self) -> usize {
        self.max_packet_len
    }
}

/// A [`Clock`] that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.micros
            .fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy::channel::{ChannelClass, ChannelId, Coding, FrequencyBand, SyncwordClass};

    #[test]
    fn test_records_ops_and_faults() {
        let mut hal = SimulatedHal::new();
        let handle = hal.handle();
        let cfg = RxConfig::new(
            ChannelId::new(FrequencyBand::Band433, ChannelClass::LoRate, Coding::Pn9, 3),
            SyncwordClass::Class1,
        );

        hal.start_rx(&cfg).unwrap();
        handle.fail_next_rx();
        assert!(hal.start_rx(&cfg).is_err());
        hal.enter_idle().unwrap();
        assert_eq!(handle.ops(), vec![SimOp::Rx(cfg), SimOp::Idle]);

        handle.set_noise_floor(-87);
        assert_eq!(hal.measure_rssi(), -87);
    }

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new();
        let view = clock.clone();
        clock.advance(Duration::from_millis(3));
        assert_eq!(view.now(), Duration::from_millis(3));
    }
}
