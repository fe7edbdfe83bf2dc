//! Shared harness for driving a `Radio` over the simulated transceiver.

#![allow(dead_code)]

use d7a_phy::phy::channel::{ChannelClass, Coding, FrequencyBand, SyncwordClass};
use d7a_phy::phy::packet::TxStatus;
use d7a_phy::phy::sim::{ManualClock, SimHandle, SimulatedHal};
use d7a_phy::{
    gateway_profiles, ChannelId, HwEvent, Packet, PacketPool, Radio, RadioCallbacks,
    RadioSettings, RxConfig, TxConfig,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SETTLE: Duration = Duration::from_millis(1);

/// A callback invocation seen by the harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cb {
    Release,
    Rx(Vec<u8>),
    Tx(TxStatus, Vec<u8>),
    Rssi(i16),
}

pub struct Harness {
    pub radio: Arc<Radio<SimulatedHal>>,
    pub sim: SimHandle,
    pub clock: ManualClock,
    pub pool: PacketPool,
    pub log: Arc<Mutex<Vec<Cb>>>,
    pub received: Arc<Mutex<Vec<Packet>>>,
    /// Timestamp of every completed transmission, in callback order.
    pub sent_at: Arc<Mutex<Vec<Option<Duration>>>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_pool(PacketPool::new(4, 255))
    }

    pub fn with_pool(pool: PacketPool) -> Self {
        Self::build(SimulatedHal::new(), pool)
    }

    pub fn build(hal: SimulatedHal, pool: PacketPool) -> Self {
        let sim = hal.handle();
        let clock = ManualClock::new();
        let settings = RadioSettings {
            rssi_settle: SETTLE,
            access_profiles: gateway_profiles(),
            ..RadioSettings::default()
        };
        Self {
            radio: Arc::new(Radio::new(hal, clock.clone(), settings)),
            sim,
            clock,
            pool,
            log: Arc::new(Mutex::new(Vec::new())),
            received: Arc::new(Mutex::new(Vec::new())),
            sent_at: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Callbacks that record every invocation.
    pub fn callbacks(&self) -> RadioCallbacks {
        let alloc_pool = self.pool.clone();
        let release_pool = self.pool.clone();
        let release_log = self.log.clone();
        let rx_log = self.log.clone();
        let rx_store = self.received.clone();
        let tx_log = self.log.clone();
        let tx_times = self.sent_at.clone();
        let rssi_log = self.log.clone();

        RadioCallbacks::new()
            .on_alloc(move |len| alloc_pool.alloc(len))
            .on_release(move |packet| {
                release_log.lock().unwrap().push(Cb::Release);
                release_pool.release(packet);
            })
            .on_rx(move |packet| {
                rx_log.lock().unwrap().push(Cb::Rx(packet.data().to_vec()));
                rx_store.lock().unwrap().push(packet);
            })
            .on_tx(move |packet| {
                let status = packet.tx_meta().map(|m| m.status).unwrap_or(TxStatus::Pending);
                tx_times.lock().unwrap().push(packet.tx_meta().and_then(|m| m.timestamp));
                tx_log.lock().unwrap().push(Cb::Tx(status, packet.data().to_vec()));
            })
            .on_rssi_valid(move |rssi| rssi_log.lock().unwrap().push(Cb::Rssi(rssi)))
    }

    pub fn init(self) -> Self {
        self.radio.init(self.callbacks()).unwrap();
        self
    }

    pub fn events(&self) -> Vec<Cb> {
        self.log.lock().unwrap().clone()
    }

    pub fn take_events(&self) -> Vec<Cb> {
        std::mem::take(&mut *self.log.lock().unwrap())
    }

    /// Return received packets to the pool.
    pub fn recycle_received(&self) {
        for packet in self.received.lock().unwrap().drain(..) {
            self.pool.release(packet);
        }
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Deliver a complete frame as the transceiver would.
    pub fn receive_frame(&self, data: &[u8], rssi: i16) {
        self.radio.handle_event(HwEvent::SyncDetected { length: data.len() });
        self.radio.handle_event(HwEvent::RxDone {
            data: data.to_vec(),
            lqi: 50,
            rssi,
            crc: d7a_phy::phy::packet::CrcStatus::Valid,
        });
    }
}

/// 868 MHz, normal rate, PN9, center index 0.
pub fn channel_868() -> ChannelId {
    ChannelId::new(FrequencyBand::Band868, ChannelClass::NormalRate, Coding::Pn9, 0)
}

pub fn rx_config() -> RxConfig {
    RxConfig::new(channel_868(), SyncwordClass::Class0)
}

pub fn tx_packet(payload: &[u8], eirp: i8) -> Packet {
    Packet::new_tx(TxConfig::new(channel_868(), SyncwordClass::Class0, eirp), payload)
}
