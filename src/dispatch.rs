//! # Unsolicited Frame Dispatch
//!
//! Turns received packets into `(ResultMetadata, payload)` deliveries for an
//! application handler, the way a gateway consumes unsolicited reports.
//!
//! ```rust
//! use d7a_phy::dispatch::{Dispatcher, ResultMetadata};
//!
//! let mut dispatcher = Dispatcher::new(|meta: ResultMetadata, payload: &[u8]| {
//!     log::info!("RX -{} dBm, LB {}: {} bytes", meta.rx_level, meta.link_budget, payload.len());
//! });
//! assert_eq!(dispatcher.stats().delivered, 0);
//! ```

use crate::dll::header::{DllHeader, HeaderError, TARGET_ADDRESS_LEN};
use crate::phy::packet::{CrcStatus, Packet};
use crate::util::logging::{log_frame_hex, ThrottleManager};
use nom::{
    number::complete::le_u16,
    sequence::tuple,
    IResult,
};
use thiserror::Error;

/// Reception details handed to the application with each payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultMetadata {
    /// Received level as a positive number, `-rssi` dBm.
    pub rx_level: u8,
    /// Sender EIRP minus received RSSI, in dB.
    pub link_budget: u8,
    pub subnet: u8,
    pub target_address: Option<[u8; TARGET_ADDRESS_LEN]>,
    pub lqi: u8,
    pub crc_ok: bool,
}

impl ResultMetadata {
    fn from_frame(header: &DllHeader, rssi: i16, lqi: u8, crc: CrcStatus) -> Self {
        Self {
            rx_level: saturate_u8(-i32::from(rssi)),
            link_budget: saturate_u8(i32::from(header.eirp_index) - i32::from(rssi)),
            subnet: header.subnet,
            target_address: header.target().copied(),
            lqi,
            crc_ok: crc == CrcStatus::Valid,
        }
    }
}

fn saturate_u8(value: i32) -> u8 {
    value.clamp(0, i32::from(u8::MAX)) as u8
}

/// Reasons a packet was not delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Packet carries no reception metadata")]
    NotReceived,

    #[error("CRC check failed")]
    CrcInvalid,

    #[error("Bad DLL header: {0}")]
    Header(#[from] HeaderError),
}

/// Application callback for unsolicited frames.
pub trait UnsolicitedHandler {
    fn on_unsolicited(&mut self, meta: ResultMetadata, payload: &[u8]);
}

impl<F> UnsolicitedHandler for F
where
    F: FnMut(ResultMetadata, &[u8]),
{
    fn on_unsolicited(&mut self, meta: ResultMetadata, payload: &[u8]) {
        self(meta, payload)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub crc_errors: u64,
    pub header_errors: u64,
}

/// Decodes received packets and forwards the good ones to a handler.
pub struct Dispatcher<T: UnsolicitedHandler> {
    handler: T,
    stats: DispatchStats,
    throttles: ThrottleManager,
}

impl<T: UnsolicitedHandler> Dispatcher<T> {
    pub fn new(handler: T) -> Self {
        Self {
            handler,
            stats: DispatchStats::default(),
            throttles: ThrottleManager::new(),
        }
    }

    /// Deliver `packet` to the handler.
    ///
    /// Frames with an invalid CRC or an undecodable header are counted and
    /// dropped. The packet is only borrowed; returning it to its pool is up
    /// to the caller.
    pub fn dispatch(&mut self, packet: &Packet) -> Result<ResultMetadata, DispatchError> {
        let rx = packet.rx_meta().ok_or(DispatchError::NotReceived)?;
        if rx.crc_status == CrcStatus::Invalid {
            self.stats.crc_errors += 1;
            if self.throttles.allow("crc", 1000, 5) {
                log::warn!("Dropping frame with bad CRC ({} bytes)", packet.len());
            }
            return Err(DispatchError::CrcInvalid);
        }

        let (header, payload) = match DllHeader::decode(packet.data()) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.stats.header_errors += 1;
                if self.throttles.allow("header", 1000, 5) {
                    log::warn!("Dropping frame: {e}");
                }
                return Err(e.into());
            }
        };

        let meta = ResultMetadata::from_frame(&header, rx.rssi, rx.lqi, rx.crc_status);
        log_frame_hex("Unsolicited payload", payload);
        self.handler.on_unsolicited(meta, payload);
        self.stats.delivered += 1;
        Ok(meta)
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn handler(&self) -> &T {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut T {
        &mut self.handler
    }
}

/// Received vs. expected frame counts derived from a sender's sequence
/// counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TallySnapshot {
    pub received: u32,
    pub expected: u32,
}

impl TallySnapshot {
    pub fn lost(&self) -> u32 {
        self.expected.saturating_sub(self.received)
    }
}

/// Tracks how many of a sender's frames arrived.
///
/// The first counter seen opens a session; a counter lower than the session
/// base (sender restarted) opens a new one.
#[derive(Debug, Clone, Default)]
pub struct SequenceTally {
    base: Option<i64>,
    received: u32,
}

impl SequenceTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, counter: u16) -> TallySnapshot {
        let counter = i64::from(counter);
        let base = match self.base {
            Some(base) if counter >= base => {
                self.received = self.received.saturating_add(1);
                base
            }
            previous => {
                if previous.is_some() {
                    log::info!("Sequence counter restarted at {counter}");
                }
                self.base = Some(counter - 1);
                self.received = 1;
                counter - 1
            }
        };
        TallySnapshot {
            received: self.received,
            expected: u32::try_from(counter - base).unwrap_or(u32::MAX),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Sensor report carried by the gateway demo's unsolicited frames.
///
/// Little-endian 16-bit words: two reserved words, internal temperature in
/// 0.1 °C, external temperature and humidity in 0.01 units, supply voltage in
/// mV and the sender's sequence counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorReport {
    pub internal_temp_decicelsius: u16,
    pub temperature_centi: u16,
    pub humidity_centi: u16,
    pub vdd_mv: u16,
    pub counter: u16,
}

impl SensorReport {
    /// Encoded length in bytes.
    pub const LEN: usize = 14;

    pub fn parse(payload: &[u8]) -> Option<Self> {
        parse_sensor_report(payload).ok().map(|(_, report)| report)
    }

    pub fn encode(&self) -> Vec<u8> {
        [
            0,
            0,
            self.internal_temp_decicelsius,
            self.temperature_centi,
            self.humidity_centi,
            self.vdd_mv,
            self.counter,
        ]
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .collect()
    }
}

fn parse_sensor_report(input: &[u8]) -> IResult<&[u8], SensorReport> {
    let (input, (_, _, internal, temp, humidity, vdd, counter)) =
        tuple((le_u16, le_u16, le_u16, le_u16, le_u16, le_u16, le_u16))(input)?;
    Ok((
        input,
        SensorReport {
            internal_temp_decicelsius: internal,
            temperature_centi: temp,
            humidity_centi: humidity,
            vdd_mv: vdd,
            counter,
        },
    ))
}
