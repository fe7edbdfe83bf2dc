//! # PHY Packets
//!
//! A [`Packet`] is the unit exchanged with the radio: up to 255 bytes of data
//! plus metadata describing either the reception or the transmission of the
//! packet. The metadata is a tagged enum, so a packet can never carry RX and
//! TX metadata at the same time.
//!
//! Packets are deliberately not `Clone`. Whoever holds the value owns the
//! buffer; the driver takes it in `send_packet` or through the alloc callback
//! and hands it back through exactly one completion callback.

use crate::phy::channel::{RxConfig, TxConfig};
use std::time::Duration;

/// Largest length representable by the one-byte length field.
pub const MAX_PACKET_LEN: usize = 255;

/// Result of the hardware CRC check on a received packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcStatus {
    Valid,
    Invalid,
    /// The driver does not support hardware CRC checking.
    Unavailable,
}

/// Metadata collected by the driver when a packet was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxMetadata {
    pub rx_cfg: RxConfig,
    pub lqi: u8,
    pub rssi: i16,
    pub crc_status: CrcStatus,
    /// Time at which the first bit of the syncword was received.
    pub timestamp: Option<Duration>,
}

/// Outcome of a transmission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Submitted or about to be submitted.
    Pending,
    Sent,
    HardwareFailure,
}

/// Settings for, and result of, a transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxMetadata {
    pub tx_cfg: TxConfig,
    /// Time at which the first bit of the syncword was sent.
    pub timestamp: Option<Duration>,
    pub status: TxStatus,
}

impl TxMetadata {
    pub fn new(tx_cfg: TxConfig) -> Self {
        Self {
            tx_cfg,
            timestamp: None,
            status: TxStatus::Pending,
        }
    }
}

/// The role a packet currently plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketMeta {
    Rx(RxMetadata),
    Tx(TxMetadata),
}

/// A length-prefixed PHY packet buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct Packet {
    data: Vec<u8>,
    capacity: usize,
    meta: Option<PacketMeta>,
}

impl Packet {
    /// An empty buffer able to hold `capacity` bytes (capped at 255).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_PACKET_LEN);
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            meta: None,
        }
    }

    /// A packet ready for `send_packet`.
    ///
    /// Payloads longer than 255 bytes are kept as-is; the driver rejects them
    /// with a size error.
    pub fn new_tx(tx_cfg: TxConfig, payload: &[u8]) -> Self {
        Self {
            data: payload.to_vec(),
            capacity: payload.len().max(MAX_PACKET_LEN),
            meta: Some(PacketMeta::Tx(TxMetadata::new(tx_cfg))),
        }
    }

    /// Value of the length field.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Replace the contents, truncating to the buffer capacity.
    ///
    /// Returns the number of bytes stored.
    pub fn fill(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.capacity);
        self.data.clear();
        self.data.extend_from_slice(&bytes[..n]);
        n
    }

    pub fn meta(&self) -> Option<&PacketMeta> {
        self.meta.as_ref()
    }

    pub fn rx_meta(&self) -> Option<&RxMetadata> {
        match &self.meta {
            Some(PacketMeta::Rx(meta)) => Some(meta),
            _ => None,
        }
    }

    pub fn tx_meta(&self) -> Option<&TxMetadata> {
        match &self.meta {
            Some(PacketMeta::Tx(meta)) => Some(meta),
            _ => None,
        }
    }

    pub fn tx_meta_mut(&mut self) -> Option<&mut TxMetadata> {
        match &mut self.meta {
            Some(PacketMeta::Tx(meta)) => Some(meta),
            _ => None,
        }
    }

    /// Switch the packet to the inbound role.
    pub fn set_rx_meta(&mut self, meta: RxMetadata) {
        self.meta = Some(PacketMeta::Rx(meta));
    }

    /// Switch the packet to the outbound role.
    pub fn set_tx_meta(&mut self, meta: TxMetadata) {
        self.meta = Some(PacketMeta::Tx(meta));
    }

    /// Drop contents and metadata, keeping the capacity.
    pub fn reset(&mut self) {
        self.data.clear();
        self.meta = None;
    }
}
