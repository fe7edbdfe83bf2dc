//! # Channel Identification
//!
//! A D7A channel is identified by a one-byte channel header (coding, rate class
//! and frequency band) followed by a one-byte center frequency index.
//!
//! ## Wire Layout
//!
//! ```text
//! byte 0:  bits [1:0] coding | bits [3:2] class | bits [7:4] frequency band
//! byte 1:  center frequency index
//! ```
//!
//! The accessors below use explicit shifts and masks so the layout never
//! depends on compiler bitfield ordering.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CODING_MASK: u8 = 0x03;
const CLASS_SHIFT: u8 = 2;
const CLASS_MASK: u8 = 0x03;
const BAND_SHIFT: u8 = 4;
const BAND_MASK: u8 = 0x0F;

/// Channel spacing of the center frequency index, in Hz.
pub const CHANNEL_SPACING_HZ: u32 = 25_000;

/// Errors decoding a channel header or an RX/TX configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("Reserved frequency band value: 0x{0:X}")]
    ReservedBand(u8),

    #[error("Invalid syncword class: {0}")]
    InvalidSyncwordClass(u8),

    #[error("Channel id truncated: need 2 bytes, got {0}")]
    Truncated(usize),
}

/// Channel coding (bits [1:0] of the channel header).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coding {
    Pn9 = 0,
    Rfu = 1,
    FecPn9 = 2,
    Cw = 3,
}

impl From<u8> for Coding {
    fn from(bits: u8) -> Self {
        match bits & CODING_MASK {
            0 => Coding::Pn9,
            1 => Coding::Rfu,
            2 => Coding::FecPn9,
            _ => Coding::Cw,
        }
    }
}

/// Channel rate class (bits [3:2] of the channel header).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelClass {
    LoRate = 0,
    Rfu = 1,
    NormalRate = 2,
    HiRate = 3,
}

impl From<u8> for ChannelClass {
    fn from(bits: u8) -> Self {
        match bits & CLASS_MASK {
            0 => ChannelClass::LoRate,
            1 => ChannelClass::Rfu,
            2 => ChannelClass::NormalRate,
            _ => ChannelClass::HiRate,
        }
    }
}

/// Frequency band (bits [7:4] of the channel header).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrequencyBand {
    #[serde(rename = "433")]
    Band433 = 2,
    #[serde(rename = "868")]
    Band868 = 3,
    #[serde(rename = "915")]
    Band915 = 4,
}

impl FrequencyBand {
    /// Frequency of center index 0 in this band.
    pub fn base_frequency_hz(self) -> u32 {
        match self {
            FrequencyBand::Band433 => 433_056_000,
            FrequencyBand::Band868 => 863_000_000,
            FrequencyBand::Band915 => 902_000_000,
        }
    }
}

impl TryFrom<u8> for FrequencyBand {
    type Error = ChannelError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits & BAND_MASK {
            2 => Ok(FrequencyBand::Band433),
            3 => Ok(FrequencyBand::Band868),
            4 => Ok(FrequencyBand::Band915),
            other => Err(ChannelError::ReservedBand(other)),
        }
    }
}

/// The one-byte channel header shared by a channel id and an access profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelHeader {
    pub coding: Coding,
    pub class: ChannelClass,
    pub freq_band: FrequencyBand,
}

impl ChannelHeader {
    pub const fn new(freq_band: FrequencyBand, class: ChannelClass, coding: Coding) -> Self {
        Self {
            coding,
            class,
            freq_band,
        }
    }

    /// Pack into the raw header byte.
    pub fn to_byte(self) -> u8 {
        (self.coding as u8 & CODING_MASK)
            | ((self.class as u8 & CLASS_MASK) << CLASS_SHIFT)
            | ((self.freq_band as u8 & BAND_MASK) << BAND_SHIFT)
    }

    /// Unpack a raw header byte. Reserved band values are rejected.
    pub fn from_byte(byte: u8) -> Result<Self, ChannelError> {
        Ok(Self {
            coding: Coding::from(byte),
            class: ChannelClass::from(byte >> CLASS_SHIFT),
            freq_band: FrequencyBand::try_from(byte >> BAND_SHIFT)?,
        })
    }
}

/// Identifies a radio channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId {
    pub header: ChannelHeader,
    pub center_freq_index: u8,
}

impl ChannelId {
    pub const fn new(
        freq_band: FrequencyBand,
        class: ChannelClass,
        coding: Coding,
        center_freq_index: u8,
    ) -> Self {
        Self {
            header: ChannelHeader::new(freq_band, class, coding),
            center_freq_index,
        }
    }

    pub fn coding(&self) -> Coding {
        self.header.coding
    }

    pub fn class(&self) -> ChannelClass {
        self.header.class
    }

    pub fn freq_band(&self) -> FrequencyBand {
        self.header.freq_band
    }

    /// Center frequency of this channel in Hz.
    pub fn center_frequency_hz(&self) -> u32 {
        self.header.freq_band.base_frequency_hz()
            + u32::from(self.center_freq_index) * CHANNEL_SPACING_HZ
    }

    /// Encode as `[header, center_freq_index]`.
    pub fn to_bytes(&self) -> [u8; 2] {
        [self.header.to_byte(), self.center_freq_index]
    }

    /// Decode from the first two bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChannelError> {
        match bytes {
            [header, index, ..] => Ok(Self {
                header: ChannelHeader::from_byte(*header)?,
                center_freq_index: *index,
            }),
            _ => Err(ChannelError::Truncated(bytes.len())),
        }
    }
}

/// Selects the preamble/synchronization pattern used to detect frame start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncwordClass {
    #[default]
    Class0 = 0,
    Class1 = 1,
}

impl TryFrom<u8> for SyncwordClass {
    type Error = ChannelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SyncwordClass::Class0),
            1 => Ok(SyncwordClass::Class1),
            other => Err(ChannelError::InvalidSyncwordClass(other)),
        }
    }
}

/// Configuration under which the radio listens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RxConfig {
    pub channel_id: ChannelId,
    pub syncword_class: SyncwordClass,
}

impl RxConfig {
    pub fn new(channel_id: ChannelId, syncword_class: SyncwordClass) -> Self {
        Self {
            channel_id,
            syncword_class,
        }
    }
}

/// Per-packet transmission settings.
///
/// `eirp` is requested in dBm. The driver clamps it to the nearest supported
/// value instead of rejecting it and writes the applied value back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxConfig {
    pub channel_id: ChannelId,
    pub syncword_class: SyncwordClass,
    pub eirp: i8,
}

impl TxConfig {
    pub fn new(channel_id: ChannelId, syncword_class: SyncwordClass, eirp: i8) -> Self {
        Self {
            channel_id,
            syncword_class,
            eirp,
        }
    }

    /// The receive configuration on the same channel and syncword class.
    pub fn rx_config(&self) -> RxConfig {
        RxConfig::new(self.channel_id, self.syncword_class)
    }
}

/// Clamp a requested EIRP into `[min, max]`.
pub fn clamp_eirp(requested: i8, min: i8, max: i8) -> i8 {
    requested.clamp(min, max.max(min))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_header_bit_layout() {
        let header = ChannelHeader::new(FrequencyBand::Band868, ChannelClass::NormalRate, Coding::Pn9);
        // band 3 << 4 | class 2 << 2 | coding 0
        assert_eq!(header.to_byte(), 0x38);

        let header = ChannelHeader::new(FrequencyBand::Band433, ChannelClass::HiRate, Coding::FecPn9);
        assert_eq!(header.to_byte(), 0x2E);
    }

    #[test]
    fn test_decode_channel_id() {
        let channel = ChannelId::from_bytes(&[0x38, 0x10]).unwrap();
        assert_eq!(channel.freq_band(), FrequencyBand::Band868);
        assert_eq!(channel.class(), ChannelClass::NormalRate);
        assert_eq!(channel.coding(), Coding::Pn9);
        assert_eq!(channel.center_freq_index, 0x10);
    }

    #[test]
    fn test_reserved_band_rejected() {
        assert_eq!(
            ChannelId::from_bytes(&[0x58, 0x00]),
            Err(ChannelError::ReservedBand(5))
        );
        assert_eq!(ChannelId::from_bytes(&[0x38]), Err(ChannelError::Truncated(1)));
    }

    #[test]
    fn test_center_frequency() {
        let channel = ChannelId::new(FrequencyBand::Band868, ChannelClass::NormalRate, Coding::Pn9, 4);
        assert_eq!(channel.center_frequency_hz(), 863_100_000);
    }

    #[test]
    fn test_clamp_eirp() {
        assert_eq!(clamp_eirp(20, -39, 10), 10);
        assert_eq!(clamp_eirp(-50, -39, 10), -39);
        assert_eq!(clamp_eirp(5, -39, 10), 5);
    }

    #[test]
    fn test_syncword_class() {
        assert_eq!(SyncwordClass::try_from(1u8), Ok(SyncwordClass::Class1));
        assert!(SyncwordClass::try_from(2u8).is_err());
    }

    proptest! {
        #[test]
        fn prop_channel_id_bytes_roundtrip(low in 0u8..16, band in 2u8..=4, index in any::<u8>()) {
            let bytes = [(band << 4) | low, index];
            let channel = ChannelId::from_bytes(&bytes).unwrap();
            prop_assert_eq!(channel.to_bytes(), bytes);
        }

        #[test]
        fn prop_reserved_bands_rejected(low in 0u8..16, band in 5u8..16) {
            let result = ChannelId::from_bytes(&[(band << 4) | low, 0]);
            prop_assert_eq!(result, Err(ChannelError::ReservedBand(band)));
        }
    }
}
