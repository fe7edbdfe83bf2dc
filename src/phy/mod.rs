//! # D7A Physical Layer
//!
//! The PHY driver contract: channel model, access profiles, packet buffers,
//! the radio state machine and the hardware boundary below it.

pub mod access_profile;
pub mod buffer;
pub mod channel;
pub mod hal;
pub mod packet;
pub mod radio;
pub mod rssi;
pub mod sim;

pub use access_profile::{
    gateway_profiles, AccessClass, AccessProfile, AccessProfileTable, SubBand, SubProfile,
};
pub use buffer::{PacketPool, PoolStats, RadioCallbacks};
pub use channel::{
    ChannelClass, ChannelError, ChannelHeader, ChannelId, Coding, FrequencyBand, RxConfig,
    SyncwordClass, TxConfig,
};
pub use hal::{Clock, HalError, HwEvent, RadioHal, SystemClock};
pub use packet::{CrcStatus, Packet, PacketMeta, RxMetadata, TxMetadata, TxStatus, MAX_PACKET_LEN};
pub use radio::{Radio, RadioSettings, RadioState, RadioStats};
pub use rssi::{RssiTracker, RSSI_INVALID};
