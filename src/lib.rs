//! # d7a-phy - A PHY driver contract for DASH7 (D7A) radios
//!
//! The crate implements the physical-layer side of a D7A stack: the radio
//! state machine arbitrating a half-duplex transceiver between IDLE, RX and
//! TX, the buffer ownership protocol between driver and upper layer, the
//! channel and access-profile model, and RSSI validity tracking.
//!
//! ## Features
//!
//! - `Radio` state machine with TX pre-empting RX and deferred IDLE/RX requests
//! - Callback based packet buffer protocol with an optional `PacketPool`
//! - Access profiles with per sub-band EIRP, CCA and duty-cycle limits
//! - DLL header and channel id codecs
//! - Unsolicited frame dispatch for gateway applications
//! - JSON configuration, `log` based logging and a simulated transceiver
//!
//! ## Usage
//!
//! ```rust
//! use d7a_phy::phy::sim::{ManualClock, SimulatedHal};
//! use d7a_phy::{gateway_profiles, PacketPool, Radio, RadioCallbacks, RadioSettings, RxConfig};
//!
//! let settings = RadioSettings {
//!     access_profiles: gateway_profiles(),
//!     ..RadioSettings::default()
//! };
//! let radio = Radio::new(SimulatedHal::new(), ManualClock::new(), settings);
//! let pool = PacketPool::new(4, 255);
//! radio
//!     .init(
//!         RadioCallbacks::new()
//!             .with_pool(&pool)
//!             .on_rx(|packet| log::info!("RX {} bytes", packet.len()))
//!             .on_tx(|_| {})
//!             .on_rssi_valid(|rssi| log::info!("RSSI {rssi} dBm")),
//!     )
//!     .unwrap();
//!
//! let channel = gateway_profiles().get(0).unwrap().first_channel(0x01).unwrap();
//! radio.set_rx(RxConfig::new(channel, Default::default())).unwrap();
//! assert!(radio.is_rx());
//! ```

pub mod config;
pub mod dispatch;
pub mod dll;
pub mod error;
pub mod logging;
pub mod phy;
pub mod sched;
pub mod util;

pub use crate::config::PhyConfig;
pub use crate::error::{ConfigError, PhyError, SendRejected};
pub use crate::logging::{init_logger, log_info};

pub use dispatch::{Dispatcher, ResultMetadata, SequenceTally, UnsolicitedHandler};
pub use dll::{DllHeader, HeaderError};
pub use phy::{
    gateway_profiles, AccessClass, AccessProfile, AccessProfileTable, ChannelId, HwEvent, Packet,
    PacketPool, Radio, RadioCallbacks, RadioHal, RadioSettings, RadioState, RxConfig, TxConfig,
    RSSI_INVALID,
};
pub use sched::{Scheduler, Timer, TokioScheduler};
