//! # Utility Modules
//!
//! Hex conversion and logging helpers shared by the driver and the command
//! line tool.

pub mod hex;
pub mod logging;

pub use hex::{decode_hex, encode_hex, format_hex_compact, pretty_hex, HexError};
pub use logging::{log_frame_hex, LogThrottle, ThrottleManager};
