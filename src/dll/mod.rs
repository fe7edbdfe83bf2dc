//! # Data Link Layer
//!
//! Frame header codec used on top of the PHY. Only the header layout is
//! implemented here; addressing, filtering and queuing belong to the upper
//! layers.

pub mod header;

pub use header::{parse_dll_header, ControlFlags, DllHeader, HeaderError, TARGET_ADDRESS_LEN};
