//! # PHY Error Handling
//!
//! This module defines the error types returned by the radio driver and by the
//! configuration layer. Errors follow the taxonomy of the driver contract:
//! configuration errors are reported synchronously, state errors are
//! informational, and hardware failures surface through completion callbacks.

use crate::phy::packet::Packet;
use thiserror::Error;

/// Errors returned by the radio driver operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhyError {
    /// A callback was missing, or a configuration is not permitted by the
    /// active access profile.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The radio is already receiving with the requested configuration.
    #[error("Already active")]
    AlreadyActive,

    /// The radio is already idle (or will be once the current TX finishes).
    #[error("Already idle")]
    AlreadyIdle,

    /// `init` was called a second time.
    #[error("Already initialized")]
    AlreadyInitialized,

    /// An operation was attempted before `init`.
    #[error("Radio not initialized")]
    NotInitialized,

    /// The packet length is outside the supported range.
    #[error("Invalid packet size: {len} (supported 1..={max})")]
    SizeError { len: usize, max: usize },

    /// A transmission is already in flight.
    #[error("Transmission in progress")]
    Busy,

    /// The radio hardware faulted.
    #[error("Hardware failure: {0}")]
    HardwareFailure(String),
}

/// A rejected `send_packet` call.
///
/// The packet travels back to the caller so ownership is never lost on the
/// error path.
#[derive(Debug, Error)]
#[error("send rejected: {error}")]
pub struct SendRejected {
    pub error: PhyError,
    pub packet: Packet,
}

impl SendRejected {
    pub fn new(error: PhyError, packet: Packet) -> Self {
        Self { error, packet }
    }

    /// Split into the error kind and the returned packet.
    pub fn into_parts(self) -> (PhyError, Packet) {
        (self.error, self.packet)
    }
}

/// Errors raised while loading or validating a [`crate::config::PhyConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for the expected schema.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration parsed but violates a constraint.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
