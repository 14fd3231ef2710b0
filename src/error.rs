use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by a register transport.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ModbusError {
    #[error("io error: {0}")]
    Io(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("exception response: {0}")]
    Exception(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("short response: expected {expected} registers, got {got}")]
    ShortResponse { expected: u16, got: usize },

    #[error("not connected")]
    NotConnected,
}

impl ModbusError {
    /// Whether the error leaves the socket in an unknown state.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Connection(_) | Self::Timeout(_) | Self::NotConnected)
    }
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CodecError {
    #[error("illegal register count {got}, expected {expected}")]
    Size { expected: usize, got: usize },

    #[error("bit {bit} does not fit a {width}-bit field")]
    BitOutOfRange { bit: u8, width: u8 },

    #[error("bit {0} labelled twice")]
    DuplicateBit(u8),
}
