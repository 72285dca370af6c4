//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while decoding a message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Empty frame")]
    EmptyFrame,

    #[error("Unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    #[error("Unexpected end of data")]
    UnexpectedEof,

    #[error("Invalid value {value} for {field}")]
    InvalidValue { field: &'static str, value: u32 },

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
}
