//! Error types for xrattach.

use std::io;
use thiserror::Error;

/// Result type for xrattach operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for xrattach operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Malformed or unverifiable frame from the chip.
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    /// The chip reported a command failure.
    #[error("Chip error: {0}")]
    Chip(#[from] ChipError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unsupported operation on this platform.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The embedding application requested interruption.
    #[error("Operation interrupted")]
    Interrupted,
}

/// A response frame that could not be accepted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    /// The response did not start with the frame magic.
    #[error("response frame does not start with the BROM magic")]
    BadMagic,

    /// An acknowledgment carried a non-zero payload length.
    #[error("acknowledgment announced an unexpected payload of {0} bytes")]
    UnexpectedPayload(u32),

    /// The header checksum did not verify.
    #[error("header checksum mismatch")]
    Checksum,

    /// The response carried neither an ACK nor an ERROR flag.
    #[error("response flags {0:#04x} carry no acknowledgment")]
    NoAck(u8),
}

/// Error codes reported by the boot ROM in an ERROR frame.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ChipError {
    /// The chip did not recognize the command id.
    #[error("unknown command")]
    UnknownCommand,

    /// The chip timed out internally.
    #[error("internal timeout")]
    Timeout,

    /// The chip saw a checksum mismatch on the command or its data.
    #[error("checksum mismatch reported by chip")]
    Checksum,

    /// A command parameter was out of range.
    #[error("invalid parameter")]
    InvalidParameter,

    /// The chip could not allocate memory for the request.
    #[error("out of memory")]
    OutOfMemory,

    /// An error code this library does not know.
    #[error("unknown error code {0:#04x}")]
    Other(u8),
}

impl ChipError {
    /// Map a wire error code to its variant.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::UnknownCommand,
            2 => Self::Timeout,
            3 => Self::Checksum,
            4 => Self::InvalidParameter,
            5 => Self::OutOfMemory,
            other => Self::Other(other),
        }
    }

    /// The wire error code for this variant.
    pub fn code(self) -> u8 {
        match self {
            Self::UnknownCommand => 1,
            Self::Timeout => 2,
            Self::Checksum => 3,
            Self::InvalidParameter => 4,
            Self::OutOfMemory => 5,
            Self::Other(code) => code,
        }
    }
}
