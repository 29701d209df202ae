//! The boot ROM command protocol.
//!
//! The ROM speaks a framed request/acknowledge protocol over the UART:
//! a 12-byte header carries a flag set, a ones'-sum checksum and a payload
//! length; multi-byte fields travel big-endian while the checksum is
//! computed over the little-endian (host order) image. [`brom`] holds the
//! codec, [`transaction`] the exchange state machine and [`sync`] the
//! 0x55 handshake that precedes everything else.

pub mod brom;
pub mod checksum;
pub mod sync;
pub mod transaction;
