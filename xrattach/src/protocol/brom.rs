//! Frame codec for the boot ROM protocol.
//!
//! ## Frame Format
//!
//! Every command and every acknowledgment starts with the same 12-byte
//! header:
//!
//! ```text
//! +----------+-------+---------+----------+-------------+
//! |  Magic   | Flags | Version | Checksum | Payload len |
//! +----------+-------+---------+----------+-------------+
//! | 4 bytes  | 1     | 1       | 2        | 4           |
//! |  "BROM"  | bits  | 0       | ~sum16   | bytes after |
//! +----------+-------+---------+----------+-------------+
//! ```
//!
//! The ROM computes the checksum over the frame laid out in host
//! (little-endian) order with the checksum field zeroed, then byte-swaps
//! every multi-byte scalar to big-endian for the wire. Decoding reverses
//! the swap before verifying.

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::FramingError;
use crate::protocol::checksum;

/// Frame magic.
pub const MAGIC: [u8; 4] = *b"BROM";

/// Header length in bytes.
pub const HEADER_LEN: usize = 12;

/// Byte written repeatedly during the sync handshake.
pub const SYNC_BYTE: u8 = 0x55;

/// Sync reply: ROM is ready.
pub const SYNC_ACK_READY: [u8; 2] = *b"OK";

/// Sync reply: ROM is alive but mid-operation. Still counts as synced.
pub const SYNC_ACK_BUSY: [u8; 2] = *b"KO";

/// Header flag bits.
pub mod flags {
    /// The frame reports an error; one error-code byte follows.
    pub const ERROR: u8 = 0x01;
    /// The frame acknowledges a command.
    pub const ACK: u8 = 0x02;
    /// The header checksum is filled in and must verify.
    pub const CHECK: u8 = 0x04;
    /// The sender asks for a retransmission.
    pub const RETRY: u8 = 0x08;
    /// The payload is executable.
    pub const EXE: u8 = 0x10;
}

const fn cmd_id(group: u8, key: u8) -> u8 {
    (group << 3) | key
}

/// Command identifiers, `(group << 3) | key`.
pub mod cmd {
    use super::cmd_id;

    const GROUP_MEMRW: u8 = 0;
    const GROUP_SEQ: u8 = 1;
    const GROUP_SYSCTL: u8 = 2;
    const GROUP_FLASH: u8 = 3;

    /// Read a single byte.
    pub const MEM_READ1: u8 = cmd_id(GROUP_MEMRW, 0);
    /// Write a single byte.
    pub const MEM_WRITE1: u8 = cmd_id(GROUP_MEMRW, 1);
    /// Read a 16-bit word.
    pub const MEM_READ2: u8 = cmd_id(GROUP_MEMRW, 2);
    /// Write a 16-bit word.
    pub const MEM_WRITE2: u8 = cmd_id(GROUP_MEMRW, 3);
    /// Read a 32-bit word.
    pub const MEM_READ4: u8 = cmd_id(GROUP_MEMRW, 4);
    /// Write a 32-bit word.
    pub const MEM_WRITE4: u8 = cmd_id(GROUP_MEMRW, 5);
    /// Read a 64-bit word.
    pub const MEM_READ8: u8 = cmd_id(GROUP_MEMRW, 6);
    /// Write a 64-bit word.
    pub const MEM_WRITE8: u8 = cmd_id(GROUP_MEMRW, 7);

    /// Sequential read from memory.
    pub const SEQ_READ: u8 = cmd_id(GROUP_SEQ, 0);
    /// Sequential write to memory; the data follows as a second phase.
    pub const SEQ_WRITE: u8 = cmd_id(GROUP_SEQ, 1);

    /// Reconfigure the ROM's UART.
    pub const SET_UART: u8 = cmd_id(GROUP_SYSCTL, 0);
    /// Enable or disable JTAG.
    pub const SET_JTAG: u8 = cmd_id(GROUP_SYSCTL, 1);
    /// Reboot the chip.
    pub const REBOOT: u8 = cmd_id(GROUP_SYSCTL, 2);
    /// Set the program counter (jump to entry point).
    pub const SET_PC: u8 = cmd_id(GROUP_SYSCTL, 3);
    /// Select the clock source.
    pub const SET_CLOCK: u8 = cmd_id(GROUP_SYSCTL, 4);

    /// Query flash geometry.
    pub const FLASH_GET_INFO: u8 = cmd_id(GROUP_FLASH, 0);
    /// Erase a flash region.
    pub const FLASH_ERASE: u8 = cmd_id(GROUP_FLASH, 1);
    /// Read from flash.
    pub const FLASH_READ: u8 = cmd_id(GROUP_FLASH, 2);
    /// Write to flash.
    pub const FLASH_WRITE: u8 = cmd_id(GROUP_FLASH, 3);
}

/// UART line control word for [`Command::SetUart`]: baud rate in the low
/// 24 bits, 8-bit character framing selected by the high byte.
pub fn uart_lcr(baud: u32) -> u32 {
    baud | (3 << 24)
}

/// Access width for the single-value memory commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemWidth {
    /// One byte.
    One = 1,
    /// Two bytes.
    Two = 2,
    /// Four bytes.
    Four = 4,
    /// Eight bytes.
    Eight = 8,
}

/// A command frame the host can send. Exactly one is in flight at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Write a single value of `width` bytes to `addr`.
    MemWrite {
        /// Target address.
        addr: u32,
        /// Access width.
        width: MemWidth,
        /// Value, little-endian truncated to `width` bytes.
        value: u64,
    },
    /// Stream `data` to consecutive addresses starting at `addr`.
    ///
    /// The command frame announces the length and the complement checksum
    /// of the data; the data itself follows as a raw second phase with its
    /// own acknowledgment.
    SeqWrite {
        /// Start address.
        addr: u32,
        /// Data to stream.
        data: &'a [u8],
    },
    /// Reconfigure the ROM's UART, see [`uart_lcr`].
    SetUart {
        /// Line control word.
        lcr: u32,
    },
    /// Jump to `addr`.
    SetJump {
        /// Entry point address.
        addr: u32,
    },
}

impl<'a> Command<'a> {
    /// The command id byte for this variant.
    pub fn id(&self) -> u8 {
        match self {
            Self::MemWrite { width, .. } => match width {
                MemWidth::One => cmd::MEM_WRITE1,
                MemWidth::Two => cmd::MEM_WRITE2,
                MemWidth::Four => cmd::MEM_WRITE4,
                MemWidth::Eight => cmd::MEM_WRITE8,
            },
            Self::SeqWrite { .. } => cmd::SEQ_WRITE,
            Self::SetUart { .. } => cmd::SET_UART,
            Self::SetJump { .. } => cmd::SET_PC,
        }
    }

    /// Payload length announced in the header.
    pub fn payload_len(&self) -> usize {
        match self {
            Self::MemWrite { width, .. } => 1 + 4 + *width as usize,
            Self::SeqWrite { .. } => 1 + 4 + 4 + 2,
            Self::SetUart { .. } | Self::SetJump { .. } => 1 + 4,
        }
    }

    /// Raw bytes sent as a second phase after the command is acknowledged.
    pub fn data_phase(&self) -> Option<&'a [u8]> {
        match *self {
            Self::SeqWrite { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Encode the command into its wire frame.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    #[allow(clippy::cast_possible_truncation)] // payloads are a few bytes
    pub fn encode(&self) -> Vec<u8> {
        let payload_len = self.payload_len();
        let mut buf = Vec::with_capacity(HEADER_LEN + payload_len);

        // Header and payload in host order first; the checksum covers
        // this layout.
        buf.extend_from_slice(&MAGIC);
        buf.push(flags::CHECK);
        buf.push(0); // version 0, reserved 0
        buf.write_u16::<LittleEndian>(0).unwrap(); // checksum, patched below
        buf.write_u32::<LittleEndian>(payload_len as u32).unwrap();
        buf.push(self.id());

        // Multi-byte scalars recorded here are byte-swapped for the wire.
        let mut scalars: Vec<(usize, usize)> = vec![(6, 2), (8, 4)];
        match *self {
            Self::MemWrite { addr, width, value } => {
                scalars.push((buf.len(), 4));
                buf.write_u32::<LittleEndian>(addr).unwrap();
                buf.extend_from_slice(&value.to_le_bytes()[..width as usize]);
            },
            Self::SeqWrite { addr, data } => {
                scalars.push((buf.len(), 4));
                buf.write_u32::<LittleEndian>(addr).unwrap();
                scalars.push((buf.len(), 4));
                buf.write_u32::<LittleEndian>(data.len() as u32).unwrap();
                scalars.push((buf.len(), 2));
                buf.write_u16::<LittleEndian>(checksum::checksum(data))
                    .unwrap();
            },
            Self::SetUart { lcr } => {
                scalars.push((buf.len(), 4));
                buf.write_u32::<LittleEndian>(lcr).unwrap();
            },
            Self::SetJump { addr } => {
                scalars.push((buf.len(), 4));
                buf.write_u32::<LittleEndian>(addr).unwrap();
            },
        }

        let cs = checksum::checksum(&buf);
        buf[6..8].copy_from_slice(&cs.to_le_bytes());

        for (offset, len) in scalars {
            buf[offset..offset + len].reverse();
        }
        buf
    }
}

/// A decoded response header, fields in host order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Flag bits, see [`flags`].
    pub flags: u8,
    /// Raw version byte: version in the low nibble, reserved bits above.
    pub version: u8,
    /// Complement checksum as sent by the chip.
    pub checksum: u16,
    /// Number of payload bytes that follow the header.
    pub payload_len: u32,
}

impl Header {
    /// Parse a wire header, converting the scalar fields to host order.
    pub fn parse(raw: &[u8; HEADER_LEN]) -> Result<Self, FramingError> {
        if raw[0..4] != MAGIC {
            return Err(FramingError::BadMagic);
        }
        Ok(Self {
            flags: raw[4],
            version: raw[5],
            checksum: u16::from_be_bytes([raw[6], raw[7]]),
            payload_len: u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]),
        })
    }

    /// Whether the given flag bit is set.
    pub fn has(self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    /// The header bytes as the chip checksummed them: host order.
    fn host_image(self) -> [u8; HEADER_LEN] {
        let mut image = [0u8; HEADER_LEN];
        image[0..4].copy_from_slice(&MAGIC);
        image[4] = self.flags;
        image[5] = self.version;
        image[6..8].copy_from_slice(&self.checksum.to_le_bytes());
        image[8..12].copy_from_slice(&self.payload_len.to_le_bytes());
        image
    }

    /// Verify the complement checksum over the host-order image.
    pub fn checksum_ok(self) -> bool {
        checksum::verify(&self.host_image())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_wire(frame: &[u8]) -> Header {
        let mut raw = [0u8; HEADER_LEN];
        raw.copy_from_slice(&frame[..HEADER_LEN]);
        Header::parse(&raw).expect("valid header")
    }

    #[test]
    fn test_set_jump_frame_layout() {
        let frame = Command::SetJump { addr: 0x00010203 }.encode();
        assert_eq!(frame.len(), HEADER_LEN + 5);
        assert_eq!(&frame[0..4], b"BROM");
        assert_eq!(frame[4], flags::CHECK);
        assert_eq!(frame[5], 0);
        // payload_len big-endian on the wire
        assert_eq!(&frame[8..12], &[0, 0, 0, 5]);
        assert_eq!(frame[12], cmd::SET_PC);
        // address big-endian on the wire
        assert_eq!(&frame[13..17], &[0x00, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_encoded_header_verifies_after_decode() {
        let chunk = [0xA5u8; 64];
        let commands: [Command<'_>; 4] = [
            Command::SetJump { addr: 0xDEAD_BEEF },
            Command::SetUart { lcr: uart_lcr(1500000) },
            Command::SeqWrite { addr: 0x1000, data: &chunk },
            Command::MemWrite { addr: 0x40, width: MemWidth::Four, value: 0x1234_5678 },
        ];
        for command in commands {
            let frame = command.encode();
            let header = decode_wire(&frame);
            assert!(header.has(flags::CHECK));
            assert_eq!(header.payload_len as usize, command.payload_len());
            assert!(header.checksum_ok(), "checksum failed for {command:?}");
        }
    }

    #[test]
    fn test_corrupted_header_fails_verification() {
        let frame = Command::SetJump { addr: 0x100 }.encode();
        for byte in 0..HEADER_LEN {
            for bit in 0..8 {
                let mut corrupted = frame.clone();
                corrupted[byte] ^= 1 << bit;
                if byte < 4 {
                    // magic damage is caught before checksumming
                    let mut raw = [0u8; HEADER_LEN];
                    raw.copy_from_slice(&corrupted[..HEADER_LEN]);
                    assert_eq!(Header::parse(&raw), Err(FramingError::BadMagic));
                } else {
                    let header = decode_wire(&corrupted);
                    assert!(!header.checksum_ok());
                }
            }
        }
    }

    #[test]
    fn test_seq_write_announces_data_checksum() {
        let data = [0x01u8, 0x02, 0x03];
        let frame = Command::SeqWrite { addr: 0x2000, data: &data }.encode();
        assert_eq!(frame.len(), HEADER_LEN + 11);
        assert_eq!(frame[12], cmd::SEQ_WRITE);
        assert_eq!(&frame[13..17], &[0x00, 0x00, 0x20, 0x00]);
        assert_eq!(&frame[17..21], &[0x00, 0x00, 0x00, 0x03]);
        let dcs = u16::from_be_bytes([frame[21], frame[22]]);
        assert_eq!(dcs, !super::checksum::sum16(&data));
    }

    #[test]
    fn test_mem_write_widths_pick_ids() {
        let make = |width| Command::MemWrite { addr: 0, width, value: 0 };
        assert_eq!(make(MemWidth::One).id(), cmd::MEM_WRITE1);
        assert_eq!(make(MemWidth::Two).id(), cmd::MEM_WRITE2);
        assert_eq!(make(MemWidth::Four).id(), cmd::MEM_WRITE4);
        assert_eq!(make(MemWidth::Eight).id(), cmd::MEM_WRITE8);
        assert_eq!(make(MemWidth::Eight).payload_len(), 13);
    }

    #[test]
    fn test_command_id_table() {
        assert_eq!(cmd::SEQ_WRITE, 0x09);
        assert_eq!(cmd::SET_UART, 0x10);
        assert_eq!(cmd::SET_PC, 0x13);
        assert_eq!(cmd::FLASH_ERASE, 0x19);
    }

    #[test]
    fn test_uart_lcr_packs_baud() {
        assert_eq!(uart_lcr(1500000), 1500000 | 0x0300_0000);
    }
}
