//! Command/acknowledgment exchange with the boot ROM.
//!
//! Every exchange follows the same state machine: flush stale bytes, send
//! the command frame, read back a 12-byte header and judge it. Commands
//! with a data phase (sequential writes) then push the raw data and run
//! the acknowledgment cycle a second time.

use std::thread;
use std::time::Duration;

use log::{trace, warn};

use crate::error::{ChipError, Error, FramingError, Result};
use crate::port::{Clear, Port};
use crate::protocol::brom::{Command, HEADER_LEN, Header, flags};

/// Pause before flushing the input after a framing failure, giving the
/// chip time to finish whatever it was still sending.
const RESYNC_PAUSE: Duration = Duration::from_micros(500);

/// Execute one command against the chip.
///
/// Returns `Ok(())` once every phase of the command has been acknowledged.
pub fn transact(port: &mut dyn Port, command: &Command<'_>) -> Result<()> {
    port.clear(Clear::All)?;

    let frame = command.encode();
    trace!("command {:#04x}, {} byte frame", command.id(), frame.len());
    port.write_all_bytes(&frame)?;
    read_ack(port)?;

    if let Some(data) = command.data_phase() {
        trace!("data phase, {} bytes", data.len());
        port.write_all_bytes(data)?;
        read_ack(port)?;
    }
    Ok(())
}

/// Read and validate one acknowledgment header.
fn read_ack(port: &mut dyn Port) -> Result<()> {
    let mut raw = [0u8; HEADER_LEN];
    port.read_exact_bytes(&mut raw)?;

    let header = match Header::parse(&raw) {
        Ok(header) => header,
        Err(e) => {
            warn!("lost framing on {}, flushing input", port.name());
            thread::sleep(RESYNC_PAUSE);
            let _ = port.clear(Clear::Input);
            return Err(e.into());
        },
    };

    if header.has(flags::ERROR) {
        let mut code = [0u8; 1];
        port.read_exact_bytes(&mut code)?;
        let chip_error = ChipError::from_code(code[0]);
        warn!("chip rejected command: {chip_error}");
        return Err(Error::Chip(chip_error));
    }

    if !header.has(flags::ACK) {
        return Err(FramingError::NoAck(header.flags).into());
    }

    // A bare acknowledgment never carries a payload.
    if header.payload_len != 0 {
        let _ = port.clear(Clear::Input);
        return Err(FramingError::UnexpectedPayload(header.payload_len).into());
    }

    if header.has(flags::CHECK) && !header.checksum_ok() {
        return Err(FramingError::Checksum.into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::brom::cmd;
    use crate::testutil::{MockPort, ack_frame, corrupt_checksum, error_frame};

    #[test]
    fn test_simple_command_single_ack() {
        let mut port = MockPort::new();
        port.push_read(ack_frame().to_vec());

        let command = Command::SetJump { addr: 0x4000 };
        transact(&mut port, &command).expect("acknowledged");

        assert_eq!(port.written.len(), HEADER_LEN + 5);
        assert_eq!(port.written[12], cmd::SET_PC);
    }

    #[test]
    fn test_seq_write_runs_two_ack_cycles() {
        let mut port = MockPort::new();
        port.push_read(ack_frame().to_vec());
        port.push_read(ack_frame().to_vec());

        let data = [0x55u8; 16];
        transact(&mut port, &Command::SeqWrite { addr: 0, data: &data }).expect("acknowledged");

        // command frame followed by the raw data
        assert_eq!(port.written.len(), HEADER_LEN + 11 + data.len());
        assert_eq!(&port.written[HEADER_LEN + 11..], &data);
    }

    #[test]
    fn test_error_frame_maps_to_chip_error() {
        let mut port = MockPort::new();
        port.push_read(error_frame(3));

        let result = transact(&mut port, &Command::SetJump { addr: 0 });
        assert!(matches!(result, Err(Error::Chip(ChipError::Checksum))));
    }

    #[test]
    fn test_unknown_error_code_preserved() {
        let mut port = MockPort::new();
        port.push_read(error_frame(0x42));

        let result = transact(&mut port, &Command::SetJump { addr: 0 });
        assert!(matches!(
            result,
            Err(Error::Chip(ChipError::Other(0x42)))
        ));
    }

    #[test]
    fn test_bad_magic_flushes_input() {
        let mut port = MockPort::new();
        let mut garbage = ack_frame().to_vec();
        garbage[0] = b'X';
        port.push_read(garbage);

        let result = transact(&mut port, &Command::SetJump { addr: 0 });
        assert!(matches!(
            result,
            Err(Error::Framing(FramingError::BadMagic))
        ));
        assert!(port.cleared_input >= 1);
    }

    #[test]
    fn test_corrupted_checksum_rejected() {
        let mut port = MockPort::new();
        port.push_read(corrupt_checksum(ack_frame()).to_vec());

        let result = transact(&mut port, &Command::SetJump { addr: 0 });
        assert!(matches!(
            result,
            Err(Error::Framing(FramingError::Checksum))
        ));
    }

    #[test]
    fn test_ack_with_payload_rejected() {
        let mut port = MockPort::new();
        port.push_read(crate::testutil::ack_frame_with_payload_len(4).to_vec());

        let result = transact(&mut port, &Command::SetJump { addr: 0 });
        assert!(matches!(
            result,
            Err(Error::Framing(FramingError::UnexpectedPayload(4)))
        ));
    }

    #[test]
    fn test_timeout_surfaces_as_io_error() {
        let mut port = MockPort::new();
        port.push_timeout();

        let result = transact(&mut port, &Command::SetJump { addr: 0 });
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
