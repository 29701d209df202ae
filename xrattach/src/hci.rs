//! Post-boot HCI commands spoken to the loaded firmware.
//!
//! Once the firmware is running the link speaks plain H4 HCI. Only the
//! handful of commands needed to finish bring-up live here: reset, the
//! vendor baud-rate update and the vendor device-address write.

use log::{debug, trace};

use crate::bdaddr::BdAddr;
use crate::error::Result;
use crate::port::Port;

/// `HCI_Reset`.
const CMD_RESET: [u8; 4] = [0x01, 0x03, 0x0c, 0x00];

/// Vendor command updating the firmware's UART baud rate; a u32
/// little-endian baud value follows.
const CMD_UPDATE_BAUD: [u8; 4] = [0x01, 0x18, 0xfc, 0x04];

/// Vendor command writing the device address; six address bytes follow,
/// least significant first.
const CMD_WRITE_BD_ADDR: [u8; 7] = [0x01, 0x0a, 0xfc, 0x09, 0x02, 0x00, 0x06];

/// Reset the controller and wait for its event.
pub fn reset(port: &mut dyn Port) -> Result<Vec<u8>> {
    debug!("HCI reset");
    port.write_all_bytes(&CMD_RESET)?;
    read_event(port)
}

/// Tell the firmware to switch its UART to `baud`.
///
/// The caller still has to switch the local port afterwards.
pub fn update_baud_rate(port: &mut dyn Port, baud: u32) -> Result<Vec<u8>> {
    debug!("HCI vendor baud update to {baud}");
    let mut command = Vec::with_capacity(CMD_UPDATE_BAUD.len() + 4);
    command.extend_from_slice(&CMD_UPDATE_BAUD);
    command.extend_from_slice(&baud.to_le_bytes());
    port.write_all_bytes(&command)?;
    read_event(port)
}

/// Program the controller's device address.
pub fn write_bd_addr(port: &mut dyn Port, addr: &BdAddr) -> Result<Vec<u8>> {
    debug!("HCI vendor device address write: {addr}");
    let mut command = Vec::with_capacity(CMD_WRITE_BD_ADDR.len() + 6);
    command.extend_from_slice(&CMD_WRITE_BD_ADDR);
    command.extend_from_slice(addr.as_wire());
    port.write_all_bytes(&command)?;
    read_event(port)
}

/// Read one HCI event: a 3-byte header, then as many parameter bytes as
/// the header announces.
pub fn read_event(port: &mut dyn Port) -> Result<Vec<u8>> {
    let mut head = [0u8; 3];
    port.read_exact_bytes(&mut head)?;
    let mut event = head.to_vec();
    let param_len = usize::from(head[2]);
    if param_len > 0 {
        let mut params = vec![0u8; param_len];
        port.read_exact_bytes(&mut params)?;
        event.extend_from_slice(&params);
    }
    trace!("HCI event: {event:02x?}");
    Ok(event)
}
