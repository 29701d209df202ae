//! Handing the UART over to the kernel's HCI line discipline.
//!
//! After bring-up the tty is switched to the `N_HCI` line discipline and
//! the H4 UART protocol, at which point the kernel owns the link and a
//! `hci0` device appears.

use std::io;
use std::os::unix::io::RawFd;

use log::debug;

use crate::error::{Error, Result};

/// N_HCI line discipline number from the kernel UAPI.
const N_HCI: libc::c_int = 15;

/// `HCIUARTSETPROTO`, `_IOW('U', 200, int)`.
const HCIUARTSETPROTO: libc::c_ulong = 0x400455c8;

/// Plain H4 UART transport.
const HCI_UART_H4: libc::c_int = 0;

/// Attach the H4 HCI line discipline to an open tty.
#[allow(unsafe_code)]
pub fn attach_h4(fd: RawFd) -> Result<()> {
    debug!("attaching N_HCI line discipline (H4) to fd {fd}");

    // SAFETY: both ioctls operate on a descriptor we hold open, with
    // argument types matching the kernel interface.
    let rc = unsafe { libc::ioctl(fd, libc::TIOCSETD, &N_HCI) };
    if rc < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }

    #[allow(clippy::cast_possible_truncation)] // request codes fit every libc signature
    let rc = unsafe { libc::ioctl(fd, HCIUARTSETPROTO as _, HCI_UART_H4) };
    if rc < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }

    Ok(())
}
