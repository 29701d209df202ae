//! # xrattach
//!
//! A library for bringing up XRadio Bluetooth chips (AW1722/AW1732 class,
//! e.g. XR829) attached over a UART.
//!
//! The boot ROM on these chips speaks a small framed command protocol.
//! This crate provides:
//!
//! - the frame codec and its ones'-sum checksum discipline
//! - the 0x55 sync handshake with its power-cycle escape hatch
//! - the command/acknowledgment transaction state machine
//! - a chunked firmware loader with jump-to-entry
//! - platform glue: rfkill power switching, `/proc/bluetooth/sleep`
//!   wake/low-power nodes, HCI line-discipline attach (Linux)
//! - post-boot HCI vendor commands (baud update, device address)
//! - a bring-up sequencer tying the above together
//!
//! ## Example
//!
//! ```rust,no_run
//! use xrattach::{
//!     bringup::{Bringup, BringupOptions},
//!     chip::{ChipConfig, ChipVariant},
//!     platform::{lpm::LpmControl, rfkill::Rfkill},
//!     port::{NativePort, SerialConfig},
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut port = NativePort::open(&SerialConfig::new("/dev/ttyS1", 115200))?;
//!     let mut power = Rfkill::discover()?;
//!     let mut wake = LpmControl::new();
//!
//!     let chip = ChipConfig::new(ChipVariant::Aw1732);
//!     let options = BringupOptions::new("/lib/firmware/fw_xr829_bt.bin");
//!
//!     let mut session = Bringup::new(&mut port, &mut power, &mut wake, chip, options);
//!     session.run(&mut |sent, total| {
//!         println!("firmware: {sent}/{total}");
//!     })?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod bdaddr;
pub mod bringup;
pub mod chip;
pub mod detect;
pub mod error;
pub mod hci;
pub mod loader;
pub mod platform;
pub mod port;
pub mod protocol;

#[cfg(test)]
pub(crate) mod testutil;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications). The sync
/// handshake in particular retries forever and relies on this to bail out.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    use std::sync::atomic::{AtomicBool, Ordering};

    static TEST_INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    let flag = TEST_INTERRUPT_FLAG
        .get_or_init(|| {
            let shared = Arc::new(AtomicBool::new(false));
            let checker = Arc::clone(&shared);
            set_interrupt_checker(move || checker.load(Ordering::Relaxed));
            shared
        })
        .clone();

    flag.store(value, Ordering::Relaxed);
}

// Re-exports for convenience
pub use {
    bdaddr::BdAddr,
    bringup::{Bringup, BringupOptions},
    chip::{ChipConfig, ChipVariant},
    detect::{DetectedPort, UsbBridge, auto_detect_port, detect_ports},
    error::{ChipError, Error, FramingError, Result},
    platform::{PowerControl, WakeControl, lpm::WakeAction},
    port::{Clear, NativePort, Port, SerialConfig},
    protocol::{
        brom::{Command, Header, MemWidth},
        sync::{SyncState, synchronize},
        transaction::transact,
    },
};
