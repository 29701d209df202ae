//! The full bring-up sequence, from a powered-down chip to a running
//! HCI link.
//!
//! The order matters: power-cycle, wake, handshake at the default baud,
//! move the ROM to the working baud, handshake again, stream the
//! firmware, let it boot, then finish over HCI (reset, baud update,
//! device address) and hand the tty to the kernel.

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::bdaddr::{self, DEFAULT_BDADDR_FILE};
use crate::chip::ChipConfig;
use crate::error::{Error, Result};
use crate::hci;
use crate::loader::load_firmware;
use crate::platform::{POWER_OFF_SETTLE, POWER_ON_SETTLE, PowerControl, WakeControl};
use crate::platform::lpm::WakeAction;
use crate::port::Port;
use crate::protocol::brom::{Command, uart_lcr};
use crate::protocol::sync::{SyncState, synchronize};
use crate::protocol::transaction::transact;

/// Settle time after the wake line is raised.
const WAKE_SETTLE: Duration = Duration::from_millis(50);

/// Settle time after the firmware jump before the UART is touched.
const BOOT_SETTLE: Duration = Duration::from_millis(50);

/// Settle time around local baud and flow-control changes.
const LINE_SETTLE: Duration = Duration::from_millis(100);

/// Stock firmware image location.
pub const DEFAULT_FIRMWARE: &str = "/lib/firmware/fw_xr829_bt.bin";

/// What the bring-up sequence should do.
///
/// The mandatory part (power, handshake, firmware download) always runs;
/// everything after the firmware boots is individually switchable and a
/// failure there is logged rather than fatal.
#[derive(Debug, Clone)]
pub struct BringupOptions {
    /// Firmware image to download.
    pub firmware: PathBuf,
    /// Baud rate used for the download and, after the vendor update, for
    /// the HCI link.
    pub working_baud: u32,
    /// Baud rate the ROM and the freshly booted firmware start at.
    pub default_baud: u32,
    /// Issue an HCI reset once the firmware is up.
    pub startup_reset: bool,
    /// Move the HCI link to the working baud with the vendor command.
    pub update_hci_baud: bool,
    /// Program a persistent device address.
    pub set_bdaddr: bool,
    /// Where the device address is stored.
    pub bdaddr_file: PathBuf,
    /// Hand the tty to the kernel's HCI line discipline at the end.
    pub attach_line_discipline: bool,
    /// Enable low-power mode once the link is up.
    pub enable_lpm: bool,
}

impl BringupOptions {
    /// Options for a firmware image, everything else at its default.
    pub fn new(firmware: impl Into<PathBuf>) -> Self {
        Self {
            firmware: firmware.into(),
            working_baud: 1_500_000,
            default_baud: 115_200,
            startup_reset: true,
            update_hci_baud: true,
            set_bdaddr: true,
            bdaddr_file: PathBuf::from(DEFAULT_BDADDR_FILE),
            attach_line_discipline: true,
            enable_lpm: false,
        }
    }
}

impl Default for BringupOptions {
    fn default() -> Self {
        Self::new(DEFAULT_FIRMWARE)
    }
}

/// One bring-up session over a port.
pub struct Bringup<'a> {
    port: &'a mut dyn Port,
    power: &'a mut dyn PowerControl,
    wake: &'a mut dyn WakeControl,
    chip: ChipConfig,
    options: BringupOptions,
    sync: SyncState,
}

impl<'a> Bringup<'a> {
    /// Assemble a session from its platform pieces.
    pub fn new(
        port: &'a mut dyn Port,
        power: &'a mut dyn PowerControl,
        wake: &'a mut dyn WakeControl,
        chip: ChipConfig,
        options: BringupOptions,
    ) -> Self {
        Self {
            port,
            power,
            wake,
            chip,
            options,
            sync: SyncState::new(),
        }
    }

    /// Run the sequence to completion.
    ///
    /// `progress` is called with `(sent, total)` while the firmware
    /// streams out.
    pub fn run(&mut self, progress: &mut dyn FnMut(usize, usize)) -> Result<()> {
        let image = fs::read(&self.options.firmware).map_err(|e| {
            Error::Config(format!(
                "cannot read firmware {}: {e}",
                self.options.firmware.display()
            ))
        })?;

        info!(
            "bringing up {} on {} with {}",
            self.chip.variant,
            self.port.name(),
            self.options.firmware.display()
        );

        // fresh power state so the ROM is actually in its handshake loop
        self.power.set_power(false)?;
        thread::sleep(POWER_OFF_SETTLE);
        self.power.set_power(true)?;
        thread::sleep(POWER_ON_SETTLE);

        // wake nodes may not exist on this kernel
        if let Err(e) = self.wake.set_wake(WakeAction::Assert) {
            warn!("cannot assert the wake line: {e}");
        }
        if let Err(e) = self.wake.set_lpm(false) {
            warn!("cannot disable low-power mode: {e}");
        }
        thread::sleep(WAKE_SETTLE);

        synchronize(self.port, self.power, &mut self.sync)?;

        if self.options.working_baud != self.port.baud_rate() {
            debug!("moving the ROM to {} baud", self.options.working_baud);
            transact(
                self.port,
                &Command::SetUart {
                    lcr: uart_lcr(self.options.working_baud),
                },
            )?;
            self.port.set_baud_rate(self.options.working_baud)?;
            synchronize(self.port, self.power, &mut self.sync)?;
        }

        load_firmware(
            self.port,
            self.power,
            &mut self.sync,
            &self.chip,
            &image,
            progress,
        )?;
        thread::sleep(BOOT_SETTLE);

        // the booted firmware comes up at the default baud with hardware
        // flow control
        self.port.set_baud_rate(self.options.default_baud)?;
        thread::sleep(LINE_SETTLE);
        self.port.set_flow_control(true)?;
        thread::sleep(LINE_SETTLE);

        self.finish_over_hci();
        self.attach_line_discipline();

        if self.options.enable_lpm {
            if let Err(e) = self.wake.set_lpm(true) {
                warn!("cannot enable low-power mode: {e}");
            }
        }

        info!("bring-up complete");
        Ok(())
    }

    /// HCI housekeeping after the firmware boots. None of it is load
    /// bearing for the link itself, so failures only warn.
    fn finish_over_hci(&mut self) {
        if self.options.startup_reset {
            if let Err(e) = hci::reset(self.port) {
                warn!("HCI reset failed: {e}");
            }
        }

        if self.options.update_hci_baud
            && self.options.working_baud != self.options.default_baud
        {
            match hci::update_baud_rate(self.port, self.options.working_baud) {
                Ok(_) => {
                    if let Err(e) = self.port.set_baud_rate(self.options.working_baud) {
                        warn!("cannot switch the local port baud: {e}");
                    }
                    thread::sleep(LINE_SETTLE);
                },
                Err(e) => warn!("HCI baud update failed: {e}"),
            }
        }

        if self.options.set_bdaddr {
            let addr = bdaddr::load_or_generate(&self.options.bdaddr_file);
            match hci::write_bd_addr(self.port, &addr) {
                // the address takes effect on the next reset
                Ok(_) => {
                    if let Err(e) = hci::reset(self.port) {
                        warn!("HCI reset after address write failed: {e}");
                    }
                },
                Err(e) => warn!("device address write failed: {e}"),
            }
        }
    }

    fn attach_line_discipline(&mut self) {
        if !self.options.attach_line_discipline {
            return;
        }
        if let Err(e) = self.try_attach_line_discipline() {
            warn!("line-discipline attach failed: {e}");
        }
    }

    #[cfg(target_os = "linux")]
    fn try_attach_line_discipline(&mut self) -> Result<()> {
        use crate::platform::ldisc;

        match self.port.raw_fd() {
            Some(fd) => ldisc::attach_h4(fd),
            None => Err(Error::Unsupported(
                "port exposes no file descriptor".into(),
            )),
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn try_attach_line_discipline(&mut self) -> Result<()> {
        Err(Error::Unsupported(
            "the N_HCI line discipline needs Linux".into(),
        ))
    }
}
