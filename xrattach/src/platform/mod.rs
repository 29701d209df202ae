//! Platform glue: chip power, wake lines and the HCI line discipline.

pub mod lpm;
pub mod rfkill;

#[cfg(target_os = "linux")]
pub mod ldisc;

use std::time::Duration;

use crate::error::Result;
use crate::platform::lpm::WakeAction;

/// Settle time after cutting chip power.
pub const POWER_OFF_SETTLE: Duration = Duration::from_millis(500);

/// Settle time after restoring chip power.
pub const POWER_ON_SETTLE: Duration = Duration::from_millis(20);

/// Switches the radio chip's power rail.
pub trait PowerControl: Send {
    /// Turn the chip on or off.
    fn set_power(&mut self, on: bool) -> Result<()>;
}

/// Drives the chip's wake line and low-power mode.
pub trait WakeControl: Send {
    /// Apply a wake-line action.
    fn set_wake(&mut self, action: WakeAction) -> Result<()>;

    /// Enable or disable low-power mode.
    fn set_lpm(&mut self, enabled: bool) -> Result<()>;
}
