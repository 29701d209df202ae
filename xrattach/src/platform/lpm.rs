//! Wake line and low-power mode via `/proc/bluetooth/sleep`.
//!
//! Kernels with the Bluetooth sleep driver expose three nodes: `lpm`
//! (low-power mode on/off), `btwake` (host-driven wake line) and
//! `btwrite` (transmit-activity hint that keeps the chip awake for a
//! while). All three take a single ASCII digit.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{info, trace};

use crate::error::Result;
use crate::platform::WakeControl;

const PROC_SLEEP_DIR: &str = "/proc/bluetooth/sleep";

/// How long a transmit-activity hint keeps the chip awake.
const BTWRITE_ACTIVE_WINDOW: Duration = Duration::from_secs(10);

/// Wake line actions and their node bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeAction {
    /// Let the chip sleep.
    Deassert,
    /// Wake the chip.
    Assert,
    /// Hold the wake line regardless of activity.
    Lock,
    /// Release a previous lock.
    Unlock,
}

impl WakeAction {
    fn byte(self) -> u8 {
        match self {
            Self::Deassert => b'0',
            Self::Assert => b'1',
            Self::Lock => b'2',
            Self::Unlock => b'3',
        }
    }
}

/// Locations of the three sleep nodes.
#[derive(Debug, Clone)]
pub struct ProcSleepNodes {
    /// Low-power mode switch.
    pub lpm: PathBuf,
    /// Host wake line.
    pub btwake: PathBuf,
    /// Transmit-activity hint.
    pub btwrite: PathBuf,
}

impl Default for ProcSleepNodes {
    fn default() -> Self {
        let dir = Path::new(PROC_SLEEP_DIR);
        Self {
            lpm: dir.join("lpm"),
            btwake: dir.join("btwake"),
            btwrite: dir.join("btwrite"),
        }
    }
}

impl ProcSleepNodes {
    /// Nodes under an explicit directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            lpm: dir.join("lpm"),
            btwake: dir.join("btwake"),
            btwrite: dir.join("btwrite"),
        }
    }
}

/// Wake/low-power control backed by the proc sleep nodes.
///
/// Both the wake line and the LPM switch remember their last state so
/// repeated calls do not touch the nodes. The transmit-activity window is
/// a deadline checked opportunistically rather than a timer.
pub struct LpmControl {
    nodes: ProcSleepNodes,
    lpm_enabled: Option<bool>,
    wake: Option<WakeAction>,
    btwrite_active_until: Option<Instant>,
}

impl LpmControl {
    /// Control through the default `/proc/bluetooth/sleep` nodes.
    pub fn new() -> Self {
        Self::with_nodes(ProcSleepNodes::default())
    }

    /// Control through explicit nodes.
    pub fn with_nodes(nodes: ProcSleepNodes) -> Self {
        Self {
            nodes,
            lpm_enabled: None,
            wake: None,
            btwrite_active_until: None,
        }
    }

    /// Whether the transmit-activity window is still open.
    pub fn transmit_active(&mut self) -> bool {
        self.expire_activity_window();
        self.btwrite_active_until.is_some()
    }

    fn expire_activity_window(&mut self) {
        if let Some(deadline) = self.btwrite_active_until {
            if Instant::now() >= deadline {
                trace!("transmit activity window expired");
                self.btwrite_active_until = None;
            }
        }
    }

    fn write_node(path: &Path, byte: u8) -> Result<()> {
        fs::write(path, [byte])?;
        Ok(())
    }
}

impl Default for LpmControl {
    fn default() -> Self {
        Self::new()
    }
}

impl WakeControl for LpmControl {
    fn set_wake(&mut self, action: WakeAction) -> Result<()> {
        self.expire_activity_window();
        if self.wake == Some(action) {
            trace!("wake line already {action:?}");
            return Ok(());
        }
        self.wake = Some(action);
        if action == WakeAction::Deassert {
            // Only recorded: the sleep driver drops the line itself once
            // the activity window runs out.
            return Ok(());
        }
        Self::write_node(&self.nodes.btwake, action.byte())?;
        if action == WakeAction::Assert {
            Self::write_node(&self.nodes.btwrite, b'1')?;
            self.btwrite_active_until = Some(Instant::now() + BTWRITE_ACTIVE_WINDOW);
        }
        Ok(())
    }

    fn set_lpm(&mut self, enabled: bool) -> Result<()> {
        if self.lpm_enabled == Some(enabled) {
            return Ok(());
        }
        Self::write_node(&self.nodes.lpm, if enabled { b'1' } else { b'0' })?;
        self.lpm_enabled = Some(enabled);
        info!(
            "low-power mode {}",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn control_in(dir: &Path) -> LpmControl {
        fs::write(dir.join("lpm"), "").unwrap();
        fs::write(dir.join("btwake"), "").unwrap();
        fs::write(dir.join("btwrite"), "").unwrap();
        LpmControl::with_nodes(ProcSleepNodes::in_dir(dir))
    }

    #[test]
    fn test_assert_writes_wake_and_activity_nodes() {
        let dir = tempdir().unwrap();
        let mut control = control_in(dir.path());

        control.set_wake(WakeAction::Assert).unwrap();
        assert_eq!(fs::read(dir.path().join("btwake")).unwrap(), b"1");
        assert_eq!(fs::read(dir.path().join("btwrite")).unwrap(), b"1");
        assert!(control.transmit_active());
    }

    #[test]
    fn test_deassert_only_updates_cached_state() {
        let dir = tempdir().unwrap();
        let mut control = control_in(dir.path());

        control.set_wake(WakeAction::Assert).unwrap();
        fs::write(dir.path().join("btwake"), "x").unwrap();

        control.set_wake(WakeAction::Deassert).unwrap();
        assert_eq!(fs::read(dir.path().join("btwake")).unwrap(), b"x");
    }

    #[test]
    fn test_repeated_wake_action_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut control = control_in(dir.path());

        control.set_wake(WakeAction::Assert).unwrap();
        fs::write(dir.path().join("btwake"), "x").unwrap();
        control.set_wake(WakeAction::Assert).unwrap();
        assert_eq!(fs::read(dir.path().join("btwake")).unwrap(), b"x");
    }

    #[test]
    fn test_lpm_toggle_writes_digits() {
        let dir = tempdir().unwrap();
        let mut control = control_in(dir.path());

        control.set_lpm(true).unwrap();
        assert_eq!(fs::read(dir.path().join("lpm")).unwrap(), b"1");
        control.set_lpm(false).unwrap();
        assert_eq!(fs::read(dir.path().join("lpm")).unwrap(), b"0");

        // cached state suppresses the rewrite
        fs::write(dir.path().join("lpm"), "x").unwrap();
        control.set_lpm(false).unwrap();
        assert_eq!(fs::read(dir.path().join("lpm")).unwrap(), b"x");
    }

    #[test]
    fn test_wake_action_bytes() {
        assert_eq!(WakeAction::Deassert.byte(), b'0');
        assert_eq!(WakeAction::Assert.byte(), b'1');
        assert_eq!(WakeAction::Lock.byte(), b'2');
        assert_eq!(WakeAction::Unlock.byte(), b'3');
    }
}
