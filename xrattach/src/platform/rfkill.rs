//! Chip power switching through the kernel's rfkill interface.
//!
//! The Bluetooth radio shows up as an rfkill device; writing `'1'` or
//! `'0'` to its `state` node raises or drops the power rail.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::platform::PowerControl;

const RFKILL_ROOT: &str = "/sys/class/rfkill";

/// Power control backed by an rfkill `state` node.
pub struct Rfkill {
    state_path: PathBuf,
    powered: Option<bool>,
}

impl Rfkill {
    /// Find the Bluetooth rfkill device under `/sys/class/rfkill`.
    pub fn discover() -> Result<Self> {
        Self::discover_in(Path::new(RFKILL_ROOT))
    }

    /// Find the Bluetooth rfkill device under an explicit sysfs root.
    pub fn discover_in(root: &Path) -> Result<Self> {
        let entries = fs::read_dir(root).map_err(|e| {
            Error::Config(format!("cannot scan {}: {e}", root.display()))
        })?;
        for entry in entries {
            let entry = entry?;
            let Ok(kind) = fs::read_to_string(entry.path().join("type")) else {
                continue;
            };
            if kind.trim() == "bluetooth" {
                let state_path = entry.path().join("state");
                debug!("using rfkill node {}", state_path.display());
                return Ok(Self {
                    state_path,
                    powered: None,
                });
            }
        }
        Err(Error::Config(format!(
            "no bluetooth rfkill device under {}",
            root.display()
        )))
    }

    /// The `state` node this instance writes to.
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }
}

impl PowerControl for Rfkill {
    fn set_power(&mut self, on: bool) -> Result<()> {
        if self.powered == Some(on) {
            trace!("chip power already {}", if on { "on" } else { "off" });
            return Ok(());
        }
        fs::write(&self.state_path, if on { b"1" } else { b"0" })?;
        debug!("chip power {}", if on { "on" } else { "off" });
        self.powered = Some(on);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fake_rfkill(root: &Path, index: u32, kind: &str) {
        let dir = root.join(format!("rfkill{index}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("type"), format!("{kind}\n")).unwrap();
        fs::write(dir.join("state"), "0").unwrap();
    }

    #[test]
    fn test_discover_picks_bluetooth_device() {
        let root = tempdir().unwrap();
        fake_rfkill(root.path(), 0, "wlan");
        fake_rfkill(root.path(), 1, "bluetooth");

        let rfkill = Rfkill::discover_in(root.path()).expect("found");
        assert!(rfkill.state_path().ends_with("rfkill1/state"));
    }

    #[test]
    fn test_discover_fails_without_bluetooth_device() {
        let root = tempdir().unwrap();
        fake_rfkill(root.path(), 0, "wlan");

        assert!(matches!(
            Rfkill::discover_in(root.path()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_set_power_writes_state_and_caches() {
        let root = tempdir().unwrap();
        fake_rfkill(root.path(), 0, "bluetooth");
        let mut rfkill = Rfkill::discover_in(root.path()).unwrap();

        rfkill.set_power(true).unwrap();
        let state = rfkill.state_path().to_path_buf();
        assert_eq!(fs::read_to_string(&state).unwrap(), "1");

        // same state again is a no-op
        fs::write(&state, "x").unwrap();
        rfkill.set_power(true).unwrap();
        assert_eq!(fs::read_to_string(&state).unwrap(), "x");

        rfkill.set_power(false).unwrap();
        assert_eq!(fs::read_to_string(&state).unwrap(), "0");
    }
}
