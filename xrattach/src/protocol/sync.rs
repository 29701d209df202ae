//! The 0x55 sync handshake.
//!
//! Fresh out of reset the boot ROM auto-bauds on a stream of 0x55 bytes
//! and answers with a two-byte tag once it has locked on. The handshake
//! retries forever; a chip that wedges is power-cycled after enough
//! consecutive failures. The interrupt checker is the only other way out.

use std::io;
use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::platform::{POWER_OFF_SETTLE, POWER_ON_SETTLE, PowerControl};
use crate::port::Port;
use crate::protocol::brom::{SYNC_ACK_BUSY, SYNC_ACK_READY, SYNC_BYTE};

/// Delay between sync attempts.
pub const SYNC_ATTEMPT_DELAY: Duration = Duration::from_millis(20);

/// Read timeout while syncing. The ROM answers promptly or not at all.
pub const SYNC_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Failed attempts tolerated before the chip is power-cycled.
pub const MAX_FAILED_ATTEMPTS: u32 = 15;

/// Sync failure counter, carried across handshakes within one session.
#[derive(Debug, Default)]
pub struct SyncState {
    failed_attempts: u32,
}

impl SyncState {
    /// Fresh state with no recorded failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a failure; power-cycle the chip once the budget is exceeded.
    fn register_failure(&mut self, power: &mut dyn PowerControl) {
        self.failed_attempts += 1;
        if self.failed_attempts <= MAX_FAILED_ATTEMPTS {
            return;
        }
        warn!(
            "no sync reply after {} attempts, power-cycling the chip",
            self.failed_attempts
        );
        self.failed_attempts = 0;
        // Power failures are logged but do not end the handshake; the
        // retry loop is the recovery path.
        if let Err(e) = power.set_power(false) {
            warn!("power off failed: {e}");
        }
        thread::sleep(POWER_OFF_SETTLE);
        if let Err(e) = power.set_power(true) {
            warn!("power on failed: {e}");
        }
        thread::sleep(POWER_ON_SETTLE);
    }
}

/// Run the handshake until the ROM answers.
///
/// The port timeout is shortened for the duration of the loop and
/// restored afterwards.
pub fn synchronize(
    port: &mut dyn Port,
    power: &mut dyn PowerControl,
    state: &mut SyncState,
) -> Result<()> {
    let saved_timeout = port.timeout();
    port.set_timeout(SYNC_READ_TIMEOUT)?;
    let outcome = sync_loop(port, power, state);
    port.set_timeout(saved_timeout)?;
    outcome
}

fn sync_loop(
    port: &mut dyn Port,
    power: &mut dyn PowerControl,
    state: &mut SyncState,
) -> Result<()> {
    debug!("syncing with the boot ROM on {}", port.name());
    loop {
        if crate::is_interrupted_requested() {
            return Err(Error::Interrupted);
        }

        port.write_all_bytes(&[SYNC_BYTE])?;
        thread::sleep(SYNC_ATTEMPT_DELAY);

        let mut reply = [0u8; 2];
        match port.read(&mut reply) {
            Ok(2) if reply == SYNC_ACK_READY || reply == SYNC_ACK_BUSY => {
                debug!(
                    "boot ROM answered {}{}",
                    reply[0] as char, reply[1] as char
                );
                return Ok(());
            },
            Ok(n) => {
                trace!("unusable sync reply ({n} bytes)");
                state.register_failure(power);
            },
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                state.register_failure(power);
            },
            Err(e) => return Err(e.into()),
        }
    }
}
