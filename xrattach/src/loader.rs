//! Chunked firmware download into chip RAM.

use log::{debug, info, trace};

use crate::chip::ChipConfig;
use crate::error::{Error, Result};
use crate::platform::PowerControl;
use crate::port::Port;
use crate::protocol::brom::Command;
use crate::protocol::sync::{SyncState, synchronize};
use crate::protocol::transaction::transact;

/// Bytes streamed per sequential write.
pub const CHUNK_SIZE: usize = 1024;

/// Download `image` into chip RAM and jump to the entry point.
///
/// The image is streamed in [`CHUNK_SIZE`] pieces at consecutive
/// addresses; `progress` is called with `(sent, total)` after every
/// acknowledged chunk. The first failed exchange aborts the download.
///
/// On variants that re-enter the handshake after the jump, the loader
/// syncs again and repeats the jump command.
pub fn load_firmware(
    port: &mut dyn Port,
    power: &mut dyn PowerControl,
    sync: &mut SyncState,
    chip: &ChipConfig,
    image: &[u8],
    progress: &mut dyn FnMut(usize, usize),
) -> Result<()> {
    if image.is_empty() {
        return Err(Error::Config("firmware image is empty".into()));
    }
    // every chunk address must stay inside the 32-bit address space
    if u32::try_from(image.len())
        .ok()
        .and_then(|len| chip.load_addr.checked_add(len))
        .is_none()
    {
        return Err(Error::Config(format!(
            "image of {} bytes does not fit above load address {:#010x}",
            image.len(),
            chip.load_addr
        )));
    }

    info!(
        "loading {} bytes to {:#010x} on {}",
        image.len(),
        chip.load_addr,
        port.name()
    );

    let total = image.len();
    let mut sent = 0usize;
    for chunk in image.chunks(CHUNK_SIZE) {
        if crate::is_interrupted_requested() {
            return Err(Error::Interrupted);
        }
        #[allow(clippy::cast_possible_truncation)] // image length checked above
        let addr = chip.load_addr + sent as u32;
        trace!("chunk of {} bytes at {:#010x}", chunk.len(), addr);
        transact(port, &Command::SeqWrite { addr, data: chunk })?;
        sent += chunk.len();
        progress(sent, total);
    }

    debug!("jumping to entry point {:#010x}", chip.jump_addr);
    transact(port, &Command::SetJump { addr: chip.jump_addr })?;

    if chip.variant.resyncs_after_jump() {
        debug!("{} re-enters the handshake, jumping again", chip.variant);
        synchronize(port, power, sync)?;
        transact(port, &Command::SetJump { addr: chip.jump_addr })?;
    }

    Ok(())
}
