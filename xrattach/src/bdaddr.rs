//! Bluetooth device addresses: validation, persistence and generation.
//!
//! The address lives in a small config file as six whitespace-separated
//! hex bytes, most significant first. A stored address is only trusted if
//! it is neither all-zero nor inside the reserved inquiry LAP range
//! 0x9E8B00-0x9E8B3F; otherwise a fresh one is generated with the fixed
//! vendor NAP `22:22` and persisted back.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};

/// Bytes in a device address.
pub const BD_ADDR_LEN: usize = 6;

/// Default persistent address file.
pub const DEFAULT_BDADDR_FILE: &str = "/etc/bluetooth/xr_bt.conf";

/// A Bluetooth device address, stored least-significant byte first
/// (the order it travels in HCI commands).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BdAddr([u8; BD_ADDR_LEN]);

impl BdAddr {
    /// Build from wire-order bytes (LSB first).
    pub fn from_wire(bytes: [u8; BD_ADDR_LEN]) -> Self {
        Self(bytes)
    }

    /// The wire-order bytes (LSB first).
    pub fn as_wire(&self) -> &[u8; BD_ADDR_LEN] {
        &self.0
    }

    /// Whether this address may be programmed into a controller.
    ///
    /// All-zero addresses and the reserved inquiry LAP range are refused.
    pub fn is_valid(&self) -> bool {
        let a = &self.0;
        if a.iter().all(|&b| b == 0) {
            return false;
        }
        // LAP 0x9E8B00..=0x9E8B3F is reserved for inquiry access codes
        if a[2] == 0x9E && a[1] == 0x8B && a[0] <= 0x3F {
            return false;
        }
        true
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().rev().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

/// Load a valid address from `path`.
///
/// Returns `None` when the file is missing, malformed or holds an
/// invalid address; callers fall back to generation.
pub fn load(path: &Path) -> Option<BdAddr> {
    let content = fs::read_to_string(path).ok()?;
    let mut fields = content.split_whitespace();
    let mut bytes = [0u8; BD_ADDR_LEN];
    // the file stores the most significant byte first
    for slot in (0..BD_ADDR_LEN).rev() {
        bytes[slot] = u8::from_str_radix(fields.next()?, 16).ok()?;
    }
    let addr = BdAddr(bytes);
    addr.is_valid().then_some(addr)
}

/// Persist an address to `path`, most significant byte first.
pub fn store(path: &Path, addr: &BdAddr) -> io::Result<()> {
    let mut out = String::with_capacity(3 * BD_ADDR_LEN);
    for byte in addr.0.iter().rev() {
        out.push_str(&format!("{byte:02x} "));
    }
    fs::write(path, out)
}

/// Generate a fresh valid address: fixed vendor NAP `22:22`, the lower
/// four bytes random.
pub fn generate() -> BdAddr {
    generate_with(&mut SplitMix64::from_clock())
}

fn generate_with(rng: &mut SplitMix64) -> BdAddr {
    loop {
        let r = rng.next_u64().to_le_bytes();
        let addr = BdAddr([r[0], r[1], r[2], r[3], 0x22, 0x22]);
        if addr.is_valid() {
            return addr;
        }
    }
}

/// Load the stored address or generate and persist a new one.
///
/// A failed persist is logged but does not fail the bring-up; the
/// address is still used for this session.
pub fn load_or_generate(path: &Path) -> BdAddr {
    if let Some(addr) = load(path) {
        debug!("using stored device address {addr}");
        return addr;
    }
    let addr = generate();
    info!("generated device address {addr}");
    if let Err(e) = store(path, &addr) {
        warn!(
            "could not persist device address to {}: {e}",
            path.display()
        );
    }
    addr
}

/// Tiny seedable generator for address bytes; bring-up needs a few
/// random bytes once, not a cryptographic source.
struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    fn from_clock() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0x9E37_79B9_7F4A_7C15, |d| d.as_nanos() as u64);
        Self {
            state: nanos ^ u64::from(std::process::id()),
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}
