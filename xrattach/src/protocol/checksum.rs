//! 16-bit ones'-sum checksum used by the boot ROM.
//!
//! The ROM sums the frame as little-endian 16-bit words with wrapping
//! arithmetic, a lone trailing byte added as-is, and stores the bitwise
//! complement in the header. Since `x + !x == 0xFFFF` for every u16, a
//! receiver verifies a frame by summing the host-order image and checking
//! for 0xFFFF.

/// Wrapping sum of `data` as little-endian 16-bit words.
pub fn sum16(data: &[u8]) -> u16 {
    let mut sum: u16 = 0;
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum = sum.wrapping_add(u16::from_le_bytes([word[0], word[1]]));
    }
    if let [last] = words.remainder() {
        sum = sum.wrapping_add(u16::from(*last));
    }
    sum
}

/// Checksum value to embed for `data`: the complement of its sum.
pub fn checksum(data: &[u8]) -> u16 {
    !sum16(data)
}

/// Verify a host-order image whose checksum field is filled in.
pub fn verify(data: &[u8]) -> bool {
    sum16(data) == 0xFFFF
}
