//! Byte-order helpers for big-endian guest memory.
//!
//! Every access that crosses from a guest buffer into a host integer goes
//! through these functions. They never depend on the host's byte order.

/// Swap the two bytes of a halfword.
#[inline]
pub fn bswap16(value: u16) -> u16 {
    (value >> 8) | (value << 8)
}

/// Swap the four bytes of a word.
#[inline]
pub fn bswap32(value: u32) -> u32 {
    ((value & 0x0000_00FF) << 24)
        | ((value & 0x0000_FF00) << 8)
        | ((value & 0x00FF_0000) >> 8)
        | ((value & 0xFF00_0000) >> 24)
}

/// Read a big-endian halfword from `buf` at `offset`.
#[inline]
pub fn load_be16(buf: &[u8], offset: usize) -> u16 {
    (u16::from(buf[offset]) << 8) | u16::from(buf[offset + 1])
}

/// Read a big-endian word from `buf` at `offset`.
#[inline]
pub fn load_be32(buf: &[u8], offset: usize) -> u32 {
    (u32::from(load_be16(buf, offset)) << 16) | u32::from(load_be16(buf, offset + 2))
}

/// Store a big-endian halfword into `buf` at `offset`.
#[inline]
pub fn store_be16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset] = (value >> 8) as u8;
    buf[offset + 1] = value as u8;
}

/// Store a big-endian word into `buf` at `offset`.
#[inline]
pub fn store_be32(buf: &mut [u8], offset: usize, value: u32) {
    store_be16(buf, offset, (value >> 16) as u16);
    store_be16(buf, offset + 2, value as u16);
}
