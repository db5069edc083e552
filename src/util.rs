//! Useful traits and other utilities that don't really belong anywhere else.

use std::mem::size_of;

/// Bounds-checked accessors for byteslices carved out of an untrusted dump.
///
/// Every accessor returns `None` instead of panicking when the requested range (including any
/// offset arithmetic needed to compute it) falls outside the slice.
pub trait ByteWindow {
    /// Borrow `len` bytes starting at `offset`
    fn window(&self, offset: usize, len: usize) -> Option<&[u8]>;

    /// Read a little-endian `u32` at `offset`
    fn u32_le_at(&self, offset: usize) -> Option<u32>;
}

impl ByteWindow for [u8] {
    fn window(&self, offset: usize, len: usize) -> Option<&[u8]> {
        self.get(offset..offset.checked_add(len)?)
    }

    fn u32_le_at(&self, offset: usize) -> Option<u32> {
        let bytes = self.window(offset, size_of::<u32>())?;
        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }
}

#[test]
fn test_byte_window() {
    let buf = [0x78u8, 0x56, 0x34, 0x12, 0xFF, 0xFF];

    assert_eq!(buf.u32_le_at(0), Some(0x12345678));
    assert_eq!(buf.u32_le_at(2), Some(0xFFFF1234));
    assert_eq!(buf.u32_le_at(3), None);
    assert_eq!(buf.u32_le_at(usize::MAX), None);

    assert_eq!(buf.window(4, 2), Some(&[0xFF, 0xFF][..]));
    assert_eq!(buf.window(4, 3), None);
    assert_eq!(buf.window(usize::MAX, 2), None);
    assert_eq!(buf.window(6, 0), Some(&[][..]));
}
