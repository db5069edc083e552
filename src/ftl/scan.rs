//! This module contains code to find erase unit headers in an undifferentiated dump.

use memchr::memmem::Finder;
use tracing::trace;

/// The CIS device tuple that every unit header starts with
const CIS_SIGNATURE: &[u8] = b"\x13\x03CISF";

/// Offset (from the signature) of the tuple code following the device tuple
const TUPLE_CODE_OFFSET: usize = 6;

/// Tuple code of a link tuple, which is how FTL headers identify themselves
const CISTPL_LINK: u8 = 0xFF;

/// Tuple code used when the FTL structures live inline rather than behind a link; not supported
const CISTPL_INLINE: u8 = 57;

/// The link target naming the FTL format, immediately after the link tuple code
const FTL_ID: &[u8] = b"\x00FTL100\x00";

/// Search `data` for the next erase unit header at or after `start`.
///
/// Every occurrence of the CIS signature is checked for the link tuple naming the FTL format;
/// occurrences that fail the check (including ones too close to the end of `data` to be checked)
/// are skipped. Returns the offset of the first accepted header, or `None` once the signature
/// no longer occurs.
pub fn find_unit_header(data: &[u8], mut start: usize) -> Option<usize> {
    let finder = Finder::new(CIS_SIGNATURE);
    loop {
        let candidate = start + finder.find(data.get(start..)?)?;

        match data.get(candidate + TUPLE_CODE_OFFSET) {
            Some(&CISTPL_LINK) => {
                let id_offset = candidate + TUPLE_CODE_OFFSET + 1;
                if data.get(id_offset..id_offset + FTL_ID.len()) == Some(FTL_ID) {
                    return Some(candidate);
                }
                trace!("signature at {candidate:#x}: link does not name FTL100");
            }
            Some(&CISTPL_INLINE) => {
                // TODO: decode inline FTL structures once a dump using them turns up
                trace!("signature at {candidate:#x}: inline FTL structures are not supported");
            }
            _ => trace!("signature at {candidate:#x}: not followed by a link tuple"),
        }

        start = candidate + TUPLE_CODE_OFFSET + 1;
    }
}

#[test]
fn test_find_unit_header() {
    use super::FORMAT_PATTERN;

    let mut data = vec![0xFFu8; 1024];
    assert_eq!(find_unit_header(&data, 0), None);

    for offset in [0x10, 0x200, 0x210] {
        data[offset..][..FORMAT_PATTERN.len()].copy_from_slice(&FORMAT_PATTERN);
    }

    // Rejected candidates: wrong FTL id, inline tuple code, and no tuple code at all
    data[0x100..][..FORMAT_PATTERN.len()].copy_from_slice(&FORMAT_PATTERN);
    data[0x100 + 10] = b'X';
    data[0x140..][..6].copy_from_slice(CIS_SIGNATURE);
    data[0x146] = CISTPL_INLINE;
    data[0x180..][..6].copy_from_slice(CIS_SIGNATURE);
    data[0x186] = 0x00;

    assert_eq!(find_unit_header(&data, 0), Some(0x10));
    assert_eq!(find_unit_header(&data, 0x10), Some(0x10));
    assert_eq!(find_unit_header(&data, 0x11), Some(0x200));
    assert_eq!(find_unit_header(&data, 0x201), Some(0x210));
    assert_eq!(find_unit_header(&data, 0x211), None);

    // Walk the buffer the way a recovery does
    let mut found = vec![];
    let mut start = 0;
    while let Some(offset) = find_unit_header(&data, start) {
        found.push(offset);
        start = offset + 1;
    }
    assert_eq!(found, [0x10, 0x200, 0x210]);

    assert_eq!(find_unit_header(&data, data.len()), None);
    assert_eq!(find_unit_header(&data, data.len() + 5), None);
}

#[test]
fn test_find_unit_header_at_end() {
    use super::FORMAT_PATTERN;

    // A complete pattern that ends right at the end of the buffer is accepted...
    let mut data = vec![0u8; 32];
    data[32 - FORMAT_PATTERN.len()..].copy_from_slice(&FORMAT_PATTERN);
    assert_eq!(find_unit_header(&data, 0), Some(32 - FORMAT_PATTERN.len()));

    // ...but cutting off any part of it is not a match, and does not panic
    for cut in 1..=FORMAT_PATTERN.len() - CIS_SIGNATURE.len() {
        assert_eq!(find_unit_header(&data[..32 - cut], 0), None);
    }
}

#[test]
fn test_find_unit_header_after_rejected() {
    use super::FORMAT_PATTERN;

    // A rejected candidate is only skipped up to its tuple code, so a header packed right
    // behind the signature is still found
    let mut data = vec![0u8; 64];
    data[..6].copy_from_slice(CIS_SIGNATURE);
    data[6] = CISTPL_INLINE;
    data[7..][..FORMAT_PATTERN.len()].copy_from_slice(&FORMAT_PATTERN);
    assert_eq!(find_unit_header(&data, 0), Some(7));

    // Same with a link tuple that names something other than FTL100
    data[6] = CISTPL_LINK;
    assert_eq!(find_unit_header(&data, 0), Some(7));
}
