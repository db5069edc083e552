//! Utilities for laying recovered sectors out as a flat image of the logical volume.
//!
//! Addresses are placed in ascending order, so where two sectors overlap the higher address
//! wins the overlapping bytes. Sectors starting beyond the medium are dropped, and a sector
//! running off the end of the medium is cut short.

use std::io::{self, Read, Seek, SeekFrom, Write};

use tracing::{debug, info};

use crate::ftl::MergedMapping;

/// The writes that make up the image: (offset, bytes), in ascending offset order
fn placements(
    mapping: &MergedMapping,
    medium_size: usize,
) -> impl Iterator<Item = (usize, &[u8])> {
    mapping.iter().filter_map(move |(&address, payload)| {
        let address = address as usize;
        if address > medium_size {
            info!("high virtual address {address:#010x} beyond medium, skipped");
            return None;
        }

        let len = payload.len().min(medium_size - address);
        debug!("writing {address:#010x}");
        Some((address, &payload[..len]))
    })
}

/// Build the image of a `medium_size`-byte volume in memory. Unmapped bytes are zero.
pub fn reconstruct(mapping: &MergedMapping, medium_size: usize) -> Vec<u8> {
    let mut image = vec![0u8; medium_size];
    for (offset, bytes) in placements(mapping, medium_size) {
        image[offset..][..bytes.len()].copy_from_slice(bytes);
    }
    image
}

/// Write the image of a `medium_size`-byte volume to a seekable sink, one sector at a time.
///
/// The sink is zero-filled up to `medium_size` first, so the result is identical to
/// [reconstruct] without holding the whole image in memory.
pub fn write_image<W: Write + Seek>(
    sink: &mut W,
    mapping: &MergedMapping,
    medium_size: usize,
) -> io::Result<()> {
    sink.seek(SeekFrom::Start(0))?;
    io::copy(&mut io::repeat(0).take(medium_size as u64), sink)?;

    for (offset, bytes) in placements(mapping, medium_size) {
        sink.seek(SeekFrom::Start(offset as u64))?;
        sink.write_all(bytes)?;
    }

    sink.flush()
}

#[test]
fn test_reconstruct_empty() {
    let image = reconstruct(&MergedMapping::new(), 0x3000);
    assert_eq!(image.len(), 0x3000);
    assert!(image.iter().all(|&x| x == 0));
}

#[test]
fn test_reconstruct_placement() {
    use bytes::Bytes;

    let mapping = MergedMapping::from([(0x100, Bytes::from_static(b"XY"))]);
    let image = reconstruct(&mapping, 0x200);

    assert_eq!(image.len(), 0x200);
    assert_eq!(&image[0x100..0x102], b"XY");
    assert!(image[..0x100].iter().all(|&x| x == 0));
    assert!(image[0x102..].iter().all(|&x| x == 0));
}

#[test]
fn test_reconstruct_bounds() {
    use bytes::Bytes;

    let mapping = MergedMapping::from([
        (0x000, Bytes::from_static(b"AAAA")),
        (0x002, Bytes::from_static(b"BB")),
        (0x00E, Bytes::from_static(b"CCCC")),
        (0x010, Bytes::from_static(b"DD")),
        (0x011, Bytes::from_static(b"EE")),
        (0xFFFF_FF00, Bytes::from_static(b"FF")),
    ]);
    let image = reconstruct(&mapping, 0x10);

    // Later (higher) addresses overwrite, the last sector is cut at the end of the medium, and
    // sectors starting past the end are dropped
    let mut expected = [0u8; 0x10];
    expected[..4].copy_from_slice(b"AABB");
    expected[0xE..].copy_from_slice(b"CC");
    assert_eq!(image, expected);
}

#[test]
fn test_write_image() -> anyhow::Result<()> {
    use bytes::Bytes;
    use std::io::Cursor;

    let mapping = MergedMapping::from([
        (0x0400, Bytes::from(vec![0x11; 0x200])),
        (0x1F00, Bytes::from(vec![0x22; 0x200])),
        (0x4000, Bytes::from(vec![0x33; 0x200])),
    ]);

    // Stale content in the sink must not survive
    let mut sink = Cursor::new(vec![0xEEu8; 0x100]);
    write_image(&mut sink, &mapping, 0x2000)?;

    assert_eq!(sink.into_inner(), reconstruct(&mapping, 0x2000));
    Ok(())
}
