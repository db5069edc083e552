//! The recovery flow: scan a dump for unit headers, decode every unit found, and collect the
//! units into a [Volume] ready to be laid out as an image.

use std::io::{self, Seek, Write};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::DecodeError;
use crate::ftl::{find_unit_header, MergedMapping, Unit, UnitHeader, Volume};
use crate::image;

/// Everything recovered from one dump
#[derive(Debug, Default, Clone)]
pub struct Recovery {
    volume: Volume,
    medium_size: u32,
}

/// Scan the whole dump and decode every unit header found in it.
///
/// Scanning resumes one byte past each header found rather than past the whole unit, so that
/// closely-packed or overlapping units are not skipped. The medium size is taken from the last
/// header found.
pub fn scan_dump(dump: &Bytes) -> Recovery {
    let rpt = howudoin::new()
        .label("Scanning dump")
        .set_len(dump.len() as u64);

    let mut recovery = Recovery::default();
    let mut start = 0;
    while let Some(offset) = find_unit_header(dump, start) {
        rpt.set_pos(offset as u64);
        start = offset + 1;

        let header = match UnitHeader::decode(&dump[offset..]) {
            Ok(header) => header,
            Err(error @ DecodeError::Truncated { .. }) => {
                debug!("scan ends at {offset:#x}: {error}");
                break;
            }
            Err(error) => {
                warn!("header at {offset:#x} skipped: {error}");
                continue;
            }
        };

        recovery.medium_size = header.virtual_medium_size;
        recovery
            .volume
            .add_unit(Unit::decode(offset, dump.slice(offset..), header));
    }

    rpt.close();
    info!("total unit num: {}", recovery.volume.len());

    recovery
}

impl Recovery {
    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    /// The size of the logical volume, in bytes
    pub fn medium_size(&self) -> u32 {
        self.medium_size
    }

    /// Replace the declared medium size, e.g. when the last header in the dump is known stale
    pub fn with_medium_size(mut self, medium_size: u32) -> Self {
        self.medium_size = medium_size;
        self
    }

    /// All recovered sectors, by logical address
    pub fn merged(&self) -> MergedMapping {
        self.volume.merge_all()
    }

    /// Build the volume image in memory
    pub fn image(&self) -> Vec<u8> {
        image::reconstruct(&self.merged(), self.medium_size as usize)
    }

    /// Write the volume image to a seekable sink, such as a file
    pub fn write_image<W: Write + Seek>(&self, sink: &mut W) -> io::Result<()> {
        image::write_image(sink, &self.merged(), self.medium_size as usize)
    }
}

#[test]
fn test_two_units() -> anyhow::Result<()> {
    use crate::ftl::sim::{SimDump, SimUnit};

    let unit0 = SimUnit::new(0).medium_size(0x3000).entry(0, 0x1040);
    let unit1 = SimUnit::new(1).medium_size(0x3000).entry(0, 0x2040);

    let mut dump = SimDump::new();
    let offset0 = dump.push_unit(&unit0)?;
    let offset1 = dump.push_unit(&unit1)?;
    let dump = dump.into_bytes();

    let recovery = scan_dump(&dump);
    assert_eq!(recovery.volume().len(), 2);
    assert_eq!(recovery.medium_size(), 0x3000);

    let image = recovery.image();
    assert_eq!(image.len(), 0x3000);
    assert_eq!(&image[0x1000..0x1200], &dump[offset0..offset0 + 0x200]);
    assert_eq!(&image[0x2000..0x2200], &dump[offset1..offset1 + 0x200]);
    assert!(image[..0x1000].iter().all(|&x| x == 0));
    assert!(image[0x1200..0x2000].iter().all(|&x| x == 0));
    assert!(image[0x2200..].iter().all(|&x| x == 0));

    let mut sink = io::Cursor::new(Vec::new());
    recovery.write_image(&mut sink)?;
    assert_eq!(sink.into_inner(), image);

    Ok(())
}

#[test]
fn test_noisy_dump() -> anyhow::Result<()> {
    use crate::ftl::sim::{SimDump, SimUnit};
    use crate::ftl::FORMAT_PATTERN;

    let mut dump = SimDump::new();

    // Garbage, including a signature whose link tuple does not name FTL100
    dump.push_bytes(&[0x5A; 0x123]);
    dump.push_bytes(b"\x13\x03CISF\xff\x00FTL200\x00");
    dump.push_bytes(&[0xFF; 0x200]);

    // A stale copy of unit 2, then the live units in reverse order
    dump.push_unit(&SimUnit::new(2).data(1, 0x0400, 0xA0).data(2, 0x0600, 0xA1))?;
    dump.push_unit(&SimUnit::new(3).data(7, 0x0800, 0xB0).medium_size(0x2000))?;
    dump.push_unit(&SimUnit::new(2).data(3, 0x0400, 0xC0))?;
    dump.push_unit(
        &SimUnit::new(1)
            .data(1, 0x0000, 0xD0)
            .data(2, 0x0600, 0xD1)
            .data(3, 0x8000, 0xD2)
            .medium_size(0x1000),
    )?;

    // A header cut off by the end of the dump
    dump.push_bytes(&FORMAT_PATTERN);
    dump.push_bytes(&[0u8; 8]);

    let recovery = scan_dump(&dump.into_bytes());
    assert_eq!(recovery.volume().len(), 3);
    assert_eq!(recovery.medium_size(), 0x1000);

    let merged = recovery.merged();
    assert_eq!(
        merged.keys().copied().collect::<Vec<_>>(),
        [0x0000, 0x0400, 0x0600, 0x0800, 0x8000]
    );
    assert!(merged[&0x0400].iter().all(|&x| x == 0xC0));
    assert!(merged[&0x0600].iter().all(|&x| x == 0xD1));

    // Only what fits in the last header's medium size makes it into the image
    let image = recovery.image();
    assert_eq!(image.len(), 0x1000);
    assert!(image[..0x200].iter().all(|&x| x == 0xD0));
    assert!(image[0x400..0x600].iter().all(|&x| x == 0xC0));
    assert!(image[0x600..0x800].iter().all(|&x| x == 0xD1));
    assert!(image[0x800..0xA00].iter().all(|&x| x == 0xB0));
    assert!(image[0xA00..].iter().all(|&x| x == 0));

    let image = recovery.with_medium_size(0x8200).image();
    assert!(image[0x8000..].iter().all(|&x| x == 0xD2));

    Ok(())
}

#[test]
fn test_empty_dump() {
    let recovery = scan_dump(&Bytes::from_static(&[0xFF; 4096]));
    assert!(recovery.volume().is_empty());
    assert_eq!(recovery.medium_size(), 0);
    assert!(recovery.image().is_empty());
}
