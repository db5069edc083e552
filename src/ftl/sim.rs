//! A simulated FTL medium, for testing purposes.
//!
//! [SimUnit] builds the raw bytes of one erase unit (erased flash with a valid header, BAM and
//! whatever sectors were written), and [SimDump] strings units and noise together into something
//! that looks like a raw chip read.

use std::collections::BTreeMap;

use anyhow::ensure;
use bytes::Bytes;

use super::{UnitHeader, FORMAT_PATTERN, UNIT_HEADER_SIZE};

/// One simulated erase unit
#[derive(Debug, Clone)]
pub struct SimUnit {
    /// The header that will be written at the start of the unit
    pub header: UnitHeader,

    /// BAM entries by slot; unlisted slots are left erased (free)
    bam: BTreeMap<usize, u32>,

    /// Sector contents by slot
    sectors: BTreeMap<usize, Vec<u8>>,
}

impl SimUnit {
    /// Create an empty unit: 512-byte sectors, 8 KiB units, the BAM right after the header, and
    /// a 64 KiB medium
    pub fn new(logical_unit_no: u16) -> Self {
        let header = UnitHeader {
            format_pattern: FORMAT_PATTERN,
            logical_unit_no,
            log2_sector_size: 9,
            log2_unit_size: 13,
            unit_count: 8,
            virtual_medium_size: 0x1_0000,
            bam_offset: UNIT_HEADER_SIZE as u32,
            ..Default::default()
        };

        Self {
            header,
            bam: Default::default(),
            sectors: Default::default(),
        }
    }

    /// Change the declared size of the logical medium
    pub fn medium_size(mut self, size: u32) -> Self {
        self.header.virtual_medium_size = size;
        self
    }

    /// Set the raw BAM entry for a slot
    pub fn entry(mut self, slot: usize, value: u32) -> Self {
        self.bam.insert(slot, value);
        self
    }

    /// Place a data sector for logical `address` in `slot`, filled with `fill`
    pub fn data(self, slot: usize, address: u32, fill: u8) -> Self {
        let sector_size = 1usize << self.header.log2_sector_size;
        self.entry(slot, address | 0x40)
            .sector(slot, &vec![fill; sector_size])
    }

    /// Set the raw content of a sector slot; shorter content leaves the rest erased
    pub fn sector(mut self, slot: usize, content: &[u8]) -> Self {
        self.sectors.insert(slot, content.to_vec());
        self
    }

    /// Lay out the unit as bytes. Sector content is written first, so the header and BAM win
    /// wherever they overlap it.
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let geometry = self.header.geometry()?;
        let mut buf = vec![0xFFu8; geometry.unit_size];

        for (&slot, content) in &self.sectors {
            ensure!(slot < geometry.slot_count, "sector slot {slot} out of range");
            ensure!(content.len() <= geometry.sector_size, "sector content too long");
            buf[slot * geometry.sector_size..][..content.len()].copy_from_slice(content);
        }

        self.header.encode(&mut buf)?;

        for (&slot, value) in &self.bam {
            ensure!(slot < geometry.slot_count, "BAM slot {slot} out of range");
            buf[geometry.bam_offset + slot * 4..][..4].copy_from_slice(&value.to_le_bytes());
        }

        Ok(buf)
    }
}

/// A simulated raw dump
#[derive(Debug, Default, Clone)]
pub struct SimDump {
    data: Vec<u8>,
}

impl SimDump {
    pub fn new() -> Self {
        Default::default()
    }

    /// Append a unit, returning the offset its header lands at
    pub fn push_unit(&mut self, unit: &SimUnit) -> anyhow::Result<usize> {
        let offset = self.data.len();
        self.data.extend(unit.to_bytes()?);
        Ok(offset)
    }

    /// Append arbitrary bytes (noise, erased space, stale partial units)
    pub fn push_bytes(&mut self, bytes: &[u8]) -> usize {
        let offset = self.data.len();
        self.data.extend_from_slice(bytes);
        offset
    }

    pub fn into_bytes(self) -> Bytes {
        self.data.into()
    }
}

#[test]
fn test_sim_unit() -> anyhow::Result<()> {
    use crate::util::ByteWindow;

    let unit = SimUnit::new(7).data(3, 0x1200, 0xA5).entry(0, 0x30);
    let bytes = unit.to_bytes()?;

    assert_eq!(bytes.len(), 8192);
    assert_eq!(UnitHeader::decode(&bytes)?, unit.header);
    assert_eq!(bytes.u32_le_at(UNIT_HEADER_SIZE), Some(0x30));
    assert_eq!(bytes.u32_le_at(UNIT_HEADER_SIZE + 3 * 4), Some(0x1240));
    assert_eq!(bytes.u32_le_at(UNIT_HEADER_SIZE + 4 * 4), Some(0xFFFF_FFFF));
    assert!(bytes[3 * 512..4 * 512].iter().all(|&x| x == 0xA5));
    assert!(bytes[4 * 512..].iter().all(|&x| x == 0xFF));

    assert!(SimUnit::new(0).entry(16, 0).to_bytes().is_err());
    Ok(())
}
