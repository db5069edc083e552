//! This module decodes a single erase unit: it walks the unit's BAM and collects every sector
//! that holds logical data.

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::{BamEntry, Geometry, UnitHeader};
use crate::util::ByteWindow;

/// Recovered sectors, by logical address
pub type SectorMap = BTreeMap<u32, Bytes>;

/// How many BAM entries of a unit fell into each class
#[derive(Debug, Default, Eq, PartialEq, Copy, Clone)]
pub struct BamStats {
    pub free: usize,
    pub deleted: usize,
    pub control: usize,
    pub bad: usize,
    pub data: usize,
    pub replacement: usize,
    pub unknown: usize,
}

impl BamStats {
    fn count(&mut self, entry: BamEntry) {
        let counter = match entry {
            BamEntry::Free => &mut self.free,
            BamEntry::Deleted => &mut self.deleted,
            BamEntry::Control => &mut self.control,
            BamEntry::Bad => &mut self.bad,
            BamEntry::DataOrMap(_) => &mut self.data,
            BamEntry::ReplacementMap(_) => &mut self.replacement,
            BamEntry::Unknown(_) => &mut self.unknown,
        };
        *counter += 1;
    }
}

/// One physical erase unit found in the dump, along with the sectors recovered from it
#[derive(Debug, Clone)]
pub struct Unit {
    offset: usize,
    header: UnitHeader,
    geometry: Option<Geometry>,
    sectors: SectorMap,
    stats: BamStats,
}

impl Unit {
    /// Decode the unit whose header was found at `offset` in the dump.
    ///
    /// `data` is the dump starting at the header; anything past the unit size is ignored, and a
    /// dump that ends early just means the sectors (or BAM entries) beyond its end are lost. A
    /// header with unusable geometry yields a unit with no sectors.
    pub fn decode(offset: usize, data: Bytes, header: UnitHeader) -> Self {
        let unit_no = header.logical_unit_no;
        let mut unit = Self {
            offset,
            header,
            geometry: None,
            sectors: Default::default(),
            stats: Default::default(),
        };

        let geometry = match unit.header.geometry() {
            Ok(geometry) => geometry,
            Err(error) => {
                warn!("unit {unit_no:#06x} at {offset:#x} skipped: {error}");
                return unit;
            }
        };
        unit.geometry = Some(geometry);

        info!(
            "BAM offset {:#x} for unit {unit_no:#06x} at {offset:#x}",
            geometry.bam_offset
        );

        let data = data.slice(..data.len().min(geometry.unit_size));
        if data.len() < geometry.unit_size {
            warn!(
                "unit {unit_no:#06x} at {offset:#x} truncated: {:#x} of {:#x} bytes in dump",
                data.len(),
                geometry.unit_size
            );
        }

        for slot in 0..geometry.slot_count {
            let Some(value) = data.u32_le_at(geometry.bam_offset + slot * 4) else {
                warn!("unit {unit_no:#06x}: BAM cut off by end of dump at slot {slot}");
                break;
            };
            debug!("unit {unit_no:#06x} slot {slot}: BAM entry {value:08x}");

            let entry = BamEntry::classify(value);
            unit.stats.count(entry);

            let Some(address) = entry.logical_address() else {
                continue;
            };

            let start = slot * geometry.sector_size;
            if data.window(start, geometry.sector_size).is_none() {
                warn!("unit {unit_no:#06x}: sector for {address:#010x} cut off by end of dump");
                continue;
            }

            let payload = data.slice(start..start + geometry.sector_size);
            if unit.sectors.insert(address, payload).is_some() {
                warn!("unit {unit_no:#06x}: address {address:#010x} mapped twice, keeping slot {slot}");
            }
        }

        unit
    }

    /// Where in the dump this unit's header was found
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn header(&self) -> &UnitHeader {
        &self.header
    }

    pub fn logical_unit_no(&self) -> u16 {
        self.header.logical_unit_no
    }

    /// The unit geometry, or `None` if the header's geometry was unusable
    pub fn geometry(&self) -> Option<Geometry> {
        self.geometry
    }

    /// The sectors this unit holds, by logical address
    pub fn sectors(&self) -> &SectorMap {
        &self.sectors
    }

    pub fn stats(&self) -> BamStats {
        self.stats
    }
}

#[cfg(test)]
fn decode_sim(unit: &super::sim::SimUnit) -> anyhow::Result<Unit> {
    let bytes = Bytes::from(unit.to_bytes()?);
    Ok(Unit::decode(0, bytes, unit.header.clone()))
}

#[test]
fn test_decode_data_sector() -> anyhow::Result<()> {
    use super::sim::SimUnit;

    // High bytes of the address are arbitrary; only the tag byte is cleared
    let sim = SimUnit::new(3).data(5, 0xAB_CD_EF_00, 0x5A).entry(0, 0x30);
    let raw = sim.to_bytes()?;
    let unit = decode_sim(&sim)?;

    assert_eq!(unit.logical_unit_no(), 3);
    assert_eq!(unit.header(), &sim.header);
    assert_eq!(unit.sectors().len(), 1);
    assert_eq!(
        unit.sectors().get(&0xABCD_EF00).map(|b| &b[..]),
        Some(&raw[5 * 512..6 * 512])
    );
    assert_eq!(
        unit.stats(),
        BamStats {
            free: 14,
            control: 1,
            data: 1,
            ..Default::default()
        }
    );

    Ok(())
}

#[test]
fn test_decode_ignores_non_data() -> anyhow::Result<()> {
    use super::sim::SimUnit;

    let sim = SimUnit::new(0)
        .entry(0, 0x30)
        .entry(1, 0xFFFF_FFFF)
        .entry(2, 0x0000_0000)
        .entry(3, 0xFFFF_FFFE)
        .entry(4, 0x70)
        .entry(5, 0x0000_2060)
        .entry(6, 0x0000_3031)
        .sector(5, &[0x11; 512])
        .sector(6, &[0x22; 512]);
    let unit = decode_sim(&sim)?;

    assert!(unit.sectors().is_empty());
    assert_eq!(
        unit.stats(),
        BamStats {
            free: 10,
            deleted: 2,
            control: 1,
            bad: 1,
            replacement: 1,
            unknown: 1,
            data: 0,
        }
    );

    Ok(())
}

#[test]
fn test_decode_collision_within_unit() -> anyhow::Result<()> {
    use super::sim::SimUnit;

    let sim = SimUnit::new(0)
        .data(2, 0x4000, 0x02)
        .data(9, 0x4000, 0x09)
        .data(10, 0x4200, 0x0A);
    let unit = decode_sim(&sim)?;

    assert_eq!(unit.sectors().len(), 2);
    assert!(unit.sectors()[&0x4000].iter().all(|&x| x == 0x09));
    assert!(unit.sectors()[&0x4200].iter().all(|&x| x == 0x0A));

    Ok(())
}

#[test]
fn test_decode_bad_geometry() -> anyhow::Result<()> {
    use super::sim::SimUnit;

    let sim = SimUnit::new(1).data(1, 0x1000, 0x01);
    let bytes = Bytes::from(sim.to_bytes()?);

    for header in [
        UnitHeader {
            bam_offset: 0xFFFF_FFF0,
            ..sim.header.clone()
        },
        UnitHeader {
            log2_unit_size: 0xFF,
            ..sim.header.clone()
        },
        UnitHeader {
            log2_sector_size: 20,
            ..sim.header.clone()
        },
    ] {
        let unit = Unit::decode(0, bytes.clone(), header);
        assert!(unit.geometry().is_none());
        assert!(unit.sectors().is_empty());
    }

    Ok(())
}

#[test]
fn test_decode_truncated_unit() -> anyhow::Result<()> {
    use super::sim::SimUnit;

    let sim = SimUnit::new(1)
        .data(1, 0x1000, 0x01)
        .data(4, 0x2000, 0x04)
        .data(5, 0x3000, 0x05);

    // Dump ends halfway through slot 4
    let bytes = Bytes::from(sim.to_bytes()?);
    let unit = Unit::decode(0, bytes.slice(..4 * 512 + 100), sim.header.clone());
    assert_eq!(unit.sectors().keys().copied().collect::<Vec<_>>(), [0x1000]);
    assert_eq!(unit.stats().data, 3);

    // Dump ends in the middle of the BAM
    let unit = Unit::decode(0, bytes.slice(..0x44 + 4 * 3 + 2), sim.header.clone());
    assert!(unit.sectors().is_empty());
    assert_eq!(unit.stats().data, 1);
    assert_eq!(unit.stats().free, 2);

    // Trailing bytes past the unit are not part of it
    let mut long = sim.to_bytes()?;
    long.extend([0u8; 4096]);
    let unit = Unit::decode(0, Bytes::from(long), sim.header.clone());
    assert_eq!(unit.sectors().len(), 3);

    Ok(())
}
