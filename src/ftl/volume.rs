//! This module gathers decoded units into a volume and merges their sectors into one logical
//! address space.
//!
//! Collisions are expected in real dumps (stale copies of a unit left behind by garbage
//! collection, or corrupted BAM entries), so they are logged and resolved, never fatal. The
//! policy in both places is last-writer-wins in scan order.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use tracing::warn;

use super::Unit;

/// Every recovered sector of the volume, by logical address
pub type MergedMapping = BTreeMap<u32, Bytes>;

/// The set of units found in a dump, keyed by logical unit number
#[derive(Debug, Default, Clone)]
pub struct Volume {
    /// Units in the order their logical unit number was first seen
    units: Vec<Unit>,

    /// Logical unit number -> index into `units`
    index: HashMap<u16, usize>,
}

impl Volume {
    pub fn new() -> Self {
        Default::default()
    }

    /// Add a unit. A unit with the same logical unit number as an earlier one replaces it (but
    /// keeps the earlier one's place in the merge order).
    pub fn add_unit(&mut self, unit: Unit) {
        let unit_no = unit.logical_unit_no();
        match self.index.get(&unit_no) {
            Some(&i) => {
                warn!(
                    "duplicate unit {unit_no:#06x}: unit at {:#x} replaces unit at {:#x}",
                    unit.offset(),
                    self.units[i].offset()
                );
                self.units[i] = unit;
            }
            None => {
                self.index.insert(unit_no, self.units.len());
                self.units.push(unit);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Look up a unit by its logical unit number
    pub fn unit(&self, unit_no: u16) -> Option<&Unit> {
        self.index.get(&unit_no).map(|&i| &self.units[i])
    }

    /// Iterate over the units, in merge order
    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter()
    }

    /// Union every unit's sectors. Where two units claim the same logical address, the unit
    /// later in merge order wins.
    pub fn merge_all(&self) -> MergedMapping {
        let mut merged = MergedMapping::new();

        for unit in &self.units {
            for (&address, payload) in unit.sectors() {
                if merged.insert(address, payload.clone()).is_some() {
                    warn!(
                        "address {address:#010x} remapped by unit {:#06x} at {:#x}",
                        unit.logical_unit_no(),
                        unit.offset()
                    );
                }
            }
        }

        merged
    }
}

#[cfg(test)]
fn decode_sim(offset: usize, unit: &super::sim::SimUnit) -> anyhow::Result<Unit> {
    let bytes = Bytes::from(unit.to_bytes()?);
    Ok(Unit::decode(offset, bytes, unit.header.clone()))
}

#[test]
fn test_merge_disjoint() -> anyhow::Result<()> {
    use super::sim::SimUnit;

    let mut volume = Volume::new();
    volume.add_unit(decode_sim(0, &SimUnit::new(0).data(1, 0x0000, 1).data(2, 0x0200, 2))?);
    volume.add_unit(decode_sim(0x2000, &SimUnit::new(1).data(1, 0x0400, 3))?);
    assert_eq!(volume.len(), 2);

    let merged = volume.merge_all();
    assert_eq!(merged.len(), 3);
    assert_eq!(merged.keys().copied().collect::<Vec<_>>(), [0x0000, 0x0200, 0x0400]);

    Ok(())
}

#[test]
fn test_merge_collision() -> anyhow::Result<()> {
    use super::sim::SimUnit;

    let mut volume = Volume::new();
    volume.add_unit(decode_sim(0, &SimUnit::new(4).data(1, 0x0000, 1).data(2, 0x0200, 2))?);
    volume.add_unit(decode_sim(0x2000, &SimUnit::new(2).data(3, 0x0200, 3).data(4, 0x0600, 4))?);

    let merged = volume.merge_all();
    assert_eq!(merged.len(), 3);
    assert!(merged[&0x0200].iter().all(|&x| x == 3));

    Ok(())
}

#[test]
fn test_duplicate_unit_no() -> anyhow::Result<()> {
    use super::sim::SimUnit;

    let mut volume = Volume::new();
    volume.add_unit(decode_sim(0, &SimUnit::new(5).data(1, 0x0200, 1))?);
    volume.add_unit(decode_sim(0x2000, &SimUnit::new(6).data(1, 0x0400, 2))?);
    volume.add_unit(decode_sim(0x4000, &SimUnit::new(5).data(1, 0x0400, 3))?);

    assert_eq!(volume.len(), 2);
    assert_eq!(volume.unit(5).map(Unit::offset), Some(0x4000));
    assert_eq!(
        volume.units().map(Unit::logical_unit_no).collect::<Vec<_>>(),
        [5, 6]
    );

    // The replacement took unit 5's place, so unit 6 now comes later in merge order and wins
    let merged = volume.merge_all();
    assert_eq!(merged.len(), 1);
    assert!(merged[&0x0400].iter().all(|&x| x == 2));

    Ok(())
}
