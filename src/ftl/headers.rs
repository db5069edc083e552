//! This module contains the code necessary to read and write erase unit headers, and to derive
//! the unit geometry from them.

use deku::prelude::*;

use crate::error::{DecodeError, GeometryError};

/// The size of an encoded [UnitHeader], in bytes
pub const UNIT_HEADER_SIZE: usize = 68;

/// The format pattern written at the start of every erase unit header: a CIS device tuple
/// followed by a link tuple naming the FTL version.
pub const FORMAT_PATTERN: [u8; 15] = *b"\x13\x03CISF\xff\x00FTL100\x00";

/// An erase unit header, as laid out on flash (all fields little-endian)
#[derive(Debug, Default, Eq, PartialEq, Clone, DekuRead, DekuWrite)]
#[deku(endian = "little")]
pub struct UnitHeader {
    /// CIS tuples identifying the unit; validated by the scanner, not by decoding
    pub format_pattern: [u8; 15],

    /// The number of units reserved as transfer units for garbage collection.
    pub transfer_units: u8,

    /// Erase count of this unit, for wear-leveling purposes.
    pub wear_leveling_info: u32,

    /// Which logical unit this physical unit currently holds.
    pub logical_unit_no: u16,

    pub log2_sector_size: u8,
    pub log2_unit_size: u8,

    /// The physical unit number where the FTL partition starts.
    pub first_physical_eun: u16,

    /// The number of units in the FTL partition.
    pub unit_count: u16,

    /// The size in bytes of the logical volume exposed by the FTL.
    pub virtual_medium_size: u32,

    pub direct_addressing_memory: u32,
    pub page_count: u16,
    pub flags: u8,
    pub ecc_code: u8,
    pub serial_number: u32,
    pub alt_euh_offset: u32,

    /// Offset of the BAM from the start of the unit.
    pub bam_offset: u32,

    pub reserved: [u8; 12],
    pub embedded_cis: [u8; 4],
}

/// The validated shape of a unit, derived from its header
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct Geometry {
    pub sector_size: usize,
    pub unit_size: usize,

    /// One BAM entry (and one sector) per slot
    pub slot_count: usize,
    pub bam_offset: usize,
}

impl UnitHeader {
    /// Convert from a byte slice, which must hold at least [UNIT_HEADER_SIZE] bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < UNIT_HEADER_SIZE {
            return Err(DecodeError::Truncated {
                needed: UNIT_HEADER_SIZE,
                available: bytes.len(),
            });
        }

        let (_, header) = Self::from_bytes((&bytes[..UNIT_HEADER_SIZE], 0))?;
        Ok(header)
    }

    /// Write into a byte slice
    pub fn encode(&self, out_bytes: &mut [u8]) -> anyhow::Result<()> {
        let bytes = self.to_bytes()?;
        let out_bytes = out_bytes
            .get_mut(..bytes.len())
            .ok_or(anyhow::anyhow!("out_bytes too small"))?;
        out_bytes.copy_from_slice(&bytes);
        Ok(())
    }

    /// Work out the sector/unit sizes and check that the BAM fits in the unit
    pub fn geometry(&self) -> Result<Geometry, GeometryError> {
        let exponent_error = GeometryError::SizeExponent {
            log2_sector_size: self.log2_sector_size,
            log2_unit_size: self.log2_unit_size,
        };
        let sector_size = 1usize
            .checked_shl(self.log2_sector_size.into())
            .ok_or(exponent_error.clone())?;
        let unit_size = 1usize
            .checked_shl(self.log2_unit_size.into())
            .ok_or(exponent_error)?;

        if sector_size > unit_size {
            return Err(GeometryError::SectorLargerThanUnit {
                sector_size,
                unit_size,
            });
        }

        let slot_count = unit_size / sector_size;
        let bam_end = usize::try_from(self.bam_offset)
            .ok()
            .zip(slot_count.checked_mul(4))
            .and_then(|(offset, len)| offset.checked_add(len));
        match bam_end {
            Some(end) if end <= unit_size => Ok(Geometry {
                sector_size,
                unit_size,
                slot_count,
                bam_offset: self.bam_offset as usize,
            }),
            _ => Err(GeometryError::BamOutsideUnit {
                bam_offset: self.bam_offset,
                slot_count,
                unit_size,
            }),
        }
    }
}

#[test]
fn test_encode() -> anyhow::Result<()> {
    let header = UnitHeader {
        format_pattern: FORMAT_PATTERN,
        transfer_units: 2,
        wear_leveling_info: 0x1234_5678,
        logical_unit_no: 0x0102,
        log2_sector_size: 9,
        log2_unit_size: 13,
        first_physical_eun: 3,
        unit_count: 64,
        virtual_medium_size: 0x7_8000,
        page_count: 1,
        flags: 0x80,
        serial_number: 0xCAFEBABE,
        alt_euh_offset: 0x1000,
        bam_offset: 0x44,
        embedded_cis: *b"\x01\x02\x03\x04",
        ..Default::default()
    };

    let mut buf = vec![0xFFu8; 128];
    header.encode(&mut buf)?;
    assert_eq!(&buf[..FORMAT_PATTERN.len()], &FORMAT_PATTERN);
    assert!(buf[UNIT_HEADER_SIZE..].iter().all(|&x| x == 0xFF));
    assert_eq!(UnitHeader::decode(&buf)?, header);

    // Spot-check the layout: unit number at 0x14, BAM offset at 0x30
    assert_eq!(&buf[0x14..0x16], &[0x02, 0x01]);
    assert_eq!(&buf[0x30..0x34], &[0x44, 0, 0, 0]);

    assert!(header.encode(&mut [0u8; UNIT_HEADER_SIZE - 1]).is_err());

    Ok(())
}

#[test]
fn test_decode_truncated() {
    let buf = [0u8; UNIT_HEADER_SIZE - 1];
    assert!(matches!(
        UnitHeader::decode(&buf),
        Err(DecodeError::Truncated {
            needed: UNIT_HEADER_SIZE,
            available: 67
        })
    ));
}

#[test]
fn test_geometry() {
    let header = UnitHeader {
        log2_sector_size: 9,
        log2_unit_size: 13,
        bam_offset: 0x44,
        ..Default::default()
    };
    assert_eq!(
        header.geometry(),
        Ok(Geometry {
            sector_size: 512,
            unit_size: 8192,
            slot_count: 16,
            bam_offset: 0x44,
        })
    );

    // BAM ending exactly at the end of the unit is fine; one byte further is not
    let header = UnitHeader {
        bam_offset: 8192 - 64,
        ..header
    };
    assert!(header.geometry().is_ok());
    let header = UnitHeader {
        bam_offset: 8192 - 63,
        ..header
    };
    assert!(matches!(
        header.geometry(),
        Err(GeometryError::BamOutsideUnit { .. })
    ));

    let header = UnitHeader {
        log2_sector_size: 14,
        bam_offset: 0,
        ..header
    };
    assert!(matches!(
        header.geometry(),
        Err(GeometryError::SectorLargerThanUnit { .. })
    ));

    let header = UnitHeader {
        log2_unit_size: 200,
        ..header
    };
    assert!(matches!(
        header.geometry(),
        Err(GeometryError::SizeExponent { .. })
    ));
}
