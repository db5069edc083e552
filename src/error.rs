//! Error types for decoding FTL structures out of a dump.
//!
//! None of these abort a recovery run; they only tell the caller why a given header or unit
//! could not be used. I/O is the only fatal class, and is carried by `anyhow` at the edges.

use thiserror::Error;

/// Why a unit header could not be decoded
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unit header truncated: {available} of {needed} bytes available")]
    Truncated { needed: usize, available: usize },

    #[error("malformed unit header: {0}")]
    Malformed(#[from] deku::DekuError),
}

/// Why a decoded header's geometry cannot be used to walk its BAM
#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum GeometryError {
    #[error("size exponents out of range (sector 2^{log2_sector_size}, unit 2^{log2_unit_size})")]
    SizeExponent {
        log2_sector_size: u8,
        log2_unit_size: u8,
    },

    #[error("sector size {sector_size:#x} exceeds unit size {unit_size:#x}")]
    SectorLargerThanUnit { sector_size: usize, unit_size: usize },

    #[error("BAM at {bam_offset:#x} with {slot_count} entries does not fit in a {unit_size:#x}-byte unit")]
    BamOutsideUnit {
        bam_offset: u32,
        slot_count: usize,
        unit_size: usize,
    },
}
