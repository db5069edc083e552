//! This module implements the on-flash structures of the legacy FTL format and the logic to
//! recover logical sectors from them.
//!
//! The flash is divided into erase units. Each unit starts with a header that carries a CIS-style
//! format pattern, the geometry of the medium, and the offset of the unit's Block Allocation Map
//! ("BAM"):
//!
//! ```text
//! +- Erase unit (2^log2UnitSize bytes) ------------------------------------+
//! | Sector 0                      | Sector 1 | Sector 2 |  ...  | Sector N-1 |
//! | +- header -+ ... +- BAM ----+ |          |          |       |            |
//! | | 13 03 CISF FF  | e0 e1 ...| |          |          |       |            |
//! +-----------------------------------------------------------------------+
//! ```
//!
//! The BAM holds one little-endian `u32` per sector slot of the unit. Slots holding data carry
//! the logical address of that sector (with the low byte used as a type tag), so the logical
//! volume is rebuilt by gathering every data slot of every unit and placing it at its address.
//!
//! Dumps rarely contain just the units, in order: they are usually raw reads of a whole chip, with
//! stale copies, erased units and garbage in between. Nothing indexes the units, so they are
//! found by scanning for the header signature.

mod bam;
mod headers;
mod scan;
pub mod sim;
mod unit;
mod volume;

pub use bam::BamEntry;
pub use headers::{Geometry, UnitHeader, FORMAT_PATTERN, UNIT_HEADER_SIZE};
pub use scan::find_unit_header;
pub use unit::{BamStats, SectorMap, Unit};
pub use volume::{MergedMapping, Volume};
