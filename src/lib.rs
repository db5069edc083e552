//! Recovery of a flat logical volume image from a raw flash dump formatted with a legacy Flash
//! Translation Layer.
//!
//! The pipeline is: [ftl::find_unit_header] locates erase-unit headers in the dump,
//! [ftl::UnitHeader] decodes them, [ftl::Unit] interprets each unit's Block Allocation Map,
//! [ftl::Volume] merges every unit's sectors into one logical address space, and [image] lays
//! the result out as a byte image. [recover] drives the whole thing.

pub mod error;
pub mod ftl;
pub mod image;
pub mod recover;
pub mod util;
