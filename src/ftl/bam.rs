//! Classification of Block Allocation Map entries.

/// The role of a sector slot, as recorded by its BAM entry
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum BamEntry {
    /// Never written since the unit was erased
    Free,

    /// Held data that has since been superseded
    Deleted,

    /// Holds FTL control structures (the header and BAM themselves)
    Control,

    /// The sector is bad and must not be used
    Bad,

    /// Holds a data or virtual map page for the given logical address
    DataOrMap(u32),

    /// Holds a replacement map page. Logical addresses for these are not recovered yet.
    ReplacementMap(u32),

    /// Any value not covered above
    Unknown(u32),
}

const BAM_FREE: u32 = 0xFFFF_FFFF;
const BAM_DELETED: [u32; 2] = [0x0000_0000, 0xFFFF_FFFE];
const BAM_CONTROL: u32 = 0x0000_0030;
const BAM_BAD: u32 = 0x0000_0070;

const BAM_TYPE_MASK: u32 = 0xFF;
const BAM_TYPE_DATA: u32 = 0x40;
const BAM_TYPE_REPLACEMENT: u32 = 0x60;

impl BamEntry {
    /// Classify a raw BAM entry value
    pub fn classify(value: u32) -> Self {
        match value {
            BAM_FREE => Self::Free,
            v if BAM_DELETED.contains(&v) => Self::Deleted,
            BAM_CONTROL => Self::Control,
            BAM_BAD => Self::Bad,
            v if v & BAM_TYPE_MASK == BAM_TYPE_DATA => Self::DataOrMap(v & !BAM_TYPE_MASK),
            v if v & BAM_TYPE_MASK == BAM_TYPE_REPLACEMENT => Self::ReplacementMap(v),
            v => Self::Unknown(v),
        }
    }

    /// The logical address whose content lives in this slot, if any
    pub fn logical_address(self) -> Option<u32> {
        match self {
            Self::DataOrMap(address) => Some(address),
            _ => None,
        }
    }
}

#[test]
fn test_classify() {
    use BamEntry::*;

    for (value, expected) in [
        (0xFFFF_FFFF, Free),
        (0x0000_0000, Deleted),
        (0xFFFF_FFFE, Deleted),
        (0x0000_0030, Control),
        (0x0000_0070, Bad),
        (0x0000_0040, DataOrMap(0)),
        (0x0000_1040, DataOrMap(0x1000)),
        (0xFFFF_FF40, DataOrMap(0xFFFF_FF00)),
        (0x0012_3460, ReplacementMap(0x0012_3460)),
        (0x0000_0130, Unknown(0x130)),
    ] {
        assert_eq!(BamEntry::classify(value), expected, "value {value:#010x}");
    }

    assert_eq!(BamEntry::classify(0x0000_2040).logical_address(), Some(0x2000));
    for value in [0xFFFF_FFFF, 0, 0xFFFF_FFFE, 0x30, 0x70, 0x1060, 0x1234] {
        assert_eq!(BamEntry::classify(value).logical_address(), None);
    }
}
