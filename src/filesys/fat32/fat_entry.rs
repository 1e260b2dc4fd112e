//! FAT32 file allocation table entry

use super::constants::*;

/// Represents a 28-bit FAT entry pointing to the next cluster in a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatEntry {
    /// Cluster number or special value (0=free, >=0x0FFFFFF8=end)
    pub cluster: u32,
}

impl FatEntry {
    pub const FREE: FatEntry = FatEntry { cluster: 0 };
    pub const END_OF_CHAIN: FatEntry = FatEntry {
        cluster: END_OF_CHAIN,
    };

    /// Builds an entry from the raw on-disk value, dropping the reserved high nibble
    pub fn from_raw(raw: u32) -> Self {
        Self {
            cluster: raw & FAT_ENTRY_MASK,
        }
    }

    /// Returns true if this entry marks the end of a cluster chain
    pub fn is_end_of_chain(&self) -> bool {
        self.cluster >= END_OF_CHAIN_MIN
    }

    /// Returns true if this cluster is unused/free
    pub fn is_free(&self) -> bool {
        self.cluster == 0
    }

    pub fn is_bad(&self) -> bool {
        self.cluster == BAD_CLUSTER
    }

    /// Next cluster of the chain, `None` for free, bad and terminal entries
    pub fn next(&self) -> Option<u32> {
        if self.is_free() || self.is_bad() || self.is_end_of_chain() || self.cluster == 1 {
            None
        } else {
            Some(self.cluster)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_classification() {
        assert!(FatEntry::FREE.is_free());
        assert!(FatEntry::END_OF_CHAIN.is_end_of_chain());
        assert!(FatEntry::from_raw(0x0FFF_FFF8).is_end_of_chain());
        assert!(FatEntry::from_raw(BAD_CLUSTER).is_bad());
        assert!(!FatEntry::from_raw(BAD_CLUSTER).is_end_of_chain());
        assert_eq!(FatEntry::from_raw(7).next(), Some(7));
        assert_eq!(FatEntry::END_OF_CHAIN.next(), None);
    }

    #[test]
    fn test_high_nibble_is_ignored() {
        let entry = FatEntry::from_raw(0xF000_0005);
        assert_eq!(entry.cluster, 5);
        assert!(FatEntry::from_raw(0xF000_0000).is_free());
        assert!(FatEntry::from_raw(0xFFFF_FFFF).is_end_of_chain());
    }
}
