//! FAT32 filesystem constants

/// Number of boot sector bytes needed to decode the volume geometry
pub const BOOT_SECTOR_HEADER_SIZE: usize = 48;

/// Smallest sector size accepted when formatting
pub const MIN_FORMAT_SECTOR_SIZE: u16 = 512;

/// Boot sector signature stored in the last two bytes of a 512-byte sector
pub const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

/// Offset of the boot signature
pub const BOOT_SIGNATURE_OFFSET: usize = 510;

/// Sector holding the FSInfo structure on volumes this tool formats
pub const FSINFO_SECTOR: u16 = 1;

/// Sector holding the backup copy of the boot sector
pub const BACKUP_BOOT_SECTOR: u16 = 6;

pub const FSINFO_LEAD_SIGNATURE: u32 = 0x4161_5252;
pub const FSINFO_STRUCT_SIGNATURE: u32 = 0x6141_7272;
pub const FSINFO_TRAIL_SIGNATURE: u32 = 0xAA55_0000;

/// FSInfo free count and next-free hint meaning "unknown"
pub const FSINFO_UNKNOWN: u32 = 0xFFFF_FFFF;

/// Media descriptor for a fixed disk
pub const MEDIA_FIXED_DISK: u8 = 0xF8;

/// Size of FAT entry in bytes (32-bit, 28 significant)
pub const FAT_ENTRY_SIZE: u64 = 4;

/// Low 28 bits of a FAT entry carry the cluster value
pub const FAT_ENTRY_MASK: u32 = 0x0FFF_FFFF;

/// Entries at or above this value terminate a chain
pub const END_OF_CHAIN_MIN: u32 = 0x0FFF_FFF8;

/// End-of-chain value written by this driver
pub const END_OF_CHAIN: u32 = 0x0FFF_FFFF;

/// Marks a cluster as unusable
pub const BAD_CLUSTER: u32 = 0x0FFF_FFF7;

/// Clusters 0 and 1 are reserved, data clusters start at 2
pub const FIRST_DATA_CLUSTER: u32 = 2;

/// Size of a directory entry in bytes
pub const DIR_ENTRY_SIZE: usize = 32;

/// Maximum length of filename excluding extension
pub const MAX_FILENAME_LENGTH: usize = 8;

/// Maximum length of file extension
pub const MAX_EXTENSION_LENGTH: usize = 3;

/// Length of the space padded on-disk name
pub const SHORT_NAME_LENGTH: usize = MAX_FILENAME_LENGTH + MAX_EXTENSION_LENGTH;

/// Marker for deleted directory entries
pub const DELETED_ENTRY_MARKER: u8 = 0xE5;

/// First name byte of the slot that ends a directory
pub const END_OF_DIRECTORY_MARKER: u8 = 0x00;

/// On-disk name of the `.` entry
pub const DOT_NAME: [u8; SHORT_NAME_LENGTH] = *b".          ";

/// On-disk name of the `..` entry
pub const DOT_DOT_NAME: [u8; SHORT_NAME_LENGTH] = *b"..         ";

/// File sizes are stored in 32 bits
pub const MAX_FILE_SIZE: u64 = u32::MAX as u64;
