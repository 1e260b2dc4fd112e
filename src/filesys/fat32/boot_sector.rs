//! FAT32 boot sector decoding and cluster addressing

use bytes::{Buf, BufMut};

use super::constants::*;
use crate::filesys::MountError;

/// Volume parameters taken from the boot sector, plus the values derived
/// from them. Immutable once the volume is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeGeometry {
    /// Number of bytes per sector
    pub bytes_per_sector: u16,

    /// Number of sectors per cluster
    pub sectors_per_cluster: u8,

    /// Number of reserved sectors at start of volume, boot sector included
    pub reserved_sectors: u16,

    /// Number of FAT copies
    pub fat_count: u8,

    /// Total number of sectors on the volume
    pub total_sectors: u32,

    /// Size of each FAT copy in sectors
    pub sectors_per_fat: u32,

    /// First cluster of the root directory
    pub root_cluster: u32,

    /// First sector of the data region
    pub first_data_sector: u64,

    /// Number of clusters in the data region
    pub total_clusters: u32,
}

impl VolumeGeometry {
    /// Decodes the geometry from the start of the boot sector.
    pub fn parse(boot_sector: &[u8]) -> Result<Self, MountError> {
        if boot_sector.len() < BOOT_SECTOR_HEADER_SIZE {
            return Err(MountError::Truncated);
        }

        let mut buf = &boot_sector[11..BOOT_SECTOR_HEADER_SIZE];
        let bytes_per_sector = buf.get_u16_le();
        let sectors_per_cluster = buf.get_u8();
        let reserved_sectors = buf.get_u16_le();
        let fat_count = buf.get_u8();
        buf.advance(2); // root entry count, unused on FAT32
        let total_sectors_16 = buf.get_u16_le();
        buf.advance(1 + 2 + 2 + 2 + 4); // media, FAT16 size, geometry, hidden sectors
        let total_sectors_32 = buf.get_u32_le();
        let sectors_per_fat = buf.get_u32_le();
        buf.advance(2 + 2); // extended flags, version
        let root_cluster = buf.get_u32_le();

        let total_sectors = if total_sectors_32 == 0 {
            total_sectors_16 as u32
        } else {
            total_sectors_32
        };

        Self::from_fields(
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            fat_count,
            total_sectors,
            sectors_per_fat,
            root_cluster,
        )
    }

    /// Builds a geometry from raw boot sector fields, rejecting values that
    /// would make cluster addressing meaningless.
    pub fn from_fields(
        bytes_per_sector: u16,
        sectors_per_cluster: u8,
        reserved_sectors: u16,
        fat_count: u8,
        total_sectors: u32,
        sectors_per_fat: u32,
        root_cluster: u32,
    ) -> Result<Self, MountError> {
        if !bytes_per_sector.is_power_of_two() || (bytes_per_sector as usize) < DIR_ENTRY_SIZE {
            return Err(MountError::Malformed("bytes per sector is not a usable power of two"));
        }
        if sectors_per_cluster == 0 {
            return Err(MountError::Malformed("zero sectors per cluster"));
        }
        if reserved_sectors == 0 {
            return Err(MountError::Malformed("no reserved sectors"));
        }
        if fat_count == 0 || sectors_per_fat == 0 {
            return Err(MountError::Malformed("volume has no FAT"));
        }

        let first_data_sector = reserved_sectors as u64 + fat_count as u64 * sectors_per_fat as u64;
        if first_data_sector >= total_sectors as u64 {
            return Err(MountError::Malformed("data region starts beyond end of volume"));
        }
        let total_clusters =
            ((total_sectors as u64 - first_data_sector) / sectors_per_cluster as u64) as u32;

        let geometry = Self {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            fat_count,
            total_sectors,
            sectors_per_fat,
            root_cluster,
            first_data_sector,
            total_clusters,
        };

        if !geometry.is_valid_cluster(root_cluster) {
            return Err(MountError::Malformed("root cluster outside the data region"));
        }
        Ok(geometry)
    }

    /// Size of each cluster in bytes
    pub fn cluster_size(&self) -> usize {
        self.bytes_per_sector as usize * self.sectors_per_cluster as usize
    }

    /// Directory entries held by one cluster
    pub fn entries_per_cluster(&self) -> usize {
        self.cluster_size() / DIR_ENTRY_SIZE
    }

    /// Number of entries one FAT copy can hold
    pub fn entries_per_fat(&self) -> u64 {
        self.sectors_per_fat as u64 * self.bytes_per_sector as u64 / FAT_ENTRY_SIZE
    }

    /// Highest cluster number that is both inside the data region and
    /// addressable through the FAT.
    pub fn max_cluster(&self) -> u32 {
        let by_region = self.total_clusters as u64 + 1;
        let by_fat = self.entries_per_fat().saturating_sub(1);
        by_region.min(by_fat) as u32
    }

    pub fn is_valid_cluster(&self, cluster: u32) -> bool {
        cluster >= FIRST_DATA_CLUSTER && cluster <= self.max_cluster()
    }

    /// Number of clusters the allocator may hand out
    pub fn usable_clusters(&self) -> u32 {
        self.max_cluster().saturating_sub(FIRST_DATA_CLUSTER - 1)
    }

    /// First sector of the given FAT copy
    pub fn fat_start(&self, copy: u8) -> u64 {
        self.reserved_sectors as u64 + copy as u64 * self.sectors_per_fat as u64
    }

    /// First sector of a data cluster, `None` outside the data region.
    pub fn cluster_to_sector(&self, cluster: u32) -> Option<u64> {
        if !self.is_valid_cluster(cluster) {
            return None;
        }
        Some(
            (cluster - FIRST_DATA_CLUSTER) as u64 * self.sectors_per_cluster as u64
                + self.first_data_sector,
        )
    }

    /// Cluster containing the given sector, `None` outside the data region.
    pub fn sector_to_cluster(&self, sector: u64) -> Option<u32> {
        let relative = sector.checked_sub(self.first_data_sector)?;
        let cluster = relative / self.sectors_per_cluster as u64 + FIRST_DATA_CLUSTER as u64;
        let cluster = u32::try_from(cluster).ok()?;
        self.is_valid_cluster(cluster).then_some(cluster)
    }

    /// Size of the volume in bytes
    pub fn image_size(&self) -> u64 {
        self.total_sectors as u64 * self.bytes_per_sector as u64
    }

    /// Writes a FAT32 boot sector describing this geometry into `sector`.
    ///
    /// `sector` must be at least 512 bytes long.
    pub fn encode_boot_sector(&self, sector: &mut [u8], volume_label: &[u8; 11], volume_id: u32) {
        let has_fsinfo = self.reserved_sectors > FSINFO_SECTOR;
        let has_backup = self.reserved_sectors > BACKUP_BOOT_SECTOR;

        sector.fill(0);
        let mut buf = &mut sector[..];
        buf.put_slice(&[0xEB, 0x58, 0x90]); // Standard boot jump
        buf.put_slice(b"FAT32SH ");
        buf.put_u16_le(self.bytes_per_sector);
        buf.put_u8(self.sectors_per_cluster);
        buf.put_u16_le(self.reserved_sectors);
        buf.put_u8(self.fat_count);
        buf.put_u16_le(0); // root entry count
        buf.put_u16_le(0); // 16-bit total sectors
        buf.put_u8(MEDIA_FIXED_DISK);
        buf.put_u16_le(0); // 16-bit FAT size
        buf.put_u16_le(63); // sectors per track
        buf.put_u16_le(255); // heads
        buf.put_u32_le(0); // hidden sectors
        buf.put_u32_le(self.total_sectors);
        buf.put_u32_le(self.sectors_per_fat);
        buf.put_u16_le(0); // mirroring enabled on every FAT
        buf.put_u16_le(0); // version 0.0
        buf.put_u32_le(self.root_cluster);
        buf.put_u16_le(if has_fsinfo { FSINFO_SECTOR } else { 0 });
        buf.put_u16_le(if has_backup { BACKUP_BOOT_SECTOR } else { 0 });
        buf.put_bytes(0, 12);
        buf.put_u8(0x80); // Hard disk
        buf.put_u8(0);
        buf.put_u8(0x29); // extended boot signature
        buf.put_u32_le(volume_id);
        buf.put_slice(volume_label);
        buf.put_slice(b"FAT32   ");

        sector[BOOT_SIGNATURE_OFFSET..BOOT_SIGNATURE_OFFSET + 2].copy_from_slice(&BOOT_SIGNATURE);
    }
}

/// Writes an FSInfo sector whose hints are left unknown, so later
/// allocations never make it stale.
pub fn encode_fsinfo(sector: &mut [u8]) {
    sector.fill(0);
    sector[0..4].copy_from_slice(&FSINFO_LEAD_SIGNATURE.to_le_bytes());
    let mut tail = &mut sector[484..512];
    tail.put_u32_le(FSINFO_STRUCT_SIGNATURE);
    tail.put_u32_le(FSINFO_UNKNOWN); // free cluster count
    tail.put_u32_le(FSINFO_UNKNOWN); // next free cluster
    tail.put_bytes(0, 12);
    tail.put_u32_le(FSINFO_TRAIL_SIGNATURE);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_geometry() -> VolumeGeometry {
        VolumeGeometry::from_fields(512, 4, 32, 2, 8192, 16, 2).unwrap()
    }

    #[test]
    fn test_parse_encoded_boot_sector() {
        let geometry = sample_geometry();
        let mut sector = vec![0u8; 512];
        geometry.encode_boot_sector(&mut sector, b"NO NAME    ", 0x1234_5678);

        assert_eq!(&sector[510..512], &[0x55, 0xAA]);
        assert_eq!(VolumeGeometry::parse(&sector).unwrap(), geometry);
        assert_eq!(geometry.first_data_sector, 32 + 2 * 16);
        assert_eq!(geometry.total_clusters, (8192 - 64) / 4);
        assert_eq!(geometry.cluster_size(), 2048);
    }

    #[test]
    fn test_total_sectors_falls_back_to_16_bit_field() {
        let mut sector = vec![0u8; 512];
        sample_geometry().encode_boot_sector(&mut sector, b"NO NAME    ", 1);
        sector[32..36].copy_from_slice(&0u32.to_le_bytes());
        sector[19..21].copy_from_slice(&4096u16.to_le_bytes());

        let geometry = VolumeGeometry::parse(&sector).unwrap();
        assert_eq!(geometry.total_sectors, 4096);
    }

    #[test]
    fn test_short_or_malformed_header() {
        assert!(matches!(
            VolumeGeometry::parse(&[0u8; 40]),
            Err(MountError::Truncated)
        ));
        assert!(matches!(
            VolumeGeometry::parse(&[0u8; 512]),
            Err(MountError::Malformed(_))
        ));
        assert!(matches!(
            VolumeGeometry::from_fields(512, 0, 32, 2, 8192, 16, 2),
            Err(MountError::Malformed(_))
        ));
        assert!(matches!(
            VolumeGeometry::from_fields(500, 1, 32, 2, 8192, 16, 2),
            Err(MountError::Malformed(_))
        ));
        assert!(matches!(
            VolumeGeometry::from_fields(512, 1, 32, 2, 8192, 16, 1),
            Err(MountError::Malformed(_))
        ));
    }

    #[test]
    fn test_cluster_sector_round_trip() {
        let geometry = sample_geometry();
        for cluster in [2, 3, 100, geometry.max_cluster()] {
            let sector = geometry.cluster_to_sector(cluster).unwrap();
            assert_eq!(geometry.sector_to_cluster(sector), Some(cluster));
            // Every sector of the cluster maps back to it
            assert_eq!(geometry.sector_to_cluster(sector + 3), Some(cluster));
        }
        assert_eq!(geometry.cluster_to_sector(2), Some(64));
    }

    #[test]
    fn test_addressing_outside_data_region() {
        let geometry = sample_geometry();
        assert_eq!(geometry.cluster_to_sector(0), None);
        assert_eq!(geometry.cluster_to_sector(1), None);
        assert_eq!(geometry.cluster_to_sector(geometry.max_cluster() + 1), None);
        assert_eq!(geometry.sector_to_cluster(0), None);
        assert_eq!(geometry.sector_to_cluster(63), None);
    }

    #[test]
    fn test_max_cluster_capped_by_fat_size() {
        // One FAT sector holds 128 entries, far fewer than the data region
        let geometry = VolumeGeometry::from_fields(512, 1, 32, 1, 65536, 1, 2).unwrap();
        assert_eq!(geometry.entries_per_fat(), 128);
        assert_eq!(geometry.max_cluster(), 127);
        assert!(!geometry.is_valid_cluster(128));
    }

    #[test]
    fn test_fsinfo_signatures() {
        let mut sector = vec![0xAAu8; 512];
        encode_fsinfo(&mut sector);
        assert_eq!(&sector[0..4], &FSINFO_LEAD_SIGNATURE.to_le_bytes());
        assert_eq!(&sector[484..488], &FSINFO_STRUCT_SIGNATURE.to_le_bytes());
        assert_eq!(&sector[488..492], &[0xFF; 4]);
        assert_eq!(&sector[508..512], &FSINFO_TRAIL_SIGNATURE.to_le_bytes());
    }
}
