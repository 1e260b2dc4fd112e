//! FAT32 filesystem implementation

use std::path::Path;

use log::{debug, info};

use super::block::ImageFile;
use super::*;

mod boot_sector;
mod constants;
mod dir_entry;
mod directory;
mod fat_entry;
mod fat_table;
mod file;
mod open_file;
mod path_stack;

pub use boot_sector::VolumeGeometry;
use constants::*;
pub use dir_entry::{decode_name, encode_name, fits_83_name, is_valid_83_name, Attributes, DirEntry83, ShortName};
pub use directory::{CdOutcome, EntryLocation};
pub use fat_entry::FatEntry;
pub use open_file::{AccessMode, OpenFile, OpenFileTable};
pub use path_stack::{PathSegment, PathStack};

/// Layout used by [`Volume::format`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    /// Written to the boot sector and used as the root path segment
    pub volume_label: &'static str,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 32,
            fat_count: 2,
            volume_label: "NO NAME",
        }
    }
}

/// Summary reported by the `info` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    pub sectors_per_fat: u32,
    pub root_cluster: u32,
    pub first_data_sector: u64,
    pub total_clusters: u32,
    pub entries_per_fat: u64,
    pub image_size: u64,
    pub free_clusters: u32,
}

/// A mounted FAT32 volume
///
/// Owns the block device together with everything the shell session needs:
/// the current directory, the path stack that renders it and the table of
/// open files. All on-disk state is re-read on every operation.
pub struct Volume<'a> {
    /// Underlying block device, one block per sector
    device: Box<dyn BlockDevice + 'a>,
    /// Boot sector parameters
    geometry: VolumeGeometry,
    /// First cluster of the current directory
    current_cluster: u32,
    /// Directories entered since the root
    path: PathStack,
    /// Table of open files
    open_files: OpenFileTable,
}

impl Volume<'static> {
    /// Opens and mounts an image file. The file name becomes the root path segment.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MountError> {
        let path = path.as_ref();
        let image = ImageFile::open(path)?;
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Volume::mount(Box::new(image), &label)
    }
}

impl<'a> Volume<'a> {
    /// Mounts the volume stored on `device`.
    pub fn mount(device: Box<dyn BlockDevice + 'a>, root_label: &str) -> Result<Self, MountError> {
        let block_size = device.block_size();
        if block_size < BOOT_SECTOR_HEADER_SIZE {
            return Err(MountError::Malformed("device blocks are smaller than the boot sector header"));
        }

        let mut boot_sector = vec![0u8; block_size];
        device.read_block(0, &mut boot_sector)?;
        let geometry = VolumeGeometry::parse(&boot_sector)?;

        Self::with_geometry(device, geometry, root_label)
    }

    /// Writes an empty FAT32 filesystem covering the whole device and mounts it.
    pub fn format(
        mut device: Box<dyn BlockDevice + 'a>,
        options: FormatOptions,
    ) -> Result<Self, MountError> {
        let bytes_per_sector = options.bytes_per_sector;
        if bytes_per_sector < MIN_FORMAT_SECTOR_SIZE {
            return Err(MountError::Malformed("sector size below 512 bytes"));
        }
        if device.block_size() != bytes_per_sector as usize {
            return Err(MountError::Malformed("device block size differs from bytes per sector"));
        }
        if options.sectors_per_cluster == 0 {
            return Err(MountError::Malformed("zero sectors per cluster"));
        }
        let total_sectors = u32::try_from(device.total_blocks())
            .map_err(|_| MountError::Malformed("device too large for FAT32"))?;

        // Sized for every data cluster the reserved area leaves room for,
        // so the FATs never fall short of the data region.
        let estimated_clusters = (total_sectors as u64)
            .saturating_sub(options.reserved_sectors as u64)
            / options.sectors_per_cluster as u64;
        let sectors_per_fat = ((estimated_clusters + FIRST_DATA_CLUSTER as u64) * FAT_ENTRY_SIZE)
            .div_ceil(bytes_per_sector as u64) as u32;

        let geometry = VolumeGeometry::from_fields(
            bytes_per_sector,
            options.sectors_per_cluster,
            options.reserved_sectors,
            options.fat_count,
            total_sectors,
            sectors_per_fat,
            FIRST_DATA_CLUSTER,
        )?;

        let label = encode_label(options.volume_label);
        let volume_id = 0x4641_5433 ^ total_sectors;
        let zero_block = vec![0u8; bytes_per_sector as usize];

        // Reserved area: boot sector, FSInfo and the backup pair
        for sector in 1..geometry.reserved_sectors as u64 {
            device.write_block(sector, &zero_block)?;
        }
        let mut boot_block = vec![0u8; bytes_per_sector as usize];
        geometry.encode_boot_sector(&mut boot_block, &label, volume_id);
        device.write_block(0, &boot_block)?;

        let mut fsinfo_block = vec![0u8; bytes_per_sector as usize];
        boot_sector::encode_fsinfo(&mut fsinfo_block);
        if geometry.reserved_sectors > FSINFO_SECTOR {
            device.write_block(FSINFO_SECTOR as u64, &fsinfo_block)?;
        }
        if geometry.reserved_sectors > BACKUP_BOOT_SECTOR + FSINFO_SECTOR {
            device.write_block(BACKUP_BOOT_SECTOR as u64, &boot_block)?;
            device.write_block((BACKUP_BOOT_SECTOR + FSINFO_SECTOR) as u64, &fsinfo_block)?;
        }

        // Clear the FAT tables
        for copy in 0..geometry.fat_count {
            let fat_start = geometry.fat_start(copy);
            for sector in 0..geometry.sectors_per_fat as u64 {
                device.write_block(fat_start + sector, &zero_block)?;
            }
        }

        let root_label = options.volume_label.trim();
        let mut volume = Self::with_geometry(device, geometry, root_label)?;

        // First two FAT entries are reserved
        volume.write_fat_entry(0, FatEntry::from_raw(0x0FFF_FF00 | MEDIA_FIXED_DISK as u32))?;
        volume.write_fat_entry(1, FatEntry::END_OF_CHAIN)?;
        volume.write_fat_entry(geometry.root_cluster, FatEntry::END_OF_CHAIN)?;
        volume.zero_cluster(geometry.root_cluster)?;

        info!(
            "formatted {} sectors: {} clusters of {} bytes",
            total_sectors,
            geometry.total_clusters,
            geometry.cluster_size()
        );
        Ok(volume)
    }

    fn with_geometry(
        device: Box<dyn BlockDevice + 'a>,
        geometry: VolumeGeometry,
        root_label: &str,
    ) -> Result<Self, MountError> {
        if device.block_size() != geometry.bytes_per_sector as usize {
            return Err(MountError::Malformed("device block size differs from bytes per sector"));
        }
        if device.total_blocks() < geometry.total_sectors as u64 {
            return Err(MountError::Truncated);
        }

        debug!("volume geometry: {:?}", geometry);
        info!(
            "mounted {}: {} clusters, root at cluster {}",
            root_label, geometry.total_clusters, geometry.root_cluster
        );

        Ok(Self {
            device,
            geometry,
            current_cluster: geometry.root_cluster,
            path: PathStack::new(root_label, geometry.root_cluster),
            open_files: OpenFileTable::new(),
        })
    }

    /// Releases the volume and hands back its device
    pub fn unmount(self) -> Box<dyn BlockDevice + 'a> {
        self.device
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    /// First cluster of the current directory
    pub fn current_directory(&self) -> u32 {
        self.current_cluster
    }

    /// Current directory rendered as `label/SUB/...`
    pub fn current_path(&self) -> String {
        self.path.current_path()
    }

    pub fn path_depth(&self) -> usize {
        self.path.depth()
    }

    pub fn info(&self) -> Result<VolumeInfo, FsError> {
        let geometry = &self.geometry;
        Ok(VolumeInfo {
            bytes_per_sector: geometry.bytes_per_sector,
            sectors_per_cluster: geometry.sectors_per_cluster,
            reserved_sectors: geometry.reserved_sectors,
            fat_count: geometry.fat_count,
            sectors_per_fat: geometry.sectors_per_fat,
            root_cluster: geometry.root_cluster,
            first_data_sector: geometry.first_data_sector,
            total_clusters: geometry.total_clusters,
            entries_per_fat: geometry.entries_per_fat(),
            image_size: geometry.image_size(),
            free_clusters: self.free_cluster_count()?,
        })
    }

    fn sector_buffer(&self) -> Vec<u8> {
        vec![0u8; self.geometry.bytes_per_sector as usize]
    }

    /// First sector of a cluster, refusing anything outside the data region
    fn data_sector(&self, cluster: u32) -> Result<u64, FsError> {
        self.geometry
            .cluster_to_sector(cluster)
            .ok_or(FsError::InvalidCluster(cluster))
    }

    fn read_cluster(&self, cluster: u32) -> Result<Vec<u8>, FsError> {
        let first_sector = self.data_sector(cluster)?;
        let sector_size = self.geometry.bytes_per_sector as usize;
        let mut data = vec![0u8; self.geometry.cluster_size()];

        for (i, chunk) in data.chunks_exact_mut(sector_size).enumerate() {
            self.device.read_block(first_sector + i as u64, chunk)?;
        }
        Ok(data)
    }

    fn write_cluster(&mut self, cluster: u32, data: &[u8]) -> Result<(), FsError> {
        let first_sector = self.data_sector(cluster)?;
        let sector_size = self.geometry.bytes_per_sector as usize;

        for (i, chunk) in data.chunks_exact(sector_size).enumerate() {
            self.device.write_block(first_sector + i as u64, chunk)?;
        }
        Ok(())
    }

    fn zero_cluster(&mut self, cluster: u32) -> Result<(), FsError> {
        let zeroes = vec![0u8; self.geometry.cluster_size()];
        self.write_cluster(cluster, &zeroes)
    }
}

/// Boot sector volume label: uppercase, space padded to 11 bytes
fn encode_label(label: &str) -> [u8; SHORT_NAME_LENGTH] {
    let mut encoded = [b' '; SHORT_NAME_LENGTH];
    for (slot, byte) in encoded.iter_mut().zip(label.trim().bytes()) {
        *slot = byte.to_ascii_uppercase();
    }
    encoded
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::filesys::block::MemoryBlockDevice;

    /// 2 MiB volume with 512-byte clusters
    pub fn memory_volume() -> Volume<'static> {
        let device = MemoryBlockDevice::new(4096, 512);
        Volume::format(Box::new(device), FormatOptions::default()).unwrap()
    }

    /// Volume with 13 data clusters, 12 of them free after the root
    pub fn tiny_volume() -> Volume<'static> {
        let options = FormatOptions {
            reserved_sectors: 2,
            fat_count: 1,
            ..FormatOptions::default()
        };
        Volume::format(Box::new(MemoryBlockDevice::new(16, 512)), options).unwrap()
    }
}
