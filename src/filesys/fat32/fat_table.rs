//! FAT access: entry reads and mirrored writes, chain traversal, allocation

use bytes::Buf;
use log::{debug, trace, warn};

use super::{constants::*, FatEntry, FsError, Volume};

impl Volume<'_> {
    /// Sector and byte offset of a cluster's entry in the first FAT
    fn fat_location(&self, cluster: u32) -> Result<(u64, usize), FsError> {
        if cluster as u64 >= self.geometry.entries_per_fat() {
            return Err(FsError::InvalidCluster(cluster));
        }
        let offset = cluster as u64 * FAT_ENTRY_SIZE;
        let sector_size = self.geometry.bytes_per_sector as u64;
        Ok((offset / sector_size, (offset % sector_size) as usize))
    }

    pub fn read_fat_entry(&self, cluster: u32) -> Result<FatEntry, FsError> {
        let (sector, sector_offset) = self.fat_location(cluster)?;

        let mut sector_data = self.sector_buffer();
        self.device
            .read_block(self.geometry.fat_start(0) + sector, &mut sector_data)?;

        Ok(FatEntry::from_raw((&sector_data[sector_offset..]).get_u32_le()))
    }

    /// Writes `entry` to every FAT copy, keeping the reserved high nibble
    /// already on disk.
    pub fn write_fat_entry(&mut self, cluster: u32, entry: FatEntry) -> Result<(), FsError> {
        let (sector, sector_offset) = self.fat_location(cluster)?;
        let mut sector_data = self.sector_buffer();

        for copy in 0..self.geometry.fat_count {
            let fat_sector = self.geometry.fat_start(copy) + sector;
            self.device.read_block(fat_sector, &mut sector_data)?;

            let old = (&sector_data[sector_offset..]).get_u32_le();
            let new = (old & !FAT_ENTRY_MASK) | (entry.cluster & FAT_ENTRY_MASK);
            sector_data[sector_offset..sector_offset + 4].copy_from_slice(&new.to_le_bytes());

            self.device.write_block(fat_sector, &sector_data)?;
        }

        trace!("FAT[{}] = {:#x}", cluster, entry.cluster);
        Ok(())
    }

    /// Visits the entries of every valid data cluster in order, one FAT
    /// sector read at a time.
    fn scan_fat<F>(&self, mut visit: F) -> Result<Option<u32>, FsError>
    where
        F: FnMut(u32, FatEntry) -> bool,
    {
        let entries_per_sector = self.geometry.bytes_per_sector as u32 / FAT_ENTRY_SIZE as u32;
        let max_cluster = self.geometry.max_cluster();
        let mut sector_data = self.sector_buffer();

        let mut cluster = FIRST_DATA_CLUSTER;
        while cluster <= max_cluster {
            let sector = cluster / entries_per_sector;
            self.device
                .read_block(self.geometry.fat_start(0) + sector as u64, &mut sector_data)?;

            let mut entries = &sector_data[((cluster % entries_per_sector) as usize * 4)..];
            while entries.has_remaining() && cluster <= max_cluster {
                if visit(cluster, FatEntry::from_raw(entries.get_u32_le())) {
                    return Ok(Some(cluster));
                }
                cluster += 1;
            }
        }

        Ok(None)
    }

    /// Claims the first free data cluster and marks it end-of-chain.
    ///
    /// Running out of space is an ordinary condition and yields `None`.
    pub fn allocate_cluster(&mut self) -> Result<Option<u32>, FsError> {
        let found = self.scan_fat(|_, entry| entry.is_free())?;

        if let Some(cluster) = found {
            self.write_fat_entry(cluster, FatEntry::END_OF_CHAIN)?;
            debug!("allocated cluster {}", cluster);
        } else {
            debug!("no free cluster left");
        }
        Ok(found)
    }

    pub fn free_cluster_count(&self) -> Result<u32, FsError> {
        let mut free = 0;
        self.scan_fat(|_, entry| {
            if entry.is_free() {
                free += 1;
            }
            false
        })?;
        Ok(free)
    }

    /// Follows one link of the chain that starts at `start`.
    ///
    /// Returns `None` at the end of the chain; a free, bad or out of range
    /// link is corruption.
    fn next_cluster(&self, start: u32, cluster: u32) -> Result<Option<u32>, FsError> {
        let entry = self.read_fat_entry(cluster)?;
        if entry.is_end_of_chain() {
            return Ok(None);
        }
        match entry.next() {
            Some(next) if self.geometry.is_valid_cluster(next) => Ok(Some(next)),
            _ => Err(FsError::CorruptChain { start }),
        }
    }

    /// Every cluster of a chain, in order.
    pub fn cluster_chain(&self, start: u32) -> Result<Vec<u32>, FsError> {
        if !self.geometry.is_valid_cluster(start) {
            return Err(FsError::InvalidCluster(start));
        }

        let limit = self.geometry.usable_clusters() as usize;
        let mut chain = vec![start];
        let mut cluster = start;
        while let Some(next) = self.next_cluster(start, cluster)? {
            if chain.len() >= limit {
                return Err(FsError::CorruptChain { start });
            }
            chain.push(next);
            cluster = next;
        }
        Ok(chain)
    }

    pub fn chain_length(&self, start: u32) -> Result<usize, FsError> {
        Ok(self.cluster_chain(start)?.len())
    }

    /// Cluster holding byte `offset` of the chain, `None` past its end.
    pub fn cluster_at_offset(&self, start: u32, offset: u64) -> Result<Option<u32>, FsError> {
        if !self.geometry.is_valid_cluster(start) {
            return Err(FsError::InvalidCluster(start));
        }

        let index = offset / self.geometry.cluster_size() as u64;
        if index >= self.geometry.usable_clusters() as u64 {
            return Ok(None);
        }

        let mut cluster = start;
        for _ in 0..index {
            match self.next_cluster(start, cluster)? {
                Some(next) => cluster = next,
                None => return Ok(None),
            }
        }
        Ok(Some(cluster))
    }

    /// Appends `new` to the chain starting at `chain_start`.
    pub fn link_cluster(&mut self, chain_start: u32, new: u32) -> Result<(), FsError> {
        if !self.geometry.is_valid_cluster(new) {
            return Err(FsError::InvalidCluster(new));
        }
        let chain = self.cluster_chain(chain_start)?;
        let tail = *chain.last().ok_or(FsError::CorruptChain { start: chain_start })?;

        // Terminate the new cluster before it becomes reachable
        self.write_fat_entry(new, FatEntry::END_OF_CHAIN)?;
        self.write_fat_entry(tail, FatEntry { cluster: new })?;

        debug!("linked cluster {} after {} (chain {})", new, tail, chain_start);
        Ok(())
    }

    /// Zeroes every entry of the chain, stopping at a terminal or free entry.
    pub fn free_chain(&mut self, start: u32) -> Result<(), FsError> {
        if !self.geometry.is_valid_cluster(start) {
            return Err(FsError::InvalidCluster(start));
        }

        let limit = self.geometry.usable_clusters();
        let mut cluster = start;
        let mut freed = 0;
        loop {
            let entry = self.read_fat_entry(cluster)?;
            self.write_fat_entry(cluster, FatEntry::FREE)?;
            freed += 1;

            if entry.is_end_of_chain() || entry.is_free() || entry.is_bad() {
                break;
            }
            match entry.next() {
                Some(next) if self.geometry.is_valid_cluster(next) && freed < limit => {
                    cluster = next
                }
                _ => return Err(FsError::CorruptChain { start }),
            }
        }

        debug!("freed {} cluster(s) starting at {}", freed, start);
        Ok(())
    }

    /// Makes `cluster` the last cluster of its chain and frees what followed it.
    pub fn truncate_after(&mut self, cluster: u32) -> Result<(), FsError> {
        let entry = self.read_fat_entry(cluster)?;
        self.write_fat_entry(cluster, FatEntry::END_OF_CHAIN)?;

        match entry.next() {
            Some(next) => self.free_chain(next),
            None => Ok(()),
        }
    }

    /// Frees a chain while unwinding a failed operation. A failure here is
    /// logged and the original error is reported instead.
    pub(super) fn release_chain(&mut self, start: u32) {
        if let Err(e) = self.free_chain(start) {
            warn!("could not release cluster chain {}: {}", start, e);
        } else {
            warn!("rolled back allocation of cluster chain {}", start);
        }
    }
}
