//! File operations over cluster chains: create, open, read, write, seek, delete

use core::cmp::{max, min};

use log::{debug, info, warn};

use super::dir_entry::is_valid_83_name;
use super::{
    constants::*, AccessMode, BusyReason, DirEntry83, FatEntry, FsError, OpenFile, Volume,
};

impl Volume<'_> {
    /// Whether a file or directory called `name` exists in the current directory
    pub fn file_exists(&self, name: &str) -> Result<bool, FsError> {
        match self.find_entry(self.current_cluster, name) {
            Ok(_) => Ok(true),
            Err(FsError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Creates an empty file in the current directory with one zeroed cluster.
    pub fn create_file(&mut self, name: &str) -> Result<(), FsError> {
        if !is_valid_83_name(name) {
            return Err(FsError::InvalidName);
        }
        if self.file_exists(name)? {
            return Err(FsError::AlreadyExists);
        }

        let cluster = self.allocate_cluster()?.ok_or(FsError::NoFreeCluster)?;
        let dir = self.current_cluster;
        let created = self
            .zero_cluster(cluster)
            .and_then(|()| self.insert_entry(dir, &DirEntry83::new_file(name, cluster)));
        if let Err(e) = created {
            self.release_chain(cluster);
            return Err(e);
        }

        info!("created file {} at cluster {}", name, cluster);
        Ok(())
    }

    /// Opens a file of the current directory. Returns the table slot index.
    pub fn open_file(&mut self, name: &str, mode: AccessMode) -> Result<usize, FsError> {
        let (entry, location) = self.find_entry(self.current_cluster, name)?;
        if entry.is_directory() {
            return Err(FsError::IsADirectory);
        }

        let index = self.open_files.insert(OpenFile {
            name: entry.display_name(),
            mode,
            offset: 0,
            first_cluster: entry.first_cluster(),
            location,
            path: self.path.current_path(),
            session: 0,
        })?;

        debug!("opened {} {} in slot {}", entry.display_name(), mode, index);
        Ok(index)
    }

    pub fn close_file(&mut self, name: &str) -> Result<(), FsError> {
        let file = self.open_files.remove(name)?;
        debug!("closed {} (session {})", file.name, file.session);
        Ok(())
    }

    /// Open sessions with their table index, in slot order
    pub fn open_files(&self) -> Vec<(usize, OpenFile)> {
        self.open_files
            .iter()
            .map(|(index, file)| (index, file.clone()))
            .collect()
    }

    /// Moves the offset of an open file. Any offset is accepted; reads past
    /// the end fail and writes past the end grow the file.
    pub fn seek_file(&mut self, name: &str, offset: u64) -> Result<(), FsError> {
        let file = self.open_files.find_mut(name).ok_or(FsError::NotOpen)?;
        file.offset = offset;
        Ok(())
    }

    /// Reads up to `count` bytes at the session offset and advances it.
    pub fn read_file(&mut self, name: &str, count: u64) -> Result<Vec<u8>, FsError> {
        let file = self.open_files.find(name).ok_or(FsError::NotOpen)?;
        if !file.mode.can_read() {
            return Err(FsError::NotReadable);
        }
        let (offset, location) = (file.offset, file.location);

        let entry = self.read_entry(location)?;
        let size = entry.file_size as u64;
        if offset >= size {
            return Err(FsError::OffsetOutOfRange);
        }

        let length = min(count, size - offset) as usize;
        let data = self.read_chain(entry.first_cluster(), offset, length)?;

        if let Some(file) = self.open_files.find_mut(name) {
            file.offset = offset + data.len() as u64;
        }
        Ok(data)
    }

    /// Writes `data` at the session offset, growing the cluster chain as
    /// needed, and advances the offset.
    pub fn write_file(&mut self, name: &str, data: &[u8]) -> Result<usize, FsError> {
        let file = self.open_files.find(name).ok_or(FsError::NotOpen)?;
        if !file.mode.can_write() {
            return Err(FsError::NotWritable);
        }
        let (offset, location) = (file.offset, file.location);

        if data.is_empty() {
            return Ok(0);
        }
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|&end| end <= MAX_FILE_SIZE)
            .ok_or(FsError::FileTooLarge)?;

        let mut entry = self.read_entry(location)?;
        let mut first_cluster = entry.first_cluster();
        if first_cluster < FIRST_DATA_CLUSTER {
            first_cluster = self.allocate_cluster()?.ok_or(FsError::NoFreeCluster)?;
            let attached = self.zero_cluster(first_cluster).and_then(|()| {
                entry.set_first_cluster(first_cluster);
                self.write_entry(location, &entry)
            });
            if let Err(e) = attached {
                self.release_chain(first_cluster);
                return Err(e);
            }
        }

        self.ensure_capacity(first_cluster, end)?;
        self.write_chain(first_cluster, offset, data)?;

        entry.file_size = max(entry.file_size as u64, end) as u32;
        self.write_entry(location, &entry)?;

        if let Some(file) = self.open_files.find_mut(name) {
            file.offset = end;
            file.first_cluster = first_cluster;
        }

        debug!("wrote {} bytes to {} at offset {}", data.len(), name, offset);
        Ok(data.len())
    }

    /// Deletes a closed file of the current directory and frees its clusters.
    pub fn delete_file(&mut self, name: &str) -> Result<(), FsError> {
        let (entry, location) = self.find_entry(self.current_cluster, name)?;
        if entry.is_directory() {
            return Err(FsError::IsADirectory);
        }
        if self.open_files.is_open_at(location) {
            return Err(FsError::Busy(BusyReason::FileOpen));
        }

        self.delete_entry_at(location, entry)?;

        let cluster = entry.first_cluster();
        if cluster >= FIRST_DATA_CLUSTER {
            self.free_chain(cluster)?;
        }

        info!("removed file {}", name);
        Ok(())
    }

    /// Grows the chain starting at `first_cluster` to hold `end` bytes.
    ///
    /// Every added cluster is zeroed. When space runs out the chain is cut
    /// back to its original length.
    fn ensure_capacity(&mut self, first_cluster: u32, end: u64) -> Result<(), FsError> {
        let cluster_size = self.geometry.cluster_size() as u64;
        let needed = max(end.div_ceil(cluster_size), 1) as usize;
        let chain = self.cluster_chain(first_cluster)?;
        let original_tail = *chain.last().ok_or(FsError::CorruptChain {
            start: first_cluster,
        })?;

        let mut tail = original_tail;
        for _ in chain.len()..needed {
            match self.append_cluster(tail) {
                Ok(cluster) => tail = cluster,
                Err(e) => {
                    warn!(
                        "cannot grow chain {} to {} clusters: {}",
                        first_cluster, needed, e
                    );
                    if tail != original_tail {
                        if let Err(rollback) = self.truncate_after(original_tail) {
                            warn!("rollback of chain {} failed: {}", first_cluster, rollback);
                        }
                    }
                    return Err(e);
                }
            }
        }

        if needed > chain.len() {
            debug!(
                "chain {} grown from {} to {} clusters",
                first_cluster,
                chain.len(),
                needed
            );
        }
        Ok(())
    }

    /// Allocates a zeroed cluster and links it after `tail`
    fn append_cluster(&mut self, tail: u32) -> Result<u32, FsError> {
        let cluster = self.allocate_cluster()?.ok_or(FsError::NoFreeCluster)?;
        if let Err(e) = self.zero_cluster(cluster) {
            self.release_chain(cluster);
            return Err(e);
        }
        self.write_fat_entry(tail, FatEntry { cluster })?;
        Ok(cluster)
    }

    /// First cluster to touch for byte `offset` of a chain that must reach it
    fn chain_cluster_at(&self, first_cluster: u32, offset: u64) -> Result<u32, FsError> {
        self.cluster_at_offset(first_cluster, offset)?
            .ok_or(FsError::CorruptChain {
                start: first_cluster,
            })
    }

    /// Follows the chain from `cluster`, which must not be its end
    fn chain_successor(&self, first_cluster: u32, cluster: u32) -> Result<u32, FsError> {
        match self.read_fat_entry(cluster)?.next() {
            Some(next) if self.geometry.is_valid_cluster(next) => Ok(next),
            _ => Err(FsError::CorruptChain {
                start: first_cluster,
            }),
        }
    }

    /// Reads `length` bytes starting at byte `offset` of a chain
    fn read_chain(&self, first_cluster: u32, offset: u64, length: usize) -> Result<Vec<u8>, FsError> {
        let cluster_size = self.geometry.cluster_size() as u64;
        let sector_size = self.geometry.bytes_per_sector as usize;
        let mut sector_data = self.sector_buffer();
        let mut data = Vec::with_capacity(length);

        let mut cluster = self.chain_cluster_at(first_cluster, offset)?;
        let mut position = offset;
        while data.len() < length {
            let cluster_offset = (position % cluster_size) as usize;
            let sector = self.data_sector(cluster)? + (cluster_offset / sector_size) as u64;
            let sector_offset = cluster_offset % sector_size;
            let chunk = min(sector_size - sector_offset, length - data.len());

            self.device.read_block(sector, &mut sector_data)?;
            data.extend_from_slice(&sector_data[sector_offset..sector_offset + chunk]);
            position += chunk as u64;

            if position % cluster_size == 0 && data.len() < length {
                cluster = self.chain_successor(first_cluster, cluster)?;
            }
        }
        Ok(data)
    }

    /// Writes `data` at byte `offset` of a chain long enough to hold it.
    /// Partially covered sectors are read first.
    fn write_chain(&mut self, first_cluster: u32, offset: u64, data: &[u8]) -> Result<(), FsError> {
        let cluster_size = self.geometry.cluster_size() as u64;
        let sector_size = self.geometry.bytes_per_sector as usize;
        let mut sector_data = self.sector_buffer();

        let mut cluster = self.chain_cluster_at(first_cluster, offset)?;
        let mut position = offset;
        let mut written = 0;
        while written < data.len() {
            let cluster_offset = (position % cluster_size) as usize;
            let sector = self.data_sector(cluster)? + (cluster_offset / sector_size) as u64;
            let sector_offset = cluster_offset % sector_size;
            let chunk = min(sector_size - sector_offset, data.len() - written);

            if chunk < sector_size {
                self.device.read_block(sector, &mut sector_data)?;
            }
            sector_data[sector_offset..sector_offset + chunk]
                .copy_from_slice(&data[written..written + chunk]);
            self.device.write_block(sector, &sector_data)?;

            written += chunk;
            position += chunk as u64;

            if position % cluster_size == 0 && written < data.len() {
                cluster = self.chain_successor(first_cluster, cluster)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::{RngCore, SeedableRng};

    use super::super::test_support::*;
    use super::*;

    fn payload(len: usize, seed: u64) -> Vec<u8> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut data = vec![0u8; len];
        rng.fill_bytes(&mut data);
        data
    }

    fn entry_of(volume: &Volume, name: &str) -> DirEntry83 {
        volume.find_entry(volume.current_directory(), name).unwrap().0
    }

    #[test]
    fn test_create_file() {
        let mut volume = memory_volume();
        let free = volume.free_cluster_count().unwrap();
        volume.create_file("notes.txt").unwrap();

        let entry = entry_of(&volume, "NOTES.TXT");
        assert!(!entry.is_directory());
        assert_eq!(entry.file_size, 0);
        assert!(entry.first_cluster() >= 2);
        assert_eq!(volume.free_cluster_count().unwrap(), free - 1);
        assert!(volume.file_exists("notes.txt").unwrap());
        assert!(!volume.file_exists("other").unwrap());

        assert_eq!(volume.create_file("NOTES.txt"), Err(FsError::AlreadyExists));
        assert_eq!(volume.create_file("no.good.name"), Err(FsError::InvalidName));
    }

    #[test]
    fn test_open_errors() {
        let mut volume = memory_volume();
        volume.create_file("a").unwrap();
        volume.make_directory("dir").unwrap();

        assert_eq!(volume.open_file("missing", AccessMode::Read), Err(FsError::NotFound));
        assert_eq!(volume.open_file("dir", AccessMode::Read), Err(FsError::IsADirectory));
        assert_eq!(volume.open_file("a", AccessMode::Read), Ok(0));
        assert_eq!(volume.open_file("A", AccessMode::Write), Err(FsError::AlreadyOpen));
        assert_eq!(volume.close_file("a"), Ok(()));
        assert_eq!(volume.close_file("a"), Err(FsError::NotOpen));
    }

    #[test]
    fn test_mode_is_enforced() {
        let mut volume = memory_volume();
        volume.create_file("a").unwrap();
        volume.create_file("b").unwrap();
        volume.open_file("a", AccessMode::Read).unwrap();
        volume.open_file("b", AccessMode::Write).unwrap();

        assert_eq!(volume.write_file("a", b"x"), Err(FsError::NotWritable));
        assert_eq!(volume.read_file("b", 1), Err(FsError::NotReadable));
        assert_eq!(volume.read_file("c", 1), Err(FsError::NotOpen));
        assert_eq!(volume.write_file("c", b"x"), Err(FsError::NotOpen));
        assert_eq!(volume.seek_file("c", 0), Err(FsError::NotOpen));
    }

    #[test]
    fn test_write_then_read_back() {
        let mut volume = memory_volume();
        volume.create_file("hello.txt").unwrap();
        volume.open_file("hello.txt", AccessMode::ReadWrite).unwrap();

        assert_eq!(volume.write_file("hello.txt", b"hello world"), Ok(11));
        assert_eq!(entry_of(&volume, "hello.txt").file_size, 11);

        assert_eq!(volume.read_file("hello.txt", 5), Err(FsError::OffsetOutOfRange));
        volume.seek_file("hello.txt", 6).unwrap();
        assert_eq!(volume.read_file("hello.txt", 100).unwrap(), b"world");
        assert_eq!(volume.open_files()[0].1.offset, 11);

        volume.seek_file("hello.txt", 0).unwrap();
        assert_eq!(volume.write_file("hello.txt", b"HE"), Ok(2));
        volume.seek_file("hello.txt", 0).unwrap();
        assert_eq!(volume.read_file("hello.txt", 11).unwrap(), b"HEllo world");
        assert_eq!(entry_of(&volume, "hello.txt").file_size, 11);
        assert_eq!(volume.write_file("hello.txt", b""), Ok(0));
    }

    #[test]
    fn test_multi_cluster_write_grows_chain() {
        let mut volume = memory_volume();
        volume.create_file("big.bin").unwrap();
        volume.open_file("big.bin", AccessMode::ReadWrite).unwrap();
        let first = entry_of(&volume, "big.bin").first_cluster();

        let data = payload(1300, 7);
        assert_eq!(volume.write_file("big.bin", &data), Ok(1300));
        assert_eq!(volume.chain_length(first).unwrap(), 3);
        assert_eq!(entry_of(&volume, "big.bin").file_size, 1300);

        volume.seek_file("big.bin", 0).unwrap();
        assert_eq!(volume.read_file("big.bin", 5000).unwrap(), data);

        // Read across the first cluster boundary
        volume.seek_file("big.bin", 500).unwrap();
        assert_eq!(volume.read_file("big.bin", 30).unwrap(), &data[500..530]);
    }

    #[test]
    fn test_append_after_seek_past_end() {
        let mut volume = memory_volume();
        volume.create_file("gap").unwrap();
        volume.open_file("gap", AccessMode::ReadWrite).unwrap();
        let first = entry_of(&volume, "gap").first_cluster();

        volume.seek_file("gap", 2000).unwrap();
        volume.write_file("gap", b"tail").unwrap();
        assert_eq!(entry_of(&volume, "gap").file_size, 2004);
        assert_eq!(volume.chain_length(first).unwrap(), 4);

        volume.seek_file("gap", 1990).unwrap();
        let read = volume.read_file("gap", 100).unwrap();
        assert_eq!(&read[..10], &[0u8; 10]);
        assert_eq!(&read[10..], b"tail");
    }

    #[test]
    fn test_failed_growth_is_rolled_back() {
        let mut volume = tiny_volume();
        volume.create_file("f").unwrap();
        volume.open_file("f", AccessMode::Write).unwrap();
        let first = entry_of(&volume, "f").first_cluster();
        let free = volume.free_cluster_count().unwrap();
        assert_eq!(free, 11);

        let data = payload(512 * 20, 3);
        assert_eq!(volume.write_file("f", &data), Err(FsError::NoFreeCluster));
        assert_eq!(volume.chain_length(first).unwrap(), 1);
        assert_eq!(volume.free_cluster_count().unwrap(), free);
        assert_eq!(entry_of(&volume, "f").file_size, 0);
    }

    #[test]
    fn test_file_without_cluster_gets_one_on_write() {
        let mut volume = memory_volume();
        let root = volume.current_directory();
        volume
            .insert_entry(root, &DirEntry83::new_file("empty", 0))
            .unwrap();
        volume.open_file("empty", AccessMode::ReadWrite).unwrap();

        volume.write_file("empty", b"data").unwrap();
        let entry = entry_of(&volume, "empty");
        assert!(entry.first_cluster() >= 2);
        assert_eq!(entry.file_size, 4);
        volume.seek_file("empty", 0).unwrap();
        assert_eq!(volume.read_file("empty", 4).unwrap(), b"data");
    }

    #[test]
    fn test_size_limit() {
        let mut volume = memory_volume();
        volume.create_file("f").unwrap();
        volume.open_file("f", AccessMode::Write).unwrap();
        volume.seek_file("f", MAX_FILE_SIZE).unwrap();
        assert_eq!(volume.write_file("f", b"x"), Err(FsError::FileTooLarge));
    }

    #[test]
    fn test_delete_open_file_is_busy() {
        let mut volume = memory_volume();
        let free = volume.free_cluster_count().unwrap();
        volume.create_file("f.txt").unwrap();
        volume.open_file("f.txt", AccessMode::ReadWrite).unwrap();
        volume.write_file("f.txt", &payload(1500, 1)).unwrap();

        assert_eq!(
            volume.delete_file("f.txt"),
            Err(FsError::Busy(BusyReason::FileOpen))
        );
        volume.close_file("f.txt").unwrap();
        volume.delete_file("f.txt").unwrap();

        assert!(!volume.file_exists("f.txt").unwrap());
        assert_eq!(volume.free_cluster_count().unwrap(), free);
        assert_eq!(volume.delete_file("f.txt"), Err(FsError::NotFound));
    }

    #[test]
    fn test_delete_directory_is_refused() {
        let mut volume = memory_volume();
        volume.make_directory("dir").unwrap();
        assert_eq!(volume.delete_file("dir"), Err(FsError::IsADirectory));
    }

    #[test]
    fn test_lsof_reports_path() {
        let mut volume = memory_volume();
        volume.make_directory("sub").unwrap();
        volume.change_directory("sub").unwrap();
        volume.create_file("x").unwrap();
        volume.open_file("x", AccessMode::Read).unwrap();

        let open = volume.open_files();
        assert_eq!(open.len(), 1);
        let (index, file) = &open[0];
        assert_eq!(*index, 0);
        assert_eq!(file.name.as_str(), "X");
        assert_eq!(file.mode, AccessMode::Read);
        assert_eq!(file.path, "NO NAME/SUB");
    }

    #[test]
    fn test_end_to_end_session() {
        let mut volume = memory_volume();
        volume.make_directory("SUB").unwrap();
        volume.change_directory("SUB").unwrap();
        let names: Vec<String> = volume
            .list_directory()
            .unwrap()
            .iter()
            .map(|e| e.display_name().to_string())
            .collect();
        assert_eq!(names, vec![".", ".."]);

        volume.create_file("f.txt").unwrap();
        volume.open_file("f.txt", AccessMode::ReadWrite).unwrap();
        volume.write_file("f.txt", b"hello").unwrap();
        volume.close_file("f.txt").unwrap();
        volume.open_file("f.txt", AccessMode::Read).unwrap();
        assert_eq!(volume.read_file("f.txt", 5).unwrap(), b"hello");

        // Everything is on disk: a fresh mount sees the same file
        let mut remounted = Volume::mount(volume.unmount(), "disk.img").unwrap();
        remounted.change_directory("sub").unwrap();
        remounted.open_file("f.txt", AccessMode::Read).unwrap();
        assert_eq!(remounted.read_file("f.txt", 64).unwrap(), b"hello");
    }
}
