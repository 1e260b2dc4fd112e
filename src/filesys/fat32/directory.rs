//! Directory scanning, mutation and the `ls`/`mkdir`/`rmdir`/`cd` operations

use core::ops::ControlFlow;

use log::{debug, info};

use super::dir_entry::{encode_name, fits_83_name, is_valid_83_name};
use super::{constants::*, BusyReason, DirEntry83, FsError, Volume};

/// Position of a directory entry: a cluster of the directory and the slot
/// index inside that cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryLocation {
    pub cluster: u32,
    pub index: usize,
}

/// Result of a successful `cd`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdOutcome {
    Changed,
    /// `cd ..` at the root leaves everything as it was
    AlreadyAtRoot,
}

/// How a directory slot is treated while scanning
enum Slot {
    /// Ends the directory, reusable
    End,
    /// Deleted entry, reusable
    Deleted,
    /// Long file name fragment or volume label, skipped
    Hidden,
    Entry(DirEntry83),
}

impl Slot {
    fn classify(entry: DirEntry83) -> Self {
        if entry.is_end_marker() {
            Slot::End
        } else if entry.is_deleted() {
            Slot::Deleted
        } else if entry.is_long_name() || entry.is_volume_label() {
            Slot::Hidden
        } else {
            Slot::Entry(entry)
        }
    }
}

impl Volume<'_> {
    /// Visits the slots of a directory in order, cluster by cluster, up to
    /// and including the end marker.
    fn walk_directory<T, F>(&self, dir: u32, mut visit: F) -> Result<Option<T>, FsError>
    where
        F: FnMut(EntryLocation, Slot) -> ControlFlow<T>,
    {
        for cluster in self.cluster_chain(dir)? {
            let data = self.read_cluster(cluster)?;

            for (index, raw) in data.chunks_exact(DIR_ENTRY_SIZE).enumerate() {
                let mut bytes = [0u8; DIR_ENTRY_SIZE];
                bytes.copy_from_slice(raw);
                let slot = Slot::classify(DirEntry83::decode(&bytes));
                let at_end = matches!(slot, Slot::End);

                if let ControlFlow::Break(found) = visit(EntryLocation { cluster, index }, slot) {
                    return Ok(Some(found));
                }
                if at_end {
                    return Ok(None);
                }
            }
        }
        Ok(None)
    }

    /// Sector and byte offset of a directory slot
    fn entry_position(&self, location: EntryLocation) -> Result<(u64, usize), FsError> {
        let sector_size = self.geometry.bytes_per_sector as usize;
        let byte_offset = location.index * DIR_ENTRY_SIZE;
        let sector = self.data_sector(location.cluster)? + (byte_offset / sector_size) as u64;
        Ok((sector, byte_offset % sector_size))
    }

    pub fn read_entry(&self, location: EntryLocation) -> Result<DirEntry83, FsError> {
        let (sector, offset) = self.entry_position(location)?;
        let mut sector_data = self.sector_buffer();
        self.device.read_block(sector, &mut sector_data)?;

        let mut raw = [0u8; DIR_ENTRY_SIZE];
        raw.copy_from_slice(&sector_data[offset..offset + DIR_ENTRY_SIZE]);
        Ok(DirEntry83::decode(&raw))
    }

    /// Stores one entry with a read-modify-write of its sector
    pub fn write_entry(&mut self, location: EntryLocation, entry: &DirEntry83) -> Result<(), FsError> {
        let (sector, offset) = self.entry_position(location)?;
        let mut sector_data = self.sector_buffer();
        self.device.read_block(sector, &mut sector_data)?;
        sector_data[offset..offset + DIR_ENTRY_SIZE].copy_from_slice(&entry.encode());
        self.device.write_block(sector, &sector_data)
    }

    /// Looks `name` up in directory `dir`. Names too long for an 8.3 entry
    /// are simply not found.
    pub fn find_entry(&self, dir: u32, name: &str) -> Result<(DirEntry83, EntryLocation), FsError> {
        if name != "." && name != ".." && !fits_83_name(name) {
            return Err(FsError::NotFound);
        }
        let target = encode_name(name);

        self.walk_directory(dir, |location, slot| match slot {
            Slot::Entry(entry) if entry.matches(&target) => ControlFlow::Break((entry, location)),
            _ => ControlFlow::Continue(()),
        })?
        .ok_or(FsError::NotFound)
    }

    fn find_free_slot(&self, dir: u32) -> Result<Option<EntryLocation>, FsError> {
        self.walk_directory(dir, |location, slot| match slot {
            Slot::End | Slot::Deleted => ControlFlow::Break(location),
            _ => ControlFlow::Continue(()),
        })
    }

    /// True iff no slot in any cluster of the directory is free or deleted
    pub fn is_directory_full(&self, dir: u32) -> Result<bool, FsError> {
        Ok(self.find_free_slot(dir)?.is_none())
    }

    /// True iff the directory holds nothing besides `.` and `..`
    pub fn is_directory_empty(&self, dir: u32) -> Result<bool, FsError> {
        let live = self.walk_directory(dir, |_, slot| match slot {
            Slot::Entry(entry) if !entry.is_dot_entry() => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        })?;
        Ok(live.is_none())
    }

    /// Grows a directory by one zeroed cluster and returns it.
    fn expand_directory(&mut self, dir: u32) -> Result<u32, FsError> {
        let cluster = self.allocate_cluster()?.ok_or(FsError::DirectoryFull)?;

        let linked = self
            .zero_cluster(cluster)
            .and_then(|()| self.link_cluster(dir, cluster));
        if let Err(e) = linked {
            self.release_chain(cluster);
            return Err(e);
        }

        debug!("directory {} expanded with cluster {}", dir, cluster);
        Ok(cluster)
    }

    /// Writes `entry` into the first reusable slot of `dir`, growing the
    /// directory by one cluster when every slot is taken.
    pub fn insert_entry(&mut self, dir: u32, entry: &DirEntry83) -> Result<EntryLocation, FsError> {
        let location = match self.find_free_slot(dir)? {
            Some(location) => location,
            None => EntryLocation {
                cluster: self.expand_directory(dir)?,
                index: 0,
            },
        };

        self.write_entry(location, entry)?;
        Ok(location)
    }

    /// Marks the slot at `location` deleted
    pub(super) fn delete_entry_at(&mut self, location: EntryLocation, mut entry: DirEntry83) -> Result<(), FsError> {
        entry.name[0] = DELETED_ENTRY_MARKER;
        self.write_entry(location, &entry)
    }

    /// Marks the entry called `name` in `dir` deleted and returns it as it
    /// was. Its clusters are left alone.
    pub fn mark_deleted(&mut self, dir: u32, name: &str) -> Result<DirEntry83, FsError> {
        let (entry, location) = self.find_entry(dir, name)?;
        self.delete_entry_at(location, entry)?;
        Ok(entry)
    }

    /// Fills `cluster` with the `.` and `..` entries of a new directory
    pub fn initialize_directory(&mut self, cluster: u32, parent: u32) -> Result<(), FsError> {
        let mut data = vec![0u8; self.geometry.cluster_size()];
        data[..DIR_ENTRY_SIZE].copy_from_slice(&DirEntry83::dot(cluster).encode());
        data[DIR_ENTRY_SIZE..2 * DIR_ENTRY_SIZE].copy_from_slice(&DirEntry83::dot_dot(parent).encode());
        self.write_cluster(cluster, &data)
    }

    /// Parent of `dir` according to its `..` entry
    fn parent_of(&self, dir: u32) -> Result<u32, FsError> {
        if dir == self.geometry.root_cluster {
            return Ok(dir);
        }
        let (entry, _) = self.find_entry(dir, "..")?;
        Ok(self.directory_cluster(&entry))
    }

    /// First cluster of a directory entry, where 0 means the root
    fn directory_cluster(&self, entry: &DirEntry83) -> u32 {
        match entry.first_cluster() {
            0 => self.geometry.root_cluster,
            cluster => cluster,
        }
    }

    /// Resolves `.`, `..` or a subdirectory name relative to the current directory
    pub fn resolve_directory(&self, name: &str) -> Result<u32, FsError> {
        match name {
            "." => Ok(self.current_cluster),
            ".." => self.parent_of(self.current_cluster),
            _ => {
                let (entry, _) = self.find_entry(self.current_cluster, name)?;
                if !entry.is_directory() {
                    return Err(FsError::NotADirectory);
                }
                Ok(self.directory_cluster(&entry))
            }
        }
    }

    /// Live entries of the current directory, `.` and `..` included
    pub fn list_directory(&self) -> Result<Vec<DirEntry83>, FsError> {
        let mut entries = Vec::new();
        self.walk_directory(self.current_cluster, |_, slot| {
            if let Slot::Entry(entry) = slot {
                entries.push(entry);
            }
            ControlFlow::<()>::Continue(())
        })?;
        Ok(entries)
    }

    /// Creates a subdirectory of the current directory and returns its cluster.
    pub fn make_directory(&mut self, name: &str) -> Result<u32, FsError> {
        if !is_valid_83_name(name) {
            return Err(FsError::InvalidName);
        }
        let parent = self.current_cluster;
        match self.find_entry(parent, name) {
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let cluster = self.allocate_cluster()?.ok_or(FsError::NoFreeCluster)?;

        // The new cluster is complete before the parent can reach it
        let created = self
            .initialize_directory(cluster, parent)
            .and_then(|()| self.insert_entry(parent, &DirEntry83::new_directory(name, cluster)));
        if let Err(e) = created {
            self.release_chain(cluster);
            return Err(e);
        }

        info!("created directory {} at cluster {}", name, cluster);
        Ok(cluster)
    }

    /// Removes an empty subdirectory of the current directory.
    pub fn remove_directory(&mut self, name: &str) -> Result<(), FsError> {
        if name == "." || name == ".." {
            return Err(FsError::InvalidName);
        }
        let (entry, location) = self.find_entry(self.current_cluster, name)?;
        if !entry.is_directory() {
            return Err(FsError::NotADirectory);
        }

        let cluster = entry.first_cluster();
        if cluster >= FIRST_DATA_CLUSTER && !self.is_directory_empty(cluster)? {
            return Err(FsError::Busy(BusyReason::DirectoryNotEmpty));
        }

        self.delete_entry_at(location, entry)?;
        if cluster >= FIRST_DATA_CLUSTER {
            self.free_chain(cluster)?;
        }

        info!("removed directory {}", name);
        Ok(())
    }

    /// Changes the current directory to `.`, `..` or a subdirectory.
    pub fn change_directory(&mut self, name: &str) -> Result<CdOutcome, FsError> {
        let root = self.geometry.root_cluster;
        match name {
            "." => Ok(CdOutcome::Changed),
            ".." => {
                if self.current_cluster == root {
                    return Ok(CdOutcome::AlreadyAtRoot);
                }
                let parent = self.parent_of(self.current_cluster)?;
                if parent == root {
                    self.path.truncate_to_root();
                } else {
                    self.path.pop();
                }
                self.current_cluster = parent;
                Ok(CdOutcome::Changed)
            }
            _ => {
                let (entry, _) = self.find_entry(self.current_cluster, name)?;
                if !entry.is_directory() {
                    return Err(FsError::NotADirectory);
                }
                let cluster = self.directory_cluster(&entry);
                self.path.push(entry.display_name().as_str(), cluster)?;
                self.current_cluster = cluster;
                debug!("current directory is now {}", self.path.current_path());
                Ok(CdOutcome::Changed)
            }
        }
    }
}
