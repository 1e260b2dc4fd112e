//! Open-file sessions

use core::fmt;
use core::str::FromStr;

use super::{EntryLocation, FsError, ShortName};
use crate::constants::MAX_OPEN_FILES;

/// Access granted by `open`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    pub fn can_read(self) -> bool {
        matches!(self, AccessMode::Read | AccessMode::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, AccessMode::Write | AccessMode::ReadWrite)
    }

    /// Flag as typed in the shell
    pub fn as_flag(self) -> &'static str {
        match self {
            AccessMode::Read => "-r",
            AccessMode::Write => "-w",
            AccessMode::ReadWrite => "-rw",
        }
    }
}

impl FromStr for AccessMode {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix('-').unwrap_or(s) {
            "r" => Ok(AccessMode::Read),
            "w" => Ok(AccessMode::Write),
            "rw" | "wr" => Ok(AccessMode::ReadWrite),
            _ => Err(FsError::InvalidMode),
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_flag())
    }
}

/// Represents an open file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFile {
    /// Canonical 8.3 name
    pub name: ShortName,

    pub mode: AccessMode,

    /// Current position in file
    pub offset: u64,

    /// First data cluster, 0 while the file has none
    pub first_cluster: u32,

    /// Location of directory entry
    pub location: EntryLocation,

    /// Directory path at open time
    pub path: String,

    /// Session id, increasing across the lifetime of the table
    pub session: u32,
}

/// Fixed table of open files, at most one session per name
pub struct OpenFileTable {
    slots: [Option<OpenFile>; MAX_OPEN_FILES],
    next_session: u32,
}

impl Default for OpenFileTable {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenFileTable {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            next_session: 1,
        }
    }

    pub fn find(&self, name: &str) -> Option<&OpenFile> {
        self.iter()
            .map(|(_, file)| file)
            .find(|file| file.name.eq_ignore_ascii_case(name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut OpenFile> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|file| file.name.eq_ignore_ascii_case(name))
    }

    pub fn is_open_at(&self, location: EntryLocation) -> bool {
        self.iter().any(|(_, file)| file.location == location)
    }

    /// Claims the first free slot. `session` is overwritten with a fresh id.
    pub fn insert(&mut self, mut file: OpenFile) -> Result<usize, FsError> {
        if self.find(&file.name).is_some() {
            return Err(FsError::AlreadyOpen);
        }
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::TooManyOpenFiles)?;

        file.session = self.next_session;
        self.next_session = self.next_session.wrapping_add(1);
        self.slots[index] = Some(file);
        Ok(index)
    }

    pub fn remove(&mut self, name: &str) -> Result<OpenFile, FsError> {
        self.slots
            .iter_mut()
            .find(|slot| matches!(slot, Some(file) if file.name.eq_ignore_ascii_case(name)))
            .and_then(Option::take)
            .ok_or(FsError::NotOpen)
    }

    /// Occupied slots with their index
    pub fn iter(&self) -> impl Iterator<Item = (usize, &OpenFile)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|file| (index, file)))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(name: &str, index: usize) -> OpenFile {
        OpenFile {
            name: ShortName::from(name).unwrap(),
            mode: AccessMode::ReadWrite,
            offset: 0,
            first_cluster: 3,
            location: EntryLocation { cluster: 2, index },
            path: "disk.img".into(),
            session: 0,
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("-r".parse::<AccessMode>(), Ok(AccessMode::Read));
        assert_eq!("w".parse::<AccessMode>(), Ok(AccessMode::Write));
        assert_eq!("-wr".parse::<AccessMode>(), Ok(AccessMode::ReadWrite));
        assert_eq!("rw".parse::<AccessMode>(), Ok(AccessMode::ReadWrite));
        assert_eq!("-x".parse::<AccessMode>(), Err(FsError::InvalidMode));
        assert_eq!("--r".parse::<AccessMode>(), Err(FsError::InvalidMode));
        assert!(AccessMode::Read.can_read() && !AccessMode::Read.can_write());
        assert_eq!(AccessMode::ReadWrite.to_string(), "-rw");
    }

    #[test]
    fn test_sessions_are_unique_and_monotonic() {
        let mut table = OpenFileTable::new();
        assert_eq!(table.insert(session("A", 0)), Ok(0));
        assert_eq!(table.insert(session("B", 1)), Ok(1));
        assert_eq!(table.insert(session("a", 5)), Err(FsError::AlreadyOpen));

        let first = table.find("A").unwrap().session;
        let second = table.find("b").unwrap().session;
        assert!(second > first);

        table.remove("A").unwrap();
        assert_eq!(table.insert(session("C", 2)), Ok(0));
        assert!(table.find("C").unwrap().session > second);
        assert_eq!(table.remove("A"), Err(FsError::NotOpen));
        assert!(table.is_open_at(EntryLocation { cluster: 2, index: 1 }));
    }

    #[test]
    fn test_table_capacity() {
        let mut table = OpenFileTable::new();
        for i in 0..MAX_OPEN_FILES {
            table.insert(session(&format!("F{}", i), i)).unwrap();
        }
        assert_eq!(table.len(), MAX_OPEN_FILES);
        assert_eq!(
            table.insert(session("EXTRA", 99)),
            Err(FsError::TooManyOpenFiles)
        );
    }
}
