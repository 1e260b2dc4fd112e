use core::fmt;
use std::io;

pub mod block;
pub mod fat32;

/// Why an otherwise valid request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyReason {
    /// The file has an active open-file session.
    FileOpen,
    /// The directory still holds entries besides `.` and `..`.
    DirectoryNotEmpty,
}

// Define error types for the filesystem operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    NotFound,
    AlreadyExists,
    InvalidName,
    /// The directory has no free slot and could not be expanded.
    DirectoryFull,
    NoFreeCluster,
    InvalidMode,
    AlreadyOpen,
    NotOpen,
    NotReadable,
    NotWritable,
    TooManyOpenFiles,
    /// Read attempted at or beyond end of file.
    OffsetOutOfRange,
    Busy(BusyReason),
    NotADirectory,
    IsADirectory,
    PathTooDeep,
    FileTooLarge,
    /// A cluster number outside the data region was about to be addressed.
    InvalidCluster(u32),
    /// A chain link leaves the data region or the chain never terminates.
    CorruptChain { start: u32 },
    IoError(io::ErrorKind),
}

impl FsError {
    /// Errors after which the image must not be touched any further.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FsError::IoError(_) | FsError::CorruptChain { .. } | FsError::InvalidCluster(_)
        )
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::NotFound => write!(f, "no such file or directory"),
            FsError::AlreadyExists => write!(f, "name already exists"),
            FsError::InvalidName => write!(f, "name is not a valid 8.3 name"),
            FsError::DirectoryFull => write!(f, "directory is full and cannot grow"),
            FsError::NoFreeCluster => write!(f, "no free cluster left on the volume"),
            FsError::InvalidMode => write!(f, "invalid mode (expected -r, -w, -rw or -wr)"),
            FsError::AlreadyOpen => write!(f, "file is already open"),
            FsError::NotOpen => write!(f, "file is not open"),
            FsError::NotReadable => write!(f, "file is not open for reading"),
            FsError::NotWritable => write!(f, "file is not open for writing"),
            FsError::TooManyOpenFiles => write!(f, "too many open files"),
            FsError::OffsetOutOfRange => write!(f, "offset is at or beyond end of file"),
            FsError::Busy(BusyReason::FileOpen) => write!(f, "file is currently open"),
            FsError::Busy(BusyReason::DirectoryNotEmpty) => write!(f, "directory is not empty"),
            FsError::NotADirectory => write!(f, "not a directory"),
            FsError::IsADirectory => write!(f, "is a directory"),
            FsError::PathTooDeep => write!(f, "directory nesting too deep"),
            FsError::FileTooLarge => write!(f, "file would exceed the FAT32 size limit"),
            FsError::InvalidCluster(cluster) => write!(f, "invalid cluster number {}", cluster),
            FsError::CorruptChain { start } => {
                write!(f, "corrupt cluster chain starting at cluster {}", start)
            }
            FsError::IoError(kind) => write!(f, "I/O error on image: {}", kind),
        }
    }
}

impl std::error::Error for FsError {}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        FsError::IoError(e.kind())
    }
}

/// Failure to bring a volume online.
#[derive(Debug)]
pub enum MountError {
    /// The image could not be opened or read.
    Unreadable(io::Error),
    /// The image ends before the boot sector fields.
    Truncated,
    /// A boot sector field makes the geometry unusable.
    Malformed(&'static str),
}

impl fmt::Display for MountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountError::Unreadable(e) => write!(f, "cannot read image: {}", e),
            MountError::Truncated => write!(f, "image is too short to hold a boot sector"),
            MountError::Malformed(what) => write!(f, "malformed boot sector: {}", what),
        }
    }
}

impl std::error::Error for MountError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MountError::Unreadable(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FsError> for MountError {
    fn from(e: FsError) -> Self {
        match e {
            FsError::IoError(io::ErrorKind::UnexpectedEof) => MountError::Truncated,
            FsError::IoError(kind) => MountError::Unreadable(io::Error::from(kind)),
            _ => MountError::Malformed("unreadable boot sector"),
        }
    }
}

// Core traits for filesystem abstraction

/// Represents a block device that can be read from and written to
///
/// Blocks are the volume's sectors: `block_size` must equal the boot
/// sector's bytes-per-sector for a volume to mount.
pub trait BlockDevice: Send + Sync {
    fn read_block(&self, block_num: u64, buf: &mut [u8]) -> Result<(), FsError>;
    fn write_block(&mut self, block_num: u64, buf: &[u8]) -> Result<(), FsError>;
    fn block_size(&self) -> usize;
    fn total_blocks(&self) -> u64;
}

/// Lends a device to a volume whose lifetime is shorter than the device's
impl<T: BlockDevice + ?Sized> BlockDevice for &mut T {
    fn read_block(&self, block_num: u64, buf: &mut [u8]) -> Result<(), FsError> {
        (**self).read_block(block_num, buf)
    }

    fn write_block(&mut self, block_num: u64, buf: &[u8]) -> Result<(), FsError> {
        (**self).write_block(block_num, buf)
    }

    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn total_blocks(&self) -> u64 {
        (**self).total_blocks()
    }
}
