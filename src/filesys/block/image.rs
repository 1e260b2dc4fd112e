//! Block device backed by a disk image file

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind};
use std::os::unix::fs::FileExt;
use std::path::Path;

use log::debug;

use crate::filesys::fat32::VolumeGeometry;
use crate::filesys::{BlockDevice, FsError, MountError};

/// Raw FAT32 image on the host filesystem, addressed in sectors with
/// positional reads and writes.
pub struct ImageFile {
    file: File,

    /// Bytes per sector of the volume in the image
    block_size: usize,

    /// Whole sectors present in the file
    total_blocks: u64,
}

impl ImageFile {
    /// Opens an image read-write and sizes its blocks from the boot sector.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MountError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(MountError::Unreadable)?;

        let mut header = [0u8; 512];
        let header_len = read_header(&file, &mut header).map_err(MountError::Unreadable)?;
        let geometry = VolumeGeometry::parse(&header[..header_len])?;

        let length = file.metadata().map_err(MountError::Unreadable)?.len();
        let block_size = geometry.bytes_per_sector as usize;

        debug!(
            "opened image {} ({} bytes, {}-byte sectors)",
            path.display(),
            length,
            block_size
        );
        Ok(Self {
            file,
            block_size,
            total_blocks: length / block_size as u64,
        })
    }

    fn validate(&self, block_num: u64, len: usize) -> Result<u64, FsError> {
        if len != self.block_size {
            return Err(FsError::IoError(ErrorKind::InvalidInput));
        }
        if block_num >= self.total_blocks {
            return Err(FsError::IoError(ErrorKind::UnexpectedEof));
        }
        Ok(block_num * self.block_size as u64)
    }
}

/// Reads as much of the first sector as the file holds
fn read_header(file: &File, header: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < header.len() {
        match file.read_at(&mut header[filled..], filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl BlockDevice for ImageFile {
    fn read_block(&self, block_num: u64, buf: &mut [u8]) -> Result<(), FsError> {
        let offset = self.validate(block_num, buf.len())?;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    fn write_block(&mut self, block_num: u64, buf: &[u8]) -> Result<(), FsError> {
        let offset = self.validate(block_num, buf.len())?;
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn total_blocks(&self) -> u64 {
        self.total_blocks
    }
}
