//! In-memory block device implementation

use std::io::ErrorKind;

use crate::filesys::{BlockDevice, FsError};

/// Block device that stores data in memory
pub struct MemoryBlockDevice {
    /// Blocks of data, each block_size bytes
    blocks: Vec<Vec<u8>>,

    /// Size of each block in bytes
    block_size: usize,
}

impl MemoryBlockDevice {
    /// Creates a new zero-filled memory block device with given size
    pub fn new(total_blocks: u64, block_size: usize) -> Self {
        let blocks = (0..total_blocks).map(|_| vec![0; block_size]).collect();
        Self { blocks, block_size }
    }

    /// Wraps a raw image. A trailing partial block is zero padded.
    pub fn from_bytes(image: &[u8], block_size: usize) -> Self {
        let blocks = image
            .chunks(block_size)
            .map(|chunk| {
                let mut block = vec![0; block_size];
                block[..chunk.len()].copy_from_slice(chunk);
                block
            })
            .collect();
        Self { blocks, block_size }
    }

    /// Returns the device contents as one contiguous image
    pub fn to_bytes(&self) -> Vec<u8> {
        self.blocks.concat()
    }

    /// Validates block number is within bounds
    fn validate_block(&self, block_num: u64) -> Result<(), FsError> {
        if block_num >= self.blocks.len() as u64 {
            return Err(FsError::IoError(ErrorKind::UnexpectedEof));
        }
        Ok(())
    }

    /// Validates buffer is correct block size
    fn validate_buffer(&self, buf: &[u8]) -> Result<(), FsError> {
        if buf.len() != self.block_size {
            return Err(FsError::IoError(ErrorKind::InvalidInput));
        }
        Ok(())
    }
}

impl BlockDevice for MemoryBlockDevice {
    /// Reads block into buffer
    fn read_block(&self, block_num: u64, buf: &mut [u8]) -> Result<(), FsError> {
        self.validate_block(block_num)?;
        self.validate_buffer(buf)?;
        buf.copy_from_slice(&self.blocks[block_num as usize]);
        Ok(())
    }

    /// Writes buffer to block
    fn write_block(&mut self, block_num: u64, buf: &[u8]) -> Result<(), FsError> {
        self.validate_block(block_num)?;
        self.validate_buffer(buf)?;
        self.blocks[block_num as usize].copy_from_slice(buf);
        Ok(())
    }

    /// Returns size of each block
    fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns total number of blocks
    fn total_blocks(&self) -> u64 {
        self.blocks.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_out_of_range_and_misized_buffers() {
        let mut dev = MemoryBlockDevice::new(4, 512);
        let mut buf = vec![0u8; 512];
        assert_eq!(
            dev.read_block(4, &mut buf),
            Err(FsError::IoError(ErrorKind::UnexpectedEof))
        );
        assert_eq!(
            dev.write_block(0, &buf[..100]),
            Err(FsError::IoError(ErrorKind::InvalidInput))
        );
    }

    #[test]
    fn test_from_bytes_pads_last_block() {
        let image = vec![0xAB; 700];
        let dev = MemoryBlockDevice::from_bytes(&image, 512);
        assert_eq!(dev.total_blocks(), 2);

        let mut buf = vec![0u8; 512];
        dev.read_block(1, &mut buf).unwrap();
        assert!(buf[..188].iter().all(|&b| b == 0xAB));
        assert!(buf[188..].iter().all(|&b| b == 0));
        assert_eq!(&dev.to_bytes()[..700], &image[..]);
    }
}
