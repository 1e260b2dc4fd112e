//! Block device backends

pub mod image;
pub mod memory;

pub use image::ImageFile;
pub use memory::MemoryBlockDevice;
