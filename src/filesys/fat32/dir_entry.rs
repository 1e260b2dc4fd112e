//! FAT32 directory entry structure and 8.3 name handling

use arrayvec::ArrayString;
use bitflags::bitflags;
use bytes::{Buf, BufMut};

use super::constants::*;

/// Display form of an 8.3 name, at most `BASENAME.EXT`
pub type ShortName = ArrayString<12>;

bitflags! {
    /// Attribute byte of a directory entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
        /// Long file name fragment marker
        const LONG_NAME = Self::READ_ONLY.bits()
            | Self::HIDDEN.bits()
            | Self::SYSTEM.bits()
            | Self::VOLUME_ID.bits();
    }
}

/// 8.3 format directory entry (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry83 {
    /// Space padded base name (8) and extension (3)
    pub name: [u8; SHORT_NAME_LENGTH],

    /// File attributes (read-only, directory, etc)
    pub attributes: Attributes,

    /// Creation time and access date, not maintained
    pub reserved: [u8; 8],

    /// High 16 bits of the first cluster
    pub cluster_high: u16,

    /// Modification time
    pub time: u16,

    /// Modification date
    pub date: u16,

    /// Low 16 bits of the first cluster
    pub cluster_low: u16,

    /// File size in bytes
    pub file_size: u32,
}

impl DirEntry83 {
    fn with_name(name: [u8; SHORT_NAME_LENGTH], attributes: Attributes, first_cluster: u32) -> Self {
        let mut entry = Self {
            name,
            attributes,
            reserved: [0; 8],
            cluster_high: 0,
            time: 0,
            date: 0,
            cluster_low: 0,
            file_size: 0,
        };
        entry.set_first_cluster(first_cluster);
        entry
    }

    /// Creates a new, empty file entry
    pub fn new_file(name: &str, first_cluster: u32) -> Self {
        Self::with_name(encode_name(name), Attributes::ARCHIVE, first_cluster)
    }

    /// Creates a new directory entry with given name and starting cluster
    pub fn new_directory(name: &str, first_cluster: u32) -> Self {
        Self::with_name(encode_name(name), Attributes::DIRECTORY, first_cluster)
    }

    /// The `.` entry of a directory starting at `cluster`
    pub fn dot(cluster: u32) -> Self {
        Self::with_name(DOT_NAME, Attributes::DIRECTORY, cluster)
    }

    /// The `..` entry pointing at `parent`
    pub fn dot_dot(parent: u32) -> Self {
        Self::with_name(DOT_DOT_NAME, Attributes::DIRECTORY, parent)
    }

    pub fn decode(raw: &[u8; DIR_ENTRY_SIZE]) -> Self {
        let mut buf = &raw[..];

        let mut name = [0u8; SHORT_NAME_LENGTH];
        buf.copy_to_slice(&mut name);
        let attributes = Attributes::from_bits_retain(buf.get_u8());
        let mut reserved = [0u8; 8];
        buf.copy_to_slice(&mut reserved);

        Self {
            name,
            attributes,
            reserved,
            cluster_high: buf.get_u16_le(),
            time: buf.get_u16_le(),
            date: buf.get_u16_le(),
            cluster_low: buf.get_u16_le(),
            file_size: buf.get_u32_le(),
        }
    }

    pub fn encode(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        let mut buf = &mut raw[..];

        buf.put_slice(&self.name);
        buf.put_u8(self.attributes.bits());
        buf.put_slice(&self.reserved);
        buf.put_u16_le(self.cluster_high);
        buf.put_u16_le(self.time);
        buf.put_u16_le(self.date);
        buf.put_u16_le(self.cluster_low);
        buf.put_u32_le(self.file_size);

        raw
    }

    pub fn first_cluster(&self) -> u32 {
        ((self.cluster_high as u32) << 16) | self.cluster_low as u32
    }

    pub fn set_first_cluster(&mut self, cluster: u32) {
        self.cluster_high = (cluster >> 16) as u16;
        self.cluster_low = cluster as u16;
    }

    /// Returns true if this slot ends the directory
    pub fn is_end_marker(&self) -> bool {
        self.name[0] == END_OF_DIRECTORY_MARKER
    }

    /// Returns true if entry is marked as deleted
    pub fn is_deleted(&self) -> bool {
        self.name[0] == DELETED_ENTRY_MARKER
    }

    pub fn is_long_name(&self) -> bool {
        self.attributes.bits() & 0x3F == Attributes::LONG_NAME.bits()
    }

    pub fn is_volume_label(&self) -> bool {
        !self.is_long_name() && self.attributes.contains(Attributes::VOLUME_ID)
    }

    /// Returns true if entry is a directory
    pub fn is_directory(&self) -> bool {
        self.attributes.contains(Attributes::DIRECTORY)
    }

    /// Returns true for the `.` and `..` entries
    pub fn is_dot_entry(&self) -> bool {
        self.name == DOT_NAME || self.name == DOT_DOT_NAME
    }

    /// Case-insensitive comparison against an encoded 8.3 name
    pub fn matches(&self, encoded: &[u8; SHORT_NAME_LENGTH]) -> bool {
        self.name.eq_ignore_ascii_case(encoded)
    }

    /// Returns the filename, including extension if present
    pub fn display_name(&self) -> ShortName {
        decode_name(&self.name)
    }
}

/// Encodes a user supplied name into the space padded on-disk form.
///
/// The name is split on its first `.`, uppercased, and each part is
/// truncated to fit. `.` and `..` map to their directory entry forms.
pub fn encode_name(name: &str) -> [u8; SHORT_NAME_LENGTH] {
    match name {
        "." => return DOT_NAME,
        ".." => return DOT_DOT_NAME,
        _ => {}
    }

    let (base, extension) = name.split_once('.').unwrap_or((name, ""));
    let mut encoded = [b' '; SHORT_NAME_LENGTH];

    for (slot, byte) in encoded[..MAX_FILENAME_LENGTH].iter_mut().zip(base.bytes()) {
        *slot = byte.to_ascii_uppercase();
    }
    for (slot, byte) in encoded[MAX_FILENAME_LENGTH..].iter_mut().zip(extension.bytes()) {
        *slot = byte.to_ascii_uppercase();
    }
    encoded
}

/// Turns an on-disk name back into `BASE.EXT` form. Bytes outside
/// printable ASCII are shown as `?`.
pub fn decode_name(raw: &[u8; SHORT_NAME_LENGTH]) -> ShortName {
    fn trimmed(part: &[u8]) -> &[u8] {
        let end = part.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
        &part[..end]
    }

    let base = trimmed(&raw[..MAX_FILENAME_LENGTH]);
    let extension = trimmed(&raw[MAX_FILENAME_LENGTH..]);

    let printable = |b: u8| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' };

    let mut name = ShortName::new();
    for &b in base {
        let _ = name.try_push(printable(b));
    }
    if !extension.is_empty() {
        let _ = name.try_push('.');
        for &b in extension {
            let _ = name.try_push(printable(b));
        }
    }
    name
}

/// Checks a name against the 8.3 rules this driver creates entries with:
/// a 1-8 character base, an optional `.` followed by 1-3 characters, and
/// only ASCII letters, digits and `_`.
pub fn is_valid_83_name(name: &str) -> bool {
    let valid_part = |part: &str, max: usize| {
        !part.is_empty()
            && part.len() <= max
            && part.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
    };

    match name.split_once('.') {
        Some((base, extension)) => {
            valid_part(base, MAX_FILENAME_LENGTH) && valid_part(extension, MAX_EXTENSION_LENGTH)
        }
        None => valid_part(name, MAX_FILENAME_LENGTH),
    }
}

/// Whether `name` can denote an existing short entry: a non-empty base of
/// at most 8 bytes and an extension of at most 3. Any byte is allowed, so
/// aliases such as `PROGRA~1.TXT` written by other tools stay reachable.
pub fn fits_83_name(name: &str) -> bool {
    let (base, extension) = name.split_once('.').unwrap_or((name, ""));
    !base.is_empty()
        && base.len() <= MAX_FILENAME_LENGTH
        && extension.len() <= MAX_EXTENSION_LENGTH
        && !extension.contains('.')
}
