use crate::error::{IarError, Result};

pub const MAGIC: u64 = 0x1A4C_1A4C_1A4C_1A4C;

/// Latest format version this implementation can read and the one it writes
pub const VERSION: u64 = 1;

pub const DEFAULT_PAGE_BYTES: u64 = 4096;

/// On-disk size of [`Header`]
pub const HEADER_SIZE: u64 = 32;

/// IAR archive header
///
/// Lives at absolute offset 0. It is the last thing written when packing,
/// since the root node's offset is only known once the whole tree is on disk.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Magic number: 0x1A4C1A4C1A4C1A4C
    pub magic: u64,

    /// Format version the archive was written with
    pub version: u64,

    /// Absolute offset of the root node record
    pub root_node_offset: u64,

    /// Alignment granularity for file content regions
    pub page_bytes: u64,
}

impl Header {
    /// Create a new header with default values
    pub fn new() -> Self {
        Header {
            magic: MAGIC,
            version: VERSION,
            root_node_offset: 0,
            page_bytes: DEFAULT_PAGE_BYTES,
        }
    }

    /// Validate the header magic, version and page size
    ///
    /// The checks run in that order, so a foreign file is reported as such
    /// before anything else about it is looked at.
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(IarError::InvalidMagic(self.magic));
        }

        if self.version > VERSION {
            return Err(IarError::UnsupportedVersion {
                found: self.version,
                supported: VERSION,
            });
        }

        validate_page_bytes(self.page_bytes)
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let mut bytes = [0u8; HEADER_SIZE as usize];

        bytes[0..8].copy_from_slice(&self.magic.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.version.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.root_node_offset.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.page_bytes.to_le_bytes());

        bytes
    }

    /// Deserialize header from bytes and validate it
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE as usize {
            return Err(IarError::OutOfBounds {
                offset: 0,
                len: HEADER_SIZE,
                size: bytes.len() as u64,
            });
        }

        let header = Header {
            magic: read_u64(bytes, 0),
            version: read_u64(bytes, 8),
            root_node_offset: read_u64(bytes, 16),
            page_bytes: read_u64(bytes, 24),
        };

        header.validate()?;

        Ok(header)
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a little-endian u64 at `at`; caller guarantees the bounds
pub(crate) fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(word)
}

/// Check that `page_bytes` is usable as an alignment mask
pub fn validate_page_bytes(page_bytes: u64) -> Result<()> {
    if page_bytes == 0 || !page_bytes.is_power_of_two() {
        return Err(IarError::InvalidPageBytes(page_bytes));
    }
    Ok(())
}

/// Round `offset` up to the *next* multiple of `page_bytes`
///
/// An offset that is already aligned still moves forward a full page, so
/// content never starts right where its node's name ended.
pub fn align_up(offset: u64, page_bytes: u64) -> u64 {
    (offset & !(page_bytes - 1)) + page_bytes
}
