//! Node records
//!
//! Every file or directory in an archive is described by one fixed-size
//! record. The last two words are shared between the two kinds: a directory
//! stores its child count and the offset of its child-offset array there,
//! a file stores its content length and content offset.

use crate::error::{IarError, Result};
use crate::header::read_u64;

/// On-disk size of a [`Node`] record
pub const NODE_SIZE: u64 = 40;

/// On-disk size of one entry in a directory's child-offset array
pub const OFFSET_SIZE: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    fn to_word(self) -> u64 {
        match self {
            NodeKind::File => 0,
            NodeKind::Directory => 1,
        }
    }
}

/// A node record as stored in the archive
///
/// Nodes read from an archive are plain values; nothing refers back to the
/// archive they came from, and nothing is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,

    /// Name length including the terminating zero byte
    pub name_bytes: u64,

    /// Absolute offset of the name
    pub name_offset: u64,

    /// Child count (directory) or content length (file)
    pub count_or_bytes: u64,

    /// Child-offset array offset (directory) or content offset (file)
    pub offsets_or_data: u64,
}

impl Node {
    /// Placeholder record written into a reserved slot before the node's
    /// final fields are known
    pub fn placeholder(kind: NodeKind) -> Self {
        Node {
            kind,
            name_bytes: 0,
            name_offset: 0,
            count_or_bytes: 0,
            offsets_or_data: 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Number of children; zero for files
    pub fn node_count(&self) -> u64 {
        if self.is_dir() {
            self.count_or_bytes
        } else {
            0
        }
    }

    pub fn node_offsets_offset(&self) -> u64 {
        self.offsets_or_data
    }

    /// Content length; zero for directories
    pub fn data_bytes(&self) -> u64 {
        if self.is_dir() {
            0
        } else {
            self.count_or_bytes
        }
    }

    pub fn data_offset(&self) -> u64 {
        self.offsets_or_data
    }

    /// Fail with [`IarError::InvalidNodeKind`] unless this is a file
    pub fn expect_file(&self) -> Result<()> {
        if self.is_dir() {
            return Err(IarError::InvalidNodeKind { expected: "file" });
        }
        Ok(())
    }

    /// Fail with [`IarError::InvalidNodeKind`] unless this is a directory
    pub fn expect_dir(&self) -> Result<()> {
        if !self.is_dir() {
            return Err(IarError::InvalidNodeKind {
                expected: "directory",
            });
        }
        Ok(())
    }

    /// Serialize node to bytes
    pub fn to_bytes(&self) -> [u8; NODE_SIZE as usize] {
        let mut bytes = [0u8; NODE_SIZE as usize];

        bytes[0..8].copy_from_slice(&self.kind.to_word().to_le_bytes());
        bytes[8..16].copy_from_slice(&self.name_bytes.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.name_offset.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.count_or_bytes.to_le_bytes());
        bytes[32..40].copy_from_slice(&self.offsets_or_data.to_le_bytes());

        bytes
    }

    /// Deserialize the node stored at `offset`
    ///
    /// `offset` is only used for error reporting.
    pub fn from_bytes(bytes: &[u8], offset: u64) -> Result<Self> {
        if bytes.len() < NODE_SIZE as usize {
            return Err(IarError::CorruptNode {
                offset,
                reason: format!("record truncated to {} bytes", bytes.len()),
            });
        }

        let kind = match read_u64(bytes, 0) {
            0 => NodeKind::File,
            1 => NodeKind::Directory,
            other => {
                return Err(IarError::CorruptNode {
                    offset,
                    reason: format!("is_dir flag is {}", other),
                })
            }
        };

        let name_bytes = read_u64(bytes, 8);
        if name_bytes == 0 {
            return Err(IarError::CorruptNode {
                offset,
                reason: "name length is zero".to_string(),
            });
        }

        Ok(Node {
            kind,
            name_bytes,
            name_offset: read_u64(bytes, 16),
            count_or_bytes: read_u64(bytes, 24),
            offsets_or_data: read_u64(bytes, 32),
        })
    }
}

/// Encode a directory's child offsets as the on-disk array
pub fn encode_offsets(offsets: &[u64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(offsets.len() * OFFSET_SIZE as usize);
    for offset in offsets {
        bytes.extend_from_slice(&offset.to_le_bytes());
    }
    bytes
}

/// Decode an on-disk child-offset array
pub fn decode_offsets(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(OFFSET_SIZE as usize)
        .map(|chunk| read_u64(chunk, 0))
        .collect()
}
