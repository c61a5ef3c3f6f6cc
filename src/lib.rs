//! # IAR - page-aligned archive format
//!
//! `iar-rs` packs a directory tree (or a JSON-described virtual tree) into a
//! single flat archive and unpacks it again. Every file's content starts on
//! a page boundary, so a stored file can be memory-mapped straight out of
//! the archive without copying.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use iar_rs::{Archive, Result};
//!
//! # fn main() -> Result<()> {
//! // Pack a directory; the header goes in last
//! let mut archive = Archive::open_write("assets.iar")?;
//! archive.pack("assets", None)?;
//! archive.write_header()?;
//! archive.close()?;
//!
//! // Read it back
//! let archive = Archive::open_read("assets.iar")?;
//! archive.unpack("output")?;
//!
//! // Or access single files without extracting
//! if let Some(node) = archive.resolve("textures/wall.png")? {
//!     let map = archive.map_content(&node)?;
//!     println!("{} bytes mapped", map.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Format
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Header (32 bytes, offset 0)                 │
//! │  - magic, version, root node offset,        │
//! │    page size                                │
//! ├─────────────────────────────────────────────┤
//! │ Per entry, in depth-first order:            │
//! │  - node record (40 bytes)                   │
//! │  - name, zero-terminated                    │
//! │  - file: content at the next page boundary  │
//! │  - dir: children, then child-offset array   │
//! └─────────────────────────────────────────────┘
//! ```

// Engine implementation
pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use self::core::{archive, config, error, header, io, json, node, pack, unpack};

pub use crate::core::{
    archive::Archive,
    config::{PackOptions, SymlinkPolicy},
    error::{IarError, Result},
    header::{align_up, Header, DEFAULT_PAGE_BYTES, HEADER_SIZE, MAGIC, VERSION},
    io::BLOCK_SIZE,
    json::PATH_PREFIX,
    node::{Node, NodeKind, NODE_SIZE},
    pack::PackOutcome,
};

use std::path::Path;
use tracing::debug;

/// Builder for archives opened for writing
///
/// # Examples
///
/// ```rust,no_run
/// use iar_rs::{ArchiveBuilder, SymlinkPolicy};
///
/// # fn main() -> iar_rs::Result<()> {
/// let mut archive = ArchiveBuilder::new()
///     .page_bytes(16384)
///     .symlinks(SymlinkPolicy::Follow)
///     .create("out.iar")?;
///
/// archive.pack("data", Some("data"))?;
/// archive.write_header()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ArchiveBuilder {
    options: PackOptions,
}

impl ArchiveBuilder {
    /// Create a new ArchiveBuilder with default settings
    pub fn new() -> Self {
        ArchiveBuilder {
            options: PackOptions::default(),
        }
    }

    /// Start from existing options, e.g. loaded from a TOML file
    pub fn with_options(options: PackOptions) -> Self {
        ArchiveBuilder { options }
    }

    /// Set the content alignment (must be a power of two)
    pub fn page_bytes(mut self, page_bytes: u64) -> Self {
        self.options.page_bytes = page_bytes;
        self
    }

    /// Set how symbolic links are handled while packing
    pub fn symlinks(mut self, policy: SymlinkPolicy) -> Self {
        self.options.symlinks = policy;
        self
    }

    /// Choose whether JSON string leaves get a trailing zero byte
    pub fn json_string_terminator(mut self, enabled: bool) -> Self {
        self.options.json_string_terminator = enabled;
        self
    }

    /// Create the archive file
    pub fn create<P: AsRef<Path>>(self, path: P) -> Result<Archive> {
        debug!("Building archive with {:?}", self.options);
        Archive::open_write_with(path, self.options)
    }
}
