//! Archive handle
//!
//! An [`Archive`] carries everything a pack or unpack traversal needs: the
//! open file, the header, the pack options and the single write cursor.
//! Every recursive call receives the handle explicitly.
//!
//! Read-side operations (node lookup and content access) take `&self` and
//! read node records on demand; nothing read from the archive is cached
//! except the root node.

use crate::config::PackOptions;
use crate::error::{IarError, Result};
use crate::header::{align_up, Header, HEADER_SIZE};
use crate::io::ArchiveFile;
use crate::node::{decode_offsets, encode_offsets, Node, NodeKind, NODE_SIZE, OFFSET_SIZE};
use memmap2::{Mmap, MmapOptions};
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};

/// An open IAR archive
#[derive(Debug)]
pub struct Archive {
    file: ArchiveFile,
    header: Header,
    root: Option<Node>,
    options: PackOptions,

    /// Next free offset while packing
    cursor: u64,
}

impl Archive {
    /// Open an archive for reading
    ///
    /// Reads and validates the header, then eagerly reads the root node.
    pub fn open_read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = ArchiveFile::open(path)?;

        let mut bytes = [0u8; HEADER_SIZE as usize];
        file.read_at(0, &mut bytes)?;
        let header = Header::from_bytes(&bytes)?;

        let mut archive = Archive {
            file,
            header,
            root: None,
            options: PackOptions {
                page_bytes: header.page_bytes,
                ..PackOptions::default()
            },
            cursor: 0,
        };
        archive.root = Some(archive.read_node(header.root_node_offset)?);

        info!(
            "Opened archive {:?} (version {}, page size {})",
            archive.path(),
            header.version,
            header.page_bytes
        );

        Ok(archive)
    }

    /// Create an archive for writing with default options
    pub fn open_write<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_write_with(path, PackOptions::default())
    }

    /// Create an archive for writing
    ///
    /// The options are validated before the output file is touched.
    pub fn open_write_with<P: AsRef<Path>>(path: P, options: PackOptions) -> Result<Self> {
        options.validate()?;

        let file = ArchiveFile::create(path)?;

        let mut header = Header::new();
        header.page_bytes = options.page_bytes;

        info!(
            "Created archive {:?} (page size {})",
            file.path(),
            options.page_bytes
        );

        Ok(Archive {
            file,
            header,
            root: None,
            options,
            cursor: HEADER_SIZE,
        })
    }

    /// Close the archive, syncing it to disk if it was opened for writing
    pub fn close(self) -> Result<()> {
        if self.file.is_writable() {
            self.file.sync()?;
        }
        Ok(())
    }

    /// Write the header
    ///
    /// This is the final step of a successful pack. The file is extended to
    /// the write cursor first, so an empty file packed last still has its
    /// aligned content offset inside the archive.
    pub fn write_header(&mut self) -> Result<()> {
        self.file.extend_to(self.cursor)?;
        self.file.write_at(0, &self.header.to_bytes())?;
        self.file.sync()?;

        self.root = Some(self.read_node(self.header.root_node_offset)?);
        debug!(
            "Wrote header (root node at {}, {} bytes total)",
            self.header.root_node_offset, self.cursor
        );
        Ok(())
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn options(&self) -> &PackOptions {
        &self.options
    }

    /// Canonical path of the archive file
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Offset the next write will go to while packing
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// The root node
    ///
    /// Available once the archive has been opened for reading, or once a
    /// packed archive's header has been written.
    pub fn root(&self) -> Result<Node> {
        self.root.ok_or(IarError::EmptyRoot)
    }

    // ---- reading ----

    /// Read the node record stored at `offset`
    pub fn read_node(&self, offset: u64) -> Result<Node> {
        let mut bytes = [0u8; NODE_SIZE as usize];
        self.file.read_at(offset, &mut bytes)?;
        Node::from_bytes(&bytes, offset)
    }

    /// Read a node's name including its terminating zero byte
    pub fn read_name_bytes(&self, node: &Node) -> Result<Vec<u8>> {
        let bytes = self.file.read_vec(node.name_offset, node.name_bytes)?;
        if bytes.last() != Some(&0) {
            return Err(IarError::CorruptName(node.name_offset));
        }
        Ok(bytes)
    }

    /// Read a node's name, lossily decoded for display
    pub fn read_name(&self, node: &Node) -> Result<String> {
        let bytes = self.read_name_bytes(node)?;
        Ok(String::from_utf8_lossy(&bytes[..bytes.len() - 1]).into_owned())
    }

    /// Read a directory's child-offset array
    pub fn read_child_offsets(&self, dir: &Node) -> Result<Vec<u64>> {
        dir.expect_dir()?;

        let offset = dir.node_offsets_offset();
        let len = dir
            .node_count()
            .checked_mul(OFFSET_SIZE)
            .ok_or(IarError::OutOfBounds {
                offset,
                len: u64::MAX,
                size: self.file.len()?,
            })?;

        Ok(decode_offsets(&self.file.read_vec(offset, len)?))
    }

    /// Read every child record of a directory, in stored order
    pub fn children(&self, dir: &Node) -> Result<Vec<Node>> {
        self.read_child_offsets(dir)?
            .into_iter()
            .map(|offset| self.read_node(offset))
            .collect()
    }

    /// Find the child of `parent` called `name`
    ///
    /// Children are compared in stored order, byte for byte, terminator
    /// included. Returns the first match's index and record.
    pub fn find(&self, parent: &Node, name: &str) -> Result<Option<(u64, Node)>> {
        self.find_bytes(parent, name.as_bytes())
    }

    /// Like [`Archive::find`], for names that are not valid UTF-8
    ///
    /// Filesystem entries are stored with their raw OS name bytes.
    pub fn find_bytes(&self, parent: &Node, name: &[u8]) -> Result<Option<(u64, Node)>> {
        let mut wanted = Vec::with_capacity(name.len() + 1);
        wanted.extend_from_slice(name);
        wanted.push(0);

        for (index, offset) in self.read_child_offsets(parent)?.into_iter().enumerate() {
            let child = self.read_node(offset)?;
            if child.name_bytes != wanted.len() as u64 {
                continue;
            }

            if self.read_name_bytes(&child)? == wanted {
                return Ok(Some((index as u64, child)));
            }
        }

        Ok(None)
    }

    /// Resolve a `/`-separated path below the root node
    ///
    /// The root's own name is not part of the path; `""` resolves to the
    /// root itself.
    pub fn resolve(&self, path: &str) -> Result<Option<Node>> {
        let mut current = self.root()?;

        for component in path.split('/').filter(|c| !c.is_empty()) {
            if !current.is_dir() {
                return Ok(None);
            }

            match self.find(&current, component)? {
                Some((_, child)) => current = child,
                None => return Ok(None),
            }
        }

        Ok(Some(current))
    }

    /// Copy a file node's content into `buf`
    ///
    /// Returns the number of bytes copied, which is the node's `data_bytes`.
    pub fn read_content(&self, node: &Node, buf: &mut [u8]) -> Result<usize> {
        node.expect_file()?;

        let needed = node.data_bytes();
        if (buf.len() as u64) < needed {
            return Err(IarError::BufferTooSmall {
                needed,
                got: buf.len() as u64,
            });
        }

        let len = needed as usize;
        self.file.read_at(node.data_offset(), &mut buf[..len])?;
        Ok(len)
    }

    /// Read a file node's content into a new buffer
    pub fn read_content_to_vec(&self, node: &Node) -> Result<Vec<u8>> {
        node.expect_file()?;
        self.file.read_vec(node.data_offset(), node.data_bytes())
    }

    /// Stream a file node's content to `dst` in bounded blocks
    pub fn write_content_to<W: Write>(&self, node: &Node, dst: &mut W) -> Result<()> {
        node.expect_file()?;
        self.file.stream_out(node.data_offset(), node.data_bytes(), dst)
    }

    /// Map a file node's content read-only
    ///
    /// The mapping starts on a page boundary of the archive, so no copy is
    /// needed. The archive must not be modified while the map is alive.
    pub fn map_content(&self, node: &Node) -> Result<Mmap> {
        node.expect_file()?;
        self.file.check_range(node.data_offset(), node.data_bytes())?;

        // SAFETY: read-only private mapping of a range checked above; the
        // handle assumes exclusive ownership of the archive file.
        let mmap = unsafe {
            MmapOptions::new()
                .offset(node.data_offset())
                .len(node.data_bytes() as usize)
                .map(self.file.file())?
        };
        Ok(mmap)
    }

    /// Map a file node's content at a fixed virtual address
    ///
    /// Any existing mapping in `address..address + data_bytes` is replaced.
    /// An empty file maps nothing.
    ///
    /// # Safety
    ///
    /// `address` must be aligned to the system page size, and the caller must
    /// own the target address range; whatever was mapped there before is
    /// discarded. The caller is responsible for unmapping it.
    #[cfg(unix)]
    pub unsafe fn map_content_at(&self, node: &Node, address: *mut libc::c_void) -> Result<()> {
        use std::os::unix::io::AsRawFd;

        node.expect_file()?;

        let page = system_page_size();
        if node.data_offset() % page != 0 {
            return Err(IarError::Misaligned {
                offset: node.data_offset(),
                page,
            });
        }

        self.file.check_range(node.data_offset(), node.data_bytes())?;
        if node.data_bytes() == 0 {
            return Ok(());
        }

        let mapped = libc::mmap(
            address,
            node.data_bytes() as libc::size_t,
            libc::PROT_READ,
            libc::MAP_PRIVATE | libc::MAP_FIXED,
            self.file.file().as_raw_fd(),
            node.data_offset() as libc::off_t,
        );

        if mapped == libc::MAP_FAILED {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(())
    }

    // ---- writing (shared by the filesystem and JSON packers) ----

    /// Reserve a record slot and write the node's name after it
    ///
    /// Returns the slot offset and a record with its name fields filled in.
    /// A name containing a zero byte fails with [`IarError::InvalidName`].
    /// The record itself is written by [`Archive::commit_node`] once the
    /// remaining fields are known.
    pub(crate) fn create_node(&mut self, name: &[u8], kind: NodeKind) -> Result<(u64, Node)> {
        // The terminator has to be the name's only zero byte
        if name.contains(&0) {
            return Err(IarError::InvalidName(
                String::from_utf8_lossy(name).into_owned(),
            ));
        }

        let slot = self.cursor;
        self.cursor += NODE_SIZE;

        let mut node = Node::placeholder(kind);
        self.file.write_at(slot, &node.to_bytes())?;

        let mut name_buf = Vec::with_capacity(name.len() + 1);
        name_buf.extend_from_slice(name);
        name_buf.push(0);

        node.name_bytes = name_buf.len() as u64;
        node.name_offset = self.cursor;
        self.file.write_at(node.name_offset, &name_buf)?;
        self.cursor += node.name_bytes;

        Ok((slot, node))
    }

    /// Stream file content to the next page boundary
    pub(crate) fn stream_content<R: Read>(&mut self, node: &mut Node, src: &mut R) -> Result<()> {
        node.offsets_or_data = align_up(self.cursor, self.header.page_bytes);
        self.cursor = node.offsets_or_data;

        let written = self.file.stream_in(src, self.cursor)?;
        node.count_or_bytes = written;
        self.cursor += written;
        Ok(())
    }

    /// Write a directory's child-offset array at the cursor
    pub(crate) fn write_child_offsets(&mut self, node: &mut Node, offsets: &[u64]) -> Result<()> {
        let bytes = encode_offsets(offsets);

        node.count_or_bytes = offsets.len() as u64;
        node.offsets_or_data = self.cursor;
        self.file.write_at(self.cursor, &bytes)?;
        self.cursor += bytes.len() as u64;
        Ok(())
    }

    /// Rewrite a completed record into its reserved slot
    pub(crate) fn commit_node(&mut self, slot: u64, node: &Node) -> Result<()> {
        self.file.write_at(slot, &node.to_bytes())
    }

    /// Record the packed root and reset read state
    pub(crate) fn set_root_offset(&mut self, offset: u64) {
        self.header.root_node_offset = offset;
        self.root = None;
    }

    /// Start a new pack traversal just past the header
    pub(crate) fn reset_cursor(&mut self) -> Result<()> {
        if !self.file.is_writable() {
            return Err(IarError::ReadOnly);
        }
        self.cursor = HEADER_SIZE;
        Ok(())
    }
}

/// System page size used to validate fixed-address mappings
#[cfg(unix)]
pub fn system_page_size() -> u64 {
    // SAFETY: sysconf has no preconditions
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        4096
    }
}
