//! Disk I/O operations for IAR archives
//!
//! All access goes through absolute offsets. Content moves through a fixed
//! [`BLOCK_SIZE`] buffer, so the size of a packed or unpacked file never
//! dictates how much memory is held at once.

use crate::error::{IarError, Result};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Block size used when streaming content in or out of an archive
pub const BLOCK_SIZE: usize = 0x10000; // 64 KiB

/// Disk-backed archive storage
#[derive(Debug)]
pub struct ArchiveFile {
    file: File,
    path: PathBuf,
    writable: bool,
}

impl ArchiveFile {
    /// Create (or truncate) an archive file for writing
    ///
    /// The stored path is canonicalized once the file exists, so pack can
    /// recognize the archive if it shows up in its own input.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| IarError::open(path, e))?;

        Ok(ArchiveFile {
            file,
            path: path.canonicalize()?,
            writable: true,
        })
    }

    /// Open an existing archive file read-only
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| IarError::open(path, e))?;

        Ok(ArchiveFile {
            file,
            path: path.canonicalize()?,
            writable: false,
        })
    }

    /// Current length of the archive in bytes
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Fail with [`IarError::OutOfBounds`] unless `offset..offset + len` is
    /// inside the archive
    pub fn check_range(&self, offset: u64, len: u64) -> Result<()> {
        let size = self.len()?;
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(()),
            _ => Err(IarError::OutOfBounds { offset, len, size }),
        }
    }

    /// Fill `buf` from `offset`
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.check_range(offset, buf.len() as u64)?;

        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    /// Read `len` bytes at `offset` into a fresh buffer
    pub fn read_vec(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        // Bounds first, so a corrupt length never turns into a huge allocation
        self.check_range(offset, len)?;

        let mut buffer = vec![0u8; len as usize];
        self.read_at(offset, &mut buffer)?;
        Ok(buffer)
    }

    /// Write `data` at `offset`
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.ensure_writable()?;

        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    /// Stream `src` until EOF into the archive starting at `offset`
    ///
    /// Returns the number of bytes written.
    pub fn stream_in<R: Read>(&self, src: &mut R, offset: u64) -> Result<u64> {
        self.ensure_writable()?;

        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;

        let mut block = vec![0u8; BLOCK_SIZE];
        let mut written = 0u64;

        loop {
            let read = match src.read(&mut block) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            file.write_all(&block[..read])?;
            written += read as u64;
        }

        Ok(written)
    }

    /// Stream exactly `len` bytes starting at `offset` out to `dst`
    pub fn stream_out<W: Write>(&self, offset: u64, len: u64, dst: &mut W) -> Result<()> {
        self.check_range(offset, len)?;

        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;

        let mut block = vec![0u8; BLOCK_SIZE.min(len as usize)];
        let mut left = len;

        while left > 0 {
            let chunk = (left as usize).min(BLOCK_SIZE);
            file.read_exact(&mut block[..chunk])?;
            dst.write_all(&block[..chunk])?;
            left -= chunk as u64;
        }

        dst.flush()?;
        Ok(())
    }

    /// Grow the file to at least `len` bytes
    pub fn extend_to(&self, len: u64) -> Result<()> {
        self.ensure_writable()?;

        if self.len()? < len {
            self.file.set_len(len)?;
        }
        Ok(())
    }

    /// Sync all writes to disk
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Canonical path of the archive
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    fn ensure_writable(&self) -> Result<()> {
        if !self.writable {
            return Err(IarError::ReadOnly);
        }
        Ok(())
    }
}
