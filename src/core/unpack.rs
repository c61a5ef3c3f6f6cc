//! Unpack engine
//!
//! Materializes an archive's tree under a destination directory, depth
//! first from the stored root. The root itself becomes
//! `destination/<root name>`.

use crate::archive::Archive;
use crate::error::{IarError, Result};
use crate::node::{Node, NodeKind};
use std::ffi::OsString;
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, info};

impl Archive {
    /// Unpack the whole archive below `destination`
    ///
    /// `destination` is created if missing. A failure leaves whatever was
    /// already written in place.
    pub fn unpack<P: AsRef<Path>>(&self, destination: P) -> Result<()> {
        let destination = destination.as_ref();
        fs::create_dir_all(destination).map_err(|e| IarError::open(destination, e))?;

        info!("Unpacking {:?} into {:?}", self.path(), destination);
        let mut ancestors = vec![self.header().root_node_offset];
        self.unpack_walk(&self.root()?, destination, &mut ancestors)?;
        info!("Unpacked {:?}", self.path());

        Ok(())
    }

    /// Unpack `node` (and everything below it) into `parent`
    pub fn unpack_node(&self, node: &Node, parent: &Path) -> Result<()> {
        self.unpack_walk(node, parent, &mut Vec::new())
    }

    /// `ancestors` holds the record offsets on the path from the starting
    /// node down to `node`; a child offset found there means the archive
    /// describes a cycle.
    fn unpack_walk(&self, node: &Node, parent: &Path, ancestors: &mut Vec<u64>) -> Result<()> {
        let name = self.read_name_bytes(node)?;
        let path = parent.join(checked_name(&name[..name.len() - 1])?);

        match node.kind {
            NodeKind::File => {
                let mut file = File::create(&path).map_err(|e| IarError::open(&path, e))?;
                self.write_content_to(node, &mut file)?;

                debug!("Unpacked file {:?} ({} bytes)", path, node.data_bytes());
            }

            NodeKind::Directory => {
                let offsets = self.read_child_offsets(node)?;
                fs::create_dir_all(&path).map_err(|e| IarError::open(&path, e))?;

                debug!("Unpacked directory {:?} ({} entries)", path, offsets.len());

                for offset in offsets {
                    if ancestors.contains(&offset) {
                        return Err(IarError::CorruptNode {
                            offset,
                            reason: "directory cycle".to_string(),
                        });
                    }

                    let child = self.read_node(offset)?;
                    ancestors.push(offset);
                    self.unpack_walk(&child, &path, ancestors)?;
                    ancestors.pop();
                }
            }
        }

        Ok(())
    }
}

/// Turn a stored name into a single path component
///
/// Anything that would not stay directly inside the parent directory is
/// rejected.
fn checked_name(name: &[u8]) -> Result<OsString> {
    let unsafe_name = name.is_empty()
        || name == b"."
        || name == b".."
        || name.iter().any(|&b| b == b'/' || b == b'\\' || b == 0);

    if unsafe_name {
        return Err(IarError::UnsafeName(
            String::from_utf8_lossy(name).into_owned(),
        ));
    }

    Ok(os_name(name))
}

#[cfg(unix)]
fn os_name(name: &[u8]) -> OsString {
    use std::os::unix::ffi::OsStrExt;
    std::ffi::OsStr::from_bytes(name).to_os_string()
}

#[cfg(not(unix))]
fn os_name(name: &[u8]) -> OsString {
    OsString::from(String::from_utf8_lossy(name).into_owned())
}
