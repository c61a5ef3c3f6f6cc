//! Filesystem pack engine
//!
//! Walks a directory tree depth-first. Each entry gets a record slot
//! reserved at the write cursor, its name written right after, then either
//! its page-aligned content (files) or its children followed by the
//! child-offset array (directories). The slot is rewritten once the record
//! is complete.

use crate::archive::Archive;
use crate::config::SymlinkPolicy;
use crate::error::{IarError, Result};
use crate::node::{Node, NodeKind};
use std::ffi::OsStr;
use std::fs::{self, File, Metadata};
use std::path::Path;
use tracing::{debug, info, warn};

/// Outcome of packing one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackOutcome {
    /// The entry's record lives at this offset
    Packed(u64),
    /// The entry is left out of its parent; not an error
    Skipped,
}

impl Archive {
    /// Pack a file or directory tree and return the root node's offset
    ///
    /// Without an explicit `name`, the root is named after the last
    /// component of the canonical source path. The header is not written;
    /// call [`Archive::write_header`] once this succeeds.
    pub fn pack<P: AsRef<Path>>(&mut self, source: P, name: Option<&str>) -> Result<u64> {
        self.reset_cursor()?;

        let source = source.as_ref();
        let name = match name {
            Some(name) => name.as_bytes().to_vec(),
            None => default_name(source)?,
        };

        // The root is packed even when it is a symlink: it was named explicitly
        let metadata = fs::metadata(source).map_err(|e| IarError::open(source, e))?;

        info!("Packing {:?} into {:?}", source, self.path());

        match self.pack_walk(source, &name, &metadata)? {
            PackOutcome::Packed(offset) => {
                self.set_root_offset(offset);
                info!("Packed {:?} ({} bytes)", source, self.cursor());
                Ok(offset)
            }
            PackOutcome::Skipped => Err(IarError::EmptyRoot),
        }
    }

    /// Pack a directory entry found during enumeration, applying the
    /// symlink policy
    fn pack_entry(&mut self, path: &Path, name: &[u8]) -> Result<PackOutcome> {
        let metadata = fs::symlink_metadata(path).map_err(|e| IarError::open(path, e))?;

        if !metadata.file_type().is_symlink() {
            return self.pack_walk(path, name, &metadata);
        }

        match self.options().symlinks {
            SymlinkPolicy::Skip => {
                warn!("Skipping symbolic link {:?}", path);
                Ok(PackOutcome::Skipped)
            }
            SymlinkPolicy::Error => Err(IarError::SymlinkRejected(path.to_path_buf())),
            SymlinkPolicy::Follow => {
                let target = fs::metadata(path).map_err(|e| IarError::open(path, e))?;
                self.pack_walk(path, name, &target)
            }
        }
    }

    fn pack_walk(&mut self, path: &Path, name: &[u8], metadata: &Metadata) -> Result<PackOutcome> {
        // The output may live inside the input; never pack the archive into itself
        let canonical = path.canonicalize().map_err(|e| IarError::open(path, e))?;
        if canonical.as_path() == self.path() {
            debug!("Skipping the archive itself at {:?}", path);
            return Ok(PackOutcome::Skipped);
        }

        if metadata.is_file() {
            let (slot, mut node) = self.create_node(name, NodeKind::File)?;
            self.pack_file_content(&mut node, path)?;
            self.commit_node(slot, &node)?;

            debug!("Found file at {:?} ({} bytes)", path, node.data_bytes());
            return Ok(PackOutcome::Packed(slot));
        }

        if !metadata.is_dir() {
            warn!("Skipping {:?}: not a regular file or directory", path);
            return Ok(PackOutcome::Skipped);
        }

        debug!("Found directory at {:?}", path);

        let entries = fs::read_dir(path).map_err(|e| IarError::open(path, e))?;
        let (slot, mut node) = self.create_node(name, NodeKind::Directory)?;

        let mut child_offsets = Vec::new();
        for entry in entries {
            let entry = entry?;
            let child_name = os_name_bytes(&entry.file_name());

            match self.pack_entry(&entry.path(), &child_name)? {
                PackOutcome::Packed(offset) => child_offsets.push(offset),
                PackOutcome::Skipped => continue,
            }
        }

        self.write_child_offsets(&mut node, &child_offsets)?;
        self.commit_node(slot, &node)?;

        Ok(PackOutcome::Packed(slot))
    }

    /// Stream the content of the file at `path` into `node`
    pub(crate) fn pack_file_content(&mut self, node: &mut Node, path: &Path) -> Result<()> {
        let mut file = File::open(path).map_err(|e| IarError::open(path, e))?;
        self.stream_content(node, &mut file)
    }
}

/// Name used for a root packed without an explicit one
pub(crate) fn default_name(source: &Path) -> Result<Vec<u8>> {
    let canonical = source
        .canonicalize()
        .map_err(|e| IarError::open(source, e))?;

    canonical
        .file_name()
        .map(os_name_bytes)
        .ok_or(IarError::InvalidPath)
}

#[cfg(unix)]
pub(crate) fn os_name_bytes(name: &OsStr) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    name.as_bytes().to_vec()
}

#[cfg(not(unix))]
pub(crate) fn os_name_bytes(name: &OsStr) -> Vec<u8> {
    name.to_string_lossy().into_owned().into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PackOptions;
    use crate::header::HEADER_SIZE;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn child_map(archive: &Archive, dir: &Node) -> HashMap<String, Node> {
        archive
            .children(dir)
            .unwrap()
            .into_iter()
            .map(|n| (archive.read_name(&n).unwrap(), n))
            .collect()
    }

    fn scenario_tree(temp: &TempDir) -> std::path::PathBuf {
        let root = temp.path().join("root");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("a.txt"), "hi").unwrap();
        fs::write(root.join("sub").join("b.txt"), "bye").unwrap();
        root
    }

    #[test]
    fn test_scenario_layout() {
        let temp = TempDir::new().unwrap();
        let source = scenario_tree(&temp);

        let mut archive = Archive::open_write(temp.path().join("out.iar")).unwrap();
        let root_offset = archive.pack(&source, None).unwrap();
        archive.write_header().unwrap();

        // Root slot comes first, right after the header
        assert_eq!(root_offset, HEADER_SIZE);
        assert_eq!(archive.header().root_node_offset, root_offset);

        let root = archive.root().unwrap();
        assert!(root.is_dir());
        assert_eq!(root.node_count(), 2);
        assert_eq!(archive.read_name(&root).unwrap(), "root");

        let children = child_map(&archive, &root);
        let a = children["a.txt"];
        assert!(!a.is_dir());
        assert_eq!(a.data_bytes(), 2);
        assert_eq!(a.data_offset() % 4096, 0);

        let sub = children["sub"];
        assert!(sub.is_dir());
        assert_eq!(sub.node_count(), 1);

        let b = archive.find(&sub, "b.txt").unwrap().unwrap().1;
        assert_eq!(b.data_bytes(), 3);
        assert_eq!(archive.read_content_to_vec(&b).unwrap(), b"bye");
    }

    #[test]
    fn test_name_layout_follows_slot() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("single.bin");
        fs::write(&file, vec![7u8; 10]).unwrap();

        let mut archive = Archive::open_write(temp.path().join("out.iar")).unwrap();
        archive.pack(&file, Some("renamed")).unwrap();
        archive.write_header().unwrap();

        let root = archive.root().unwrap();
        assert_eq!(root.name_offset, HEADER_SIZE + 40);
        assert_eq!(root.name_bytes, "renamed".len() as u64 + 1);
        assert_eq!(archive.read_name(&root).unwrap(), "renamed");
        assert_eq!(root.data_offset(), 4096);
        assert_eq!(archive.read_content_to_vec(&root).unwrap(), vec![7u8; 10]);
    }

    #[test]
    fn test_custom_page_size_alignment() {
        let temp = TempDir::new().unwrap();
        let source = scenario_tree(&temp);

        let options = PackOptions {
            page_bytes: 64,
            ..PackOptions::default()
        };
        let mut archive = Archive::open_write_with(temp.path().join("out.iar"), options).unwrap();
        archive.pack(&source, None).unwrap();
        archive.write_header().unwrap();

        assert_eq!(archive.header().page_bytes, 64);
        let b = archive.resolve("sub/b.txt").unwrap().unwrap();
        assert_eq!(b.data_offset() % 64, 0);
    }

    #[test]
    fn test_invalid_page_size_rejected_before_create() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("out.iar");
        let options = PackOptions {
            page_bytes: 1000,
            ..PackOptions::default()
        };

        assert!(matches!(
            Archive::open_write_with(&output, options),
            Err(IarError::InvalidPageBytes(1000))
        ));
        assert!(!output.exists());
    }

    #[test]
    fn test_archive_inside_source_is_skipped() {
        let temp = TempDir::new().unwrap();
        let source = scenario_tree(&temp);

        let mut archive = Archive::open_write(source.join("out.iar")).unwrap();
        archive.pack(&source, None).unwrap();
        archive.write_header().unwrap();

        let root = archive.root().unwrap();
        assert_eq!(root.node_count(), 2);
        assert!(archive.find(&root, "out.iar").unwrap().is_none());
    }

    #[test]
    fn test_packing_only_the_archive_is_empty_root() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("out.iar");

        let mut archive = Archive::open_write(&output).unwrap();
        assert!(matches!(
            archive.pack(&output, None),
            Err(IarError::EmptyRoot)
        ));
    }

    #[test]
    fn test_empty_directory_and_trailing_empty_file() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        fs::create_dir_all(source.join("empty")).unwrap();

        let mut archive = Archive::open_write(temp.path().join("out.iar")).unwrap();
        archive.pack(&source.join("empty"), None).unwrap();
        archive.write_header().unwrap();
        assert_eq!(archive.root().unwrap().node_count(), 0);
        assert!(archive.children(&archive.root().unwrap()).unwrap().is_empty());

        let empty_file = temp.path().join("nothing");
        fs::write(&empty_file, b"").unwrap();

        let mut archive = Archive::open_write(temp.path().join("out2.iar")).unwrap();
        archive.pack(&empty_file, None).unwrap();
        archive.write_header().unwrap();

        let root = archive.root().unwrap();
        assert_eq!(root.data_bytes(), 0);
        assert!(archive.read_content_to_vec(&root).unwrap().is_empty());
        let len = fs::metadata(temp.path().join("out2.iar")).unwrap().len();
        assert!(len >= root.data_offset());
    }

    #[test]
    fn test_root_name_with_zero_byte_rejected() {
        let temp = TempDir::new().unwrap();
        let source = scenario_tree(&temp);
        let mut archive = Archive::open_write(temp.path().join("out.iar")).unwrap();

        assert!(matches!(
            archive.pack(&source, Some("a\0b")),
            Err(IarError::InvalidName(_))
        ));
    }

    #[test]
    fn test_missing_source_fails() {
        let temp = TempDir::new().unwrap();
        let mut archive = Archive::open_write(temp.path().join("out.iar")).unwrap();

        assert!(matches!(
            archive.pack(temp.path().join("missing"), None),
            Err(IarError::Open { .. })
        ));
    }

    #[test]
    fn test_default_name_uses_last_component() {
        let temp = TempDir::new().unwrap();
        let source = scenario_tree(&temp);

        assert_eq!(default_name(&source.join("sub").join("..")).unwrap(), b"root");
        assert!(matches!(
            default_name(Path::new("/")),
            Err(IarError::InvalidPath)
        ));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::symlink;

        fn tree_with_link(temp: &TempDir) -> std::path::PathBuf {
            let source = scenario_tree(temp);
            symlink(source.join("a.txt"), source.join("link.txt")).unwrap();
            source
        }

        fn pack_with(temp: &TempDir, policy: SymlinkPolicy) -> Result<Archive> {
            let source = tree_with_link(temp);
            let options = PackOptions {
                symlinks: policy,
                ..PackOptions::default()
            };
            let mut archive = Archive::open_write_with(temp.path().join("out.iar"), options)?;
            archive.pack(&source, None)?;
            archive.write_header()?;
            Ok(archive)
        }

        #[test]
        fn test_symlink_skipped_by_default() {
            let temp = TempDir::new().unwrap();
            let archive = pack_with(&temp, SymlinkPolicy::Skip).unwrap();
            let root = archive.root().unwrap();

            assert_eq!(root.node_count(), 2);
            assert!(archive.find(&root, "link.txt").unwrap().is_none());
        }

        #[test]
        fn test_symlink_followed() {
            let temp = TempDir::new().unwrap();
            let archive = pack_with(&temp, SymlinkPolicy::Follow).unwrap();

            let link = archive.resolve("link.txt").unwrap().unwrap();
            assert_eq!(archive.read_content_to_vec(&link).unwrap(), b"hi");
        }

        #[test]
        fn test_symlink_rejected() {
            let temp = TempDir::new().unwrap();
            assert!(matches!(
                pack_with(&temp, SymlinkPolicy::Error),
                Err(IarError::SymlinkRejected(_))
            ));
        }

        // Linux filesystems accept arbitrary bytes in names
        #[cfg(target_os = "linux")]
        #[test]
        fn test_non_utf8_name_found_by_bytes() {
            use std::os::unix::ffi::OsStrExt;

            let temp = TempDir::new().unwrap();
            let source = scenario_tree(&temp);
            let name = OsStr::from_bytes(b"caf\xe9.txt");
            fs::write(source.join(name), b"latin-1").unwrap();

            let mut archive = Archive::open_write(temp.path().join("out.iar")).unwrap();
            archive.pack(&source, None).unwrap();
            archive.write_header().unwrap();

            let root = archive.root().unwrap();
            let (_, node) = archive.find_bytes(&root, b"caf\xe9.txt").unwrap().unwrap();
            assert_eq!(archive.read_name_bytes(&node).unwrap(), b"caf\xe9.txt\0");
            assert_eq!(archive.read_content_to_vec(&node).unwrap(), b"latin-1");

            let dest = temp.path().join("dest");
            archive.unpack(&dest).unwrap();
            assert_eq!(fs::read(dest.join("root").join(name)).unwrap(), b"latin-1");
        }

        #[test]
        fn test_fifo_skipped() {
            let temp = TempDir::new().unwrap();
            let source = scenario_tree(&temp);

            let fifo = std::ffi::CString::new(
                source.join("pipe").to_str().unwrap(),
            )
            .unwrap();
            assert_eq!(unsafe { libc::mkfifo(fifo.as_ptr(), 0o644) }, 0);

            let mut archive = Archive::open_write(temp.path().join("out.iar")).unwrap();
            archive.pack(&source, None).unwrap();
            archive.write_header().unwrap();

            let root = archive.root().unwrap();
            assert_eq!(root.node_count(), 2);
            assert!(archive.find(&root, "pipe").unwrap().is_none());
        }
    }
}
