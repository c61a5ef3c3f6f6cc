//! Shared helpers for integration tests

#![allow(dead_code)]

use iar_rs::{Archive, Node};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Relative path -> `None` for directories, `Some(content)` for files
pub type TreeSnapshot = BTreeMap<PathBuf, Option<Vec<u8>>>;

/// Record every entry below `root`
pub fn snapshot(root: &Path) -> TreeSnapshot {
    let mut tree = BTreeMap::new();
    collect(root, Path::new(""), &mut tree);
    tree
}

fn collect(dir: &Path, relative: &Path, tree: &mut TreeSnapshot) {
    for entry in fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        let rel = relative.join(entry.file_name());
        let kind = entry.file_type().unwrap();

        if kind.is_dir() {
            tree.insert(rel.clone(), None);
            collect(&entry.path(), &rel, tree);
        } else {
            tree.insert(rel, Some(fs::read(entry.path()).unwrap()));
        }
    }
}

/// Build a tree on disk from `(relative path, content)` pairs; `None` makes
/// a directory
pub fn build_tree(root: &Path, entries: &[(&str, Option<&[u8]>)]) {
    fs::create_dir_all(root).unwrap();
    for (path, content) in entries {
        let full = root.join(path);
        match content {
            Some(bytes) => {
                fs::create_dir_all(full.parent().unwrap()).unwrap();
                fs::write(full, bytes).unwrap();
            }
            None => fs::create_dir_all(full).unwrap(),
        }
    }
}

/// Pack `source` into `output` with default options and reopen it for reading
pub fn pack_and_reopen(source: &Path, output: &Path) -> Archive {
    let mut archive = Archive::open_write(output).unwrap();
    archive.pack(source, None).unwrap();
    archive.write_header().unwrap();
    archive.close().unwrap();

    Archive::open_read(output).unwrap()
}

/// Every file node in the archive, depth first
pub fn file_nodes(archive: &Archive) -> Vec<Node> {
    let mut files = Vec::new();
    let mut pending = vec![archive.root().unwrap()];

    while let Some(node) = pending.pop() {
        if node.is_dir() {
            pending.extend(archive.children(&node).unwrap());
        } else {
            files.push(node);
        }
    }
    files
}
