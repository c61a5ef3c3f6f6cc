//! JSON tree adapter
//!
//! Packs a parsed JSON document as a virtual tree: objects become
//! directories (members in document order, named by key) and strings become
//! files. A string starting with [`PATH_PREFIX`] names a file on disk whose
//! content is streamed in instead of the string itself.
//!
//! ```json
//! {
//!     "readme.txt": "hello",
//!     "assets": { "logo.png": "__IAR_PATH__::images/logo.png" }
//! }
//! ```

use crate::archive::Archive;
use crate::error::{IarError, Result};
use crate::node::NodeKind;
use crate::pack::{default_name, PackOutcome};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Marks a JSON string as a path to a file on disk
pub const PATH_PREFIX: &str = "__IAR_PATH__::";

impl Archive {
    /// Parse the JSON file at `path` and pack the tree it describes
    ///
    /// Relative `__IAR_PATH__::` paths resolve against the JSON file's
    /// directory. Without an explicit `name`, the root is named after the
    /// JSON file.
    pub fn pack_json<P: AsRef<Path>>(&mut self, path: P, name: Option<&str>) -> Result<u64> {
        let path = path.as_ref();
        let name = match name {
            Some(name) => name.to_string(),
            None => String::from_utf8_lossy(&default_name(path)?).into_owned(),
        };

        let text = fs::read(path).map_err(|e| IarError::open(path, e))?;
        let value: Value = serde_json::from_slice(&text)?;

        let canonical = path.canonicalize()?;
        let base = canonical.parent();

        self.pack_json_value(&value, &name, base)
    }

    /// Pack an already parsed JSON value and return the root node's offset
    ///
    /// Relative `__IAR_PATH__::` paths resolve against `base_dir`, or the
    /// working directory when it is `None`.
    pub fn pack_json_value(
        &mut self,
        value: &Value,
        name: &str,
        base_dir: Option<&Path>,
    ) -> Result<u64> {
        self.reset_cursor()?;

        info!("Packing JSON tree {:?} into {:?}", name, self.path());

        match self.pack_json_walk(value, name.as_bytes(), base_dir)? {
            PackOutcome::Packed(offset) => {
                self.set_root_offset(offset);
                info!("Packed JSON tree ({} bytes)", self.cursor());
                Ok(offset)
            }
            PackOutcome::Skipped => Err(IarError::EmptyRoot),
        }
    }

    fn pack_json_walk(
        &mut self,
        value: &Value,
        name: &[u8],
        base_dir: Option<&Path>,
    ) -> Result<PackOutcome> {
        match value {
            Value::String(text) => match text.strip_prefix(PATH_PREFIX) {
                Some(path) => self.pack_json_path(path, name, base_dir),
                None => {
                    let (slot, mut node) = self.create_node(name, NodeKind::File)?;

                    let mut content = text.as_bytes().to_vec();
                    if self.options().json_string_terminator {
                        content.push(0);
                    }
                    self.stream_content(&mut node, &mut content.as_slice())?;
                    self.commit_node(slot, &node)?;

                    Ok(PackOutcome::Packed(slot))
                }
            },

            Value::Object(members) => {
                let (slot, mut node) = self.create_node(name, NodeKind::Directory)?;

                let mut child_offsets = Vec::with_capacity(members.len());
                for (key, child) in members {
                    if key.contains('\0') {
                        warn!("JSON member {:?} has a zero byte in its name; ignoring", key);
                        continue;
                    }

                    match self.pack_json_walk(child, key.as_bytes(), base_dir)? {
                        PackOutcome::Packed(offset) => child_offsets.push(offset),
                        PackOutcome::Skipped => continue,
                    }
                }

                self.write_child_offsets(&mut node, &child_offsets)?;
                self.commit_node(slot, &node)?;

                Ok(PackOutcome::Packed(slot))
            }

            other => {
                warn!(
                    "JSON member {:?} is not an object or string ({}); ignoring",
                    String::from_utf8_lossy(name),
                    kind_name(other)
                );
                Ok(PackOutcome::Skipped)
            }
        }
    }

    fn pack_json_path(
        &mut self,
        path: &str,
        name: &[u8],
        base_dir: Option<&Path>,
    ) -> Result<PackOutcome> {
        let path = match base_dir {
            Some(base) if Path::new(path).is_relative() => base.join(path),
            _ => Path::new(path).to_path_buf(),
        };

        let canonical = path.canonicalize().map_err(|e| IarError::open(&path, e))?;
        if canonical.as_path() == self.path() {
            warn!("Skipping {:?}: it is the archive being written", path);
            return Ok(PackOutcome::Skipped);
        }

        let (slot, mut node) = self.create_node(name, NodeKind::File)?;
        self.pack_file_content(&mut node, &path)?;
        self.commit_node(slot, &node)?;

        debug!("Streamed {:?} ({} bytes)", path, node.data_bytes());
        Ok(PackOutcome::Packed(slot))
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
