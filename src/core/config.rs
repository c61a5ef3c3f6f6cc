//! Pack configuration
//!
//! Options can be set in code or loaded from a TOML file:
//!
//! ```toml
//! page_bytes = 16384
//! symlinks = "follow"
//! json_string_terminator = false
//! ```

use crate::error::Result;
use crate::header::{validate_page_bytes, DEFAULT_PAGE_BYTES};
use serde::Deserialize;
use std::path::Path;

/// What to do with a symbolic link met while packing a filesystem tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymlinkPolicy {
    /// Leave the link out of its parent directory and log a warning
    #[default]
    Skip,
    /// Pack whatever the link points at
    Follow,
    /// Abort the pack
    Error,
}

impl SymlinkPolicy {
    /// Parse a policy name as used on the command line
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(SymlinkPolicy::Skip),
            "follow" => Ok(SymlinkPolicy::Follow),
            "error" => Ok(SymlinkPolicy::Error),
            _ => Err(format!(
                "Invalid symlink policy '{}'. Valid options: skip, follow, error",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackOptions {
    /// Alignment of file content; must be a power of two
    pub page_bytes: u64,

    pub symlinks: SymlinkPolicy,

    /// Store a zero byte after the content of JSON string leaves
    pub json_string_terminator: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        PackOptions {
            page_bytes: DEFAULT_PAGE_BYTES,
            symlinks: SymlinkPolicy::Skip,
            json_string_terminator: true,
        }
    }
}

impl PackOptions {
    pub fn validate(&self) -> Result<()> {
        validate_page_bytes(self.page_bytes)
    }

    /// Parse and validate options from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: PackOptions = toml::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    /// Parse and validate options from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| crate::error::IarError::open(path, e))?;
        Self::from_toml_str(&text)
    }
}
