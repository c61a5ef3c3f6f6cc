use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IarError {
    #[error("Invalid magic number in header: 0x{0:016x}")]
    InvalidMagic(u64),

    #[error("Unsupported format version: {found} (latest supported version is {supported})")]
    UnsupportedVersion { found: u64, supported: u64 },

    #[error("Invalid page size: {0} (must be a power of two)")]
    InvalidPageBytes(u64),

    #[error("Read beyond archive bounds: offset={offset}, length={len}, size={size}")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    #[error("Corrupt node record at offset {offset}: {reason}")]
    CorruptNode { offset: u64, reason: String },

    #[error("Corrupt node name at offset {0}: missing terminator")]
    CorruptName(u64),

    #[error("Invalid node kind: expected a {expected}")]
    InvalidNodeKind { expected: &'static str },

    #[error("Buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall { needed: u64, got: u64 },

    #[error("Content offset {offset} is not aligned to the system page size ({page})")]
    Misaligned { offset: u64, page: u64 },

    #[error("Entry name contains a zero byte: {0:?}")]
    InvalidName(String),

    #[error("Refusing to unpack entry with unsafe name: {0:?}")]
    UnsafeName(String),

    #[error("Symbolic link encountered and policy is 'error': {}", .0.display())]
    SymlinkRejected(PathBuf),

    #[error("Root entry was skipped; nothing to pack")]
    EmptyRoot,

    #[error("Invalid path: path does not contain a valid file name")]
    InvalidPath,

    #[error("Archive was opened read-only")]
    ReadOnly,

    #[error("Failed to open '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

impl IarError {
    /// Wrap an I/O error raised while opening `path`
    pub(crate) fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IarError::Open {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, IarError>;
