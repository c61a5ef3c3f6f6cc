//! Archive engine internals
//!
//! - [`header`] - archive header, format constants and page alignment
//! - [`node`] - node records and child-offset arrays
//! - [`io`] - positioned reads/writes and block streaming
//! - [`archive`] - the archive handle, node lookup and content access
//! - [`pack`] / [`json`] - building archives from a directory or a JSON tree
//! - [`unpack`] - extracting archives to disk
//! - [`config`] - pack options

pub mod archive;
pub mod config;
pub mod error;
pub mod header;
pub mod io;
pub mod json;
pub mod node;
pub mod pack;
pub mod unpack;

pub use archive::Archive;
