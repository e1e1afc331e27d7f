//! Panako Manifest
//!
//! Durable record of which audio files have already been handed to the engine
//! for indexing. The backing file is a newline-delimited list of paths that is
//! only ever appended to, except when entries are removed or the file is
//! compacted.

pub mod error;
pub mod store;

pub use error::ManifestError;
pub use store::ManifestStore;
