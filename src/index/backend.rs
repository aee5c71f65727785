//! Index backend abstraction and helpers.
//!
//! The `IndexBackend` trait provides a common interface that the
//! search engine, CLI and server use to persist and reload an
//! inverted index without depending on a concrete storage format.

use std::path::Path;

use anyhow::Result;

use crate::index::inverted::InvertedIndex;
use crate::index::models::IndexMeta;
use crate::models::{IndexBackendKind, IndexConfig};

/// Pluggable persistence for an inverted index and its metadata.
pub trait IndexBackend {
    /// Kind of backend implementation.
    fn kind(&self) -> IndexBackendKind;

    /// Root path for the on-disk index.
    fn index_path(&self) -> &Path;

    /// Load index metadata.
    ///
    /// Fails with `IndexError::NotFound` when nothing has been saved yet.
    fn load_meta(&self) -> Result<IndexMeta>;

    /// Load the full posting map.
    ///
    /// All-or-nothing: malformed or truncated data is reported as
    /// `IndexError::Parse` and no partial index is returned.
    fn load_index(&self, meta: &IndexMeta) -> Result<InvertedIndex>;

    /// Replace any previously persisted index with `index` and `meta`.
    fn save(&mut self, index: &InvertedIndex, meta: &IndexMeta) -> Result<()>;
}

/// Open a backend for writing, creating its on-disk location if needed.
pub fn open_backend(config: &IndexConfig) -> Result<Box<dyn IndexBackend>> {
    match config.backend {
        IndexBackendKind::File => Ok(Box::new(crate::index::FileIndexBackend::open(
            &config.index_path,
        )?)),
        IndexBackendKind::Sqlite => Ok(Box::new(crate::index::SqliteIndexBackend::open(
            &config.index_path,
        )?)),
    }
}

/// Open a backend over an index that must already exist.
///
/// Never creates files; a missing location is `IndexError::NotFound`.
pub fn open_existing_backend(config: &IndexConfig) -> Result<Box<dyn IndexBackend>> {
    match config.backend {
        IndexBackendKind::File => Ok(Box::new(
            crate::index::FileIndexBackend::open_existing(&config.index_path)?,
        )),
        IndexBackendKind::Sqlite => Ok(Box::new(
            crate::index::SqliteIndexBackend::open_existing(&config.index_path)?,
        )),
    }
}
