//! Persisted metadata stored alongside an inverted index.

use serde::{Deserialize, Serialize};

/// Current on-disk schema version written by both backends.
pub const INDEX_SCHEMA_VERSION: &str = "1";

/// Metadata for a persisted index.
///
/// Carries everything needed to pair the index with its corpus again
/// after a reload: the n-gram width, the fields that were concatenated,
/// and a document count plus fingerprint of the corpus snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Schema version for the index on disk.
    pub schema_version: String,
    /// Version of the addrgram tool that wrote the index.
    pub tool_version: String,
    /// Width of the indexed n-grams.
    pub ngram_size: usize,
    /// Corpus columns concatenated into the searchable text, in order.
    pub fields: Vec<String>,
    /// Number of corpus records at build time.
    pub document_count: u64,
    /// xxh3 fingerprint of the corpus at build time.
    pub corpus_fingerprint: u64,
    /// Corpus file the index was built from, as given in the config.
    #[serde(default)]
    pub corpus_path: String,
    /// Unix timestamp (seconds since epoch) when the index was created.
    pub created_at: u64,
    /// Unix timestamp (seconds since epoch) when the index was last written.
    pub updated_at: u64,
}
