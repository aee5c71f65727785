//! N-gram inverted index: tokenizer, builder, persistence backends.
//!
//! This module defines the in-memory `InvertedIndex` plus the pluggable
//! backend abstraction used by the CLI `addrgram index` command, local
//! searches and the daemon. Two backends ship: a JSON file backend
//! under a `.addrgram/` directory and a single-file SQLite backend.

mod backend;
pub mod error;
mod file;
pub mod inverted;
pub mod models;
pub mod ngram;
mod sqlite;

pub use backend::{open_backend, open_existing_backend, IndexBackend};
pub use error::IndexError;
pub use file::FileIndexBackend;
pub use inverted::{build, build_parallel, InvertedIndex};
pub use models::{IndexMeta, INDEX_SCHEMA_VERSION};
pub use ngram::{ngram_slices, ngrams};
pub use sqlite::SqliteIndexBackend;

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Result};
use tracing::{debug, info};

use crate::corpus::{ensure_corpus_exists, Corpus, FieldSelection};
use crate::models::{IndexConfig, IndexSummary};

/// Run indexing for the given configuration using the configured backend.
///
/// Loads the corpus, builds the index, and replaces whatever the backend
/// held before. This function is the core entry point used by the CLI,
/// the server and tests.
pub fn run_index(config: IndexConfig) -> Result<IndexSummary> {
    validate_index_config(&config)?;
    ensure_corpus_exists(&config.corpus.path)?;

    let corpus = Corpus::load_csv(&config.corpus)?;
    let (index, mut meta) = build_for_corpus(&corpus, &config)?;

    let mut backend = open_backend(&config)?;
    save_index(backend.as_mut(), &index, &mut meta)
}

/// Build an index and its metadata for an already loaded corpus.
pub fn build_for_corpus(
    corpus: &Corpus,
    config: &IndexConfig,
) -> Result<(InvertedIndex, IndexMeta)> {
    validate_index_config(config)?;
    let fields = corpus.select_fields(&config.corpus.fields)?;

    let index = build_with(corpus, &fields, config);
    let now = current_epoch_seconds();
    let meta = IndexMeta {
        schema_version: INDEX_SCHEMA_VERSION.to_string(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        ngram_size: config.ngram_size,
        fields: fields.names().to_vec(),
        document_count: corpus.len() as u64,
        corpus_fingerprint: corpus.fingerprint(),
        corpus_path: config.corpus.path.to_string_lossy().to_string(),
        created_at: now,
        updated_at: now,
    };

    Ok((index, meta))
}

/// Persist `index` through `backend`, keeping the original creation
/// time when an index already exists at that location.
pub fn save_index(
    backend: &mut dyn IndexBackend,
    index: &InvertedIndex,
    meta: &mut IndexMeta,
) -> Result<IndexSummary> {
    if let Ok(previous) = backend.load_meta() {
        debug!(created_at = previous.created_at, "preserving index creation time");
        meta.created_at = previous.created_at;
    }

    backend.save(index, meta)?;

    Ok(summarize(
        backend,
        meta,
        index.len() as u64,
        index.posting_count(),
    ))
}

/// Read-only helper to inspect an existing index without modifying it.
///
/// Opens the configured backend, reads its metadata, and loads the
/// postings to compute aggregate counts. It does not create or update
/// any on-disk index data.
pub fn get_index_info(config: &IndexConfig) -> Result<IndexSummary> {
    let backend = open_existing_backend(config)?;
    let meta = backend.load_meta()?;
    let index = backend.load_index(&meta)?;

    Ok(summarize(
        backend.as_ref(),
        &meta,
        index.len() as u64,
        index.posting_count(),
    ))
}

/// Load a persisted index and the metadata that pairs it with a corpus.
pub fn load_index(config: &IndexConfig) -> Result<(InvertedIndex, IndexMeta)> {
    let backend = open_existing_backend(config)?;
    let meta = backend.load_meta()?;
    let index = backend.load_index(&meta)?;
    info!(
        path = %config.index_path.display(),
        backend = ?backend.kind(),
        documents = meta.document_count,
        ngrams = index.len(),
        "loaded index"
    );
    Ok((index, meta))
}

/// Fail fast when `corpus` is not the snapshot `meta` was built from.
pub fn ensure_corpus_matches(meta: &IndexMeta, corpus: &Corpus) -> Result<()> {
    let corpus_documents = corpus.len() as u64;
    let corpus_fingerprint = corpus.fingerprint();

    if meta.document_count != corpus_documents || meta.corpus_fingerprint != corpus_fingerprint {
        return Err(IndexError::CorpusMismatch {
            index_documents: meta.document_count,
            index_fingerprint: meta.corpus_fingerprint,
            corpus_documents,
            corpus_fingerprint,
        }
        .into());
    }

    Ok(())
}

pub(crate) fn validate_index_config(config: &IndexConfig) -> Result<()> {
    if config.ngram_size == 0 {
        bail!("ngram size must be at least 1");
    }
    if config.corpus.fields.is_empty() {
        bail!("at least one searchable field is required");
    }
    Ok(())
}

fn build_with(corpus: &Corpus, fields: &FieldSelection, config: &IndexConfig) -> InvertedIndex {
    if config.parallel {
        build_parallel(corpus, fields, config.ngram_size)
    } else {
        build(corpus, fields, config.ngram_size)
    }
}

fn summarize(
    backend: &dyn IndexBackend,
    meta: &IndexMeta,
    ngrams_indexed: u64,
    postings: u64,
) -> IndexSummary {
    let corpus_path = if meta.corpus_path.is_empty() {
        None
    } else {
        Some(meta.corpus_path.clone())
    };

    IndexSummary {
        backend: backend.kind(),
        index_path: backend.index_path().to_path_buf(),
        documents_indexed: meta.document_count,
        ngrams_indexed,
        postings,
        ngram_size: meta.ngram_size,
        corpus_path,
        schema_version: Some(meta.schema_version.clone()),
        tool_version: Some(meta.tool_version.clone()),
        created_at: format_timestamp_iso8601(meta.created_at),
        updated_at: format_timestamp_iso8601(meta.updated_at),
    }
}

pub(crate) fn current_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn format_timestamp_iso8601(secs: u64) -> Option<String> {
    use time::{format_description::well_known::Rfc3339, OffsetDateTime};

    let ts = secs as i64;
    let dt = OffsetDateTime::from_unix_timestamp(ts).ok()?;
    Some(dt.format(&Rfc3339).unwrap_or_else(|_| dt.to_string()))
}
