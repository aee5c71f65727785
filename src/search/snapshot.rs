//! Immutable corpus + index pairs shared between concurrent queries.
//!
//! A `SearchSnapshot` is never mutated after construction. Rebuilding
//! produces a whole new snapshot that `SnapshotHandle::publish` swaps in
//! atomically; queries that already loaded the previous snapshot finish
//! against it.

use std::sync::Arc;

use anyhow::{bail, Result};
use arc_swap::ArcSwap;
use tracing::{info, warn};

use crate::corpus::{ensure_corpus_exists, Corpus, FieldSelection};
use crate::index::{
    build_for_corpus, ensure_corpus_matches, load_index, open_backend, save_index, IndexError,
    IndexMeta, InvertedIndex,
};
use crate::models::{IndexConfig, IndexSummary, DEFAULT_DISPLAY_FIELDS, DEFAULT_SEARCH_FIELDS};

/// A corpus paired with the index built from it.
#[derive(Debug)]
pub struct SearchSnapshot {
    corpus: Arc<Corpus>,
    index: Arc<InvertedIndex>,
    meta: IndexMeta,
    fields: FieldSelection,
    display_fields: FieldSelection,
}

impl SearchSnapshot {
    /// Pair `corpus` with `index`, rejecting a corpus the index was not
    /// built from.
    ///
    /// `display` names the columns returned per hit. When empty, an index
    /// over the postal search fields shows the postal display columns if
    /// the corpus has them; any other index shows its own fields.
    pub fn new(
        corpus: Arc<Corpus>,
        index: Arc<InvertedIndex>,
        meta: IndexMeta,
        display: &[String],
    ) -> Result<Self> {
        ensure_corpus_matches(&meta, &corpus)?;
        if index.ngram_size() != meta.ngram_size {
            bail!(
                "index holds {}-grams but its metadata declares {}-grams",
                index.ngram_size(),
                meta.ngram_size
            );
        }

        let fields = corpus.select_fields(&meta.fields)?;
        let display_fields = if !display.is_empty() {
            corpus.select_fields(display)?
        } else if meta.fields == DEFAULT_SEARCH_FIELDS {
            corpus
                .select_fields(&DEFAULT_DISPLAY_FIELDS.map(String::from))
                .unwrap_or_else(|_| fields.clone())
        } else {
            fields.clone()
        };

        Ok(Self {
            corpus,
            index,
            meta,
            fields,
            display_fields,
        })
    }

    /// Load a persisted index and its corpus.
    pub fn load(config: &IndexConfig) -> Result<Self> {
        let (index, meta) = load_index(config)?;

        if meta.fields != config.corpus.fields {
            warn!(
                indexed = ?meta.fields,
                configured = ?config.corpus.fields,
                "configured search fields differ from the indexed fields; using the indexed fields"
            );
        }

        ensure_corpus_exists(&config.corpus.path)?;
        let corpus = Corpus::load_csv(&config.corpus)?;

        Self::new(
            Arc::new(corpus),
            Arc::new(index),
            meta,
            &config.corpus.display_fields,
        )
    }

    /// Build a fresh index from the corpus, persist it, and return the
    /// resulting snapshot.
    pub fn rebuild(config: &IndexConfig) -> Result<(Self, IndexSummary)> {
        ensure_corpus_exists(&config.corpus.path)?;
        let corpus = Corpus::load_csv(&config.corpus)?;
        let (index, mut meta) = build_for_corpus(&corpus, config)?;

        let mut backend = open_backend(config)?;
        let summary = save_index(backend.as_mut(), &index, &mut meta)?;

        let snapshot = Self::new(
            Arc::new(corpus),
            Arc::new(index),
            meta,
            &config.corpus.display_fields,
        )?;
        Ok((snapshot, summary))
    }

    /// Load the persisted index, building it first when none exists.
    pub fn load_or_build(config: &IndexConfig) -> Result<Self> {
        match Self::load(config) {
            Ok(snapshot) => Ok(snapshot),
            Err(err)
                if matches!(
                    err.downcast_ref::<IndexError>(),
                    Some(IndexError::NotFound(_))
                ) =>
            {
                info!(
                    path = %config.index_path.display(),
                    "no index found; building one"
                );
                Self::rebuild(config).map(|(snapshot, _)| snapshot)
            }
            Err(err) => Err(err),
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    /// Fields whose concatenation was indexed.
    pub fn fields(&self) -> &FieldSelection {
        &self.fields
    }

    /// Fields returned for each hit.
    pub fn display_fields(&self) -> &FieldSelection {
        &self.display_fields
    }
}

/// Thread-safe holder for the current snapshot with atomic replacement.
pub struct SnapshotHandle {
    current: ArcSwap<SearchSnapshot>,
}

impl SnapshotHandle {
    pub fn new(snapshot: SearchSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    /// Get the current snapshot.
    ///
    /// The returned `Arc` stays valid after a later `publish`.
    pub fn load(&self) -> Arc<SearchSnapshot> {
        self.current.load_full()
    }

    /// Atomically replace the current snapshot.
    pub fn publish(&self, snapshot: SearchSnapshot) {
        info!(
            documents = snapshot.corpus.len(),
            ngrams = snapshot.index.len(),
            "publishing search snapshot"
        );
        self.current.store(Arc::new(snapshot));
    }
}
