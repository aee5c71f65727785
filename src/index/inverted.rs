//! In-memory inverted index from n-grams to posting sets.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use tracing::info;

use crate::corpus::{Corpus, FieldSelection};
use crate::index::ngram::ngram_slices;
use crate::models::{DocumentId, Record};

/// Records per partial index when building in parallel.
const PARALLEL_CHUNK_SIZE: usize = 4096;

/// Mapping from n-gram to the set of documents whose searchable text
/// contains it.
///
/// Immutable once built; queries only read it, so a built index can be
/// shared across threads behind an `Arc` without locking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvertedIndex {
    ngram_size: usize,
    document_count: u64,
    postings: HashMap<String, HashSet<DocumentId>>,
}

impl InvertedIndex {
    /// Empty index over `document_count` documents.
    pub fn new(ngram_size: usize, document_count: u64) -> Self {
        Self {
            ngram_size,
            document_count,
            postings: HashMap::new(),
        }
    }

    /// Reassemble an index from persisted parts.
    pub fn from_postings(
        ngram_size: usize,
        document_count: u64,
        postings: HashMap<String, HashSet<DocumentId>>,
    ) -> Self {
        Self {
            ngram_size,
            document_count,
            postings,
        }
    }

    pub fn ngram_size(&self) -> usize {
        self.ngram_size
    }

    pub fn document_count(&self) -> u64 {
        self.document_count
    }

    pub fn postings(&self, ngram: &str) -> Option<&HashSet<DocumentId>> {
        self.postings.get(ngram)
    }

    /// Number of distinct n-grams.
    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Total number of (n-gram, document) pairs.
    pub fn posting_count(&self) -> u64 {
        self.postings.values().map(|set| set.len() as u64).sum()
    }

    /// Postings flattened into sorted keys with sorted id lists.
    ///
    /// This is the canonical persisted shape; it is byte-stable across
    /// runs for the same index.
    pub fn sorted_postings(&self) -> Vec<(&str, Vec<DocumentId>)> {
        let mut entries: Vec<(&str, Vec<DocumentId>)> = self
            .postings
            .iter()
            .map(|(ngram, ids)| {
                let mut ids: Vec<DocumentId> = ids.iter().copied().collect();
                ids.sort_unstable();
                (ngram.as_str(), ids)
            })
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// Add `id` to the posting set of `ngram`, creating the set on first
    /// sight.
    pub fn insert(&mut self, ngram: &str, id: DocumentId) {
        match self.postings.get_mut(ngram) {
            Some(set) => {
                set.insert(id);
            }
            None => {
                let mut set = HashSet::new();
                set.insert(id);
                self.postings.insert(ngram.to_owned(), set);
            }
        }
    }

    /// Index every n-gram of `text` under `id`.
    pub fn add_document(&mut self, id: DocumentId, text: &str) {
        for ngram in ngram_slices(text, self.ngram_size) {
            self.insert(ngram, id);
        }
    }

    /// Union `other` into `self`, key by key.
    ///
    /// Union is commutative and associative, so partial indexes can be
    /// merged in any order.
    pub fn merge(mut self, other: InvertedIndex) -> InvertedIndex {
        debug_assert_eq!(self.ngram_size, other.ngram_size);
        self.document_count = self.document_count.max(other.document_count);

        for (ngram, ids) in other.postings {
            match self.postings.get_mut(&ngram) {
                Some(set) => set.extend(ids),
                None => {
                    self.postings.insert(ngram, ids);
                }
            }
        }

        self
    }
}

/// Build an index over every record of `corpus` in a single pass.
pub fn build(corpus: &Corpus, fields: &FieldSelection, ngram_size: usize) -> InvertedIndex {
    let mut index = InvertedIndex::new(ngram_size, corpus.len() as u64);
    for record in corpus.records() {
        let text = corpus.searchable_text(record, fields);
        index.add_document(record.id, &text);
    }

    log_build(&index, false);
    index
}

/// Build partial indexes over chunks of `corpus` on the rayon pool and
/// merge them.
///
/// Produces the same posting sets as [`build`].
pub fn build_parallel(
    corpus: &Corpus,
    fields: &FieldSelection,
    ngram_size: usize,
) -> InvertedIndex {
    let document_count = corpus.len() as u64;

    let index = corpus
        .records()
        .par_chunks(PARALLEL_CHUNK_SIZE)
        .map(|chunk| build_partial(corpus, chunk, fields, ngram_size, document_count))
        .reduce(
            || InvertedIndex::new(ngram_size, document_count),
            InvertedIndex::merge,
        );

    log_build(&index, true);
    index
}

fn build_partial(
    corpus: &Corpus,
    records: &[Record],
    fields: &FieldSelection,
    ngram_size: usize,
    document_count: u64,
) -> InvertedIndex {
    let mut partial = InvertedIndex::new(ngram_size, document_count);
    for record in records {
        let text = corpus.searchable_text(record, fields);
        partial.add_document(record.id, &text);
    }
    partial
}

fn log_build(index: &InvertedIndex, parallel: bool) {
    info!(
        documents = index.document_count(),
        ngrams = index.len(),
        postings = index.posting_count(),
        ngram_size = index.ngram_size(),
        parallel,
        "built inverted index"
    );
}
