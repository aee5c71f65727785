//! Shared data models for corpus, index and search configuration and
//! results.
//!
//! These types form the stable JSON API surface used by the CLI
//! and the daemon/server mode.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Schema version for `SearchResult` JSON payloads.
///
/// This version follows semver semantics (MAJOR.MINOR.PATCH):
/// - MAJOR: Breaking changes to required fields or field semantics.
/// - MINOR: Backward-compatible additions (new optional fields).
/// - PATCH: Documentation or internal changes only.
pub const SEARCH_RESULT_VERSION: &str = "1.0.0";

/// Default n-gram width used when building an index.
pub const DEFAULT_NGRAM_SIZE: usize = 2;

/// Columns concatenated into the searchable text of a postal address
/// record, in concatenation order.
pub const DEFAULT_SEARCH_FIELDS: [&str; 7] = [
    "都道府県",
    "市区町村",
    "町域",
    "京都通り名",
    "字丁目",
    "事業所名",
    "事業所住所",
];

/// Columns shown for each hit when no display fields are configured.
pub const DEFAULT_DISPLAY_FIELDS: [&str; 8] = [
    "郵便番号",
    "都道府県",
    "市区町村",
    "町域",
    "京都通り名",
    "字丁目",
    "事業所名",
    "事業所住所",
];

/// Stable, zero-based position of a record within its corpus snapshot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

impl DocumentId {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for DocumentId {
    fn from(value: usize) -> Self {
        DocumentId(value as u64)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of the source corpus.
///
/// Values are positional and line up with `Corpus::columns`; cells that
/// were absent in the source are stored as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: DocumentId,
    pub values: Vec<String>,
}

/// What a keyword shorter than the n-gram width matches.
///
/// Such a keyword produces no n-grams at all, so it carries no
/// constraint; the policy decides whether that means "nothing" or
/// "everything".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmptyKeywordPolicy {
    #[default]
    MatchNone,
    MatchAll,
}

/// Backend kind for persisted indexes.
///
/// JSON uses lowercase strings for stability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackendKind {
    File,
    Sqlite,
}

/// Location and schema of the tabular corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Path to a UTF-8 delimited file with a header row.
    pub path: PathBuf,
    /// Columns concatenated, in order, into each record's searchable text.
    pub fields: Vec<String>,
    /// Columns returned for each hit.
    #[serde(default)]
    pub display_fields: Vec<String>,
    /// Single-byte field delimiter.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_delimiter() -> char {
    ','
}

/// Configuration for building, inspecting or loading an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Corpus the index is built from and resolved against.
    pub corpus: CorpusConfig,
    /// Selected backend implementation.
    pub backend: IndexBackendKind,
    /// Location for on-disk index data (directory or file path).
    pub index_path: PathBuf,
    /// Width of the n-grams stored in the index.
    #[serde(default = "default_ngram_size")]
    pub ngram_size: usize,
    /// Build partial indexes across worker threads and merge them.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_ngram_size() -> usize {
    DEFAULT_NGRAM_SIZE
}

fn default_parallel() -> bool {
    true
}

/// Per-query knobs shared by local and daemon searches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Maximum number of hits to return (None = unlimited).
    #[serde(default)]
    pub limit: Option<usize>,
    /// Drop candidates whose searchable text does not contain the
    /// keyword as a contiguous substring.
    #[serde(default)]
    pub verify: bool,
    /// Behavior for keywords shorter than the n-gram width.
    #[serde(default)]
    pub empty_keyword: EmptyKeywordPolicy,
}

/// Core configuration for a local search operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Raw keyword provided by the user.
    pub keyword: String,
    /// Index (and its paired corpus) to query.
    pub index: IndexConfig,
    #[serde(flatten)]
    pub options: QueryOptions,
}

/// Request body for `POST /v1/search`.
///
/// The daemon answers from its currently published snapshot, so only
/// the keyword and query options travel over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub keyword: String,
    #[serde(flatten)]
    pub options: QueryOptions,
}

/// A named cell of a resolved record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    pub name: String,
    pub value: String,
}

/// A single resolved search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Position of the record in the corpus.
    pub id: DocumentId,
    /// Display fields of the record, in configured order.
    pub fields: Vec<FieldValue>,
}

/// Summary information for a search result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSummary {
    /// Number of n-grams the keyword produced.
    pub ngrams: u64,
    /// Number of n-grams looked up before the query finished.
    ///
    /// Lower than `ngrams` when a missing n-gram short-circuited the
    /// intersection.
    pub ngrams_probed: u64,
    /// True if an n-gram absent from the index ended the query early.
    pub short_circuited: bool,
    /// Documents surviving the n-gram intersection (and verification,
    /// when enabled).
    pub total_matches: u64,
    /// Candidates removed by the verification pass.
    pub rejected_by_verify: u64,
    /// True if results were truncated due to a limit.
    pub truncated: bool,
}

/// Top-level result for a search invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Schema version for this result payload.
    pub version: String,
    /// The original keyword.
    pub query: String,
    /// Resolved hits in ascending document id order.
    #[serde(default)]
    pub hits: Vec<SearchHit>,
    /// Aggregate summary of the result set.
    pub summary: SearchSummary,
}

/// Summary information about an index operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSummary {
    /// Backend used for the index.
    pub backend: IndexBackendKind,
    /// Location of the index on disk.
    pub index_path: PathBuf,
    /// Number of corpus records covered by the index.
    pub documents_indexed: u64,
    /// Number of distinct n-grams.
    pub ngrams_indexed: u64,
    /// Total number of (n-gram, document) pairs.
    pub postings: u64,
    /// Width of the indexed n-grams.
    pub ngram_size: usize,
    /// Corpus file the index was built from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corpus_path: Option<String>,
    /// Logical schema version for the index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    /// Version of the addrgram tool that wrote the index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_version: Option<String>,
    /// ISO-8601 creation timestamp for this index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// ISO-8601 last-updated timestamp for this index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}
