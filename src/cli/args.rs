use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use crate::models::{
    CorpusConfig, EmptyKeywordPolicy, IndexBackendKind, IndexConfig, QueryOptions, SearchConfig,
    DEFAULT_NGRAM_SIZE, DEFAULT_SEARCH_FIELDS,
};

/// Default listen address for `addrgram serve`.
pub const DEFAULT_SERVE_ADDR: &str = "127.0.0.1:7878";

/// Top-level CLI entrypoint for `addrgram`.
#[derive(Parser, Debug)]
#[command(
    name = "addrgram",
    version,
    about = "N-gram keyword search over tabular address records",
    subcommand_required = false,
    arg_required_else_help = false
)]
pub struct Cli {
    /// Print the JSON schema version used for `--format=json` output
    /// and exit.
    #[arg(long = "schema-version")]
    pub schema_version: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build (or rebuild) the index for a corpus.
    Index(IndexArgs),
    /// Inspect an existing index without modifying it.
    IndexInfo(IndexInfoArgs),
    /// Find records whose searchable text contains every n-gram of a
    /// keyword.
    Search(SearchArgs),
    /// Run a long-lived HTTP+JSON daemon.
    Serve(ServeArgs),
}

/// Corpus and index location flags shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Delimited corpus file with a header row (UTF-8).
    #[arg(long = "corpus")]
    pub corpus: Option<PathBuf>,

    /// Columns concatenated, in order, into each record's searchable
    /// text.
    ///
    /// Multiple columns can be given via commas or repeated flags,
    /// e.g. `--field 都道府県,市区町村` or `--field a --field b`.
    /// Defaults to the Japanese postal address columns.
    #[arg(long = "field", value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Columns printed for each hit (defaults to the searchable
    /// columns, or the postal code plus address columns when those are
    /// in use).
    #[arg(long = "display-field", value_delimiter = ',')]
    pub display_fields: Vec<String>,

    /// Single-character field delimiter of the corpus file.
    #[arg(long = "delimiter")]
    pub delimiter: Option<char>,

    /// Index backend to use.
    ///
    /// When omitted, the backend is inferred from `--index-path`
    /// (`.sqlite` selects SQLite) and otherwise defaults to the file
    /// backend.
    #[arg(long = "index-backend", value_enum)]
    pub index_backend: Option<IndexBackendArg>,

    /// Location for on-disk index data.
    ///
    /// For the file backend this should be a directory (e.g. ".addrgram").
    /// For the SQLite backend this is typically a database file path
    /// such as ".addrgram/index.sqlite".
    #[arg(long = "index-path")]
    pub index_path: Option<PathBuf>,

    /// Width of the n-grams stored in the index.
    #[arg(long = "ngram-size")]
    pub ngram_size: Option<usize>,

    /// Build the index on a single thread.
    #[arg(long = "no-parallel")]
    pub no_parallel: bool,
}

/// Arguments specific to the `index` subcommand.
#[derive(Args, Debug)]
pub struct IndexArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Optional server URL for delegating indexing to a daemon.
    ///
    /// When set (either via this flag or the `ADDRGRAM_SERVER_URL`
    /// environment variable), the daemon rebuilds its own index and
    /// publishes it. Use `--no-server` to force local indexing.
    #[arg(long = "server", env = "ADDRGRAM_SERVER_URL")]
    pub server: Option<String>,

    /// Disable use of any configured server and force local indexing.
    #[arg(long = "no-server")]
    pub no_server: bool,
}

/// Arguments specific to the `index-info` subcommand.
#[derive(Args, Debug)]
pub struct IndexInfoArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Output format (text or json).
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Optional server URL for delegating index introspection to a daemon.
    #[arg(long = "server", env = "ADDRGRAM_SERVER_URL")]
    pub server: Option<String>,

    /// Disable use of any configured server and force local index introspection.
    #[arg(long = "no-server")]
    pub no_server: bool,
}

/// Arguments specific to the `search` subcommand.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Keyword to look for.
    pub keyword: String,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Maximum number of hits to return.
    #[arg(long = "limit")]
    pub limit: Option<usize>,

    /// Only return records whose searchable text contains the keyword
    /// as a contiguous substring.
    ///
    /// Without this flag, a record matches when it contains every
    /// n-gram of the keyword anywhere, which can admit records where
    /// those n-grams are not adjacent.
    #[arg(long = "verify")]
    pub verify: bool,

    /// What a keyword shorter than the n-gram width matches.
    #[arg(long = "empty-keyword", value_enum)]
    pub empty_keyword: Option<EmptyKeywordArg>,

    /// Output format (text, table, or json).
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Optional server URL for delegating search to a daemon.
    ///
    /// When set (either via this flag or the `ADDRGRAM_SERVER_URL`
    /// environment variable), the CLI sends the keyword to the HTTP
    /// server instead of loading the index locally. Use `--no-server`
    /// to override this and force local execution.
    #[arg(long = "server", env = "ADDRGRAM_SERVER_URL")]
    pub server: Option<String>,

    /// Disable use of any configured server and force local search.
    #[arg(long = "no-server")]
    pub no_server: bool,
}

/// Arguments specific to the `serve` subcommand.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to, e.g. "127.0.0.1:7878".
    #[arg(long = "addr", default_value = DEFAULT_SERVE_ADDR)]
    pub addr: String,

    #[command(flatten)]
    pub target: TargetArgs,
}

/// CLI representation of output format.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Table,
    Json,
}

/// CLI representation of index backend kind.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackendArg {
    File,
    Sqlite,
}

/// CLI representation of the short-keyword policy.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmptyKeywordArg {
    MatchNone,
    MatchAll,
}

impl EmptyKeywordArg {
    pub fn to_model(self) -> EmptyKeywordPolicy {
        match self {
            EmptyKeywordArg::MatchNone => EmptyKeywordPolicy::MatchNone,
            EmptyKeywordArg::MatchAll => EmptyKeywordPolicy::MatchAll,
        }
    }
}

/// Build a core `IndexConfig` for commands that read or write the
/// corpus.
pub fn index_config_from_args(args: &TargetArgs) -> Result<IndexConfig> {
    let Some(corpus_path) = &args.corpus else {
        bail!(
            "no corpus configured; pass --corpus or set `path` under [corpus] \
             in .addrgram/config.toml"
        );
    };
    build_index_config(args, corpus_path.clone())
}

/// Build a core `IndexConfig` for `index-info`, which never touches the
/// corpus and so does not require one.
pub fn index_info_config_from_args(args: &TargetArgs) -> Result<IndexConfig> {
    build_index_config(args, args.corpus.clone().unwrap_or_default())
}

/// Build a core `SearchConfig` from CLI `SearchArgs`.
pub fn search_config_from_args(args: &SearchArgs) -> Result<SearchConfig> {
    Ok(SearchConfig {
        keyword: args.keyword.clone(),
        index: index_config_from_args(&args.target)?,
        options: query_options_from_args(args),
    })
}

pub fn query_options_from_args(args: &SearchArgs) -> QueryOptions {
    QueryOptions {
        limit: args.limit,
        verify: args.verify,
        empty_keyword: args
            .empty_keyword
            .map(EmptyKeywordArg::to_model)
            .unwrap_or_default(),
    }
}

fn build_index_config(args: &TargetArgs, corpus_path: PathBuf) -> Result<IndexConfig> {
    let ngram_size = args.ngram_size.unwrap_or(DEFAULT_NGRAM_SIZE);
    if ngram_size == 0 {
        bail!("ngram size must be at least 1");
    }

    // Display columns are resolved against the persisted index when unset.
    let fields = if args.fields.is_empty() {
        owned(&DEFAULT_SEARCH_FIELDS)
    } else {
        args.fields.clone()
    };

    let backend_arg = match (&args.index_backend, &args.index_path) {
        (Some(kind), _) => *kind,
        (None, Some(path)) if has_sqlite_extension(path) => IndexBackendArg::Sqlite,
        (None, _) => IndexBackendArg::File,
    };

    let backend = match backend_arg {
        IndexBackendArg::File => IndexBackendKind::File,
        IndexBackendArg::Sqlite => IndexBackendKind::Sqlite,
    };

    let index_path = match (&args.index_path, backend_arg) {
        (Some(path), _) => path.clone(),
        (None, IndexBackendArg::File) => PathBuf::from(".addrgram"),
        (None, IndexBackendArg::Sqlite) => PathBuf::from(".addrgram").join("index.sqlite"),
    };

    Ok(IndexConfig {
        corpus: CorpusConfig {
            path: corpus_path,
            fields,
            display_fields: args.display_fields.clone(),
            delimiter: args.delimiter.unwrap_or(','),
        },
        backend,
        index_path,
        ngram_size,
        parallel: !args.no_parallel,
    })
}

fn has_sqlite_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("sqlite"))
        .unwrap_or(false)
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
