use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::cli::args::{
    EmptyKeywordArg, IndexBackendArg, OutputFormat, TargetArgs, DEFAULT_SERVE_ADDR,
};
use crate::cli::{IndexArgs, IndexInfoArgs, SearchArgs, ServeArgs};

/// Top-level representation of `.addrgram/config.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    /// Directory containing `.addrgram/`; relative paths in the file
    /// are resolved against it.
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub corpus: Option<CorpusSection>,

    #[serde(default)]
    pub index: Option<IndexSection>,

    #[serde(default)]
    pub search: Option<SearchSection>,

    #[serde(default)]
    pub serve: Option<ServeSection>,

    #[serde(default)]
    pub http: Option<HttpSection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CorpusSection {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub display_fields: Vec<String>,
    #[serde(default)]
    pub delimiter: Option<char>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IndexSection {
    #[serde(default)]
    pub backend: Option<IndexBackendArg>,
    #[serde(default)]
    pub index_path: Option<PathBuf>,
    #[serde(default)]
    pub ngram_size: Option<usize>,
    #[serde(default)]
    pub parallel: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchSection {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub verify: Option<bool>,
    #[serde(default)]
    pub empty_keyword: Option<EmptyKeywordArg>,
    #[serde(default)]
    pub format: Option<OutputFormat>,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub no_server: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServeSection {
    #[serde(default)]
    pub addr: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HttpSection {
    #[serde(default)]
    pub server_url: Option<String>,
}

/// Discover and load a project-local `.addrgram/config.toml` (or
/// `.addrgram/addrgram.toml`) starting from the current working
/// directory and walking up parent directories.
pub fn load_cli_config() -> Result<Option<CliConfig>> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let config_path = find_project_config(&cwd);

    let Some(path) = config_path else {
        return Ok(None);
    };

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let mut config: CliConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse TOML config at {}", path.display()))?;

    // <root>/.addrgram/config.toml
    config.root = path
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default();
    debug!(path = %path.display(), "loaded project config");

    Ok(Some(config))
}

fn find_project_config(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);

    while let Some(current) = dir {
        let addrgram_dir = current.join(".addrgram");
        let config_toml = addrgram_dir.join("config.toml");
        if config_toml.is_file() {
            return Some(config_toml);
        }

        let addrgram_toml = addrgram_dir.join("addrgram.toml");
        if addrgram_toml.is_file() {
            return Some(addrgram_toml);
        }

        dir = current.parent();
    }

    None
}

impl CliConfig {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn http_server_url(&self) -> Option<String> {
        self.http.as_ref().and_then(|http| http.server_url.clone())
    }
}

/// Fill corpus and index flags left unset on the command line.
pub fn apply_target_config_defaults(config: &CliConfig, args: &mut TargetArgs) {
    if let Some(corpus) = &config.corpus {
        if args.corpus.is_none() {
            if let Some(path) = &corpus.path {
                args.corpus = Some(config.resolve(path));
            }
        }

        if args.fields.is_empty() && !corpus.fields.is_empty() {
            args.fields = corpus.fields.clone();
        }

        if args.display_fields.is_empty() && !corpus.display_fields.is_empty() {
            args.display_fields = corpus.display_fields.clone();
        }

        if args.delimiter.is_none() {
            args.delimiter = corpus.delimiter;
        }
    }

    if let Some(index) = &config.index {
        if args.index_backend.is_none() {
            args.index_backend = index.backend;
        }

        if args.index_path.is_none() {
            if let Some(index_path) = &index.index_path {
                args.index_path = Some(config.resolve(index_path));
            }
        }

        if args.ngram_size.is_none() {
            args.ngram_size = index.ngram_size;
        }

        if !args.no_parallel {
            if let Some(false) = index.parallel {
                args.no_parallel = true;
            }
        }
    }
}

pub fn apply_search_config_defaults(config: &CliConfig, args: &mut SearchArgs) {
    apply_target_config_defaults(config, &mut args.target);

    if let Some(search) = &config.search {
        if args.limit.is_none() {
            args.limit = search.limit;
        }

        if !args.verify {
            if let Some(true) = search.verify {
                args.verify = true;
            }
        }

        if args.empty_keyword.is_none() {
            args.empty_keyword = search.empty_keyword;
        }

        if matches!(args.format, OutputFormat::Text) {
            if let Some(format) = search.format {
                args.format = format;
            }
        }

        if args.server.is_none() {
            args.server = search.server.clone().or_else(|| config.http_server_url());
        }

        if !args.no_server {
            if let Some(true) = search.no_server {
                args.no_server = true;
            }
        }
    } else if args.server.is_none() {
        // If there is no per-search section, fall back to a global
        // HTTP server URL when present.
        args.server = config.http_server_url();
    }
}

pub fn apply_index_config_defaults(config: &CliConfig, args: &mut IndexArgs) {
    apply_target_config_defaults(config, &mut args.target);

    if args.server.is_none() {
        args.server = config.http_server_url();
    }
}

pub fn apply_index_info_config_defaults(config: &CliConfig, args: &mut IndexInfoArgs) {
    apply_target_config_defaults(config, &mut args.target);

    if args.server.is_none() {
        args.server = config.http_server_url();
    }
}

pub fn apply_serve_config_defaults(config: &CliConfig, args: &mut ServeArgs) {
    apply_target_config_defaults(config, &mut args.target);

    if let Some(serve) = &config.serve {
        if args.addr == DEFAULT_SERVE_ADDR {
            if let Some(addr) = &serve.addr {
                args.addr = addr.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse(toml_text: &str, root: &Path) -> CliConfig {
        let mut config: CliConfig = toml::from_str(toml_text).expect("toml");
        config.root = root.to_path_buf();
        config
    }

    #[test]
    fn find_project_config_walks_up_directories() {
        let dir = tempdir().expect("tempdir");
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).expect("nested");
        fs::create_dir_all(dir.path().join(".addrgram")).expect("config dir");
        let config_path = dir.path().join(".addrgram").join("addrgram.toml");
        fs::write(&config_path, "").expect("write");

        assert_eq!(find_project_config(&nested), Some(config_path));
    }

    #[test]
    fn target_defaults_resolve_relative_paths_against_project_root() {
        let config = parse(
            r#"
            [corpus]
            path = "data/zenkoku.csv"
            fields = ["市区町村", "町域"]
            delimiter = "\t"

            [index]
            backend = "sqlite"
            index_path = "var/index.sqlite"
            ngram_size = 3
            parallel = false
            "#,
            Path::new("/srv/project"),
        );

        let mut args = TargetArgs::default();
        apply_target_config_defaults(&config, &mut args);

        assert_eq!(args.corpus, Some(PathBuf::from("/srv/project/data/zenkoku.csv")));
        assert_eq!(args.fields, vec!["市区町村".to_string(), "町域".to_string()]);
        assert_eq!(args.delimiter, Some('\t'));
        assert_eq!(args.index_backend, Some(IndexBackendArg::Sqlite));
        assert_eq!(
            args.index_path,
            Some(PathBuf::from("/srv/project/var/index.sqlite"))
        );
        assert_eq!(args.ngram_size, Some(3));
        assert!(args.no_parallel);
    }

    #[test]
    fn command_line_values_win_over_config() {
        let config = parse(
            r#"
            [corpus]
            path = "config.csv"

            [search]
            limit = 5
            format = "json"
            empty_keyword = "match-all"
            server = "http://from-config:7878"
            "#,
            Path::new("/srv/project"),
        );

        let mut args = SearchArgs {
            keyword: "渋谷".to_string(),
            target: TargetArgs {
                corpus: Some(PathBuf::from("cli.csv")),
                ..TargetArgs::default()
            },
            limit: Some(1),
            verify: false,
            empty_keyword: None,
            format: OutputFormat::Table,
            server: None,
            no_server: false,
        };
        apply_search_config_defaults(&config, &mut args);

        assert_eq!(args.target.corpus, Some(PathBuf::from("cli.csv")));
        assert_eq!(args.limit, Some(1));
        assert_eq!(args.format, OutputFormat::Table);
        assert_eq!(args.empty_keyword, Some(EmptyKeywordArg::MatchAll));
        assert_eq!(args.server.as_deref(), Some("http://from-config:7878"));
    }

    #[test]
    fn http_section_supplies_server_url() {
        let config = parse(
            r#"
            [http]
            server_url = "http://127.0.0.1:9000"
            "#,
            Path::new("/srv/project"),
        );

        let mut args = IndexInfoArgs {
            target: TargetArgs::default(),
            format: OutputFormat::Text,
            server: None,
            no_server: false,
        };
        apply_index_info_config_defaults(&config, &mut args);

        assert_eq!(args.server.as_deref(), Some("http://127.0.0.1:9000"));
    }

    #[test]
    fn serve_addr_comes_from_config_only_when_flag_is_default() {
        let config = parse(
            r#"
            [serve]
            addr = "0.0.0.0:8080"
            "#,
            Path::new("/srv/project"),
        );

        let mut args = ServeArgs {
            addr: DEFAULT_SERVE_ADDR.to_string(),
            target: TargetArgs::default(),
        };
        apply_serve_config_defaults(&config, &mut args);
        assert_eq!(args.addr, "0.0.0.0:8080");

        let mut args = ServeArgs {
            addr: "127.0.0.1:1".to_string(),
            target: TargetArgs::default(),
        };
        apply_serve_config_defaults(&config, &mut args);
        assert_eq!(args.addr, "127.0.0.1:1");
    }
}
