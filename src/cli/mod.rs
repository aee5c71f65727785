use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};

use crate::models::{SearchRequest, SEARCH_RESULT_VERSION};
use crate::search::engine;
use crate::server;

mod args;
mod config;
mod format;
mod http_backend;

pub use args::{
    Cli, Commands, EmptyKeywordArg, IndexArgs, IndexBackendArg, IndexInfoArgs, OutputFormat,
    SearchArgs, ServeArgs, TargetArgs,
};

use config::{
    apply_index_config_defaults, apply_index_info_config_defaults, apply_search_config_defaults,
    apply_serve_config_defaults, load_cli_config,
};
use http_backend::HttpSearchBackend;

/// Entry point for the CLI binary.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if cli.schema_version {
        println!(
            "Search result JSON schema version: {}",
            SEARCH_RESULT_VERSION
        );
        return Ok(());
    }

    let cli_config = load_cli_config()?;

    match cli.command {
        Some(Commands::Search(mut search_args)) => {
            if let Some(ref config) = cli_config {
                apply_search_config_defaults(config, &mut search_args);
            }

            let result = if let Some(server_url) =
                effective_server_url(search_args.server.as_deref(), search_args.no_server)
            {
                let backend = HttpSearchBackend::new(server_url)?;
                backend.search(&SearchRequest {
                    keyword: search_args.keyword.clone(),
                    options: args::query_options_from_args(&search_args),
                })?
            } else {
                let config = args::search_config_from_args(&search_args)?;
                engine::run_search(config)?
            };

            match search_args.format {
                OutputFormat::Text => format::print_text(&result),
                OutputFormat::Table => format::print_table(&result),
                OutputFormat::Json => {
                    serde_json::to_writer(std::io::stdout(), &result)?;
                    println!();
                    Ok(())
                }
            }
        }
        Some(Commands::Index(mut index_args)) => {
            if let Some(ref config) = cli_config {
                apply_index_config_defaults(config, &mut index_args);
            }

            let summary = if let Some(server_url) =
                effective_server_url(index_args.server.as_deref(), index_args.no_server)
            {
                let backend = HttpSearchBackend::new(server_url)?;
                backend.index()?
            } else {
                let config = args::index_config_from_args(&index_args.target)?;
                crate::index::run_index(config)?
            };

            println!(
                "Indexed {} records ({} distinct {}-grams, {} postings) using {:?} backend at {}",
                summary.documents_indexed,
                summary.ngrams_indexed,
                summary.ngram_size,
                summary.postings,
                summary.backend,
                summary.index_path.display()
            );

            Ok(())
        }
        Some(Commands::IndexInfo(mut info_args)) => {
            if let Some(ref config) = cli_config {
                apply_index_info_config_defaults(config, &mut info_args);
            }

            let summary = if let Some(server_url) =
                effective_server_url(info_args.server.as_deref(), info_args.no_server)
            {
                let backend = HttpSearchBackend::new(server_url)?;
                backend.index_info()?
            } else {
                let config = args::index_info_config_from_args(&info_args.target)?;
                crate::index::get_index_info(&config)?
            };

            match info_args.format {
                OutputFormat::Text | OutputFormat::Table => {
                    format::print_index_summary_text(&summary)
                }
                OutputFormat::Json => {
                    serde_json::to_writer(std::io::stdout(), &summary)?;
                    println!();
                    Ok(())
                }
            }
        }
        Some(Commands::Serve(mut serve_args)) => {
            if let Some(ref config) = cli_config {
                apply_serve_config_defaults(config, &mut serve_args);
            }

            let addr: SocketAddr = serve_args
                .addr
                .parse()
                .with_context(|| format!("invalid listen address {:?}", serve_args.addr))?;
            let config = args::index_config_from_args(&serve_args.target)?;
            println!("Starting addrgram HTTP server on http://{addr}");

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;

            runtime.block_on(server::run(addr, config))?;
            Ok(())
        }
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn effective_server_url(server_flag: Option<&str>, no_server: bool) -> Option<String> {
    if no_server {
        None
    } else {
        server_flag.map(|s| s.to_string())
    }
}
