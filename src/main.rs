//! `chem-search` command line: serve the API or manage the search index.

use std::path::PathBuf;
use std::process::ExitCode;

use chem_search::commands::{self, BootstrapOptions};
use chem_search::{LifecycleState, ServerConfig};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "chem-search")]
#[command(about = "Chemical reference search service and index tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve,

    /// Build the index configuration and write it under the cache root
    Bootstrap {
        /// Cache root, overrides CHEM_SEARCH_CACHE_PATH
        #[arg(long)]
        cache_path: Option<PathBuf>,

        /// Component file-name prefix, e.g. cc-full or cc-abbrev
        #[arg(long)]
        prefix: Option<String>,

        /// YAML profile with builder overrides
        #[arg(long)]
        profile: Option<PathBuf>,
    },

    /// Run all rebuild stages against the toolkit sidecar
    Rebuild,

    /// Check that the committed index loads and answers
    Verify,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = ServerConfig::load()?;

    server::init_tracing(&config.log_level);

    match cli.command {
        Command::Serve => {
            server::start_server(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Bootstrap {
            cache_path,
            prefix,
            profile,
        } => {
            let options = BootstrapOptions {
                cache_path,
                cc_prefix: prefix,
                profile,
            };
            let (_, path) = commands::bootstrap(&config, &options)?;
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Rebuild => {
            let lifecycle = commands::remote_lifecycle(&config)?;
            let summary = commands::rebuild(&lifecycle, &config.index_config_path()).await?;
            println!("{}", serde_json::to_string_pretty(&summary.status)?);
            println!("rebuild {:?} in {:.1}s", summary.state, summary.elapsed.as_secs_f64());
            Ok(match summary.state {
                LifecycleState::Ready => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            })
        }
        Command::Verify => {
            let lifecycle = commands::remote_lifecycle(&config)?;
            let verified = commands::verify(&lifecycle, &config.index_config_path()).await?;
            println!("verified: {verified}");
            Ok(if verified {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
