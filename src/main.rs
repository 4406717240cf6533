//! Gantry command-line interface
//!
//! Fast parallel module installer for NuGet v3-style registries

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::process;

mod commands;

/// Display an error with its source chain.
fn display_error(err: &anyhow::Error) {
    eprintln!("error: {err}");
    let mut source = err.source();
    while let Some(err) = source {
        eprintln!("caused by: {err}");
        source = err.source();
    }
}

#[derive(Parser)]
#[command(name = "gantry")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A fast parallel PowerShell module installer", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and install modules
    Install {
        /// Modules to install: Name, Name@Version, or Name@<range>
        #[arg(required = true)]
        specs: Vec<String>,

        /// Registry source URL
        #[arg(long)]
        source: Option<String>,

        /// Destination module directory
        #[arg(long)]
        destination: Option<PathBuf>,

        /// Archive cache directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Include pre-release versions
        #[arg(long)]
        prerelease: bool,

        /// Resolve against the registry even when a satisfying module is
        /// installed locally
        #[arg(long)]
        update: bool,

        /// Suppress all output except errors
        #[arg(long, short)]
        quiet: bool,
    },

    /// Resolve modules and print the install plan without installing
    Plan {
        /// Modules to plan: Name, Name@Version, or Name@<range>
        #[arg(required = true)]
        specs: Vec<String>,

        /// Registry source URL
        #[arg(long)]
        source: Option<String>,

        /// Include pre-release versions
        #[arg(long)]
        prerelease: bool,

        /// Resolve against the registry even when a satisfying module is
        /// installed locally
        #[arg(long)]
        update: bool,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Install {
            specs,
            source,
            destination,
            cache_dir,
            prerelease,
            update,
            quiet,
        } => {
            commands::install::run(commands::install::Options {
                specs,
                source,
                destination,
                cache_dir,
                prerelease,
                update,
                quiet,
            })
            .await
        }
        Commands::Plan {
            specs,
            source,
            prerelease,
            update,
            json,
        } => {
            commands::plan::run(commands::plan::Options {
                specs,
                source,
                prerelease,
                update,
                json,
            })
            .await
        }
        Commands::Completion { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "gantry",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    };

    if let Err(err) = result {
        display_error(&err);
        process::exit(1);
    }
}
