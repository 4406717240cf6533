//! The `install` command: resolve, then download and extract in parallel.

use anyhow::{Context, Result};
use gantry::{cancel, Config, Installer, ModuleStore, RegistryClient, Resolver};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub struct Options {
    pub specs: Vec<String>,
    pub source: Option<String>,
    pub destination: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub prerelease: bool,
    pub update: bool,
    pub quiet: bool,
}

pub async fn run(options: Options) -> Result<()> {
    let config = Config::load()?;
    let source = options.source.unwrap_or_else(|| config.source());
    let destination = options.destination.unwrap_or_else(|| config.destination());
    let cache_dir = options.cache_dir.unwrap_or_else(|| config.cache_dir());
    let prerelease = options.prerelease || config.prerelease();

    let specs = super::normalize_specs(&options.specs)?;

    let client = Arc::new(
        RegistryClient::with_timeout(&source, config.timeout())
            .context("failed to create registry client")?,
    );
    let store = ModuleStore::from_env();

    // One token governs the whole resolve+install run; Ctrl-C trips it.
    let (handle, token) = cancel::token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let spinner = progress_spinner(options.quiet, "Resolving modules...");
    let resolver = Resolver::new(Arc::clone(&client), store)
        .with_prerelease(prerelease)
        .with_update(options.update);
    let resolution = resolver.resolve(&specs, &token).await?;
    if let Some(spinner) = &spinner {
        spinner.finish_and_clear();
    }

    if !options.quiet {
        for spec in &resolution.satisfied_locally {
            println!("{spec} is already installed, skipping");
        }
    }

    if resolution.plan.is_empty() {
        if !options.quiet {
            println!("Nothing to install");
        }
        return Ok(());
    }

    if !options.quiet {
        println!("Installing {} modules to {}", resolution.plan.len(), destination.display());
    }

    let spinner = progress_spinner(options.quiet, "Downloading and extracting...");
    let installer = Installer::new(client, destination, cache_dir);
    let result = installer.install(&resolution.plan, &token).await;
    if let Some(spinner) = &spinner {
        spinner.finish_and_clear();
    }
    result?;

    if !options.quiet {
        for member in resolution.plan.members() {
            println!("Installed {member}");
        }
    }

    Ok(())
}

fn progress_spinner(quiet: bool, message: &'static str) -> Option<ProgressBar> {
    if quiet {
        return None;
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    Some(spinner)
}
