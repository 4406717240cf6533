//! The `plan` command: resolve and print, without touching the disk.

use anyhow::{Context, Result};
use gantry::{cancel, Config, ModuleStore, RegistryClient, Resolver};
use std::sync::Arc;

pub struct Options {
    pub specs: Vec<String>,
    pub source: Option<String>,
    pub prerelease: bool,
    pub update: bool,
    pub json: bool,
}

pub async fn run(options: Options) -> Result<()> {
    let config = Config::load()?;
    let source = options.source.unwrap_or_else(|| config.source());
    let prerelease = options.prerelease || config.prerelease();

    let specs = super::normalize_specs(&options.specs)?;

    let client = Arc::new(
        RegistryClient::with_timeout(&source, config.timeout())
            .context("failed to create registry client")?,
    );
    let store = ModuleStore::from_env();

    let (handle, token) = cancel::token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let resolver = Resolver::new(client, store)
        .with_prerelease(prerelease)
        .with_update(options.update);
    let resolution = resolver.resolve(&specs, &token).await?;

    if options.json {
        let members = resolution.plan.members();
        println!("{}", serde_json::to_string_pretty(&members)?);
        return Ok(());
    }

    for spec in &resolution.satisfied_locally {
        println!("{spec} (already installed)");
    }
    for member in resolution.plan.members() {
        let uri = member.download_uri.as_deref().unwrap_or("-");
        println!("{member} {uri}");
    }
    Ok(())
}
