//! Parallel download and extraction of planned modules.
//!
//! Each plan member is streamed from the registry into the archive cache,
//! then handed to a worker thread for zip extraction into the destination
//! tree. Downloads and extractions for different modules overlap freely: one
//! module can be extracting while another is still downloading. The first
//! failure abandons the rest of the run; partial state stays on disk.

use crate::cancel::CancelToken;
use crate::plan::InstallPlan;
use crate::registry::{RegistryClient, RegistryError};
use crate::resolver::POLL_INTERVAL;
use crate::spec::ModuleSpec;
use crate::version;
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

/// Errors from the download+extract pipeline.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("{spec} has no download URI")]
    MissingDownloadUri { spec: ModuleSpec },

    #[error("{spec} is not an exact version")]
    NotRequired { spec: ModuleSpec },

    #[error("failed to open archive stream for {spec}: {source}")]
    Open {
        spec: ModuleSpec,
        #[source]
        source: RegistryError,
    },

    #[error("network error downloading {spec}: {source}")]
    Network {
        spec: ModuleSpec,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to write archive for {spec}: {source}")]
    Io {
        spec: ModuleSpec,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to save archive for {spec} to cache: {source}")]
    Persist {
        spec: ModuleSpec,
        #[source]
        source: tempfile::PersistError,
    },

    #[error("failed to extract {spec}: {source}")]
    Extract {
        spec: ModuleSpec,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("extract worker for {spec} terminated unexpectedly")]
    Worker { spec: ModuleSpec },

    #[error("installation cancelled")]
    Cancelled,
}

impl InstallError {
    /// Wrap an IO error with spec context for use in `map_err`.
    fn wrap_io(spec: &ModuleSpec) -> impl Fn(std::io::Error) -> Self {
        let spec = spec.clone();
        move |source| Self::Io {
            spec: spec.clone(),
            source,
        }
    }

    /// Wrap a network error with spec context for use in `map_err`.
    fn wrap_network(spec: &ModuleSpec) -> impl Fn(reqwest::Error) -> Self {
        let spec = spec.clone();
        move |source| Self::Network {
            spec: spec.clone(),
            source,
        }
    }
}

enum Step {
    Downloaded((ModuleSpec, Result<PathBuf, InstallError>)),
    Extracted((ModuleSpec, Result<(), InstallError>)),
}

/// Materializes an install plan on disk.
#[derive(Debug)]
pub struct Installer {
    client: Arc<RegistryClient>,
    destination: PathBuf,
    cache_dir: PathBuf,
}

impl Installer {
    #[must_use]
    pub fn new(client: Arc<RegistryClient>, destination: PathBuf, cache_dir: PathBuf) -> Self {
        Self {
            client,
            destination,
            cache_dir,
        }
    }

    /// Download and extract every plan member.
    ///
    /// # Errors
    ///
    /// Returns the first failure; remaining downloads are aborted and no new
    /// extract worker starts afterwards.
    pub async fn install(
        &self,
        plan: &InstallPlan,
        cancel: &CancelToken,
    ) -> Result<(), InstallError> {
        let mut downloads: FuturesUnordered<
            BoxFuture<'static, (ModuleSpec, Result<PathBuf, InstallError>)>,
        > = FuturesUnordered::new();
        let mut extractions: FuturesUnordered<
            BoxFuture<'static, (ModuleSpec, Result<(), InstallError>)>,
        > = FuturesUnordered::new();

        for member in plan.members() {
            downloads.push(self.download_task(member.clone()));
        }

        loop {
            if cancel.is_cancelled() {
                return Err(InstallError::Cancelled);
            }
            if downloads.is_empty() && extractions.is_empty() {
                break;
            }

            let step = timeout(POLL_INTERVAL, async {
                tokio::select! {
                    Some(done) = downloads.next(), if !downloads.is_empty() => Step::Downloaded(done),
                    Some(done) = extractions.next(), if !extractions.is_empty() => Step::Extracted(done),
                }
            })
            .await;

            match step {
                Err(_) => continue,
                Ok(Step::Downloaded((spec, Ok(archive)))) => {
                    debug!("downloaded {spec} to {}", archive.display());
                    extractions.push(self.extract_task(spec, archive));
                }
                Ok(Step::Downloaded((_, Err(err)))) => return Err(err),
                Ok(Step::Extracted((spec, Ok(())))) => {
                    debug!("extracted {spec}");
                }
                Ok(Step::Extracted((_, Err(err)))) => return Err(err),
            }
        }

        Ok(())
    }

    fn download_task(
        &self,
        spec: ModuleSpec,
    ) -> BoxFuture<'static, (ModuleSpec, Result<PathBuf, InstallError>)> {
        let client = Arc::clone(&self.client);
        let cache_dir = self.cache_dir.clone();
        async move {
            let result = download_archive(&client, &cache_dir, &spec).await;
            (spec, result)
        }
        .boxed()
    }

    /// Hand a cached archive to a worker thread for extraction. Zip
    /// extraction is synchronous and CPU-bound, so it runs on the rayon pool
    /// instead of blocking the driver.
    fn extract_task(
        &self,
        spec: ModuleSpec,
        archive: PathBuf,
    ) -> BoxFuture<'static, (ModuleSpec, Result<(), InstallError>)> {
        let target = self
            .destination
            .join(&spec.name)
            .join(version_dir(&spec));
        let (tx, rx) = tokio::sync::oneshot::channel();
        let worker_spec = spec.clone();
        rayon::spawn(move || {
            let result = extract_archive(&archive, &target)
                .map_err(|source| InstallError::Extract {
                    spec: worker_spec,
                    source,
                });
            let _ = tx.send(result);
        });

        async move {
            match rx.await {
                Ok(result) => (spec, result),
                Err(_) => {
                    let err = InstallError::Worker { spec: spec.clone() };
                    (spec, Err(err))
                }
            }
        }
        .boxed()
    }
}

/// Stream one archive into the cache, staging through a temp file so the
/// final `.nupkg` appears atomically.
async fn download_archive(
    client: &RegistryClient,
    cache_dir: &Path,
    spec: &ModuleSpec,
) -> Result<PathBuf, InstallError> {
    if spec.required().is_none() {
        return Err(InstallError::NotRequired { spec: spec.clone() });
    }
    let Some(uri) = spec.download_uri.as_deref() else {
        return Err(InstallError::MissingDownloadUri { spec: spec.clone() });
    };

    let response = client
        .open_archive(uri, &spec.name)
        .await
        .map_err(|source| InstallError::Open {
            spec: spec.clone(),
            source,
        })?;

    tokio::fs::create_dir_all(cache_dir)
        .await
        .map_err(InstallError::wrap_io(spec))?;
    let cache_path = cache_dir.join(archive_file_name(spec));

    let temp_file =
        tempfile::NamedTempFile::new_in(cache_dir).map_err(InstallError::wrap_io(spec))?;
    {
        let file_std = temp_file
            .as_file()
            .try_clone()
            .map_err(InstallError::wrap_io(spec))?;
        let mut file = tokio::fs::File::from_std(file_std);

        let mut stream = response.bytes_stream();
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(InstallError::wrap_network(spec))?;
            file.write_all(&chunk)
                .await
                .map_err(InstallError::wrap_io(spec))?;
        }

        file.flush().await.map_err(InstallError::wrap_io(spec))?;
    } // Reader and writer are released here, before extraction starts.

    temp_file
        .persist(&cache_path)
        .map_err(|source| InstallError::Persist {
            spec: spec.clone(),
            source,
        })?;

    Ok(cache_path)
}

fn extract_archive(archive: &Path, target: &Path) -> Result<(), zip::result::ZipError> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    std::fs::create_dir_all(target)?;
    zip.extract(target)
}

fn version_dir(spec: &ModuleSpec) -> String {
    spec.required()
        .map_or_else(|| spec.min.to_string(), version::directory_name)
}

/// Cache file name: `{Name}.{Version}.nupkg`.
fn archive_file_name(spec: &ModuleSpec) -> String {
    format!("{}.{}.nupkg", spec.name, version_dir(spec))
}
