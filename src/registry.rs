//! HTTP client for NuGet v3-style module registries.
//!
//! One long-lived client serves the whole run: registration index and page
//! queries during resolution, archive streams during installation. TLS is
//! rustls with ALPN, so HTTP/2 multiplexing is negotiated where the registry
//! supports it and HTTP/1.1 pooling covers the rest.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Idle connections kept per host for the HTTP/1.1 fallback case.
const MAX_IDLE_PER_HOST: usize = 100;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from registry queries.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("module not found: {module}")]
    ModuleNotFound { module: String },

    #[error("HTTP {status} error fetching {module} from {url}")]
    Status {
        module: String,
        status: u16,
        url: String,
    },

    #[error("network error fetching {module}: {source}")]
    Network {
        module: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to parse registry response for {module}: {source}")]
    Parse {
        module: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl RegistryError {
    /// Wrap a network error with module context for use in `map_err`.
    pub fn wrap_network(module: impl Into<String>) -> impl Fn(reqwest::Error) -> Self {
        let module = module.into();
        move |source| Self::Network {
            module: module.clone(),
            source,
        }
    }
}

/// A registration index: the list of version pages for one module.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationIndex {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub items: Vec<RegistrationPage>,
}

impl RegistrationIndex {
    /// Whether the document carries no pages at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0 || self.items.is_empty()
    }
}

/// One contiguous version bucket, bounded by `[lower, upper]` inclusive.
///
/// When `items` is absent the page's leaves live behind the `@id` link and
/// must be fetched separately.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationPage {
    #[serde(rename = "@id", default)]
    pub id: String,
    pub lower: String,
    pub upper: String,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub items: Option<Vec<RegistrationLeaf>>,
}

/// A per-version record inside a page.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationLeaf {
    #[serde(rename = "catalogEntry")]
    pub catalog_entry: CatalogEntry,
    #[serde(rename = "packageContent", default)]
    pub package_content: Option<String>,
}

impl RegistrationLeaf {
    /// The catalog entry with the leaf's adjacent archive URI folded in.
    ///
    /// The resolver treats the content URI as an attribute of the entry.
    #[must_use]
    pub fn into_entry(self) -> CatalogEntry {
        let mut entry = self.catalog_entry;
        if entry.package_content.is_none() {
            entry.package_content = self.package_content;
        }
        entry
    }
}

/// Catalog metadata for a single module version.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub version: String,
    #[serde(rename = "dependencyGroups", default)]
    pub dependency_groups: Vec<DependencyGroup>,
    #[serde(rename = "packageContent", default)]
    pub package_content: Option<String>,
}

impl CatalogEntry {
    /// All dependencies across groups.
    pub fn dependencies(&self) -> impl Iterator<Item = &DependencyEntry> {
        self.dependency_groups
            .iter()
            .flat_map(|group| group.dependencies.iter())
    }
}

/// Dependencies bucketed by target framework.
#[derive(Debug, Clone, Deserialize)]
pub struct DependencyGroup {
    #[serde(rename = "targetFramework", default)]
    pub target_framework: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<DependencyEntry>,
}

/// One declared dependency, in either object or compact `"id:range"` form.
///
/// Trimmed registration payloads use the compact colon-separated form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DependencyEntry {
    Entry {
        id: String,
        #[serde(default)]
        range: Option<String>,
    },
    Compact(String),
}

impl DependencyEntry {
    /// The dependency's module id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Entry { id, .. } => id,
            Self::Compact(raw) => raw.split_once(':').map_or(raw.as_str(), |(id, _)| id),
        }
    }

    /// The dependency's range literal; absent or empty means any version.
    #[must_use]
    pub fn range(&self) -> &str {
        match self {
            Self::Entry { range, .. } => range.as_deref().unwrap_or(""),
            Self::Compact(raw) => raw.split_once(':').map_or("", |(_, range)| range),
        }
    }
}

/// Client for a single registry base endpoint.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: String,
    client: reqwest::Client,
}

impl RegistryClient {
    /// Create a client for `source` with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(source: impl Into<String>) -> Result<Self, RegistryError> {
        Self::with_timeout(source, DEFAULT_TIMEOUT)
    }

    /// Create a client for `source` with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(
        source: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(crate::user_agent())
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .build()
            .map_err(RegistryError::Client)?;

        Ok(Self {
            base_url: registration_base(&source.into()),
            client,
        })
    }

    /// The normalized base URL requests are issued against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the registration index for a module.
    ///
    /// # Errors
    ///
    /// A 404 maps to [`RegistryError::ModuleNotFound`]; other non-success
    /// statuses, transport failures, and malformed JSON are wrapped with the
    /// module name.
    pub async fn fetch_index(&self, name: &str) -> Result<RegistrationIndex, RegistryError> {
        let url = format!(
            "{}/registration/{}/index.json",
            self.base_url,
            name.to_lowercase()
        );
        let body = self.fetch_text(name, &url, true).await?;
        serde_json::from_str(&body).map_err(|source| RegistryError::Parse {
            module: name.to_string(),
            source,
        })
    }

    /// Fetch a registration page by the absolute URI from its index.
    ///
    /// # Errors
    ///
    /// Non-success statuses, transport failures, and malformed JSON are
    /// wrapped with the module name.
    pub async fn fetch_page(
        &self,
        url: &str,
        module: &str,
    ) -> Result<RegistrationPage, RegistryError> {
        let body = self.fetch_text(module, url, false).await?;
        serde_json::from_str(&body).map_err(|source| RegistryError::Parse {
            module: module.to_string(),
            source,
        })
    }

    /// Open a module archive for streaming; the returned response body is
    /// still in flight.
    ///
    /// # Errors
    ///
    /// Non-success statuses and transport failures are wrapped with the
    /// module name.
    pub async fn open_archive(
        &self,
        url: &str,
        module: &str,
    ) -> Result<reqwest::Response, RegistryError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(RegistryError::wrap_network(module))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                module: module.to_string(),
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn fetch_text(
        &self,
        module: &str,
        url: &str,
        map_not_found: bool,
    ) -> Result<String, RegistryError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(RegistryError::wrap_network(module))?;

        let status = response.status();
        if map_not_found && status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::ModuleNotFound {
                module: module.to_string(),
            });
        }
        if !status.is_success() {
            return Err(RegistryError::Status {
                module: module.to_string(),
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(RegistryError::wrap_network(module))
    }
}

/// Normalize a source URL: drop a trailing slash and any trailing `*.json`
/// path component (service-index style sources point at a document, not a
/// directory).
fn registration_base(source: &str) -> String {
    let trimmed = source.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((base, last)) if last.ends_with(".json") => base.to_string(),
        _ => trimmed.to_string(),
    }
}
