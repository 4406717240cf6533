//! Gantry CLI internal library code

/// Default NuGet v3 module registry endpoint.
pub const DEFAULT_SOURCE: &str = "https://pwsh.gallery/index.json";

/// Identifying user agent sent with every registry request.
///
/// The registry keys trimmed, dependency-only registration documents off this
/// header; without it responses are larger but still well-formed.
#[must_use]
pub fn user_agent() -> String {
    format!("gantry/{}", env!("CARGO_PKG_VERSION"))
}

pub mod cancel;
pub mod config;
pub mod env_vars;
pub mod installer;
pub mod plan;
pub mod range;
pub mod registry;
pub mod resolver;
pub mod spec;
pub mod store;
pub mod version;

// Re-export common types for convenience
pub use cancel::{CancelHandle, CancelToken};
pub use config::Config;
pub use installer::{InstallError, Installer};
pub use plan::InstallPlan;
pub use range::VersionRange;
pub use registry::{
    CatalogEntry, DependencyEntry, RegistrationIndex, RegistrationLeaf, RegistrationPage,
    RegistryClient, RegistryError,
};
pub use resolver::{Resolution, ResolveError, Resolver};
pub use spec::{HostModuleSpec, ModuleSpec, SpecError, SpecInput};
pub use store::{ModuleStore, StoreError};
pub use version::{SystemVersion, VersionError};
