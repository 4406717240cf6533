//! Local module tree scanning.
//!
//! Short-circuits resolution when a satisfying module is already installed
//! somewhere on the host's module search path. Version directories are named
//! with classical versions, so pre-release installs are never matched here.

use crate::spec::ModuleSpec;
use crate::version::{self, SystemVersion};
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from scanning the local module tree.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("module directory {dir} exists but manifest {manifest} is missing")]
    CorruptModule { dir: PathBuf, manifest: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Scans a list of module roots laid out as `{root}/{Name}/{Version}/`.
#[derive(Debug, Clone)]
pub struct ModuleStore {
    search_paths: Vec<PathBuf>,
}

impl ModuleStore {
    #[must_use]
    pub const fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Build the store from the host module path environment variable,
    /// skipping empty entries.
    #[must_use]
    pub fn from_env() -> Self {
        let search_paths = crate::env_vars::module_path()
            .map(|raw| {
                std::env::split_paths(&raw)
                    .filter(|path| !path.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self { search_paths }
    }

    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Find an installed module satisfying `spec`, returning its manifest
    /// path.
    ///
    /// Required specs probe the exact version directory; range specs take the
    /// highest installed version inside the window. Directory names that do
    /// not parse as classical versions are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CorruptModule`] when a matching version
    /// directory exists without its manifest, or an IO error when a module
    /// directory cannot be read.
    pub fn find_local(&self, spec: &ModuleSpec) -> Result<Option<PathBuf>, StoreError> {
        for root in &self.search_paths {
            let module_dir = root.join(&spec.name);

            if let Some(required) = spec.required() {
                let version_dir = module_dir.join(version::directory_name(required));
                if !version_dir.is_dir() {
                    continue;
                }
                return manifest_in(&version_dir, &spec.name).map(Some);
            }

            if !module_dir.is_dir() {
                continue;
            }
            if let Some(version_dir) = highest_matching_dir(&module_dir, spec)? {
                return manifest_in(&version_dir, &spec.name).map(Some);
            }
        }
        Ok(None)
    }
}

/// The manifest path inside a version directory, or a corruption error when
/// the directory exists without one.
fn manifest_in(version_dir: &Path, name: &str) -> Result<PathBuf, StoreError> {
    let manifest = version_dir.join(format!("{name}.psd1"));
    if manifest.is_file() {
        Ok(manifest)
    } else {
        Err(StoreError::CorruptModule {
            dir: version_dir.to_path_buf(),
            manifest,
        })
    }
}

fn highest_matching_dir(
    module_dir: &Path,
    spec: &ModuleSpec,
) -> Result<Option<PathBuf>, StoreError> {
    let mut best: Option<(SystemVersion, PathBuf)> = None;

    for entry in fs::read_dir(module_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(dir_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let classical = match SystemVersion::parse(dir_name) {
            Ok(classical) => classical,
            Err(err) => {
                warn!(
                    "skipping version directory '{}' under {}: {err}",
                    dir_name,
                    module_dir.display()
                );
                continue;
            }
        };
        if !spec.matches(&classical.to_semver()) {
            continue;
        }
        if best
            .as_ref()
            .is_none_or(|(current, _)| classical > *current)
        {
            best = Some((classical, path));
        }
    }

    Ok(best.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn install_fixture(root: &Path, name: &str, version: &str, with_manifest: bool) {
        let dir = root.join(name).join(version);
        fs::create_dir_all(&dir).unwrap();
        if with_manifest {
            File::create(dir.join(format!("{name}.psd1"))).unwrap();
        }
    }

    fn spec(input: &str) -> ModuleSpec {
        input.parse().unwrap()
    }

    #[test]
    fn required_spec_probes_exact_directory() {
        let temp = TempDir::new().unwrap();
        install_fixture(temp.path(), "Pester", "5.5.0", true);

        let store = ModuleStore::new(vec![temp.path().to_path_buf()]);
        let manifest = store.find_local(&spec("Pester@5.5.0")).unwrap().unwrap();
        assert!(manifest.ends_with("Pester/5.5.0/Pester.psd1"));

        assert!(store.find_local(&spec("Pester@5.6.0")).unwrap().is_none());
    }

    #[test]
    fn range_spec_takes_highest_match() {
        let temp = TempDir::new().unwrap();
        install_fixture(temp.path(), "Pester", "4.10.1", true);
        install_fixture(temp.path(), "Pester", "5.5.0", true);
        install_fixture(temp.path(), "Pester", "5.6.1", true);

        let store = ModuleStore::new(vec![temp.path().to_path_buf()]);
        let manifest = store
            .find_local(&spec("Pester:4.0.0-5.5.0"))
            .unwrap()
            .unwrap();
        assert!(manifest.ends_with("Pester/5.5.0/Pester.psd1"));
    }

    #[test]
    fn unparseable_directories_are_skipped() {
        let temp = TempDir::new().unwrap();
        install_fixture(temp.path(), "Pester", "5.5.0-beta1", true);
        install_fixture(temp.path(), "Pester", "5.4.0", true);

        let store = ModuleStore::new(vec![temp.path().to_path_buf()]);
        let manifest = store.find_local(&spec("Pester")).unwrap().unwrap();
        assert!(manifest.ends_with("Pester/5.4.0/Pester.psd1"));
    }

    #[test]
    fn missing_manifest_is_corrupt() {
        let temp = TempDir::new().unwrap();
        install_fixture(temp.path(), "Pester", "5.5.0", false);

        let store = ModuleStore::new(vec![temp.path().to_path_buf()]);
        assert!(matches!(
            store.find_local(&spec("Pester@5.5.0")),
            Err(StoreError::CorruptModule { .. })
        ));
        assert!(matches!(
            store.find_local(&spec("Pester")),
            Err(StoreError::CorruptModule { .. })
        ));
    }

    #[test]
    fn later_search_paths_are_consulted() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        install_fixture(second.path(), "Pester", "5.5.0", true);

        let store = ModuleStore::new(vec![
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ]);
        assert!(store.find_local(&spec("Pester@5.5.0")).unwrap().is_some());
    }

    #[test]
    fn empty_store_finds_nothing() {
        let store = ModuleStore::new(Vec::new());
        assert!(store.find_local(&spec("Pester")).unwrap().is_none());
    }
}
