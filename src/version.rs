//! Hybrid version model bridging classical four-part versions and SemVer 2.0.
//!
//! Module registries speak SemVer while the host module tree is laid out with
//! classical `Major.Minor[.Build[.Revision]]` directory names. The conversion
//! in this module is a bijection: classical versions are tagged with a
//! `SYSTEMVERSION` marker in the SemVer build metadata so they can be mapped
//! back exactly.

use log::warn;
use semver::{BuildMetadata, Prerelease, Version};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest value a single classical version part may hold.
pub const PART_MAX: u64 = 2_147_483_647;

/// Build metadata tag marking a SemVer value converted from a classical version.
const SYSTEM_VERSION_TAG: &str = "SYSTEMVERSION";

/// Tag for a two-part classical version (`M.m`, no build).
const NO_BUILD_TAG: &str = "NOBUILD";

/// Tag for a four-part classical version carrying a revision.
const HAS_REVISION_TAG: &str = "HASREVISION";

/// Errors from version and range parsing or boundary arithmetic.
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("version string is empty")]
    Empty,

    #[error("too many parts in version '{0}' (at most four)")]
    TooManyParts(String),

    #[error("invalid version '{input}': {reason}")]
    Invalid { input: String, reason: String },

    #[error("invalid version '{input}': {source}")]
    Semver {
        input: String,
        #[source]
        source: semver::Error,
    },

    #[error("invalid version range '{input}': {reason}")]
    Range { input: String, reason: String },

    #[error("cannot decrement version 0.0.0")]
    CannotDecrement,

    #[error("cannot increment the maximum version")]
    CannotIncrement,

    #[error("pre-release version '{0}' has no classical form")]
    NotClassical(String),
}

/// The smallest version, used to materialize an absent lower bound.
#[must_use]
pub fn min_version() -> Version {
    Version::new(0, 0, 0)
}

/// The defined maximum version, used to materialize an absent upper bound.
#[must_use]
pub fn max_version() -> Version {
    Version::new(PART_MAX, PART_MAX, PART_MAX)
}

/// Compare two versions by SemVer precedence (build metadata ignored).
///
/// All matching and selection in the resolver goes through this comparison,
/// so a converted `M.m` (carrying `NOBUILD` metadata) compares equal to a
/// plain `M.m.0`.
#[must_use]
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.cmp_precedence(b)
}

/// A classical `Major.Minor[.Build[.Revision]]` version.
///
/// `build` and `revision` are optional and a revision can only be present
/// when a build is. Ordering treats an absent part as smaller than zero,
/// so `1.2 < 1.2.0 < 1.2.0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SystemVersion {
    pub major: u64,
    pub minor: u64,
    pub build: Option<u64>,
    pub revision: Option<u64>,
}

impl SystemVersion {
    #[must_use]
    pub const fn new(major: u64, minor: u64) -> Self {
        Self {
            major,
            minor,
            build: None,
            revision: None,
        }
    }

    /// Parse a classical version from 2–4 dot-separated numeric parts.
    ///
    /// # Errors
    ///
    /// Returns an error for empty input, more than four parts, non-numeric
    /// parts, or parts above [`PART_MAX`].
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }

        let parts: Vec<&str> = trimmed.split('.').collect();
        if parts.len() > 4 {
            return Err(VersionError::TooManyParts(trimmed.to_string()));
        }
        if parts.len() < 2 {
            return Err(VersionError::Invalid {
                input: trimmed.to_string(),
                reason: "a classical version needs at least two parts".to_string(),
            });
        }

        let mut values = [0_u64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = parse_part(trimmed, part)?;
        }

        Ok(Self {
            major: values[0],
            minor: values[1],
            build: (parts.len() > 2).then(|| values[2]),
            revision: (parts.len() > 3).then(|| values[3]),
        })
    }

    /// Convert to the SemVer representation.
    ///
    /// Two-part versions gain a `NOBUILD` tag, four-part versions shift the
    /// build up by one and carry the revision as a numeric pre-release
    /// identifier under a `HASREVISION` tag. Numeric pre-release identifiers
    /// compare numerically, so revision ordering survives the trip.
    #[must_use]
    pub fn to_semver(&self) -> Version {
        match (self.build, self.revision) {
            (None, _) => Version {
                major: self.major,
                minor: self.minor,
                patch: 0,
                pre: Prerelease::EMPTY,
                build: tag(NO_BUILD_TAG),
            },
            (Some(build), None) => Version::new(self.major, self.minor, build),
            (Some(build), Some(revision)) => Version {
                major: self.major,
                minor: self.minor,
                patch: build + 1,
                pre: Prerelease::new(&revision.to_string())
                    .unwrap_or(Prerelease::EMPTY),
                build: tag(HAS_REVISION_TAG),
            },
        }
    }
}

impl fmt::Display for SystemVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(build) = self.build {
            write!(f, ".{build}")?;
        }
        if let Some(revision) = self.revision {
            write!(f, ".{revision}")?;
        }
        Ok(())
    }
}

impl FromStr for SystemVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_part(input: &str, part: &str) -> Result<u64, VersionError> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionError::Invalid {
            input: input.to_string(),
            reason: format!("part '{part}' is not a number"),
        });
    }
    let value: u64 = part.parse().map_err(|_| VersionError::Invalid {
        input: input.to_string(),
        reason: format!("part '{part}' is out of range"),
    })?;
    if value > PART_MAX {
        return Err(VersionError::Invalid {
            input: input.to_string(),
            reason: format!("part '{part}' exceeds {PART_MAX}"),
        });
    }
    Ok(value)
}

fn tag(marker: &str) -> BuildMetadata {
    BuildMetadata::new(&format!("{marker}.{SYSTEM_VERSION_TAG}"))
        .unwrap_or(BuildMetadata::EMPTY)
}

fn has_tag(version: &Version, marker: &str) -> bool {
    version.build.as_str().split('.').any(|part| part == marker)
}

/// Parse a version string, trying the classical form first and falling back
/// to a SemVer literal.
///
/// # Errors
///
/// Returns an error for empty input, more than four classical parts, or a
/// string that is neither a classical version nor valid SemVer.
pub fn parse_either(input: &str) -> Result<Version, VersionError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(VersionError::Empty);
    }
    match SystemVersion::parse(trimmed) {
        Ok(classical) => Ok(classical.to_semver()),
        Err(err @ VersionError::TooManyParts(_)) => Err(err),
        Err(_) => Version::parse(trimmed).map_err(|source| VersionError::Semver {
            input: trimmed.to_string(),
            source,
        }),
    }
}

/// Recover the classical version from a SemVer value.
///
/// Follows the conversion tags: no `SYSTEMVERSION` marker means the value is
/// taken directly as `M.m.p`; `NOBUILD` strips back to `M.m`; `HASREVISION`
/// undoes the build shift and restores the revision.
///
/// # Errors
///
/// Returns an error for an untagged pre-release version or a tagged value
/// whose labels do not decode.
pub fn to_classical(version: &Version) -> Result<SystemVersion, VersionError> {
    if !has_tag(version, SYSTEM_VERSION_TAG) {
        if !version.pre.is_empty() {
            return Err(VersionError::NotClassical(version.to_string()));
        }
        return Ok(SystemVersion {
            major: version.major,
            minor: version.minor,
            build: Some(version.patch),
            revision: None,
        });
    }

    if has_tag(version, NO_BUILD_TAG) {
        return Ok(SystemVersion::new(version.major, version.minor));
    }

    if has_tag(version, HAS_REVISION_TAG) {
        let revision: u64 =
            version
                .pre
                .as_str()
                .parse()
                .map_err(|_| VersionError::Invalid {
                    input: version.to_string(),
                    reason: "revision label is not a number".to_string(),
                })?;
        if version.patch == 0 {
            return Err(VersionError::Invalid {
                input: version.to_string(),
                reason: "revision-tagged version has no build to restore".to_string(),
            });
        }
        return Ok(SystemVersion {
            major: version.major,
            minor: version.minor,
            build: Some(version.patch - 1),
            revision: Some(revision),
        });
    }

    Ok(SystemVersion {
        major: version.major,
        minor: version.minor,
        build: Some(version.patch),
        revision: None,
    })
}

/// Render a version the way module version directories are named.
///
/// Uses the classical rendering when the version converts (the local scanner
/// parses directory names as classical versions), the full SemVer string
/// otherwise.
#[must_use]
pub fn directory_name(version: &Version) -> String {
    to_classical(version).map_or_else(|_| version.to_string(), |classical| classical.to_string())
}

/// Step a version down by one position, for turning an exclusive upper bound
/// into an inclusive one. Pre-release and build labels are dropped with a
/// warning.
///
/// # Errors
///
/// Returns an error when the version is already `0.0.0`.
pub fn decrement(version: &Version) -> Result<Version, VersionError> {
    let bare = strip_labels(version, "decrement");
    if bare.patch > 0 {
        Ok(Version::new(bare.major, bare.minor, bare.patch - 1))
    } else if bare.minor > 0 {
        Ok(Version::new(bare.major, bare.minor - 1, PART_MAX))
    } else if bare.major > 0 {
        Ok(Version::new(bare.major - 1, PART_MAX, PART_MAX))
    } else {
        Err(VersionError::CannotDecrement)
    }
}

/// Step a version up by one position, for turning an exclusive lower bound
/// into an inclusive one. Saturation at [`PART_MAX`] cascades into the next
/// higher field. Pre-release and build labels are dropped with a warning.
///
/// # Errors
///
/// Returns an error when every field is already at [`PART_MAX`].
pub fn increment(version: &Version) -> Result<Version, VersionError> {
    let bare = strip_labels(version, "increment");
    if bare.patch < PART_MAX {
        Ok(Version::new(bare.major, bare.minor, bare.patch + 1))
    } else if bare.minor < PART_MAX {
        Ok(Version::new(bare.major, bare.minor + 1, 0))
    } else if bare.major < PART_MAX {
        Ok(Version::new(bare.major + 1, 0, 0))
    } else {
        Err(VersionError::CannotIncrement)
    }
}

fn strip_labels(version: &Version, operation: &str) -> Version {
    if !version.pre.is_empty() || !version.build.is_empty() {
        warn!("dropping pre-release/build labels from {version} before {operation}");
    }
    Version::new(version.major, version.minor, version.patch)
}
