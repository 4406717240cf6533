//! Module identity plus version constraint.
//!
//! A [`ModuleSpec`] names a module, optionally pins it to a GUID, and bounds
//! the acceptable versions with an inclusive `[min, max]` window. Resolver
//! outputs are "required" specs (`min == max`) carrying a download URI.

use crate::range::VersionRange;
use crate::version::{self, VersionError};
use semver::Version;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Errors from building or normalizing a module spec.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("invalid GUID '{guid}' for module {module}")]
    InvalidGuid { module: String, guid: String },

    #[error("a GUID requires an exact version on module {module}")]
    GuidRequiresExact { module: String },

    #[error("module spec '{0}' has an empty name")]
    EmptyName(String),
}

/// A module name with an inclusive version window.
///
/// Equality and hashing are structural on `(name, guid, min, max)`; the
/// download URI is carried along but never part of identity.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleSpec {
    pub name: String,
    pub guid: Uuid,
    pub min: Version,
    pub max: Version,
    pub download_uri: Option<String>,
}

impl ModuleSpec {
    /// A spec accepting any version of `name`.
    #[must_use]
    pub fn any(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            guid: Uuid::nil(),
            min: version::min_version(),
            max: version::max_version(),
            download_uri: None,
        }
    }

    /// A required spec pinned to exactly `version`.
    #[must_use]
    pub fn exact(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            guid: Uuid::nil(),
            min: version.clone(),
            max: version,
            download_uri: None,
        }
    }

    /// Materialize a parsed range into a spec: absent bounds become the
    /// defined minimum/maximum, exclusive bounds step inward by one position.
    ///
    /// # Errors
    ///
    /// Returns an error when an exclusive bound cannot be stepped (already at
    /// an extreme).
    pub fn from_range(name: impl Into<String>, range: &VersionRange) -> Result<Self, VersionError> {
        let min = match &range.min {
            None => version::min_version(),
            Some(v) if range.min_inclusive => v.clone(),
            Some(v) => version::increment(v)?,
        };
        let max = match &range.max {
            None => version::max_version(),
            Some(v) if range.max_inclusive => v.clone(),
            Some(v) => version::decrement(v)?,
        };
        Ok(Self {
            name: name.into(),
            guid: Uuid::nil(),
            min,
            max,
            download_uri: None,
        })
    }

    #[must_use]
    pub fn with_guid(mut self, guid: Uuid) -> Self {
        self.guid = guid;
        self
    }

    #[must_use]
    pub fn with_download_uri(mut self, uri: impl Into<String>) -> Self {
        self.download_uri = Some(uri.into());
        self
    }

    /// The pinned version when `min == max`.
    #[must_use]
    pub fn required(&self) -> Option<&Version> {
        (version::compare(&self.min, &self.max) == Ordering::Equal).then_some(&self.min)
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required().is_some()
    }

    /// Whether the spec constrains the lower bound at all.
    #[must_use]
    pub fn has_min(&self) -> bool {
        version::compare(&self.min, &version::min_version()) == Ordering::Greater
    }

    /// Whether the spec constrains the upper bound at all.
    #[must_use]
    pub fn has_max(&self) -> bool {
        version::compare(&self.max, &version::max_version()) == Ordering::Less
    }

    /// `min ≤ v ≤ max` under precedence comparison.
    #[must_use]
    pub fn matches(&self, candidate: &Version) -> bool {
        version::compare(&self.min, candidate).is_le()
            && version::compare(&self.max, candidate).is_ge()
    }

    /// Whether two specs name the same module (names compared
    /// case-insensitively, GUIDs exactly).
    #[must_use]
    pub fn same_module(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name) && self.guid == other.guid
    }

    /// Whether the version windows of two specs for the same module overlap.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.same_module(other)
            && version::compare(&self.min, &other.max).is_lt()
            && version::compare(&self.max, &other.min).is_gt()
    }

    /// Structural containment: `other`'s window fits inside this spec's.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.same_module(other)
            && version::compare(&other.min, &self.min).is_ge()
            && version::compare(&other.max, &self.max).is_le()
    }

    /// Trichotomic position of the spec relative to a bare version:
    /// `Equal` when the version is inside the window, `Greater` when the spec
    /// demands something newer, `Less` when it demands something older.
    #[must_use]
    pub fn compare_version(&self, candidate: &Version) -> Ordering {
        if self.matches(candidate) {
            Ordering::Equal
        } else if version::compare(candidate, &self.min).is_lt() {
            Ordering::Greater
        } else {
            Ordering::Less
        }
    }

    /// Project onto the host module-specification shape.
    #[must_use]
    pub fn to_host_spec(&self) -> HostModuleSpec {
        let guid = (!self.guid.is_nil()).then(|| self.guid.to_string());
        if let Some(required) = self.required() {
            return HostModuleSpec {
                module_name: self.name.clone(),
                required_version: Some(version::directory_name(required)),
                module_version: None,
                maximum_version: None,
                guid,
            };
        }
        if !self.has_min() && !self.has_max() {
            return HostModuleSpec {
                module_name: self.name.clone(),
                required_version: None,
                module_version: Some("0.0.0".to_string()),
                maximum_version: None,
                guid,
            };
        }
        HostModuleSpec {
            module_name: self.name.clone(),
            required_version: None,
            module_version: self
                .has_min()
                .then(|| version::directory_name(&self.min)),
            maximum_version: self
                .has_max()
                .then(|| version::directory_name(&self.max)),
            guid,
        }
    }
}

impl fmt::Display for ModuleSpec {
    /// Canonical form: `Name[guid]` plus `@req`, `>min`, `<max`, `:min-max`,
    /// or nothing when unconstrained.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.guid.is_nil() {
            write!(f, "[{}]", self.guid)?;
        }
        if let Some(required) = self.required() {
            return write!(f, "@{required}");
        }
        match (self.has_min(), self.has_max()) {
            (false, false) => Ok(()),
            (true, false) => write!(f, ">{}", self.min),
            (false, true) => write!(f, "<{}", self.max),
            (true, true) => write!(f, ":{}-{}", self.min, self.max),
        }
    }
}

impl PartialEq for ModuleSpec {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.guid == other.guid
            && self.min == other.min
            && self.max == other.max
    }
}

impl Eq for ModuleSpec {}

impl Hash for ModuleSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

/// The host package manager's module-specification shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostModuleSpec {
    pub module_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
}

/// User input naming a module, before normalization.
///
/// The CLI accepts bare names, `Name@Version`, `Name@<range literal>`, the
/// canonical `Name>v` / `Name<v` / `Name:lo-hi` forms, and full records.
#[derive(Debug, Clone)]
pub enum SpecInput {
    Literal(String),
    Record {
        name: String,
        guid: Option<String>,
        version: Option<String>,
        maximum_version: Option<String>,
        required_version: Option<String>,
    },
}

impl SpecInput {
    /// Normalize the input into a [`ModuleSpec`].
    ///
    /// # Errors
    ///
    /// Returns an error for empty names, malformed versions or ranges, bad
    /// GUIDs, or a GUID on a non-exact constraint.
    pub fn normalize(&self) -> Result<ModuleSpec, SpecError> {
        match self {
            Self::Literal(raw) => parse_literal(raw),
            Self::Record {
                name,
                guid,
                version,
                maximum_version,
                required_version,
            } => normalize_record(
                name,
                guid.as_deref(),
                version.as_deref(),
                maximum_version.as_deref(),
                required_version.as_deref(),
            ),
        }
    }
}

impl FromStr for ModuleSpec {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_literal(s)
    }
}

fn parse_literal(raw: &str) -> Result<ModuleSpec, SpecError> {
    let trimmed = raw.trim();
    let (name_part, rest) = match trimmed.find(['@', '>', '<', ':']) {
        Some(at) => (&trimmed[..at], Some((&trimmed[at..at + 1], &trimmed[at + 1..]))),
        None => (trimmed, None),
    };

    let (name, guid) = split_guid(name_part)?;
    if name.is_empty() {
        return Err(SpecError::EmptyName(trimmed.to_string()));
    }

    let spec = match rest {
        None => ModuleSpec::any(name),
        Some(("@", value)) => {
            if value.starts_with('[') || value.starts_with('(') {
                let range = VersionRange::parse(value)?;
                ModuleSpec::from_range(name, &range)?
            } else {
                ModuleSpec::exact(name, version::parse_either(value)?)
            }
        }
        Some((">", value)) => {
            let mut spec = ModuleSpec::any(name);
            spec.min = version::parse_either(value)?;
            spec
        }
        Some(("<", value)) => {
            let mut spec = ModuleSpec::any(name);
            spec.max = version::parse_either(value)?;
            spec
        }
        Some((_, value)) => {
            let (low, high) = value.split_once('-').ok_or_else(|| VersionError::Range {
                input: value.to_string(),
                reason: "expected 'min-max'".to_string(),
            })?;
            let mut spec = ModuleSpec::any(name);
            spec.min = version::parse_either(low)?;
            spec.max = version::parse_either(high)?;
            spec
        }
    };

    apply_guid(spec, guid)
}

/// Split a trailing `[guid]` segment off a module name.
fn split_guid(name_part: &str) -> Result<(&str, Option<&str>), SpecError> {
    let Some(open) = name_part.find('[') else {
        return Ok((name_part, None));
    };
    if !name_part.ends_with(']') {
        return Err(SpecError::InvalidGuid {
            module: name_part.to_string(),
            guid: name_part[open..].to_string(),
        });
    }
    Ok((
        &name_part[..open],
        Some(&name_part[open + 1..name_part.len() - 1]),
    ))
}

fn apply_guid(spec: ModuleSpec, guid: Option<&str>) -> Result<ModuleSpec, SpecError> {
    let Some(raw) = guid else { return Ok(spec) };
    let guid = Uuid::parse_str(raw).map_err(|_| SpecError::InvalidGuid {
        module: spec.name.clone(),
        guid: raw.to_string(),
    })?;
    if guid.is_nil() {
        return Ok(spec);
    }
    if !spec.is_required() {
        return Err(SpecError::GuidRequiresExact {
            module: spec.name.clone(),
        });
    }
    Ok(spec.with_guid(guid))
}

fn normalize_record(
    name: &str,
    guid: Option<&str>,
    version_field: Option<&str>,
    maximum_version: Option<&str>,
    required_version: Option<&str>,
) -> Result<ModuleSpec, SpecError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SpecError::EmptyName(name.to_string()));
    }

    let spec = if let Some(required) = required_version {
        ModuleSpec::exact(name, version::parse_either(required)?)
    } else {
        let mut spec = ModuleSpec::any(name);
        if let Some(minimum) = version_field {
            spec.min = version::parse_either(minimum)?;
        }
        if let Some(maximum) = maximum_version {
            spec.max = version::parse_either(maximum)?;
        }
        spec
    };

    apply_guid(spec, guid)
}
