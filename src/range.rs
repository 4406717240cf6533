//! NuGet version range literals.
//!
//! Ranges come in bracket notation (`[1.0,2.0)`, `(,2.0]`, `[1.0]`) or as a
//! bare version meaning an exact pin. An empty literal means "any version".

use crate::version::{self, VersionError};
use semver::Version;
use std::str::FromStr;

/// A parsed NuGet range: optional bounds plus inclusivity flags.
///
/// Brackets are inclusive, parentheses exclusive; an empty side is unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub min: Option<Version>,
    pub max: Option<Version>,
    pub min_inclusive: bool,
    pub max_inclusive: bool,
}

impl VersionRange {
    /// The unconstrained range.
    #[must_use]
    pub const fn any() -> Self {
        Self {
            min: None,
            max: None,
            min_inclusive: true,
            max_inclusive: true,
        }
    }

    /// An exact `[v, v]` pin.
    #[must_use]
    pub fn exact(version: Version) -> Self {
        Self {
            min: Some(version.clone()),
            max: Some(version),
            min_inclusive: true,
            max_inclusive: true,
        }
    }

    /// Parse a NuGet range literal.
    ///
    /// # Errors
    ///
    /// Returns an error for unbalanced brackets, an exclusive exact form, or
    /// unparseable bound versions.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::any());
        }

        let opens = trimmed.starts_with('[') || trimmed.starts_with('(');
        if !opens {
            // Bare token: exact pin.
            return Ok(Self::exact(version::parse_either(trimmed)?));
        }

        let closes = trimmed.ends_with(']') || trimmed.ends_with(')');
        if !closes || trimmed.len() < 2 {
            return Err(VersionError::Range {
                input: trimmed.to_string(),
                reason: "unbalanced brackets".to_string(),
            });
        }

        let min_inclusive = trimmed.starts_with('[');
        let max_inclusive = trimmed.ends_with(']');
        let inner = &trimmed[1..trimmed.len() - 1];

        let Some((low, high)) = inner.split_once(',') else {
            // `[v]` is the same exact pin as the bare token.
            if !(min_inclusive && max_inclusive) {
                return Err(VersionError::Range {
                    input: trimmed.to_string(),
                    reason: "an exact range must use square brackets".to_string(),
                });
            }
            return Ok(Self::exact(version::parse_either(inner)?));
        };

        let min = parse_bound(low)?;
        let max = parse_bound(high)?;
        if min.is_none() && max.is_none() {
            return Err(VersionError::Range {
                input: trimmed.to_string(),
                reason: "both bounds are empty".to_string(),
            });
        }

        Ok(Self {
            min,
            max,
            min_inclusive,
            max_inclusive,
        })
    }

    /// Whether the range pins a single version.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.min.is_some() && self.min == self.max && self.min_inclusive && self.max_inclusive
    }
}

fn parse_bound(raw: &str) -> Result<Option<Version>, VersionError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    version::parse_either(raw).map(Some)
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(input: &str) -> Version {
        version::parse_either(input).unwrap()
    }

    #[test]
    fn bare_token_is_exact() {
        let range = VersionRange::parse("1.2.3").unwrap();
        assert_eq!(range, VersionRange::exact(v("1.2.3")));
        assert!(range.is_exact());
    }

    #[test]
    fn bracketed_single_is_exact() {
        assert_eq!(
            VersionRange::parse("[1.2.3]").unwrap(),
            VersionRange::exact(v("1.2.3"))
        );
    }

    #[test]
    fn half_open_range() {
        let range = VersionRange::parse("[1.0,2.0)").unwrap();
        assert_eq!(range.min, Some(v("1.0")));
        assert_eq!(range.max, Some(v("2.0")));
        assert!(range.min_inclusive);
        assert!(!range.max_inclusive);
    }

    #[test]
    fn open_lower_bound() {
        let range = VersionRange::parse("(,2.0]").unwrap();
        assert!(range.min.is_none());
        assert_eq!(range.max, Some(v("2.0")));
        assert!(range.max_inclusive);
    }

    #[test]
    fn open_upper_bound() {
        let range = VersionRange::parse("[1.0,]").unwrap();
        assert_eq!(range.min, Some(v("1.0")));
        assert!(range.max.is_none());
    }

    #[test]
    fn exclusive_both_sides() {
        let range = VersionRange::parse("(1.0,2.0)").unwrap();
        assert!(!range.min_inclusive);
        assert!(!range.max_inclusive);
    }

    #[test]
    fn empty_means_any() {
        let range = VersionRange::parse("").unwrap();
        assert_eq!(range, VersionRange::any());
    }

    #[test]
    fn malformed_ranges_fail() {
        assert!(VersionRange::parse("[1.0,2.0").is_err());
        assert!(VersionRange::parse("(1.0)").is_err());
        assert!(VersionRange::parse("[,]").is_err());
        assert!(VersionRange::parse("[nope,2.0]").is_err());
    }
}
