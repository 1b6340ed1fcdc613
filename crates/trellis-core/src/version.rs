//! Plugin versions and dependency version requirements.
//!
//! Requirements are evaluated against a fixed policy table rather than full
//! semver range matching. Three forms are accepted:
//!
//! | Form      | Matches when                                              |
//! |-----------|-----------------------------------------------------------|
//! | `X.Y.Z`   | installed is exactly `X.Y.Z`                              |
//! | `^X.Y.Z`  | same major, and (minor > Y, or minor == Y and patch >= Z) |
//! | `>=X.Y.Z` | installed >= `X.Y.Z` comparing (major, minor, patch)      |
//!
//! Anything else is [`VersionError::UnsupportedSpec`]. Unknown forms never
//! match silently.

use std::cmp::Ordering;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing versions and version requirements.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// Wrong shape (expected "major.minor.patch").
    #[error("invalid version format: {0} (expected major.minor.patch)")]
    InvalidFormat(String),

    /// A numeric segment could not be parsed.
    #[error("invalid version number in {input}: {source}")]
    InvalidNumber {
        /// The full input string.
        input: String,
        /// The underlying integer parse failure.
        #[source]
        source: ParseIntError,
    },

    /// The requirement uses an operator outside the policy table, or a
    /// version string in a compatibility check is unparseable.
    #[error("unsupported version spec: {0}")]
    UnsupportedSpec(String),
}

/// Semantic version: three non-negative integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Major version - breaking changes
    pub major: u32,
    /// Minor version - new features, backwards compatible
    pub minor: u32,
    /// Patch version - bug fixes, backwards compatible
    pub patch: u32,
}

impl Version {
    /// Creates a new version.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version from a string like "1.2.3".
    ///
    /// Segments must be plain decimal digits without leading zeros, so two
    /// versions are equal exactly when their canonical strings are equal.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not in "major.minor.patch" format.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        s.parse()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.major.cmp(&other.major) {
            Ordering::Equal => match self.minor.cmp(&other.minor) {
                Ordering::Equal => self.patch.cmp(&other.patch),
                ord => ord,
            },
            ord => ord,
        }
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parts: Vec<&str> = trimmed.split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(VersionError::InvalidFormat(s.to_string()));
        };
        Ok(Self {
            major: parse_segment(major, s)?,
            minor: parse_segment(minor, s)?,
            patch: parse_segment(patch, s)?,
        })
    }
}

fn parse_segment(part: &str, input: &str) -> Result<u32, VersionError> {
    let digits_only = !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    let leading_zero = part.len() > 1 && part.starts_with('0');
    if !digits_only || leading_zero {
        return Err(VersionError::InvalidFormat(input.to_string()));
    }
    part.parse().map_err(|source| VersionError::InvalidNumber {
        input: input.to_string(),
        source,
    })
}

/// A dependency version requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionReq {
    /// `X.Y.Z`: exactly this version.
    Exact(Version),
    /// `^X.Y.Z`: same major, not older within it.
    Caret(Version),
    /// `>=X.Y.Z`: this version or anything newer.
    AtLeast(Version),
}

impl VersionReq {
    /// Parse a requirement string.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::UnsupportedSpec`] for any operator outside
    /// the policy table (`~`, `<`, `*`, ranges, wildcards) or when the
    /// version part does not parse.
    pub fn parse(spec: &str) -> Result<Self, VersionError> {
        let spec = spec.trim();
        let unsupported = || VersionError::UnsupportedSpec(spec.to_string());

        if let Some(rest) = spec.strip_prefix(">=") {
            return Version::parse(rest)
                .map(Self::AtLeast)
                .map_err(|_| unsupported());
        }
        if let Some(rest) = spec.strip_prefix('^') {
            return Version::parse(rest)
                .map(Self::Caret)
                .map_err(|_| unsupported());
        }
        Version::parse(spec)
            .map(Self::Exact)
            .map_err(|_| unsupported())
    }

    /// Check an installed version against this requirement.
    #[must_use]
    pub fn matches(&self, installed: &Version) -> bool {
        match self {
            Self::Exact(required) => installed == required,
            Self::Caret(required) => {
                installed.major == required.major
                    && (installed.minor > required.minor
                        || (installed.minor == required.minor
                            && installed.patch >= required.patch))
            },
            Self::AtLeast(required) => installed >= required,
        }
    }
}

impl FromStr for VersionReq {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "{v}"),
            Self::Caret(v) => write!(f, "^{v}"),
            Self::AtLeast(v) => write!(f, ">={v}"),
        }
    }
}

/// Check whether an installed version string satisfies a requirement string.
///
/// Both sides must parse; an unparseable installed version is reported as
/// [`VersionError::UnsupportedSpec`] rather than treated as a mismatch.
///
/// # Errors
///
/// Returns [`VersionError::UnsupportedSpec`] if either string is outside
/// the supported forms.
pub fn check_compatibility(required: &str, installed: &str) -> Result<bool, VersionError> {
    let req = VersionReq::parse(required)?;
    let installed = Version::parse(installed)
        .map_err(|_| VersionError::UnsupportedSpec(installed.trim().to_string()))?;
    Ok(req.matches(&installed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parse_valid() {
        assert_eq!(Version::parse("1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(Version::parse("  10.20.30  ").unwrap(), Version::new(10, 20, 30));
        assert_eq!(Version::parse("0.0.0").unwrap(), Version::new(0, 0, 0));
    }

    #[test]
    fn version_parse_invalid() {
        for input in ["1.2", "1.2.3.4", "abc", "1.two.3", "", "+1.2.3", "1.-2.3", "01.2.3", "1..3"] {
            assert!(Version::parse(input).is_err(), "{input:?} should not parse");
        }
    }

    #[test]
    fn version_number_overflow_reports_source() {
        let err = Version::parse("99999999999.0.0").unwrap_err();
        assert!(matches!(err, VersionError::InvalidNumber { .. }));
    }

    #[test]
    fn version_ordering_is_lexicographic() {
        assert!(Version::new(1, 0, 0) < Version::new(1, 0, 1));
        assert!(Version::new(1, 9, 9) < Version::new(2, 0, 0));
        assert!(Version::new(0, 10, 0) > Version::new(0, 9, 99));
    }

    // -- Policy table --

    #[test]
    fn caret_accepts_newer_minor() {
        assert!(check_compatibility("^1.2.0", "1.3.0").unwrap());
    }

    #[test]
    fn caret_rejects_next_major() {
        assert!(!check_compatibility("^1.2.0", "2.0.0").unwrap());
    }

    #[test]
    fn caret_patch_rules() {
        assert!(check_compatibility("^1.2.3", "1.2.3").unwrap());
        assert!(check_compatibility("^1.2.3", "1.2.9").unwrap());
        assert!(!check_compatibility("^1.2.3", "1.2.2").unwrap());
        assert!(!check_compatibility("^1.2.3", "1.1.9").unwrap());
        // A newer minor wins regardless of patch.
        assert!(check_compatibility("^1.2.3", "1.3.0").unwrap());
    }

    #[test]
    fn at_least_compares_tuples() {
        assert!(!check_compatibility(">=1.0.0", "0.9.9").unwrap());
        assert!(check_compatibility(">=1.0.0", "1.0.0").unwrap());
        assert!(check_compatibility(">=1.0.0", "3.0.0").unwrap());
    }

    #[test]
    fn exact_requires_equality() {
        assert!(check_compatibility("1.4.2", "1.4.2").unwrap());
        assert!(!check_compatibility("1.4.2", "1.4.3").unwrap());
    }

    #[test]
    fn other_operators_are_unsupported() {
        for spec in ["~1.2.0", "<2.0.0", "*", "1.x", ">1.0.0", "=1.0.0", "^1.2", "latest", ""] {
            assert!(
                matches!(
                    check_compatibility(spec, "1.2.0"),
                    Err(VersionError::UnsupportedSpec(_))
                ),
                "{spec:?} should be unsupported"
            );
        }
    }

    #[test]
    fn unparseable_installed_version_is_unsupported() {
        assert_eq!(
            check_compatibility("^1.0.0", "1.0"),
            Err(VersionError::UnsupportedSpec("1.0".into()))
        );
    }

    #[test]
    fn requirement_display_round_trips() {
        for spec in ["1.0.0", "^2.3.4", ">=0.1.0"] {
            assert_eq!(VersionReq::parse(spec).unwrap().to_string(), spec);
        }
    }
}
