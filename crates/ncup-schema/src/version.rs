//! Version types.
//!
//! - [`CoreVersion`]: the core server's dotted version (up to four numeric
//!   components, e.g. `25.0.3.2`).
//! - [`VersionRange`]: a release range expression as used by the remote app
//!   index (`>=25 <=27`) and by operator pins.
//! - [`AppVersion`]: an app's version inside change records, where apps
//!   shipped with the core have no version of their own.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::{Version, VersionReq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors produced while parsing version strings and range expressions.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// A core version had no components, too many, or a non-numeric one.
    #[error("Invalid core version '{0}': expected 1 to 4 numeric components")]
    InvalidCoreVersion(String),

    /// A range expression could not be parsed.
    #[error("Invalid version range '{expr}': {reason}")]
    InvalidRange {
        /// The expression as given.
        expr: String,
        /// Parser diagnostic.
        reason: String,
    },
}

/// Version of the core server application.
///
/// Keeps the components exactly as written (`15` stays `15`), while
/// comparisons treat missing components as zero (`15 == 15.0.0.0`).
#[derive(Debug, Clone)]
pub struct CoreVersion {
    parts: Vec<u64>,
}

impl CoreVersion {
    const MAX_PARTS: usize = 4;

    /// Parse a dotted version with one to four numeric components.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::InvalidCoreVersion`] if the string is empty,
    /// has more than four components, or any component is not a number.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let parts = s
            .trim()
            .split('.')
            .map(str::parse::<u64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VersionError::InvalidCoreVersion(s.to_string()))?;

        if parts.is_empty() || parts.len() > Self::MAX_PARTS {
            return Err(VersionError::InvalidCoreVersion(s.to_string()));
        }

        Ok(Self { parts })
    }

    /// A version consisting of only a major component, used for bootstrap state.
    pub fn from_major(major: u64) -> Self {
        Self { parts: vec![major] }
    }

    /// The components as written.
    pub fn parts(&self) -> &[u64] {
        &self.parts
    }

    /// Component `index` (0 = major), or zero when not written.
    pub fn component(&self, index: usize) -> u64 {
        self.parts.get(index).copied().unwrap_or(0)
    }

    /// Major component.
    pub fn major(&self) -> u64 {
        self.component(0)
    }

    /// The first three components as a semantic version.
    ///
    /// This is the platform version apps declare compatibility against.
    pub fn platform(&self) -> Version {
        Version::new(self.component(0), self.component(1), self.component(2))
    }

    fn padded(&self) -> [u64; Self::MAX_PARTS] {
        std::array::from_fn(|i| self.component(i))
    }
}

impl PartialEq for CoreVersion {
    fn eq(&self, other: &Self) -> bool {
        self.padded() == other.padded()
    }
}

impl Eq for CoreVersion {}

impl Ord for CoreVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.padded().cmp(&other.padded())
    }
}

impl PartialOrd for CoreVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CoreVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.parts {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for CoreVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for CoreVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CoreVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A range of acceptable versions, e.g. `>=25 <=27` or `^2.1`.
///
/// Clauses may be separated by whitespace (the remote index's style) or by
/// commas. Partial versions behave as ranges: `<=27` admits every `27.x.y`.
/// The original expression is kept verbatim for round-tripping.
#[derive(Debug, Clone)]
pub struct VersionRange {
    expr: String,
    req: VersionReq,
}

impl VersionRange {
    /// Parse a range expression. An empty expression matches everything.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::InvalidRange`] if any clause is not a valid
    /// comparator.
    pub fn parse(expr: &str) -> Result<Self, VersionError> {
        let clauses: Vec<String> = expr
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|clause| !clause.is_empty())
            .map(|clause| match clause.strip_prefix("==") {
                Some(exact) => format!("={exact}"),
                None => clause.to_string(),
            })
            .collect();

        let normalized = if clauses.is_empty() {
            "*".to_string()
        } else {
            clauses.join(", ")
        };

        let req = VersionReq::parse(&normalized).map_err(|e| VersionError::InvalidRange {
            expr: expr.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            expr: expr.to_string(),
            req,
        })
    }

    /// Whether `version` lies within the range.
    pub fn matches(&self, version: &Version) -> bool {
        self.req.matches(version)
    }

    /// The expression as originally written.
    pub fn as_str(&self) -> &str {
        &self.expr
    }
}

impl PartialEq for VersionRange {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr
    }
}

impl Eq for VersionRange {}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.expr)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Returns `true` if a raw release version string denotes a stable release.
///
/// Anything carrying a pre-release marker (`-`) is not stable, whether or
/// not the string parses as a semantic version.
pub fn is_stable_release(raw: &str) -> bool {
    !raw.contains('-')
}

/// Version of an app as seen by the differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AppVersion {
    /// Shipped with the core; versioned implicitly by the core version.
    Internal,
    /// An independently released version.
    Release(Version),
}

/// Outcome of comparing two [`AppVersion`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrdering {
    /// The left-hand version is older.
    Older,
    /// Both versions are the same (including internal vs. internal).
    Same,
    /// The left-hand version is newer.
    Newer,
    /// One side is internal and the other a release; there is no order.
    Incomparable,
}

impl AppVersion {
    /// Compare `self` against `other`.
    pub fn compare(&self, other: &Self) -> VersionOrdering {
        match (self, other) {
            (Self::Internal, Self::Internal) => VersionOrdering::Same,
            (Self::Release(a), Self::Release(b)) => match a.cmp(b) {
                Ordering::Less => VersionOrdering::Older,
                Ordering::Equal => VersionOrdering::Same,
                Ordering::Greater => VersionOrdering::Newer,
            },
            _ => VersionOrdering::Incomparable,
        }
    }

    /// The release version, if this is not an internal app.
    pub fn release(&self) -> Option<&Version> {
        match self {
            Self::Internal => None,
            Self::Release(v) => Some(v),
        }
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => f.write_str("internal"),
            Self::Release(v) => write!(f, "{v}"),
        }
    }
}
