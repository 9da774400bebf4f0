//! Version range membership

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::version::semver::Version;

/// A set of acceptable versions
///
/// Either an explicit list (`exact`) or a `min`/`max` bound where a zero
/// version means "unbounded on that side". An empty range matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionRange {
    pub min: Version,
    pub max: Version,
    pub exact: Vec<Version>,
}

impl VersionRange {
    /// Inclusive range between `min` and `max`
    pub fn between(min: Version, max: Version) -> Self {
        Self {
            min,
            max,
            exact: Vec::new(),
        }
    }

    /// Range matching only the listed versions
    pub fn exact<I>(versions: I) -> Self
    where
        I: IntoIterator<Item = Version>,
    {
        Self {
            exact: versions.into_iter().collect(),
            ..Self::default()
        }
    }

    /// `>= min`
    pub fn at_least(min: Version) -> Self {
        Self::between(min, Version::default())
    }

    /// `<= max`
    pub fn at_most(max: Version) -> Self {
        Self::between(Version::default(), max)
    }

    /// Check whether `version` belongs to this range
    ///
    /// Exact entries match on `major.minor.patch` only; labels are ignored.
    pub fn contains(&self, version: &Version) -> bool {
        if !self.exact.is_empty() {
            return self
                .exact
                .iter()
                .any(|v| v.compare(version) == Ordering::Equal);
        }

        if !self.min.is_zero() && version.compare(&self.min) == Ordering::Less {
            return false;
        }
        if !self.max.is_zero() && version.compare(&self.max) == Ordering::Greater {
            return false;
        }

        true
    }

    /// Enumerable versions: the exact list, or both bounds when both are set
    pub fn versions(&self) -> Vec<Version> {
        if !self.exact.is_empty() {
            return self.exact.clone();
        }
        if !self.min.is_zero() && !self.max.is_zero() {
            return vec![self.min.clone(), self.max.clone()];
        }
        Vec::new()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.exact.is_empty() {
            let versions: Vec<String> = self.exact.iter().map(|v| v.to_string()).collect();
            return f.write_str(&versions.join(", "));
        }

        match (self.min.is_zero(), self.max.is_zero()) {
            (false, false) => write!(f, "{} - {}", self.min, self.max),
            (false, true) => write!(f, ">= {}", self.min),
            (true, false) => write!(f, "<= {}", self.max),
            (true, true) => f.write_str("any"),
        }
    }
}
