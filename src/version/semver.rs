//! Semantic version value used for API version negotiation
//!
//! Parsing is lenient: `v2`, `1.4`, `v1.2.3-beta` are all accepted and missing
//! segments default to zero. A string whose first numeric segment cannot be
//! parsed (including the `latest` / `current` aliases) becomes an *opaque*
//! version that keeps only its raw text.

use std::cmp::Ordering;
use std::fmt;

use ::semver::{BuildMetadata, Prerelease};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Aliases that are always kept as opaque versions
const OPAQUE_ALIASES: &[&str] = &["latest", "current"];

/// An API version
///
/// Ordering through [`Version::compare`] only looks at `major.minor.patch`;
/// the pre-release label does not participate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Version {
    raw: String,
    major: u64,
    minor: u64,
    patch: u64,
    label: String,
}

impl Version {
    /// Create a version from its numeric parts (`v{major}.{minor}.{patch}`)
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self::with_label(major, minor, patch, "")
    }

    /// Create a version with a pre-release label (`v{major}.{minor}.{patch}-{label}`)
    pub fn with_label(major: u64, minor: u64, patch: u64, label: &str) -> Self {
        let mut version = Self {
            raw: String::new(),
            major,
            minor,
            patch,
            label: label.to_string(),
        };
        version.raw = version.canonical();
        version
    }

    fn opaque(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            ..Self::default()
        }
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The string this version was created from
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// True for the empty version produced by parsing `""` or by `Default`
    pub fn is_zero(&self) -> bool {
        self.raw.is_empty() && self.major == 0 && self.minor == 0 && self.patch == 0
    }

    /// True when the raw string could not be read as `major[.minor[.patch]]`
    pub fn is_opaque(&self) -> bool {
        !self.raw.is_empty() && split_numeric(&self.raw).is_none()
    }

    /// Canonical `v{major}.{minor}.{patch}[-{label}]` form, ignoring the raw string
    pub fn canonical(&self) -> String {
        let base = format!("v{}.{}.{}", self.major, self.minor, self.patch);
        if self.label.is_empty() {
            base
        } else {
            format!("{}-{}", base, self.label)
        }
    }

    /// Identity used for table lookups: canonical form, or the raw string for opaque versions
    pub(crate) fn key(&self) -> String {
        if self.is_opaque() {
            self.raw.clone()
        } else {
            self.canonical()
        }
    }

    /// Three-way comparison of `(major, minor, patch)`; the label is ignored
    pub fn compare(&self, other: &Version) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }

    /// Same major version and not older than `other`
    ///
    /// Not symmetric: `v1.2.0` is compatible with `v1.0.0` but not the reverse.
    pub fn is_compatible(&self, other: &Version) -> bool {
        self.major == other.major && self.compare(other) != Ordering::Less
    }

    /// Upgrading from `other` to `self` crosses a major version
    pub fn is_major_breaking(&self, other: &Version) -> bool {
        self.major > other.major
    }

    pub fn is_minor_upgrade(&self, other: &Version) -> bool {
        self.major == other.major && self.minor > other.minor
    }

    pub fn is_patch_upgrade(&self, other: &Version) -> bool {
        self.major == other.major && self.minor == other.minor && self.patch > other.patch
    }

    /// Convert to a `semver::Version`, if the version is numeric and its label is a valid pre-release
    pub fn to_semver(&self) -> Option<::semver::Version> {
        if self.is_zero() || self.is_opaque() {
            return None;
        }
        let pre = if self.label.is_empty() {
            Prerelease::EMPTY
        } else {
            Prerelease::new(&self.label).ok()?
        };
        Some(::semver::Version {
            major: self.major,
            minor: self.minor,
            patch: self.patch,
            pre,
            build: BuildMetadata::EMPTY,
        })
    }

    /// Conventional semver precedence (`1.0.0-beta < 1.0.0`)
    ///
    /// Falls back to [`Version::compare`] when either side has no semver form.
    pub fn compare_precedence(&self, other: &Version) -> Ordering {
        match (self.to_semver(), other.to_semver()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self.compare(other),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.raw.is_empty() {
            f.write_str(&self.canonical())
        } else {
            f.write_str(&self.raw)
        }
    }
}

impl From<&str> for Version {
    fn from(value: &str) -> Self {
        parse_version(value)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(parse_version(&raw))
    }
}

/// Split a version string into `(major, minor, patch, label)`
///
/// Returns None when the major segment is not an integer or the string is an alias.
fn split_numeric(version: &str) -> Option<(u64, u64, u64, String)> {
    if OPAQUE_ALIASES
        .iter()
        .any(|alias| version.eq_ignore_ascii_case(alias))
    {
        return None;
    }

    let clean = version.strip_prefix('v').unwrap_or(version);
    let (numbers, label) = match clean.rsplit_once('-') {
        Some((numbers, label)) => (numbers, label.to_string()),
        None => (clean, String::new()),
    };

    let mut parts = numbers.split('.');
    let major = parts.next()?.parse::<u64>().ok()?;
    let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);

    Some((major, minor, patch, label))
}

/// Parse a version string
///
/// Examples:
/// - "v1.2.3" -> 1.2.3
/// - "2" -> 2.0.0 (displayed as "2")
/// - "v1.0.0-beta" -> 1.0.0 with label "beta"
/// - "latest" -> opaque
/// - "" -> zero version
pub fn parse_version(version: &str) -> Version {
    if version.is_empty() {
        return Version::default();
    }

    match split_numeric(version) {
        Some((major, minor, patch, label)) => Version {
            raw: version.to_string(),
            major,
            minor,
            patch,
            label,
        },
        None => Version::opaque(version),
    }
}

/// Parse a version literal supplied by the program itself
///
/// An empty string yields the zero version.
///
/// # Panics
/// Panics when a non-empty `version` is not numeric. The `latest` / `current`
/// aliases are accepted. Never use this on request-derived input.
pub fn must_parse_version(version: &str) -> Version {
    let parsed = parse_version(version);
    let is_alias = OPAQUE_ALIASES
        .iter()
        .any(|alias| version.eq_ignore_ascii_case(alias));
    if parsed.is_opaque() && !is_alias {
        panic!("invalid version: {version:?}");
    }
    parsed
}

/// The fallback API version (v1.0.0)
pub fn default_version() -> Version {
    Version::new(1, 0, 0)
}
