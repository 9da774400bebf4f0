//! Helpers over version lists: sorting, filtering, grouping, summaries

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use thiserror::Error;

use crate::version::detector::{Detector, InboundRequest};
use crate::version::range::VersionRange;
use crate::version::semver::{Version, parse_version};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version format: {0}")]
pub struct InvalidVersionError(pub String);

/// Ascending by `major.minor.patch`; equal versions keep their order
pub fn sort_versions(versions: &[Version]) -> Vec<Version> {
    let mut sorted = versions.to_vec();
    sorted.sort_by(|a, b| a.compare(b));
    sorted
}

pub fn sort_versions_descending(versions: &[Version]) -> Vec<Version> {
    let mut sorted = versions.to_vec();
    sorted.sort_by(|a, b| b.compare(a));
    sorted
}

pub fn filter_by_major(versions: &[Version], major: u64) -> Vec<Version> {
    versions.iter().filter(|v| v.major() == major).cloned().collect()
}

pub fn filter_by_range(versions: &[Version], range: &VersionRange) -> Vec<Version> {
    versions.iter().filter(|v| range.contains(v)).cloned().collect()
}

pub fn latest_version(versions: &[Version]) -> Option<Version> {
    sort_versions_descending(versions).into_iter().next()
}

pub fn oldest_version(versions: &[Version]) -> Option<Version> {
    sort_versions(versions).into_iter().next()
}

/// Best match for `target` among `available`
///
/// An exact match wins, then the latest compatible version, then the latest overall.
pub fn find_closest_version(target: &Version, available: &[Version]) -> Option<Version> {
    if let Some(exact) = available.iter().find(|v| v.compare(target).is_eq()) {
        return Some(exact.clone());
    }

    let compatible: Vec<Version> = available
        .iter()
        .filter(|v| v.is_compatible(target))
        .cloned()
        .collect();
    latest_version(&compatible).or_else(|| latest_version(available))
}

pub fn version_strings(versions: &[Version]) -> Vec<String> {
    versions.iter().map(Version::to_string).collect()
}

/// Parse every string, dropping empty ones
pub fn parse_versions<I, S>(versions: I) -> Vec<Version>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    versions
        .into_iter()
        .map(|s| parse_version(s.as_ref()))
        .filter(|v| !v.is_zero())
        .collect()
}

/// Accepts the empty string, numeric versions and the `latest` / `current` aliases
pub fn validate_version_string(version: &str) -> Result<(), InvalidVersionError> {
    let parsed = parse_version(version);
    let alias = ["latest", "current"]
        .iter()
        .any(|a| version.eq_ignore_ascii_case(a));
    if parsed.is_opaque() && !alias {
        return Err(InvalidVersionError(version.to_string()));
    }
    Ok(())
}

/// Distinct major versions, ascending
pub fn major_versions(versions: &[Version]) -> Vec<u64> {
    versions
        .iter()
        .map(Version::major)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Versions grouped by major, each group sorted ascending
pub fn group_by_major(versions: &[Version]) -> BTreeMap<u64, Vec<Version>> {
    let mut groups: BTreeMap<u64, Vec<Version>> = BTreeMap::new();
    for version in versions {
        groups.entry(version.major()).or_default().push(version.clone());
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| a.compare(b));
    }
    groups
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VersionSummary {
    pub total_versions: usize,
    pub latest_version: Option<String>,
    pub oldest_version: Option<String>,
    pub major_versions: Vec<u64>,
    pub versions_by_major: BTreeMap<u64, Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deprecated_versions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub beta_versions: Vec<String>,
}

pub fn version_summary(versions: &[Version], deprecated: &[Version]) -> VersionSummary {
    if versions.is_empty() {
        return VersionSummary::default();
    }

    let beta_versions = versions
        .iter()
        .filter(|v| {
            v.label().to_lowercase().contains("beta") || v.raw().to_lowercase().contains("beta")
        })
        .map(Version::to_string)
        .collect();

    VersionSummary {
        total_versions: versions.len(),
        latest_version: latest_version(versions).map(|v| v.to_string()),
        oldest_version: oldest_version(versions).map(|v| v.to_string()),
        major_versions: major_versions(versions),
        versions_by_major: group_by_major(versions)
            .into_iter()
            .map(|(major, group)| (major, version_strings(&group)))
            .collect(),
        deprecated_versions: version_strings(deprecated),
        beta_versions,
    }
}

type ComponentVersion = (String, String);

/// Explicit compatibility declarations between component versions
#[derive(Debug, Clone, Default)]
pub struct CompatibilityMatrix {
    entries: HashMap<ComponentVersion, HashMap<ComponentVersion, bool>>,
}

impl CompatibilityMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_compatible(
        &mut self,
        component: &str,
        version: &str,
        other: &str,
        other_version: &str,
        compatible: bool,
    ) {
        self.entries
            .entry((component.to_string(), version.to_string()))
            .or_default()
            .insert((other.to_string(), other_version.to_string()), compatible);
    }

    /// Unknown pairs are incompatible
    pub fn is_compatible(&self, component: &str, version: &str, other: &str, other_version: &str) -> bool {
        self.entries
            .get(&(component.to_string(), version.to_string()))
            .and_then(|targets| targets.get(&(other.to_string(), other_version.to_string())))
            .copied()
            .unwrap_or(false)
    }

    /// Compatible versions of every other component, sorted
    pub fn compatible_versions(&self, component: &str, version: &str) -> BTreeMap<String, Vec<String>> {
        let mut result: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let Some(targets) = self
            .entries
            .get(&(component.to_string(), version.to_string()))
        else {
            return result;
        };
        for ((other, other_version), compatible) in targets {
            if *compatible {
                result
                    .entry(other.clone())
                    .or_default()
                    .push(other_version.clone());
            }
        }
        for versions in result.values_mut() {
            versions.sort();
        }
        result
    }
}

/// Snapshot of how a request's version was resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugVersionInfo {
    pub detected_version: Version,
    pub detection_method: String,
    pub detection_source: String,
    pub requested_component: String,
    pub available_versions: Vec<String>,
    pub is_supported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn debug_info<R>(
    detector: &Detector,
    request: &R,
    component: &str,
    available: &[Version],
    error: Option<&dyn std::error::Error>,
) -> DebugVersionInfo
where
    R: InboundRequest + ?Sized,
{
    let result = detector.detect_from_request(request);
    DebugVersionInfo {
        is_supported: available.iter().any(|v| v.compare(&result.version).is_eq()),
        detection_method: result.method.to_string(),
        detection_source: result.source,
        detected_version: result.version,
        requested_component: component.to_string(),
        available_versions: version_strings(available),
        error: error.map(|e| e.to_string()),
    }
}
