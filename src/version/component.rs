//! Component capability traits
//!
//! The registry only depends on [`VersionedComponent`]. Extra capabilities
//! (deprecation reporting, per-version configuration, payload migration, raw
//! HTTP handling) are
//! separate traits that a component opts into by overriding the matching
//! `as_*` accessor, so callers can ask "does this component also support X?"
//! at runtime.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use http::{Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::version::context::RequestContext;
use crate::version::error::{MigrationError, VersioningError};
use crate::version::range::VersionRange;
use crate::version::request::{VersionedRequest, VersionedResponse};
use crate::version::semver::Version;

/// A named unit that serves one or more API versions
pub trait VersionedComponent: Send + Sync {
    fn name(&self) -> &str;

    /// Kind of component, e.g. "pipeline", "middleware", "service"
    fn component_type(&self) -> &str;

    fn supported_versions(&self) -> Vec<Version>;

    fn default_version(&self) -> Version;

    fn version_range(&self) -> VersionRange {
        VersionRange::exact(self.supported_versions())
    }

    /// Whether `version` matches one of the supported versions on `major.minor.patch`
    fn is_version_supported(&self, version: &Version) -> bool {
        self.supported_versions()
            .iter()
            .any(|v| v.compare(version) == Ordering::Equal)
    }

    /// Versioned entry point
    fn process_versioned(
        &self,
        request: &VersionedRequest,
        input: Value,
    ) -> Result<VersionedResponse, VersioningError>;

    /// Process `input` against the default version and return only the data
    fn process(&self, context: &RequestContext, input: Value) -> Result<Option<Value>, VersioningError> {
        let request = VersionedRequest::new(context.clone(), self.default_version(), self.name());
        Ok(self.process_versioned(&request, input)?.data)
    }

    fn as_deprecatable(&self) -> Option<&dyn DeprecatableComponent> {
        None
    }

    fn as_configurable(&self) -> Option<&dyn ConfigurableComponent> {
        None
    }

    fn as_migratable(&self) -> Option<&dyn MigratableComponent> {
        None
    }

    fn as_http_versioned(&self) -> Option<&dyn HttpVersionedComponent> {
        None
    }
}

/// Reports deprecated versions
pub trait DeprecatableComponent: Send + Sync {
    fn is_version_deprecated(&self, version: &Version) -> bool;

    fn deprecation_info(&self, version: &Version) -> Option<DeprecationInfo>;

    fn migration_guide(&self, _from: &Version) -> Option<MigrationGuide> {
        None
    }
}

/// Holds configuration per served version
///
/// Implementations use interior mutability; the registry only holds shared references.
pub trait ConfigurableComponent: Send + Sync {
    fn version_config(&self, version: &Version) -> Result<Value, VersioningError>;

    fn set_version_config(&self, version: &Version, config: Value) -> Result<(), VersioningError>;

    fn validate_version_config(&self, _version: &Version, _config: &Value) -> Result<(), VersioningError> {
        Ok(())
    }
}

/// Converts payloads between its own versions
pub trait MigratableComponent: Send + Sync {
    fn migrate_input(&self, from: &Version, to: &Version, input: Value) -> Result<Value, MigrationError>;

    fn migrate_output(&self, from: &Version, to: &Version, output: Value) -> Result<Value, MigrationError>;

    fn can_migrate(&self, from: &Version, to: &Version) -> bool;
}

/// Serves raw HTTP requests instead of JSON payloads
///
/// Bodies are buffered; the response is written back to the client as-is,
/// apart from the version headers.
pub trait HttpVersionedComponent: Send + Sync {
    /// Handle a request whose version was resolved by the detector
    fn handle_http_versioned(
        &self,
        request: &VersionedRequest,
        http_request: &Request<Vec<u8>>,
    ) -> Result<Response<Vec<u8>>, VersioningError>;

    /// Handle a request that did not ask for a version
    fn handle_http(
        &self,
        context: &RequestContext,
        http_request: &Request<Vec<u8>>,
    ) -> Result<Response<Vec<u8>>, VersioningError>;
}

/// Deprecation details for one version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeprecationInfo {
    pub version: Version,
    pub deprecated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sunset_at: Option<String>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<Version>,
}

/// Guidance for clients moving off a version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationGuide {
    pub from: Version,
    pub to: Version,
    pub breaking_changes: Vec<String>,
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub examples: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

/// Binds a component to a permitted range (and forbidden set) of another component's version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionConstraint {
    /// The component this constraint applies to
    pub component: String,
    pub requires: VersionRange,
    #[serde(default)]
    pub conflicts: Vec<Version>,
}

impl VersionConstraint {
    pub fn new(component: &str, requires: VersionRange) -> Self {
        Self {
            component: component.to_string(),
            requires,
            conflicts: Vec::new(),
        }
    }

    pub fn with_conflicts<I>(mut self, conflicts: I) -> Self
    where
        I: IntoIterator<Item = Version>,
    {
        self.conflicts.extend(conflicts);
        self
    }
}

/// Registry record kept for every registered component
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentMeta {
    pub name: String,
    pub component_type: String,
    pub supported_versions: Vec<Version>,
    pub default_version: Version,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deprecated_versions: Vec<DeprecationInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<VersionConstraint>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentMeta {
    /// Snapshot a component's declared versions, including deprecations when reported
    pub fn from_component(component: &dyn VersionedComponent) -> Self {
        let now = Utc::now();
        let supported_versions = component.supported_versions();
        let deprecated_versions = component
            .as_deprecatable()
            .map(|deprecatable| {
                supported_versions
                    .iter()
                    .filter(|v| deprecatable.is_version_deprecated(v))
                    .filter_map(|v| deprecatable.deprecation_info(v))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: component.name().to_string(),
            component_type: component.component_type().to_string(),
            supported_versions,
            default_version: component.default_version(),
            deprecated_versions,
            constraints: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_deprecated(&self, version: &Version) -> bool {
        self.deprecated_versions
            .iter()
            .any(|info| info.version.compare(version) == Ordering::Equal)
    }
}
