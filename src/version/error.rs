use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use http::StatusCode;
use thiserror::Error;

use crate::version::component::DeprecationInfo;
use crate::version::semver::Version;

/// Boxed error returned by components and custom migrations
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub const CODE_VERSION_NOT_SUPPORTED: &str = "VERSION_NOT_SUPPORTED";
pub const CODE_COMPONENT_NOT_FOUND: &str = "COMPONENT_NOT_FOUND";
pub const CODE_MIGRATION_ERROR: &str = "MIGRATION_ERROR";
pub const CODE_COMPATIBILITY_ERROR: &str = "COMPATIBILITY_ERROR";
pub const CODE_DEPRECATED_VERSION: &str = "DEPRECATED_VERSION";
pub const CODE_CONFIGURATION_ERROR: &str = "CONFIGURATION_ERROR";
pub const CODE_VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const CODE_UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";

fn join_versions(versions: &[Version]) -> String {
    versions
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_pairs(pairs: &BTreeMap<String, String>) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Requested version is not supported by a component
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "version error in component '{component}': {message} (requested: {requested}, supported: [{}])",
    join_versions(.supported)
)]
pub struct VersionError {
    pub component: String,
    pub requested: Version,
    pub supported: Vec<Version>,
    pub message: String,
    pub code: String,
}

impl VersionError {
    pub fn new(component: &str, requested: Version, supported: Vec<Version>, message: &str) -> Self {
        Self::with_code(
            component,
            requested,
            supported,
            message,
            CODE_VERSION_NOT_SUPPORTED,
        )
    }

    pub fn with_code(
        component: &str,
        requested: Version,
        supported: Vec<Version>,
        message: &str,
        code: &str,
    ) -> Self {
        Self {
            component: component.to_string(),
            requested,
            supported,
            message: message.to_string(),
            code: code.to_string(),
        }
    }
}

/// No component registered under the given name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("component not found: {component}{}", .message.as_ref().map(|m| format!(" - {}", m)).unwrap_or_default())]
pub struct ComponentNotFoundError {
    pub component: String,
    pub message: Option<String>,
}

impl ComponentNotFoundError {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            message: None,
        }
    }
}

/// Failure while migrating a payload between two versions
#[derive(Debug)]
pub struct MigrationError {
    pub component: String,
    pub from: Version,
    pub to: Version,
    pub message: String,
    pub cause: Option<BoxError>,
}

impl MigrationError {
    pub fn new(component: &str, from: &Version, to: &Version, message: &str) -> Self {
        Self {
            component: component.to_string(),
            from: from.clone(),
            to: to.clone(),
            message: message.to_string(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "migration error in component '{}' from {} to {}: {}",
            self.component, self.from, self.to, self.message
        )?;
        if let Some(cause) = &self.cause {
            write!(f, " (cause: {})", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for MigrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Cross-component constraint violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityError {
    pub component: String,
    pub version: Version,
    /// Required component -> required range
    pub constraints: BTreeMap<String, String>,
    /// Conflicting component -> conflicting version
    pub conflicts_with: BTreeMap<String, String>,
    pub message: String,
}

impl CompatibilityError {
    pub fn new(component: &str, version: &Version, message: impl Into<String>) -> Self {
        Self {
            component: component.to_string(),
            version: version.clone(),
            constraints: BTreeMap::new(),
            conflicts_with: BTreeMap::new(),
            message: message.into(),
        }
    }

    pub fn with_constraint(mut self, component: &str, constraint: impl Into<String>) -> Self {
        self.constraints
            .insert(component.to_string(), constraint.into());
        self
    }

    pub fn with_conflict(mut self, component: &str, version: impl Into<String>) -> Self {
        self.conflicts_with
            .insert(component.to_string(), version.into());
        self
    }
}

impl fmt::Display for CompatibilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "compatibility error for component '{}' version {}",
            self.component, self.version
        )?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }

        let mut details = Vec::new();
        if !self.constraints.is_empty() {
            details.push(format!("requires: {}", join_pairs(&self.constraints)));
        }
        if !self.conflicts_with.is_empty() {
            details.push(format!(
                "conflicts with: {}",
                join_pairs(&self.conflicts_with)
            ));
        }
        if !details.is_empty() {
            write!(f, " ({})", details.join("; "))?;
        }
        Ok(())
    }
}

impl std::error::Error for CompatibilityError {}

/// Informational: a deprecated version was used
#[derive(Debug, Clone, PartialEq)]
pub struct DeprecationError {
    pub component: String,
    pub version: Version,
    pub info: Option<DeprecationInfo>,
    pub message: String,
}

impl fmt::Display for DeprecationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "deprecated version warning for component '{}' version {}",
            self.component, self.version
        )?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }

        let Some(info) = &self.info else {
            return Ok(());
        };
        let mut details = Vec::new();
        if !info.reason.is_empty() {
            details.push(format!("reason: {}", info.reason));
        }
        if let Some(sunset) = &info.sunset_at {
            details.push(format!("sunset: {}", sunset));
        }
        if let Some(replacement) = &info.replacement {
            details.push(format!("replacement: {}", replacement));
        }
        if !details.is_empty() {
            write!(f, " ({})", details.join("; "))?;
        }
        Ok(())
    }
}

impl std::error::Error for DeprecationError {}

/// Per-version configuration problem
#[derive(Debug)]
pub struct ConfigurationError {
    pub component: String,
    pub version: Version,
    pub field: Option<String>,
    pub message: String,
    pub cause: Option<BoxError>,
}

impl ConfigurationError {
    pub fn new(component: &str, version: &Version, message: &str) -> Self {
        Self {
            component: component.to_string(),
            version: version.clone(),
            field: None,
            message: message.to_string(),
            cause: None,
        }
    }

    pub fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "configuration error for component '{}' version {}",
            self.component, self.version
        )?;
        if let Some(field) = &self.field {
            write!(f, " field '{}'", field)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(cause) = &self.cause {
            write!(f, " (cause: {})", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigurationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Invalid versioned input or output payload
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub component: String,
    pub version: Version,
    pub field: Option<String>,
    pub value: Option<serde_json::Value>,
    pub message: String,
    pub errors: Vec<String>,
}

impl ValidationError {
    pub fn new(component: &str, version: &Version, message: &str) -> Self {
        Self {
            component: component.to_string(),
            version: version.clone(),
            field: None,
            value: None,
            message: message.to_string(),
            errors: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "validation error for component '{}' version {}",
            self.component, self.version
        )?;
        if let Some(field) = &self.field {
            write!(f, " field '{}'", field)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if !self.errors.is_empty() {
            write!(f, " ({})", self.errors.join("; "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Errors surfaced by the registry and dispatch layer
#[derive(Debug, Error)]
pub enum VersioningError {
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    ComponentNotFound(#[from] ComponentNotFoundError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Compatibility(#[from] CompatibilityError),

    #[error(transparent)]
    Deprecation(#[from] DeprecationError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("component name cannot be empty")]
    EmptyName,

    #[error("component with name '{0}' already registered")]
    DuplicateComponent(String),

    #[error("component '{0}' has no supported versions")]
    NoSupportedVersions(String),

    /// Failure raised by a component's own processing
    #[error("component '{component}' failed: {source}")]
    Component {
        component: String,
        #[source]
        source: BoxError,
    },
}

impl VersioningError {
    /// Wrap an arbitrary component failure
    pub fn component(component: &str, source: impl Into<BoxError>) -> Self {
        Self::Component {
            component: component.to_string(),
            source: source.into(),
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &str {
        match self {
            Self::Version(e) => &e.code,
            Self::ComponentNotFound(_) => CODE_COMPONENT_NOT_FOUND,
            Self::Migration(_) => CODE_MIGRATION_ERROR,
            Self::Compatibility(_) => CODE_COMPATIBILITY_ERROR,
            Self::Deprecation(_) => CODE_DEPRECATED_VERSION,
            Self::Configuration(_) => CODE_CONFIGURATION_ERROR,
            Self::Validation(_) => CODE_VALIDATION_ERROR,
            Self::EmptyName
            | Self::DuplicateComponent(_)
            | Self::NoSupportedVersions(_)
            | Self::Component { .. } => CODE_UNKNOWN_ERROR,
        }
    }

    /// True for the typed version-related kinds
    pub fn is_version_error(&self) -> bool {
        self.code() != CODE_UNKNOWN_ERROR
    }

    /// Name of the component involved, when known
    pub fn component_name(&self) -> Option<&str> {
        match self {
            Self::Version(e) => Some(&e.component),
            Self::ComponentNotFound(e) => Some(&e.component),
            Self::Migration(e) => Some(&e.component),
            Self::Compatibility(e) => Some(&e.component),
            Self::Deprecation(e) => Some(&e.component),
            Self::Configuration(e) => Some(&e.component),
            Self::Validation(e) => Some(&e.component),
            Self::DuplicateComponent(name) | Self::NoSupportedVersions(name) => Some(name),
            Self::Component { component, .. } => Some(component),
            Self::EmptyName => None,
        }
    }

    /// HTTP status used when this error reaches a client
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ComponentNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::NOT_ACCEPTABLE,
        }
    }
}

/// Errors raised while loading configuration files
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
