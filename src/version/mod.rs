//! Versioned component dispatch and payload migration
//!
//! This module resolves the API version an inbound request targets, routes the
//! request to the component registered under the requested name, and converts
//! payloads between component versions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Detector   │────▶│   Manager   │────▶│  Component  │
//! │ (resolve)   │     │ (dispatch)  │     │ (versioned) │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │                   │
//!                            ▼                   ▼
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │   Metrics   │     │  Migrator   │
//!                     │ (counters)  │     │ (transform) │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`semver`]: The `Version` value, parsing and comparison
//! - [`range`]: `VersionRange` membership tests
//! - [`detector`]: Version detection from headers, query, path and context
//! - [`component`]: Component capability traits and registry metadata
//! - [`manager`]: Component registry, dispatch and compatibility checks
//! - [`migration`]: Field-mapping and custom migrations between versions
//! - [`transform`]: Value transforms used by field mappings
//! - [`metrics`]: Per-version usage and error counters
//! - [`context`] / [`request`]: Request context and versioned envelopes
//! - [`utils`]: Sorting, filtering and summary helpers
//! - [`error`]: Error taxonomy

pub mod component;
pub mod context;
pub mod detector;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod migration;
pub mod range;
pub mod request;
pub mod semver;
pub mod transform;
pub mod utils;

pub use component::{
    ComponentMeta, ConfigurableComponent, DeprecatableComponent, DeprecationInfo,
    HttpVersionedComponent, MigratableComponent, MigrationGuide, VersionConstraint,
    VersionedComponent,
};
pub use context::{ContextValue, RequestContext};
pub use detector::{DetectionMethod, DetectionResult, Detector, InboundRequest};
pub use error::{BoxError, VersioningError};
pub use manager::Manager;
pub use metrics::{
    ComponentMetrics, DefaultMetricsCollector, MetricsCollector, VersionUsageStats,
};
pub use migration::{
    FieldMapping, MigrationFn, MigrationStrategy, Migrator, Migrators, VersionMigration,
};
pub use range::VersionRange;
pub use request::{VersionedRequest, VersionedResponse};
pub use semver::{Version, default_version, must_parse_version, parse_version};
