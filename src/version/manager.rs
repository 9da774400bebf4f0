//! Registry of versioned components
//!
//! The [`Manager`] owns named components and dispatches versioned requests to
//! them. Its maps sit behind one reader/writer lock; component methods are
//! always called after the lock has been released.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::version::component::{ComponentMeta, VersionConstraint, VersionedComponent};
use crate::version::context::RequestContext;
use crate::version::detector::Detector;
use crate::version::error::{
    CompatibilityError, ComponentNotFoundError, ConfigurationError, DeprecationError,
    MigrationError, VersionError, VersioningError,
};
use crate::version::metrics::{MetricsCollector, VersionUsageStats};
use crate::version::request::{VersionedRequest, VersionedResponse};
use crate::version::semver::{Version, parse_version};

type SharedComponent = Arc<dyn VersionedComponent>;

#[derive(Default)]
struct Registry {
    components: HashMap<String, SharedComponent>,
    meta: HashMap<String, ComponentMeta>,
    constraints: HashMap<String, Vec<VersionConstraint>>,
}

/// Component registry and dispatcher
pub struct Manager {
    registry: RwLock<Registry>,
    metrics: Option<Arc<dyn MetricsCollector>>,
    detector: Detector,
}

impl Default for Manager {
    fn default() -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            metrics: None,
            detector: Detector::default(),
        }
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("components", &self.list())
            .field("metrics", &self.metrics.is_some())
            .field("detector", &self.detector)
            .finish()
    }
}

fn not_found(name: &str) -> VersioningError {
    ComponentNotFoundError::new(name).into()
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detector(mut self, detector: Detector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_metrics_collector(mut self, collector: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = Some(collector);
        self
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    pub fn metrics_collector(&self) -> Option<&Arc<dyn MetricsCollector>> {
        self.metrics.as_ref()
    }

    /// Register a component under its own name
    pub fn register(&self, component: SharedComponent) -> Result<(), VersioningError> {
        self.insert(component, Vec::new())
    }

    /// Register a component together with its compatibility constraints
    pub fn register_with_constraints(
        &self,
        component: SharedComponent,
        constraints: Vec<VersionConstraint>,
    ) -> Result<(), VersioningError> {
        self.insert(component, constraints)
    }

    fn insert(
        &self,
        component: SharedComponent,
        constraints: Vec<VersionConstraint>,
    ) -> Result<(), VersioningError> {
        let name = component.name().to_string();
        if name.is_empty() {
            return Err(VersioningError::EmptyName);
        }

        let mut meta = ComponentMeta::from_component(component.as_ref());
        meta.constraints = constraints.clone();

        let mut registry = self.registry.write();
        if registry.components.contains_key(&name) {
            return Err(VersioningError::DuplicateComponent(name));
        }
        registry.components.insert(name.clone(), component);
        registry.meta.insert(name.clone(), meta);
        if !constraints.is_empty() {
            registry.constraints.insert(name.clone(), constraints);
        }
        drop(registry);

        info!("Registered component '{}'", name);
        Ok(())
    }

    /// Remove a component with its metadata and constraints
    pub fn unregister(&self, name: &str) -> Result<(), VersioningError> {
        let mut registry = self.registry.write();
        if registry.components.remove(name).is_none() {
            return Err(not_found(name));
        }
        registry.meta.remove(name);
        registry.constraints.remove(name);
        drop(registry);

        info!("Unregistered component '{}'", name);
        Ok(())
    }

    /// Look up a component and check that it serves `version`
    ///
    /// A successful lookup counts as one request for the metrics collector.
    pub fn get(&self, name: &str, version: &Version) -> Result<SharedComponent, VersioningError> {
        let component = self.component(name).ok_or_else(|| not_found(name))?;

        if !component.is_version_supported(version) {
            let supported = component.supported_versions();
            let listed = supported
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            warn!("Component '{}' does not support version {}", name, version);
            return Err(VersionError::new(
                name,
                version.clone(),
                supported,
                &format!("version not supported. Supported versions: [{}]", listed),
            )
            .into());
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_request(name, version);
        }
        Ok(component)
    }

    /// Look up a component without version validation
    pub fn component(&self, name: &str) -> Option<SharedComponent> {
        self.registry.read().components.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.read().components.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of components of the given type, sorted
    pub fn list_by_type(&self, component_type: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .snapshot()
            .into_iter()
            .filter(|(_, component)| component.component_type() == component_type)
            .map(|(name, _)| name)
            .collect();
        names.sort();
        names
    }

    pub fn meta(&self, name: &str) -> Option<ComponentMeta> {
        self.registry.read().meta.get(name).cloned()
    }

    pub fn all_meta(&self) -> HashMap<String, ComponentMeta> {
        self.registry.read().meta.clone()
    }

    /// Edit a component's metadata record; `updated_at` is refreshed afterwards
    pub fn update_component_meta<F>(&self, name: &str, update: F) -> Result<(), VersioningError>
    where
        F: FnOnce(&mut ComponentMeta),
    {
        let mut registry = self.registry.write();
        let meta = registry.meta.get_mut(name).ok_or_else(|| not_found(name))?;
        update(meta);
        meta.updated_at = Utc::now();
        Ok(())
    }

    /// Attach one more constraint to a registered component
    pub fn add_constraint(&self, name: &str, constraint: VersionConstraint) -> Result<(), VersioningError> {
        let mut registry = self.registry.write();
        let meta = registry.meta.get_mut(name).ok_or_else(|| not_found(name))?;
        meta.constraints.push(constraint.clone());
        meta.updated_at = Utc::now();
        registry
            .constraints
            .entry(name.to_string())
            .or_default()
            .push(constraint);
        Ok(())
    }

    pub fn constraints(&self, name: &str) -> Vec<VersionConstraint> {
        self.registry
            .read()
            .constraints
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn supported_versions(&self, name: &str) -> Result<Vec<Version>, VersioningError> {
        let component = self.component(name).ok_or_else(|| not_found(name))?;
        Ok(component.supported_versions())
    }

    pub fn all_supported_versions(&self) -> HashMap<String, Vec<Version>> {
        self.snapshot()
            .into_iter()
            .map(|(name, component)| (name, component.supported_versions()))
            .collect()
    }

    /// Dispatch a request to the component it names
    ///
    /// Errors are counted by the metrics collector and returned unchanged.
    pub fn process_versioned(
        &self,
        request: &VersionedRequest,
        input: Value,
    ) -> Result<VersionedResponse, VersioningError> {
        debug!(
            "Dispatching {} {} to '{}'",
            request.operation, request.version, request.component
        );
        self.get(&request.component, &request.version)
            .and_then(|component| component.process_versioned(request, input))
            .inspect_err(|e| self.record_error(&request.component, &request.version, e))
    }

    /// Resolve the version from the context, then dispatch
    pub fn process_with_auto_version(
        &self,
        context: &RequestContext,
        name: &str,
        input: Value,
    ) -> Result<VersionedResponse, VersioningError> {
        let version = self.detector.detect_from_context(context).version;
        let request = VersionedRequest::new(context.clone(), version, name);
        self.process_versioned(&request, input)
    }

    /// Validate a set of component versions against the registered constraints
    ///
    /// Components are checked in name order; the first violation is returned.
    pub fn check_compatibility(&self, versions: &HashMap<String, Version>) -> Result<(), VersioningError> {
        let mut names: Vec<&String> = versions.keys().collect();
        names.sort();

        let registry = self.registry.read();
        for name in names {
            let Some(constraints) = registry.constraints.get(name) else {
                continue;
            };
            let version = &versions[name];

            for constraint in constraints {
                let Some(required) = versions.get(&constraint.component) else {
                    continue;
                };

                if !constraint.requires.contains(required) {
                    return Err(CompatibilityError::new(
                        name,
                        version,
                        format!(
                            "component '{}' version {} requires '{}' version in range {}, but got {}",
                            name, version, constraint.component, constraint.requires, required
                        ),
                    )
                    .with_constraint(&constraint.component, constraint.requires.to_string())
                    .into());
                }

                if let Some(conflict) = constraint
                    .conflicts
                    .iter()
                    .find(|conflict| conflict.compare(required).is_eq())
                {
                    return Err(CompatibilityError::new(
                        name,
                        version,
                        format!(
                            "component '{}' version {} conflicts with '{}' version {}",
                            name, version, constraint.component, conflict
                        ),
                    )
                    .with_conflict(&constraint.component, conflict.to_string())
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Supported versions of `name` that are compatible with `target`
    pub fn compatible_versions(&self, name: &str, target: &Version) -> Result<Vec<Version>, VersioningError> {
        Ok(self
            .supported_versions(name)?
            .into_iter()
            .filter(|v| v.is_compatible(target))
            .collect())
    }

    pub fn latest_version(&self, name: &str) -> Result<Version, VersioningError> {
        self.supported_versions(name)?
            .into_iter()
            .max_by(|a, b| a.compare(b).then_with(|| a.compare_precedence(b)))
            .ok_or_else(|| VersioningError::NoSupportedVersions(name.to_string()))
    }

    /// A warning when `version` of `name` is deprecated
    ///
    /// Checks the component's own deprecation capability first, then the metadata record.
    pub fn deprecation_warning(
        &self,
        name: &str,
        version: &Version,
    ) -> Result<Option<DeprecationError>, VersioningError> {
        let component = self.component(name).ok_or_else(|| not_found(name))?;

        let info = match component.as_deprecatable() {
            Some(deprecatable) if deprecatable.is_version_deprecated(version) => {
                Some(deprecatable.deprecation_info(version))
            }
            _ => self.meta(name).and_then(|meta| {
                meta.deprecated_versions
                    .into_iter()
                    .find(|info| info.version.compare(version).is_eq())
                    .map(Some)
            }),
        };

        Ok(info.map(|info| DeprecationError {
            component: name.to_string(),
            version: version.clone(),
            info,
            message: "version is deprecated".to_string(),
        }))
    }

    pub fn version_config(&self, name: &str, version: &Version) -> Result<Value, VersioningError> {
        let component = self.supporting(name, version)?;
        let configurable = component.as_configurable().ok_or_else(|| {
            ConfigurationError::new(name, version, "component does not support version configuration")
        })?;
        configurable.version_config(version)
    }

    /// Validate and store configuration for one version
    pub fn set_version_config(
        &self,
        name: &str,
        version: &Version,
        config: Value,
    ) -> Result<(), VersioningError> {
        let component = self.supporting(name, version)?;
        let configurable = component.as_configurable().ok_or_else(|| {
            ConfigurationError::new(name, version, "component does not support version configuration")
        })?;
        configurable.validate_version_config(version, &config)?;
        configurable.set_version_config(version, config)
    }

    pub fn migrate_input(
        &self,
        name: &str,
        from: &Version,
        to: &Version,
        input: Value,
    ) -> Result<Value, VersioningError> {
        let component = self.component(name).ok_or_else(|| not_found(name))?;
        let migratable = component
            .as_migratable()
            .ok_or_else(|| MigrationError::new(name, from, to, "component does not support migration"))?;
        if !migratable.can_migrate(from, to) {
            return Err(MigrationError::new(name, from, to, "no migration path available").into());
        }
        Ok(migratable.migrate_input(from, to, input)?)
    }

    pub fn migrate_output(
        &self,
        name: &str,
        from: &Version,
        to: &Version,
        output: Value,
    ) -> Result<Value, VersioningError> {
        let component = self.component(name).ok_or_else(|| not_found(name))?;
        let migratable = component
            .as_migratable()
            .ok_or_else(|| MigrationError::new(name, from, to, "component does not support migration"))?;
        if !migratable.can_migrate(from, to) {
            return Err(MigrationError::new(name, from, to, "no migration path available").into());
        }
        Ok(migratable.migrate_output(from, to, output)?)
    }

    /// Collector statistics with request counts for deprecated versions filled in
    pub fn usage_stats(&self, name: &str) -> Option<VersionUsageStats> {
        let metrics = self.metrics.as_ref()?.metrics(name)?;
        let mut stats = metrics.usage_stats();

        if let Some(meta) = self.meta(name) {
            stats.deprecated_usage = metrics
                .version_metrics
                .iter()
                .filter(|(version, _)| meta.is_deprecated(&parse_version(version)))
                .map(|(version, count)| (version.clone(), *count))
                .collect();
        }
        Some(stats)
    }

    fn supporting(&self, name: &str, version: &Version) -> Result<SharedComponent, VersioningError> {
        let component = self.component(name).ok_or_else(|| not_found(name))?;
        if !component.is_version_supported(version) {
            return Err(VersionError::new(
                name,
                version.clone(),
                component.supported_versions(),
                "version not supported",
            )
            .into());
        }
        Ok(component)
    }

    fn snapshot(&self) -> Vec<(String, SharedComponent)> {
        self.registry
            .read()
            .components
            .iter()
            .map(|(name, component)| (name.clone(), Arc::clone(component)))
            .collect()
    }

    /// Count a failure raised while serving `name` outside [`Manager::process_versioned`]
    pub fn record_error(&self, name: &str, version: &Version, error: &VersioningError) {
        if let Some(metrics) = &self.metrics {
            metrics.record_error(name, version, error);
        }
    }
}
