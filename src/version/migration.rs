//! Payload migration between component versions
//!
//! A [`Migrator`] holds one table of direct `(from, to)` migrations per
//! component. Lookups are single-hop: a request from v1 to v3 fails unless a
//! v1 -> v3 entry exists, even when v1 -> v2 and v2 -> v3 are registered.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::MigrationConfig;
use crate::version::error::{BoxError, MigrationError};
use crate::version::semver::Version;
use crate::version::transform::{TransformError, apply_transform};

/// How a migration converts its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStrategy {
    /// Versions cannot be migrated
    None,
    /// Field mappings
    Automatic,
    /// User-supplied function
    Custom,
    /// Field mappings, same as `Automatic`
    Fallback,
}

impl fmt::Display for MigrationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationStrategy::None => "none",
            MigrationStrategy::Automatic => "automatic",
            MigrationStrategy::Custom => "custom",
            MigrationStrategy::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// Maps a field of the source payload onto the target payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub from_field: String,
    pub to_field: String,
    /// Transform hook name: string, int, float, bool, lowercase, uppercase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    /// Written when the source field is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub required: bool,
}

impl FieldMapping {
    pub fn new(from_field: &str, to_field: &str) -> Self {
        Self {
            from_field: from_field.to_string(),
            to_field: to_field.to_string(),
            ..Default::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_transform(mut self, hook: &str) -> Self {
        self.transform = Some(hook.to_string());
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    fn reversed(&self) -> Self {
        Self {
            from_field: self.to_field.clone(),
            to_field: self.from_field.clone(),
            transform: None,
            default_value: None,
            required: self.required,
        }
    }
}

/// Custom migration callback
pub trait MigrationFn: Send + Sync {
    fn migrate(&self, from: &Version, to: &Version, input: Value) -> Result<Value, BoxError>;
}

impl<F> MigrationFn for F
where
    F: Fn(&Version, &Version, Value) -> Result<Value, BoxError> + Send + Sync,
{
    fn migrate(&self, from: &Version, to: &Version, input: Value) -> Result<Value, BoxError> {
        self(from, to, input)
    }
}

/// A direct migration between two versions
#[derive(Clone, Serialize)]
pub struct VersionMigration {
    pub from: Version,
    pub to: Version,
    pub strategy: MigrationStrategy,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub field_mappings: Vec<FieldMapping>,
    #[serde(skip)]
    pub custom: Option<Arc<dyn MigrationFn>>,
    pub reversible: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub examples: HashMap<String, Value>,
}

impl fmt::Debug for VersionMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionMigration")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("strategy", &self.strategy)
            .field("field_mappings", &self.field_mappings)
            .field("custom", &self.custom.is_some())
            .field("reversible", &self.reversible)
            .field("description", &self.description)
            .finish()
    }
}

impl VersionMigration {
    pub fn new(from: Version, to: Version, strategy: MigrationStrategy) -> Self {
        Self {
            from,
            to,
            strategy,
            field_mappings: Vec::new(),
            custom: None,
            reversible: false,
            description: String::new(),
            examples: HashMap::new(),
        }
    }

    pub fn with_field_mappings(mut self, mappings: Vec<FieldMapping>) -> Self {
        self.field_mappings = mappings;
        self
    }

    pub fn with_custom(mut self, migration: impl MigrationFn + 'static) -> Self {
        self.custom = Some(Arc::new(migration));
        self
    }

    pub fn with_reversible(mut self, reversible: bool) -> Self {
        self.reversible = reversible;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_example(mut self, name: &str, example: Value) -> Self {
        self.examples.insert(name.to_string(), example);
        self
    }

    /// Reverse entry registered for reversible migrations
    ///
    /// Defaults, transforms and custom functions do not carry over.
    fn reverse(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
            strategy: self.strategy,
            field_mappings: self.field_mappings.iter().map(FieldMapping::reversed).collect(),
            custom: None,
            reversible: false,
            description: format!("Reverse migration: {}", self.description),
            examples: HashMap::new(),
        }
    }
}

impl From<&MigrationConfig> for VersionMigration {
    fn from(config: &MigrationConfig) -> Self {
        let description = if config.description.is_empty() {
            format!("Automatic migration from {} to {}", config.from, config.to)
        } else {
            config.description.clone()
        };
        VersionMigration::new(config.from.clone(), config.to.clone(), config.strategy)
            .with_field_mappings(config.field_mappings.clone())
            .with_reversible(config.reversible)
            .with_description(&description)
    }
}

type MigrationKey = (String, String);

fn migration_key(from: &Version, to: &Version) -> MigrationKey {
    (from.key(), to.key())
}

/// Opaque versions are only identical to themselves; others compare on `major.minor.patch`
fn is_same_version(from: &Version, to: &Version) -> bool {
    if from.is_opaque() || to.is_opaque() {
        return from.key() == to.key();
    }
    from.compare(to).is_eq()
}

/// Migration table for one component
pub struct Migrator {
    component: String,
    migrations: RwLock<IndexMap<MigrationKey, Arc<VersionMigration>>>,
}

impl fmt::Debug for Migrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migrator")
            .field("component", &self.component)
            .field("migrations", &self.migrations.read().len())
            .finish()
    }
}

impl Migrator {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            migrations: RwLock::new(IndexMap::new()),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// Store a migration, plus its reverse when it is reversible
    pub fn add_migration(&self, migration: VersionMigration) {
        debug!(
            "Adding {} migration {} -> {} for {}",
            migration.strategy, migration.from, migration.to, self.component
        );

        let reverse = migration.reversible.then(|| migration.reverse());
        let mut migrations = self.migrations.write();
        migrations.insert(
            migration_key(&migration.from, &migration.to),
            Arc::new(migration),
        );
        if let Some(reverse) = reverse {
            migrations.insert(migration_key(&reverse.from, &reverse.to), Arc::new(reverse));
        }
    }

    pub fn add_custom_migration(
        &self,
        from: Version,
        to: Version,
        migration: impl MigrationFn + 'static,
        reversible: bool,
        description: &str,
    ) {
        self.add_migration(
            VersionMigration::new(from, to, MigrationStrategy::Custom)
                .with_custom(migration)
                .with_reversible(reversible)
                .with_description(description),
        );
    }

    pub fn add_automatic_migration(
        &self,
        from: Version,
        to: Version,
        field_mappings: Vec<FieldMapping>,
        reversible: bool,
    ) {
        let description = format!("Automatic migration from {} to {}", from, to);
        self.add_migration(
            VersionMigration::new(from, to, MigrationStrategy::Automatic)
                .with_field_mappings(field_mappings)
                .with_reversible(reversible)
                .with_description(&description),
        );
    }

    /// Remove a single direction; returns whether an entry existed
    pub fn remove_migration(&self, from: &Version, to: &Version) -> bool {
        self.migrations
            .write()
            .shift_remove(&migration_key(from, to))
            .is_some()
    }

    /// Convert `input` from one version to another
    pub fn migrate(&self, from: &Version, to: &Version, input: Value) -> Result<Value, MigrationError> {
        if is_same_version(from, to) {
            return Ok(input);
        }

        let migration = self.lookup(from, to).ok_or_else(|| {
            MigrationError::new(&self.component, from, to, "no migration path available")
        })?;

        match migration.strategy {
            MigrationStrategy::None => Err(MigrationError::new(
                &self.component,
                from,
                to,
                "migration not supported",
            )),
            MigrationStrategy::Custom => {
                let Some(custom) = &migration.custom else {
                    return Err(MigrationError::new(
                        &self.component,
                        from,
                        to,
                        "custom migration function not provided",
                    ));
                };
                custom.migrate(from, to, input).map_err(|e| {
                    MigrationError::new(&self.component, from, to, "custom migration failed")
                        .with_cause(e)
                })
            }
            MigrationStrategy::Automatic | MigrationStrategy::Fallback => {
                apply_field_mappings(&migration.field_mappings, input).map_err(|e| {
                    MigrationError::new(&self.component, from, to, "automatic migration failed")
                        .with_cause(e)
                })
            }
        }
    }

    /// Flatten a serializable struct by its serde field names, then migrate it
    pub fn migrate_serializable<T>(&self, from: &Version, to: &Version, input: &T) -> Result<Value, MigrationError>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(input).map_err(|e| {
            MigrationError::new(&self.component, from, to, "automatic migration failed")
                .with_cause(TransformError::from(e))
        })?;
        self.migrate(from, to, value)
    }

    pub fn can_migrate(&self, from: &Version, to: &Version) -> bool {
        is_same_version(from, to) || self.lookup(from, to).is_some()
    }

    /// Direct migration between two versions, empty for identical versions
    pub fn migration_path(&self, from: &Version, to: &Version) -> Result<Vec<Arc<VersionMigration>>, MigrationError> {
        if is_same_version(from, to) {
            return Ok(Vec::new());
        }
        self.lookup(from, to)
            .map(|migration| vec![migration])
            .ok_or_else(|| MigrationError::new(&self.component, from, to, "no migration path found"))
    }

    /// All registered migrations in insertion order
    pub fn supported_migrations(&self) -> Vec<Arc<VersionMigration>> {
        self.migrations.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.migrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.read().is_empty()
    }

    fn lookup(&self, from: &Version, to: &Version) -> Option<Arc<VersionMigration>> {
        self.migrations.read().get(&migration_key(from, to)).cloned()
    }
}

fn apply_field_mappings(mappings: &[FieldMapping], input: Value) -> Result<Value, TransformError> {
    let source = match input {
        Value::Object(map) => map,
        other => return Ok(other),
    };

    let mut result = Map::new();
    for mapping in mappings {
        match source.get(&mapping.from_field) {
            Some(value) => {
                let value = apply_transform(
                    &mapping.from_field,
                    value.clone(),
                    mapping.transform.as_deref(),
                )?;
                result.insert(mapping.to_field.clone(), value);
            }
            None => {
                if let Some(default) = &mapping.default_value {
                    result.insert(mapping.to_field.clone(), default.clone());
                } else if mapping.required {
                    return Err(TransformError::MissingField(mapping.from_field.clone()));
                }
            }
        }
    }

    let mapped: HashSet<&str> = mappings.iter().map(|m| m.from_field.as_str()).collect();
    for (key, value) in source.iter() {
        if !mapped.contains(key.as_str()) {
            result.insert(key.clone(), value.clone());
        }
    }

    Ok(Value::Object(result))
}

/// Per-component migrators, created on first use
#[derive(Debug, Default)]
pub struct Migrators {
    migrators: RwLock<HashMap<String, Arc<Migrator>>>,
}

impl Migrators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, component: &str) -> Option<Arc<Migrator>> {
        self.migrators.read().get(component).cloned()
    }

    pub fn get_or_create(&self, component: &str) -> Arc<Migrator> {
        if let Some(migrator) = self.get(component) {
            return migrator;
        }
        self.migrators
            .write()
            .entry(component.to_string())
            .or_insert_with(|| Arc::new(Migrator::new(component)))
            .clone()
    }

    pub fn register(&self, component: &str, migration: VersionMigration) {
        self.get_or_create(component).add_migration(migration);
    }

    pub fn remove(&self, component: &str) -> Option<Arc<Migrator>> {
        self.migrators.write().remove(component)
    }

    /// Component names, sorted
    pub fn components(&self) -> Vec<String> {
        let mut names: Vec<String> = self.migrators.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Register every configured migration and return how many were added
    pub fn load_config(&self, configs: &[MigrationConfig]) -> usize {
        for config in configs {
            if config.strategy == MigrationStrategy::Custom {
                warn!(
                    "Migration {} -> {} for {} uses the custom strategy but config cannot supply a function",
                    config.from, config.to, config.component
                );
            }
            self.register(&config.component, VersionMigration::from(config));
        }
        configs.len()
    }
}
