//! Components shared by the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Value, json};

use gateway_version::version::error::{MigrationError, VersioningError};
use gateway_version::version::{
    DeprecatableComponent, DeprecationInfo, FieldMapping, MigratableComponent, Migrator,
    VersionedComponent, VersionedRequest, VersionedResponse, Version, parse_version,
};

/// Minimal service that echoes its input tagged with the serving version
pub struct EchoService {
    name: String,
    kind: String,
    versions: Vec<Version>,
}

impl EchoService {
    pub fn new(name: &str, kind: &str, versions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            versions: versions.iter().map(|v| parse_version(v)).collect(),
        }
    }

    pub fn shared(name: &str, kind: &str, versions: &[&str]) -> Arc<dyn VersionedComponent> {
        Arc::new(Self::new(name, kind, versions))
    }
}

impl VersionedComponent for EchoService {
    fn name(&self) -> &str {
        &self.name
    }

    fn component_type(&self) -> &str {
        &self.kind
    }

    fn supported_versions(&self) -> Vec<Version> {
        self.versions.clone()
    }

    fn default_version(&self) -> Version {
        self.versions.first().cloned().unwrap_or_default()
    }

    fn process_versioned(
        &self,
        request: &VersionedRequest,
        input: Value,
    ) -> Result<VersionedResponse, VersioningError> {
        if input.get("fail").is_some() {
            return Err(VersioningError::component(&self.name, "requested failure"));
        }
        Ok(VersionedResponse::from_request(request)
            .with_data(json!({ "served_by": request.version.to_string(), "input": input })))
    }
}

/// Users service: serves v1 and v2, deprecates v1 and migrates payloads between them
pub struct UsersService {
    migrator: Migrator,
}

impl UsersService {
    pub fn new() -> Self {
        let migrator = Migrator::new("users");
        migrator.add_automatic_migration(
            parse_version("v1.0.0"),
            parse_version("v2.0.0"),
            user_field_mappings(),
            true,
        );
        Self { migrator }
    }

    pub fn shared() -> Arc<dyn VersionedComponent> {
        Arc::new(Self::new())
    }
}

/// v1 -> v2 field mappings for user records
pub fn user_field_mappings() -> Vec<FieldMapping> {
    vec![
        FieldMapping::new("name", "display_name").required(),
        FieldMapping::new("email", "email").required(),
        FieldMapping::new("id", "user_id").required(),
    ]
}

impl VersionedComponent for UsersService {
    fn name(&self) -> &str {
        "users"
    }

    fn component_type(&self) -> &str {
        "service"
    }

    fn supported_versions(&self) -> Vec<Version> {
        vec![parse_version("v1.0.0"), parse_version("v2.0.0")]
    }

    fn default_version(&self) -> Version {
        parse_version("v2.0.0")
    }

    fn process_versioned(
        &self,
        request: &VersionedRequest,
        input: Value,
    ) -> Result<VersionedResponse, VersioningError> {
        let latest = self.default_version();
        let data = self.migrator.migrate(&request.version, &latest, input)?;
        Ok(VersionedResponse::from_request(request).with_data(data))
    }

    fn as_deprecatable(&self) -> Option<&dyn DeprecatableComponent> {
        Some(self)
    }

    fn as_migratable(&self) -> Option<&dyn MigratableComponent> {
        Some(self)
    }
}

impl DeprecatableComponent for UsersService {
    fn is_version_deprecated(&self, version: &Version) -> bool {
        version.major() == 1
    }

    fn deprecation_info(&self, version: &Version) -> Option<DeprecationInfo> {
        self.is_version_deprecated(version).then(|| DeprecationInfo {
            version: version.clone(),
            deprecated_at: "2024-01-01T00:00:00Z".to_string(),
            sunset_at: Some("2025-01-01T00:00:00Z".to_string()),
            reason: "replaced by v2 user records".to_string(),
            replacement: Some(parse_version("v2.0.0")),
        })
    }
}

impl MigratableComponent for UsersService {
    fn migrate_input(&self, from: &Version, to: &Version, input: Value) -> Result<Value, MigrationError> {
        self.migrator.migrate(from, to, input)
    }

    fn migrate_output(&self, from: &Version, to: &Version, output: Value) -> Result<Value, MigrationError> {
        self.migrator.migrate(from, to, output)
    }

    fn can_migrate(&self, from: &Version, to: &Version) -> bool {
        self.migrator.can_migrate(from, to)
    }
}

/// The v1 user record used across tests
pub fn v1_user() -> Value {
    json!({
        "id": 123,
        "name": "John Doe",
        "email": "john@example.com",
        "role": "admin"
    })
}
