//! Versioned request and response envelopes

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::version::context::RequestContext;
use crate::version::semver::Version;

/// A call routed to a specific component version
///
/// Built by the caller (manager or detection layer) and treated as read-only
/// once dispatched.
#[derive(Debug, Clone, Serialize)]
pub struct VersionedRequest {
    #[serde(skip)]
    pub context: RequestContext,
    pub version: Version,
    pub component: String,
    pub operation: String,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
}

impl VersionedRequest {
    pub fn new(context: RequestContext, version: Version, component: &str) -> Self {
        Self {
            context,
            version,
            component: component.to_string(),
            operation: String::new(),
            request_id: String::new(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = operation.to_string();
        self
    }

    pub fn with_request_id(mut self, request_id: &str) -> Self {
        self.request_id = request_id.to_string();
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

/// Result produced by a component for a [`VersionedRequest`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionedResponse {
    pub version: Version,
    pub component: String,
    pub operation: String,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl VersionedResponse {
    /// Start a response echoing the request's version, component, operation and id
    pub fn from_request(request: &VersionedRequest) -> Self {
        Self {
            version: request.version.clone(),
            component: request.component.clone(),
            operation: request.operation.clone(),
            request_id: request.request_id.clone(),
            timestamp: Utc::now(),
            data: None,
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_error(mut self, error: &dyn std::error::Error) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::semver::parse_version;
    use serde_json::json;

    #[test]
    fn response_echoes_request_identity() {
        let request = VersionedRequest::new(RequestContext::new(), parse_version("v2.0.0"), "users")
            .with_operation("get_user")
            .with_request_id("req-1")
            .with_metadata("tenant", "acme");

        let response = VersionedResponse::from_request(&request).with_data(json!({"id": 1}));

        assert_eq!(response.version, request.version);
        assert_eq!(response.component, "users");
        assert_eq!(response.operation, "get_user");
        assert_eq!(response.request_id, "req-1");
        assert_eq!(request.metadata("tenant"), Some(&json!("acme")));
    }

    #[test]
    fn response_serialization_skips_empty_fields() {
        let request = VersionedRequest::new(RequestContext::new(), parse_version("v1.0.0"), "users");
        let response = VersionedResponse::from_request(&request);

        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["version"], json!("v1.0.0"));
        assert!(value.get("data").is_none());
        assert!(value.get("error").is_none());
        assert!(value.get("metadata").is_none());
    }
}
