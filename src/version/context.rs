//! Request-scoped context: cancellation plus a small keyed value bag

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_CONTEXT_KEY;
use crate::version::semver::Version;

/// A value stored in a [`RequestContext`]
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    Version(Version),
    Text(String),
    Json(serde_json::Value),
}

impl From<Version> for ContextValue {
    fn from(value: Version) -> Self {
        ContextValue::Version(value)
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        ContextValue::Text(value.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        ContextValue::Text(value)
    }
}

impl From<serde_json::Value> for ContextValue {
    fn from(value: serde_json::Value) -> Self {
        ContextValue::Json(value)
    }
}

/// Cancellable context carried by every versioned request
///
/// Cloning shares the cancellation token, so cancelling any clone cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancellation: CancellationToken,
    values: HashMap<String, ContextValue>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context bound to an existing cancellation token
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            cancellation: token,
            values: HashMap::new(),
        }
    }

    pub fn with_value(mut self, key: &str, value: impl Into<ContextValue>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// Store the resolved API version under the default context key
    pub fn with_version(self, version: Version) -> Self {
        self.with_value(DEFAULT_CONTEXT_KEY, version)
    }

    pub fn value(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    /// The typed version stored under the default context key
    pub fn version(&self) -> Option<&Version> {
        match self.values.get(DEFAULT_CONTEXT_KEY) {
            Some(ContextValue::Version(version)) => Some(version),
            _ => None,
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::semver::parse_version;

    #[test]
    fn with_version_is_readable_through_default_key() {
        let ctx = RequestContext::new().with_version(parse_version("v2.0.0"));

        assert_eq!(ctx.version(), Some(&parse_version("v2.0.0")));
        assert_eq!(
            ctx.value(DEFAULT_CONTEXT_KEY),
            Some(&ContextValue::Version(parse_version("v2.0.0")))
        );
    }

    #[test]
    fn string_value_is_not_a_typed_version() {
        let ctx = RequestContext::new().with_value(DEFAULT_CONTEXT_KEY, "v2.0.0");

        assert_eq!(ctx.version(), None);
        assert_eq!(
            ctx.value(DEFAULT_CONTEXT_KEY),
            Some(&ContextValue::Text("v2.0.0".to_string()))
        );
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let ctx = RequestContext::new();
        let clone = ctx.clone();

        clone.cancel();

        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn cancellation_wakes_waiters() {
        let token = CancellationToken::new();
        let ctx = RequestContext::with_cancellation(token.clone());

        let waiter = tokio::spawn({
            let token = ctx.cancellation_token().clone();
            async move { token.cancelled().await }
        });
        token.cancel();

        waiter.await.unwrap();
        assert!(ctx.is_cancelled());
    }
}
