//! Request version detection
//!
//! A [`Detector`] walks its configured [`DetectionMethod`]s in order and
//! returns the first non-zero version it finds. Detection never fails: when
//! nothing matches, the configured default version is returned.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{
    API_VERSION_HEADER, COMPONENT_HEADER, COMPONENT_QUERY_PARAM, DEFAULT_ACCEPT_HEADER_PREFIX,
    DEFAULT_CONTEXT_KEY, DEFAULT_QUERY_PARAM_NAME, DEFAULT_VERSION_SOURCE, DetectorConfig,
    X_API_VERSION_HEADER,
};
use crate::version::context::{ContextValue, RequestContext};
use crate::version::semver::{Version, default_version, parse_version};

/// Read-only view of an inbound request
///
/// Header lookups must be case-insensitive.
pub trait InboundRequest {
    fn header(&self, name: &str) -> Option<&str>;

    /// First value of a query parameter
    fn query_param(&self, name: &str) -> Option<String>;

    fn path(&self) -> &str;

    fn context(&self) -> Option<&RequestContext>;
}

/// A strategy for extracting the requested version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    AcceptHeader,
    ApiVersionHeader,
    XApiVersionHeader,
    QueryParameter,
    UrlPath,
    ContextValue,
    Default,
}

impl DetectionMethod {
    /// All methods in default priority order
    pub const ALL: [DetectionMethod; 7] = [
        DetectionMethod::AcceptHeader,
        DetectionMethod::ApiVersionHeader,
        DetectionMethod::XApiVersionHeader,
        DetectionMethod::QueryParameter,
        DetectionMethod::UrlPath,
        DetectionMethod::ContextValue,
        DetectionMethod::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::AcceptHeader => "Accept Header",
            DetectionMethod::ApiVersionHeader => "API-Version Header",
            DetectionMethod::XApiVersionHeader => "X-API-Version Header",
            DetectionMethod::QueryParameter => "Query Parameter",
            DetectionMethod::UrlPath => "URL Path",
            DetectionMethod::ContextValue => "Context Value",
            DetectionMethod::Default => "Default",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of version detection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    pub version: Version,
    pub method: DetectionMethod,
    /// Literal value the version was read from
    pub source: String,
}

impl DetectionResult {
    fn new(version: Version, method: DetectionMethod, source: impl Into<String>) -> Self {
        Self {
            version,
            method,
            source: source.into(),
        }
    }
}

/// Resolves the API version a request targets
#[derive(Debug, Clone, PartialEq)]
pub struct Detector {
    default_version: Version,
    methods: Vec<DetectionMethod>,
    accept_header_prefix: String,
    query_param_name: String,
    context_key: String,
}

impl Default for Detector {
    fn default() -> Self {
        Self {
            default_version: default_version(),
            methods: DetectionMethod::ALL.to_vec(),
            accept_header_prefix: DEFAULT_ACCEPT_HEADER_PREFIX.to_string(),
            query_param_name: DEFAULT_QUERY_PARAM_NAME.to_string(),
            context_key: DEFAULT_CONTEXT_KEY.to_string(),
        }
    }
}

impl Detector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self {
            default_version: config.default_version.clone(),
            methods: config.methods.clone(),
            accept_header_prefix: config.accept_header_prefix.clone(),
            query_param_name: config.query_param_name.clone(),
            context_key: config.context_key.clone(),
        }
    }

    pub fn with_default_version(mut self, version: Version) -> Self {
        self.default_version = version;
        self
    }

    /// Replace the enabled methods; evaluation follows the given order
    ///
    /// A listed [`DetectionMethod::Default`] ends evaluation with the default
    /// version, so methods placed after it are never consulted.
    pub fn with_methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = DetectionMethod>,
    {
        self.methods = methods.into_iter().collect();
        self
    }

    pub fn with_accept_header_prefix(mut self, prefix: &str) -> Self {
        self.accept_header_prefix = prefix.to_string();
        self
    }

    pub fn with_query_param_name(mut self, name: &str) -> Self {
        self.query_param_name = name.to_string();
        self
    }

    pub fn with_context_key(mut self, key: &str) -> Self {
        self.context_key = key.to_string();
        self
    }

    pub fn default_version(&self) -> &Version {
        &self.default_version
    }

    pub fn methods(&self) -> &[DetectionMethod] {
        &self.methods
    }

    pub fn context_key(&self) -> &str {
        &self.context_key
    }

    /// Detect the version using every enabled method in order
    pub fn detect_from_request<R>(&self, request: &R) -> DetectionResult
    where
        R: InboundRequest + ?Sized,
    {
        for method in &self.methods {
            let found = match method {
                DetectionMethod::AcceptHeader => self.from_accept_header(request),
                DetectionMethod::ApiVersionHeader => from_header(request, API_VERSION_HEADER),
                DetectionMethod::XApiVersionHeader => from_header(request, X_API_VERSION_HEADER),
                DetectionMethod::QueryParameter => self.from_query(request),
                DetectionMethod::UrlPath => from_path(request),
                DetectionMethod::ContextValue => request
                    .context()
                    .and_then(|ctx| self.from_context(ctx)),
                // Methods listed after `Default` are never consulted
                DetectionMethod::Default => break,
            };

            if let Some((version, source)) = found
                && !version.is_zero()
            {
                debug!("Detected version {} via {} ({})", version, method, source);
                return DetectionResult::new(version, *method, source);
            }
        }

        self.fallback()
    }

    /// Detect the version stored in a request context
    pub fn detect_from_context(&self, context: &RequestContext) -> DetectionResult {
        match self.from_context(context) {
            Some((version, source)) if !version.is_zero() => {
                DetectionResult::new(version, DetectionMethod::ContextValue, source)
            }
            _ => self.fallback(),
        }
    }

    pub fn detect_version<R>(&self, request: &R) -> Version
    where
        R: InboundRequest + ?Sized,
    {
        self.detect_from_request(request).version
    }

    /// First path segment after an optional leading version segment
    ///
    /// `/v2/users/42` and `/users/42` both yield `users`.
    pub fn extract_target_from_path<R>(&self, request: &R) -> Option<String>
    where
        R: InboundRequest + ?Sized,
    {
        let mut segments = request.path().split('/').filter(|s| !s.is_empty()).peekable();
        if segments.peek().is_some_and(|s| s.starts_with('v')) {
            segments.next();
        }
        segments.next().map(str::to_string)
    }

    /// Target component from the `X-Component` header, the `component` query parameter, or the path
    pub fn extract_component<R>(&self, request: &R) -> Option<String>
    where
        R: InboundRequest + ?Sized,
    {
        if let Some(component) = request.header(COMPONENT_HEADER)
            && !component.is_empty()
        {
            return Some(component.to_string());
        }
        if let Some(component) = request.query_param(COMPONENT_QUERY_PARAM)
            && !component.is_empty()
        {
            return Some(component);
        }
        self.extract_target_from_path(request)
    }

    fn fallback(&self) -> DetectionResult {
        DetectionResult::new(
            self.default_version.clone(),
            DetectionMethod::Default,
            DEFAULT_VERSION_SOURCE,
        )
    }

    // application/vnd.api.v2+json -> v2
    fn from_accept_header<R>(&self, request: &R) -> Option<(Version, String)>
    where
        R: InboundRequest + ?Sized,
    {
        let accept = request.header("Accept")?;
        if self.accept_header_prefix.is_empty() {
            return None;
        }
        let (_, rest) = accept.split_once(self.accept_header_prefix.as_str())?;
        let token = rest.split('+').next().unwrap_or_default();
        Some((parse_version(&format!("v{}", token)), accept.to_string()))
    }

    fn from_query<R>(&self, request: &R) -> Option<(Version, String)>
    where
        R: InboundRequest + ?Sized,
    {
        let value = request.query_param(&self.query_param_name)?;
        Some((parse_version(&value), value))
    }

    fn from_context(&self, context: &RequestContext) -> Option<(Version, String)> {
        match context.value(&self.context_key)? {
            ContextValue::Version(version) => Some((version.clone(), self.context_key.clone())),
            ContextValue::Text(text) if !text.is_empty() => Some((parse_version(text), text.clone())),
            _ => None,
        }
    }
}

fn from_header<R>(request: &R, name: &str) -> Option<(Version, String)>
where
    R: InboundRequest + ?Sized,
{
    let value = request.header(name)?;
    Some((parse_version(value), value.to_string()))
}

fn from_path<R>(request: &R) -> Option<(Version, String)>
where
    R: InboundRequest + ?Sized,
{
    let segment = request.path().split('/').find(|s| !s.is_empty())?;
    if !segment.starts_with('v') {
        return None;
    }
    Some((parse_version(segment), segment.to_string()))
}
