//! HTTP glue for the versioning core
//!
//! Reads version hints from `http::Request`s and writes responses that carry
//! the resolved version in `X-API-Version`.

use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};
use url::form_urlencoded;
use uuid::Uuid;

use crate::config::{COMPONENT_HEADER, DETECTION_METHOD_HEADER, REQUEST_ID_HEADER, X_API_VERSION_HEADER};
use crate::version::context::RequestContext;
use crate::version::detector::{DetectionMethod, DetectionResult, Detector, InboundRequest};
use crate::version::error::{ValidationError, VersioningError};
use crate::version::manager::Manager;
use crate::version::request::{VersionedRequest, VersionedResponse};
use crate::version::semver::Version;

impl<B> InboundRequest for Request<B> {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name)?.to_str().ok()
    }

    fn query_param(&self, name: &str) -> Option<String> {
        let query = self.uri().query()?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    fn path(&self) -> &str {
        self.uri().path()
    }

    fn context(&self) -> Option<&RequestContext> {
        self.extensions().get::<RequestContext>()
    }
}

/// Detect the request's version and store it for downstream handlers
///
/// The request's [`RequestContext`] (created if missing) receives the version
/// under the detector's context key, and the [`DetectionResult`] is added to
/// the extensions.
pub fn annotate_request<B>(detector: &Detector, request: &mut Request<B>) -> DetectionResult {
    let result = detector.detect_from_request(&*request);

    let context = request
        .extensions_mut()
        .remove::<RequestContext>()
        .unwrap_or_default()
        .with_value(detector.context_key(), result.version.clone());
    request.extensions_mut().insert(context);
    request.extensions_mut().insert(result.clone());

    result
}

/// Set `X-API-Version` and `X-Version-Detection-Method`
pub fn set_detection_headers(headers: &mut HeaderMap, result: &DetectionResult) {
    set_header(headers, X_API_VERSION_HEADER, &result.version.to_string());
    set_header(headers, DETECTION_METHOD_HEADER, result.method.as_str());
}

/// Incoming `X-Request-ID`, or a fresh UUID v4
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// JSON response tagged with the resolved version
pub fn versioned_json<T>(
    status: StatusCode,
    version: &Version,
    data: &T,
) -> Result<Response<Vec<u8>>, serde_json::Error>
where
    T: Serialize + ?Sized,
{
    let mut response = Response::new(serde_json::to_vec(data)?);
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    set_header(headers, X_API_VERSION_HEADER, &version.to_string());
    Ok(response)
}

/// Encode a [`VersionedResponse`], echoing its component and request id
pub fn versioned_response(
    status: StatusCode,
    response: &VersionedResponse,
) -> Result<Response<Vec<u8>>, serde_json::Error> {
    let mut http_response = versioned_json(status, &response.version, response)?;
    let headers = http_response.headers_mut();
    set_header(headers, COMPONENT_HEADER, &response.component);
    if !response.request_id.is_empty() {
        set_header(headers, REQUEST_ID_HEADER, &response.request_id);
    }
    Ok(http_response)
}

/// JSON body written for versioning failures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub component: String,
    pub requested_version: String,
    pub supported_versions: Vec<String>,
    pub error_code: String,
}

impl From<&VersioningError> for ErrorBody {
    fn from(err: &VersioningError) -> Self {
        let (error, requested, supported) = match err {
            VersioningError::Version(e) => (
                e.message.clone(),
                e.requested.to_string(),
                e.supported.iter().map(|v| v.to_string()).collect(),
            ),
            VersioningError::Migration(e) => (err.to_string(), e.from.to_string(), Vec::new()),
            VersioningError::Compatibility(e) => (err.to_string(), e.version.to_string(), Vec::new()),
            VersioningError::Deprecation(e) => (err.to_string(), e.version.to_string(), Vec::new()),
            VersioningError::Configuration(e) => (err.to_string(), e.version.to_string(), Vec::new()),
            VersioningError::Validation(e) => (err.to_string(), e.version.to_string(), Vec::new()),
            _ => (err.to_string(), String::new(), Vec::new()),
        };

        Self {
            error,
            component: err.component_name().unwrap_or_default().to_string(),
            requested_version: requested,
            supported_versions: supported,
            error_code: err.code().to_string(),
        }
    }
}

/// Error response: 404 for unknown components, 406 for everything else
pub fn version_error_response(
    version: &Version,
    err: &VersioningError,
    request_id: Option<&str>,
) -> Result<Response<Vec<u8>>, serde_json::Error> {
    let body = ErrorBody::from(err);
    let mut response = versioned_json(err.status_code(), version, &body)?;

    let headers = response.headers_mut();
    set_header(headers, COMPONENT_HEADER, &body.component);
    if let Some(request_id) = request_id.filter(|id| !id.is_empty()) {
        set_header(headers, REQUEST_ID_HEADER, request_id);
    }
    Ok(response)
}

/// Serve an HTTP request with the component it names
///
/// Components with the HTTP capability get the request itself; requests that
/// carried no version go to their unversioned handler. Other components get
/// the JSON body through [`VersionedComponent::process_versioned`]. Failures
/// are counted by the manager and written with [`version_error_response`].
///
/// [`VersionedComponent::process_versioned`]: crate::version::VersionedComponent::process_versioned
pub fn dispatch_http(
    manager: &Manager,
    mut request: Request<Vec<u8>>,
) -> Result<Response<Vec<u8>>, serde_json::Error> {
    let detection = annotate_request(manager.detector(), &mut request);
    let id = request_id(request.headers());
    let name = manager
        .detector()
        .extract_component(&request)
        .unwrap_or_default();
    let version = detection.version.clone();

    let result = manager.get(&name, &version).and_then(|component| {
        let context = request
            .extensions()
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default();

        match component.as_http_versioned() {
            Some(handler) if detection.method == DetectionMethod::Default => {
                handler.handle_http(&context, &request)
            }
            Some(handler) => {
                let versioned = VersionedRequest::new(context, version.clone(), &name)
                    .with_request_id(&id);
                handler.handle_http_versioned(&versioned, &request)
            }
            None => {
                let versioned = VersionedRequest::new(context, version.clone(), &name)
                    .with_request_id(&id);
                let input = json_body(&name, &version, request.body())?;
                let response = component.process_versioned(&versioned, input)?;
                versioned_response(StatusCode::OK, &response)
                    .map_err(|e| VersioningError::component(&name, e))
            }
        }
    });

    match result {
        Ok(mut response) => {
            set_detection_headers(response.headers_mut(), &detection);
            Ok(response)
        }
        Err(err) => {
            debug!("Request for '{}' {} failed: {}", name, version, err);
            manager.record_error(&name, &version, &err);
            version_error_response(&version, &err, Some(&id))
        }
    }
}

// Empty bodies are read as null
fn json_body(name: &str, version: &Version, body: &[u8]) -> Result<serde_json::Value, VersioningError> {
    if body.is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| {
        ValidationError::new(name, version, "request body is not valid JSON")
            .with_errors(vec![e.to_string()])
            .into()
    })
}

fn set_header(headers: &mut HeaderMap, name: &str, value: &str) {
    match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => warn!("Skipping invalid header {}: {:?}", name, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::detector::DetectionMethod;
    use crate::version::component::{HttpVersionedComponent, VersionedComponent};
    use crate::version::error::{ComponentNotFoundError, MigrationError, VersionError};
    use crate::version::metrics::{DefaultMetricsCollector, MetricsCollector};
    use crate::version::semver::parse_version;
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn body(response: &Response<Vec<u8>>) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[test]
    fn request_reads_headers_case_insensitively() {
        let request = Request::builder()
            .uri("/v1/users?version=v2&component=orders%20api")
            .header("x-api-version", "v3")
            .body(())
            .unwrap();

        assert_eq!(request.header("X-API-Version"), Some("v3"));
        assert_eq!(request.query_param("version").as_deref(), Some("v2"));
        assert_eq!(request.query_param("component").as_deref(), Some("orders api"));
        assert_eq!(request.query_param("missing"), None);
        assert_eq!(InboundRequest::path(&request), "/v1/users");
        assert!(request.context().is_none());
    }

    #[test]
    fn annotate_request_stores_version_in_context() {
        let mut request = Request::builder()
            .uri("/v2/users")
            .body(())
            .unwrap();

        let result = annotate_request(&Detector::new(), &mut request);

        assert_eq!(result.method, DetectionMethod::UrlPath);
        let context = request.extensions().get::<RequestContext>().unwrap();
        assert_eq!(context.version(), Some(&parse_version("v2")));
        assert_eq!(request.extensions().get::<DetectionResult>(), Some(&result));
    }

    #[test]
    fn detection_headers_are_set() {
        let mut headers = HeaderMap::new();
        let result = DetectionResult {
            version: parse_version("v2.1.0"),
            method: DetectionMethod::QueryParameter,
            source: "v2.1.0".to_string(),
        };

        set_detection_headers(&mut headers, &result);

        assert_eq!(headers["x-api-version"], "v2.1.0");
        assert_eq!(headers["x-version-detection-method"], "Query Parameter");
    }

    #[test]
    fn request_id_prefers_incoming_header() {
        let mut headers = HeaderMap::new();
        let generated = request_id(&headers);
        assert!(Uuid::parse_str(&generated).is_ok());

        headers.insert("x-request-id", HeaderValue::from_static("req-42"));
        assert_eq!(request_id(&headers), "req-42");
    }

    #[test]
    fn version_error_body_lists_supported_versions() {
        let err = VersioningError::from(VersionError::new(
            "users",
            parse_version("v99"),
            vec![parse_version("v1.0.0"), parse_version("v2.0.0")],
            "version not supported",
        ));

        let response = version_error_response(&parse_version("v99"), &err, Some("req-1")).unwrap();

        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(response.headers()["x-api-version"], "v99");
        assert_eq!(response.headers()["x-component"], "users");
        assert_eq!(response.headers()["x-request-id"], "req-1");
        assert_eq!(
            body(&response),
            json!({
                "error": "version not supported",
                "component": "users",
                "requested_version": "v99",
                "supported_versions": ["v1.0.0", "v2.0.0"],
                "error_code": "VERSION_NOT_SUPPORTED"
            })
        );
    }

    #[test]
    fn unknown_component_maps_to_not_found() {
        let err = VersioningError::from(ComponentNotFoundError::new("orders"));

        let response = version_error_response(&parse_version("v1"), &err, None).unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get("x-request-id").is_none());
        assert_eq!(body(&response)["error_code"], "COMPONENT_NOT_FOUND");
    }

    #[test]
    fn other_errors_use_their_code_or_unknown() {
        let migration = VersioningError::from(MigrationError::new(
            "users",
            &parse_version("v1"),
            &parse_version("v2"),
            "no migration path available",
        ));
        let failure = VersioningError::component("users", "backend unavailable");

        let migration_body = ErrorBody::from(&migration);
        let failure_body = ErrorBody::from(&failure);

        assert_eq!(migration_body.error_code, "MIGRATION_ERROR");
        assert_eq!(migration_body.requested_version, "v1");
        assert_eq!(failure_body.error_code, "UNKNOWN_ERROR");
        assert_eq!(failure_body.error, "component 'users' failed: backend unavailable");
        assert_eq!(
            version_error_response(&parse_version("v1"), &failure, None)
                .unwrap()
                .status(),
            StatusCode::NOT_ACCEPTABLE
        );
    }

    #[test]
    fn versioned_response_echoes_identity_headers() {
        let response = VersionedResponse {
            version: parse_version("v2.0.0"),
            component: "users".to_string(),
            operation: "get".to_string(),
            request_id: "req-7".to_string(),
            timestamp: chrono::Utc::now(),
            data: Some(json!({"id": 1})),
            error: None,
            metadata: Default::default(),
        };

        let http_response = versioned_response(StatusCode::OK, &response).unwrap();

        assert_eq!(http_response.headers()["content-type"], "application/json");
        assert_eq!(http_response.headers()["x-api-version"], "v2.0.0");
        assert_eq!(http_response.headers()["x-component"], "users");
        assert_eq!(http_response.headers()["x-request-id"], "req-7");
        assert_eq!(body(&http_response)["data"], json!({"id": 1}));
    }

    struct Greeter;

    impl VersionedComponent for Greeter {
        fn name(&self) -> &str {
            "greeter"
        }

        fn component_type(&self) -> &str {
            "service"
        }

        fn supported_versions(&self) -> Vec<Version> {
            vec![parse_version("v1.0.0"), parse_version("v2.0.0")]
        }

        fn default_version(&self) -> Version {
            parse_version("v1.0.0")
        }

        fn process_versioned(
            &self,
            _request: &VersionedRequest,
            _input: Value,
        ) -> Result<VersionedResponse, VersioningError> {
            Err(VersioningError::component("greeter", "served over HTTP only"))
        }

        fn as_http_versioned(&self) -> Option<&dyn HttpVersionedComponent> {
            Some(self)
        }
    }

    impl HttpVersionedComponent for Greeter {
        fn handle_http_versioned(
            &self,
            request: &VersionedRequest,
            http_request: &Request<Vec<u8>>,
        ) -> Result<Response<Vec<u8>>, VersioningError> {
            let text = format!("hello from {} at {}", request.version, http_request.uri().path());
            Ok(Response::new(text.into_bytes()))
        }

        fn handle_http(
            &self,
            _context: &RequestContext,
            _http_request: &Request<Vec<u8>>,
        ) -> Result<Response<Vec<u8>>, VersioningError> {
            let mut response = Response::new(b"hello".to_vec());
            *response.status_mut() = StatusCode::ACCEPTED;
            Ok(response)
        }
    }

    struct Echo;

    impl VersionedComponent for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn component_type(&self) -> &str {
            "service"
        }

        fn supported_versions(&self) -> Vec<Version> {
            vec![parse_version("v1.0.0")]
        }

        fn default_version(&self) -> Version {
            parse_version("v1.0.0")
        }

        fn process_versioned(
            &self,
            request: &VersionedRequest,
            input: Value,
        ) -> Result<VersionedResponse, VersioningError> {
            Ok(VersionedResponse::from_request(request).with_data(input))
        }
    }

    fn gateway() -> (Manager, Arc<DefaultMetricsCollector>) {
        let metrics = Arc::new(DefaultMetricsCollector::new());
        let manager = Manager::new().with_metrics_collector(metrics.clone());
        manager.register(Arc::new(Greeter)).unwrap();
        manager.register(Arc::new(Echo)).unwrap();
        (manager, metrics)
    }

    fn http_request(uri: &str, body: &str) -> Request<Vec<u8>> {
        Request::builder()
            .uri(uri)
            .header("x-request-id", "req-9")
            .body(body.as_bytes().to_vec())
            .unwrap()
    }

    #[test]
    fn http_capable_component_receives_the_request() {
        let (manager, _) = gateway();

        let response = dispatch_http(&manager, http_request("/v2/greeter", "")).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_slice(), b"hello from v2 at /v2/greeter");
        assert_eq!(response.headers()["x-api-version"], "v2");
        assert_eq!(response.headers()["x-version-detection-method"], "URL Path");
    }

    #[test]
    fn unversioned_request_uses_plain_http_handler() {
        let (manager, _) = gateway();

        let response = dispatch_http(&manager, http_request("/greeter", "")).unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.body().as_slice(), b"hello");
        assert_eq!(response.headers()["x-api-version"], "v1.0.0");
        assert_eq!(response.headers()["x-version-detection-method"], "Default");
    }

    #[test]
    fn json_component_receives_parsed_body() {
        let (manager, _) = gateway();

        let response = dispatch_http(&manager, http_request("/v1/echo", r#"{"id": 5}"#)).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-component"], "echo");
        assert_eq!(response.headers()["x-request-id"], "req-9");
        assert_eq!(body(&response)["data"], json!({"id": 5}));
    }

    #[test]
    fn dispatch_failures_become_error_responses() {
        let (manager, metrics) = gateway();

        let missing = dispatch_http(&manager, http_request("/v1/orders", "")).unwrap();
        let unsupported = dispatch_http(&manager, http_request("/v3/greeter", "")).unwrap();
        let invalid = dispatch_http(&manager, http_request("/v1/echo", "{not json")).unwrap();

        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(unsupported.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(body(&unsupported)["supported_versions"], json!(["v1.0.0", "v2.0.0"]));
        assert_eq!(invalid.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(invalid.headers()["x-request-id"], "req-9");
        assert_eq!(body(&invalid)["error_code"], "VALIDATION_ERROR");
        assert_eq!(metrics.metrics("echo").unwrap().error_counts.get("v1"), Some(&1));
        assert_eq!(metrics.metrics("greeter").unwrap().error_counts.get("v3"), Some(&1));
    }
}
