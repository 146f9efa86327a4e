//! Salesforce HTTP client with secure credential handling and safe logging.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User agent string for all Salesforce API requests.
const CLIENT_USER_AGENT: &str = concat!("TraceLinker/", env!("CARGO_PKG_VERSION"));

/// Query parameter keys (case-insensitive) that should have their values redacted.
const SENSITIVE_QUERY_PARAMS: &[&str] = &[
    "access_token",
    "refresh_token",
    "client_secret",
    "code",
    "token",
    "sid",
    "session",
    "authorization",
];

// ─────────────────────────────────────────────────────────────────────────────
// LoggingMode
// ─────────────────────────────────────────────────────────────────────────────

/// Controls how URLs are sanitized for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoggingMode {
    /// Log only the path component.
    /// Example: `/services/apexrest/accountLinker/v1/trace-sales/linked`
    #[default]
    PathOnly,

    /// Log path and query parameters, but redact sensitive values.
    /// Example: `/services/apexrest/accountLinker/v1/accounts?term=acme&sid=***`
    PathAndQueryRedacted,
}

// ─────────────────────────────────────────────────────────────────────────────
// OrgCredentials
// ─────────────────────────────────────────────────────────────────────────────

/// Session for the org hosting the linker Apex resource.
///
/// The access token is wrapped in `SecretString` so it never shows up in
/// `Debug` output or logs.
#[derive(Clone)]
pub struct OrgCredentials {
    /// Instance URL (e.g., "https://na1.salesforce.com")
    pub instance_url: String,
    /// OAuth access token or session id
    pub access_token: SecretString,
}

impl std::fmt::Debug for OrgCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrgCredentials")
            .field("instance_url", &self.instance_url)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl OrgCredentials {
    pub fn new(instance_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            instance_url: instance_url.into(),
            access_token: SecretString::from(access_token.into()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// URL Sanitization
// ─────────────────────────────────────────────────────────────────────────────

/// Determines if a query parameter key is sensitive and should be redacted.
fn is_sensitive_param(key: &str) -> bool {
    let key_lower = key.to_ascii_lowercase();
    SENSITIVE_QUERY_PARAMS
        .iter()
        .any(|&sensitive| key_lower == sensitive)
}

/// Sanitizes a URL for safe logging based on the specified mode.
///
/// The result never contains the scheme, host, or fragment.
pub fn sanitize_url_for_logs(url: &Url, mode: LoggingMode) -> String {
    let path = url.path();

    match mode {
        LoggingMode::PathOnly => path.to_string(),
        LoggingMode::PathAndQueryRedacted => {
            let query_pairs: Vec<_> = url.query_pairs().collect();
            if query_pairs.is_empty() {
                return path.to_string();
            }

            let redacted_pairs: Vec<String> = query_pairs
                .into_iter()
                .map(|(key, value)| {
                    if is_sensitive_param(&key) {
                        format!("{}=***", key)
                    } else {
                        format!("{}={}", key, value)
                    }
                })
                .collect();

            format!("{}?{}", path, redacted_pairs.join("&"))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Responses
// ─────────────────────────────────────────────────────────────────────────────

/// Salesforce API error response format.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSalesforceError {
    message: String,
    error_code: String,
}

/// Maps a non-success response to the most specific [`AppError`].
pub(crate) async fn error_from_response(response: reqwest::Response) -> AppError {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED {
        return AppError::SessionExpired;
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        return AppError::RateLimited {
            retry_after_secs: retry_after,
        };
    }

    if status == StatusCode::NOT_FOUND {
        return AppError::NotFound("Linker resource not found".to_string());
    }

    let body = response.text().await.unwrap_or_default();
    error_from_body(status, &body)
}

fn error_from_body(status: StatusCode, body: &str) -> AppError {
    if let Ok(errors) = serde_json::from_str::<Vec<WireSalesforceError>>(body) {
        if let Some(first_error) = errors.first() {
            if first_error.error_code == "REQUEST_LIMIT_EXCEEDED" {
                return AppError::RateLimited {
                    retry_after_secs: None,
                };
            }

            return AppError::SalesforceError(format!(
                "[{}] {}",
                first_error.error_code, first_error.message
            ));
        }
    }

    AppError::SalesforceError(format!(
        "HTTP {} - {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown error")
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// SalesforceClient
// ─────────────────────────────────────────────────────────────────────────────

/// Thread-safe HTTP client for the linker's Salesforce endpoints.
///
/// Credentials sit behind a `RwLock` so the host can hand over a fresh
/// session with [`update_credentials`](Self::update_credentials) while
/// requests are in flight. There is no token refresh here; a 401 surfaces as
/// [`AppError::SessionExpired`].
#[derive(Clone)]
pub struct SalesforceClient {
    http: reqwest::Client,
    creds: Arc<RwLock<OrgCredentials>>,
    logging_mode: LoggingMode,
}

impl SalesforceClient {
    /// Creates a client with the given session and request timeout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the HTTP client fails to initialize.
    pub fn new(creds: OrgCredentials, timeout: Duration) -> Result<Self, AppError> {
        let http = build_http_client(timeout)?;
        Ok(Self {
            http,
            creds: Arc::new(RwLock::new(creds)),
            logging_mode: LoggingMode::default(),
        })
    }

    /// Updates the logging mode for URL sanitization.
    pub fn with_logging_mode(mut self, mode: LoggingMode) -> Self {
        self.logging_mode = mode;
        self
    }

    /// Replaces the stored session.
    pub async fn update_credentials(&self, creds: OrgCredentials) {
        let mut guard = self.creds.write().await;
        *guard = creds;
    }

    /// Builds a full URL by joining the path with the instance URL.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotAuthenticated` if no instance URL is configured.
    /// Returns `AppError::Internal` if the URL cannot be parsed.
    pub async fn build_url(&self, path: &str) -> Result<Url, AppError> {
        let creds = self.creds.read().await;

        if creds.instance_url.is_empty() {
            return Err(AppError::NotAuthenticated);
        }

        let base = Url::parse(&creds.instance_url)
            .map_err(|_| AppError::Internal("Invalid instance URL".to_string()))?;

        base.join(path)
            .map_err(|_| AppError::Internal(format!("Invalid path: {}", path)))
    }

    /// Executes an authenticated request and maps non-success statuses.
    ///
    /// # Errors
    ///
    /// - `AppError::NotAuthenticated` - No access token configured
    /// - `AppError::SessionExpired` - The backend answered 401
    /// - `AppError::RateLimited`, `AppError::NotFound`, `AppError::SalesforceError`
    /// - `AppError::ConnectionFailed` - Network error
    pub async fn request_authed(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, AppError> {
        let token = {
            let creds = self.creds.read().await;
            let token = creds.access_token.expose_secret();
            if token.is_empty() {
                return Err(AppError::NotAuthenticated);
            }
            token.to_string()
        };

        let response = self.execute_authed_request(method, url, body, &token).await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            warn!("[SFDC] Session rejected by Salesforce");
        }
        Err(error_from_response(response).await)
    }

    /// GET `url` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, AppError> {
        let response = self.request_authed(Method::GET, url, None).await?;
        decode_json(response).await
    }

    /// POST `body` as JSON to `url` and return the raw response.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<reqwest::Response, AppError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| AppError::Internal(format!("Failed to encode request body: {}", e)))?;
        self.request_authed(Method::POST, url, Some(bytes)).await
    }

    /// Executes a single authenticated request (no retry logic).
    async fn execute_authed_request(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
        access_token: &str,
    ) -> Result<reqwest::Response, AppError> {
        let start = Instant::now();
        let sanitized_url = sanitize_url_for_logs(&url, self.logging_mode);

        let mut request = self.http.request(method.clone(), url.as_str());
        request = request.bearer_auth(access_token);

        if let Some(body_bytes) = body {
            request = request
                .header("Content-Type", "application/json")
                .body(body_bytes);
        }

        let result = request.send().await;
        let duration_ms = start.elapsed().as_millis();

        match result {
            Ok(response) => {
                let status = response.status();
                let x_request_id = response
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");

                info!(
                    "[SFDC] {} {} {} {}ms {}",
                    method,
                    sanitized_url,
                    status.as_u16(),
                    duration_ms,
                    x_request_id
                );

                Ok(response)
            }
            Err(_) => {
                // The reqwest error may embed the full URL; never surface it.
                info!(
                    "[SFDC] {} {} FAILED {}ms",
                    method, sanitized_url, duration_ms
                );
                Err(AppError::ConnectionFailed(
                    "Connection to Salesforce failed".to_string(),
                ))
            }
        }
    }
}

/// Decodes a successful response body as JSON.
pub(crate) async fn decode_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    response
        .json()
        .await
        .map_err(|e| AppError::SalesforceError(format!("Failed to parse response: {}", e)))
}

/// Builds the configured HTTP client.
fn build_http_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(instance_url: &str) -> SalesforceClient {
        SalesforceClient::new(
            OrgCredentials::new(instance_url, "test_token"),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // URL Sanitization Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn sanitize_strips_scheme_host_and_fragment() {
        let url = Url::parse(
            "https://na1.salesforce.com/services/apexrest/accountLinker/v1/accounts?term=acme#frag",
        )
        .unwrap();

        let result = sanitize_url_for_logs(&url, LoggingMode::PathOnly);

        assert_eq!(result, "/services/apexrest/accountLinker/v1/accounts");
        assert!(!result.contains("na1.salesforce.com"));
        assert!(!result.contains("frag"));
    }

    #[test]
    fn path_and_query_redacted_redacts_sensitive_keys() {
        let url = Url::parse(
            "https://example.com/path?access_token=secret123&accountId=001xx&SID=sess456",
        )
        .unwrap();

        let result = sanitize_url_for_logs(&url, LoggingMode::PathAndQueryRedacted);

        assert!(result.contains("accountId=001xx"));
        assert!(result.contains("access_token=***"));
        assert!(result.contains("SID=***"));
        assert!(!result.contains("secret123"));
        assert!(!result.contains("sess456"));
    }

    #[test]
    fn sanitize_handles_empty_query_string() {
        let url = Url::parse("https://example.com/path").unwrap();
        assert_eq!(
            sanitize_url_for_logs(&url, LoggingMode::PathAndQueryRedacted),
            "/path"
        );
    }

    #[test]
    fn is_sensitive_param_requires_exact_case_insensitive_match() {
        assert!(is_sensitive_param("ACCESS_TOKEN"));
        assert!(is_sensitive_param("Client_Secret"));
        assert!(!is_sensitive_param("access_token_id"));
        assert!(!is_sensitive_param("term"));
        assert!(!is_sensitive_param("accountId"));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // OrgCredentials Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn org_credentials_debug_redacts_token() {
        let creds = OrgCredentials::new("https://na1.salesforce.com", "super_secret_token_12345");

        let debug_output = format!("{:?}", creds);

        assert!(debug_output.contains("na1.salesforce.com"));
        assert!(!debug_output.contains("super_secret_token_12345"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // SalesforceClient Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn client_with_logging_mode_changes_mode() {
        let client = test_client("https://na1.salesforce.com");
        assert_eq!(client.logging_mode, LoggingMode::PathOnly);

        let client = client.with_logging_mode(LoggingMode::PathAndQueryRedacted);
        assert_eq!(client.logging_mode, LoggingMode::PathAndQueryRedacted);
    }

    #[tokio::test]
    async fn build_url_requires_instance_url() {
        let client = test_client("");
        let result = client.build_url("/services/apexrest/accountLinker/v1/batch").await;
        assert!(matches!(result, Err(AppError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn build_url_joins_absolute_path() {
        let client = test_client("https://na1.salesforce.com");
        let url = client
            .build_url("/services/apexrest/accountLinker/v1/batch")
            .await
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://na1.salesforce.com/services/apexrest/accountLinker/v1/batch"
        );
    }

    #[tokio::test]
    async fn update_credentials_switches_instance() {
        let client = test_client("https://na1.salesforce.com");
        client
            .update_credentials(OrgCredentials::new("https://na99.salesforce.com", "new"))
            .await;
        let url = client.build_url("/x").await.unwrap();
        assert_eq!(url.host_str(), Some("na99.salesforce.com"));
    }

    #[tokio::test]
    async fn request_sends_bearer_token() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header("Authorization", "Bearer test_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = client.build_url("/ping").await.unwrap();
        let body: serde_json::Value = client.get_json(url).await.unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn empty_token_is_not_authenticated() {
        let mock_server = MockServer::start().await;
        let client = SalesforceClient::new(
            OrgCredentials::new(mock_server.uri(), ""),
            Duration::from_secs(5),
        )
        .unwrap();

        let url = client.build_url("/ping").await.unwrap();
        let result = client.request_authed(Method::GET, url, None).await;
        assert!(matches!(result, Err(AppError::NotAuthenticated)));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Error Mapping Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn unauthorized_maps_to_session_expired() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let url = client.build_url("/ping").await.unwrap();
        let result = client.request_authed(Method::GET, url, None).await;
        assert!(matches!(result, Err(AppError::SessionExpired)));
    }

    #[tokio::test]
    async fn rate_limited_honours_retry_after() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "60"))
            .mount(&mock_server)
            .await;

        let url = client.build_url("/ping").await.unwrap();
        match client.request_authed(Method::GET, url, None).await {
            Err(AppError::RateLimited { retry_after_secs }) => {
                assert_eq!(retry_after_secs, Some(60));
            }
            other => panic!("Expected RateLimited, got: {:?}", other.map(|r| r.status())),
        }
    }

    #[tokio::test]
    async fn not_found_maps_to_not_found() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let url = client.build_url("/missing").await.unwrap();
        let result = client.request_authed(Method::GET, url, None).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn salesforce_error_array_is_parsed() {
        let body = r#"[{"errorCode":"APEX_ERROR","message":"System.QueryException: bad"}]"#;
        match error_from_body(StatusCode::INTERNAL_SERVER_ERROR, body) {
            AppError::SalesforceError(msg) => {
                assert_eq!(msg, "[APEX_ERROR] System.QueryException: bad");
            }
            e => panic!("Expected SalesforceError, got: {:?}", e),
        }
    }

    #[test]
    fn request_limit_error_code_is_rate_limited() {
        let body = r#"[{"errorCode":"REQUEST_LIMIT_EXCEEDED","message":"slow down"}]"#;
        assert!(matches!(
            error_from_body(StatusCode::FORBIDDEN, body),
            AppError::RateLimited { retry_after_secs: None }
        ));
    }

    #[test]
    fn unparseable_error_body_falls_back_to_status() {
        match error_from_body(StatusCode::BAD_GATEWAY, "<html>oops</html>") {
            AppError::SalesforceError(msg) => assert_eq!(msg, "HTTP 502 - Bad Gateway"),
            e => panic!("Expected SalesforceError, got: {:?}", e),
        }
    }

    #[tokio::test]
    async fn connection_failure_is_sanitized() {
        // Nothing listens on port 9 of localhost.
        let client = test_client("http://127.0.0.1:9");
        let url = client.build_url("/ping?access_token=abc").await.unwrap();

        match client.request_authed(Method::GET, url, None).await {
            Err(AppError::ConnectionFailed(msg)) => {
                assert!(!msg.contains("abc"));
                assert!(!msg.contains("127.0.0.1"));
            }
            other => panic!("Expected ConnectionFailed, got: {:?}", other.map(|r| r.status())),
        }
    }
}
