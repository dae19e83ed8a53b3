// # WhoisJSON Lookup Provider
//
// This crate provides the WhoisJSON implementation of `LookupProvider`.
//
// ## Behavior
//
// - One HTTP request per call; batching and spacing are owned by the
//   verification engine
// - NO retry logic: a failed call is recorded on the domain and retried
//   on the next sweep
// - HTTP timeout configured (30 seconds), so a stuck call surfaces as a
//   network error instead of stalling a batch
// - HTTP status codes are classified into the core error variants
//   (401/403, 404, 400/422, 429, 5xx)
//
// ## Security Requirements
//
// - API key NEVER appears in logs or Debug output
// - API key MUST be provided via environment variables only
// - Without a key the provider reports `has_credentials() == false` and
//   every call fails fast with `MissingCredentials`
//
// ## API Reference
//
// - Availability and expiry: GET `/whois?domain=<name>`
// - Nameservers: GET `/nslookup?domain=<name>`
// - Certificate: GET `/ssl-cert-check?domain=<name>`
// - Auth header: `Authorization: Token=<key>`

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use dwatch_core::traits::{AvailabilityCheck, LookupProvider};
use dwatch_core::{Error, Result};
use serde_json::Value;
use std::time::Duration;

/// WhoisJSON API base URL
pub const WHOISJSON_API_BASE: &str = "https://whoisjson.com/api/v1";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const PROVIDER_NAME: &str = "whoisjson";

/// Response keys that may carry the expiry, in preference order
const EXPIRY_KEYS: [&str; 4] = ["expires", "expiration_date", "expiry_date", "registry_expiry_date"];

/// WhoisJSON lookup provider
///
/// Stateless apart from the HTTP client; safe to share across the
/// concurrent checks of a batch.
pub struct WhoisJsonProvider {
    /// API key
    /// ⚠️ NEVER log this value
    api_key: String,

    /// API base URL (overridable for testing)
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for WhoisJsonProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhoisJsonProvider")
            .field("api_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl WhoisJsonProvider {
    /// Create a new WhoisJSON provider
    ///
    /// An empty key is accepted; the provider then reports missing
    /// credentials instead of calling the API.
    ///
    /// # Errors
    ///
    /// - `Error::Config`: The HTTP client could not be built
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, WHOISJSON_API_BASE)
    }

    /// Create a provider against a different API base URL
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key: api_key.into().trim().to_string(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// GET one endpoint and return its JSON body
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /<endpoint>?domain=example.com
    /// Authorization: Token=<key>
    /// ```
    async fn get_json(&self, endpoint: &str, name: &str) -> Result<Value> {
        if self.api_key.is_empty() {
            return Err(Error::missing_credentials("WhoisJSON API key is not configured"));
        }

        let url = format!("{}/{}", self.base_url, endpoint);
        tracing::debug!("GET {} for {}", url, name);

        let response = self
            .client
            .get(&url)
            .query(&[("domain", name)])
            .header("Authorization", format!("Token={}", self.api_key))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::network(format!("Request timed out after {:?}", DEFAULT_HTTP_TIMEOUT))
                } else {
                    Error::network(format!("HTTP request failed: {}", e))
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::network(format!("Failed to read response body: {}", e)))?;

        if !(200..300).contains(&status) {
            tracing::warn!("WhoisJSON returned HTTP {} for {}", status, name);
            return Err(classify_status(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::server(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl LookupProvider for WhoisJsonProvider {
    async fn check_availability(&self, name: &str) -> Result<AvailabilityCheck> {
        let raw = self.get_json("whois", name).await?;
        interpret_whois(raw)
    }

    async fn check_ns(&self, name: &str) -> Result<Value> {
        self.get_json("nslookup", name).await
    }

    async fn check_ssl(&self, name: &str) -> Result<Value> {
        self.get_json("ssl-cert-check", name).await
    }

    fn has_credentials(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Map a non-success HTTP status to a classified error
pub fn classify_status(status: u16, body: &str) -> Error {
    let detail = extract_message(body).unwrap_or_else(|| format!("HTTP {}", status));
    match status {
        401 | 403 => Error::auth(format!("Invalid API key or plan limit ({})", detail)),
        404 => Error::not_found(detail),
        400 | 422 => Error::validation(detail),
        429 => Error::rate_limited(format!("Rate limit exceeded. Please retry later ({})", detail)),
        500..=599 => Error::server(format!("HTTP {}: {}", status, detail)),
        _ => Error::server(format!("Unexpected HTTP {}: {}", status, detail)),
    }
}

fn extract_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    ["message", "error", "detail"]
        .iter()
        .find_map(|key| json.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Turn a `/whois` response into an availability check
///
/// The response is kept whole as the domain's raw data. A response with
/// neither `registered` nor `available` is treated as a server fault.
pub fn interpret_whois(raw: Value) -> Result<AvailabilityCheck> {
    let registered = match (
        raw.get("registered").and_then(Value::as_bool),
        raw.get("available").and_then(Value::as_bool),
    ) {
        (Some(registered), _) => registered,
        (None, Some(available)) => !available,
        (None, None) => {
            return Err(Error::server(
                "Response has neither 'registered' nor 'available'",
            ));
        }
    };

    if !registered {
        return Ok(AvailabilityCheck::available(raw));
    }

    let expires = EXPIRY_KEYS
        .iter()
        .filter_map(|key| raw.get(*key).and_then(Value::as_str))
        .find_map(parse_expiry);
    if expires.is_none() {
        tracing::debug!("Registered domain without a parseable expiry");
    }

    Ok(AvailabilityCheck::registered(expires, raw))
}

/// Parse the expiry formats registries report
pub fn parse_expiry(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.and_utc());
        }
    }

    for format in ["%Y-%m-%d", "%d-%b-%Y", "%Y.%m.%d", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0).map(|at| at.and_utc());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the raw request
    async fn serve_once(status: u16, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });

        (format!("http://{}", addr), handle)
    }

    #[test]
    fn test_api_key_not_exposed_in_debug() {
        let provider = WhoisJsonProvider::new("super_secret_key_12345").unwrap();
        let debug_output = format!("{:?}", provider);

        assert!(!debug_output.contains("super_secret_key_12345"));
        assert!(debug_output.contains("<REDACTED>"));
    }

    #[test]
    fn test_empty_key_means_no_credentials() {
        assert!(!WhoisJsonProvider::new("  ").unwrap().has_credentials());
        assert!(WhoisJsonProvider::new("key").unwrap().has_credentials());
    }

    #[test]
    fn test_provider_name() {
        let provider = WhoisJsonProvider::new("key").unwrap();
        assert_eq!(provider.provider_name(), "whoisjson");
    }

    #[test]
    fn test_parse_expiry_formats() {
        let midnight = Utc.with_ymd_and_hms(2026, 8, 13, 0, 0, 0).unwrap();

        assert_eq!(parse_expiry("2026-08-13"), Some(midnight));
        assert_eq!(parse_expiry("13-aug-2026"), Some(midnight));
        assert_eq!(
            parse_expiry("2026-08-13 04:00:00"),
            Some(Utc.with_ymd_and_hms(2026, 8, 13, 4, 0, 0).unwrap())
        );
        assert_eq!(
            parse_expiry("2026-08-13T04:00:00+02:00"),
            Some(Utc.with_ymd_and_hms(2026, 8, 13, 2, 0, 0).unwrap())
        );
        assert_eq!(parse_expiry(""), None);
        assert_eq!(parse_expiry("soon"), None);
    }

    #[test]
    fn test_interpret_registered_and_available() {
        let check = interpret_whois(json!({
            "registered": true,
            "expiration_date": "2027-01-02"
        }))
        .unwrap();
        assert_eq!(check.status, dwatch_core::traits::DomainStatus::Registered);
        assert_eq!(check.expires, parse_expiry("2027-01-02"));

        let check = interpret_whois(json!({"available": true})).unwrap();
        assert_eq!(check.status, dwatch_core::traits::DomainStatus::Available);
        assert_eq!(check.raw, json!({"available": true}));

        assert!(matches!(interpret_whois(json!({})), Err(Error::Server(_))));
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(classify_status(401, ""), Error::Authentication(_)));
        assert!(matches!(classify_status(403, ""), Error::Authentication(_)));
        assert!(matches!(classify_status(404, ""), Error::NotFound(_)));
        assert!(matches!(classify_status(422, ""), Error::Validation(_)));
        assert!(matches!(classify_status(429, ""), Error::RateLimited(_)));
        assert!(matches!(classify_status(503, ""), Error::Server(_)));

        let error = classify_status(400, r#"{"message": "invalid domain"}"#);
        assert_eq!(error.to_string(), "Validation failed: invalid domain");
        assert_eq!(error.status_code(), 422);
    }

    #[tokio::test]
    async fn test_check_availability_sends_token() {
        let (base_url, server) =
            serve_once(200, r#"{"registered": true, "expires": "2030-05-01"}"#).await;
        let provider = WhoisJsonProvider::with_base_url("abc123", base_url).unwrap();

        let check = provider.check_availability("example.com").await.unwrap();
        assert_eq!(check.expires, parse_expiry("2030-05-01"));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /whois?domain=example.com"));
        assert!(request.to_ascii_lowercase().contains("authorization: token=abc123"));
    }

    #[tokio::test]
    async fn test_rate_limit_is_classified() {
        let (base_url, server) = serve_once(429, r#"{"message": "quota"}"#).await;
        let provider = WhoisJsonProvider::with_base_url("abc123", base_url).unwrap();

        let error = provider.check_ns("example.com").await.unwrap_err();
        assert!(matches!(error, Error::RateLimited(_)));
        assert_eq!(error.status_code(), 429);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        let provider = WhoisJsonProvider::with_base_url("", "http://127.0.0.1:9").unwrap();
        let error = provider.check_ssl("example.com").await.unwrap_err();
        assert!(matches!(error, Error::MissingCredentials(_)));
    }
}
