// Async HTTP client for the charger cloud API.
//
// Auth: `apikey` header on every request.
// Every call goes through `request`, which owns retry classification and
// quota header capture.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::models::{PairingResponse, RfidCard};
use crate::error::Error;
use crate::quota::QuotaTracker;
use crate::retry::{RetryPolicy, Step};
use crate::transport::TransportConfig;

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://v2c.cloud/kong/v2c_service";

const API_KEY_HEADER: &str = "apikey";

/// Async client for the cloud API.
///
/// Cheap to clone; clones share the connection pool and quota tracker.
#[derive(Debug, Clone)]
pub struct CloudClient {
    http: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
    quota: QuotaTracker,
}

impl CloudClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build from an API key and transport config.
    ///
    /// Injects the key as a sensitive default header on every request.
    pub fn from_api_key(
        base_url: &str,
        api_key: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        let mut key_value =
            HeaderValue::from_str(api_key.expose_secret()).map_err(|e| Error::Auth {
                message: format!("invalid API key header value: {e}"),
            })?;
        key_value.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key_value);

        let http = transport.build_client_with_headers(headers)?;
        Ok(Self {
            http,
            base_url: Self::normalize_base_url(base_url)?,
            retry: transport.retry,
            quota: QuotaTracker::new(),
        })
    }

    /// Base URL always ends in `/` so relative joins append.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(url)
    }

    /// Quota tracker fed by every response this client receives.
    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Core request loop ────────────────────────────────────────────

    /// Issue one logical request, retrying transient failures.
    ///
    /// 401 fails at once; 429, 5xx, timeouts, and connection failures are
    /// retried on the configured schedule; any other status ≥ 400 fails at
    /// once with its body text.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, Error> {
        let url = self.base_url.join(path.trim_start_matches('/'))?;
        let mut state = self.retry.start();

        loop {
            debug!(%method, %url, attempt = state.attempt(), "cloud request");
            let mut req = self.http.request(method.clone(), url.clone()).query(params);
            if let Some(body) = body {
                req = req.json(body);
            }

            let resp = match req.send().await {
                Ok(resp) => resp,
                Err(e) if is_retryable_transport(&e) => {
                    let message = describe_transport_error(&e);
                    let attempt = state.attempt();
                    match state.on_failure(None) {
                        Step::Retry(delay) => {
                            warn!(%url, attempt, delay_ms = delay.as_millis(), error = %message, "transport failure, retrying");
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        Step::GiveUp => {
                            return Err(Error::Request {
                                status: None,
                                message,
                            });
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            };

            self.quota.observe(resp.headers());
            let status = resp.status();

            if status.is_success() {
                let text = resp.text().await?;
                return Ok(coerce_body(&text));
            }

            if status == StatusCode::UNAUTHORIZED {
                let text = resp.text().await.unwrap_or_default();
                return Err(Error::Auth {
                    message: error_message(status, &text),
                });
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let hint = retry_after(resp.headers());
                match state.on_failure(hint) {
                    Step::Retry(delay) => {
                        warn!(%url, delay_ms = delay.as_millis(), "rate limited, backing off");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    Step::GiveUp => {
                        return Err(Error::RateLimit {
                            status: status.as_u16(),
                            attempts: state.attempt(),
                            retry_after_secs: hint.map(|d| d.as_secs()),
                        });
                    }
                }
            }

            let text = resp.text().await.unwrap_or_default();
            if status.is_server_error() {
                if let Step::Retry(delay) = state.on_failure(None) {
                    warn!(%url, status = status.as_u16(), delay_ms = delay.as_millis(), "server error, retrying");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }

            return Err(Error::Request {
                status: Some(status.as_u16()),
                message: error_message(status, &text),
            });
        }
    }

    async fn get_value(&self, path: &str, params: &[(&str, String)]) -> Result<Value, Error> {
        self.request(Method::GET, path, params, None).await
    }

    async fn get_typed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, Error> {
        let value = self.get_value(path, params).await?;
        from_value(unwrap_envelope(value))
    }

    async fn post_device(
        &self,
        path: &str,
        device_id: &str,
        value: Option<String>,
    ) -> Result<Value, Error> {
        let mut params = vec![("deviceId", device_id.to_owned())];
        if let Some(value) = value {
            params.push(("value", value));
        }
        self.request(Method::POST, path, &params, None).await
    }

    // ━━ Public API ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    // ── Reads ────────────────────────────────────────────────────────

    /// Devices paired with the account.
    pub async fn get_pairings(&self) -> Result<Vec<PairingResponse>, Error> {
        self.get_typed("pairings/me", &[]).await
    }

    /// Raw reported-state blob for one device.
    pub async fn get_reported(&self, device_id: &str) -> Result<Value, Error> {
        self.get_value("device/reported", &[("deviceId", device_id.to_owned())])
            .await
    }

    pub async fn get_rfid_cards(&self, device_id: &str) -> Result<Vec<RfidCard>, Error> {
        self.get_typed("device/rfid", &[("deviceId", device_id.to_owned())])
            .await
    }

    /// Firmware version string. Accepts a bare scalar or `{"version": ...}`.
    pub async fn get_version(&self, device_id: &str) -> Result<String, Error> {
        let value = self
            .get_value("version", &[("deviceId", device_id.to_owned())])
            .await?;
        let candidate = match &value {
            Value::Object(map) => map
                .get("version")
                .or_else(|| map.get("versionName"))
                .cloned()
                .unwrap_or(Value::Null),
            other => other.clone(),
        };
        match candidate {
            Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_owned()),
            Value::Number(n) => Ok(n.to_string()),
            _ => Err(Error::Deserialization {
                message: "version payload carried no version".into(),
                body: value.to_string(),
            }),
        }
    }

    // ── Writes ───────────────────────────────────────────────────────

    pub async fn set_intensity(&self, device_id: &str, amps: u8) -> Result<Value, Error> {
        self.post_device("device/intensity", device_id, Some(amps.to_string()))
            .await
    }

    pub async fn set_min_intensity(&self, device_id: &str, amps: u8) -> Result<Value, Error> {
        self.post_device("device/min_car_intensity", device_id, Some(amps.to_string()))
            .await
    }

    pub async fn set_max_intensity(&self, device_id: &str, amps: u8) -> Result<Value, Error> {
        self.post_device("device/max_car_intensity", device_id, Some(amps.to_string()))
            .await
    }

    /// Maximum power in watts.
    pub async fn set_max_power(&self, device_id: &str, watts: u32) -> Result<Value, Error> {
        self.post_device("device/maxpower", device_id, Some(watts.to_string()))
            .await
    }

    pub async fn set_dynamic(&self, device_id: &str, enabled: bool) -> Result<Value, Error> {
        self.post_device("device/dynamic", device_id, Some(flag(enabled)))
            .await
    }

    pub async fn set_locked(&self, device_id: &str, locked: bool) -> Result<Value, Error> {
        self.post_device("device/locked", device_id, Some(flag(locked)))
            .await
    }

    pub async fn set_logo_led(&self, device_id: &str, enabled: bool) -> Result<Value, Error> {
        self.post_device("device/logo_led", device_id, Some(flag(enabled)))
            .await
    }

    pub async fn set_rfid_mode(&self, device_id: &str, enabled: bool) -> Result<Value, Error> {
        self.post_device("device/set_rfid", device_id, Some(flag(enabled)))
            .await
    }

    pub async fn start_charge(&self, device_id: &str) -> Result<Value, Error> {
        self.post_device("device/startcharge", device_id, None).await
    }

    pub async fn pause_charge(&self, device_id: &str) -> Result<Value, Error> {
        self.post_device("device/pausecharge", device_id, None).await
    }

    pub async fn reboot(&self, device_id: &str) -> Result<Value, Error> {
        self.post_device("device/reboot", device_id, None).await
    }

    pub async fn trigger_update(&self, device_id: &str) -> Result<Value, Error> {
        self.post_device("device/update", device_id, None).await
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_owned()
}

/// Coerce a response body into a JSON value.
///
/// Some endpoints reply with bare scalars as plain text: `true`/`false`
/// become booleans, numerics become numbers, anything else stays a string.
pub fn coerce_body(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return value;
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::from(n);
    }
    if let Some(n) = trimmed
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
    {
        return Value::Number(n);
    }
    Value::String(trimmed.to_owned())
}

/// Lists are occasionally wrapped in `{"data": [...]}`.
fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 1 => {
            for key in ["data", "pairings", "cards", "items"] {
                if let Some(inner) = map.remove(key) {
                    return inner;
                }
            }
            Value::Object(map)
        }
        Value::Null => Value::Array(Vec::new()),
        other => other,
    }
}

fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value(value.clone()).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: value.to_string(),
    })
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let secs = raw.parse::<f64>().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

fn is_retryable_transport(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || (e.is_request() && e.status().is_none())
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("timed out: {e}")
    } else {
        e.to_string()
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        status.to_string()
    } else {
        body.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_plain_text_scalars() {
        assert_eq!(coerce_body("TRUE"), Value::Bool(true));
        assert_eq!(coerce_body(" false\n"), Value::Bool(false));
        assert_eq!(coerce_body("16"), json!(16));
        assert_eq!(coerce_body("3.5"), json!(3.5));
        assert_eq!(coerce_body("OK"), json!("OK"));
        assert_eq!(coerce_body(""), Value::Null);
        assert_eq!(coerce_body(r#"{"a":1}"#), json!({"a": 1}));
    }

    #[test]
    fn envelope_is_unwrapped_only_for_known_keys() {
        assert_eq!(unwrap_envelope(json!({"data": [1]})), json!([1]));
        assert_eq!(unwrap_envelope(json!({"other": 1})), json!({"other": 1}));
        assert_eq!(unwrap_envelope(Value::Null), json!([]));
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let url = CloudClient::normalize_base_url("https://example.test/api").ok();
        assert_eq!(
            url.map(|u| u.to_string()).as_deref(),
            Some("https://example.test/api/")
        );
    }
}
