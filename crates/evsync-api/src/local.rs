// Client for the charger's on-LAN HTTP endpoint.
//
// Plain HTTP, no auth. Reads return a JSON object terminated by a stray `%`;
// writes are `GET /write/{keyword}={value}`.

use std::fmt;

use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::retry::{RetryPolicy, Step};
use crate::transport::TransportConfig;

/// One successful real-time read.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeData {
    /// Address the payload was fetched from.
    pub source_ip: String,
    pub fields: Map<String, Value>,
}

/// Value written to a local keyword. Booleans go on the wire as `1`/`0`.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for WriteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", u8::from(*b)),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for WriteValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for WriteValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for WriteValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for WriteValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Async client for device-local endpoints. One instance serves every device.
#[derive(Debug, Clone)]
pub struct LocalClient {
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl LocalClient {
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            retry: transport.retry,
        })
    }

    fn endpoint(address: &str) -> Result<Url, Error> {
        let address = address.trim().trim_end_matches('/');
        let address = address
            .strip_prefix("http://")
            .unwrap_or(address);
        Ok(Url::parse(&format!("http://{address}/"))?)
    }

    /// Fetch `/RealTimeData`, retrying timeouts and connection failures.
    ///
    /// Exhausted retries yield [`Error::LocalUnavailable`]; an empty or
    /// non-object payload yields [`Error::Deserialization`].
    pub async fn fetch_realtime(&self, address: &str) -> Result<RealtimeData, Error> {
        let mut url = Self::endpoint(address)?;
        url.set_path("/RealTimeData");
        let mut state = self.retry.start();

        let text = loop {
            let failure = match self.http.get(url.clone()).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if !status.is_success() {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(Error::Request {
                            status: Some(status.as_u16()),
                            message: body.trim().to_owned(),
                        });
                    }
                    match resp.text().await {
                        Ok(text) => break text,
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            let message = if failure.is_timeout() {
                "timeout while fetching real-time data".to_owned()
            } else {
                format!("error while fetching real-time data: {failure}")
            };
            let attempt = state.attempt();
            match state.on_failure(None) {
                Step::Retry(delay) => {
                    debug!(address, attempt, delay_ms = delay.as_millis(), error = %message, "local fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Step::GiveUp => {
                    return Err(Error::LocalUnavailable {
                        address: address.to_owned(),
                        message: format!("{message} after {attempt} attempt(s)"),
                    });
                }
            }
        };

        let fields = parse_realtime(&text)?;
        Ok(RealtimeData {
            source_ip: address.to_owned(),
            fields,
        })
    }

    /// Write one keyword. Single attempt: a write that timed out may still
    /// have landed, so the caller reconciles with a follow-up read instead.
    pub async fn write_keyword(
        &self,
        address: &str,
        keyword: &str,
        value: &WriteValue,
    ) -> Result<(), Error> {
        let keyword = keyword.trim();
        let mut url = Self::endpoint(address)?;
        url.path_segments_mut()
            .map_err(|()| Error::Client(format!("address {address} cannot carry a path")))?
            .clear()
            .push("write")
            .push(&format!("{keyword}={value}"));
        debug!(address, keyword, %value, "local write");

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::LocalUnavailable {
                address: address.to_owned(),
                message: if e.is_timeout() {
                    format!("timeout while writing {keyword}")
                } else {
                    format!("error while writing {keyword}: {e}")
                },
            })?;

        let status = resp.status();
        if status.is_client_error() || status.is_server_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Request {
                status: Some(status.as_u16()),
                message: format!("local endpoint rejected {keyword}: {}", body.trim()),
            });
        }
        Ok(())
    }
}

/// Strip the trailing `%` terminator and parse the JSON object.
pub fn parse_realtime(text: &str) -> Result<Map<String, Value>, Error> {
    let payload = text.trim().trim_end_matches('%').trim();
    if payload.is_empty() {
        return Err(Error::Deserialization {
            message: "empty response from RealTimeData endpoint".into(),
            body: String::new(),
        });
    }
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(Error::Deserialization {
            message: "RealTimeData payload is not an object".into(),
            body: payload.to_owned(),
        }),
        Err(e) => Err(Error::Deserialization {
            message: format!("invalid JSON from local endpoint: {e}"),
            body: payload.to_owned(),
        }),
    }
}
