use strum::{Display, IntoStaticStr};
use thiserror::Error;

/// Coarse classification of an [`Error`], used by callers that only need to
/// branch on the failure policy (re-authenticate, back off, keep stale data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Credentials rejected. Terminal until re-authenticated upstream.
    Auth,
    /// Request budget exhausted.
    RateLimit,
    /// Generic transport, server, or client-side request failure.
    Request,
    /// The device's local HTTP endpoint could not be reached.
    LocalUnavailable,
}

/// Top-level error type for the `evsync-api` crate.
///
/// Covers every failure mode of both surfaces (cloud API and local device
/// endpoint). `evsync-core` maps these into domain-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// API key rejected (HTTP 401). Never retried.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    // ── Quota ───────────────────────────────────────────────────────
    /// Rate limited after exhausting the retry ceiling.
    #[error("Rate limited (HTTP {status}) after {attempts} attempt(s)")]
    RateLimit {
        status: u16,
        attempts: u32,
        retry_after_secs: Option<u64>,
    },

    // ── Transport / request ─────────────────────────────────────────
    /// HTTP error status, or a network failure that outlived its retries.
    /// `status` is `None` when no response was ever received.
    #[error("Request failed{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Request {
        status: Option<u16>,
        message: String,
    },

    /// Local endpoint unreachable (timeout or connection failure).
    #[error("Local endpoint {address} unavailable: {message}")]
    LocalUnavailable { address: String, message: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Client(String),

    // ── Data ────────────────────────────────────────────────────────
    /// Payload did not have the expected shape, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Request {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl Error {
    /// Policy-level classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth { .. } => ErrorKind::Auth,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::LocalUnavailable { .. } => ErrorKind::LocalUnavailable,
            Self::Request { .. }
            | Self::InvalidUrl(_)
            | Self::Client(_)
            | Self::Deserialization { .. } => ErrorKind::Request,
        }
    }

    /// Returns `true` if re-authentication upstream is required.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// Returns `true` if the request budget was exhausted.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimit { .. })
    }

    /// Returns `true` if this is a transient error worth retrying later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimit { .. } | Self::LocalUnavailable { .. } => true,
            Self::Request { status, .. } => status.is_none_or(|s| s >= 500),
            _ => false,
        }
    }

    /// HTTP status associated with this error, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { .. } => Some(401),
            Self::RateLimit { status, .. } => Some(*status),
            Self::Request { status, .. } => *status,
            _ => None,
        }
    }
}
