// ── Core error types ──
//
// Domain-facing errors from evsync-core. The `From<evsync_api::Error>` impl
// folds transport failures into the four-way failure policy the engine
// branches on (auth, rate limit, request, local unavailable).

use evsync_api::ErrorKind;
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Policy-relevant transport failures ───────────────────────────
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Rate limited{}", retry_after_secs.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Request failed{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Request {
        status: Option<u16>,
        message: String,
    },

    #[error("Local endpoint {address} unavailable: {message}")]
    LocalUnavailable { address: String, message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("No local address known for device {device_id}")]
    AddressUnknown { device_id: String },

    #[error("Unexpected payload: {message}")]
    Payload { message: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Controller disconnected")]
    ControllerDisconnected,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<evsync_api::Error> for CoreError {
    fn from(err: evsync_api::Error) -> Self {
        match err {
            evsync_api::Error::Auth { message } => Self::Auth { message },
            evsync_api::Error::RateLimit {
                retry_after_secs, ..
            } => Self::RateLimited { retry_after_secs },
            evsync_api::Error::Request { status, message } => Self::Request { status, message },
            evsync_api::Error::LocalUnavailable { address, message } => {
                Self::LocalUnavailable { address, message }
            }
            evsync_api::Error::InvalidUrl(e) => Self::Config {
                message: format!("Invalid URL: {e}"),
            },
            evsync_api::Error::Client(message) => Self::Config { message },
            evsync_api::Error::Deserialization { message, .. } => Self::Payload { message },
        }
    }
}

impl CoreError {
    /// Transport-level classification, if this error came from a request.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Auth { .. } => Some(ErrorKind::Auth),
            Self::RateLimited { .. } => Some(ErrorKind::RateLimit),
            Self::Request { .. } | Self::Payload { .. } => Some(ErrorKind::Request),
            Self::LocalUnavailable { .. } => Some(ErrorKind::LocalUnavailable),
            _ => None,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Worth retrying on a later cycle without operator action.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::LocalUnavailable { .. } => true,
            Self::Request { status, .. } => status.is_none_or(|s| s >= 500),
            _ => false,
        }
    }
}
