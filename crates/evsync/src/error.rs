//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and distinct exit codes.

use miette::Diagnostic;
use thiserror::Error;

use evsync_config::ConfigError;
use evsync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const RATE_LIMITED: i32 = 9;
    pub const CONFIG: i32 = 10;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach {target}: {message}")]
    #[diagnostic(
        code(evsync::connection_failed),
        help(
            "Check network access to the cloud API or the charger's LAN address.\n\
             Use --no-local to skip local endpoints, or --timeout to wait longer."
        )
    )]
    ConnectionFailed { target: String, message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(evsync::auth_failed),
        help("Verify the API key. It is sent as the `apikey` header on every cloud request.")
    )]
    AuthFailed { message: String },

    #[error("No API key configured")]
    #[diagnostic(
        code(evsync::no_credentials),
        help(
            "Pass --api-key, set EVSYNC_API_KEY, or add api_key / api_key_env to\n\
             {path}"
        )
    )]
    NoCredentials { path: String },

    #[error("Cloud request budget exhausted{}", retry_after_secs.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    #[diagnostic(
        code(evsync::rate_limited),
        help("Wait for the quota to reset. Run: evsync quota")
    )]
    RateLimited { retry_after_secs: Option<u64> },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(evsync::not_found),
        help("Run: evsync {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    #[diagnostic(code(evsync::api_error))]
    ApiError {
        status: Option<u16>,
        message: String,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(evsync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(evsync::config),
        help("Check the config file. Run: evsync config path")
    )]
    Config { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(evsync::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::RateLimited { .. } => exit_code::RATE_LIMITED,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } => exit_code::USAGE,
            Self::Config { .. } => exit_code::CONFIG,
            Self::ApiError { .. } | Self::Io(_) | Self::Render(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Auth { message } => CliError::AuthFailed { message },

            CoreError::RateLimited { retry_after_secs } => {
                CliError::RateLimited { retry_after_secs }
            }

            // No status means the request never got an answer.
            CoreError::Request {
                status: None,
                message,
            } => CliError::ConnectionFailed {
                target: "cloud API".into(),
                message,
            },

            CoreError::Request { status, message } => CliError::ApiError { status, message },

            CoreError::Payload { message } => CliError::ApiError {
                status: None,
                message,
            },

            CoreError::LocalUnavailable { address, message } => CliError::ConnectionFailed {
                target: address,
                message,
            },

            CoreError::ControllerDisconnected => CliError::ConnectionFailed {
                target: "sync engine".into(),
                message: "not connected".into(),
            },

            CoreError::DeviceNotFound { identifier } => CliError::NotFound {
                resource_type: "device".into(),
                identifier,
                list_command: "status".into(),
            },

            CoreError::AddressUnknown { device_id } => CliError::NotFound {
                resource_type: "local address for device".into(),
                identifier: device_id,
                list_command: "status".into(),
            },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "value".into(),
                reason: message,
            },

            CoreError::Config { message } => CliError::Config { message },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials => CliError::NoCredentials {
                path: evsync_config::config_path().display().to_string(),
            },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_get_distinct_exit_codes() {
        let cases = [
            (
                CoreError::Auth {
                    message: "bad key".into(),
                },
                exit_code::AUTH,
            ),
            (
                CoreError::RateLimited {
                    retry_after_secs: Some(30),
                },
                exit_code::RATE_LIMITED,
            ),
            (
                CoreError::Request {
                    status: None,
                    message: "timed out".into(),
                },
                exit_code::CONNECTION,
            ),
            (
                CoreError::Request {
                    status: Some(500),
                    message: "boom".into(),
                },
                exit_code::GENERAL,
            ),
            (
                CoreError::DeviceNotFound {
                    identifier: "x".into(),
                },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::ValidationFailed {
                    message: "out of range".into(),
                },
                exit_code::USAGE,
            ),
        ];
        for (core, code) in cases {
            assert_eq!(CliError::from(core).exit_code(), code);
        }
    }

    #[test]
    fn missing_key_is_an_auth_exit() {
        let err = CliError::from(ConfigError::NoCredentials);
        assert_eq!(err.exit_code(), exit_code::AUTH);
        let err = CliError::from(ConfigError::Validation {
            field: "timeout".into(),
            reason: "zero".into(),
        });
        assert_eq!(err.exit_code(), exit_code::CONFIG);
    }
}
