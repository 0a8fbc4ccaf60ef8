//! Async HTTP clients for EV charger fleets.
//!
//! Two surfaces are covered:
//!
//! - **Cloud** ([`cloud::CloudClient`]): API-key authenticated REST calls with
//!   bounded retries on 429/5xx/network failures and quota header capture.
//! - **Local** ([`local::LocalClient`]): the charger's own plain-HTTP
//!   real-time endpoint, with linear-backoff retries on reads.
//!
//! Retry decisions for both live in [`retry`], so the request loops only
//! report failures and sleep for what they are told.

pub mod cloud;
pub mod error;
pub mod local;
pub mod quota;
pub mod retry;
pub mod transport;

pub use cloud::client::DEFAULT_BASE_URL;
pub use cloud::{CloudClient, PairingResponse, RfidCard};
pub use error::{Error, ErrorKind};
pub use local::{LocalClient, RealtimeData, WriteValue};
pub use quota::{QuotaSnapshot, QuotaTracker};
pub use retry::{RetryPolicy, RetryState, Step};
pub use transport::TransportConfig;
