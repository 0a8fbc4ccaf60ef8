// Cloud API surface: rate-limited REST endpoints authenticated by API key.

pub mod client;
pub mod models;

pub use client::{CloudClient, coerce_body};
pub use models::{PairingResponse, RfidCard};
