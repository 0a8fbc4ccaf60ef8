// ── Domain model ──

pub mod device;
pub mod pairing;

pub use device::{
    Additional, DeviceRecord, Freshness, LocalSnapshot, Reported, RfidCard,
};
pub use pairing::Pairing;
