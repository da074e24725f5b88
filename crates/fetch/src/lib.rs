//! The compliance fetch layer: robots policy with a TTL cache, per-host
//! politeness with a global concurrency gate, and an SSRF-hardened HTTP
//! fetcher that never raises — every failure becomes a typed error code on
//! the fetch log.

mod http;
mod politeness;
mod robots;
#[cfg(test)]
mod testutil;
mod transport;

pub use http::{EventHook, Fetcher};
pub use politeness::{PolitenessGate, Slot};
pub use robots::{RobotsCache, RobotsDecision, RobotsMode};
pub use transport::{HttpTransport, Transport, TransportError, TransportResponse};
