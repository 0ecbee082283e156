//! Proxy Sieve - bounded concurrent proxy validation
//!
//! Takes a batch of candidate proxies, probes each one through a live request,
//! and classifies it as valid, invalid or slow. At most a fixed number of
//! probes run at once, progress is reported after every probe, and a run can
//! stop early once enough valid proxies are found.

pub mod logging;
pub mod proxy;

pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
