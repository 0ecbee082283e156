//! Proxy module for validating candidate proxies
//!
//! This module provides functionality for:
//! - Modelling candidate proxies and their observed outcome
//! - Parsing candidate lists (IP:PORT, scheme://IP:PORT)
//! - Probing a proxy with a protocol-specific strategy
//! - Checking whole batches with bounded concurrency and early stop

pub mod checker;
pub mod models;
pub mod parser;
pub mod probe;

pub use checker::{CheckError, CheckedBatch, CheckerConfig, Progress, ProgressStream, ProxyChecker};
pub use models::{CandidateRecord, EntryError, Protocol, ProxyEntry, ProxyStatus, ProxyTarget};
pub use parser::EntryParser;
pub use probe::{
    classify, HttpProxyProbe, ProbeError, ProbeStrategy, ProbeTable, SocksProxyProbe, DEFAULT_TEST_URL,
};
