//! Proxy entry models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while constructing an entry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("proxy address is empty")]
    EmptyAddress,
    #[error("invalid proxy port: {0}")]
    InvalidPort(i64),
    #[error("unknown proxy protocol: {0:?} (expected http, https, socks4 or socks5)")]
    UnknownProtocol(String),
}

/// Proxy protocol enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
    Socks4,
    Socks5,
}

impl Protocol {
    /// Whether the protocol belongs to the SOCKS family
    pub fn is_socks(self) -> bool {
        matches!(self, Protocol::Socks4 | Protocol::Socks5)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Https => write!(f, "https"),
            Protocol::Socks4 => write!(f, "socks4"),
            Protocol::Socks5 => write!(f, "socks5"),
        }
    }
}

impl FromStr for Protocol {
    type Err = EntryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "socks4" => Ok(Protocol::Socks4),
            "socks5" => Ok(Protocol::Socks5),
            _ => Err(EntryError::UnknownProtocol(s.to_string())),
        }
    }
}

/// Classification of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStatus {
    /// Not probed (yet, or ever in this run)
    #[default]
    Unknown,
    Valid,
    Invalid,
    /// Answered, but slower than the configured timeout
    Slow,
}

impl ProxyStatus {
    /// Whether this is a final classification
    pub fn is_terminal(self) -> bool {
        !matches!(self, ProxyStatus::Unknown)
    }
}

impl fmt::Display for ProxyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyStatus::Unknown => write!(f, "unknown"),
            ProxyStatus::Valid => write!(f, "valid"),
            ProxyStatus::Invalid => write!(f, "invalid"),
            ProxyStatus::Slow => write!(f, "slow"),
        }
    }
}

/// The immutable identity of a candidate proxy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProxyTarget {
    address: String,
    port: u16,
    protocol: Protocol,
}

impl ProxyTarget {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Proxy URL for the given scheme, e.g. `socks5h://1.2.3.4:1080`
    pub fn url_with_scheme(&self, scheme: &str) -> String {
        if self.address.contains(':') {
            format!("{}://[{}]:{}", scheme, self.address, self.port)
        } else {
            format!("{}://{}:{}", scheme, self.address, self.port)
        }
    }
}

impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// A candidate proxy together with the outcome observed for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CandidateRecord")]
pub struct ProxyEntry {
    #[serde(flatten)]
    target: ProxyTarget,
    country: Option<String>,
    latency: Option<Duration>,
    status: ProxyStatus,
}

impl ProxyEntry {
    /// Create a new unchecked entry
    pub fn new(address: impl Into<String>, port: u16, protocol: Protocol) -> Result<Self, EntryError> {
        let address = address.into().trim().to_string();
        if address.is_empty() {
            return Err(EntryError::EmptyAddress);
        }
        if port == 0 {
            return Err(EntryError::InvalidPort(0));
        }

        Ok(Self {
            target: ProxyTarget {
                address,
                port,
                protocol,
            },
            country: None,
            latency: None,
            status: ProxyStatus::Unknown,
        })
    }

    /// Attach the country reported by the candidate source
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        let country = country.into();
        self.country = (!country.trim().is_empty()).then(|| country.trim().to_string());
        self
    }

    pub fn target(&self) -> &ProxyTarget {
        &self.target
    }

    pub fn address(&self) -> &str {
        self.target.address()
    }

    pub fn port(&self) -> u16 {
        self.target.port()
    }

    pub fn protocol(&self) -> Protocol {
        self.target.protocol()
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    /// Measured probe duration, set once the entry has been checked
    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    pub fn status(&self) -> ProxyStatus {
        self.status
    }

    /// Whether a probe has completed for this entry
    pub fn is_checked(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_valid(&self) -> bool {
        self.status == ProxyStatus::Valid
    }

    /// Get the proxy string in IP:PORT format
    pub fn to_simple_string(&self) -> String {
        self.target.to_string()
    }

    /// Write back the result of this entry's single probe.
    pub(crate) fn record(&mut self, status: ProxyStatus, latency: Duration) {
        debug_assert!(status.is_terminal(), "an entry is recorded with a final status");
        debug_assert!(!self.is_checked(), "an entry is probed at most once per run");
        self.status = status;
        self.latency = Some(latency);
    }
}

impl fmt::Display for ProxyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.target, f)
    }
}

/// A candidate record as handed over by a proxy list source
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateRecord {
    #[serde(alias = "ip")]
    pub address: String,
    pub port: i64,
    #[serde(default = "default_protocol_name")]
    pub protocol: String,
    #[serde(default)]
    pub country: Option<String>,
}

fn default_protocol_name() -> String {
    Protocol::Http.to_string()
}

impl TryFrom<CandidateRecord> for ProxyEntry {
    type Error = EntryError;

    fn try_from(record: CandidateRecord) -> Result<Self, Self::Error> {
        let port = u16::try_from(record.port)
            .ok()
            .filter(|port| *port != 0)
            .ok_or(EntryError::InvalidPort(record.port))?;
        let protocol = record.protocol.parse()?;
        let entry = ProxyEntry::new(record.address, port, protocol)?;

        Ok(match record.country {
            Some(country) => entry.with_country(country),
            None => entry,
        })
    }
}
