//! Parser turning candidate proxy lists into entries

use crate::proxy::models::{Protocol, ProxyEntry};
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::debug;

/// `scheme://host:port`, scheme restricted to the supported protocols
static URL_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)(https?|socks[45])://([^:/@\s\[\]]+|\[[0-9a-fA-F:]+\]):(\d{1,5})/?$")
        .expect("Invalid proxy URL regex")
});

/// Bare `host:port`
static HOST_PORT_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^:/@\s\[\]]+|\[[0-9a-fA-F:]+\]):(\d{1,5})$").expect("Invalid host:port regex")
});

/// Two-letter country code trailing an entry
static COUNTRY_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{2}$").expect("Invalid country code regex"));

/// Parser for candidate proxy lists
pub struct EntryParser;

impl EntryParser {
    /// Parse a single candidate line
    ///
    /// Supports formats:
    /// - IP:PORT
    /// - scheme://IP:PORT
    /// - either of the above followed by a country code, e.g. `1.2.3.4:8080 US`
    pub fn parse_line(line: &str, default_protocol: Protocol) -> Option<ProxyEntry> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let mut fields = line.split_whitespace();
        let address_field = fields.next()?;
        let country = match (fields.next(), fields.next()) {
            (None, _) => None,
            (Some(code), None) if COUNTRY_CODE.is_match(code) => Some(code.to_ascii_uppercase()),
            _ => {
                debug!(line, "rejecting candidate with unexpected trailing fields");
                return None;
            }
        };

        let entry = Self::parse_url_format(address_field)
            .or_else(|| Self::parse_host_port_format(address_field, default_protocol));

        match (entry, country) {
            (Some(entry), Some(country)) => Some(entry.with_country(country)),
            (Some(entry), None) => Some(entry),
            (None, _) => {
                debug!(line, "rejecting malformed candidate line");
                None
            }
        }
    }

    /// Parse URL format (e.g., socks5://ip:port)
    fn parse_url_format(field: &str) -> Option<ProxyEntry> {
        let caps = URL_FORMAT.captures(field)?;
        let protocol: Protocol = caps[1].parse().ok()?;
        let host = caps[2].trim_start_matches('[').trim_end_matches(']');
        let port: u16 = caps[3].parse().ok()?;

        ProxyEntry::new(host, port, protocol).ok()
    }

    /// Parse ip:port format
    fn parse_host_port_format(field: &str, default_protocol: Protocol) -> Option<ProxyEntry> {
        let caps = HOST_PORT_FORMAT.captures(field)?;
        let host = caps[1].trim_start_matches('[').trim_end_matches(']');
        let port: u16 = caps[2].parse().ok()?;

        ProxyEntry::new(host, port, default_protocol).ok()
    }

    /// Parse entries from a string (multiple lines)
    pub fn parse_string(content: &str, default_protocol: Protocol) -> Vec<ProxyEntry> {
        content
            .lines()
            .filter_map(|line| Self::parse_line(line, default_protocol))
            .collect()
    }

    /// Parse entries from a file
    pub fn parse_file<P: AsRef<Path>>(path: P, default_protocol: Protocol) -> Result<Vec<ProxyEntry>> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse_string(&content, default_protocol))
    }
}
