//! Probe strategies: one request routed through a candidate proxy

use crate::proxy::models::{Protocol, ProxyStatus, ProxyTarget};
use futures::future::BoxFuture;
use reqwest::{Client, Proxy as ReqwestProxy};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Default URL to test proxies against
pub const DEFAULT_TEST_URL: &str = "https://httpbin.org/ip";

/// Why a probe failed
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The proxy URL or client could not be built
    #[error("failed to set up proxy client: {0}")]
    Client(#[source] reqwest::Error),
    /// Connect, DNS, proxy negotiation or read failure, including the transport deadline
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    /// Socket-level failure in a strategy that drives the connection itself
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Protocol-specific logic for one round-trip through a proxy.
///
/// Implementations never touch shared run state; the elapsed time is
/// measured by the caller around the returned future.
pub trait ProbeStrategy: Send + Sync {
    fn probe<'a>(
        &'a self,
        target: &'a ProxyTarget,
        deadline: Duration,
    ) -> BoxFuture<'a, Result<(), ProbeError>>;
}

/// Map a completed probe to its classification.
pub fn classify(result: &Result<(), ProbeError>, elapsed: Duration, timeout: Duration) -> ProxyStatus {
    match result {
        Err(_) => ProxyStatus::Invalid,
        Ok(()) if elapsed > timeout => ProxyStatus::Slow,
        Ok(()) => ProxyStatus::Valid,
    }
}

/// Probe through an HTTP proxy (used for `http` and `https` entries)
#[derive(Debug, Clone)]
pub struct HttpProxyProbe {
    test_url: String,
}

impl HttpProxyProbe {
    pub fn new(test_url: impl Into<String>) -> Self {
        Self {
            test_url: test_url.into(),
        }
    }
}

impl ProbeStrategy for HttpProxyProbe {
    fn probe<'a>(
        &'a self,
        target: &'a ProxyTarget,
        deadline: Duration,
    ) -> BoxFuture<'a, Result<(), ProbeError>> {
        Box::pin(async move {
            // HTTPS entries are HTTP proxies that accept CONNECT; the hop itself is plain.
            let proxy_url = target.url_with_scheme("http");
            let proxy = ReqwestProxy::all(proxy_url.as_str()).map_err(ProbeError::Client)?;
            request_through(proxy, &self.test_url, deadline).await
        })
    }
}

/// Probe through a SOCKS4 or SOCKS5 proxy
#[derive(Debug, Clone)]
pub struct SocksProxyProbe {
    test_url: String,
}

impl SocksProxyProbe {
    pub fn new(test_url: impl Into<String>) -> Self {
        Self {
            test_url: test_url.into(),
        }
    }

    fn scheme(protocol: Protocol) -> &'static str {
        match protocol {
            Protocol::Socks4 => "socks4",
            // Let the proxy resolve the test host.
            _ => "socks5h",
        }
    }
}

impl ProbeStrategy for SocksProxyProbe {
    fn probe<'a>(
        &'a self,
        target: &'a ProxyTarget,
        deadline: Duration,
    ) -> BoxFuture<'a, Result<(), ProbeError>> {
        Box::pin(async move {
            let proxy_url = target.url_with_scheme(Self::scheme(target.protocol()));
            let proxy = ReqwestProxy::all(proxy_url.as_str()).map_err(ProbeError::Client)?;
            request_through(proxy, &self.test_url, deadline).await
        })
    }
}

/// Send one GET to `test_url` through `proxy`, bounded by `deadline`.
async fn request_through(proxy: ReqwestProxy, test_url: &str, deadline: Duration) -> Result<(), ProbeError> {
    let client = Client::builder()
        .proxy(proxy)
        .connect_timeout(deadline)
        .timeout(deadline)
        .build()
        .map_err(ProbeError::Client)?;

    let response = client
        .get(test_url)
        .send()
        .await
        .map_err(ProbeError::Transport)?;

    // Any status counts once the whole response has arrived.
    let status = response.status();
    response.bytes().await.map_err(ProbeError::Transport)?;
    trace!(%status, test_url, "probe response received");
    Ok(())
}

/// Lookup table from protocol to probe strategy
#[derive(Clone)]
pub struct ProbeTable {
    http: Arc<dyn ProbeStrategy>,
    socks: Arc<dyn ProbeStrategy>,
}

impl ProbeTable {
    pub fn new(http: Arc<dyn ProbeStrategy>, socks: Arc<dyn ProbeStrategy>) -> Self {
        Self { http, socks }
    }

    /// Use one strategy for every protocol
    pub fn uniform(strategy: Arc<dyn ProbeStrategy>) -> Self {
        Self {
            http: Arc::clone(&strategy),
            socks: strategy,
        }
    }

    /// The reqwest-backed strategies, all probing `test_url`
    pub fn for_test_url(test_url: &str) -> Self {
        Self::new(
            Arc::new(HttpProxyProbe::new(test_url)),
            Arc::new(SocksProxyProbe::new(test_url)),
        )
    }

    /// Strategy responsible for `protocol`
    pub fn strategy_for(&self, protocol: Protocol) -> &Arc<dyn ProbeStrategy> {
        match protocol {
            Protocol::Http | Protocol::Https => &self.http,
            Protocol::Socks4 | Protocol::Socks5 => &self.socks,
        }
    }
}

impl Default for ProbeTable {
    fn default() -> Self {
        Self::for_test_url(DEFAULT_TEST_URL)
    }
}

impl std::fmt::Debug for ProbeTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeTable").finish_non_exhaustive()
    }
}
