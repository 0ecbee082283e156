//! Tracing subscriber setup

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING: OnceLock<()> = OnceLock::new();

/// Map a `-v` count to a default filter directive
fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "proxy_sieve=info",
        1 => "proxy_sieve=debug",
        _ => "proxy_sieve=trace",
    }
}

/// Initialize tracing once; `RUST_LOG` wins over `verbosity` when set.
pub fn init_tracing(verbosity: u8) {
    TRACING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .try_init();
        tracing::debug!(verbosity, "tracing initialized");
    });
}
