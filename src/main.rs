use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use proxy_sieve::{
    logging,
    proxy::{CheckerConfig, EntryParser, Protocol, ProxyChecker, ProxyStatus, DEFAULT_TEST_URL},
};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A bounded concurrent proxy validator
#[derive(Parser)]
#[command(name = "proxy-sieve")]
#[command(about = "Validate candidate proxies with bounded concurrency and early stop")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxies and print the valid ones
    Check {
        /// Input file containing candidate proxies
        input: PathBuf,
        /// Protocol for lines without a scheme (http, https, socks4, socks5)
        #[arg(short = 't', long, default_value = "http")]
        protocol: String,
        /// Number of concurrent probes
        #[arg(short = 'n', long, default_value_t = 20)]
        concurrency: usize,
        /// Probes slower than this many milliseconds are classified slow
        #[arg(long, default_value_t = 6000)]
        timeout_ms: u64,
        /// Hard transport deadline in milliseconds (defaults to --timeout-ms)
        #[arg(long)]
        transport_timeout_ms: Option<u64>,
        /// Stop admitting probes once this many proxies are valid
        #[arg(long)]
        target: Option<usize>,
        /// URL to test proxies against
        #[arg(long, default_value = DEFAULT_TEST_URL)]
        test_url: String,
    },
    /// Parse a candidate list and report what was accepted
    Parse {
        /// Input file containing candidate proxies
        input: PathBuf,
        /// Protocol for lines without a scheme (http, https, socks4, socks5)
        #[arg(short = 't', long, default_value = "http")]
        protocol: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    match cli.command {
        Commands::Parse { input, protocol } => {
            let protocol: Protocol = protocol.parse()?;
            let entries = EntryParser::parse_file(&input, protocol)
                .with_context(|| format!("failed to read {}", input.display()))?;

            println!("Parsed {} proxies from {:?}", entries.len(), input);
            for entry in &entries {
                match entry.country() {
                    Some(country) => println!("{}://{} {}", entry.protocol(), entry, country),
                    None => println!("{}://{}", entry.protocol(), entry),
                }
            }
        }
        Commands::Check {
            input,
            protocol,
            concurrency,
            timeout_ms,
            transport_timeout_ms,
            target,
            test_url,
        } => {
            let protocol: Protocol = protocol.parse()?;
            let entries = EntryParser::parse_file(&input, protocol)
                .with_context(|| format!("failed to read {}", input.display()))?;

            let mut config = CheckerConfig::new()
                .with_concurrency(concurrency)
                .with_timeout(Duration::from_millis(timeout_ms))
                .with_test_url(test_url);
            if let Some(ms) = transport_timeout_ms {
                config = config.with_transport_timeout(Duration::from_millis(ms));
            }
            config.validate()?;

            info!(
                proxies = entries.len(),
                input = %input.display(),
                test_url = %config.test_url,
                "loaded candidate proxies"
            );

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, stopping the check");
                    on_interrupt.cancel();
                }
            });

            let checker = ProxyChecker::with_config(config);
            let mut stream = checker.check_stream(entries, target, cancel);

            while let Some(progress) = stream.updates.recv().await {
                let percentage = progress.checked * 100 / progress.total;
                info!(
                    "{}% ({}/{}) | valid: {} | {} {}",
                    percentage,
                    progress.checked,
                    progress.total,
                    progress.valid,
                    progress.entry,
                    progress.entry.status()
                );
            }

            let batch = stream.handle.await??;
            let count = |status: ProxyStatus| batch.entries.iter().filter(|e| e.status() == status).count();

            println!(
                "Results: {} valid, {} invalid, {} slow, {} not checked",
                batch.valid.len(),
                count(ProxyStatus::Invalid),
                count(ProxyStatus::Slow),
                count(ProxyStatus::Unknown)
            );

            if !batch.valid.is_empty() {
                println!("\nWorking proxies:");
                for entry in &batch.valid {
                    let latency = entry.latency().unwrap_or_default();
                    println!("  {}://{} ({}ms)", entry.protocol(), entry, latency.as_millis());
                }
            }
        }
    }

    Ok(())
}
