//! Bounded concurrent proxy validation
//!
//! A single driver admits probes through a fixed number of admission slots,
//! folds every completion into one run tally, and reports progress after each
//! completed probe. Admission can end early once enough proxies are valid, or
//! when the caller cancels the run.

use crate::proxy::models::{ProxyEntry, ProxyStatus, ProxyTarget};
use crate::proxy::probe::{classify, ProbeError, ProbeStrategy, ProbeTable, DEFAULT_TEST_URL};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Default classification timeout for a probe
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(6000);

/// Default number of concurrent probes
const DEFAULT_CONCURRENCY: usize = 20;

/// Errors that abort a whole validation run
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("concurrency limit must be greater than zero")]
    InvalidConcurrency,
    #[error("probe timeout must be greater than zero")]
    InvalidTimeout,
    #[error("entry {index} was already checked; every entry must start unknown")]
    AlreadyChecked { index: usize },
}

/// Configuration for proxy checker
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Probes slower than this are classified as slow
    pub timeout: Duration,
    /// Number of concurrent probes
    pub concurrency: usize,
    /// URL to test proxies against
    pub test_url: String,
    /// Hard deadline handed to the transport; defaults to `timeout`
    pub transport_timeout: Option<Duration>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            test_url: DEFAULT_TEST_URL.to_string(),
            transport_timeout: None,
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_test_url(mut self, url: String) -> Self {
        self.test_url = url;
        self
    }

    pub fn with_transport_timeout(mut self, timeout: Duration) -> Self {
        self.transport_timeout = Some(timeout);
        self
    }

    /// Deadline the transport enforces on a single probe
    pub fn transport_deadline(&self) -> Duration {
        self.transport_timeout.unwrap_or(self.timeout)
    }

    /// Reject configurations no run can honour
    pub fn validate(&self) -> Result<(), CheckError> {
        if self.concurrency == 0 {
            return Err(CheckError::InvalidConcurrency);
        }
        if self.timeout.is_zero() || self.transport_deadline().is_zero() {
            return Err(CheckError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Progress after one completed probe
#[derive(Debug, Clone)]
pub struct Progress {
    /// Probes completed so far
    pub checked: usize,
    /// Entries in the batch
    pub total: usize,
    /// Entries classified valid so far
    pub valid: usize,
    /// The entry whose probe just completed, with its final status
    pub entry: ProxyEntry,
}

impl Progress {
    /// Whether every entry of the batch has been checked
    pub fn is_complete(&self) -> bool {
        self.checked == self.total
    }
}

/// Entries handed back by a streamed run
#[derive(Debug, Clone)]
pub struct CheckedBatch {
    /// All entries, classified in place
    pub entries: Vec<ProxyEntry>,
    /// The valid subset, in completion order
    pub valid: Vec<ProxyEntry>,
}

/// A run in progress: updates as they happen, and the final batch
#[derive(Debug)]
pub struct ProgressStream {
    pub updates: mpsc::UnboundedReceiver<Progress>,
    pub handle: JoinHandle<Result<CheckedBatch, CheckError>>,
}

/// Result of one probe as seen by the driver
struct Verdict {
    index: usize,
    status: ProxyStatus,
    elapsed: Duration,
}

/// Shared counters of a run. Only the driver mutates it, one completion at a time.
struct Tally {
    total: usize,
    checked: usize,
    valid: Vec<ProxyEntry>,
}

impl Tally {
    fn new(total: usize) -> Self {
        Self {
            total,
            checked: 0,
            valid: Vec::new(),
        }
    }

    fn record(&mut self, entry: &ProxyEntry) -> Progress {
        self.checked += 1;
        if entry.is_valid() {
            self.valid.push(entry.clone());
        }

        Progress {
            checked: self.checked,
            total: self.total,
            valid: self.valid.len(),
            entry: entry.clone(),
        }
    }

    fn target_reached(&self, target_valid: Option<usize>) -> bool {
        target_valid.is_some_and(|target| self.valid.len() >= target)
    }
}

/// Proxy checker for validating batches of candidate proxies
#[derive(Debug, Clone)]
pub struct ProxyChecker {
    config: CheckerConfig,
    strategies: ProbeTable,
}

impl ProxyChecker {
    /// Create a new proxy checker with default configuration
    pub fn new() -> Self {
        Self::with_config(CheckerConfig::default())
    }

    /// Create a new proxy checker with custom configuration
    pub fn with_config(config: CheckerConfig) -> Self {
        let strategies = ProbeTable::for_test_url(&config.test_url);
        Self { config, strategies }
    }

    /// Create a checker that dispatches to custom probe strategies
    pub fn with_strategies(config: CheckerConfig, strategies: ProbeTable) -> Self {
        Self { config, strategies }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Validate `entries` in place and return the valid subset.
    ///
    /// Entries are admitted in input order, at most `concurrency` probes at a
    /// time. When `target_valid` is set, admission stops as soon as that many
    /// entries are valid; probes already in flight still complete, so the
    /// valid count may overshoot the target. Entries never admitted stay
    /// [`ProxyStatus::Unknown`].
    ///
    /// `on_update` runs on the driver after every completed probe, one call at
    /// a time, in completion order.
    ///
    /// Cancelling `cancel` stops admission and aborts in-flight probes. Probes
    /// that already finished are applied whole; aborted ones leave their entry
    /// unknown. The valid entries gathered so far are returned.
    pub async fn check_all<F>(
        &self,
        entries: &mut [ProxyEntry],
        target_valid: Option<usize>,
        cancel: &CancellationToken,
        mut on_update: F,
    ) -> Result<Vec<ProxyEntry>, CheckError>
    where
        F: FnMut(&Progress),
    {
        self.config.validate()?;
        if let Some(index) = entries.iter().position(ProxyEntry::is_checked) {
            return Err(CheckError::AlreadyChecked { index });
        }

        let total = entries.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        info!(
            total,
            concurrency = self.config.concurrency,
            target_valid,
            timeout_ms = self.config.timeout.as_millis() as u64,
            "starting proxy check"
        );

        let slots = Arc::new(Semaphore::new(self.config.concurrency));
        let mut probes: JoinSet<Verdict> = JoinSet::new();
        let mut tally = Tally::new(total);
        let mut next = 0;
        let mut stopped_early = false;
        let mut cancelled = false;

        loop {
            if !stopped_early && tally.target_reached(target_valid) {
                stopped_early = true;
                info!(
                    valid = tally.valid.len(),
                    admitted = next,
                    in_flight = probes.len(),
                    "target reached, no further proxies admitted"
                );
            }

            let admitting = !cancelled && !stopped_early && next < total;
            if !admitting && probes.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    info!(
                        checked = tally.checked,
                        in_flight = probes.len(),
                        "check cancelled, aborting in-flight probes"
                    );
                    probes.abort_all();
                }

                Some(joined) = probes.join_next(), if !probes.is_empty() => {
                    match joined {
                        Ok(verdict) => {
                            let entry = &mut entries[verdict.index];
                            entry.record(verdict.status, verdict.elapsed);
                            let progress = tally.record(entry);
                            debug!(
                                proxy = %entry,
                                status = %entry.status(),
                                latency_ms = verdict.elapsed.as_millis() as u64,
                                checked = progress.checked,
                                valid = progress.valid,
                                "probe finished"
                            );
                            on_update(&progress);
                        }
                        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                        Err(_) => trace!("aborted probe discarded"),
                    }
                }

                // The semaphore is never closed, so acquiring only waits.
                Ok(permit) = Arc::clone(&slots).acquire_owned(), if admitting => {
                    let index = next;
                    next += 1;

                    let target = entries[index].target().clone();
                    let strategy = Arc::clone(self.strategies.strategy_for(target.protocol()));
                    let timeout = self.config.timeout;
                    let deadline = self.config.transport_deadline();
                    trace!(proxy = %target, index, "probe admitted");

                    probes.spawn(async move {
                        let _permit = permit;
                        let (status, elapsed) = probe_once(&*strategy, &target, timeout, deadline).await;
                        Verdict { index, status, elapsed }
                    });
                }

                else => break,
            }
        }

        info!(
            total,
            checked = tally.checked,
            valid = tally.valid.len(),
            unchecked = total - tally.checked,
            stopped_early,
            cancelled,
            "proxy check finished"
        );

        Ok(tally.valid)
    }

    /// Run [`check_all`](Self::check_all) on a background task and stream its progress.
    pub fn check_stream(
        &self,
        mut entries: Vec<ProxyEntry>,
        target_valid: Option<usize>,
        cancel: CancellationToken,
    ) -> ProgressStream {
        let (sender, updates) = mpsc::unbounded_channel();
        let checker = self.clone();

        let handle = tokio::spawn(async move {
            let valid = checker
                .check_all(&mut entries, target_valid, &cancel, |progress| {
                    // The receiver may be gone; the run still completes.
                    let _ = sender.send(progress.clone());
                })
                .await?;
            Ok(CheckedBatch { entries, valid })
        });

        ProgressStream { updates, handle }
    }
}

impl Default for ProxyChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Probe one target, timing the whole attempt, and classify the outcome.
async fn probe_once(
    strategy: &dyn ProbeStrategy,
    target: &ProxyTarget,
    timeout: Duration,
    deadline: Duration,
) -> (ProxyStatus, Duration) {
    let start = Instant::now();
    let result: Result<(), ProbeError> = strategy.probe(target, deadline).await;
    let elapsed = start.elapsed();

    if let Err(err) = &result {
        debug!(proxy = %target, error = %err, "probe failed");
    }

    (classify(&result, elapsed, timeout), elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::Protocol;
    use futures::future::BoxFuture;
    use std::collections::HashMap;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum Script {
        Succeed(Duration),
        Fail(Duration),
    }

    /// In-memory strategy whose behaviour is scripted per address
    #[derive(Default)]
    struct ScriptedProbe {
        scripts: HashMap<String, Script>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        probed: Mutex<Vec<String>>,
    }

    impl ScriptedProbe {
        fn new(scripts: impl IntoIterator<Item = (String, Script)>) -> Arc<Self> {
            Arc::new(Self {
                scripts: scripts.into_iter().collect(),
                ..Default::default()
            })
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }

        fn probed(&self) -> Vec<String> {
            self.probed.lock().unwrap().clone()
        }
    }

    impl ProbeStrategy for ScriptedProbe {
        fn probe<'a>(
            &'a self,
            target: &'a ProxyTarget,
            _deadline: Duration,
        ) -> BoxFuture<'a, Result<(), ProbeError>> {
            Box::pin(async move {
                self.probed.lock().unwrap().push(target.address().to_string());
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);

                let script = self.scripts[target.address()];
                let (delay, ok) = match script {
                    Script::Succeed(delay) => (delay, true),
                    Script::Fail(delay) => (delay, false),
                };
                tokio::time::sleep(delay).await;

                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                if ok {
                    Ok(())
                } else {
                    Err(ProbeError::from(io::Error::from(io::ErrorKind::ConnectionReset)))
                }
            })
        }
    }

    fn address(index: usize) -> String {
        format!("10.0.0.{}", index + 1)
    }

    fn entries(count: usize) -> Vec<ProxyEntry> {
        (0..count)
            .map(|i| ProxyEntry::new(address(i), 8080, Protocol::Http).unwrap())
            .collect()
    }

    fn checker(probe: Arc<ScriptedProbe>, concurrency: usize) -> ProxyChecker {
        let config = CheckerConfig::new()
            .with_concurrency(concurrency)
            .with_timeout(Duration::from_secs(1));
        ProxyChecker::with_strategies(config, ProbeTable::uniform(probe))
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_checker_config_default() {
        let config = CheckerConfig::default();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.test_url, DEFAULT_TEST_URL);
        assert_eq!(config.transport_deadline(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_checker_config_builder() {
        let config = CheckerConfig::new()
            .with_timeout(Duration::from_secs(3))
            .with_concurrency(15)
            .with_test_url("http://example.com".to_string())
            .with_transport_timeout(Duration::from_secs(10));

        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.concurrency, 15);
        assert_eq!(config.test_url, "http://example.com");
        assert_eq!(config.transport_deadline(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_checker_config_validation() {
        assert!(matches!(
            CheckerConfig::new().with_concurrency(0).validate(),
            Err(CheckError::InvalidConcurrency)
        ));
        assert!(matches!(
            CheckerConfig::new().with_timeout(Duration::ZERO).validate(),
            Err(CheckError::InvalidTimeout)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_batch_returns_immediately() {
        let probe = Arc::new(ScriptedProbe::default());
        let mut batch = Vec::new();
        let mut updates = 0;

        let valid = checker(probe, 5)
            .check_all(&mut batch, None, &CancellationToken::new(), |_| updates += 1)
            .await
            .unwrap();

        assert!(valid.is_empty());
        assert_eq!(updates, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_concurrency_fails_before_probing() {
        let probe = ScriptedProbe::new((0..3).map(|i| (address(i), Script::Succeed(ms(10)))));
        let mut batch = entries(3);

        let result = checker(Arc::clone(&probe), 0)
            .check_all(&mut batch, None, &CancellationToken::new(), |_| {})
            .await;

        assert!(matches!(result, Err(CheckError::InvalidConcurrency)));
        assert!(probe.probed().is_empty());
        assert!(batch.iter().all(|e| e.status() == ProxyStatus::Unknown));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_checked_entry_is_rejected() {
        let probe = ScriptedProbe::new((0..3).map(|i| (address(i), Script::Succeed(ms(10)))));
        let mut batch = entries(3);
        batch[1].record(ProxyStatus::Valid, ms(5));

        let result = checker(Arc::clone(&probe), 2)
            .check_all(&mut batch, None, &CancellationToken::new(), |_| {})
            .await;

        assert!(matches!(result, Err(CheckError::AlreadyChecked { index: 1 })));
        assert!(probe.probed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_valid_without_target() {
        let probe = ScriptedProbe::new((0..5).map(|i| (address(i), Script::Succeed(ms(50 + i as u64)))));
        let mut batch = entries(5);
        let mut updates = Vec::new();

        let valid = checker(probe, 5)
            .check_all(&mut batch, None, &CancellationToken::new(), |p| {
                updates.push((p.checked, p.total, p.valid))
            })
            .await
            .unwrap();

        assert_eq!(valid.len(), 5);
        assert!(batch.iter().all(|e| e.status() == ProxyStatus::Valid));
        assert!(batch.iter().all(|e| e.latency().is_some()));
        assert_eq!(updates.len(), 5);
        assert_eq!(updates.last(), Some(&(5, 5, 5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_and_invalid_are_excluded() {
        let probe = ScriptedProbe::new([
            (address(0), Script::Succeed(ms(200))),
            (address(1), Script::Succeed(ms(1500))),
            (address(2), Script::Fail(ms(30))),
        ]);
        let mut batch = entries(3);

        let valid = checker(probe, 3)
            .check_all(&mut batch, None, &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].address(), address(0));

        assert_eq!(batch[1].status(), ProxyStatus::Slow);
        let slow_latency = batch[1].latency().unwrap();
        assert!(slow_latency >= ms(1500) && slow_latency < ms(1600), "{slow_latency:?}");

        assert_eq!(batch[2].status(), ProxyStatus::Invalid);
        assert!(batch[2].latency().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit_is_never_exceeded() {
        let probe = ScriptedProbe::new(
            (0..30).map(|i| (address(i), Script::Succeed(ms(10 + (i as u64 * 7) % 40)))),
        );
        let mut batch = entries(30);

        let valid = checker(Arc::clone(&probe), 4)
            .check_all(&mut batch, None, &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(valid.len(), 30);
        assert_eq!(probe.peak(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_admitted_in_input_order_exactly_once() {
        let probe = ScriptedProbe::new(
            (0..12).map(|i| (address(i), Script::Succeed(ms(100 - i as u64 * 5)))),
        );
        let mut batch = entries(12);

        checker(Arc::clone(&probe), 3)
            .check_all(&mut batch, None, &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        let expected: Vec<String> = (0..12).map(address).collect();
        assert_eq!(probe.probed(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counters_match_classifications() {
        let probe = ScriptedProbe::new((0..10).map(|i| {
            let script = match i % 3 {
                0 => Script::Succeed(ms(20)),
                1 => Script::Fail(ms(40)),
                _ => Script::Succeed(ms(1200)),
            };
            (address(i), script)
        }));
        let mut batch = entries(10);
        let mut last = None;
        let mut checked_seen = Vec::new();

        let valid = checker(probe, 3)
            .check_all(&mut batch, None, &CancellationToken::new(), |p| {
                assert!(p.valid <= p.checked);
                assert!(p.entry.is_checked());
                checked_seen.push(p.checked);
                last = Some(p.clone());
            })
            .await
            .unwrap();

        let last = last.unwrap();
        assert!(last.is_complete());
        assert_eq!(checked_seen, (1..=10).collect::<Vec<_>>());

        let valid_in_batch = batch.iter().filter(|e| e.is_valid()).count();
        assert_eq!(valid_in_batch, 4);
        assert_eq!(last.valid, valid_in_batch);
        assert_eq!(valid.len(), valid_in_batch);
        assert_eq!(batch.iter().filter(|e| e.status() == ProxyStatus::Invalid).count(), 3);
        assert_eq!(batch.iter().filter(|e| e.status() == ProxyStatus::Slow).count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_stop_leaves_unadmitted_entries_unknown() {
        // Three quick successes, everything else slow to answer.
        let probe = ScriptedProbe::new((0..20).map(|i| {
            let delay = if i < 3 { ms(10 * (i as u64 + 1)) } else { ms(500) };
            (address(i), Script::Succeed(delay))
        }));
        let mut batch = entries(20);
        let mut updates = 0;

        let valid = checker(Arc::clone(&probe), 5)
            .check_all(&mut batch, Some(3), &CancellationToken::new(), |_| updates += 1)
            .await
            .unwrap();

        assert!(valid.len() >= 3);
        let checked = batch.iter().filter(|e| e.is_checked()).count();
        assert_eq!(checked, probe.probed().len());
        assert_eq!(updates, checked);
        assert!(checked < 20);

        // Five initial slots plus one refill per quick success before the third.
        assert!(batch[7..].iter().all(|e| e.status() == ProxyStatus::Unknown));
        assert!(batch[7..].iter().all(|e| e.latency().is_none()));
        assert!(batch[..7].iter().all(|e| e.is_checked()));
        assert_eq!(valid.len(), batch.iter().filter(|e| e.is_valid()).count());
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_stop_overshoot_is_kept() {
        // All admitted probes succeed together, crossing the target at once.
        let probe = ScriptedProbe::new((0..10).map(|i| (address(i), Script::Succeed(ms(100)))));
        let mut batch = entries(10);

        let valid = checker(probe, 4)
            .check_all(&mut batch, Some(2), &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert!(valid.len() >= 2);
        assert_eq!(valid.len(), batch.iter().filter(|e| e.is_valid()).count());
        // At most one slot is refilled before the second success is folded in.
        assert!(batch[5..].iter().all(|e| e.status() == ProxyStatus::Unknown));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_target_admits_nothing() {
        let probe = ScriptedProbe::new((0..3).map(|i| (address(i), Script::Succeed(ms(10)))));
        let mut batch = entries(3);

        let valid = checker(Arc::clone(&probe), 2)
            .check_all(&mut batch, Some(0), &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert!(valid.is_empty());
        assert!(probe.probed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_target_checks_everything() {
        let probe = ScriptedProbe::new((0..6).map(|i| {
            let script = if i == 2 { Script::Succeed(ms(10)) } else { Script::Fail(ms(10)) };
            (address(i), script)
        }));
        let mut batch = entries(6);

        let valid = checker(probe, 2)
            .check_all(&mut batch, Some(3), &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(valid.len(), 1);
        assert!(batch.iter().all(|e| e.is_checked()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_admission_and_discards_aborted_probes() {
        let probe = ScriptedProbe::new((0..10).map(|i| {
            let delay = if i == 0 { ms(50) } else { ms(200) };
            (address(i), Script::Succeed(delay))
        }));
        let mut batch = entries(10);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut updates = 0;

        let valid = checker(Arc::clone(&probe), 2)
            .check_all(&mut batch, None, &cancel, |_| {
                updates += 1;
                trigger.cancel();
            })
            .await
            .unwrap();

        assert_eq!(updates, 1);
        assert_eq!(valid.len(), 1);
        assert_eq!(batch[0].status(), ProxyStatus::Valid);
        // Entry 1 was in flight and aborted, the rest were never admitted.
        assert!(batch[1..].iter().all(|e| e.status() == ProxyStatus::Unknown));
        assert!(batch[1..].iter().all(|e| e.latency().is_none()));
        assert_eq!(probe.probed(), vec![address(0), address(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_probes_nothing() {
        let probe = ScriptedProbe::new((0..4).map(|i| (address(i), Script::Succeed(ms(10)))));
        let mut batch = entries(4);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let valid = checker(Arc::clone(&probe), 2)
            .check_all(&mut batch, None, &cancel, |_| {})
            .await
            .unwrap();

        assert!(valid.is_empty());
        assert!(probe.probed().is_empty());
        assert!(batch.iter().all(|e| !e.is_checked()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_protocol_dispatch_uses_table() {
        let http = ScriptedProbe::new([(address(0), Script::Succeed(ms(10)))]);
        let socks = ScriptedProbe::new([(address(1), Script::Fail(ms(10)))]);
        let mut batch = vec![
            ProxyEntry::new(address(0), 3128, Protocol::Https).unwrap(),
            ProxyEntry::new(address(1), 1080, Protocol::Socks4).unwrap(),
        ];
        let table = ProbeTable::new(Arc::clone(&http) as _, Arc::clone(&socks) as _);
        let checker = ProxyChecker::with_strategies(CheckerConfig::new(), table);

        let valid = checker
            .check_all(&mut batch, None, &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(valid.len(), 1);
        assert_eq!(http.probed(), vec![address(0)]);
        assert_eq!(socks.probed(), vec![address(1)]);
        assert_eq!(batch[1].status(), ProxyStatus::Invalid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_stream_delivers_every_update() {
        let probe = ScriptedProbe::new((0..8).map(|i| {
            let script = if i % 2 == 0 { Script::Succeed(ms(30)) } else { Script::Fail(ms(60)) };
            (address(i), script)
        }));
        let stream = checker(probe, 3).check_stream(entries(8), None, CancellationToken::new());
        let ProgressStream { mut updates, handle } = stream;

        let mut received = Vec::new();
        while let Some(progress) = updates.recv().await {
            received.push(progress);
        }
        let batch = handle.await.unwrap().unwrap();

        assert_eq!(received.len(), 8);
        assert!(received.last().unwrap().is_complete());
        assert_eq!(received.last().unwrap().valid, 4);
        assert_eq!(batch.valid.len(), 4);
        assert_eq!(batch.entries.len(), 8);
        assert!(batch.entries.iter().all(|e| e.is_checked()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_stream_reports_precondition_errors() {
        let probe = Arc::new(ScriptedProbe::default());
        let stream = checker(probe, 0).check_stream(entries(2), None, CancellationToken::new());

        let result = stream.handle.await.unwrap();
        assert!(matches!(result, Err(CheckError::InvalidConcurrency)));
    }

    #[test]
    fn test_proxy_checker_with_config() {
        let config = CheckerConfig::new().with_concurrency(50);
        let checker = ProxyChecker::with_config(config);
        assert_eq!(checker.config().concurrency, 50);
    }
}
