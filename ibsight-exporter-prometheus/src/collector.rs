//! Scrape collector: reads the counter filesystem, updates the registry and
//! renders it, once per scrape request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ibsight_common::{CounterSource, InfiniBandClass};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::{AbsentSeriesPolicy, CollectionConfig};
use crate::metrics::{InfiniBandMetrics, UpdateSummary};

/// Why a scrape produced no fresh snapshot.
#[derive(Debug, Error)]
pub enum ReadFailure {
    #[error("{0}")]
    Source(#[from] ibsight_common::Error),
    #[error("read did not finish within {0:?}")]
    Timeout(Duration),
    #[error("read task failed: {0}")]
    Task(String),
    #[error("a previous read is still blocked in the counter filesystem")]
    Stalled,
}

/// Result of one collection cycle.
#[derive(Debug)]
pub enum ScrapeOutcome {
    /// The registry was updated from a fresh snapshot.
    Updated(UpdateSummary),
    /// The read failed; the registry keeps its previous values.
    ReadFailed(ReadFailure),
}

impl ScrapeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ScrapeOutcome::Updated(_))
    }
}

/// Filter for device names.
pub struct DeviceFilter {
    include: Vec<glob::Pattern>,
    exclude: Vec<glob::Pattern>,
}

impl DeviceFilter {
    /// Create a new filter from configuration.
    pub fn new(config: &CollectionConfig) -> Self {
        let include = config
            .include_devices
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();

        let exclude = config
            .exclude_devices
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();

        Self { include, exclude }
    }

    /// Check if a device should be exported.
    pub fn should_include(&self, device: &str) -> bool {
        if !self.include.is_empty() && !self.include.iter().any(|p| p.matches(device)) {
            return false;
        }
        !self.exclude.iter().any(|p| p.matches(device))
    }

    fn apply(&self, class: InfiniBandClass) -> InfiniBandClass {
        class
            .into_iter()
            .filter(|(name, _)| {
                let keep = self.should_include(name);
                if !keep {
                    trace!(device = %name, "Device filtered out");
                }
                keep
            })
            .collect()
    }
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self::new(&CollectionConfig::default())
    }
}

/// Collector statistics.
#[derive(Debug, Clone, Default)]
pub struct CollectorStats {
    /// Collection cycles started.
    pub scrapes: u64,
    /// Reads that returned a snapshot.
    pub reads_succeeded: u64,
    /// Reads that failed, including timeouts.
    pub reads_failed: u64,
    /// Reads that exceeded the timeout or were skipped behind a stalled one.
    pub read_timeouts: u64,
    /// Outcome of the most recent read, `None` before the first one.
    pub last_read_ok: Option<bool>,
    /// Devices exported by the most recent successful read.
    pub devices: usize,
    /// Ports exported by the most recent successful read.
    pub ports: usize,
}

/// Drives Read → Update → Render for every scrape.
pub struct ScrapeCollector {
    source: Arc<dyn CounterSource>,
    metrics: InfiniBandMetrics,
    filter: DeviceFilter,
    policy: AbsentSeriesPolicy,
    read_timeout: Duration,
    stats: RwLock<CollectorStats>,
    /// Blocking read abandoned by the last timeout, while it keeps running.
    stalled: Mutex<Option<JoinHandle<ibsight_common::Result<InfiniBandClass>>>>,
}

/// Create a shareable collector handle.
pub type SharedCollector = Arc<ScrapeCollector>;

impl ScrapeCollector {
    /// Create a collector with its own registry.
    pub fn new(
        source: Arc<dyn CounterSource>,
        collection: &CollectionConfig,
        read_timeout: Duration,
    ) -> Self {
        Self {
            source,
            metrics: InfiniBandMetrics::new(),
            filter: DeviceFilter::new(collection),
            policy: collection.absent_series,
            read_timeout,
            stats: RwLock::new(CollectorStats::default()),
            stalled: Mutex::new(None),
        }
    }

    /// The registry this collector writes to.
    pub fn metrics(&self) -> &InfiniBandMetrics {
        &self.metrics
    }

    /// Collect a fresh snapshot and render the registry.
    ///
    /// Always returns a valid exposition body; a failed read leaves the
    /// previous values in place.
    pub async fn scrape(&self) -> String {
        self.collect().await;
        self.metrics.render()
    }

    /// Read the counter filesystem on the blocking pool, bounded by the
    /// read timeout, and update the registry.
    ///
    /// A timed-out read cannot be cancelled. Until it returns, further
    /// collections fail fast instead of parking another blocking thread.
    pub async fn collect(&self) -> ScrapeOutcome {
        let start = Instant::now();

        if self.read_still_stalled() {
            return self.apply(Err(ReadFailure::Stalled), start.elapsed());
        }

        let source = self.source.clone();
        let mut read = tokio::task::spawn_blocking(move || source.read_class());

        let result = match tokio::time::timeout(self.read_timeout, &mut read).await {
            Ok(Ok(Ok(class))) => Ok(class),
            Ok(Ok(Err(e))) => Err(ReadFailure::Source(e)),
            Ok(Err(e)) => Err(ReadFailure::Task(e.to_string())),
            Err(_) => {
                *self.stalled.lock() = Some(read);
                Err(ReadFailure::Timeout(self.read_timeout))
            }
        };

        self.apply(result, start.elapsed())
    }

    fn read_still_stalled(&self) -> bool {
        let mut stalled = self.stalled.lock();
        match stalled.as_ref() {
            Some(handle) if !handle.is_finished() => true,
            Some(_) => {
                debug!("Stalled counter read finished");
                *stalled = None;
                false
            }
            None => false,
        }
    }

    fn apply(
        &self,
        result: Result<InfiniBandClass, ReadFailure>,
        elapsed: Duration,
    ) -> ScrapeOutcome {
        self.stats.write().scrapes += 1;

        match result {
            Ok(class) => {
                let class = self.filter.apply(class);
                let summary = self.metrics.update(&class, self.policy);
                self.metrics.record_read(true, elapsed);

                let mut stats = self.stats.write();
                stats.reads_succeeded += 1;
                stats.last_read_ok = Some(true);
                stats.devices = summary.devices;
                stats.ports = summary.ports;
                drop(stats);

                debug!(
                    devices = summary.devices,
                    ports = summary.ports,
                    series = summary.counter_series,
                    removed = summary.removed_series,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Collected InfiniBand counters"
                );
                ScrapeOutcome::Updated(summary)
            }
            Err(e) => {
                self.metrics.record_read(false, elapsed);

                let mut stats = self.stats.write();
                stats.reads_failed += 1;
                if matches!(e, ReadFailure::Timeout(_) | ReadFailure::Stalled) {
                    stats.read_timeouts += 1;
                }
                stats.last_read_ok = Some(false);
                drop(stats);

                warn!(error = %e, "Failed to read InfiniBand counters");
                ScrapeOutcome::ReadFailed(e)
            }
        }
    }

    /// Get collector statistics.
    pub fn stats(&self) -> CollectorStats {
        self.stats.read().clone()
    }

    /// Render the registry without collecting.
    pub fn render(&self) -> String {
        self.metrics.render()
    }
}
