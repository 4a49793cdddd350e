//! Sync engine state machine.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::fetch::PageFetch;
use crate::records::RecordSet;
use ledgersync_protocol::{PageData, Record};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The current phase of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, no sync has run yet or state was reset.
    Idle,
    /// Engine is fetching a page.
    Fetching,
    /// Engine is waiting out a backoff delay before retrying a page.
    RetryWait,
    /// Engine has completed a sync run.
    Synced,
    /// Engine aborted the last run with an error.
    Error,
}

impl SyncState {
    /// Returns true if the engine is actively working on a page.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Fetching | SyncState::RetryWait)
    }

    /// Returns true if the engine can start a new sync.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Synced | SyncState::Error)
    }
}

/// Why a completed sync run stopped fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The upstream explicitly signalled that pagination is exhausted.
    ///
    /// Reserved: the sequential page loop terminates on page shape alone
    /// and currently never reports this.
    Exhausted,
    /// The last requested page came back with zero records.
    EmptyPage,
    /// The last requested page held fewer records than the requested page
    /// size.
    ShortPage,
}

/// Result of a completed sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Number of unique records accumulated.
    pub record_count: usize,
    /// Why fetching stopped.
    pub stop: StopReason,
}

/// Outcome of a [`SyncEngine::start_sync`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The run completed and every available page was fetched.
    Completed(SyncReport),
    /// Another sync was already in flight; nothing was done.
    AlreadyRunning,
}

/// Live progress after an accepted page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncProgress {
    /// Unique records accumulated so far.
    pub fetched_count: usize,
    /// Advisory server-reported total, if any page carried one. Never
    /// drives termination and may move backwards when the upstream reports
    /// inconsistent totals.
    pub total_expected: Option<u64>,
    /// The page whose acceptance produced this event.
    pub page_just_fetched: u64,
}

/// Counters describing engine activity across runs.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Pages accepted.
    pub pages_fetched: u64,
    /// Records merged into the accumulator, overwrites included.
    pub records_merged: u64,
    /// Records dropped for lack of a usable id.
    pub records_dropped: u64,
    /// Retry waits taken.
    pub retries: u64,
    /// Last error message, if any.
    pub last_error: Option<String>,
}

/// Receives progress and snapshot events from the engine.
///
/// Both callbacks fire in page order, exactly once per accepted page, never
/// for a page that is still retrying, and always with owned copies the
/// caller may retain or diff freely.
pub trait SyncObserver: Send + Sync {
    /// Called after every accepted page with updated counters.
    fn on_progress(&self, progress: SyncProgress) {
        let _ = progress;
    }

    /// Called after every accepted page with the full deduplicated record
    /// list in first-seen order.
    fn on_snapshot(&self, records: Vec<Record>) {
        let _ = records;
    }
}

impl<O: SyncObserver + ?Sized> SyncObserver for Arc<O> {
    fn on_progress(&self, progress: SyncProgress) {
        (**self).on_progress(progress);
    }

    fn on_snapshot(&self, records: Vec<Record>) {
        (**self).on_snapshot(records);
    }
}

/// An observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SyncObserver for NullObserver {}

/// An observer that records every event, for testing.
#[derive(Debug, Default)]
pub struct MemoryObserver {
    progress: Mutex<Vec<SyncProgress>>,
    snapshots: Mutex<Vec<Vec<Record>>>,
}

impl MemoryObserver {
    /// Creates a new memory observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// All progress events seen so far, in arrival order.
    pub fn progress_events(&self) -> Vec<SyncProgress> {
        self.progress.lock().clone()
    }

    /// All snapshots seen so far, in arrival order.
    pub fn snapshots(&self) -> Vec<Vec<Record>> {
        self.snapshots.lock().clone()
    }

    /// The most recent snapshot, if any page was accepted yet.
    pub fn last_snapshot(&self) -> Option<Vec<Record>> {
        self.snapshots.lock().last().cloned()
    }
}

impl SyncObserver for MemoryObserver {
    fn on_progress(&self, progress: SyncProgress) {
        self.progress.lock().push(progress);
    }

    fn on_snapshot(&self, records: Vec<Record>) {
        self.snapshots.lock().push(records);
    }
}

/// The engine's owned mutable state.
#[derive(Debug)]
struct EngineState {
    records: RecordSet,
    total_expected: Option<u64>,
    current_page: u64,
    last_error: Option<String>,
}

impl EngineState {
    fn fresh() -> Self {
        Self {
            records: RecordSet::new(),
            total_expected: None,
            current_page: 1,
            last_error: None,
        }
    }
}

/// The sync engine drives an exhaustive, ordered, deduplicated pull of all
/// records behind a paginated remote resource.
///
/// Pages are fetched strictly sequentially. Each accepted page is merged
/// into an id-keyed accumulator (last page wins on collision), then the
/// observer receives a progress event and a full snapshot. A page that
/// fails is retried with linear backoff up to the configured budget; once
/// the budget is exhausted the whole run aborts, but everything accumulated
/// so far stays available.
pub struct SyncEngine<F: PageFetch, O: SyncObserver> {
    config: SyncConfig,
    fetcher: F,
    observer: O,
    inner: RwLock<EngineState>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    running: AtomicBool,
}

impl<F: PageFetch, O: SyncObserver> SyncEngine<F, O> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, fetcher: F, observer: O) -> Self {
        Self {
            config,
            fetcher,
            observer,
            inner: RwLock::new(EngineState::fresh()),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            running: AtomicBool::new(false),
        }
    }

    /// Gets the current phase.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns true while a sync loop is in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns an owned copy of the accumulated records in first-seen
    /// order.
    pub fn snapshot(&self) -> Vec<Record> {
        self.inner.read().records.snapshot()
    }

    /// The last terminal error message, if the previous run failed.
    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Discards the accumulated state wholesale: records, page counter,
    /// advisory total and last error.
    ///
    /// Fails with [`SyncError::Busy`] while a sync is in flight; this
    /// engine has no mid-flight cancellation, so callers must wait for the
    /// running sync to finish first.
    pub fn reset(&self) -> SyncResult<()> {
        if self.is_running() {
            return Err(SyncError::Busy {
                operation: "reset".into(),
            });
        }
        *self.inner.write() = EngineState::fresh();
        self.set_state(SyncState::Idle);
        debug!("engine state reset");
        Ok(())
    }

    /// Fetches every page of the remote resource, merging records as pages
    /// arrive.
    ///
    /// Returns [`SyncOutcome::AlreadyRunning`] immediately when a sync is
    /// already in flight; the engine is not re-entrant and never runs two
    /// page loops at once. Otherwise the run proceeds until an empty or
    /// short page reports completion, or a page exhausts its retry budget
    /// and the run fails with [`SyncError::PageFailed`].
    ///
    /// The accumulator is not cleared on entry: a restart after a fatal
    /// abort re-fetches from page 1 and merges over what is already
    /// accumulated. Use [`SyncEngine::reset`] first for a full re-sync.
    pub async fn start_sync(&self) -> SyncResult<SyncOutcome> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("sync already in flight, ignoring start request");
            return Ok(SyncOutcome::AlreadyRunning);
        }

        let result = self.run().await;
        match &result {
            Ok(report) => {
                self.set_state(SyncState::Synced);
                self.stats.write().last_error = None;
                info!(
                    records = report.record_count,
                    stop = ?report.stop,
                    "sync complete"
                );
            }
            Err(error) => {
                self.set_state(SyncState::Error);
                let message = error.to_string();
                self.inner.write().last_error = Some(message.clone());
                self.stats.write().last_error = Some(message);
                warn!(error = %error, "sync aborted");
            }
        }
        self.running.store(false, Ordering::SeqCst);

        result.map(SyncOutcome::Completed)
    }

    async fn run(&self) -> SyncResult<SyncReport> {
        {
            let mut inner = self.inner.write();
            inner.current_page = 1;
            inner.last_error = None;
        }

        loop {
            let page = self.inner.read().current_page;
            self.set_state(SyncState::Fetching);
            let data = self.fetch_with_retry(page).await?;
            let raw_len = data.data.len();

            let (progress, snapshot) = self.accept_page(page, data);
            debug!(
                page,
                accepted = raw_len,
                accumulated = progress.fetched_count,
                "page accepted"
            );
            self.observer.on_progress(progress);
            self.observer.on_snapshot(snapshot);

            // Termination is decided on the raw page length before dedup.
            if raw_len == 0 {
                return Ok(SyncReport {
                    record_count: progress.fetched_count,
                    stop: StopReason::EmptyPage,
                });
            }
            if (raw_len as u64) < u64::from(self.config.page_size) {
                return Ok(SyncReport {
                    record_count: progress.fetched_count,
                    stop: StopReason::ShortPage,
                });
            }
            self.inner.write().current_page += 1;
        }
    }

    /// Merges one accepted page into the engine state and prepares the
    /// events to emit for it.
    fn accept_page(&self, page: u64, data: PageData) -> (SyncProgress, Vec<Record>) {
        let mut inner = self.inner.write();
        let outcome = inner.records.merge_page(data.data);

        // Last non-zero total observed wins; a zero is only recorded when
        // nothing has been recorded yet. Reproduces upstream behavior even
        // though it lets progress percentages regress.
        if let Some(total) = data.total {
            if inner.total_expected.is_none() || total != 0 {
                inner.total_expected = Some(total);
            }
        }

        let progress = SyncProgress {
            fetched_count: inner.records.len(),
            total_expected: inner.total_expected,
            page_just_fetched: page,
        };
        let snapshot = inner.records.snapshot();
        drop(inner);

        let mut stats = self.stats.write();
        stats.pages_fetched += 1;
        stats.records_merged += outcome.merged as u64;
        stats.records_dropped += outcome.dropped as u64;

        (progress, snapshot)
    }

    /// Fetches one page, retrying with linear backoff until it succeeds or
    /// the attempt budget is spent. The page counter never advances here.
    async fn fetch_with_retry(&self, page: u64) -> SyncResult<PageData> {
        let max_attempts = self.config.retry.max_attempts;
        let mut failures = 0u32;

        loop {
            let attempt = match self.fetcher.fetch_page(page, self.config.page_size).await {
                Ok(envelope) => {
                    if envelope.ok {
                        envelope.data.ok_or_else(|| {
                            SyncError::Protocol("`ok` response missing page payload".into())
                        })
                    } else {
                        Err(SyncError::Rejected(
                            envelope
                                .error
                                .unwrap_or_else(|| "unspecified upstream error".into()),
                        ))
                    }
                }
                Err(error) => Err(error),
            };

            let cause = match attempt {
                Ok(data) => return Ok(data),
                Err(error) => error.to_string(),
            };

            failures += 1;
            if failures >= max_attempts {
                warn!(page, attempts = failures, %cause, "retry budget exhausted");
                return Err(SyncError::PageFailed {
                    page,
                    attempts: failures,
                    cause,
                });
            }

            let delay = self.config.retry.delay_after_failure(failures);
            warn!(
                page,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                %cause,
                "page fetch failed, backing off"
            );
            self.set_state(SyncState::RetryWait);
            self.stats.write().retries += 1;
            tokio::time::sleep(delay).await;
            self.set_state(SyncState::Fetching);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::fetch::MockFetcher;
    use ledgersync_protocol::PageEnvelope;
    use serde_json::json;

    fn record(id: impl Into<serde_json::Value>) -> Record {
        let id = id.into();
        Record::from_value(json!({"id": id})).unwrap()
    }

    fn page_of(ids: &[u64], total: Option<u64>) -> PageEnvelope {
        PageEnvelope::page(ids.iter().map(|&id| record(id)).collect(), total)
    }

    fn engine_with(
        page_size: u32,
        fetcher: Arc<MockFetcher>,
        observer: Arc<MemoryObserver>,
    ) -> SyncEngine<Arc<MockFetcher>, Arc<MemoryObserver>> {
        let config = SyncConfig::new()
            .with_page_size(page_size)
            .with_retry(RetryConfig::no_retry());
        SyncEngine::new(config, fetcher, observer)
    }

    #[test]
    fn sync_state_checks() {
        assert!(SyncState::Idle.can_start_sync());
        assert!(SyncState::Synced.can_start_sync());
        assert!(SyncState::Error.can_start_sync());
        assert!(!SyncState::Fetching.can_start_sync());

        assert!(SyncState::Fetching.is_active());
        assert!(SyncState::RetryWait.is_active());
        assert!(!SyncState::Synced.is_active());
    }

    #[test]
    fn engine_initial_state() {
        let engine = engine_with(3, Arc::new(MockFetcher::new()), Arc::new(MemoryObserver::new()));
        assert_eq!(engine.state(), SyncState::Idle);
        assert!(!engine.is_running());
        assert!(engine.snapshot().is_empty());
        assert_eq!(engine.stats().pages_fetched, 0);
    }

    #[tokio::test]
    async fn stops_on_empty_page() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.push_response(Ok(page_of(&[1, 2, 3], None)));
        fetcher.push_response(Ok(page_of(&[4, 5, 6], None)));
        fetcher.push_response(Ok(page_of(&[7, 8, 9], None)));
        fetcher.push_response(Ok(page_of(&[], None)));

        let observer = Arc::new(MemoryObserver::new());
        let engine = engine_with(3, Arc::clone(&fetcher), Arc::clone(&observer));

        let outcome = engine.start_sync().await.unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Completed(SyncReport {
                record_count: 9,
                stop: StopReason::EmptyPage,
            })
        );
        assert_eq!(engine.state(), SyncState::Synced);
        assert_eq!(fetcher.call_count(), 4);
    }

    #[tokio::test]
    async fn stops_on_short_page() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.push_response(Ok(page_of(&[1, 2, 3], None)));
        fetcher.push_response(Ok(page_of(&[4, 5, 6], None)));
        fetcher.push_response(Ok(page_of(&[7], None)));

        let observer = Arc::new(MemoryObserver::new());
        let engine = engine_with(3, Arc::clone(&fetcher), Arc::clone(&observer));

        let outcome = engine.start_sync().await.unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Completed(SyncReport {
                record_count: 7,
                stop: StopReason::ShortPage,
            })
        );
        assert_eq!(fetcher.call_count(), 3);
    }

    #[tokio::test]
    async fn callbacks_fire_in_page_order_without_gaps() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.push_response(Ok(page_of(&[1, 2], None)));
        fetcher.push_response(Ok(page_of(&[3, 4], None)));
        fetcher.push_response(Ok(page_of(&[], None)));

        let observer = Arc::new(MemoryObserver::new());
        let engine = engine_with(2, Arc::clone(&fetcher), Arc::clone(&observer));
        engine.start_sync().await.unwrap();

        let pages: Vec<_> = observer
            .progress_events()
            .iter()
            .map(|p| p.page_just_fetched)
            .collect();
        assert_eq!(pages, [1, 2, 3]);

        let counts: Vec<_> = observer.snapshots().iter().map(Vec::len).collect();
        assert_eq!(counts, [2, 4, 4]);
    }

    #[tokio::test]
    async fn duplicate_ids_resolve_to_higher_page() {
        let fetcher = Arc::new(MockFetcher::new());
        let first = PageEnvelope::page(
            vec![
                Record::from_value(json!({"id": 1, "page": 1})).unwrap(),
                Record::from_value(json!({"id": 2, "page": 1})).unwrap(),
            ],
            None,
        );
        let second = PageEnvelope::page(
            vec![Record::from_value(json!({"id": 2, "page": 2})).unwrap()],
            None,
        );
        fetcher.push_response(Ok(first));
        fetcher.push_response(Ok(second));

        let observer = Arc::new(MemoryObserver::new());
        let engine = engine_with(2, Arc::clone(&fetcher), Arc::clone(&observer));
        let outcome = engine.start_sync().await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Completed(SyncReport {
                record_count: 2,
                stop: StopReason::ShortPage,
            })
        );
        let snapshot = engine.snapshot();
        assert_eq!(snapshot[1].get("page"), Some(&json!(2)));
        // First-seen order is preserved across the overwrite.
        assert_eq!(snapshot[1].id(), Some("2".into()));
    }

    #[tokio::test]
    async fn records_without_id_are_excluded() {
        let fetcher = Arc::new(MockFetcher::new());
        let page = PageEnvelope::page(
            vec![
                record(1),
                Record::from_value(json!({"name": "stray"})).unwrap(),
                record(2),
            ],
            None,
        );
        fetcher.push_response(Ok(page));

        let observer = Arc::new(MemoryObserver::new());
        let engine = engine_with(5, Arc::clone(&fetcher), Arc::clone(&observer));
        let outcome = engine.start_sync().await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Completed(SyncReport {
                record_count: 2,
                stop: StopReason::ShortPage,
            })
        );
        assert_eq!(engine.stats().records_dropped, 1);
        assert_eq!(observer.progress_events()[0].fetched_count, 2);
    }

    #[tokio::test]
    async fn total_reconciliation_prefers_last_non_zero() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.push_response(Ok(page_of(&[1, 2], Some(30))));
        fetcher.push_response(Ok(page_of(&[3, 4], None)));
        fetcher.push_response(Ok(page_of(&[5, 6], Some(0))));
        fetcher.push_response(Ok(page_of(&[7], Some(25))));

        let observer = Arc::new(MemoryObserver::new());
        let engine = engine_with(2, Arc::clone(&fetcher), Arc::clone(&observer));
        engine.start_sync().await.unwrap();

        let totals: Vec<_> = observer
            .progress_events()
            .iter()
            .map(|p| p.total_expected)
            .collect();
        assert_eq!(totals, [Some(30), Some(30), Some(30), Some(25)]);
    }

    #[tokio::test]
    async fn zero_total_is_recorded_when_nothing_known_yet() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.push_response(Ok(page_of(&[1], Some(0))));

        let observer = Arc::new(MemoryObserver::new());
        let engine = engine_with(2, Arc::clone(&fetcher), Arc::clone(&observer));
        engine.start_sync().await.unwrap();

        assert_eq!(observer.progress_events()[0].total_expected, Some(0));
    }

    #[tokio::test]
    async fn ok_without_payload_counts_as_page_failure() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.push_response(Ok(PageEnvelope {
            ok: true,
            data: None,
            error: None,
        }));

        let engine = engine_with(2, Arc::clone(&fetcher), Arc::new(MemoryObserver::new()));
        let error = engine.start_sync().await.unwrap_err();
        assert!(matches!(
            error,
            SyncError::PageFailed { page: 1, attempts: 1, .. }
        ));
        assert_eq!(engine.state(), SyncState::Error);
        assert!(engine.last_error().unwrap().contains("page 1"));
    }

    #[tokio::test]
    async fn restart_after_failure_merges_over_existing_records() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.push_response(Ok(page_of(&[1, 2], None)));
        fetcher.push_response(Err(SyncError::Transport("connection reset".into())));
        // Second run: page 1 again, now short.
        fetcher.push_response(Ok(page_of(&[1], None)));

        let observer = Arc::new(MemoryObserver::new());
        let engine = engine_with(2, Arc::clone(&fetcher), Arc::clone(&observer));

        assert!(engine.start_sync().await.is_err());
        assert_eq!(engine.snapshot().len(), 2);

        let outcome = engine.start_sync().await.unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Completed(SyncReport {
                record_count: 2,
                stop: StopReason::ShortPage,
            })
        );
        assert!(engine.last_error().is_none());
    }

    #[tokio::test]
    async fn reset_clears_accumulated_state() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.push_response(Ok(page_of(&[1], Some(10))));

        let engine = engine_with(2, Arc::clone(&fetcher), Arc::new(MemoryObserver::new()));
        engine.start_sync().await.unwrap();
        assert_eq!(engine.snapshot().len(), 1);

        engine.reset().unwrap();
        assert!(engine.snapshot().is_empty());
        assert_eq!(engine.state(), SyncState::Idle);
        assert!(engine.last_error().is_none());
    }
}
