// src/pipeline/refresh.rs

//! Refresh orchestration.
//!
//! A refresh runs as one detached task through five phases:
//!
//! 1. Search: crawl code search for matching files
//! 2. Details: fetch metadata per repository and upsert records
//! 3. Backfill: look up adoption dates that are still missing
//! 4. Notify: announce this week's adoptions to subscribers
//! 5. Snapshot: append aggregate stats
//!
//! The job is marked `completed` after phase 2. Every phase shares one
//! deadline; when it passes, the current call is abandoned and later phases
//! are skipped. At most one run is active at a time.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};

use crate::error::{AppError, Result};
use crate::github::CodeHost;
use crate::models::{Config, RefreshJob, start_of_week};
use crate::notify::{DispatchSummary, Notifier};
use crate::pipeline::adoption::{BackfillOutcome, backfill_adoptions};
use crate::pipeline::details::{DetailOutcome, merge_discovered};
use crate::pipeline::guard::{FlightPermit, SingleFlight};
use crate::pipeline::search;
use crate::storage::Store;
use crate::utils::log as progress;

const TOTAL_STEPS: usize = 5;

/// Caller-supplied accessor for the next scheduled run.
pub type NextRunFn = Arc<dyn Fn() -> Option<DateTime<Utc>> + Send + Sync>;

/// What caused a refresh; only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Manual,
    Scheduled,
    Startup,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerSource::Manual => "manual",
            TriggerSource::Scheduled => "scheduled",
            TriggerSource::Startup => "startup",
        })
    }
}

/// Result of asking for a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { job_id: i64 },
    AlreadyRunning,
}

/// Snapshot of orchestrator state for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    pub is_running: bool,
    pub last_job: Option<RefreshJob>,
    pub next_refresh: Option<DateTime<Utc>>,
}

/// Counts from one run, for logging.
#[derive(Debug, Default, Clone)]
pub struct RunReport {
    pub job_id: i64,
    pub discovered: usize,
    pub details: DetailOutcome,
    pub backfill: BackfillOutcome,
    pub new_this_week: usize,
    pub dispatch: DispatchSummary,
    /// Set when the job ended `failed`
    pub failure: Option<String>,
    /// Set when the deadline cut a post-completion phase short
    pub abandoned_at: Option<&'static str>,
}

/// Runs refreshes one at a time in the background.
pub struct RefreshOrchestrator {
    store: Arc<dyn Store>,
    host: Arc<dyn CodeHost>,
    notifier: Arc<Notifier>,
    config: Arc<Config>,
    guard: SingleFlight,
    next_refresh: Mutex<Option<NextRunFn>>,
    task: Mutex<Option<JoinHandle<RunReport>>>,
}

impl RefreshOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        host: Arc<dyn CodeHost>,
        notifier: Arc<Notifier>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            host,
            notifier,
            config,
            guard: SingleFlight::new(),
            next_refresh: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Install the accessor reported as `next_refresh` in status queries.
    pub fn set_next_refresh_fn(&self, next: NextRunFn) {
        if let Ok(mut slot) = self.next_refresh.lock() {
            *slot = Some(next);
        }
    }

    /// Start a refresh in the background unless one is already running.
    ///
    /// Returns as soon as the job row exists; failures inside the run are
    /// only visible through the job row and the logs.
    pub async fn start_refresh(self: &Arc<Self>, source: TriggerSource) -> Result<StartOutcome> {
        let Some(permit) = self.guard.try_acquire() else {
            log::info!("Skipping {source} refresh: already running");
            return Ok(StartOutcome::AlreadyRunning);
        };

        // The permit is dropped (and the guard released) if this fails
        let job = self.store.create_job().await?;
        let job_id = job.id;

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run(job_id, source, permit).await });
        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }

        Ok(StartOutcome::Started { job_id })
    }

    /// Wait for the most recently started run, if any.
    pub async fn wait_for_completion(&self) -> Option<RunReport> {
        let handle = self.task.lock().ok()?.take()?;
        match handle.await {
            Ok(report) => Some(report),
            Err(e) => {
                log::error!("Refresh task ended abnormally: {e}");
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    pub async fn refresh_status(&self) -> Result<RefreshStatus> {
        let last_job = self.store.latest_job().await?;
        let next_refresh = self
            .next_refresh
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().and_then(|next| next()));

        Ok(RefreshStatus {
            is_running: self.guard.is_running(),
            last_job,
            next_refresh,
        })
    }

    /// Execute one run; the permit is held until this returns or unwinds.
    async fn run(&self, job_id: i64, source: TriggerSource, _permit: FlightPermit) -> RunReport {
        let started = std::time::Instant::now();
        let deadline = Instant::now() + self.config.refresh.timeout();
        let mut report = RunReport {
            job_id,
            ..RunReport::default()
        };

        log::info!("Starting refresh job {job_id} (source: {source})");
        if let Err(e) = self.store.start_job(job_id).await {
            log::error!("Could not start refresh job {job_id}: {e}");
            report.failure = Some(e.to_string());
            return report;
        }

        // Phase 1: search
        progress::step(1, TOTAL_STEPS, "Search - crawling code search results");
        let crawl = search::crawl(self.host.as_ref(), &self.config.search);
        let discovered = match timeout_at(deadline, crawl).await {
            Ok(Ok(discovered)) => discovered,
            Ok(Err(e)) => {
                self.fail(&mut report, format!("searching code: {e}")).await;
                return report;
            }
            Err(_) => {
                let err = AppError::timeout(format!(
                    "search exceeded {}s",
                    self.config.refresh.timeout_secs
                ));
                self.fail(&mut report, err.to_string()).await;
                return report;
            }
        };
        report.discovered = discovered.len();
        log::info!("Found {} unique repositories", discovered.len());

        // Phase 2: details + merge
        progress::step(2, TOTAL_STEPS, "Details - fetching repository metadata");
        let merge = merge_discovered(
            self.host.as_ref(),
            self.store.as_ref(),
            &discovered,
            &self.config.details,
            &self.config.refresh.source_type,
            &mut report.details,
        );
        if timeout_at(deadline, merge).await.is_err() {
            let err = AppError::timeout(format!(
                "fetching repository details ({} of {} records stored)",
                report.details.merged, report.details.total
            ));
            self.fail(&mut report, err.to_string()).await;
            return report;
        }

        progress::sub_item(&format!(
            "{} stored, {} lookups failed, {} writes failed",
            report.details.merged, report.details.fetch_failures, report.details.store_failures
        ));
        if let Err(e) = self.store.complete_job(job_id, report.details.merged).await {
            log::error!("Could not complete refresh job {job_id}: {e}");
        }

        // Phase 3: adoption backfill
        progress::step(3, TOTAL_STEPS, "Backfill - locating adoption commits");
        let backfill = backfill_adoptions(
            self.host.as_ref(),
            self.store.as_ref(),
            &self.config.adoption,
            &mut report.backfill,
        );
        match timeout_at(deadline, backfill).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("Adoption backfill failed: {e}"),
            Err(_) => return self.abandon(report, "backfill"),
        }

        // Phase 4: notifications
        progress::step(4, TOTAL_STEPS, "Notify - announcing new adoptions");
        match timeout_at(deadline, self.notify_this_week()).await {
            Ok(Ok((count, dispatch))) => {
                report.new_this_week = count;
                report.dispatch = dispatch;
            }
            Ok(Err(e)) => log::error!("Sending notifications failed: {e}"),
            Err(_) => return self.abandon(report, "notify"),
        }

        // Phase 5: snapshot
        progress::step(5, TOTAL_STEPS, "Snapshot - recording aggregate stats");
        match timeout_at(deadline, self.record_snapshot()).await {
            Ok(Ok(())) => log::info!("Recorded snapshot after refresh"),
            Ok(Err(e)) => log::error!("Recording snapshot failed: {e}"),
            Err(_) => return self.abandon(report, "snapshot"),
        }

        progress::summary(
            &format!("Refresh job {job_id} completed (source: {source})"),
            &[
                ("Repositories found", report.discovered.to_string()),
                ("Records stored", report.details.merged.to_string()),
                ("Detail failures", report.details.fetch_failures.to_string()),
                ("Adoptions found", report.backfill.updated.to_string()),
                ("New this week", report.new_this_week.to_string()),
                ("Notifications sent", report.dispatch.sent.to_string()),
                ("Elapsed", progress::elapsed(started.elapsed())),
            ],
        );
        report
    }

    async fn notify_this_week(&self) -> Result<(usize, DispatchSummary)> {
        let since = start_of_week(Utc::now());
        let records = self.store.records_adopted_since(since).await?;
        if records.is_empty() {
            log::info!("No new adoptions this week");
            return Ok((0, DispatchSummary::default()));
        }
        let dispatch = self.notifier.notify_new_records(&records).await?;
        Ok((records.len(), dispatch))
    }

    async fn record_snapshot(&self) -> Result<()> {
        let stats = self.store.stats().await?;
        self.store.record_snapshot(stats).await?;
        Ok(())
    }

    async fn fail(&self, report: &mut RunReport, message: String) {
        log::error!("Refresh job {} failed: {message}", report.job_id);
        if let Err(e) = self.store.fail_job(report.job_id, &message).await {
            log::error!("Could not mark refresh job {} failed: {e}", report.job_id);
        }
        report.failure = Some(message);
    }

    fn abandon(&self, mut report: RunReport, phase: &'static str) -> RunReport {
        log::warn!(
            "Refresh job {} hit its deadline during {phase}; remaining phases skipped",
            report.job_id
        );
        report.abandoned_at = Some(phase);
        report
    }
}
