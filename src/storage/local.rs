//! Local filesystem storage implementation.
//!
//! Each collection lives in its own JSON document that is loaded once at
//! [`LocalStore::open`] and rewritten atomically after every mutation.
//! Mutations are serialized through a single async mutex, so uniqueness of
//! `repo_full_name` and id allocation hold without further locking.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── records.json
//! ├── jobs.json
//! ├── snapshots.json
//! └── notifications.json
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{
    AdoptionByDate, JobStatus, NewNotificationConfig, NewNotificationLog, NotificationConfig,
    NotificationLog, Record, RecordFilter, RecordUpsert, RefreshJob, Snapshot, Stats,
};
use crate::storage::Store;

const RECORDS: &str = "records.json";
const JOBS: &str = "jobs.json";
const SNAPSHOTS: &str = "snapshots.json";
const NOTIFICATIONS: &str = "notifications.json";

/// Rows plus a monotonically increasing id counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Collection<T> {
    next_id: i64,
    rows: Vec<T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            rows: Vec::new(),
        }
    }
}

impl<T> Collection<T> {
    fn allocate(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NotificationData {
    configs: Collection<NotificationConfig>,
    logs: Collection<NotificationLog>,
}

#[derive(Debug, Default)]
struct State {
    records: Collection<Record>,
    jobs: Collection<RefreshJob>,
    snapshots: Collection<Snapshot>,
    notifications: NotificationData,
}

impl State {
    fn records_mut(&mut self) -> &mut Collection<Record> {
        &mut self.records
    }

    fn jobs_mut(&mut self) -> &mut Collection<RefreshJob> {
        &mut self.jobs
    }

    fn snapshots_mut(&mut self) -> &mut Collection<Snapshot> {
        &mut self.snapshots
    }

    fn notifications_mut(&mut self) -> &mut NotificationData {
        &mut self.notifications
    }
}

/// Local filesystem storage backend.
pub struct LocalStore {
    root_dir: PathBuf,
    state: Mutex<State>,
}

impl LocalStore {
    /// Open (or initialize) a store rooted at the given directory.
    pub async fn open(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root_dir = root_dir.into();
        tokio::fs::create_dir_all(&root_dir).await.map_err(|e| {
            AppError::storage(format!("cannot create {}: {e}", root_dir.display()))
        })?;

        let state = State {
            records: read_json(&root_dir, RECORDS).await?.unwrap_or_default(),
            jobs: read_json(&root_dir, JOBS).await?.unwrap_or_default(),
            snapshots: read_json(&root_dir, SNAPSHOTS).await?.unwrap_or_default(),
            notifications: read_json(&root_dir, NOTIFICATIONS)
                .await?
                .unwrap_or_default(),
        };

        log::debug!(
            "Opened store at {} ({} records, {} jobs)",
            root_dir.display(),
            state.records.rows.len(),
            state.jobs.rows.len()
        );

        Ok(Self {
            root_dir,
            state: Mutex::new(state),
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Apply `change` to a copy of one collection, write the copy, and only
    /// then make it visible. A failed change or write leaves memory and disk
    /// as they were.
    async fn commit<C, R>(
        &self,
        key: &str,
        select: impl Fn(&mut State) -> &mut C + Send,
        change: impl FnOnce(&mut C) -> Result<R> + Send,
    ) -> Result<R>
    where
        C: Clone + Serialize + Send + Sync,
    {
        let mut state = self.state.lock().await;
        let mut draft = select(&mut *state).clone();
        let output = change(&mut draft)?;
        write_json(&self.root_dir, key, &draft).await?;
        *select(&mut *state) = draft;
        Ok(output)
    }

    /// Apply a job transition and persist.
    async fn update_job(
        &self,
        id: i64,
        apply: impl FnOnce(&mut RefreshJob) -> Result<()> + Send,
    ) -> Result<()> {
        self.commit(JOBS, State::jobs_mut, move |jobs| {
            let job = jobs
                .rows
                .iter_mut()
                .find(|j| j.id == id)
                .ok_or_else(|| AppError::not_found(format!("refresh job {id}")))?;
            apply(job)
        })
        .await
    }
}

/// Write bytes atomically (write to temp, then rename).
async fn write_bytes(root: &Path, key: &str, bytes: &[u8]) -> Result<()> {
    let path = root.join(key);
    let tmp = path.with_extension("tmp");

    let write = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await
    };

    write
        .await
        .map_err(|e| AppError::storage(format!("write {}: {e}", path.display())))
}

async fn write_json<T: Serialize + ?Sized>(root: &Path, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_bytes(root, key, &bytes).await
}

/// Read JSON data, returning None if the file doesn't exist.
async fn read_json<T: DeserializeOwned>(root: &Path, key: &str) -> Result<Option<T>> {
    let path = root.join(key);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(AppError::storage(format!("read {}: {e}", path.display())));
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| AppError::storage(format!("corrupt {}: {e}", path.display())))
}

fn newest_first<T, K: Ord>(rows: &[T], key: impl Fn(&T) -> K, limit: usize) -> Vec<T>
where
    T: Clone,
{
    let mut rows = rows.to_vec();
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
    if limit > 0 {
        rows.truncate(limit);
    }
    rows
}

#[async_trait]
impl Store for LocalStore {
    async fn upsert_record(&self, scan: RecordUpsert) -> Result<Record> {
        let now = Utc::now();
        self.commit(RECORDS, State::records_mut, move |records| {
            let existing = records
                .rows
                .iter_mut()
                .find(|r| r.repo_full_name == scan.repo_full_name);
            let record = match existing {
                Some(existing) => {
                    existing.merge(scan, now);
                    existing.clone()
                }
                None => {
                    let id = records.allocate();
                    let record = Record::create(id, scan, now);
                    records.rows.push(record.clone());
                    record
                }
            };
            Ok(record)
        })
        .await
    }

    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<Record>> {
        let state = self.state.lock().await;
        Ok(filter.apply(&state.records.rows))
    }

    async fn source_types(&self) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        let types: BTreeSet<String> = state
            .records
            .rows
            .iter()
            .filter(|r| !r.source_type.is_empty())
            .map(|r| r.source_type.clone())
            .collect();
        Ok(types.into_iter().collect())
    }

    async fn stats(&self) -> Result<Stats> {
        let state = self.state.lock().await;
        Ok(Stats::from_records(&state.records.rows))
    }

    async fn records_without_adoption(&self) -> Result<Vec<Record>> {
        let state = self.state.lock().await;
        let mut pending: Vec<Record> = state
            .records
            .rows
            .iter()
            .filter(|r| r.adopted_at.is_none())
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.stars.cmp(&a.stars).then_with(|| a.id.cmp(&b.id)));
        Ok(pending)
    }

    async fn set_adoption(
        &self,
        record_id: i64,
        at: DateTime<Utc>,
        commit_url: &str,
    ) -> Result<()> {
        let commit_url = commit_url.to_string();
        self.commit(RECORDS, State::records_mut, move |records| {
            let record = records
                .rows
                .iter_mut()
                .find(|r| r.id == record_id)
                .ok_or_else(|| AppError::not_found(format!("record {record_id}")))?;
            record.adopted_at = Some(at);
            record.adoption_commit = Some(commit_url);
            record.updated_at = Utc::now();
            Ok(())
        })
        .await
    }

    async fn records_adopted_since(&self, since: DateTime<Utc>) -> Result<Vec<Record>> {
        let state = self.state.lock().await;
        let mut adopted: Vec<Record> = state
            .records
            .rows
            .iter()
            .filter(|r| r.adopted_at.is_some_and(|at| at >= since))
            .cloned()
            .collect();
        adopted.sort_by(|a, b| b.adopted_at.cmp(&a.adopted_at).then_with(|| a.id.cmp(&b.id)));
        Ok(adopted)
    }

    async fn count_adopted_since(&self, since: DateTime<Utc>) -> Result<usize> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .rows
            .iter()
            .filter(|r| r.adopted_at.is_some_and(|at| at >= since))
            .count())
    }

    async fn adoption_history(&self, since: NaiveDate) -> Result<Vec<AdoptionByDate>> {
        let state = self.state.lock().await;

        // (count, stars) per adoption day over the whole store
        let mut by_day: BTreeMap<NaiveDate, (usize, u64)> = BTreeMap::new();
        for record in &state.records.rows {
            if let Some(at) = record.adopted_at {
                let day = by_day.entry(at.date_naive()).or_default();
                day.0 += 1;
                day.1 += record.stars;
            }
        }

        // Running totals include adoptions before the window
        let mut cumulative_count = 0;
        let mut cumulative_stars = 0;
        let mut history = Vec::new();
        for (date, (count, stars)) in by_day {
            cumulative_count += count;
            cumulative_stars += stars;
            if date >= since {
                history.push(AdoptionByDate {
                    date,
                    count,
                    cumulative_count,
                    cumulative_stars,
                });
            }
        }
        Ok(history)
    }

    async fn create_job(&self) -> Result<RefreshJob> {
        self.commit(JOBS, State::jobs_mut, |jobs| {
            let job = RefreshJob::new(jobs.allocate(), Utc::now());
            jobs.rows.push(job.clone());
            Ok(job)
        })
        .await
    }

    async fn start_job(&self, id: i64) -> Result<()> {
        self.update_job(id, |job| job.start(Utc::now())).await
    }

    async fn complete_job(&self, id: i64, records_found: usize) -> Result<()> {
        self.update_job(id, |job| job.complete(records_found, Utc::now()))
            .await
    }

    async fn fail_job(&self, id: i64, message: &str) -> Result<()> {
        let message = message.to_string();
        self.update_job(id, move |job| job.fail(message, Utc::now()))
            .await
    }

    async fn latest_job(&self) -> Result<Option<RefreshJob>> {
        let state = self.state.lock().await;
        Ok(state.jobs.rows.iter().max_by_key(|j| j.id).cloned())
    }

    async fn last_completed_job(&self) -> Result<Option<RefreshJob>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .rows
            .iter()
            .filter(|j| j.status == JobStatus::Completed)
            .max_by_key(|j| (j.completed_at, j.id))
            .cloned())
    }

    async fn record_snapshot(&self, stats: Stats) -> Result<Snapshot> {
        self.commit(SNAPSHOTS, State::snapshots_mut, move |snapshots| {
            let snapshot = Snapshot {
                id: snapshots.allocate(),
                recorded_at: Utc::now(),
                stats,
            };
            snapshots.rows.push(snapshot.clone());
            Ok(snapshot)
        })
        .await
    }

    async fn snapshots(&self, limit: usize) -> Result<Vec<Snapshot>> {
        let state = self.state.lock().await;
        Ok(newest_first(
            &state.snapshots.rows,
            |s| (s.recorded_at, s.id),
            limit,
        ))
    }

    async fn create_config(&self, config: NewNotificationConfig) -> Result<NotificationConfig> {
        let now = Utc::now();
        self.commit(NOTIFICATIONS, State::notifications_mut, move |data| {
            let created = NotificationConfig {
                id: data.configs.allocate(),
                name: config.name,
                channel: config.channel,
                enabled: config.enabled,
                settings: config.settings,
                last_triggered_at: None,
                created_at: now,
                updated_at: now,
            };
            data.configs.rows.push(created.clone());
            Ok(created)
        })
        .await
    }

    async fn update_config(
        &self,
        id: i64,
        config: NewNotificationConfig,
    ) -> Result<NotificationConfig> {
        self.commit(NOTIFICATIONS, State::notifications_mut, move |data| {
            let existing = data
                .configs
                .rows
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| AppError::not_found(format!("notification config {id}")))?;

            existing.name = config.name;
            existing.channel = config.channel;
            existing.enabled = config.enabled;
            existing.settings = config.settings;
            existing.updated_at = Utc::now();
            Ok(existing.clone())
        })
        .await
    }

    async fn delete_config(&self, id: i64) -> Result<()> {
        self.commit(NOTIFICATIONS, State::notifications_mut, move |data| {
            let before = data.configs.rows.len();
            data.configs.rows.retain(|c| c.id != id);
            if data.configs.rows.len() == before {
                return Err(AppError::not_found(format!("notification config {id}")));
            }
            data.logs.rows.retain(|l| l.config_id != id);
            Ok(())
        })
        .await
    }

    async fn get_config(&self, id: i64) -> Result<Option<NotificationConfig>> {
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .configs
            .rows
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn list_configs(&self) -> Result<Vec<NotificationConfig>> {
        let state = self.state.lock().await;
        Ok(state.notifications.configs.rows.clone())
    }

    async fn enabled_configs(&self) -> Result<Vec<NotificationConfig>> {
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .configs
            .rows
            .iter()
            .filter(|c| c.enabled)
            .cloned()
            .collect())
    }

    async fn touch_config_triggered(&self, id: i64) -> Result<()> {
        self.commit(NOTIFICATIONS, State::notifications_mut, move |data| {
            let config = data
                .configs
                .rows
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| AppError::not_found(format!("notification config {id}")))?;
            config.last_triggered_at = Some(Utc::now());
            Ok(())
        })
        .await
    }

    async fn append_log(&self, entry: NewNotificationLog) -> Result<NotificationLog> {
        self.commit(NOTIFICATIONS, State::notifications_mut, move |data| {
            let log = NotificationLog {
                id: data.logs.allocate(),
                config_id: entry.config_id,
                record_id: entry.record_id,
                status: entry.status,
                error_message: entry.error_message,
                sent_at: Utc::now(),
            };
            data.logs.rows.push(log.clone());
            Ok(log)
        })
        .await
    }

    async fn logs_for_config(&self, config_id: i64, limit: usize) -> Result<Vec<NotificationLog>> {
        let state = self.state.lock().await;
        let logs: Vec<NotificationLog> = state
            .notifications
            .logs
            .rows
            .iter()
            .filter(|l| l.config_id == config_id)
            .cloned()
            .collect();
        Ok(newest_first(&logs, |l| (l.sent_at, l.id), limit))
    }
}
