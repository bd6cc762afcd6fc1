// src/models/job.rs

//! Refresh job lifecycle and aggregate statistics.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Record;

/// Refresh job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshJob {
    pub id: i64,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Records upserted (completed jobs only)
    #[serde(default)]
    pub records_found: usize,
    /// Failure detail (failed jobs only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RefreshJob {
    pub fn new(id: i64, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            started_at: None,
            completed_at: None,
            records_found: 0,
            error_message: None,
            created_at: now,
        }
    }

    /// `pending -> running`
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(now);
        Ok(())
    }

    /// `running -> completed`
    pub fn complete(&mut self, records_found: usize, now: DateTime<Utc>) -> Result<()> {
        self.transition(JobStatus::Completed)?;
        self.records_found = records_found;
        self.completed_at = Some(now);
        Ok(())
    }

    /// `pending | running -> failed`
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        self.error_message = Some(message.into());
        self.completed_at = Some(now);
        Ok(())
    }

    fn transition(&mut self, to: JobStatus) -> Result<()> {
        let allowed = matches!(
            (self.status, to),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Pending | JobStatus::Running, JobStatus::Failed)
        );
        if !allowed {
            return Err(AppError::storage(format!(
                "job {} cannot move from {} to {}",
                self.id, self.status, to
            )));
        }
        self.status = to;
        Ok(())
    }
}

/// Aggregate counts over the record store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_records: usize,
    pub total_stars: u64,
    pub popular_count: usize,
    pub notable_count: usize,
}

impl Stats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Record>) -> Self {
        records.into_iter().fold(Self::default(), |mut stats, r| {
            stats.total_records += 1;
            stats.total_stars += r.stars;
            if r.is_popular() {
                stats.popular_count += 1;
            } else if r.is_notable() {
                stats.notable_count += 1;
            }
            stats
        })
    }
}

/// Point-in-time aggregate, appended after each refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub id: i64,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub stats: Stats,
}

/// Adoptions on one day, with running totals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdoptionByDate {
    pub date: NaiveDate,
    pub count: usize,
    pub cumulative_count: usize,
    pub cumulative_stars: u64,
}
