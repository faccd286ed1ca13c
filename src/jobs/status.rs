use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::key::JobKey;
use crate::error::JobError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    Queued,
    Running,
    Navigating,
    Capturing,
    Processing,
    Validating,
    Completed,
    Failed,
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus::Queued
    }
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Navigating => "navigating",
            JobStatus::Capturing => "capturing",
            JobStatus::Processing => "processing",
            JobStatus::Validating => "validating",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Position in the forward-only lifecycle. Both terminal states share the
    /// last rank so neither can follow the other.
    fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Navigating => 2,
            JobStatus::Capturing => 3,
            JobStatus::Processing => 4,
            JobStatus::Validating => 5,
            JobStatus::Completed | JobStatus::Failed => 6,
        }
    }

    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        next.rank() > self.rank()
    }
}

/// Registry entry for one job. `P` is the kind-specific progress payload and
/// `R` the result attached on completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord<P, R> {
    pub key: JobKey,
    pub job_id: String,
    pub status: JobStatus,
    pub progress: P,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    pub result: Option<R>,
}

impl<P, R> JobRecord<P, R> {
    pub fn new(key: JobKey, job_id: impl Into<String>, progress: P) -> Self {
        Self {
            key,
            job_id: job_id.into(),
            status: JobStatus::Queued,
            progress,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            error: None,
            result: None,
        }
    }

    /// Move forward to `next`. Backward or sideways moves are refused and
    /// leave the record untouched.
    pub fn advance(&mut self, next: JobStatus) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    pub fn complete(&mut self, result: R) -> bool {
        if !self.advance(JobStatus::Completed) {
            return false;
        }
        self.result = Some(result);
        self.stamp_finish();
        true
    }

    pub fn fail(&mut self, error: &JobError) -> bool {
        if !self.advance(JobStatus::Failed) {
            return false;
        }
        self.error = Some(error.to_string());
        self.stamp_finish();
        true
    }

    pub fn elapsed_ms(&self) -> u64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }

    fn stamp_finish(&mut self) {
        self.finished_at = Some(Utc::now());
        self.duration_ms = Some(self.elapsed_ms());
    }
}
