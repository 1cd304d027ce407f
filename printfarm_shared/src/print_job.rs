use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job_store::StoreError;

/// Error taxonomy surfaced by the lifecycle, queue and dispatch components.
/// Nothing here is retried locally; callers translate it into a response.
#[derive(Debug, Error)]
pub enum PrintJobError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("External service error: {0}")]
    ExternalService(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl PrintJobError {
    pub fn job_not_found(job_id: &str) -> Self {
        PrintJobError::NotFound(format!("Print job '{}' not found", job_id))
    }

    /// Rejected manual transition. The message names the allowed source
    /// status set, the requested target and the status the job is in.
    pub fn invalid_transition(allowed: &str, target: JobStatus, current: JobStatus) -> Self {
        PrintJobError::Validation(format!(
            "Can only mark {} jobs as {} (current status: {})",
            allowed, target, current
        ))
    }
}

/// Closed set of job states. PENDING is initial; COMPLETED, FAILED and
/// CANCELLED are terminal. UNKNOWN is uncertain but not terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Queued,
    Printing,
    Paused,
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

impl JobStatus {
    pub const ALL: [JobStatus; 8] = [
        JobStatus::Pending,
        JobStatus::Queued,
        JobStatus::Printing,
        JobStatus::Paused,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
        JobStatus::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Queued => "QUEUED",
            JobStatus::Printing => "PRINTING",
            JobStatus::Paused => "PAUSED",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Unknown => "UNKNOWN",
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => true,
            JobStatus::Pending
            | JobStatus::Queued
            | JobStatus::Printing
            | JobStatus::Paused
            | JobStatus::Unknown => false,
        }
    }

    /// PRINTING or PAUSED: the printer's active job.
    pub fn is_active(&self) -> bool {
        match self {
            JobStatus::Printing | JobStatus::Paused => true,
            JobStatus::Pending
            | JobStatus::Queued
            | JobStatus::Completed
            | JobStatus::Failed
            | JobStatus::Cancelled
            | JobStatus::Unknown => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values computed when a job reaches a terminal status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_print_time_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// File-derived attributes captured at creation. Produced by file analysis
/// and never changed afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print_time_estimate_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filament_used_mm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filament_used_grams: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_height_mm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nozzle_diameter_mm: Option<f64>,
    /// Analyzer-specific attributes without a dedicated field.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A print job row as held by the job store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintJob {
    pub id: String,
    pub printer_id: String,
    pub file_name: String,
    pub file_storage_id: Option<String>,
    pub status: JobStatus,
    /// Non-null iff `status == Queued`; dense and zero-based per printer.
    pub queue_position: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub progress: u8,
    pub status_reason: Option<String>,
    #[serde(default)]
    pub statistics: JobStatistics,
    #[serde(default)]
    pub metadata: JobMetadata,
}

impl PrintJob {
    pub fn is_queued(&self) -> bool {
        self.status == JobStatus::Queued
    }

    /// Whole seconds between `started_at` and `now`, if the job was started.
    pub fn elapsed_print_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        self.started_at
            .map(|started| (now - started).num_seconds().max(0))
    }

    /// Move into a terminal status, stamping `ended_at` and print time.
    pub fn finish(&mut self, status: JobStatus, now: DateTime<Utc>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.queue_position = None;
        self.ended_at = Some(now);
        self.statistics.actual_print_time_seconds = self.elapsed_print_seconds(now);
    }

    /// Checks the per-row invariants that tie queue position and end
    /// timestamp to the status.
    pub fn is_consistent(&self) -> bool {
        let queue_ok = self.queue_position.is_some() == self.is_queued();
        let ended_ok = self.ended_at.is_some() == self.status.is_terminal();
        queue_ok && ended_ok && self.progress <= 100
    }
}

/// Fields supplied when creating a job; the store assigns id and timestamps.
#[derive(Debug, Clone, Default)]
pub struct JobDraft {
    pub printer_id: String,
    pub file_name: String,
    pub file_storage_id: Option<String>,
    pub metadata: JobMetadata,
}

impl JobDraft {
    pub fn new(printer_id: &str, file_name: &str) -> Self {
        Self {
            printer_id: printer_id.to_string(),
            file_name: file_name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_file_storage_id(mut self, storage_id: &str) -> Self {
        self.file_storage_id = Some(storage_id.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: JobMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub(crate) fn into_job(self, id: String, now: DateTime<Utc>) -> PrintJob {
        PrintJob {
            id,
            printer_id: self.printer_id,
            file_name: self.file_name,
            file_storage_id: self.file_storage_id,
            status: JobStatus::Pending,
            queue_position: None,
            created_at: now,
            started_at: None,
            ended_at: None,
            progress: 0,
            status_reason: None,
            statistics: JobStatistics::default(),
            metadata: self.metadata,
        }
    }
}
