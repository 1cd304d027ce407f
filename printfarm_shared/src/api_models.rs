//! Shared data models for API responses (host/web/clients).
//! Field names are camelCase and stay stable across the job lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::print_job::{JobMetadata, JobStatistics, JobStatus, PrintJob};

/// A print job as returned to polling clients.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrintJobDto {
    pub id: String,
    pub printer_id: String,
    pub file_name: String,
    pub file_storage_id: Option<String>,
    pub status: JobStatus,
    pub queue_position: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub progress: u8,
    pub status_reason: Option<String>,
    pub statistics: JobStatistics,
    pub metadata: JobMetadata,
}

impl From<PrintJob> for PrintJobDto {
    fn from(job: PrintJob) -> Self {
        Self {
            id: job.id,
            printer_id: job.printer_id,
            file_name: job.file_name,
            file_storage_id: job.file_storage_id,
            status: job.status,
            queue_position: job.queue_position,
            created_at: job.created_at,
            started_at: job.started_at,
            ended_at: job.ended_at,
            progress: job.progress,
            status_reason: job.status_reason,
            statistics: job.statistics,
            metadata: job.metadata,
        }
    }
}

/// One row of a queue listing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntryDto {
    pub job_id: String,
    pub printer_id: String,
    pub file_name: String,
    pub queue_position: u32,
    pub created_at: DateTime<Utc>,
    pub metadata: JobMetadata,
}

impl QueueEntryDto {
    /// `None` for rows that are not queued.
    pub fn from_job(job: PrintJob) -> Option<Self> {
        let queue_position = job.queue_position?;
        Some(Self {
            job_id: job.id,
            printer_id: job.printer_id,
            file_name: job.file_name,
            queue_position,
            created_at: job.created_at,
            metadata: job.metadata,
        })
    }
}

/// A page of results with paging metadata.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PageDto<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total_count: usize,
    pub total_pages: usize,
}

impl<T> PageDto<T> {
    pub fn new(items: Vec<T>, page: usize, page_size: usize, total_count: usize) -> Self {
        Self {
            items,
            page,
            page_size,
            total_count,
            total_pages: total_count.div_ceil(page_size.max(1)),
        }
    }
}

/// Outcome of previewing a printer's queue head.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProcessQueueDto {
    pub printer_id: String,
    pub queue_empty: bool,
    pub next_job: Option<PrintJobDto>,
}
