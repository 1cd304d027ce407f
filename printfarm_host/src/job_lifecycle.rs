// src/job_lifecycle.rs
//! Print job state machine.
//!
//! Device events (`mark_*`, `handle_print_*`) are keyed by printer and
//! file name. Operator overrides (`set_*`) are keyed by job id. Every
//! transition validates the source status, then commits the job row and
//! any queue compaction it implies as one batch under the printer lock.

use std::sync::Arc;

use chrono::Utc;
use printfarm_shared::api_models::PageDto;
use printfarm_shared::{JobDraft, JobMetadata, JobStatus, JobStore, PrintJob, PrintJobError};

use crate::config::MAX_PAGE_SIZE;
use crate::print_queue::{compaction_after_leave, validate_paging};
use crate::printer_locks::PrinterLocks;

pub const REASON_MANUAL_FAILED: &str = "Manually marked as failed by user";
pub const REASON_MANUAL_CANCELLED: &str = "Manually marked as cancelled by user";
pub const REASON_MANUAL_UNKNOWN: &str = "Manually marked as unknown by user (state uncertain)";
pub const REASON_SUPERSEDED: &str = "Superseded by a new print on the same printer";

pub struct JobLifecycleManager {
    store: Arc<dyn JobStore>,
    locks: PrinterLocks,
    max_page_size: usize,
}

impl JobLifecycleManager {
    pub fn new(store: Arc<dyn JobStore>, locks: PrinterLocks) -> Self {
        Self { store, locks, max_page_size: MAX_PAGE_SIZE }
    }

    pub fn with_max_page_size(mut self, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Create a PENDING job that is not queued.
    pub async fn create_pending_job(
        &self,
        printer_id: &str,
        file_name: &str,
        metadata: JobMetadata,
    ) -> Result<PrintJob, PrintJobError> {
        self.create_job(JobDraft::new(printer_id, file_name).with_metadata(metadata)).await
    }

    /// Create a PENDING job from a full draft, including an optional file
    /// storage reference.
    pub async fn create_job(&self, draft: JobDraft) -> Result<PrintJob, PrintJobError> {
        if draft.printer_id.trim().is_empty() {
            return Err(PrintJobError::Validation("printerId is required".to_string()));
        }
        if draft.file_name.trim().is_empty() {
            return Err(PrintJobError::Validation("fileName is required".to_string()));
        }
        let job = self.store.create(draft).await?;
        tracing::info!(job_id = %job.id, printer_id = %job.printer_id, file = %job.file_name, "Created pending print job");
        Ok(job)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<PrintJob, PrintJobError> {
        self.store
            .find(job_id)
            .await?
            .ok_or_else(|| PrintJobError::job_not_found(job_id))
    }

    /// Newest-first listing, optionally for a single printer.
    pub async fn list_jobs(
        &self,
        printer_id: Option<&str>,
        page: usize,
        page_size: usize,
    ) -> Result<PageDto<PrintJob>, PrintJobError> {
        validate_paging(page, page_size, self.max_page_size)?;
        let offset = (page - 1).saturating_mul(page_size);
        let result = self.store.list(printer_id, offset, page_size).await?;
        Ok(PageDto::new(result.items, page, page_size, result.total))
    }

    /// The printer reported a print start for `file_name`. Reuses the
    /// newest non-terminal job for that file or creates one.
    pub async fn mark_started(&self, printer_id: &str, file_name: &str) -> Result<PrintJob, PrintJobError> {
        let _guard = self.locks.lock(printer_id).await;
        let job = match self.open_job_for_file(printer_id, file_name).await? {
            Some(job) => job,
            None => self.store.create(JobDraft::new(printer_id, file_name)).await?,
        };
        self.start_locked(job).await
    }

    /// Start an existing PENDING or QUEUED job by id. Queue removal and
    /// the PRINTING transition are committed together. The row is checked
    /// again under the lock; a job that became active or terminal in the
    /// meantime is left untouched.
    pub async fn start_job(&self, job_id: &str) -> Result<PrintJob, PrintJobError> {
        let printer_id = self.get_job(job_id).await?.printer_id;
        let _guard = self.locks.lock(&printer_id).await;
        let job = self.get_job(job_id).await?;
        match job.status {
            JobStatus::Pending | JobStatus::Queued => self.start_locked(job).await,
            JobStatus::Printing
            | JobStatus::Paused
            | JobStatus::Completed
            | JobStatus::Failed
            | JobStatus::Cancelled
            | JobStatus::Unknown => {
                tracing::warn!(job_id, printer_id = %printer_id, status = %job.status, "Job changed before start could be recorded");
                Err(PrintJobError::Conflict(format!(
                    "Print job '{}' can no longer be started (current status: {})",
                    job_id, job.status
                )))
            }
        }
    }

    /// Caller holds the printer lock.
    async fn start_locked(&self, mut job: PrintJob) -> Result<PrintJob, PrintJobError> {
        let now = Utc::now();
        let mut batch = Vec::new();

        for mut other in self.store.find_by_printer(&job.printer_id).await? {
            if other.id != job.id && other.status.is_active() {
                tracing::warn!(job_id = %other.id, printer_id = %other.printer_id, "Superseding active print job");
                other.status = JobStatus::Unknown;
                other.status_reason = Some(REASON_SUPERSEDED.to_string());
                batch.push(other);
            }
        }
        if job.is_queued() {
            let queue = self.store.find_queued(&job.printer_id).await?;
            batch.extend(compaction_after_leave(queue, &job.id));
        }

        let previous = job.status;
        job.status = JobStatus::Printing;
        job.queue_position = None;
        job.started_at = Some(now);
        job.ended_at = None;
        job.progress = 0;
        job.status_reason = None;
        job.statistics = Default::default();
        batch.push(job.clone());
        self.store.save_all(batch).await?;
        tracing::info!(job_id = %job.id, printer_id = %job.printer_id, from = %previous, "Print job started");
        Ok(job)
    }

    /// Progress report for the printing job of this file, clamped to 0..=100.
    pub async fn mark_progress(&self, printer_id: &str, file_name: &str, percent: i64) -> Result<PrintJob, PrintJobError> {
        let _guard = self.locks.lock(printer_id).await;
        let mut job = self.current_for_file(printer_id, file_name).await?;
        if job.status != JobStatus::Printing {
            return Err(PrintJobError::Validation(format!(
                "Can only update progress of PRINTING jobs (current status: {})",
                job.status
            )));
        }
        job.progress = percent.clamp(0, 100) as u8;
        self.store.save(job.clone()).await?;
        tracing::debug!(job_id = %job.id, progress = job.progress, "Print progress");
        Ok(job)
    }

    pub async fn handle_print_paused(&self, printer_id: &str) -> Result<PrintJob, PrintJobError> {
        self.toggle_pause(printer_id, JobStatus::Printing, JobStatus::Paused).await
    }

    pub async fn handle_print_resumed(&self, printer_id: &str) -> Result<PrintJob, PrintJobError> {
        self.toggle_pause(printer_id, JobStatus::Paused, JobStatus::Printing).await
    }

    async fn toggle_pause(&self, printer_id: &str, from: JobStatus, to: JobStatus) -> Result<PrintJob, PrintJobError> {
        let _guard = self.locks.lock(printer_id).await;
        let mut job = self.active_job(printer_id).await?;
        if job.status != from {
            return Err(PrintJobError::invalid_transition(from.as_str(), to, job.status));
        }
        job.status = to;
        self.store.save(job.clone()).await?;
        tracing::info!(job_id = %job.id, printer_id, from = %from, to = %to, "Print job state changed");
        Ok(job)
    }

    /// The printer finished printing `file_name`.
    pub async fn mark_finished(&self, printer_id: &str, file_name: &str) -> Result<PrintJob, PrintJobError> {
        let _guard = self.locks.lock(printer_id).await;
        let mut job = self.current_for_file(printer_id, file_name).await?;
        if !job.status.is_active() {
            return Err(PrintJobError::invalid_transition("PRINTING or PAUSED", JobStatus::Completed, job.status));
        }
        job.progress = 100;
        job.status_reason = None;
        job.finish(JobStatus::Completed, Utc::now());
        self.store.save(job.clone()).await?;
        tracing::info!(job_id = %job.id, printer_id, seconds = ?job.statistics.actual_print_time_seconds, "Print job completed");
        Ok(job)
    }

    /// The printer reported a failure while printing `file_name`.
    pub async fn mark_failed(&self, printer_id: &str, file_name: &str, reason: &str) -> Result<PrintJob, PrintJobError> {
        let _guard = self.locks.lock(printer_id).await;
        let mut job = self.current_for_file(printer_id, file_name).await?;
        if !job.status.is_active() {
            return Err(PrintJobError::invalid_transition("PRINTING or PAUSED", JobStatus::Failed, job.status));
        }
        job.status_reason = Some(reason.to_string());
        job.statistics.failure_reason = Some(reason.to_string());
        job.finish(JobStatus::Failed, Utc::now());
        self.store.save(job.clone()).await?;
        tracing::warn!(job_id = %job.id, printer_id, reason, "Print job failed");
        Ok(job)
    }

    /// Operator override: an UNKNOWN job did in fact complete.
    pub async fn set_completed(&self, job_id: &str) -> Result<PrintJob, PrintJobError> {
        self.manual_transition(job_id, ManualMark::Completed).await
    }

    /// Operator override: fail any non-terminal job.
    pub async fn set_failed(&self, job_id: &str) -> Result<PrintJob, PrintJobError> {
        self.manual_transition(job_id, ManualMark::Failed).await
    }

    /// Operator override: cancel an UNKNOWN, PRINTING or PAUSED job.
    pub async fn set_cancelled(&self, job_id: &str) -> Result<PrintJob, PrintJobError> {
        self.manual_transition(job_id, ManualMark::Cancelled).await
    }

    /// Operator override: the outcome of a PRINTING or PAUSED job is not known.
    pub async fn set_unknown(&self, job_id: &str) -> Result<PrintJob, PrintJobError> {
        self.manual_transition(job_id, ManualMark::Unknown).await
    }

    async fn manual_transition(&self, job_id: &str, mark: ManualMark) -> Result<PrintJob, PrintJobError> {
        let printer_id = self.get_job(job_id).await?.printer_id;
        let _guard = self.locks.lock(&printer_id).await;
        let mut job = self.get_job(job_id).await?;
        let from = job.status;
        if !mark.permits(from) {
            return Err(PrintJobError::invalid_transition(mark.allowed(), mark.target(), from));
        }

        let mut batch = Vec::new();
        if job.is_queued() {
            let queue = self.store.find_queued(&printer_id).await?;
            batch = compaction_after_leave(queue, &job.id);
        }
        mark.apply(&mut job);
        batch.push(job.clone());
        self.store.save_all(batch).await?;
        tracing::info!(job_id, printer_id = %printer_id, from = %from, to = %job.status, "Print job manually updated");
        Ok(job)
    }

    /// Delete a job that is not active. A queued job first leaves the
    /// queue (with compaction) in one batch, then the row is removed.
    pub async fn delete_job(&self, job_id: &str) -> Result<PrintJob, PrintJobError> {
        let printer_id = self.get_job(job_id).await?.printer_id;
        let _guard = self.locks.lock(&printer_id).await;
        let mut job = self.get_job(job_id).await?;
        if job.status.is_active() {
            return Err(PrintJobError::Conflict("Cannot delete active print job".to_string()));
        }
        let deleted = job.clone();
        if job.is_queued() {
            let queue = self.store.find_queued(&printer_id).await?;
            let mut batch = compaction_after_leave(queue, &job.id);
            job.status = JobStatus::Pending;
            job.queue_position = None;
            batch.push(job);
            self.store.save_all(batch).await?;
        }
        self.store
            .delete(job_id)
            .await?
            .ok_or_else(|| PrintJobError::job_not_found(job_id))?;
        tracing::info!(job_id, printer_id = %printer_id, "Deleted print job");
        Ok(deleted)
    }

    /// The job a device event for `file_name` refers to: the active one if
    /// there is one, else the newest non-terminal one.
    async fn open_job_for_file(&self, printer_id: &str, file_name: &str) -> Result<Option<PrintJob>, PrintJobError> {
        let mut open: Vec<PrintJob> = self
            .store
            .find_by_printer_and_file(printer_id, file_name)
            .await?
            .into_iter()
            .filter(|j| !j.status.is_terminal())
            .collect();
        let active = open.iter().rposition(|j| j.status.is_active());
        Ok(match active {
            Some(index) => Some(open.swap_remove(index)),
            None => open.pop(),
        })
    }

    async fn current_for_file(&self, printer_id: &str, file_name: &str) -> Result<PrintJob, PrintJobError> {
        self.open_job_for_file(printer_id, file_name).await?.ok_or_else(|| {
            PrintJobError::NotFound(format!(
                "No open print job for '{}' on printer '{}'",
                file_name, printer_id
            ))
        })
    }

    async fn active_job(&self, printer_id: &str) -> Result<PrintJob, PrintJobError> {
        self.store
            .find_by_printer(printer_id)
            .await?
            .into_iter()
            .find(|j| j.status.is_active())
            .ok_or_else(|| PrintJobError::NotFound(format!("Printer '{}' has no active print job", printer_id)))
    }
}

/// Operator overrides and the source statuses each accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManualMark {
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

impl ManualMark {
    fn target(self) -> JobStatus {
        match self {
            ManualMark::Completed => JobStatus::Completed,
            ManualMark::Failed => JobStatus::Failed,
            ManualMark::Cancelled => JobStatus::Cancelled,
            ManualMark::Unknown => JobStatus::Unknown,
        }
    }

    fn allowed(self) -> &'static str {
        match self {
            ManualMark::Completed => "UNKNOWN",
            ManualMark::Failed => "non-terminal",
            ManualMark::Cancelled => "UNKNOWN, PRINTING or PAUSED",
            ManualMark::Unknown => "PRINTING or PAUSED",
        }
    }

    fn permits(self, from: JobStatus) -> bool {
        match self {
            ManualMark::Completed => from == JobStatus::Unknown,
            ManualMark::Failed => !from.is_terminal(),
            ManualMark::Cancelled => from == JobStatus::Unknown || from.is_active(),
            ManualMark::Unknown => from.is_active(),
        }
    }

    fn apply(self, job: &mut PrintJob) {
        let now = Utc::now();
        match self {
            ManualMark::Completed => {
                job.progress = 100;
                job.finish(JobStatus::Completed, now);
            }
            ManualMark::Failed => {
                job.status_reason = Some(REASON_MANUAL_FAILED.to_string());
                job.statistics.failure_reason = Some(REASON_MANUAL_FAILED.to_string());
                job.finish(JobStatus::Failed, now);
            }
            ManualMark::Cancelled => {
                job.status_reason = Some(REASON_MANUAL_CANCELLED.to_string());
                job.finish(JobStatus::Cancelled, now);
            }
            // endedAt stays unset: the outcome is not final.
            ManualMark::Unknown => {
                job.status = JobStatus::Unknown;
                job.queue_position = None;
                job.status_reason = Some(REASON_MANUAL_UNKNOWN.to_string());
            }
        }
    }
}
