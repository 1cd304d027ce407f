// src/print_queue.rs
//! Per-printer FIFO ordering of QUEUED jobs.
//!
//! Positions are dense and zero-based for every printer. Each mutating
//! operation holds the printer's lock, reads the current queue, computes
//! the complete new numbering, and commits every changed row in one
//! `save_all` batch.

use std::collections::HashSet;
use std::sync::Arc;

use printfarm_shared::api_models::{PageDto, QueueEntryDto};
use printfarm_shared::{JobStatus, JobStore, PrintJob, PrintJobError};

use crate::config::MAX_PAGE_SIZE;
use crate::printer_locks::PrinterLocks;

/// Assign positions `0..n` in the given order. Returns only the rows
/// whose position or status changed.
pub(crate) fn renumber(ordered: Vec<PrintJob>) -> Vec<PrintJob> {
    ordered
        .into_iter()
        .enumerate()
        .filter_map(|(index, mut job)| {
            let position = index as u32;
            if job.queue_position == Some(position) && job.status == JobStatus::Queued {
                return None;
            }
            job.status = JobStatus::Queued;
            job.queue_position = Some(position);
            Some(job)
        })
        .collect()
}

/// Rows to rewrite when `job_id` leaves `queue`: every later entry moves
/// up by one. The leaving row itself is not included.
pub(crate) fn compaction_after_leave(queue: Vec<PrintJob>, job_id: &str) -> Vec<PrintJob> {
    renumber(queue.into_iter().filter(|j| j.id != job_id).collect())
}

/// Validate `page >= 1` and `1 <= page_size <= max`.
pub(crate) fn validate_paging(page: usize, page_size: usize, max: usize) -> Result<(), PrintJobError> {
    if page < 1 {
        return Err(PrintJobError::Validation("page must be 1 or greater".to_string()));
    }
    let max = max.min(MAX_PAGE_SIZE);
    if page_size < 1 || page_size > max {
        return Err(PrintJobError::Validation(format!(
            "pageSize must be between 1 and {}",
            max
        )));
    }
    Ok(())
}

pub struct PrintQueueManager {
    store: Arc<dyn JobStore>,
    locks: PrinterLocks,
    max_page_size: usize,
}

impl PrintQueueManager {
    pub fn new(store: Arc<dyn JobStore>, locks: PrinterLocks) -> Self {
        Self { store, locks, max_page_size: MAX_PAGE_SIZE }
    }

    pub fn with_max_page_size(mut self, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Queue a job, appending when `position` is `None` and inserting
    /// otherwise. A job that is already queued is moved: it is taken out
    /// of its current slot and placed at the requested one.
    pub async fn add_to_queue(
        &self,
        printer_id: &str,
        job_id: &str,
        position: Option<u32>,
    ) -> Result<PrintJob, PrintJobError> {
        let _guard = self.locks.lock(printer_id).await;
        let job = self
            .store
            .find(job_id)
            .await?
            .ok_or_else(|| PrintJobError::job_not_found(job_id))?;
        if job.printer_id != printer_id {
            return Err(PrintJobError::Validation(format!(
                "Print job '{}' belongs to printer '{}', not '{}'",
                job.id, job.printer_id, printer_id
            )));
        }
        match job.status {
            JobStatus::Pending | JobStatus::Queued => {}
            JobStatus::Printing | JobStatus::Paused => {
                return Err(PrintJobError::Conflict("Cannot queue an active print job".to_string()));
            }
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Unknown => {
                return Err(PrintJobError::invalid_transition("PENDING or QUEUED", JobStatus::Queued, job.status));
            }
        }

        let mut ordered: Vec<PrintJob> = self
            .store
            .find_queued(printer_id)
            .await?
            .into_iter()
            .filter(|j| j.id != job.id)
            .collect();
        let len = ordered.len();
        let index = match position {
            None => len,
            Some(p) if (p as usize) <= len => p as usize,
            Some(p) => {
                return Err(PrintJobError::Validation(format!(
                    "Queue position {} is out of range (0..={})",
                    p, len
                )));
            }
        };
        let was_queued = job.is_queued();
        ordered.insert(index, job);
        let changed = renumber(ordered);
        let updated = changed
            .iter()
            .find(|j| j.id == job_id)
            .cloned();
        self.store.save_all(changed).await?;

        let updated = match updated {
            Some(job) => job,
            // Moved onto the slot it already held; nothing was rewritten.
            None => self
                .store
                .find(job_id)
                .await?
                .ok_or_else(|| PrintJobError::job_not_found(job_id))?,
        };
        if was_queued {
            tracing::info!(printer_id, job_id, position = index, "Moved queued print job");
        } else {
            tracing::info!(printer_id, job_id, position = index, "Added print job to queue");
        }
        Ok(updated)
    }

    /// Take a job out of the printer's queue, back to PENDING, and close
    /// the gap it leaves.
    pub async fn remove_from_queue(&self, printer_id: &str, job_id: &str) -> Result<PrintJob, PrintJobError> {
        let _guard = self.locks.lock(printer_id).await;
        let queue = self.store.find_queued(printer_id).await?;
        let Some(mut job) = queue.iter().find(|j| j.id == job_id).cloned() else {
            return Err(PrintJobError::NotFound(format!(
                "Print job '{}' is not in the queue of printer '{}'",
                job_id, printer_id
            )));
        };
        let removed_position = job.queue_position;
        let mut batch = compaction_after_leave(queue, job_id);
        job.status = JobStatus::Pending;
        job.queue_position = None;
        batch.push(job.clone());
        self.store.save_all(batch).await?;
        tracing::info!(printer_id, job_id, position = ?removed_position, "Removed print job from queue");
        Ok(job)
    }

    /// Apply a complete new order. `job_ids` must name every queued job
    /// of the printer exactly once.
    pub async fn reorder_queue(&self, printer_id: &str, job_ids: &[String]) -> Result<Vec<PrintJob>, PrintJobError> {
        let _guard = self.locks.lock(printer_id).await;
        let queue = self.store.find_queued(printer_id).await?;

        let mut seen = HashSet::new();
        if let Some(duplicate) = job_ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(PrintJobError::Validation(format!(
                "Job '{}' appears more than once in the new queue order",
                duplicate
            )));
        }
        let current: HashSet<&str> = queue.iter().map(|j| j.id.as_str()).collect();
        if let Some(unknown) = job_ids.iter().find(|id| !current.contains(id.as_str())) {
            return Err(PrintJobError::Validation(format!(
                "Job '{}' is not queued on printer '{}'",
                unknown, printer_id
            )));
        }
        if job_ids.len() != queue.len() {
            return Err(PrintJobError::Validation(format!(
                "New queue order lists {} jobs but printer '{}' has {} queued",
                job_ids.len(),
                printer_id,
                queue.len()
            )));
        }

        let mut by_id: std::collections::HashMap<String, PrintJob> =
            queue.into_iter().map(|j| (j.id.clone(), j)).collect();
        let ordered: Vec<PrintJob> = job_ids.iter().filter_map(|id| by_id.remove(id)).collect();
        let changed = renumber(ordered);
        let moved = changed.len();
        self.store.save_all(changed).await?;
        tracing::info!(printer_id, jobs = job_ids.len(), moved, "Reordered print queue");
        Ok(self.store.find_queued(printer_id).await?)
    }

    /// Queued jobs of the printer ordered by position.
    pub async fn get_queue(&self, printer_id: &str) -> Result<Vec<PrintJob>, PrintJobError> {
        Ok(self.store.find_queued(printer_id).await?)
    }

    /// Paginated view over the queues of every printer, ordered by
    /// printer id and then queue position.
    pub async fn get_global_queue(&self, page: usize, page_size: usize) -> Result<PageDto<QueueEntryDto>, PrintJobError> {
        validate_paging(page, page_size, self.max_page_size)?;
        let all = self.store.find_all_queued().await?;
        let total = all.len();
        let items = all
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .filter_map(QueueEntryDto::from_job)
            .collect();
        Ok(PageDto::new(items, page, page_size, total))
    }

    /// Return every queued job of the printer to PENDING. Returns how
    /// many jobs were dequeued.
    pub async fn clear_queue(&self, printer_id: &str) -> Result<usize, PrintJobError> {
        let _guard = self.locks.lock(printer_id).await;
        let batch: Vec<PrintJob> = self
            .store
            .find_queued(printer_id)
            .await?
            .into_iter()
            .map(|mut job| {
                job.status = JobStatus::Pending;
                job.queue_position = None;
                job
            })
            .collect();
        let count = batch.len();
        self.store.save_all(batch).await?;
        tracing::info!(printer_id, count, "Cleared print queue");
        Ok(count)
    }

    /// The job at position 0, if any.
    pub async fn peek_next(&self, printer_id: &str) -> Result<Option<PrintJob>, PrintJobError> {
        Ok(self.store.find_queued(printer_id).await?.into_iter().next())
    }
}
