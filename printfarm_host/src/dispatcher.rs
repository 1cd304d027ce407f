// src/dispatcher.rs
//! Hands queued (or directly submitted) jobs to printers.
//!
//! `submit_job` checks everything it can before touching the printer,
//! performs the upload without holding any printer lock, and then commits
//! queue removal plus the PRINTING transition as a single batch. A failed
//! upload leaves the job exactly as it was.

use std::sync::Arc;

use printfarm_shared::{JobStatus, JobStore, PrintJob, PrintJobError};

use crate::file_storage::{FileStorage, FileStorageError};
use crate::job_lifecycle::JobLifecycleManager;
use crate::print_queue::PrintQueueManager;
use crate::printer_api::{PrinterAdapter, PrinterRegistry, UploadOptions};

/// Result of previewing a printer's queue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueOutcome {
    Empty,
    /// The job that would be started next; nothing was changed.
    Next(PrintJob),
}

pub struct QueueDispatcher {
    store: Arc<dyn JobStore>,
    printers: Arc<PrinterRegistry>,
    queue: Arc<PrintQueueManager>,
    lifecycle: Arc<JobLifecycleManager>,
    files: Arc<dyn FileStorage>,
    adapter: Arc<dyn PrinterAdapter>,
}

impl QueueDispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        printers: Arc<PrinterRegistry>,
        queue: Arc<PrintQueueManager>,
        lifecycle: Arc<JobLifecycleManager>,
        files: Arc<dyn FileStorage>,
        adapter: Arc<dyn PrinterAdapter>,
    ) -> Self {
        Self { store, printers, queue, lifecycle, files, adapter }
    }

    fn ensure_printer(&self, printer_id: &str) -> Result<(), PrintJobError> {
        if self.printers.contains(printer_id) {
            Ok(())
        } else {
            Err(PrintJobError::NotFound(format!("Printer '{}' not found", printer_id)))
        }
    }

    /// Non-destructive preview of the printer's queue head.
    pub async fn process_queue(&self, printer_id: &str) -> Result<QueueOutcome, PrintJobError> {
        self.ensure_printer(printer_id)?;
        match self.queue.peek_next(printer_id).await? {
            Some(job) => {
                tracing::debug!(printer_id, job_id = %job.id, "Queue head ready");
                Ok(QueueOutcome::Next(job))
            }
            None => {
                tracing::debug!(printer_id, "Queue empty, nothing to dispatch");
                Ok(QueueOutcome::Empty)
            }
        }
    }

    /// Submit the job at the head of the printer's queue.
    pub async fn submit_next(&self, printer_id: &str) -> Result<PrintJob, PrintJobError> {
        self.ensure_printer(printer_id)?;
        let head = self.queue.peek_next(printer_id).await?.ok_or_else(|| {
            PrintJobError::NotFound(format!("Queue of printer '{}' is empty", printer_id))
        })?;
        self.submit_job(printer_id, &head.id).await
    }

    /// Upload the job's file to the printer and start it.
    pub async fn submit_job(&self, printer_id: &str, job_id: &str) -> Result<PrintJob, PrintJobError> {
        self.ensure_printer(printer_id)?;
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
                return Err(PrintJobError::Conflict("Print job is already active".to_string()));
            }
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Unknown => {
                return Err(PrintJobError::invalid_transition("PENDING or QUEUED", JobStatus::Printing, job.status));
            }
        }
        let busy = self
            .store
            .find_by_printer(printer_id)
            .await?
            .into_iter()
            .any(|j| j.status.is_active());
        if busy {
            return Err(PrintJobError::Conflict(format!(
                "Printer '{}' already has an active print job",
                printer_id
            )));
        }

        let storage_id = job.file_storage_id.as_deref().ok_or_else(|| {
            PrintJobError::Validation(format!("Print job '{}' has no file attached", job.id))
        })?;
        let bytes = self.files.read_file(storage_id).await.map_err(|e| match e {
            FileStorageError::NotFound(_) | FileStorageError::InvalidId(_) => PrintJobError::NotFound(e.to_string()),
            FileStorageError::Io(_) => PrintJobError::ExternalService(e.to_string()),
        })?;

        tracing::info!(printer_id, job_id, bytes = bytes.len(), file = %job.file_name, "Submitting print job");
        if let Err(e) = self
            .adapter
            .upload_file(printer_id, bytes, &job.file_name, UploadOptions::SELECT_AND_PRINT)
            .await
        {
            tracing::error!(printer_id, job_id, error = %e, "Printer rejected submitted file");
            return Err(PrintJobError::ExternalService(e.to_string()));
        }

        // A job finished or started elsewhere during the upload stays as it is.
        self.lifecycle.start_job(job_id).await
    }
}
