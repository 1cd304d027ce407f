//! Record store for print jobs: one trait, two backends.
//!
//! Backends hold no business rules. They persist rows, maintain the
//! `(printer_id, queue_position)` index, and commit batches atomically.
//! A batch that would leave two queued rows of one printer on the same
//! position is refused as a whole.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::print_job::{JobDraft, PrintJob};

#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Row '{0}' does not exist")]
    MissingRow(String),
    #[error("Queue position {position} of printer '{printer_id}' is already taken")]
    PositionConflict { printer_id: String, position: u32 },
}

/// A page of rows plus the total number of matching rows.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Insert a new PENDING row; the store assigns the id.
    async fn create(&self, draft: JobDraft) -> Result<PrintJob, StoreError>;
    async fn find(&self, id: &str) -> Result<Option<PrintJob>, StoreError>;
    /// Rows for the printer and file name, oldest first.
    async fn find_by_printer_and_file(&self, printer_id: &str, file_name: &str) -> Result<Vec<PrintJob>, StoreError>;
    /// All rows of the printer, oldest first.
    async fn find_by_printer(&self, printer_id: &str) -> Result<Vec<PrintJob>, StoreError>;
    /// Queued rows of the printer ordered by queue position.
    async fn find_queued(&self, printer_id: &str) -> Result<Vec<PrintJob>, StoreError>;
    /// Queued rows of every printer ordered by (printer id, queue position).
    async fn find_all_queued(&self) -> Result<Vec<PrintJob>, StoreError>;
    async fn count_queued(&self, printer_id: &str) -> Result<usize, StoreError>;
    async fn save(&self, job: PrintJob) -> Result<(), StoreError> {
        self.save_all(vec![job]).await
    }
    /// Update existing rows as one unit: all are written or none is.
    async fn save_all(&self, jobs: Vec<PrintJob>) -> Result<(), StoreError>;
    /// Returns the removed row, if there was one.
    async fn delete(&self, id: &str) -> Result<Option<PrintJob>, StoreError>;
    /// Newest-first listing, optionally restricted to one printer.
    async fn list(&self, printer_id: Option<&str>, offset: usize, limit: usize) -> Result<Page<PrintJob>, StoreError>;
}

/// Row table plus queue index, shared by both backends.
#[derive(Debug, Clone, Default)]
pub(crate) struct JobTable {
    rows: HashMap<String, PrintJob>,
    queue_index: BTreeMap<(String, u32), String>,
}

impl JobTable {
    pub(crate) fn from_rows(rows: Vec<PrintJob>) -> Result<Self, StoreError> {
        let mut table = JobTable::default();
        for job in rows {
            if let Some(position) = job.queue_position {
                let key = (job.printer_id.clone(), position);
                if table.queue_index.contains_key(&key) {
                    return Err(StoreError::PositionConflict { printer_id: job.printer_id, position });
                }
                table.queue_index.insert(key, job.id.clone());
            }
            table.rows.insert(job.id.clone(), job);
        }
        Ok(table)
    }

    pub(crate) fn rows(&self) -> impl Iterator<Item = &PrintJob> {
        self.rows.values()
    }

    pub(crate) fn insert_new(&mut self, draft: JobDraft) -> PrintJob {
        let job = draft.into_job(uuid::Uuid::new_v4().to_string(), Utc::now());
        self.rows.insert(job.id.clone(), job.clone());
        job
    }

    pub(crate) fn find(&self, id: &str) -> Option<PrintJob> {
        self.rows.get(id).cloned()
    }

    fn sorted_oldest_first(mut jobs: Vec<PrintJob>) -> Vec<PrintJob> {
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    pub(crate) fn find_by_printer_and_file(&self, printer_id: &str, file_name: &str) -> Vec<PrintJob> {
        let jobs = self
            .rows
            .values()
            .filter(|j| j.printer_id == printer_id && j.file_name == file_name)
            .cloned()
            .collect();
        Self::sorted_oldest_first(jobs)
    }

    pub(crate) fn find_by_printer(&self, printer_id: &str) -> Vec<PrintJob> {
        let jobs = self.rows.values().filter(|j| j.printer_id == printer_id).cloned().collect();
        Self::sorted_oldest_first(jobs)
    }

    pub(crate) fn find_queued(&self, printer_id: &str) -> Vec<PrintJob> {
        let range = (printer_id.to_string(), 0)..=(printer_id.to_string(), u32::MAX);
        self.queue_index
            .range(range)
            .filter_map(|(_, id)| self.rows.get(id).cloned())
            .collect()
    }

    pub(crate) fn find_all_queued(&self) -> Vec<PrintJob> {
        self.queue_index
            .values()
            .filter_map(|id| self.rows.get(id).cloned())
            .collect()
    }

    pub(crate) fn count_queued(&self, printer_id: &str) -> usize {
        let range = (printer_id.to_string(), 0)..=(printer_id.to_string(), u32::MAX);
        self.queue_index.range(range).count()
    }

    /// Validate the whole batch first, then apply it.
    pub(crate) fn apply_batch(&mut self, jobs: Vec<PrintJob>) -> Result<(), StoreError> {
        let batch_ids: HashSet<&str> = jobs.iter().map(|j| j.id.as_str()).collect();
        let mut claimed: HashSet<(&str, u32)> = HashSet::new();
        for job in &jobs {
            if !self.rows.contains_key(&job.id) {
                return Err(StoreError::MissingRow(job.id.clone()));
            }
            if let Some(position) = job.queue_position {
                let conflict = !claimed.insert((job.printer_id.as_str(), position))
                    || self
                        .queue_index
                        .get(&(job.printer_id.clone(), position))
                        .is_some_and(|owner| !batch_ids.contains(owner.as_str()));
                if conflict {
                    return Err(StoreError::PositionConflict {
                        printer_id: job.printer_id.clone(),
                        position,
                    });
                }
            }
        }

        for job in &jobs {
            if let Some(old) = self.rows.get(&job.id) {
                if let Some(position) = old.queue_position {
                    self.queue_index.remove(&(old.printer_id.clone(), position));
                }
            }
        }
        for job in jobs {
            if let Some(position) = job.queue_position {
                self.queue_index.insert((job.printer_id.clone(), position), job.id.clone());
            }
            self.rows.insert(job.id.clone(), job);
        }
        Ok(())
    }

    pub(crate) fn delete(&mut self, id: &str) -> Option<PrintJob> {
        let removed = self.rows.remove(id)?;
        if let Some(position) = removed.queue_position {
            self.queue_index.remove(&(removed.printer_id.clone(), position));
        }
        Some(removed)
    }

    pub(crate) fn list(&self, printer_id: Option<&str>, offset: usize, limit: usize) -> Page<PrintJob> {
        let mut matching: Vec<&PrintJob> = self
            .rows
            .values()
            .filter(|j| printer_id.is_none_or(|p| j.printer_id == p))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        let total = matching.len();
        let items = matching.into_iter().skip(offset).take(limit).cloned().collect();
        Page { items, total }
    }
}

/// Volatile backend; everything lives in process memory.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    table: RwLock<JobTable>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, draft: JobDraft) -> Result<PrintJob, StoreError> {
        Ok(self.table.write().await.insert_new(draft))
    }

    async fn find(&self, id: &str) -> Result<Option<PrintJob>, StoreError> {
        Ok(self.table.read().await.find(id))
    }

    async fn find_by_printer_and_file(&self, printer_id: &str, file_name: &str) -> Result<Vec<PrintJob>, StoreError> {
        Ok(self.table.read().await.find_by_printer_and_file(printer_id, file_name))
    }

    async fn find_by_printer(&self, printer_id: &str) -> Result<Vec<PrintJob>, StoreError> {
        Ok(self.table.read().await.find_by_printer(printer_id))
    }

    async fn find_queued(&self, printer_id: &str) -> Result<Vec<PrintJob>, StoreError> {
        Ok(self.table.read().await.find_queued(printer_id))
    }

    async fn find_all_queued(&self) -> Result<Vec<PrintJob>, StoreError> {
        Ok(self.table.read().await.find_all_queued())
    }

    async fn count_queued(&self, printer_id: &str) -> Result<usize, StoreError> {
        Ok(self.table.read().await.count_queued(printer_id))
    }

    async fn save_all(&self, jobs: Vec<PrintJob>) -> Result<(), StoreError> {
        self.table.write().await.apply_batch(jobs)
    }

    async fn delete(&self, id: &str) -> Result<Option<PrintJob>, StoreError> {
        Ok(self.table.write().await.delete(id))
    }

    async fn list(&self, printer_id: Option<&str>, offset: usize, limit: usize) -> Result<Page<PrintJob>, StoreError> {
        Ok(self.table.read().await.list(printer_id, offset, limit))
    }
}
