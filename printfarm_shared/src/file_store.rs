// JSON-file backed job store
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;

use crate::job_store::{JobStore, JobTable, Page, StoreError};
use crate::print_job::{JobDraft, PrintJob};

/// Keeps the table in memory and rewrites the JSON file after every
/// commit. A commit is applied to a copy of the table, flushed, and only
/// then swapped in, so a failed write leaves both disk and memory as
/// they were.
#[derive(Debug)]
pub struct JsonFileJobStore {
    path: PathBuf,
    table: RwLock<JobTable>,
}

impl JsonFileJobStore {
    /// Open the store, loading existing rows if the file is present.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let table = match fs::read(&path).await {
            Ok(bytes) => {
                let rows: Vec<PrintJob> =
                    serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
                tracing::info!("Loaded {} print jobs from {}", rows.len(), path.display());
                JobTable::from_rows(rows)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Job store file {} not found, starting empty", path.display());
                JobTable::default()
            }
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };
        Ok(Self { path, table: RwLock::new(table) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, table: &JobTable) -> Result<(), StoreError> {
        let mut rows: Vec<&PrintJob> = table.rows().collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        let bytes = serde_json::to_vec_pretty(&rows).map_err(|e| StoreError::Serialization(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes).await.map_err(|e| StoreError::Io(e.to_string()))?;
        fs::rename(&tmp, &self.path).await.map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }

    async fn commit<T>(&self, mutate: impl FnOnce(&mut JobTable) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut guard = self.table.write().await;
        let mut next = guard.clone();
        let out = mutate(&mut next)?;
        self.flush(&next).await?;
        *guard = next;
        Ok(out)
    }
}

#[async_trait]
impl JobStore for JsonFileJobStore {
    async fn create(&self, draft: JobDraft) -> Result<PrintJob, StoreError> {
        self.commit(|table| Ok(table.insert_new(draft))).await
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
        self.commit(|table| table.apply_batch(jobs)).await
    }

    async fn delete(&self, id: &str) -> Result<Option<PrintJob>, StoreError> {
        self.commit(|table| Ok(table.delete(id))).await
    }

    async fn list(&self, printer_id: Option<&str>, offset: usize, limit: usize) -> Result<Page<PrintJob>, StoreError> {
        Ok(self.table.read().await.list(printer_id, offset, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::print_job::JobStatus;
    use tempfile::tempdir;

    #[tokio::test]
    async fn rows_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let id = {
            let store = JsonFileJobStore::open(&path).await.unwrap();
            let mut job = store.create(JobDraft::new("p1", "benchy.gcode")).await.unwrap();
            job.status = JobStatus::Queued;
            job.queue_position = Some(0);
            store.save(job.clone()).await.unwrap();
            job.id
        };

        let reopened = JsonFileJobStore::open(&path).await.unwrap();
        let job = reopened.find(&id).await.unwrap().unwrap();
        assert_eq!(job.file_name, "benchy.gcode");
        assert_eq!(reopened.find_queued("p1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_file_opens_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileJobStore::open(dir.path().join("nested/jobs.json")).await.unwrap();
        assert_eq!(store.list(None, 0, 10).await.unwrap().total, 0);
        store.create(JobDraft::new("p1", "a.gcode")).await.unwrap();
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn rejected_batch_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let store = JsonFileJobStore::open(&path).await.unwrap();
        let job = store.create(JobDraft::new("p1", "a.gcode")).await.unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let mut ghost = job.clone();
        ghost.id = "does-not-exist".into();
        assert!(store.save_all(vec![job, ghost]).await.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_serialization_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(&path, "not json").unwrap();
        let err = JsonFileJobStore::open(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
