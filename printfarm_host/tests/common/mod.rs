// Shared fixtures for the host integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use printfarm_host::config::PrinterConfig;
use printfarm_host::file_storage::LocalFileStorage;
use printfarm_host::printer_api::{PrinterAdapter, PrinterAdapterError, PrinterRegistry, UploadOptions};
use printfarm_host::{JobLifecycleManager, PrintQueueManager, PrinterLocks, QueueDispatcher};
use printfarm_shared::{InMemoryJobStore, JobDraft, JobStatus, JobStore, PrintJob};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;

pub const PRINTER: &str = "p1";
pub const OTHER_PRINTER: &str = "p2";
pub const GCODE_ID: &str = "cube.gcode";

/// Records uploads; can be switched to fail every call, or to hold each
/// upload until `release` is notified.
#[derive(Default)]
pub struct FakeAdapter {
    pub uploads: Mutex<Vec<(String, String, usize, UploadOptions)>>,
    /// Notified when a gated upload has reached the printer.
    pub started: Notify,
    pub release: Notify,
    fail: AtomicBool,
    gated: AtomicBool,
}

impl FakeAdapter {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_gated(&self, gated: bool) {
        self.gated.store(gated, Ordering::SeqCst);
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl PrinterAdapter for FakeAdapter {
    async fn upload_file(
        &self,
        printer_id: &str,
        file: Vec<u8>,
        filename: &str,
        options: UploadOptions,
    ) -> Result<(), PrinterAdapterError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PrinterAdapterError::Upload("connection refused".to_string()));
        }
        if self.gated.load(Ordering::SeqCst) {
            self.started.notify_one();
            self.release.notified().await;
        }
        self.uploads
            .lock()
            .unwrap()
            .push((printer_id.to_string(), filename.to_string(), file.len(), options));
        Ok(())
    }
}

pub fn printer_configs() -> Vec<PrinterConfig> {
    [PRINTER, OTHER_PRINTER]
        .iter()
        .map(|id| PrinterConfig { id: id.to_string(), name: None, spool_dir: None })
        .collect()
}

pub struct Farm {
    pub store: Arc<InMemoryJobStore>,
    pub lifecycle: Arc<JobLifecycleManager>,
    pub queue: Arc<PrintQueueManager>,
    pub dispatcher: QueueDispatcher,
    pub adapter: Arc<FakeAdapter>,
    pub files_dir: TempDir,
}

impl Farm {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryJobStore::new());
        let dyn_store: Arc<dyn JobStore> = store.clone();
        let locks = PrinterLocks::new();
        let lifecycle = Arc::new(JobLifecycleManager::new(dyn_store.clone(), locks.clone()));
        let queue = Arc::new(PrintQueueManager::new(dyn_store.clone(), locks));
        let files_dir = tempfile::tempdir().unwrap();
        std::fs::write(files_dir.path().join(GCODE_ID), b"G28\nG1 X10 Y10\n").unwrap();
        let adapter = Arc::new(FakeAdapter::default());
        let dispatcher = QueueDispatcher::new(
            dyn_store,
            Arc::new(PrinterRegistry::new(&printer_configs())),
            queue.clone(),
            lifecycle.clone(),
            Arc::new(LocalFileStorage::new(files_dir.path())),
            adapter.clone(),
        );
        Self { store, lifecycle, queue, dispatcher, adapter, files_dir }
    }

    pub async fn pending(&self, printer_id: &str, file_name: &str) -> PrintJob {
        self.lifecycle
            .create_job(JobDraft::new(printer_id, file_name).with_file_storage_id(GCODE_ID))
            .await
            .unwrap()
    }

    pub async fn queued(&self, printer_id: &str, file_name: &str) -> PrintJob {
        let job = self.pending(printer_id, file_name).await;
        self.queue.add_to_queue(printer_id, &job.id, None).await.unwrap()
    }

    pub async fn job(&self, id: &str) -> PrintJob {
        self.store.find(id).await.unwrap().unwrap()
    }

    pub async fn queue_ids(&self, printer_id: &str) -> Vec<String> {
        self.queue
            .get_queue(printer_id)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect()
    }

    /// Positions are exactly 0..n for the printer and every row is
    /// internally consistent.
    pub async fn assert_invariants(&self, printer_id: &str) {
        let queue = self.queue.get_queue(printer_id).await.unwrap();
        let positions: Vec<u32> = queue.iter().map(|j| j.queue_position.unwrap()).collect();
        let expected: Vec<u32> = (0..queue.len() as u32).collect();
        assert_eq!(positions, expected, "positions of {printer_id} are not dense");
        for job in self.store.find_by_printer(printer_id).await.unwrap() {
            assert!(job.is_consistent(), "inconsistent row: {job:?}");
            assert_eq!(job.queue_position.is_some(), job.status == JobStatus::Queued);
        }
        let active = self
            .store
            .find_by_printer(printer_id)
            .await
            .unwrap()
            .iter()
            .filter(|j| j.status.is_active())
            .count();
        assert!(active <= 1, "{printer_id} has {active} active jobs");
    }
}
