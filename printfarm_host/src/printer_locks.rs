// src/printer_locks.rs
//! Per-printer mutual exclusion for read-modify-write against the job store.
//!
//! Every mutation that touches a printer's job rows holds that printer's
//! lock from the first read until the batch is committed. Operations on
//! different printers proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
pub struct PrinterLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl PrinterLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the printer's rows.
    pub async fn lock(&self, printer_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(printer_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
