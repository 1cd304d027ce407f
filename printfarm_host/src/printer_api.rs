//! Printer-facing seam: the registry of managed printers and the adapter
//! that hands a file to a device.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

use crate::config::PrinterConfig;

#[derive(Debug, Error, Clone)]
pub enum PrinterAdapterError {
    #[error("Printer '{0}' is not connected to this adapter")]
    UnknownPrinter(String),
    #[error("Invalid file name '{0}'")]
    InvalidFileName(String),
    #[error("Upload failed: {0}")]
    Upload(String),
}

/// Flags passed along with an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    /// Make the file the printer's selected file.
    pub select: bool,
    /// Start printing it immediately.
    pub print: bool,
}

impl UploadOptions {
    pub const SELECT_AND_PRINT: UploadOptions = UploadOptions { select: true, print: true };
}

#[async_trait]
pub trait PrinterAdapter: Send + Sync + 'static {
    async fn upload_file(
        &self,
        printer_id: &str,
        file: Vec<u8>,
        filename: &str,
        options: UploadOptions,
    ) -> Result<(), PrinterAdapterError>;
}

/// Printers known to this host, from configuration.
#[derive(Debug, Clone, Default)]
pub struct PrinterRegistry {
    printers: HashMap<String, PrinterConfig>,
}

impl PrinterRegistry {
    pub fn new(printers: &[PrinterConfig]) -> Self {
        Self {
            printers: printers.iter().map(|p| (p.id.clone(), p.clone())).collect(),
        }
    }

    pub fn contains(&self, printer_id: &str) -> bool {
        self.printers.contains_key(printer_id)
    }

    pub fn get(&self, printer_id: &str) -> Option<&PrinterConfig> {
        self.printers.get(printer_id)
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.printers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

/// Adapter that drops submitted files into each printer's spool
/// directory, where a device-side agent picks them up.
#[derive(Debug, Clone)]
pub struct SpoolPrinterAdapter {
    spool_dirs: HashMap<String, PathBuf>,
}

impl SpoolPrinterAdapter {
    pub fn new(printers: &[PrinterConfig]) -> Self {
        Self {
            spool_dirs: printers.iter().map(|p| (p.id.clone(), p.spool_dir())).collect(),
        }
    }
}

#[async_trait]
impl PrinterAdapter for SpoolPrinterAdapter {
    async fn upload_file(
        &self,
        printer_id: &str,
        file: Vec<u8>,
        filename: &str,
        options: UploadOptions,
    ) -> Result<(), PrinterAdapterError> {
        let dir = self
            .spool_dirs
            .get(printer_id)
            .ok_or_else(|| PrinterAdapterError::UnknownPrinter(printer_id.to_string()))?;
        let name = Path::new(filename)
            .file_name()
            .filter(|n| n.len() == filename.len())
            .ok_or_else(|| PrinterAdapterError::InvalidFileName(filename.to_string()))?;
        fs::create_dir_all(dir).await.map_err(|e| PrinterAdapterError::Upload(e.to_string()))?;
        let target = dir.join(name);
        fs::write(&target, &file).await.map_err(|e| PrinterAdapterError::Upload(e.to_string()))?;
        tracing::info!(
            printer_id,
            bytes = file.len(),
            select = options.select,
            print = options.print,
            "Spooled {}",
            target.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn printer(id: &str, spool: &Path) -> PrinterConfig {
        PrinterConfig { id: id.to_string(), name: None, spool_dir: Some(spool.to_path_buf()) }
    }

    #[tokio::test]
    async fn spool_writes_into_printer_dir() {
        let dir = tempdir().unwrap();
        let spool = dir.path().join("mk4");
        let adapter = SpoolPrinterAdapter::new(&[printer("mk4", &spool)]);
        adapter
            .upload_file("mk4", b"G28".to_vec(), "cube.gcode", UploadOptions::SELECT_AND_PRINT)
            .await
            .unwrap();
        assert_eq!(std::fs::read(spool.join("cube.gcode")).unwrap(), b"G28");
    }

    #[tokio::test]
    async fn unknown_printer_and_bad_names_fail() {
        let dir = tempdir().unwrap();
        let adapter = SpoolPrinterAdapter::new(&[printer("mk4", dir.path())]);
        let err = adapter
            .upload_file("other", vec![], "a.gcode", UploadOptions::SELECT_AND_PRINT)
            .await
            .unwrap_err();
        assert!(matches!(err, PrinterAdapterError::UnknownPrinter(_)));
        let err = adapter
            .upload_file("mk4", vec![], "../a.gcode", UploadOptions::SELECT_AND_PRINT)
            .await
            .unwrap_err();
        assert!(matches!(err, PrinterAdapterError::InvalidFileName(_)));
    }

    #[test]
    fn registry_lists_sorted_ids() {
        let registry = PrinterRegistry::new(&[
            PrinterConfig { id: "b".into(), name: None, spool_dir: None },
            PrinterConfig { id: "a".into(), name: Some("A".into()), spool_dir: None },
        ]);
        assert!(registry.contains("a"));
        assert!(!registry.contains("c"));
        assert_eq!(registry.ids(), vec!["a", "b"]);
        assert_eq!(registry.get("a").and_then(|p| p.name.as_deref()), Some("A"));
    }
}
