//! Contains the data models for API requests.

use printfarm_shared::JobMetadata;
use serde::Deserialize;

fn default_page() -> usize { 1 }
fn default_page_size() -> usize { 50 }

/// Paging query parameters shared by list endpoints.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

/// GET /jobs query.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct JobListQuery {
    pub printer_id: Option<String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

/// Represents a request to create a pending print job.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub printer_id: String,
    pub file_name: String,
    #[serde(default)]
    pub file_storage_id: Option<String>,
    #[serde(default)]
    pub metadata: JobMetadata,
}

/// Represents a request to queue a job, optionally at a position.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AddToQueueRequest {
    pub job_id: String,
    #[serde(default)]
    pub position: Option<u32>,
}

/// The complete new order of a printer's queue.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ReorderQueueRequest {
    pub job_ids: Vec<String>,
}

/// Submit a specific job, or the queue head when `job_id` is absent.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    #[serde(default)]
    pub job_id: Option<String>,
}

/// Printer event naming the file being printed.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FileEventRequest {
    pub file_name: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEventRequest {
    pub file_name: String,
    pub progress: i64,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FailedEventRequest {
    pub file_name: String,
    #[serde(default)]
    pub reason: Option<String>,
}
