// printfarm_shared: job model, record store and API types shared by the host and its clients

pub mod api_models;
pub mod file_store;
pub mod job_store;
pub mod print_job;

pub use file_store::JsonFileJobStore;
pub use job_store::{InMemoryJobStore, JobStore, Page, StoreError};
pub use print_job::{JobDraft, JobMetadata, JobStatistics, JobStatus, PrintJob, PrintJobError};
