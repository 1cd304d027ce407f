// printfarm_host: print job lifecycle, per-printer queues and dispatch behind a REST API

pub mod config;
pub mod dispatcher;
pub mod file_storage;
pub mod job_lifecycle;
pub mod print_queue;
pub mod printer_api;
pub mod printer_locks;
pub mod web;

pub use dispatcher::{QueueDispatcher, QueueOutcome};
pub use job_lifecycle::JobLifecycleManager;
pub use print_queue::PrintQueueManager;
pub use printer_locks::PrinterLocks;
