//! Defines the Axum API routes and handlers.

use crate::dispatcher::{QueueDispatcher, QueueOutcome};
use crate::file_storage::FileStorage;
use crate::job_lifecycle::JobLifecycleManager;
use crate::print_queue::PrintQueueManager;
use crate::printer_api::{PrinterAdapter, PrinterRegistry};
use crate::printer_locks::PrinterLocks;
use crate::web::models::{
    AddToQueueRequest, CreateJobRequest, FailedEventRequest, FileEventRequest, JobListQuery, PageQuery,
    ProgressEventRequest, ReorderQueueRequest, SubmitJobRequest,
};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use printfarm_shared::api_models::{PageDto, PrintJobDto, ProcessQueueDto};
use printfarm_shared::{JobDraft, JobStore, PrintJob, PrintJobError};
use serde::Serialize;
use std::sync::Arc;

/// Helper to create a JSON error response with a message and status code
fn json_error(message: &str, status: StatusCode) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn error_response(err: PrintJobError) -> Response {
    let status = match &err {
        PrintJobError::NotFound(_) => StatusCode::NOT_FOUND,
        PrintJobError::Validation(_) => StatusCode::BAD_REQUEST,
        PrintJobError::Conflict(_) => StatusCode::CONFLICT,
        PrintJobError::ExternalService(_) => StatusCode::BAD_GATEWAY,
        PrintJobError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    }
    json_error(&err.to_string(), status)
}

fn respond<T: Serialize>(result: Result<T, PrintJobError>, ok: StatusCode) -> Response {
    match result {
        Ok(body) => (ok, Json(body)).into_response(),
        Err(e) => error_response(e),
    }
}

fn job_dto(result: Result<PrintJob, PrintJobError>) -> Result<PrintJobDto, PrintJobError> {
    result.map(PrintJobDto::from)
}

fn job_dtos(result: Result<Vec<PrintJob>, PrintJobError>) -> Result<Vec<PrintJobDto>, PrintJobError> {
    result.map(|jobs| jobs.into_iter().map(PrintJobDto::from).collect())
}

pub struct AppStateInner {
    pub printers: Arc<PrinterRegistry>,
    pub lifecycle: Arc<JobLifecycleManager>,
    pub queue: Arc<PrintQueueManager>,
    pub dispatcher: Arc<QueueDispatcher>,
}
pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    /// Wire the managers around one store and one lock registry.
    pub fn from_parts(
        store: Arc<dyn JobStore>,
        printers: PrinterRegistry,
        files: Arc<dyn FileStorage>,
        adapter: Arc<dyn PrinterAdapter>,
        max_page_size: usize,
    ) -> AppState {
        let locks = PrinterLocks::new();
        let printers = Arc::new(printers);
        let lifecycle = Arc::new(
            JobLifecycleManager::new(store.clone(), locks.clone()).with_max_page_size(max_page_size),
        );
        let queue = Arc::new(PrintQueueManager::new(store.clone(), locks).with_max_page_size(max_page_size));
        let dispatcher = Arc::new(QueueDispatcher::new(
            store,
            printers.clone(),
            queue.clone(),
            lifecycle.clone(),
            files,
            adapter,
        ));
        Arc::new(Self { printers, lifecycle, queue, dispatcher })
    }

    fn ensure_printer(&self, printer_id: &str) -> Result<(), PrintJobError> {
        if self.printers.contains(printer_id) {
            Ok(())
        } else {
            Err(PrintJobError::NotFound(format!("Printer '{}' not found", printer_id)))
        }
    }
}

/// Creates the Axum router with all the API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/jobs", get(list_jobs).post(create_job))
        .route("/api/v1/jobs/{id}", get(get_job).delete(delete_job))
        .route("/api/v1/jobs/{id}/complete", post(set_completed))
        .route("/api/v1/jobs/{id}/fail", post(set_failed))
        .route("/api/v1/jobs/{id}/cancel", post(set_cancelled))
        .route("/api/v1/jobs/{id}/unknown", post(set_unknown))
        .route("/api/v1/printers/{printer_id}/events/started", post(event_started))
        .route("/api/v1/printers/{printer_id}/events/progress", post(event_progress))
        .route("/api/v1/printers/{printer_id}/events/paused", post(event_paused))
        .route("/api/v1/printers/{printer_id}/events/resumed", post(event_resumed))
        .route("/api/v1/printers/{printer_id}/events/finished", post(event_finished))
        .route("/api/v1/printers/{printer_id}/events/failed", post(event_failed))
        .route("/api/v1/queue", get(global_queue))
        .route(
            "/api/v1/printers/{printer_id}/queue",
            get(get_queue).post(add_to_queue).delete(clear_queue),
        )
        .route("/api/v1/printers/{printer_id}/queue/order", put(reorder_queue))
        .route("/api/v1/printers/{printer_id}/queue/next", get(process_queue))
        .route("/api/v1/printers/{printer_id}/queue/submit", post(submit_job))
        .route("/api/v1/printers/{printer_id}/queue/{job_id}", axum::routing::delete(remove_from_queue))
        .with_state(state)
}

async fn list_jobs(State(state): State<AppState>, Query(query): Query<JobListQuery>) -> Response {
    let result = state
        .lifecycle
        .list_jobs(query.printer_id.as_deref(), query.page, query.page_size)
        .await
        .map(|page| {
            let items = page.items.into_iter().map(PrintJobDto::from).collect();
            PageDto::new(items, page.page, page.page_size, page.total_count)
        });
    respond(result, StatusCode::OK)
}

async fn create_job(State(state): State<AppState>, Json(payload): Json<CreateJobRequest>) -> Response {
    if let Err(e) = state.ensure_printer(&payload.printer_id) {
        return error_response(e);
    }
    let mut draft = JobDraft::new(&payload.printer_id, &payload.file_name).with_metadata(payload.metadata);
    if let Some(storage_id) = payload.file_storage_id.as_deref() {
        draft = draft.with_file_storage_id(storage_id);
    }
    respond(job_dto(state.lifecycle.create_job(draft).await), StatusCode::CREATED)
}

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    respond(job_dto(state.lifecycle.get_job(&id).await), StatusCode::OK)
}

async fn delete_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    respond(job_dto(state.lifecycle.delete_job(&id).await), StatusCode::OK)
}

async fn set_completed(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    respond(job_dto(state.lifecycle.set_completed(&id).await), StatusCode::OK)
}

async fn set_failed(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    respond(job_dto(state.lifecycle.set_failed(&id).await), StatusCode::OK)
}

async fn set_cancelled(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    respond(job_dto(state.lifecycle.set_cancelled(&id).await), StatusCode::OK)
}

async fn set_unknown(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    respond(job_dto(state.lifecycle.set_unknown(&id).await), StatusCode::OK)
}

async fn event_started(
    State(state): State<AppState>,
    Path(printer_id): Path<String>,
    Json(payload): Json<FileEventRequest>,
) -> Response {
    if let Err(e) = state.ensure_printer(&printer_id) {
        return error_response(e);
    }
    respond(job_dto(state.lifecycle.mark_started(&printer_id, &payload.file_name).await), StatusCode::OK)
}

async fn event_progress(
    State(state): State<AppState>,
    Path(printer_id): Path<String>,
    Json(payload): Json<ProgressEventRequest>,
) -> Response {
    if let Err(e) = state.ensure_printer(&printer_id) {
        return error_response(e);
    }
    let result = state
        .lifecycle
        .mark_progress(&printer_id, &payload.file_name, payload.progress)
        .await;
    respond(job_dto(result), StatusCode::OK)
}

async fn event_paused(State(state): State<AppState>, Path(printer_id): Path<String>) -> Response {
    if let Err(e) = state.ensure_printer(&printer_id) {
        return error_response(e);
    }
    respond(job_dto(state.lifecycle.handle_print_paused(&printer_id).await), StatusCode::OK)
}

async fn event_resumed(State(state): State<AppState>, Path(printer_id): Path<String>) -> Response {
    if let Err(e) = state.ensure_printer(&printer_id) {
        return error_response(e);
    }
    respond(job_dto(state.lifecycle.handle_print_resumed(&printer_id).await), StatusCode::OK)
}

async fn event_finished(
    State(state): State<AppState>,
    Path(printer_id): Path<String>,
    Json(payload): Json<FileEventRequest>,
) -> Response {
    if let Err(e) = state.ensure_printer(&printer_id) {
        return error_response(e);
    }
    respond(job_dto(state.lifecycle.mark_finished(&printer_id, &payload.file_name).await), StatusCode::OK)
}

async fn event_failed(
    State(state): State<AppState>,
    Path(printer_id): Path<String>,
    Json(payload): Json<FailedEventRequest>,
) -> Response {
    if let Err(e) = state.ensure_printer(&printer_id) {
        return error_response(e);
    }
    let reason = payload.reason.as_deref().unwrap_or("Print failed on printer");
    let result = state.lifecycle.mark_failed(&printer_id, &payload.file_name, reason).await;
    respond(job_dto(result), StatusCode::OK)
}

async fn global_queue(State(state): State<AppState>, Query(query): Query<PageQuery>) -> Response {
    respond(state.queue.get_global_queue(query.page, query.page_size).await, StatusCode::OK)
}

async fn get_queue(State(state): State<AppState>, Path(printer_id): Path<String>) -> Response {
    if let Err(e) = state.ensure_printer(&printer_id) {
        return error_response(e);
    }
    respond(job_dtos(state.queue.get_queue(&printer_id).await), StatusCode::OK)
}

async fn add_to_queue(
    State(state): State<AppState>,
    Path(printer_id): Path<String>,
    Json(payload): Json<AddToQueueRequest>,
) -> Response {
    if let Err(e) = state.ensure_printer(&printer_id) {
        return error_response(e);
    }
    let result = state
        .queue
        .add_to_queue(&printer_id, &payload.job_id, payload.position)
        .await;
    respond(job_dto(result), StatusCode::OK)
}

async fn remove_from_queue(
    State(state): State<AppState>,
    Path((printer_id, job_id)): Path<(String, String)>,
) -> Response {
    if let Err(e) = state.ensure_printer(&printer_id) {
        return error_response(e);
    }
    respond(job_dto(state.queue.remove_from_queue(&printer_id, &job_id).await), StatusCode::OK)
}

async fn reorder_queue(
    State(state): State<AppState>,
    Path(printer_id): Path<String>,
    Json(payload): Json<ReorderQueueRequest>,
) -> Response {
    if let Err(e) = state.ensure_printer(&printer_id) {
        return error_response(e);
    }
    respond(job_dtos(state.queue.reorder_queue(&printer_id, &payload.job_ids).await), StatusCode::OK)
}

async fn clear_queue(State(state): State<AppState>, Path(printer_id): Path<String>) -> Response {
    if let Err(e) = state.ensure_printer(&printer_id) {
        return error_response(e);
    }
    let result = state
        .queue
        .clear_queue(&printer_id)
        .await
        .map(|cleared| serde_json::json!({ "cleared": cleared }));
    respond(result, StatusCode::OK)
}

async fn process_queue(State(state): State<AppState>, Path(printer_id): Path<String>) -> Response {
    let result = state.dispatcher.process_queue(&printer_id).await.map(|outcome| match outcome {
        QueueOutcome::Empty => ProcessQueueDto { printer_id: printer_id.clone(), queue_empty: true, next_job: None },
        QueueOutcome::Next(job) => ProcessQueueDto {
            printer_id: printer_id.clone(),
            queue_empty: false,
            next_job: Some(PrintJobDto::from(job)),
        },
    });
    respond(result, StatusCode::OK)
}

async fn submit_job(
    State(state): State<AppState>,
    Path(printer_id): Path<String>,
    payload: Option<Json<SubmitJobRequest>>,
) -> Response {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let result = match request.job_id.as_deref() {
        Some(job_id) => state.dispatcher.submit_job(&printer_id, job_id).await,
        None => state.dispatcher.submit_next(&printer_id).await,
    };
    respond(job_dto(result), StatusCode::OK)
}
