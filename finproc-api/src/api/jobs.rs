//! Finance job endpoints
//!
//! POST /api/finance/:job_id/process, POST /api/finance/:job_id/get-sheets,
//! GET /api/finance/jobs

use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use crate::api::upload::read_job_request;
use crate::error::{ApiError, ApiResult};
use crate::jobs::catalog::{self, ArtifactFormat, ParamSpec, RoleSpec, MODE_PARAM};
use crate::jobs::resolver::Artifact;
use crate::jobs::{list_sheets, run_job, JobError, JobOutput};
use crate::AppState;

/// 200 body when the computation found nothing to report
#[derive(Debug, Serialize)]
pub struct NoFindingsResponse {
    pub status: &'static str,
    pub message: String,
}

/// POST /api/finance/:job_id/get-sheets response
#[derive(Debug, Serialize)]
pub struct SheetsResponse {
    pub sheets: Vec<String>,
}

/// One entry of GET /api/finance/jobs
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub id: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<&'static str>,
    pub title: &'static str,
    pub min_files: usize,
    pub max_files: Option<usize>,
    pub roles: &'static [RoleSpec],
    pub params: &'static [ParamSpec],
    pub output_format: ArtifactFormat,
    pub sheet_listing: bool,
}

#[derive(Debug, Serialize)]
pub struct JobsResponse {
    pub jobs: Vec<JobSummary>,
}

/// POST /api/finance/:job_id/process
///
/// Runs the job and streams back the artifact, or a JSON no-findings answer.
pub async fn process_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    multipart: Multipart,
) -> ApiResult<Response> {
    if catalog::find(&job_id).is_none() {
        return Err(ApiError::NotFound(format!("Unknown job: {}", job_id)));
    }

    let request = read_job_request(multipart).await?;
    let mode = request.fields.get(MODE_PARAM).map(String::as_str);
    let job = catalog::lookup(&job_id, mode).map_err(JobError::from)?;

    match run_job(&state.jobs, job, request).await {
        Ok(JobOutput::Artifact(artifact)) => Ok(artifact_response(artifact)),
        Ok(JobOutput::NoFindings(message)) => Ok(Json(NoFindingsResponse {
            status: "no_findings",
            message,
        })
        .into_response()),
        Err(e) => {
            state.record_error(&e).await;
            Err(e.into())
        }
    }
}

fn artifact_response(artifact: Artifact) -> Response {
    info!(
        file = %artifact.download_name,
        bytes = artifact.bytes.len(),
        "Returning artifact"
    );
    let disposition = format!("attachment; filename=\"{}\"", artifact.download_name);
    (
        [
            (header::CONTENT_TYPE, artifact.mime_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response()
}

/// POST /api/finance/:job_id/get-sheets
///
/// Lists worksheet names of the uploaded workbook (multipart field `file`).
pub async fn get_sheets(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<SheetsResponse>> {
    let job = catalog::find(&job_id)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown job: {}", job_id)))?;

    let request = read_job_request(multipart).await?;
    let upload = request
        .uploads
        .uploads
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::BadRequest("No file provided".to_string()))?;

    match list_sheets(&state.jobs, job, upload).await {
        Ok(sheets) => Ok(Json(SheetsResponse { sheets })),
        Err(e) => {
            state.record_error(&e).await;
            Err(e.into())
        }
    }
}

/// GET /api/finance/jobs
pub async fn list_jobs() -> Json<JobsResponse> {
    let jobs = catalog::all()
        .iter()
        .map(|job| JobSummary {
            id: job.id,
            mode: job.mode,
            title: job.title,
            min_files: job.min_files,
            max_files: job.max_files,
            roles: job.roles,
            params: job.params,
            output_format: job.output.format,
            sheet_listing: job.sheet_listing,
        })
        .collect();
    Json(JobsResponse { jobs })
}

/// Build finance job routes
pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/api/finance/jobs", get(list_jobs))
        .route("/api/finance/:job_id/process", post(process_job))
        .route("/api/finance/:job_id/get-sheets", post(get_sheets))
}
