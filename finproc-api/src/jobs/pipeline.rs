//! Job pipeline
//!
//! Drives one request through staging, classification, validation,
//! invocation and resolution. The workspace lives exactly as long as
//! `run_job`, so it is removed on every exit path.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use finproc_common::ServiceConfig;

use super::catalog::{JobType, LookupError, ParamDefault};
use super::classifier::{classify, ClassifyHints, RoleAssignment};
use super::contract::{self, ContractError, ExtensionMismatch};
use super::invoker::{ComputationInvoker, JobParams, PrepareError};
use super::resolver::{self, Artifact, FailureKind, JobResult, JobStatus, ResolveOptions};
use super::run::{IllegalTransition, JobRun, JobState};
use super::sheets::{SheetError, SheetInspector};
use super::workspace::{sanitize_file_name, Upload, UploadSet, Workspace, WorkspaceError};

/// Extensions accepted by the worksheet listing
const SHEET_LISTING_EXTENSIONS: &[&str] = &["xlsx", "xls"];

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Invalid mode for {job}. Expected one of: {}", .valid.join(", "))]
    InvalidMode {
        job: &'static str,
        valid: Vec<&'static str>,
    },

    #[error("{0} does not offer worksheet listing")]
    NoSheetListing(&'static str),

    #[error("Missing required field '{0}'")]
    MissingParameter(&'static str),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Sheets(#[from] SheetError),

    #[error("{0}")]
    ComputationSpawn(String),

    #[error("{0}")]
    ComputationFailed(String),

    #[error("{0}")]
    ComputationTimeout(String),

    #[error("{0}")]
    InputRejected(String),

    #[error("{0}")]
    Internal(String),
}

impl From<LookupError> for JobError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::UnknownJob(id) => JobError::UnknownJob(id),
            LookupError::InvalidMode { job, valid } => JobError::InvalidMode { job, valid },
        }
    }
}

impl From<IllegalTransition> for JobError {
    fn from(err: IllegalTransition) -> Self {
        JobError::Internal(err.to_string())
    }
}

impl From<PrepareError> for JobError {
    fn from(err: PrepareError) -> Self {
        match err {
            PrepareError::MissingParam(name) => JobError::MissingParameter(name),
            PrepareError::Workspace(e) => JobError::Workspace(e),
            e @ PrepareError::MissingRole(_) => JobError::Internal(e.to_string()),
        }
    }
}

/// Successful ends of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutput {
    Artifact(Artifact),
    NoFindings(String),
}

impl JobResult {
    /// Fold the resolver's verdict into the service's error taxonomy
    pub fn into_output(self) -> Result<JobOutput, JobError> {
        let message = self.message.unwrap_or_else(|| resolver::UNKNOWN_ERROR.to_string());
        match (self.status, self.artifact, self.failure) {
            (JobStatus::Succeeded, Some(artifact), _) => Ok(JobOutput::Artifact(artifact)),
            (JobStatus::Succeeded, None, _) => {
                Err(JobError::Internal("Succeeded without an artifact".to_string()))
            }
            (JobStatus::NoFindings, _, _) => Ok(JobOutput::NoFindings(message)),
            (JobStatus::Failed, _, Some(FailureKind::Spawn)) => {
                Err(JobError::ComputationSpawn(message))
            }
            (JobStatus::Failed, _, Some(FailureKind::TimedOut)) => {
                Err(JobError::ComputationTimeout(message))
            }
            (JobStatus::Failed, _, Some(FailureKind::Rejected)) => {
                Err(JobError::InputRejected(message))
            }
            (JobStatus::Failed, _, _) => Err(JobError::ComputationFailed(message)),
        }
    }
}

/// Shared collaborators for every job
#[derive(Clone)]
pub struct JobContext {
    pub config: Arc<ServiceConfig>,
    pub inspector: Arc<dyn SheetInspector>,
    pub invoker: ComputationInvoker,
    /// Bounds concurrent jobs when configured
    pub limiter: Option<Arc<Semaphore>>,
}

impl JobContext {
    pub fn new(config: Arc<ServiceConfig>, inspector: Arc<dyn SheetInspector>) -> Self {
        let invoker = ComputationInvoker::from_config(&config);
        let limiter = config
            .max_concurrent_jobs
            .map(|n| Arc::new(Semaphore::new(n)));
        Self {
            config,
            inspector,
            invoker,
            limiter,
        }
    }
}

/// Parsed request: ordered uploads plus text fields
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    pub uploads: UploadSet,
    pub fields: HashMap<String, String>,
}

/// Run one job end to end
pub async fn run_job(
    ctx: &JobContext,
    job: &'static JobType,
    request: JobRequest,
) -> Result<JobOutput, JobError> {
    let _permit = match &ctx.limiter {
        Some(limiter) => Some(
            limiter
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| JobError::Internal("Job limiter closed".to_string()))?,
        ),
        None => None,
    };

    let (uploads, skipped) = contract::filter_foreign(request.uploads, job);
    if uploads.is_empty() && !skipped.is_empty() {
        return Err(ContractError::all_skipped(&skipped, job).into());
    }
    contract::precheck(&uploads, job)?;
    let mut params = explicit_params(job, &request.fields)?;

    let workspace = Workspace::stage(
        &ctx.config.workspace_root,
        &job.slug(),
        &uploads,
        ctx.config.keep_workspaces,
    )
    .await?;
    let mut run = JobRun::staged(job.slug());
    info!(
        job_id = %run.job_id,
        job = %run.job,
        files = uploads.len(),
        workspace = %workspace.dir().display(),
        "Job staged"
    );

    let assignment = {
        let files = workspace.files().to_vec();
        let hints = ClassifyHints::from_fields(&request.fields);
        let inspector = Arc::clone(&ctx.inspector);
        // Sniffing opens workbooks; keep it off the async workers
        tokio::task::spawn_blocking(move || classify(&files, job, &hints, inspector.as_ref()))
            .await
            .map_err(|e| JobError::Internal(format!("Classification task failed: {}", e)))?
    };
    run.transition_to(JobState::Classified)?;

    if let Err(e) = contract::validate(&assignment, job) {
        return Err(fail(&mut run, e.into()));
    }
    run.transition_to(JobState::Validated)?;

    if let Err(e) = fill_defaults(ctx, job, &assignment, &mut params).await {
        return Err(fail(&mut run, e));
    }

    let invocation = match ctx
        .invoker
        .prepare(job, &assignment, &params, &workspace)
        .await
    {
        Ok(invocation) => invocation,
        Err(e) => return Err(fail(&mut run, e.into())),
    };
    run.transition_to(JobState::Invoked)?;

    let outcome = ctx.invoker.run(&invocation).await;
    let options = ResolveOptions {
        diagnostic_limit: ctx.config.diagnostic_limit,
        download_name: download_name(job, &params),
        interpreter: ctx.invoker.interpreter().to_string(),
    };
    let result = resolver::resolve(outcome, job, &options).await;
    run.transition_to(result.status.into())?;

    info!(
        job_id = %run.job_id,
        job = %run.job,
        state = ?run.state,
        elapsed_ms = run.elapsed_ms(),
        "Job finished"
    );
    result.into_output()
}

/// Mark the run failed and hand the error back
fn fail(run: &mut JobRun, err: JobError) -> JobError {
    if let Err(e) = run.transition_to(JobState::Failed) {
        warn!("{}", e);
    }
    warn!(job_id = %run.job_id, job = %run.job, "Job failed: {}", err);
    err
}

/// Parameters supplied by the client; required ones must be present
fn explicit_params(
    job: &JobType,
    fields: &HashMap<String, String>,
) -> Result<JobParams, JobError> {
    let mut params = JobParams::new();
    for spec in job.params {
        let value = fields
            .get(spec.name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty());
        match value {
            Some(value) => {
                params.insert(spec.name, value.to_string());
            }
            None if spec.required => return Err(JobError::MissingParameter(spec.name)),
            None => {}
        }
    }
    Ok(params)
}

/// Fill optional parameters that default from an uploaded workbook
async fn fill_defaults(
    ctx: &JobContext,
    job: &JobType,
    assignment: &RoleAssignment,
    params: &mut JobParams,
) -> Result<(), JobError> {
    for spec in job.params {
        if params.contains_key(spec.name) {
            continue;
        }
        if let ParamDefault::FirstSheetOf { role, fallback } = spec.default {
            let path = assignment.files_for(role).first().map(|f| f.path.clone());
            let inspector = Arc::clone(&ctx.inspector);
            let first = tokio::task::spawn_blocking(move || {
                path.and_then(|p| match inspector.sheet_names(&p) {
                    Ok(names) => names.into_iter().next(),
                    Err(e) => {
                        warn!("Could not list sheets for default: {}", e);
                        None
                    }
                })
            })
            .await
            .map_err(|e| JobError::Internal(format!("Sheet lookup task failed: {}", e)))?;

            let value = first.unwrap_or_else(|| fallback.to_string());
            info!("{}: defaulting {} to {:?}", job.slug(), spec.name, value);
            params.insert(spec.name, value);
        }
    }
    Ok(())
}

/// `<prefix>_<millis>.<ext>`, with `{sheetName}` filled from the parameters
pub fn download_name(job: &JobType, params: &JobParams) -> String {
    let mut prefix = job.output.download_prefix.to_string();
    for (name, value) in params {
        let placeholder = format!("{{{}}}", name);
        if prefix.contains(&placeholder) {
            let value: String = sanitize_file_name(value, 0)
                .chars()
                .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
                .collect();
            prefix = prefix.replace(&placeholder, &value);
        }
    }
    format!(
        "{}_{}.{}",
        prefix,
        finproc_common::time::unix_millis(),
        job.output.format.extension()
    )
}

/// List worksheet names of one uploaded workbook
pub async fn list_sheets(
    ctx: &JobContext,
    job: &'static JobType,
    upload: Upload,
) -> Result<Vec<String>, JobError> {
    if !job.sheet_listing {
        return Err(JobError::NoSheetListing(job.id));
    }

    let extension = upload.extension();
    if !SHEET_LISTING_EXTENSIONS.contains(&extension.as_str()) {
        let mut error = ContractError::default();
        error.extension_mismatches.push(ExtensionMismatch {
            file: sanitize_file_name(&upload.original_name, 0),
            role: None,
            extension,
            allowed: SHEET_LISTING_EXTENSIONS.to_vec(),
        });
        return Err(error.into());
    }

    let mut workspace = Workspace::create(
        &ctx.config.workspace_root,
        &format!("{}-sheets", job.id),
        ctx.config.keep_workspaces,
    )
    .await?;
    let staged = workspace.write_upload(0, &upload).await?;

    let inspector = Arc::clone(&ctx.inspector);
    let sheets = tokio::task::spawn_blocking(move || inspector.sheet_names(&staged.path))
        .await
        .map_err(|e| JobError::Internal(format!("Sheet listing task failed: {}", e)))??;

    info!("{}: {} worksheet(s) in {}", job.id, sheets.len(), upload.original_name);
    Ok(sheets)
}
