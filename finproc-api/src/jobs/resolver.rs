//! Result resolution
//!
//! Turns what the computation left behind into one of three outcomes:
//! an artifact, a "nothing to report" answer, or a failure with a message
//! a person can act on.
//!
//! Precedence, for a zero exit status:
//! 1. A non-empty artifact at the expected path wins over anything printed
//! 2. A no-findings marker (job phrase or `{"status":"no_findings"}` line)
//! 3. A job rejection phrase (every input refused)
//! 4. Otherwise the run failed without producing output
//!
//! A non-zero exit is always a failure, with the diagnostic distilled from
//! stderr (falling back to stdout).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, error};

use super::catalog::{ArtifactFormat, JobType};
use super::invoker::{InvocationOutcome, InvokeError};

/// Message used when a failed computation printed nothing useful
pub const UNKNOWN_ERROR: &str = "Unknown error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    NoFindings,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Interpreter or script could not be started
    Spawn,
    TimedOut,
    NonZeroExit,
    /// Exit 0 but no artifact and no recognised explanation
    MissingArtifact,
    /// The computation refused every input
    Rejected,
}

/// Output file handed back to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub format: ArtifactFormat,
    pub download_name: String,
}

impl Artifact {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub status: JobStatus,
    pub artifact: Option<Artifact>,
    pub message: Option<String>,
    pub failure: Option<FailureKind>,
}

impl JobResult {
    fn succeeded(artifact: Artifact) -> Self {
        Self {
            status: JobStatus::Succeeded,
            artifact: Some(artifact),
            message: None,
            failure: None,
        }
    }

    fn no_findings(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::NoFindings,
            artifact: None,
            message: Some(message.into()),
            failure: None,
        }
    }

    fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            artifact: None,
            message: Some(message.into()),
            failure: Some(kind),
        }
    }
}

/// Knobs that do not belong to the job type
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Maximum characters of diagnostic text kept in a message
    pub diagnostic_limit: usize,
    pub download_name: String,
    /// Named in spawn failure messages
    pub interpreter: String,
}

/// Classify the computation's result
pub async fn resolve(
    result: Result<InvocationOutcome, InvokeError>,
    job: &JobType,
    options: &ResolveOptions,
) -> JobResult {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(InvokeError::TimedOut(limit)) => {
            return JobResult::failed(
                FailureKind::TimedOut,
                format!(
                    "Processing did not finish within {} seconds and was stopped",
                    limit.as_secs()
                ),
            )
        }
        Err(e @ InvokeError::ScriptMissing(_)) | Err(e @ InvokeError::Spawn { .. }) => {
            return JobResult::failed(
                FailureKind::Spawn,
                format!(
                    "{}. Ensure {} and the processing scripts are installed.",
                    e, options.interpreter
                ),
            )
        }
        Err(e @ InvokeError::Wait(_)) => {
            return JobResult::failed(FailureKind::NonZeroExit, e.to_string())
        }
    };

    if !outcome.succeeded() {
        let detail = diagnose(&outcome, options.diagnostic_limit)
            .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
        let status = match outcome.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        error!(
            job = %job.slug(),
            stdout = %outcome.stdout,
            stderr = %outcome.stderr,
            "Computation failed ({})",
            status
        );
        return JobResult::failed(
            FailureKind::NonZeroExit,
            format!("Processing failed: {}", detail),
        );
    }

    match tokio::fs::read(&outcome.output_path).await {
        Ok(bytes) if !bytes.is_empty() => {
            return JobResult::succeeded(Artifact {
                bytes,
                format: job.output.format,
                download_name: options.download_name.clone(),
            });
        }
        Ok(_) => debug!("Artifact {} is empty", outcome.output_path.display()),
        Err(e) => debug!("No artifact at {}: {}", outcome.output_path.display(), e),
    }

    if let Some(no_findings) = &job.no_findings {
        if no_findings.markers.iter().any(|m| outcome.stdout.contains(m)) {
            return JobResult::no_findings(no_findings.message);
        }
    }
    if let Some(message) = no_findings_sentinel(&outcome.stdout) {
        let message = message
            .or_else(|| job.no_findings.map(|n| n.message.to_string()))
            .unwrap_or_else(|| "Nothing to report for these files.".to_string());
        return JobResult::no_findings(message);
    }

    if let Some(rejection) = &job.rejection {
        let printed = |m: &&str| outcome.stdout.contains(*m) || outcome.stderr.contains(*m);
        if rejection.markers.iter().any(printed) {
            return JobResult::failed(FailureKind::Rejected, rejection.message);
        }
    }

    let message = match diagnose(&outcome, options.diagnostic_limit) {
        Some(detail) => format!("Output file was not created. {}", detail),
        None => "Output file was not created.".to_string(),
    };
    JobResult::failed(FailureKind::MissingArtifact, message)
}

/// `{"status":"no_findings"}` on its own stdout line; yields its `message` if any
fn no_findings_sentinel(stdout: &str) -> Option<Option<String>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .find(|value| value.get("status").and_then(|s| s.as_str()) == Some("no_findings"))
        .map(|value| {
            value
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
}

struct FailureSignature {
    pattern: Regex,
    render: fn(&regex::Captures<'_>) -> String,
}

static FAILURE_SIGNATURES: Lazy<Vec<FailureSignature>> = Lazy::new(|| {
    let signature = |pattern: &str, render: fn(&regex::Captures<'_>) -> String| FailureSignature {
        pattern: Regex::new(pattern).expect("failure signature pattern must compile"),
        render,
    };
    vec![
        signature(r#"Worksheet(?: named)? '?"?([^'"]+?)'?"? not found"#, |c| {
            format!("Worksheet '{}' was not found in the uploaded workbook", &c[1])
        }),
        signature(r"ModuleNotFoundError: No module named '([^']+)'", |c| {
            format!(
                "The processing environment is missing the Python module '{}'",
                &c[1]
            )
        }),
        signature(r"KeyError: '([^']+)'", |c| {
            format!("Required column '{}' is missing from an uploaded file", &c[1])
        }),
        signature(r"FileNotFoundError: .*?'([^']+)'", |c| {
            format!("File not found: {}", &c[1])
        }),
    ]
});

/// Best human-readable explanation of a failed run
///
/// A recognised failure signature becomes a friendly sentence; otherwise
/// the tail of stderr (or stdout when stderr is blank), bounded by `limit`.
pub fn diagnose(outcome: &InvocationOutcome, limit: usize) -> Option<String> {
    for text in [&outcome.stderr, &outcome.stdout] {
        for signature in FAILURE_SIGNATURES.iter() {
            if let Some(captures) = signature.pattern.captures(text) {
                return Some((signature.render)(&captures));
            }
        }
    }

    [&outcome.stderr, &outcome.stdout]
        .into_iter()
        .map(|text| text.trim())
        .find(|text| !text.is_empty())
        .map(|text| tail_chars(text, limit))
}

/// Last `limit` characters of `text`, never splitting a code point
pub fn tail_chars(text: &str, limit: usize) -> String {
    let count = text.chars().count();
    if count <= limit {
        return text.to_string();
    }
    let skip = count - limit;
    match text.char_indices().nth(skip) {
        Some((offset, _)) => format!("…{}", &text[offset..]),
        None => String::new(),
    }
}
