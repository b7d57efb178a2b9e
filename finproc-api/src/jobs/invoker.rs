//! Computation invoker
//!
//! Expands a job's argument template against the role assignment and runs
//! the computation script as a child process inside the workspace.
//!
//! # Process contract
//! - Program: configured interpreter, first argument the script path
//! - Working directory: the job workspace
//! - stdin closed, stdout/stderr captured in full
//! - `PYTHONIOENCODING=utf-8` so diagnostics survive non-ASCII data
//! - Child is killed if the job future is dropped or times out

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use finproc_common::ServiceConfig;

use super::catalog::{ArgPart, JobType};
use super::classifier::RoleAssignment;
use super::workspace::{Workspace, WorkspaceError};

/// Resolved scalar parameters, keyed by form field name
pub type JobParams = HashMap<&'static str, String>;

/// Problems building the command line, before anything is spawned
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("No file bound to role '{0}'")]
    MissingRole(&'static str),

    #[error("Missing required parameter '{0}'")]
    MissingParam(&'static str),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

/// Failures of the child process itself
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("Computation script not found: {}", .0.display())]
    ScriptMissing(PathBuf),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Computation did not finish within {} seconds", .0.as_secs())]
    TimedOut(Duration),

    #[error("Failed to collect computation output: {0}")]
    Wait(#[source] std::io::Error),
}

/// Fully expanded command, ready to spawn
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    /// Script path first, then the template arguments
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
    pub output_path: PathBuf,
}

/// Raw observation of a finished computation
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    /// `None` when the child was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub output_path: PathBuf,
    pub elapsed: Duration,
}

impl InvocationOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs computation scripts
#[derive(Debug, Clone)]
pub struct ComputationInvoker {
    interpreter: String,
    scripts_dir: PathBuf,
    timeout: Option<Duration>,
}

impl ComputationInvoker {
    pub fn new(interpreter: impl Into<String>, scripts_dir: PathBuf, timeout: Option<Duration>) -> Self {
        Self {
            interpreter: interpreter.into(),
            scripts_dir: absolute(scripts_dir),
            timeout,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            config.interpreter.clone(),
            config.scripts_dir.clone(),
            config.computation_timeout,
        )
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    pub fn script_path(&self, script: &str) -> PathBuf {
        self.scripts_dir.join(script)
    }

    /// Expand the job template into a concrete command line
    ///
    /// Multi-file roles used as `InputPath` are copied into the workspace
    /// `input/` directory; a single file is passed directly.
    pub async fn prepare(
        &self,
        job: &JobType,
        assignment: &RoleAssignment,
        params: &JobParams,
        workspace: &Workspace,
    ) -> Result<Invocation, PrepareError> {
        let output_path = workspace.output_path(job.output.file_name).await?;
        let mut args: Vec<OsString> = vec![self.script_path(job.invocation.script).into()];

        for part in job.invocation.args {
            match *part {
                ArgPart::Literal(text) => args.push(text.into()),
                ArgPart::Role(role) => {
                    let files = assignment.files_for(role);
                    if files.is_empty() {
                        return Err(PrepareError::MissingRole(role));
                    }
                    args.extend(files.iter().map(|f| f.path.clone().into_os_string()));
                }
                ArgPart::InputPath(role) => {
                    let files = assignment.files_for(role);
                    match files.as_slice() {
                        [] => return Err(PrepareError::MissingRole(role)),
                        [single] => args.push(single.path.clone().into()),
                        many => {
                            let dir = workspace.collect_into_input_dir(many).await?;
                            args.push(dir.into());
                        }
                    }
                }
                ArgPart::Param(name) => match params.get(name) {
                    Some(value) => args.push(value.into()),
                    None => return Err(PrepareError::MissingParam(name)),
                },
                ArgPart::OptionalParam { flag, param } => {
                    if let Some(value) = params.get(param) {
                        args.push(flag.into());
                        args.push(value.into());
                    }
                }
                ArgPart::Output => args.push(output_path.clone().into()),
            }
        }

        Ok(Invocation {
            program: self.interpreter.clone(),
            args,
            cwd: workspace.dir().to_path_buf(),
            output_path,
        })
    }

    /// Spawn the computation and wait for it
    pub async fn run(&self, invocation: &Invocation) -> Result<InvocationOutcome, InvokeError> {
        if let Some(script) = invocation.args.first() {
            let script = Path::new(script);
            if !script.exists() {
                return Err(InvokeError::ScriptMissing(script.to_path_buf()));
            }
        }

        debug!(
            program = %invocation.program,
            args = ?invocation.args,
            cwd = %invocation.cwd.display(),
            "Spawning computation"
        );

        let started = Instant::now();
        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| InvokeError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result.map_err(InvokeError::Wait)?,
                Err(_) => {
                    // Dropping the wait future drops the child, which kills it
                    warn!("Computation exceeded {}s; killed", limit.as_secs());
                    return Err(InvokeError::TimedOut(limit));
                }
            },
            None => child.wait_with_output().await.map_err(InvokeError::Wait)?,
        };

        let outcome = InvocationOutcome {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            output_path: invocation.output_path.clone(),
            elapsed: started.elapsed(),
        };

        info!(
            exit_code = ?outcome.exit_code,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            stdout_bytes = outcome.stdout.len(),
            stderr_bytes = outcome.stderr.len(),
            "Computation finished"
        );
        Ok(outcome)
    }
}

/// Scripts run with the workspace as cwd, so a relative directory must be anchored first
fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(e) => {
            warn!("Cannot resolve scripts directory {}: {}", path.display(), e);
            path
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::catalog;
    use crate::jobs::classifier::{classify, ClassifyHints};
    use crate::jobs::classifier::tests::TableInspector;
    use crate::jobs::workspace::{Upload, UploadSet, INPUT_DIR, OUTPUT_DIR};

    async fn staged_workspace(root: &Path, names: &[&str]) -> Workspace {
        let uploads = UploadSet::new(names.iter().map(|n| Upload::new(*n, b"data".to_vec())).collect());
        Workspace::stage(root, "invoker-test", &uploads, false).await.unwrap()
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[tokio::test]
    async fn test_prepare_expands_flags_in_role_order() {
        let root = tempfile::tempdir().unwrap();
        let job = catalog::lookup("books-vs-gst-reconciliation", None).unwrap();
        let workspace = staged_workspace(root.path(), &["tally_books.csv", "gstr1.xlsx"]).await;
        let assignment = classify(workspace.files(), job, &ClassifyHints::default(), &TableInspector::default());

        let invoker = ComputationInvoker::new("python3", PathBuf::from("/opt/scripts"), None);
        let invocation = invoker
            .prepare(job, &assignment, &JobParams::new(), &workspace)
            .await
            .unwrap();

        let dir = workspace.dir();
        assert_eq!(
            strings(&invocation.args),
            vec![
                "/opt/scripts/combined_gst_book_reconcile.py".to_string(),
                "--gst-input".to_string(),
                dir.join("gstr1.xlsx").display().to_string(),
                "--books-input".to_string(),
                dir.join("tally_books.csv").display().to_string(),
                "--output".to_string(),
                dir.join(OUTPUT_DIR).join("books_vs_gst_reconciliation_output.csv").display().to_string(),
            ]
        );
        assert_eq!(invocation.cwd, dir);
    }

    #[tokio::test]
    async fn test_prepare_multiple_inputs_use_input_dir() {
        let root = tempfile::tempdir().unwrap();
        let job = catalog::lookup("amazon-tax-invoice", None).unwrap();
        let workspace = staged_workspace(root.path(), &["a.pdf", "b.pdf"]).await;
        let assignment = classify(workspace.files(), job, &ClassifyHints::default(), &TableInspector::default());

        let invoker = ComputationInvoker::new("python3", PathBuf::from("/opt/scripts"), None);
        let invocation = invoker
            .prepare(job, &assignment, &JobParams::new(), &workspace)
            .await
            .unwrap();

        let args = strings(&invocation.args);
        let input_dir = workspace.dir().join(INPUT_DIR);
        assert_eq!(args[2], input_dir.display().to_string());
        assert!(input_dir.join("a.pdf").exists());
        assert!(input_dir.join("b.pdf").exists());
    }

    #[tokio::test]
    async fn test_prepare_optional_param() {
        let root = tempfile::tempdir().unwrap();
        let job = catalog::lookup("gst-file-processing", None).unwrap();
        let workspace = staged_workspace(root.path(), &["portal.xlsx"]).await;
        let assignment = classify(workspace.files(), job, &ClassifyHints::default(), &TableInspector::default());
        let invoker = ComputationInvoker::new("python3", PathBuf::from("/opt/scripts"), None);

        let without = invoker
            .prepare(job, &assignment, &JobParams::new(), &workspace)
            .await
            .unwrap();
        assert!(!strings(&without.args).contains(&"-s".to_string()));

        let mut params = JobParams::new();
        params.insert(catalog::SHEET_PARAM, "B2CS".to_string());
        let with = invoker.prepare(job, &assignment, &params, &workspace).await.unwrap();
        let args = strings(&with.args);
        assert_eq!(&args[args.len() - 2..], &["-s".to_string(), "B2CS".to_string()]);
    }

    #[tokio::test]
    async fn test_prepare_missing_required_param() {
        let root = tempfile::tempdir().unwrap();
        let job = catalog::lookup("amazon-shipping-queue", None).unwrap();
        let workspace = staged_workspace(root.path(), &["main_data.csv", "country.xlsx"]).await;
        let assignment = classify(workspace.files(), job, &ClassifyHints::default(), &TableInspector::default());
        let invoker = ComputationInvoker::new("python3", PathBuf::from("/opt/scripts"), None);

        let err = invoker
            .prepare(job, &assignment, &JobParams::new(), &workspace)
            .await
            .unwrap_err();
        assert!(matches!(err, PrepareError::MissingParam("sheetName")));
    }

    #[tokio::test]
    async fn test_run_reports_missing_script() {
        let root = tempfile::tempdir().unwrap();
        let invoker = ComputationInvoker::new("sh", root.path().to_path_buf(), None);
        let invocation = Invocation {
            program: "sh".to_string(),
            args: vec![invoker.script_path("absent.sh").into()],
            cwd: root.path().to_path_buf(),
            output_path: root.path().join("out.csv"),
        };
        assert!(matches!(
            invoker.run(&invocation).await,
            Err(InvokeError::ScriptMissing(_))
        ));
    }

    #[tokio::test]
    async fn test_run_reports_missing_interpreter() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("job.py"), "print('hi')").unwrap();
        let invoker = ComputationInvoker::new(
            "finproc-no-such-interpreter",
            root.path().to_path_buf(),
            None,
        );
        let invocation = Invocation {
            program: invoker.interpreter().to_string(),
            args: vec![invoker.script_path("job.py").into()],
            cwd: root.path().to_path_buf(),
            output_path: root.path().join("out.csv"),
        };
        assert!(matches!(
            invoker.run(&invocation).await,
            Err(InvokeError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_streams_and_cwd() {
        let root = tempfile::tempdir().unwrap();
        let script = root.path().join("job.sh");
        std::fs::write(
            &script,
            "echo \"out:$PYTHONIOENCODING\"\necho err >&2\necho done > \"$1\"\nexit 3\n",
        )
        .unwrap();

        let invoker = ComputationInvoker::new("sh", root.path().to_path_buf(), None);
        let output_path = root.path().join("result.txt");
        let invocation = Invocation {
            program: "sh".to_string(),
            args: vec![script.clone().into(), output_path.clone().into()],
            cwd: root.path().to_path_buf(),
            output_path: output_path.clone(),
        };

        let outcome = invoker.run(&invocation).await.unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.succeeded());
        assert_eq!(outcome.stdout.trim(), "out:utf-8");
        assert_eq!(outcome.stderr.trim(), "err");
        assert!(output_path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_times_out() {
        let root = tempfile::tempdir().unwrap();
        let script = root.path().join("slow.sh");
        std::fs::write(&script, "sleep 5\n").unwrap();

        let invoker = ComputationInvoker::new(
            "sh",
            root.path().to_path_buf(),
            Some(Duration::from_millis(200)),
        );
        let invocation = Invocation {
            program: "sh".to_string(),
            args: vec![script.into()],
            cwd: root.path().to_path_buf(),
            output_path: root.path().join("never.csv"),
        };

        let started = Instant::now();
        let result = invoker.run(&invocation).await;
        assert!(matches!(result, Err(InvokeError::TimedOut(_))));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
