//! Finance job orchestration
//!
//! Stages uploads, binds them to job roles, checks the job contract, runs
//! the computation script and turns its output into a response.

pub mod catalog;
pub mod classifier;
pub mod contract;
pub mod invoker;
pub mod pipeline;
pub mod resolver;
pub mod run;
pub mod sheets;
pub mod workspace;

pub use catalog::JobType;
pub use pipeline::{list_sheets, run_job, JobContext, JobError, JobOutput, JobRequest};
pub use sheets::{SheetInspector, WorkbookInspector};
pub use workspace::{Upload, UploadSet};
