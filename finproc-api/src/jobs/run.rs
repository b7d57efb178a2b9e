//! Job run state machine
//!
//! A run moves STAGED → CLASSIFIED → VALIDATED → INVOKED and then into
//! exactly one terminal state. Any non-terminal state may fail directly.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::resolver::JobStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Uploads written to the workspace
    Staged,
    /// Roles bound
    Classified,
    /// Contract satisfied
    Validated,
    /// Computation running
    Invoked,
    Succeeded,
    NoFindings,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::NoFindings | JobState::Failed
        )
    }

    fn can_move_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Staged, Classified) | (Classified, Validated) | (Validated, Invoked) => true,
            (Invoked, Succeeded) | (Invoked, NoFindings) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl From<JobStatus> for JobState {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Succeeded => JobState::Succeeded,
            JobStatus::NoFindings => JobState::NoFindings,
            JobStatus::Failed => JobState::Failed,
        }
    }
}

#[derive(Debug, Error)]
#[error("Job {job_id}: illegal transition {from:?} → {to:?}")]
pub struct IllegalTransition {
    pub job_id: Uuid,
    pub from: JobState,
    pub to: JobState,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateTransition {
    pub job_id: Uuid,
    pub old_state: JobState,
    pub new_state: JobState,
    pub transitioned_at: DateTime<Utc>,
}

/// One execution of a job type
#[derive(Debug, Clone, Serialize)]
pub struct JobRun {
    pub job_id: Uuid,
    /// Job slug (`gst-reconcile-amazon`)
    pub job: String,
    pub state: JobState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl JobRun {
    /// Start a run whose uploads are already staged
    pub fn staged(job: impl Into<String>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            job: job.into(),
            state: JobState::Staged,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn transition_to(&mut self, new_state: JobState) -> Result<StateTransition, IllegalTransition> {
        if !self.state.can_move_to(new_state) {
            return Err(IllegalTransition {
                job_id: self.job_id,
                from: self.state,
                to: new_state,
            });
        }

        let transition = StateTransition {
            job_id: self.job_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;
        if new_state.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        info!(
            job_id = %self.job_id,
            job = %self.job,
            "{:?} → {:?}",
            transition.old_state,
            transition.new_state
        );
        Ok(transition)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn elapsed_ms(&self) -> i64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut run = JobRun::staged("meir");
        for state in [
            JobState::Classified,
            JobState::Validated,
            JobState::Invoked,
            JobState::Succeeded,
        ] {
            run.transition_to(state).unwrap();
        }
        assert!(run.is_terminal());
        assert!(run.ended_at.is_some());
    }

    #[test]
    fn test_terminal_state_reached_once() {
        let mut run = JobRun::staged("meir");
        run.transition_to(JobState::Failed).unwrap();
        assert!(run.transition_to(JobState::Failed).is_err());
        assert!(run.transition_to(JobState::Classified).is_err());
        assert_eq!(run.state, JobState::Failed);
    }

    #[test]
    fn test_cannot_skip_invocation() {
        let mut run = JobRun::staged("meir");
        run.transition_to(JobState::Classified).unwrap();
        let err = run.transition_to(JobState::Succeeded).unwrap_err();
        assert_eq!(err.from, JobState::Classified);
        assert_eq!(err.to, JobState::Succeeded);
    }

    #[test]
    fn test_status_maps_to_state() {
        assert_eq!(JobState::from(JobStatus::NoFindings), JobState::NoFindings);
        assert!(JobState::from(JobStatus::Failed).is_terminal());
    }
}
