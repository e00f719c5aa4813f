use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::{TaskPayload, TaskType};

/// Lifecycle state of a queued job.
///
/// Legal transitions: waiting → active → {completed | failed}, and
/// waiting → delayed → waiting. `NotFound` is a reporting-only state for
/// lookups of unknown ids; no stored job ever carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
    NotFound,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Delayed => "delayed",
            JobState::NotFound => "not_found",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued, trackable instance of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub task_type: TaskType,
    pub data: TaskPayload,
    pub priority: i32,
    pub state: JobState,
    pub enqueued_at: DateTime<Utc>,
    /// When a worker picked the job up.
    pub processed_at: Option<DateTime<Utc>>,
    /// When the job reached a finished state.
    pub finished_at: Option<DateTime<Utc>>,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub failed_reason: Option<String>,
    /// Instant at which a delayed job becomes visible.
    pub visible_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(task_type: TaskType, data: TaskPayload, priority: i32, max_attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type,
            data,
            priority,
            state: JobState::Waiting,
            enqueued_at: Utc::now(),
            processed_at: None,
            finished_at: None,
            attempts_made: 0,
            max_attempts,
            failed_reason: None,
            visible_at: None,
        }
    }

    /// Age of the job relative to `now`, measured from enqueue.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.enqueued_at
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }
}

/// Read-only answer to a status lookup; never an error.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusReport {
    pub id: Uuid,
    pub status: JobState,
    pub data: Option<TaskPayload>,
}

impl JobStatusReport {
    pub fn not_found(id: Uuid) -> Self {
        Self {
            id,
            status: JobState::NotFound,
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_starts_waiting() {
        let job = Job::new(TaskType::LiveMatches, TaskPayload::live(), 100, 3);
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.attempts_made, 0);
        assert!(job.failed_reason.is_none());
        assert!(!job.is_finished());
    }

    #[test]
    fn test_job_state_wire_names() {
        assert_eq!(JobState::Waiting.as_str(), "waiting");
        assert_eq!(JobState::NotFound.as_str(), "not_found");
        let encoded = serde_json::to_string(&JobState::NotFound).unwrap();
        assert_eq!(encoded, "\"not_found\"");
    }

    #[test]
    fn test_not_found_report_has_no_data() {
        let id = Uuid::new_v4();
        let report = JobStatusReport::not_found(id);
        assert_eq!(report.status, JobState::NotFound);
        assert!(report.data.is_none());
    }
}
