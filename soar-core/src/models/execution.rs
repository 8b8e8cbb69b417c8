use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "execution_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "execution_mode", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Run,
    DryRun,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Run => write!(f, "run"),
            ExecutionMode::DryRun => write!(f, "dry_run"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlaybookExecution {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub playbook_id: Uuid,
    pub case_id: Uuid,
    pub status: ExecutionStatus,
    pub mode: ExecutionMode,
    pub started_by: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl PlaybookExecution {
    pub fn new(
        tenant_id: Uuid,
        playbook_id: Uuid,
        case_id: Uuid,
        started_by: Uuid,
        mode: ExecutionMode,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            playbook_id,
            case_id,
            status: ExecutionStatus::Running,
            mode,
            started_by,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ExecutionStatus::Running
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_seconds())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "step_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    WaitingForApproval,
    WaitingForInput,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Statuses that stamp `completed_at`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }

    pub fn is_paused(&self) -> bool {
        matches!(
            self,
            StepStatus::WaitingForApproval | StepStatus::WaitingForInput
        )
    }

    /// Forward-only: nothing returns to pending and terminal statuses are final.
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next != StepStatus::Pending
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::InProgress => write!(f, "in_progress"),
            StepStatus::WaitingForApproval => write!(f, "waiting_for_approval"),
            StepStatus::WaitingForInput => write!(f, "waiting_for_input"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Per-execution state of one template step.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionStep {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub execution_id: Uuid,
    pub step_id: Uuid,
    pub status: StepStatus,
    pub result: Option<Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionStep {
    pub fn pending(tenant_id: Uuid, execution_id: Uuid, step_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            execution_id,
            step_id,
            status: StepStatus::Pending,
            result: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// A single status change applied through the store.
#[derive(Debug, Clone)]
pub struct StepStatusChange {
    pub status: StepStatus,
    pub result: Option<Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepStatusChange {
    pub fn new(status: StepStatus, result: Option<Value>) -> Self {
        let now = Utc::now();
        Self {
            status,
            result,
            started_at: (status == StepStatus::InProgress).then_some(now),
            completed_at: status.is_terminal().then_some(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(ExecutionStatus::Running.to_string(), "running");
        assert_eq!(ExecutionMode::DryRun.to_string(), "dry_run");
        assert_eq!(
            StepStatus::WaitingForApproval.to_string(),
            "waiting_for_approval"
        );
    }

    #[test]
    fn test_execution_new() {
        let execution = PlaybookExecution::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            ExecutionMode::Run,
        );

        assert!(execution.is_running());
        assert!(execution.completed_at.is_none());
        assert!(execution.duration_seconds().is_none());
    }

    #[test]
    fn test_step_transitions() {
        assert!(StepStatus::Pending.can_transition_to(StepStatus::InProgress));
        assert!(StepStatus::WaitingForApproval.can_transition_to(StepStatus::Completed));
        assert!(StepStatus::WaitingForInput.can_transition_to(StepStatus::InProgress));
        assert!(!StepStatus::InProgress.can_transition_to(StepStatus::Pending));
        assert!(!StepStatus::Completed.can_transition_to(StepStatus::Failed));
        assert!(!StepStatus::Failed.can_transition_to(StepStatus::InProgress));
        assert!(!StepStatus::Skipped.can_transition_to(StepStatus::Completed));
    }

    #[test]
    fn test_status_change_timestamps() {
        let change = StepStatusChange::new(StepStatus::Completed, None);
        assert!(change.completed_at.is_some());
        assert!(change.started_at.is_none());

        let change = StepStatusChange::new(StepStatus::InProgress, None);
        assert!(change.started_at.is_some());
        assert!(change.completed_at.is_none());

        let change = StepStatusChange::new(StepStatus::WaitingForInput, None);
        assert!(change.completed_at.is_none());
    }
}
