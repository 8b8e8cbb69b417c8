use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use super::execution::StepStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "approval_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

impl ApprovalDecision {
    pub fn status(&self) -> ApprovalStatus {
        match self {
            ApprovalDecision::Approved => ApprovalStatus::Approved,
            ApprovalDecision::Rejected => ApprovalStatus::Rejected,
        }
    }

    /// Status the gated step moves to once the decision is recorded.
    pub fn step_status(&self) -> StepStatus {
        match self {
            ApprovalDecision::Approved => StepStatus::Completed,
            ApprovalDecision::Rejected => StepStatus::Failed,
        }
    }
}

impl std::fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.status().fmt(f)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub execution_id: Uuid,
    /// The gated execution step.
    pub step_id: Uuid,
    pub status: ApprovalStatus,
    pub details: Value,
    pub requested_at: DateTime<Utc>,
    pub decided_by: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub comments: Option<String>,
}

impl ApprovalRequest {
    pub fn new(tenant_id: Uuid, execution_id: Uuid, step_id: Uuid, details: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            execution_id,
            step_id,
            status: ApprovalStatus::Pending,
            details,
            requested_at: Utc::now(),
            decided_by: None,
            decided_at: None,
            comments: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    pub fn decide(&mut self, decision: ApprovalDecision, user_id: Uuid, comments: Option<String>) {
        self.status = decision.status();
        self.decided_by = Some(user_id);
        self.decided_at = Some(Utc::now());
        self.comments = comments;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decision_mapping() {
        assert_eq!(ApprovalDecision::Approved.status(), ApprovalStatus::Approved);
        assert_eq!(
            ApprovalDecision::Approved.step_status(),
            StepStatus::Completed
        );
        assert_eq!(ApprovalDecision::Rejected.step_status(), StepStatus::Failed);
        assert_eq!(ApprovalDecision::Rejected.to_string(), "rejected");
    }

    #[test]
    fn test_decide_records_actor() {
        let mut request =
            ApprovalRequest::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), json!({}));
        assert!(request.is_pending());

        let user = Uuid::new_v4();
        request.decide(
            ApprovalDecision::Rejected,
            user,
            Some("too risky".to_string()),
        );

        assert!(!request.is_pending());
        assert_eq!(request.status, ApprovalStatus::Rejected);
        assert_eq!(request.decided_by, Some(user));
        assert!(request.decided_at.is_some());
        assert_eq!(request.comments.as_deref(), Some("too risky"));
    }
}
