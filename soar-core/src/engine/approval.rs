use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::{SoarError, SoarResult};
use crate::models::{ApprovalDecision, ApprovalRequest};

use super::orchestrator::PlaybookEngine;

impl PlaybookEngine {
    /// Records a decision on a pending approval and moves the gated step to
    /// `completed` or `failed`. A rejection fails the execution.
    pub async fn decide(
        &self,
        tenant_id: Uuid,
        approval_id: Uuid,
        user_id: Uuid,
        decision: ApprovalDecision,
        comments: Option<String>,
    ) -> SoarResult<ApprovalRequest> {
        let request = self
            .stores
            .approvals
            .get_approval(tenant_id, approval_id)
            .await?
            .ok_or(SoarError::ApprovalNotFound(approval_id))?;

        if !request.is_pending() {
            return Err(SoarError::ApprovalAlreadyDecided(approval_id));
        }
        self.load_running_execution(tenant_id, request.execution_id)
            .await?;

        let mut decided = request;
        decided.decide(decision, user_id, comments);
        let decided = self
            .stores
            .approvals
            .record_decision(&decided)
            .await?
            .ok_or(SoarError::ApprovalAlreadyDecided(approval_id))?;

        info!(
            tenant_id = %tenant_id,
            approval_id = %approval_id,
            execution_id = %decided.execution_id,
            decision = %decision,
            decided_by = %user_id,
            "Approval decided"
        );

        let mut result = json!({
            "approval_id": decided.id,
            "decision": decision,
            "decided_by": decided.decided_by,
            "decided_at": decided.decided_at,
            "comments": decided.comments,
        });
        if decision == ApprovalDecision::Rejected {
            result["error"] = json!(format!("approval {approval_id} rejected"));
        }

        self.update_step_status(
            tenant_id,
            decided.execution_id,
            decided.step_id,
            decision.step_status(),
            Some(result),
        )
        .await?;

        Ok(decided)
    }

    /// Pending approvals for the tenant, oldest first.
    pub async fn list_pending_approvals(&self, tenant_id: Uuid) -> SoarResult<Vec<ApprovalRequest>> {
        self.stores.approvals.list_pending_approvals(tenant_id).await
    }

    pub async fn get_approval(&self, tenant_id: Uuid, approval_id: Uuid) -> SoarResult<ApprovalRequest> {
        self.stores
            .approvals
            .get_approval(tenant_id, approval_id)
            .await?
            .ok_or(SoarError::ApprovalNotFound(approval_id))
    }
}
