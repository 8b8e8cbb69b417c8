use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::error::{SoarError, SoarResult};
use crate::models::{InputRequest, StepStatus};

use super::orchestrator::PlaybookEngine;

impl PlaybookEngine {
    /// Stores submitted data on a pending input request and completes the
    /// waiting step, resuming the cascade.
    pub async fn submit_input(
        &self,
        tenant_id: Uuid,
        input_id: Uuid,
        user_id: Uuid,
        data: Value,
    ) -> SoarResult<InputRequest> {
        let request = self
            .stores
            .inputs
            .get_input(tenant_id, input_id)
            .await?
            .ok_or(SoarError::InputRequestNotFound(input_id))?;

        if !request.is_pending() {
            return Err(SoarError::InputAlreadySubmitted(input_id));
        }
        self.load_running_execution(tenant_id, request.execution_id)
            .await?;

        let mut submitted = request;
        submitted.submit(user_id, data);
        let submitted = self
            .stores
            .inputs
            .record_submission(&submitted)
            .await?
            .ok_or(SoarError::InputAlreadySubmitted(input_id))?;

        info!(
            tenant_id = %tenant_id,
            input_id = %input_id,
            execution_id = %submitted.execution_id,
            submitted_by = %user_id,
            "Input submitted"
        );

        self.update_step_status(
            tenant_id,
            submitted.execution_id,
            submitted.step_id,
            StepStatus::Completed,
            Some(json!({
                "input_data": submitted.input_data,
                "submitted_by": submitted.submitted_by,
                "submitted_at": submitted.submitted_at,
            })),
        )
        .await?;

        Ok(submitted)
    }

    /// Pending input requests for the tenant, oldest first.
    pub async fn list_pending_inputs(&self, tenant_id: Uuid) -> SoarResult<Vec<InputRequest>> {
        self.stores.inputs.list_pending_inputs(tenant_id).await
    }
}
