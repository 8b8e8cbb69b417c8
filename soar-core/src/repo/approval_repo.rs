use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{SoarError, SoarResult};
use crate::models::ApprovalRequest;

use super::ApprovalStore;

pub struct ApprovalRepository {
    pool: PgPool,
}

impl ApprovalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_pending(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
        step_id: Uuid,
    ) -> SoarResult<Option<ApprovalRequest>> {
        let record = sqlx::query_as::<_, ApprovalRequest>(
            r#"
            SELECT id, tenant_id, execution_id, step_id, status, details, requested_at,
                   decided_by, decided_at, comments
            FROM approval_requests
            WHERE tenant_id = $1 AND execution_id = $2 AND step_id = $3 AND status = 'pending'
            "#,
        )
        .bind(tenant_id)
        .bind(execution_id)
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}

#[async_trait]
impl ApprovalStore for ApprovalRepository {
    async fn create_approval_if_absent(
        &self,
        request: &ApprovalRequest,
    ) -> SoarResult<(ApprovalRequest, bool)> {
        let inserted = sqlx::query_as::<_, ApprovalRequest>(
            r#"
            INSERT INTO approval_requests
                (id, tenant_id, execution_id, step_id, status, details, requested_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (execution_id, step_id) WHERE status = 'pending' DO NOTHING
            RETURNING id, tenant_id, execution_id, step_id, status, details, requested_at,
                      decided_by, decided_at, comments
            "#,
        )
        .bind(request.id)
        .bind(request.tenant_id)
        .bind(request.execution_id)
        .bind(request.step_id)
        .bind(request.status)
        .bind(&request.details)
        .bind(request.requested_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = inserted {
            return Ok((record, true));
        }

        match self
            .find_pending(request.tenant_id, request.execution_id, request.step_id)
            .await?
        {
            Some(existing) => Ok((existing, false)),
            // The conflicting row was decided between the insert and the lookup.
            None => Err(SoarError::UniqueViolation(format!(
                "approval request for step {} changed concurrently",
                request.step_id
            ))),
        }
    }

    async fn get_approval(&self, tenant_id: Uuid, id: Uuid) -> SoarResult<Option<ApprovalRequest>> {
        let record = sqlx::query_as::<_, ApprovalRequest>(
            r#"
            SELECT id, tenant_id, execution_id, step_id, status, details, requested_at,
                   decided_by, decided_at, comments
            FROM approval_requests
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_pending_approvals(&self, tenant_id: Uuid) -> SoarResult<Vec<ApprovalRequest>> {
        let records = sqlx::query_as::<_, ApprovalRequest>(
            r#"
            SELECT id, tenant_id, execution_id, step_id, status, details, requested_at,
                   decided_by, decided_at, comments
            FROM approval_requests
            WHERE tenant_id = $1 AND status = 'pending'
            ORDER BY requested_at ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn record_decision(
        &self,
        request: &ApprovalRequest,
    ) -> SoarResult<Option<ApprovalRequest>> {
        let record = sqlx::query_as::<_, ApprovalRequest>(
            r#"
            UPDATE approval_requests
            SET status = $3, decided_by = $4, decided_at = $5, comments = $6
            WHERE tenant_id = $1 AND id = $2 AND status = 'pending'
            RETURNING id, tenant_id, execution_id, step_id, status, details, requested_at,
                      decided_by, decided_at, comments
            "#,
        )
        .bind(request.tenant_id)
        .bind(request.id)
        .bind(request.status)
        .bind(request.decided_by)
        .bind(request.decided_at)
        .bind(&request.comments)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
