use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{SoarError, SoarResult};
use crate::models::InputRequest;

use super::InputRequestStore;

pub struct InputRepository {
    pool: PgPool,
}

impl InputRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InputRequestStore for InputRepository {
    async fn create_input_if_absent(
        &self,
        request: &InputRequest,
    ) -> SoarResult<(InputRequest, bool)> {
        let inserted = sqlx::query_as::<_, InputRequest>(
            r#"
            INSERT INTO input_requests
                (id, tenant_id, execution_id, step_id, status, prompt, input_schema, requested_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (execution_id, step_id) WHERE status = 'pending' DO NOTHING
            RETURNING id, tenant_id, execution_id, step_id, status, prompt, input_schema,
                      requested_at, submitted_by, submitted_at, input_data
            "#,
        )
        .bind(request.id)
        .bind(request.tenant_id)
        .bind(request.execution_id)
        .bind(request.step_id)
        .bind(request.status)
        .bind(&request.prompt)
        .bind(&request.input_schema)
        .bind(request.requested_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = inserted {
            return Ok((record, true));
        }

        let existing = sqlx::query_as::<_, InputRequest>(
            r#"
            SELECT id, tenant_id, execution_id, step_id, status, prompt, input_schema,
                   requested_at, submitted_by, submitted_at, input_data
            FROM input_requests
            WHERE tenant_id = $1 AND execution_id = $2 AND step_id = $3 AND status = 'pending'
            "#,
        )
        .bind(request.tenant_id)
        .bind(request.execution_id)
        .bind(request.step_id)
        .fetch_optional(&self.pool)
        .await?;

        existing.map(|record| (record, false)).ok_or_else(|| {
            SoarError::UniqueViolation(format!(
                "input request for step {} changed concurrently",
                request.step_id
            ))
        })
    }

    async fn get_input(&self, tenant_id: Uuid, id: Uuid) -> SoarResult<Option<InputRequest>> {
        let record = sqlx::query_as::<_, InputRequest>(
            r#"
            SELECT id, tenant_id, execution_id, step_id, status, prompt, input_schema,
                   requested_at, submitted_by, submitted_at, input_data
            FROM input_requests
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_pending_inputs(&self, tenant_id: Uuid) -> SoarResult<Vec<InputRequest>> {
        let records = sqlx::query_as::<_, InputRequest>(
            r#"
            SELECT id, tenant_id, execution_id, step_id, status, prompt, input_schema,
                   requested_at, submitted_by, submitted_at, input_data
            FROM input_requests
            WHERE tenant_id = $1 AND status = 'pending'
            ORDER BY requested_at ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn record_submission(&self, request: &InputRequest) -> SoarResult<Option<InputRequest>> {
        let record = sqlx::query_as::<_, InputRequest>(
            r#"
            UPDATE input_requests
            SET status = $3, submitted_by = $4, submitted_at = $5, input_data = $6
            WHERE tenant_id = $1 AND id = $2 AND status = 'pending'
            RETURNING id, tenant_id, execution_id, step_id, status, prompt, input_schema,
                      requested_at, submitted_by, submitted_at, input_data
            "#,
        )
        .bind(request.tenant_id)
        .bind(request.id)
        .bind(request.status)
        .bind(request.submitted_by)
        .bind(request.submitted_at)
        .bind(&request.input_data)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
