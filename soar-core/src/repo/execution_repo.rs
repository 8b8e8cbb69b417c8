use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::SoarResult;
use crate::models::{ExecutionStatus, ExecutionStep, PlaybookExecution, StepStatusChange};

use super::ExecutionStore;

pub struct ExecutionRepository {
    pool: PgPool,
}

impl ExecutionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn count_running(&self, tenant_id: Uuid) -> SoarResult<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM playbook_executions WHERE tenant_id = $1 AND status = 'running'",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }
}

#[async_trait]
impl ExecutionStore for ExecutionRepository {
    async fn create_execution(
        &self,
        execution: &PlaybookExecution,
        steps: &[ExecutionStep],
    ) -> SoarResult<PlaybookExecution> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, PlaybookExecution>(
            r#"
            INSERT INTO playbook_executions
                (id, tenant_id, playbook_id, case_id, status, mode, started_by, started_at, completed_at, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, tenant_id, playbook_id, case_id, status, mode, started_by, started_at, completed_at, error
            "#,
        )
        .bind(execution.id)
        .bind(execution.tenant_id)
        .bind(execution.playbook_id)
        .bind(execution.case_id)
        .bind(execution.status)
        .bind(execution.mode)
        .bind(execution.started_by)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(&execution.error)
        .fetch_one(&mut *tx)
        .await?;

        for step in steps {
            sqlx::query(
                r#"
                INSERT INTO execution_steps
                    (id, tenant_id, execution_id, step_id, status, result, started_at, completed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(step.id)
            .bind(step.tenant_id)
            .bind(step.execution_id)
            .bind(step.step_id)
            .bind(step.status)
            .bind(&step.result)
            .bind(step.started_at)
            .bind(step.completed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(record)
    }

    async fn get_execution(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> SoarResult<Option<PlaybookExecution>> {
        let record = sqlx::query_as::<_, PlaybookExecution>(
            r#"
            SELECT id, tenant_id, playbook_id, case_id, status, mode, started_by, started_at, completed_at, error
            FROM playbook_executions
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_executions_for_case(
        &self,
        tenant_id: Uuid,
        case_id: Uuid,
    ) -> SoarResult<Vec<PlaybookExecution>> {
        let records = sqlx::query_as::<_, PlaybookExecution>(
            r#"
            SELECT id, tenant_id, playbook_id, case_id, status, mode, started_by, started_at, completed_at, error
            FROM playbook_executions
            WHERE tenant_id = $1 AND case_id = $2
            ORDER BY started_at DESC
            "#,
        )
        .bind(tenant_id)
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn finish_execution(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> SoarResult<Option<PlaybookExecution>> {
        let record = sqlx::query_as::<_, PlaybookExecution>(
            r#"
            UPDATE playbook_executions
            SET status = $3, completed_at = $4, error = $5
            WHERE tenant_id = $1 AND id = $2 AND status = 'running'
            RETURNING id, tenant_id, playbook_id, case_id, status, mode, started_by, started_at, completed_at, error
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .bind(status)
        .bind(Utc::now())
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_execution_step(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
        id: Uuid,
    ) -> SoarResult<Option<ExecutionStep>> {
        let record = sqlx::query_as::<_, ExecutionStep>(
            r#"
            SELECT id, tenant_id, execution_id, step_id, status, result, started_at, completed_at
            FROM execution_steps
            WHERE tenant_id = $1 AND execution_id = $2 AND id = $3
            "#,
        )
        .bind(tenant_id)
        .bind(execution_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_execution_steps(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> SoarResult<Vec<ExecutionStep>> {
        // Snapshot order follows the template order recorded at run time.
        let records = sqlx::query_as::<_, ExecutionStep>(
            r#"
            SELECT es.id, es.tenant_id, es.execution_id, es.step_id, es.status, es.result,
                   es.started_at, es.completed_at
            FROM execution_steps es
            LEFT JOIN playbook_steps ps ON ps.id = es.step_id
            WHERE es.tenant_id = $1 AND es.execution_id = $2
            ORDER BY ps.step_order ASC NULLS LAST, es.id
            "#,
        )
        .bind(tenant_id)
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn find_execution_step_for(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
        step_id: Uuid,
    ) -> SoarResult<Option<ExecutionStep>> {
        let record = sqlx::query_as::<_, ExecutionStep>(
            r#"
            SELECT id, tenant_id, execution_id, step_id, status, result, started_at, completed_at
            FROM execution_steps
            WHERE tenant_id = $1 AND execution_id = $2 AND step_id = $3
            "#,
        )
        .bind(tenant_id)
        .bind(execution_id)
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn update_execution_step(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        change: &StepStatusChange,
    ) -> SoarResult<Option<ExecutionStep>> {
        let record = sqlx::query_as::<_, ExecutionStep>(
            r#"
            UPDATE execution_steps
            SET status = $3,
                result = COALESCE($4, result),
                started_at = COALESCE(started_at, $5),
                completed_at = COALESCE($6, completed_at)
            WHERE tenant_id = $1 AND id = $2
              AND status NOT IN ('completed', 'failed', 'skipped')
            RETURNING id, tenant_id, execution_id, step_id, status, result, started_at, completed_at
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .bind(change.status)
        .bind(&change.result)
        .bind(change.started_at)
        .bind(change.completed_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
