use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::SoarResult;
use crate::models::{Alert, Case};

use super::CaseStore;

pub struct CaseRepository {
    pool: PgPool,
}

impl CaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CaseStore for CaseRepository {
    async fn get_case(&self, tenant_id: Uuid, id: Uuid) -> SoarResult<Option<Case>> {
        let record = sqlx::query_as::<_, Case>(
            r#"
            SELECT id, tenant_id, title, description, severity, status, metadata, created_at
            FROM cases
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_alerts_for_case(
        &self,
        tenant_id: Uuid,
        case_id: Uuid,
    ) -> SoarResult<Vec<Alert>> {
        let records = sqlx::query_as::<_, Alert>(
            r#"
            SELECT id, tenant_id, case_id, title, severity, source, payload, created_at
            FROM alerts
            WHERE tenant_id = $1 AND case_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id)
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
