use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::SoarResult;
use crate::models::{PlaybookStep, PlaybookTemplate};

use super::PlaybookStore;

const STEP_COLUMNS: &str =
    "id, tenant_id, playbook_id, step_order, name, step_type, action_id, config";

pub struct PlaybookRepository {
    pool: PgPool,
}

impl PlaybookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_steps(
        tx: &mut Transaction<'_, Postgres>,
        steps: &[PlaybookStep],
    ) -> SoarResult<()> {
        for step in steps {
            sqlx::query(
                r#"
                INSERT INTO playbook_steps
                    (id, tenant_id, playbook_id, step_order, name, step_type, action_id, config)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(step.id)
            .bind(step.tenant_id)
            .bind(step.playbook_id)
            .bind(step.order)
            .bind(&step.name)
            .bind(step.step_type)
            .bind(&step.action_id)
            .bind(&step.config)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn steps_for(&self, tenant_id: Uuid, playbook_id: Uuid) -> SoarResult<Vec<PlaybookStep>> {
        let records = sqlx::query_as::<_, PlaybookStep>(&format!(
            "SELECT {STEP_COLUMNS} FROM playbook_steps \
             WHERE tenant_id = $1 AND playbook_id = $2 ORDER BY step_order ASC"
        ))
        .bind(tenant_id)
        .bind(playbook_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn count(&self, tenant_id: Uuid) -> SoarResult<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM playbooks WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}

#[async_trait]
impl PlaybookStore for PlaybookRepository {
    async fn insert_playbook(&self, playbook: &PlaybookTemplate) -> SoarResult<PlaybookTemplate> {
        let mut tx = self.pool.begin().await?;

        let mut record = sqlx::query_as::<_, PlaybookTemplate>(
            r#"
            INSERT INTO playbooks
                (id, tenant_id, title, description, trigger_type, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, tenant_id, title, description, trigger_type, created_by, created_at, updated_at
            "#,
        )
        .bind(playbook.id)
        .bind(playbook.tenant_id)
        .bind(&playbook.title)
        .bind(&playbook.description)
        .bind(playbook.trigger_type)
        .bind(playbook.created_by)
        .bind(playbook.created_at)
        .bind(playbook.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        Self::insert_steps(&mut tx, &playbook.steps).await?;
        tx.commit().await?;

        record.steps = playbook.steps.clone();
        Ok(record)
    }

    async fn get_playbook(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> SoarResult<Option<PlaybookTemplate>> {
        let record = sqlx::query_as::<_, PlaybookTemplate>(
            r#"
            SELECT id, tenant_id, title, description, trigger_type, created_by, created_at, updated_at
            FROM playbooks
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match record {
            Some(mut playbook) => {
                playbook.steps = self.steps_for(tenant_id, id).await?;
                Ok(Some(playbook))
            }
            None => Ok(None),
        }
    }

    async fn list_playbooks(&self, tenant_id: Uuid) -> SoarResult<Vec<PlaybookTemplate>> {
        let mut records = sqlx::query_as::<_, PlaybookTemplate>(
            r#"
            SELECT id, tenant_id, title, description, trigger_type, created_by, created_at, updated_at
            FROM playbooks
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        let steps = sqlx::query_as::<_, PlaybookStep>(&format!(
            "SELECT {STEP_COLUMNS} FROM playbook_steps \
             WHERE tenant_id = $1 ORDER BY playbook_id, step_order ASC"
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_playbook: HashMap<Uuid, Vec<PlaybookStep>> = HashMap::new();
        for step in steps {
            by_playbook.entry(step.playbook_id).or_default().push(step);
        }
        for playbook in &mut records {
            playbook.steps = by_playbook.remove(&playbook.id).unwrap_or_default();
        }

        Ok(records)
    }

    async fn update_playbook(
        &self,
        playbook: &PlaybookTemplate,
        replace_steps: bool,
    ) -> SoarResult<Option<PlaybookTemplate>> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, PlaybookTemplate>(
            r#"
            UPDATE playbooks
            SET title = $3, description = $4, trigger_type = $5, updated_at = $6
            WHERE tenant_id = $1 AND id = $2
            RETURNING id, tenant_id, title, description, trigger_type, created_by, created_at, updated_at
            "#,
        )
        .bind(playbook.tenant_id)
        .bind(playbook.id)
        .bind(&playbook.title)
        .bind(&playbook.description)
        .bind(playbook.trigger_type)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut record) = record else {
            tx.rollback().await?;
            return Ok(None);
        };

        if replace_steps {
            sqlx::query("DELETE FROM playbook_steps WHERE tenant_id = $1 AND playbook_id = $2")
                .bind(playbook.tenant_id)
                .bind(playbook.id)
                .execute(&mut *tx)
                .await?;
            Self::insert_steps(&mut tx, &playbook.steps).await?;
        }

        tx.commit().await?;

        record.steps = self.steps_for(playbook.tenant_id, playbook.id).await?;
        Ok(Some(record))
    }

    async fn delete_playbook(&self, tenant_id: Uuid, id: Uuid) -> SoarResult<bool> {
        let result = sqlx::query("DELETE FROM playbooks WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_step(&self, tenant_id: Uuid, step_id: Uuid) -> SoarResult<Option<PlaybookStep>> {
        let record = sqlx::query_as::<_, PlaybookStep>(&format!(
            "SELECT {STEP_COLUMNS} FROM playbook_steps WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_step_by_order(
        &self,
        tenant_id: Uuid,
        playbook_id: Uuid,
        order: i32,
    ) -> SoarResult<Option<PlaybookStep>> {
        let record = sqlx::query_as::<_, PlaybookStep>(&format!(
            "SELECT {STEP_COLUMNS} FROM playbook_steps \
             WHERE tenant_id = $1 AND playbook_id = $2 AND step_order = $3"
        ))
        .bind(tenant_id)
        .bind(playbook_id)
        .bind(order)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
