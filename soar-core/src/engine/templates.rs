use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::{SoarError, SoarResult};
use crate::models::{PlaybookDefinition, PlaybookStep, PlaybookTemplate, PlaybookUpdate};
use crate::repo::PlaybookStore;

/// CRUD over playbook templates.
///
/// Updating with `steps` replaces the whole step set. Executions already in
/// flight keep pointing at the old template step ids.
#[derive(Clone)]
pub struct PlaybookTemplates {
    store: Arc<dyn PlaybookStore>,
}

impl PlaybookTemplates {
    pub fn new(store: Arc<dyn PlaybookStore>) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        tenant_id: Uuid,
        created_by: Option<Uuid>,
        definition: PlaybookDefinition,
    ) -> SoarResult<PlaybookTemplate> {
        definition.validate()?;
        let playbook = PlaybookTemplate::from_definition(tenant_id, created_by, definition);
        let playbook = self.store.insert_playbook(&playbook).await?;

        info!(
            tenant_id = %tenant_id,
            playbook_id = %playbook.id,
            steps = playbook.steps.len(),
            "Playbook created: {}",
            playbook.title
        );
        Ok(playbook)
    }

    pub async fn get(&self, tenant_id: Uuid, playbook_id: Uuid) -> SoarResult<PlaybookTemplate> {
        self.store
            .get_playbook(tenant_id, playbook_id)
            .await?
            .ok_or(SoarError::PlaybookNotFound(playbook_id))
    }

    pub async fn list(&self, tenant_id: Uuid) -> SoarResult<Vec<PlaybookTemplate>> {
        self.store.list_playbooks(tenant_id).await
    }

    pub async fn update(
        &self,
        tenant_id: Uuid,
        playbook_id: Uuid,
        update: PlaybookUpdate,
    ) -> SoarResult<PlaybookTemplate> {
        update.validate()?;
        let mut playbook = self.get(tenant_id, playbook_id).await?;

        if let Some(title) = update.title {
            playbook.title = title;
        }
        if update.description.is_some() {
            playbook.description = update.description;
        }
        if let Some(trigger_type) = update.trigger_type {
            playbook.trigger_type = trigger_type;
        }

        let replace_steps = update.steps.is_some();
        if let Some(steps) = update.steps {
            playbook.steps = PlaybookStep::numbered(tenant_id, playbook_id, steps);
        }

        let updated = self
            .store
            .update_playbook(&playbook, replace_steps)
            .await?
            .ok_or(SoarError::PlaybookNotFound(playbook_id))?;

        info!(
            tenant_id = %tenant_id,
            playbook_id = %playbook_id,
            replace_steps,
            "Playbook updated"
        );
        Ok(updated)
    }

    pub async fn delete(&self, tenant_id: Uuid, playbook_id: Uuid) -> SoarResult<()> {
        if !self.store.delete_playbook(tenant_id, playbook_id).await? {
            return Err(SoarError::PlaybookNotFound(playbook_id));
        }
        info!(tenant_id = %tenant_id, playbook_id = %playbook_id, "Playbook deleted");
        Ok(())
    }
}
