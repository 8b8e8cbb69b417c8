use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::SoarResult;
use crate::models::{
    Alert, ApprovalRequest, Case, ExecutionStatus, ExecutionStep, InputRequest, PlaybookExecution,
    PlaybookStep, PlaybookTemplate, StepStatusChange,
};

use super::{ApprovalStore, CaseStore, ExecutionStore, InputRequestStore, PlaybookStore};

#[derive(Default)]
struct MemoryState {
    playbooks: HashMap<Uuid, PlaybookTemplate>,
    executions: HashMap<Uuid, PlaybookExecution>,
    execution_steps: Vec<ExecutionStep>,
    approvals: Vec<ApprovalRequest>,
    inputs: Vec<InputRequest>,
    cases: HashMap<Uuid, Case>,
    alerts: Vec<Alert>,
}

/// Process-local implementation of every store trait.
///
/// All state sits behind one lock, so check-then-insert operations such as
/// [`ApprovalStore::create_approval_if_absent`] are atomic.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_case(&self, case: Case) {
        self.state.write().await.cases.insert(case.id, case);
    }

    pub async fn add_alert(&self, alert: Alert) {
        self.state.write().await.alerts.push(alert);
    }
}

#[async_trait]
impl PlaybookStore for InMemoryStore {
    async fn insert_playbook(&self, playbook: &PlaybookTemplate) -> SoarResult<PlaybookTemplate> {
        let mut state = self.state.write().await;
        let mut record = playbook.clone();
        record.steps.sort_by_key(|s| s.order);
        state.playbooks.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_playbook(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> SoarResult<Option<PlaybookTemplate>> {
        let state = self.state.read().await;
        Ok(state
            .playbooks
            .get(&id)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_playbooks(&self, tenant_id: Uuid) -> SoarResult<Vec<PlaybookTemplate>> {
        let state = self.state.read().await;
        let mut records: Vec<PlaybookTemplate> = state
            .playbooks
            .values()
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn update_playbook(
        &self,
        playbook: &PlaybookTemplate,
        replace_steps: bool,
    ) -> SoarResult<Option<PlaybookTemplate>> {
        let mut state = self.state.write().await;
        let Some(existing) = state
            .playbooks
            .get_mut(&playbook.id)
            .filter(|p| p.tenant_id == playbook.tenant_id)
        else {
            return Ok(None);
        };

        existing.title = playbook.title.clone();
        existing.description = playbook.description.clone();
        existing.trigger_type = playbook.trigger_type;
        existing.updated_at = Utc::now();
        if replace_steps {
            existing.steps = playbook.steps.clone();
            existing.steps.sort_by_key(|s| s.order);
        }

        Ok(Some(existing.clone()))
    }

    async fn delete_playbook(&self, tenant_id: Uuid, id: Uuid) -> SoarResult<bool> {
        let mut state = self.state.write().await;
        let owned = state
            .playbooks
            .get(&id)
            .is_some_and(|p| p.tenant_id == tenant_id);
        if owned {
            state.playbooks.remove(&id);
        }
        Ok(owned)
    }

    async fn get_step(&self, tenant_id: Uuid, step_id: Uuid) -> SoarResult<Option<PlaybookStep>> {
        let state = self.state.read().await;
        Ok(state
            .playbooks
            .values()
            .filter(|p| p.tenant_id == tenant_id)
            .flat_map(|p| p.steps.iter())
            .find(|s| s.id == step_id)
            .cloned())
    }

    async fn get_step_by_order(
        &self,
        tenant_id: Uuid,
        playbook_id: Uuid,
        order: i32,
    ) -> SoarResult<Option<PlaybookStep>> {
        let state = self.state.read().await;
        Ok(state
            .playbooks
            .get(&playbook_id)
            .filter(|p| p.tenant_id == tenant_id)
            .and_then(|p| p.step_at(order))
            .cloned())
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStore {
    async fn create_execution(
        &self,
        execution: &PlaybookExecution,
        steps: &[ExecutionStep],
    ) -> SoarResult<PlaybookExecution> {
        let mut state = self.state.write().await;
        state.executions.insert(execution.id, execution.clone());
        state.execution_steps.extend_from_slice(steps);
        Ok(execution.clone())
    }

    async fn get_execution(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> SoarResult<Option<PlaybookExecution>> {
        let state = self.state.read().await;
        Ok(state
            .executions
            .get(&id)
            .filter(|e| e.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_executions_for_case(
        &self,
        tenant_id: Uuid,
        case_id: Uuid,
    ) -> SoarResult<Vec<PlaybookExecution>> {
        let state = self.state.read().await;
        let mut records: Vec<PlaybookExecution> = state
            .executions
            .values()
            .filter(|e| e.tenant_id == tenant_id && e.case_id == case_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(records)
    }

    async fn finish_execution(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> SoarResult<Option<PlaybookExecution>> {
        let mut state = self.state.write().await;
        let Some(execution) = state
            .executions
            .get_mut(&id)
            .filter(|e| e.tenant_id == tenant_id && e.is_running())
        else {
            return Ok(None);
        };

        execution.status = status;
        execution.completed_at = Some(Utc::now());
        execution.error = error;
        Ok(Some(execution.clone()))
    }

    async fn get_execution_step(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
        id: Uuid,
    ) -> SoarResult<Option<ExecutionStep>> {
        let state = self.state.read().await;
        Ok(state
            .execution_steps
            .iter()
            .find(|s| s.id == id && s.tenant_id == tenant_id && s.execution_id == execution_id)
            .cloned())
    }

    async fn list_execution_steps(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> SoarResult<Vec<ExecutionStep>> {
        let state = self.state.read().await;
        Ok(state
            .execution_steps
            .iter()
            .filter(|s| s.tenant_id == tenant_id && s.execution_id == execution_id)
            .cloned()
            .collect())
    }

    async fn find_execution_step_for(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
        step_id: Uuid,
    ) -> SoarResult<Option<ExecutionStep>> {
        let state = self.state.read().await;
        Ok(state
            .execution_steps
            .iter()
            .find(|s| {
                s.tenant_id == tenant_id && s.execution_id == execution_id && s.step_id == step_id
            })
            .cloned())
    }

    async fn update_execution_step(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        change: &StepStatusChange,
    ) -> SoarResult<Option<ExecutionStep>> {
        let mut state = self.state.write().await;
        let Some(step) = state
            .execution_steps
            .iter_mut()
            .find(|s| s.id == id && s.tenant_id == tenant_id)
            .filter(|s| !s.status.is_terminal())
        else {
            return Ok(None);
        };

        step.status = change.status;
        if change.result.is_some() {
            step.result = change.result.clone();
        }
        if step.started_at.is_none() {
            step.started_at = change.started_at;
        }
        if change.completed_at.is_some() {
            step.completed_at = change.completed_at;
        }
        Ok(Some(step.clone()))
    }
}

#[async_trait]
impl ApprovalStore for InMemoryStore {
    async fn create_approval_if_absent(
        &self,
        request: &ApprovalRequest,
    ) -> SoarResult<(ApprovalRequest, bool)> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.approvals.iter().find(|a| {
            a.tenant_id == request.tenant_id
                && a.execution_id == request.execution_id
                && a.step_id == request.step_id
                && a.is_pending()
        }) {
            return Ok((existing.clone(), false));
        }

        state.approvals.push(request.clone());
        Ok((request.clone(), true))
    }

    async fn get_approval(&self, tenant_id: Uuid, id: Uuid) -> SoarResult<Option<ApprovalRequest>> {
        let state = self.state.read().await;
        Ok(state
            .approvals
            .iter()
            .find(|a| a.id == id && a.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_pending_approvals(&self, tenant_id: Uuid) -> SoarResult<Vec<ApprovalRequest>> {
        let state = self.state.read().await;
        Ok(state
            .approvals
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.is_pending())
            .cloned()
            .collect())
    }

    async fn record_decision(
        &self,
        request: &ApprovalRequest,
    ) -> SoarResult<Option<ApprovalRequest>> {
        let mut state = self.state.write().await;
        let Some(existing) = state
            .approvals
            .iter_mut()
            .find(|a| a.id == request.id && a.tenant_id == request.tenant_id)
            .filter(|a| a.is_pending())
        else {
            return Ok(None);
        };

        existing.status = request.status;
        existing.decided_by = request.decided_by;
        existing.decided_at = request.decided_at;
        existing.comments = request.comments.clone();
        Ok(Some(existing.clone()))
    }
}

#[async_trait]
impl InputRequestStore for InMemoryStore {
    async fn create_input_if_absent(
        &self,
        request: &InputRequest,
    ) -> SoarResult<(InputRequest, bool)> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.inputs.iter().find(|i| {
            i.tenant_id == request.tenant_id
                && i.execution_id == request.execution_id
                && i.step_id == request.step_id
                && i.is_pending()
        }) {
            return Ok((existing.clone(), false));
        }

        state.inputs.push(request.clone());
        Ok((request.clone(), true))
    }

    async fn get_input(&self, tenant_id: Uuid, id: Uuid) -> SoarResult<Option<InputRequest>> {
        let state = self.state.read().await;
        Ok(state
            .inputs
            .iter()
            .find(|i| i.id == id && i.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_pending_inputs(&self, tenant_id: Uuid) -> SoarResult<Vec<InputRequest>> {
        let state = self.state.read().await;
        Ok(state
            .inputs
            .iter()
            .filter(|i| i.tenant_id == tenant_id && i.is_pending())
            .cloned()
            .collect())
    }

    async fn record_submission(&self, request: &InputRequest) -> SoarResult<Option<InputRequest>> {
        let mut state = self.state.write().await;
        let Some(existing) = state
            .inputs
            .iter_mut()
            .find(|i| i.id == request.id && i.tenant_id == request.tenant_id)
            .filter(|i| i.is_pending())
        else {
            return Ok(None);
        };

        existing.status = request.status;
        existing.submitted_by = request.submitted_by;
        existing.submitted_at = request.submitted_at;
        existing.input_data = request.input_data.clone();
        Ok(Some(existing.clone()))
    }
}

#[async_trait]
impl CaseStore for InMemoryStore {
    async fn get_case(&self, tenant_id: Uuid, id: Uuid) -> SoarResult<Option<Case>> {
        let state = self.state.read().await;
        Ok(state
            .cases
            .get(&id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_alerts_for_case(
        &self,
        tenant_id: Uuid,
        case_id: Uuid,
    ) -> SoarResult<Vec<Alert>> {
        let state = self.state.read().await;
        let mut alerts: Vec<Alert> = state
            .alerts
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.case_id == case_id)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(alerts)
    }
}
