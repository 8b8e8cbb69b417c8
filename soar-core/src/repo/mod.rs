pub mod approval_repo;
pub mod case_repo;
pub mod execution_repo;
pub mod input_repo;
pub mod memory;
pub mod playbook_repo;

pub use approval_repo::ApprovalRepository;
pub use case_repo::CaseRepository;
pub use execution_repo::ExecutionRepository;
pub use input_repo::InputRepository;
pub use memory::InMemoryStore;
pub use playbook_repo::PlaybookRepository;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::SoarResult;
use crate::models::{
    Alert, ApprovalRequest, Case, ExecutionStatus, ExecutionStep, InputRequest, PlaybookExecution,
    PlaybookStep, PlaybookTemplate, StepStatusChange,
};

/// Templates and their ordered steps. Every lookup is tenant-scoped.
#[async_trait]
pub trait PlaybookStore: Send + Sync {
    async fn insert_playbook(&self, playbook: &PlaybookTemplate) -> SoarResult<PlaybookTemplate>;

    /// Loads a template with its steps sorted by order.
    async fn get_playbook(&self, tenant_id: Uuid, id: Uuid)
        -> SoarResult<Option<PlaybookTemplate>>;

    async fn list_playbooks(&self, tenant_id: Uuid) -> SoarResult<Vec<PlaybookTemplate>>;

    /// Writes the header fields; when `replace_steps` is set every existing step
    /// is deleted and `playbook.steps` inserted in its place.
    async fn update_playbook(
        &self,
        playbook: &PlaybookTemplate,
        replace_steps: bool,
    ) -> SoarResult<Option<PlaybookTemplate>>;

    async fn delete_playbook(&self, tenant_id: Uuid, id: Uuid) -> SoarResult<bool>;

    async fn get_step(&self, tenant_id: Uuid, step_id: Uuid) -> SoarResult<Option<PlaybookStep>>;

    async fn get_step_by_order(
        &self,
        tenant_id: Uuid,
        playbook_id: Uuid,
        order: i32,
    ) -> SoarResult<Option<PlaybookStep>>;
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Inserts the execution and its step snapshot atomically.
    async fn create_execution(
        &self,
        execution: &PlaybookExecution,
        steps: &[ExecutionStep],
    ) -> SoarResult<PlaybookExecution>;

    async fn get_execution(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> SoarResult<Option<PlaybookExecution>>;

    async fn list_executions_for_case(
        &self,
        tenant_id: Uuid,
        case_id: Uuid,
    ) -> SoarResult<Vec<PlaybookExecution>>;

    /// Moves a running execution to a terminal status. Returns `None` when the
    /// execution is missing or already terminal.
    async fn finish_execution(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> SoarResult<Option<PlaybookExecution>>;

    async fn get_execution_step(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
        id: Uuid,
    ) -> SoarResult<Option<ExecutionStep>>;

    async fn list_execution_steps(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> SoarResult<Vec<ExecutionStep>>;

    async fn find_execution_step_for(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
        step_id: Uuid,
    ) -> SoarResult<Option<ExecutionStep>>;

    /// Applies `change` unless the step is already terminal, in which case
    /// `None` is returned and nothing is written.
    async fn update_execution_step(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        change: &StepStatusChange,
    ) -> SoarResult<Option<ExecutionStep>>;
}

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Returns the pending request for the same (execution, step) if one
    /// exists, otherwise stores `request`. The flag reports whether it was created.
    async fn create_approval_if_absent(
        &self,
        request: &ApprovalRequest,
    ) -> SoarResult<(ApprovalRequest, bool)>;

    async fn get_approval(&self, tenant_id: Uuid, id: Uuid) -> SoarResult<Option<ApprovalRequest>>;

    async fn list_pending_approvals(&self, tenant_id: Uuid) -> SoarResult<Vec<ApprovalRequest>>;

    /// Persists the decision fields if the request is still pending.
    async fn record_decision(&self, request: &ApprovalRequest)
        -> SoarResult<Option<ApprovalRequest>>;
}

#[async_trait]
pub trait InputRequestStore: Send + Sync {
    async fn create_input_if_absent(
        &self,
        request: &InputRequest,
    ) -> SoarResult<(InputRequest, bool)>;

    async fn get_input(&self, tenant_id: Uuid, id: Uuid) -> SoarResult<Option<InputRequest>>;

    async fn list_pending_inputs(&self, tenant_id: Uuid) -> SoarResult<Vec<InputRequest>>;

    async fn record_submission(&self, request: &InputRequest) -> SoarResult<Option<InputRequest>>;
}

/// Read-only access to case management data.
#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn get_case(&self, tenant_id: Uuid, id: Uuid) -> SoarResult<Option<Case>>;

    /// Alerts linked to a case, oldest first.
    async fn list_alerts_for_case(&self, tenant_id: Uuid, case_id: Uuid)
        -> SoarResult<Vec<Alert>>;
}

/// The set of stores an engine runs against.
#[derive(Clone)]
pub struct Stores {
    pub playbooks: Arc<dyn PlaybookStore>,
    pub executions: Arc<dyn ExecutionStore>,
    pub approvals: Arc<dyn ApprovalStore>,
    pub inputs: Arc<dyn InputRequestStore>,
    pub cases: Arc<dyn CaseStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            playbooks: Arc::new(PlaybookRepository::new(pool.clone())),
            executions: Arc::new(ExecutionRepository::new(pool.clone())),
            approvals: Arc::new(ApprovalRepository::new(pool.clone())),
            inputs: Arc::new(InputRepository::new(pool.clone())),
            cases: Arc::new(CaseRepository::new(pool)),
        }
    }

    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            playbooks: store.clone(),
            executions: store.clone(),
            approvals: store.clone(),
            inputs: store.clone(),
            cases: store,
        }
    }
}
