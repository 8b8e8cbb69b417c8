use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{SoarError, SoarResult};
use crate::models::{
    ApprovalRequest, ExecutionMode, ExecutionStatus, ExecutionStep, InputRequest,
    PlaybookExecution, PlaybookStep, StepStatus, StepStatusChange, StepType,
};
use crate::repo::Stores;

use super::actions::{ActionOutcome, ActionRegistry, ActionRequest};
use super::cascade::{CascadeOutcome, CascadeQueue, CascadeTask, Successor};
use super::condition::evaluate;
use super::resolver::resolve;
use super::templates::PlaybookTemplates;

/// Result of dispatching one execution step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed { result: Value },
    Failed { error: String },
    /// `created` is false when an existing pending request was returned.
    AwaitingApproval { approval_id: Uuid, created: bool },
    AwaitingInput { input_id: Uuid, created: bool },
}

/// Runs playbooks against cases.
///
/// Step completions are handed to a background cascade worker that resolves
/// and dispatches the successor, so [`PlaybookEngine::update_step_status`]
/// returns before the next step runs. Use [`PlaybookEngine::drain`] to wait
/// for the cascade to settle.
pub struct PlaybookEngine {
    pub(crate) stores: Stores,
    pub(crate) actions: ActionRegistry,
    pub(crate) cascade: CascadeQueue,
    templates: PlaybookTemplates,
}

impl PlaybookEngine {
    /// Builds the engine and starts its cascade worker. Must be called from
    /// within a Tokio runtime.
    pub fn new(stores: Stores, actions: ActionRegistry, config: &EngineConfig) -> Arc<Self> {
        let engine = Arc::new(Self {
            templates: PlaybookTemplates::new(stores.playbooks.clone()),
            stores,
            actions,
            cascade: CascadeQueue::new(config.retry_config(), config.dead_letter_capacity),
        });
        engine.spawn_cascade_worker();
        engine
    }

    pub fn templates(&self) -> &PlaybookTemplates {
        &self.templates
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    /// Creates an execution and a pending step snapshot for every template
    /// step. Nothing is dispatched.
    pub async fn run(
        &self,
        tenant_id: Uuid,
        case_id: Uuid,
        playbook_id: Uuid,
        user_id: Uuid,
        mode: ExecutionMode,
    ) -> SoarResult<PlaybookExecution> {
        let playbook = self
            .stores
            .playbooks
            .get_playbook(tenant_id, playbook_id)
            .await?
            .ok_or(SoarError::PlaybookNotFound(playbook_id))?;

        let execution = PlaybookExecution::new(tenant_id, playbook.id, case_id, user_id, mode);
        let steps: Vec<ExecutionStep> = playbook
            .steps
            .iter()
            .map(|step| ExecutionStep::pending(tenant_id, execution.id, step.id))
            .collect();

        let execution = self
            .stores
            .executions
            .create_execution(&execution, &steps)
            .await?;

        info!(
            tenant_id = %tenant_id,
            execution_id = %execution.id,
            playbook_id = %playbook_id,
            case_id = %case_id,
            mode = %mode,
            steps = steps.len(),
            "Playbook execution created"
        );

        Ok(execution)
    }

    /// Runs the playbook and dispatches its first step unless that step is manual.
    pub async fn start(
        &self,
        tenant_id: Uuid,
        case_id: Uuid,
        playbook_id: Uuid,
        user_id: Uuid,
        mode: ExecutionMode,
    ) -> SoarResult<(PlaybookExecution, Option<StepOutcome>)> {
        let execution = self
            .run(tenant_id, case_id, playbook_id, user_id, mode)
            .await?;

        let Some(first) = self.first_step(tenant_id, execution.id).await? else {
            self.stores
                .executions
                .finish_execution(tenant_id, execution.id, ExecutionStatus::Completed, None)
                .await?;
            info!(execution_id = %execution.id, "Playbook has no steps, execution completed");
            return Ok((execution, None));
        };

        let template_step = self.template_step(tenant_id, &first).await?;
        if template_step.step_type == StepType::Manual {
            return Ok((execution, None));
        }

        let outcome = self.execute_step(tenant_id, execution.id, first.id).await?;
        Ok((execution, Some(outcome)))
    }

    /// The execution step bound to the lowest-order template step.
    pub async fn first_step(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> SoarResult<Option<ExecutionStep>> {
        let execution = self.load_execution(tenant_id, execution_id).await?;
        let playbook = self
            .stores
            .playbooks
            .get_playbook(tenant_id, execution.playbook_id)
            .await?
            .ok_or(SoarError::PlaybookNotFound(execution.playbook_id))?;

        let Some(step) = playbook.first_step() else {
            return Ok(None);
        };

        self.stores
            .executions
            .find_execution_step_for(tenant_id, execution_id, step.id)
            .await
    }

    pub async fn get_execution(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> SoarResult<PlaybookExecution> {
        self.load_execution(tenant_id, execution_id).await
    }

    pub async fn list_execution_steps(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> SoarResult<Vec<ExecutionStep>> {
        self.load_execution(tenant_id, execution_id).await?;
        self.stores
            .executions
            .list_execution_steps(tenant_id, execution_id)
            .await
    }

    pub async fn list_executions(
        &self,
        tenant_id: Uuid,
        case_id: Uuid,
    ) -> SoarResult<Vec<PlaybookExecution>> {
        self.stores
            .executions
            .list_executions_for_case(tenant_id, case_id)
            .await
    }

    /// Dispatches an execution step according to its template step type.
    pub async fn execute_step(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
        step_id: Uuid,
    ) -> SoarResult<StepOutcome> {
        let execution = self.load_running_execution(tenant_id, execution_id).await?;
        let exec_step = self.load_step(tenant_id, execution_id, step_id).await?;
        if exec_step.status.is_terminal() {
            return Err(SoarError::InvalidStepTransition {
                from: exec_step.status.to_string(),
                to: StepStatus::InProgress.to_string(),
            });
        }
        let step = self.template_step(tenant_id, &exec_step).await?;

        debug!(
            tenant_id = %tenant_id,
            execution_id = %execution_id,
            step_id = %step_id,
            step_type = %step.step_type,
            order = step.order,
            "Executing step"
        );

        match step.step_type {
            StepType::Condition => {
                let result = json!({
                    "type": "condition",
                    "condition": step.condition(),
                });
                self.update_step_status(
                    tenant_id,
                    execution_id,
                    step_id,
                    StepStatus::Completed,
                    Some(result.clone()),
                )
                .await?;
                Ok(StepOutcome::Completed { result })
            }
            StepType::Approval => {
                let details = json!({
                    "reason": "approval_step",
                    "step_name": step.name,
                    "config": step.config,
                });
                self.request_approval(&execution, &exec_step, details).await
            }
            StepType::WaitForInput => self.request_input(&execution, &exec_step, &step).await,
            StepType::Automation => self.run_automation(&execution, &exec_step, &step).await,
            StepType::Manual => Err(SoarError::CannotAutoExecute(step.step_type.to_string())),
        }
    }

    /// Single mutation point for execution step status.
    ///
    /// `completed` enqueues successor resolution; `failed` fails the execution.
    pub async fn update_step_status(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
        step_id: Uuid,
        status: StepStatus,
        result: Option<Value>,
    ) -> SoarResult<ExecutionStep> {
        self.load_running_execution(tenant_id, execution_id).await?;
        let current = self.load_step(tenant_id, execution_id, step_id).await?;

        let invalid = || SoarError::InvalidStepTransition {
            from: current.status.to_string(),
            to: status.to_string(),
        };
        if !current.status.can_transition_to(status) {
            return Err(invalid());
        }

        let failure_message = failure_message(step_id, result.as_ref());
        let updated = self
            .stores
            .executions
            .update_execution_step(tenant_id, step_id, &StepStatusChange::new(status, result))
            .await?
            .ok_or_else(invalid)?;

        debug!(
            execution_id = %execution_id,
            step_id = %step_id,
            from = %current.status,
            to = %status,
            "Step status updated"
        );

        match status {
            StepStatus::Completed => {
                self.cascade
                    .enqueue(CascadeTask::new(tenant_id, execution_id, step_id));
            }
            StepStatus::Failed => {
                self.stores
                    .executions
                    .finish_execution(
                        tenant_id,
                        execution_id,
                        ExecutionStatus::Failed,
                        Some(failure_message.clone()),
                    )
                    .await?;
                warn!(
                    tenant_id = %tenant_id,
                    execution_id = %execution_id,
                    step_id = %step_id,
                    "Execution failed: {}",
                    failure_message
                );
            }
            _ => {}
        }

        Ok(updated)
    }

    /// Resolves the successor of a completed step and dispatches it.
    pub async fn trigger_next_step(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
        completed_step_id: Uuid,
    ) -> SoarResult<CascadeOutcome> {
        match self
            .resolve_successor(tenant_id, execution_id, completed_step_id)
            .await?
        {
            Successor::Resolved(outcome) => Ok(outcome),
            Successor::Dispatch(execution_step_id) => {
                self.dispatch_successor(tenant_id, execution_id, execution_step_id)
                    .await
            }
        }
    }

    /// Works out what follows a completed step without running anything.
    ///
    /// Safe to repeat: the only writes are finishing the execution, which is a
    /// no-op once the execution is terminal.
    pub(crate) async fn resolve_successor(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
        completed_step_id: Uuid,
    ) -> SoarResult<Successor> {
        let execution = self.load_execution(tenant_id, execution_id).await?;
        if !execution.is_running() {
            info!(
                execution_id = %execution_id,
                status = %execution.status,
                "Execution no longer running, dropping cascade"
            );
            return Ok(Successor::Resolved(CascadeOutcome::Skipped {
                reason: format!("execution is {}", execution.status),
            }));
        }

        let completed = self
            .load_step(tenant_id, execution_id, completed_step_id)
            .await?;
        let step = self.template_step(tenant_id, &completed).await?;

        let mut next_order = step.order + 1;
        if step.is_branching() {
            let context = self.build_context(tenant_id, execution.case_id).await?;
            let outcome = step
                .condition()
                .map(|condition| evaluate(condition, &context))
                .unwrap_or(false);
            if let Some(target) = step.branch_target(outcome) {
                next_order = target;
            }
            debug!(
                execution_id = %execution_id,
                step_id = %completed_step_id,
                outcome,
                next_order,
                "Branch resolved"
            );
        }

        let Some(next) = self
            .stores
            .playbooks
            .get_step_by_order(tenant_id, execution.playbook_id, next_order)
            .await?
        else {
            self.stores
                .executions
                .finish_execution(tenant_id, execution_id, ExecutionStatus::Completed, None)
                .await?;
            info!(
                tenant_id = %tenant_id,
                execution_id = %execution_id,
                "Execution completed"
            );
            return Ok(Successor::Resolved(CascadeOutcome::ExecutionCompleted));
        };

        let next_exec = self
            .stores
            .executions
            .find_execution_step_for(tenant_id, execution_id, next.id)
            .await?
            .ok_or_else(|| {
                SoarError::ExecutionStepNotFound(format!(
                    "template step {} has no step in execution {}",
                    next.id, execution_id
                ))
            })?;

        // A finished successor never runs again; fail rather than stall.
        if next_exec.status.is_terminal() {
            let error = SoarError::SuccessorNotPending {
                step: next_exec.id,
                order: next.order,
                status: next_exec.status.to_string(),
            };
            self.stores
                .executions
                .finish_execution(
                    tenant_id,
                    execution_id,
                    ExecutionStatus::Failed,
                    Some(error.to_string()),
                )
                .await?;
            warn!(
                tenant_id = %tenant_id,
                execution_id = %execution_id,
                step_id = %completed_step_id,
                next_order,
                "Execution failed: {}",
                error
            );
            return Err(error);
        }

        if next_exec.status != StepStatus::Pending {
            return Ok(Successor::Resolved(CascadeOutcome::Skipped {
                reason: format!("step {} is already {}", next_exec.id, next_exec.status),
            }));
        }

        if next.step_type == StepType::Manual {
            info!(
                execution_id = %execution_id,
                step_id = %next_exec.id,
                "Waiting for manual step"
            );
            return Ok(Successor::Resolved(CascadeOutcome::AwaitingManual {
                execution_step_id: next_exec.id,
            }));
        }

        Ok(Successor::Dispatch(next_exec.id))
    }

    /// Runs the resolved successor. Never retried: its action may already
    /// have had side effects when an error comes back.
    pub(crate) async fn dispatch_successor(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
        execution_step_id: Uuid,
    ) -> SoarResult<CascadeOutcome> {
        let outcome = self
            .execute_step(tenant_id, execution_id, execution_step_id)
            .await?;
        Ok(CascadeOutcome::Dispatched {
            execution_step_id,
            outcome,
        })
    }

    async fn request_approval(
        &self,
        execution: &PlaybookExecution,
        exec_step: &ExecutionStep,
        details: Value,
    ) -> SoarResult<StepOutcome> {
        let request = ApprovalRequest::new(execution.tenant_id, execution.id, exec_step.id, details);
        let (request, created) = self
            .stores
            .approvals
            .create_approval_if_absent(&request)
            .await?;

        if created {
            self.update_step_status(
                execution.tenant_id,
                execution.id,
                exec_step.id,
                StepStatus::WaitingForApproval,
                None,
            )
            .await?;
            info!(
                tenant_id = %execution.tenant_id,
                execution_id = %execution.id,
                step_id = %exec_step.id,
                approval_id = %request.id,
                "Approval requested"
            );
        } else {
            debug!(approval_id = %request.id, "Approval already pending");
        }

        Ok(StepOutcome::AwaitingApproval {
            approval_id: request.id,
            created,
        })
    }

    async fn request_input(
        &self,
        execution: &PlaybookExecution,
        exec_step: &ExecutionStep,
        step: &PlaybookStep,
    ) -> SoarResult<StepOutcome> {
        let prompt = step
            .config
            .get("prompt")
            .and_then(Value::as_str)
            .map(str::to_string);
        let schema = step
            .config
            .get("schema")
            .cloned()
            .unwrap_or_else(|| json!({}));

        let request = InputRequest::new(
            execution.tenant_id,
            execution.id,
            exec_step.id,
            prompt,
            schema,
        );
        let (request, created) = self.stores.inputs.create_input_if_absent(&request).await?;

        if created {
            self.update_step_status(
                execution.tenant_id,
                execution.id,
                exec_step.id,
                StepStatus::WaitingForInput,
                None,
            )
            .await?;
            info!(
                tenant_id = %execution.tenant_id,
                execution_id = %execution.id,
                step_id = %exec_step.id,
                input_id = %request.id,
                "Input requested"
            );
        }

        Ok(StepOutcome::AwaitingInput {
            input_id: request.id,
            created,
        })
    }

    async fn run_automation(
        &self,
        execution: &PlaybookExecution,
        exec_step: &ExecutionStep,
        step: &PlaybookStep,
    ) -> SoarResult<StepOutcome> {
        let tenant_id = execution.tenant_id;
        let context = self.build_context(tenant_id, execution.case_id).await?;
        let mut inputs = resolve(&step.config, &context);

        let action_id = step
            .action_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or(SoarError::MissingActionId(step.id))?;
        let action = self
            .actions
            .get(action_id)
            .ok_or_else(|| SoarError::ActionNotFound(action_id.to_string()))?;
        if !inputs.is_object() {
            return Err(SoarError::InvalidStepConfig {
                step: step.id,
                message: "automation inputs must be a JSON object".to_string(),
            });
        }

        let risk_level = action.risk_level();
        if risk_level.requires_approval() && execution.mode == ExecutionMode::Run {
            let details = json!({
                "reason": "critical_risk_action",
                "step_name": step.name,
                "action_id": action_id,
                "risk_level": risk_level,
                "inputs": inputs,
            });
            return self.request_approval(execution, exec_step, details).await;
        }

        if execution.mode == ExecutionMode::DryRun {
            if let Value::Object(fields) = &mut inputs {
                fields.insert("mode".to_string(), json!(ExecutionMode::DryRun));
            }
        }

        self.update_step_status(
            tenant_id,
            execution.id,
            exec_step.id,
            StepStatus::InProgress,
            None,
        )
        .await?;

        let request = ActionRequest {
            tenant_id,
            case_id: execution.case_id,
            execution_id: execution.id,
            execution_step_id: exec_step.id,
            user_id: execution.started_by,
            inputs,
            mode: execution.mode,
        };

        info!(
            execution_id = %execution.id,
            step_id = %exec_step.id,
            action_id = %action_id,
            risk_level = %risk_level,
            mode = %execution.mode,
            "Invoking action"
        );

        let outcome = match action.execute(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(action_id = %action_id, "Action raised an error: {}", e);
                ActionOutcome::failure(e.to_string())
            }
        };

        if outcome.success {
            let result = json!({
                "action_id": action_id,
                "success": true,
                "data": outcome.data,
            });
            self.update_step_status(
                tenant_id,
                execution.id,
                exec_step.id,
                StepStatus::Completed,
                Some(result.clone()),
            )
            .await?;
            Ok(StepOutcome::Completed { result })
        } else {
            let error = SoarError::action_failed(
                action_id,
                outcome
                    .error
                    .unwrap_or_else(|| "action reported failure".to_string()),
            )
            .to_string();
            let result = json!({
                "action_id": action_id,
                "success": false,
                "error": error,
            });
            self.update_step_status(
                tenant_id,
                execution.id,
                exec_step.id,
                StepStatus::Failed,
                Some(result),
            )
            .await?;
            Ok(StepOutcome::Failed { error })
        }
    }

    /// `{case, alerts, alert}` where `alert` is the oldest alert or null.
    async fn build_context(&self, tenant_id: Uuid, case_id: Uuid) -> SoarResult<Value> {
        let case = self
            .stores
            .cases
            .get_case(tenant_id, case_id)
            .await?
            .ok_or(SoarError::CaseNotFound(case_id))?;
        let alerts = self
            .stores
            .cases
            .list_alerts_for_case(tenant_id, case_id)
            .await?;

        let alert = alerts
            .first()
            .map(serde_json::to_value)
            .transpose()?
            .unwrap_or(Value::Null);

        Ok(json!({
            "case": serde_json::to_value(&case)?,
            "alerts": serde_json::to_value(&alerts)?,
            "alert": alert,
        }))
    }

    async fn load_execution(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> SoarResult<PlaybookExecution> {
        self.stores
            .executions
            .get_execution(tenant_id, execution_id)
            .await?
            .ok_or(SoarError::ExecutionNotFound(execution_id))
    }

    pub(crate) async fn load_running_execution(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> SoarResult<PlaybookExecution> {
        let execution = self.load_execution(tenant_id, execution_id).await?;
        if !execution.is_running() {
            return Err(SoarError::ExecutionFinished {
                id: execution_id,
                status: execution.status.to_string(),
            });
        }
        Ok(execution)
    }

    async fn load_step(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
        step_id: Uuid,
    ) -> SoarResult<ExecutionStep> {
        self.stores
            .executions
            .get_execution_step(tenant_id, execution_id, step_id)
            .await?
            .ok_or_else(|| SoarError::ExecutionStepNotFound(step_id.to_string()))
    }

    async fn template_step(
        &self,
        tenant_id: Uuid,
        exec_step: &ExecutionStep,
    ) -> SoarResult<PlaybookStep> {
        self.stores
            .playbooks
            .get_step(tenant_id, exec_step.step_id)
            .await?
            .ok_or(SoarError::PlaybookStepNotFound(exec_step.step_id))
    }
}

fn failure_message(step_id: Uuid, result: Option<&Value>) -> String {
    result
        .and_then(|r| r.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("step {step_id} failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message() {
        let id = Uuid::nil();
        assert_eq!(
            failure_message(id, Some(&json!({"error": "host unreachable"}))),
            "host unreachable"
        );
        assert_eq!(
            failure_message(id, None),
            format!("step {} failed", Uuid::nil())
        );
    }

    #[test]
    fn test_step_outcome_serialization() {
        let outcome = StepOutcome::AwaitingApproval {
            approval_id: Uuid::nil(),
            created: true,
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["outcome"], json!("awaiting_approval"));
        assert_eq!(value["created"], json!(true));
    }
}
