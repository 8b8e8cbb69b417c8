use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::SoarResult;
use crate::models::ExecutionMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Critical actions need human sign-off before a real run.
    pub fn requires_approval(&self) -> bool {
        matches!(self, RiskLevel::Critical)
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Everything an action receives for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub tenant_id: Uuid,
    pub case_id: Uuid,
    pub execution_id: Uuid,
    pub execution_step_id: Uuid,
    pub user_id: Uuid,
    /// Step config with placeholders already resolved.
    pub inputs: Value,
    pub mode: ExecutionMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Id and risk metadata of a registered action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub id: String,
    pub risk_level: RiskLevel,
}

/// A response capability invoked by automation steps.
///
/// Implementations own their timeouts and side effects. Returning `Err` and
/// returning an unsuccessful [`ActionOutcome`] are treated the same way: the
/// step fails and the execution halts.
#[async_trait]
pub trait Action: Send + Sync + 'static {
    fn id(&self) -> &str;

    fn risk_level(&self) -> RiskLevel;

    async fn execute(&self, request: ActionRequest) -> SoarResult<ActionOutcome>;

    fn descriptor(&self) -> ActionDescriptor {
        ActionDescriptor {
            id: self.id().to_string(),
            risk_level: self.risk_level(),
        }
    }
}

pub struct ActionRegistryBuilder {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl Default for ActionRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRegistryBuilder {
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Registers `action` under its id. A later registration with the same id wins.
    pub fn register<A: Action>(mut self, action: A) -> Self {
        self.register_arc(Arc::new(action));
        self
    }

    pub fn register_arc(&mut self, action: Arc<dyn Action>) -> &mut Self {
        let id = action.id().to_string();
        if self.actions.insert(id.clone(), action).is_some() {
            warn!(action_id = %id, "Replacing previously registered action");
        }
        self
    }

    pub fn build(self) -> ActionRegistry {
        info!("Action registry built with {} actions", self.actions.len());
        ActionRegistry {
            inner: Arc::new(self.actions),
        }
    }
}

/// Immutable id-keyed set of actions shared by the engine.
#[derive(Clone)]
pub struct ActionRegistry {
    inner: Arc<HashMap<String, Arc<dyn Action>>>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        ActionRegistryBuilder::new().build()
    }
}

impl ActionRegistry {
    pub fn builder() -> ActionRegistryBuilder {
        ActionRegistryBuilder::new()
    }

    /// Registry holding the built-in actions only.
    pub fn with_builtins() -> Self {
        Self::builder().register(EchoAction::new()).build()
    }

    pub fn get(&self, action_id: &str) -> Option<Arc<dyn Action>> {
        self.inner.get(action_id).cloned()
    }

    pub fn describe(&self, action_id: &str) -> Option<ActionDescriptor> {
        self.inner.get(action_id).map(|a| a.descriptor())
    }

    pub fn list(&self) -> Vec<ActionDescriptor> {
        let mut descriptors: Vec<ActionDescriptor> =
            self.inner.values().map(|a| a.descriptor()).collect();
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        descriptors
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Returns its inputs. Used for rehearsals and wiring checks.
pub struct EchoAction {
    id: String,
    risk_level: RiskLevel,
}

impl EchoAction {
    pub fn new() -> Self {
        Self {
            id: "echo".to_string(),
            risk_level: RiskLevel::Low,
        }
    }

    /// Echo registered under another id, e.g. to stand in for a real action.
    pub fn named(id: impl Into<String>, risk_level: RiskLevel) -> Self {
        Self {
            id: id.into(),
            risk_level,
        }
    }
}

impl Default for EchoAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Action for EchoAction {
    fn id(&self) -> &str {
        &self.id
    }

    fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    async fn execute(&self, request: ActionRequest) -> SoarResult<ActionOutcome> {
        Ok(ActionOutcome::success(json!({
            "action": self.id,
            "mode": request.mode,
            "inputs": request.inputs,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(mode: ExecutionMode) -> ActionRequest {
        ActionRequest {
            tenant_id: Uuid::new_v4(),
            case_id: Uuid::new_v4(),
            execution_id: Uuid::new_v4(),
            execution_step_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            inputs: json!({"host": "web-01"}),
            mode,
        }
    }

    #[test]
    fn test_risk_levels() {
        assert!(RiskLevel::Critical.requires_approval());
        assert!(!RiskLevel::High.requires_approval());
        assert!(RiskLevel::Critical > RiskLevel::Low);
        assert_eq!(RiskLevel::Medium.to_string(), "medium");
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ActionRegistry::builder()
            .register(EchoAction::new())
            .register(EchoAction::named("isolate_host", RiskLevel::Critical))
            .build();

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.describe("isolate_host"),
            Some(ActionDescriptor {
                id: "isolate_host".to_string(),
                risk_level: RiskLevel::Critical,
            })
        );
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.list()[0].id, "echo");
    }

    #[test]
    fn test_later_registration_replaces() {
        let registry = ActionRegistry::builder()
            .register(EchoAction::named("block", RiskLevel::Low))
            .register(EchoAction::named("block", RiskLevel::High))
            .build();

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.describe("block").map(|d| d.risk_level),
            Some(RiskLevel::High)
        );
    }

    #[tokio::test]
    async fn test_echo_returns_inputs() {
        let outcome = EchoAction::new()
            .execute(request(ExecutionMode::DryRun))
            .await
            .unwrap();

        assert!(outcome.success);
        let data = outcome.data.unwrap();
        assert_eq!(data["mode"], json!("dry_run"));
        assert_eq!(data["inputs"]["host"], json!("web-01"));
    }
}
