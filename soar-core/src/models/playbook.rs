use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{SoarError, SoarResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "step_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Manual,
    Automation,
    Approval,
    Condition,
    WaitForInput,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepType::Manual => write!(f, "manual"),
            StepType::Automation => write!(f, "automation"),
            StepType::Approval => write!(f, "approval"),
            StepType::Condition => write!(f, "condition"),
            StepType::WaitForInput => write!(f, "wait_for_input"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "trigger_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    #[default]
    Manual,
    AlertCreated,
    CaseCreated,
    CaseUpdated,
    Scheduled,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerType::Manual => write!(f, "manual"),
            TriggerType::AlertCreated => write!(f, "alert_created"),
            TriggerType::CaseCreated => write!(f, "case_created"),
            TriggerType::CaseUpdated => write!(f, "case_updated"),
            TriggerType::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// A playbook definition with its steps in ascending `order`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlaybookTemplate {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub trigger_type: TriggerType,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub steps: Vec<PlaybookStep>,
}

impl PlaybookTemplate {
    pub fn from_definition(
        tenant_id: Uuid,
        created_by: Option<Uuid>,
        definition: PlaybookDefinition,
    ) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Self {
            id,
            tenant_id,
            title: definition.title,
            description: definition.description,
            trigger_type: definition.trigger_type,
            created_by,
            created_at: now,
            updated_at: now,
            steps: PlaybookStep::numbered(tenant_id, id, definition.steps),
        }
    }

    pub fn step_at(&self, order: i32) -> Option<&PlaybookStep> {
        self.steps.iter().find(|s| s.order == order)
    }

    pub fn first_step(&self) -> Option<&PlaybookStep> {
        self.steps.iter().min_by_key(|s| s.order)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlaybookStep {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub playbook_id: Uuid,
    #[sqlx(rename = "step_order")]
    pub order: i32,
    pub name: String,
    pub step_type: StepType,
    pub action_id: Option<String>,
    pub config: Value,
}

impl PlaybookStep {
    /// Builds steps from definitions, numbering `order` by position starting at 1.
    pub fn numbered(tenant_id: Uuid, playbook_id: Uuid, steps: Vec<StepDefinition>) -> Vec<Self> {
        steps
            .into_iter()
            .enumerate()
            .map(|(index, def)| Self {
                id: Uuid::new_v4(),
                tenant_id,
                playbook_id,
                order: index as i32 + 1,
                name: def.name,
                step_type: def.step_type,
                action_id: def.action_id,
                config: def.config,
            })
            .collect()
    }

    pub fn condition(&self) -> Option<&str> {
        self.config.get("condition").and_then(Value::as_str)
    }

    /// Order to jump to for the given branch outcome, if the config names one.
    pub fn branch_target(&self, outcome: bool) -> Option<i32> {
        let key = if outcome { "true_step" } else { "false_step" };
        match self.config.get(key)? {
            Value::Number(n) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn has_branch_targets(&self) -> bool {
        self.config.get("true_step").is_some() || self.config.get("false_step").is_some()
    }

    pub fn is_branching(&self) -> bool {
        self.step_type == StepType::Condition || self.has_branch_targets()
    }
}

/// Authoring shape of a step; `order` is derived from position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default, alias = "actionId")]
    pub action_id: Option<String>,
    #[serde(default = "empty_object")]
    pub config: Value,
}

impl StepDefinition {
    pub fn new(name: impl Into<String>, step_type: StepType) -> Self {
        Self {
            name: name.into(),
            step_type,
            action_id: None,
            config: empty_object(),
        }
    }

    pub fn with_action(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// A playbook as authored in YAML or JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookDefinition {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "triggerType")]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl PlaybookDefinition {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            trigger_type: TriggerType::Manual,
            steps: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    pub fn from_yaml(source: &str) -> SoarResult<Self> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn from_json(source: &str) -> SoarResult<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn validate(&self) -> SoarResult<()> {
        if self.title.trim().is_empty() {
            return Err(SoarError::ValidationError(
                "playbook title must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial update; a present `steps` replaces every existing step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaybookUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "triggerType")]
    pub trigger_type: Option<TriggerType>,
    #[serde(default)]
    pub steps: Option<Vec<StepDefinition>>,
}

impl PlaybookUpdate {
    pub fn validate(&self) -> SoarResult<()> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(SoarError::ValidationError(
                    "playbook title must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_type_display() {
        assert_eq!(StepType::Manual.to_string(), "manual");
        assert_eq!(StepType::WaitForInput.to_string(), "wait_for_input");
        assert_eq!(TriggerType::AlertCreated.to_string(), "alert_created");
    }

    #[test]
    fn test_numbered_steps_follow_position() {
        let tenant = Uuid::new_v4();
        let playbook = Uuid::new_v4();
        let steps = PlaybookStep::numbered(
            tenant,
            playbook,
            vec![
                StepDefinition::new("triage", StepType::Manual),
                StepDefinition::new("contain", StepType::Automation).with_action("isolate_host"),
            ],
        );

        assert_eq!(steps[0].order, 1);
        assert_eq!(steps[1].order, 2);
        assert_eq!(steps[1].action_id.as_deref(), Some("isolate_host"));
        assert!(steps.iter().all(|s| s.playbook_id == playbook));
    }

    #[test]
    fn test_branch_targets() {
        let tenant = Uuid::new_v4();
        let steps = PlaybookStep::numbered(
            tenant,
            Uuid::new_v4(),
            vec![StepDefinition::new("gate", StepType::Condition).with_config(json!({
                "condition": "{{case.severity}} == critical",
                "true_step": 5,
                "false_step": "3"
            }))],
        );
        let step = &steps[0];

        assert_eq!(step.condition(), Some("{{case.severity}} == critical"));
        assert_eq!(step.branch_target(true), Some(5));
        assert_eq!(step.branch_target(false), Some(3));
        assert!(step.is_branching());
    }

    #[test]
    fn test_out_of_range_branch_target_is_ignored() {
        let steps = PlaybookStep::numbered(
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec![StepDefinition::new("gate", StepType::Condition).with_config(json!({
                "condition": "{{case.severity}} == critical",
                "true_step": 4294967301u64,
                "false_step": -4294967295i64
            }))],
        );

        assert_eq!(steps[0].branch_target(true), None);
        assert_eq!(steps[0].branch_target(false), None);
    }

    #[test]
    fn test_definition_from_yaml() {
        let yaml = r#"
title: Phishing response
triggerType: alert_created
steps:
  - name: Check sender
    type: condition
    config:
      condition: "{{alert.source}} == email"
      true_step: 2
  - name: Block sender
    type: automation
    actionId: block_sender
    config:
      address: "{{alert.payload.sender}}"
"#;
        let def = PlaybookDefinition::from_yaml(yaml).unwrap();

        assert_eq!(def.title, "Phishing response");
        assert_eq!(def.trigger_type, TriggerType::AlertCreated);
        assert_eq!(def.steps.len(), 2);
        assert_eq!(def.steps[1].action_id.as_deref(), Some("block_sender"));
        assert_eq!(def.steps[0].step_type, StepType::Condition);
    }

    #[test]
    fn test_definition_validation() {
        assert!(PlaybookDefinition::new("  ").validate().is_err());
        assert!(PlaybookDefinition::new("Ransomware").validate().is_ok());

        let update = PlaybookUpdate {
            title: Some(String::new()),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }
}
