use anyhow::Context;
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use serde_json::{json, Value};
use soar_core::{
    ActionRegistry, Alert, ApprovalDecision, Case, EchoAction, EngineConfig, ExecutionMode,
    InMemoryStore, PlaybookDefinition, PlaybookEngine, RiskLevel, Stores,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use super::executions::report_execution;
use super::playbooks::read_definition;

#[derive(Args)]
pub struct RehearseArgs {
    #[arg(help = "Playbook definition (YAML or JSON)")]
    pub playbook: PathBuf,

    #[arg(long, help = "Case file (JSON) with optional alerts")]
    pub case: PathBuf,

    #[arg(long, help = "Approve gates and submit empty input as they appear")]
    pub auto_approve: bool,

    #[arg(short, long, default_value = "text")]
    pub format: String,
}

/// Case fixture read by `rehearse`.
#[derive(Debug, Deserialize)]
pub(crate) struct CaseFile {
    pub title: String,
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub alerts: Vec<AlertFile>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AlertFile {
    pub title: String,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

fn default_severity() -> String {
    "medium".to_string()
}

fn default_source() -> String {
    "rehearsal".to_string()
}

pub async fn handle_rehearse_command(args: RehearseArgs, user: Option<Uuid>) -> anyhow::Result<()> {
    let definition = read_definition(&args.playbook)?;
    let case_file = read_case(&args.case)?;

    let tenant = Uuid::new_v4();
    let user = user.unwrap_or_else(Uuid::new_v4);
    let store = Arc::new(InMemoryStore::new());
    let case = seed_case(&store, tenant, case_file).await;

    let engine = PlaybookEngine::new(
        Stores::in_memory(store),
        stand_in_actions(&definition),
        &EngineConfig::default(),
    );
    let playbook = engine.templates().create(tenant, Some(user), definition).await?;
    let (execution, _) = engine
        .start(tenant, case.id, playbook.id, user, ExecutionMode::DryRun)
        .await?;
    engine.drain().await;

    if args.auto_approve {
        resolve_gates(&engine, tenant, user, execution.id, playbook.steps.len()).await?;
    }

    let execution = engine.get_execution(tenant, execution.id).await?;
    report_execution(&engine, &execution, &args.format).await?;

    if args.format != "json" {
        for letter in engine.dead_letters().await {
            println!(
                "{} [{}] {}",
                "Cascade error:".red().bold(),
                letter.error_code,
                letter.error
            );
        }
    }

    engine.shutdown().await;
    Ok(())
}

fn read_case(path: &Path) -> anyhow::Result<CaseFile> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&source).with_context(|| format!("Invalid case file {}", path.display()))
}

async fn seed_case(store: &InMemoryStore, tenant: Uuid, file: CaseFile) -> Case {
    let mut case = Case::new(tenant, file.title, file.severity);
    case.description = file.description;
    if let Some(metadata) = file.metadata {
        case.metadata = metadata;
    }
    store.add_case(case.clone()).await;

    for alert_file in file.alerts {
        let mut alert = Alert::new(&case, alert_file.title, alert_file.source);
        if let Some(severity) = alert_file.severity {
            alert.severity = severity;
        }
        if let Some(payload) = alert_file.payload {
            alert = alert.with_payload(payload);
        }
        store.add_alert(alert).await;
    }
    case
}

/// Registers an echo action under every action id the playbook references.
pub(crate) fn stand_in_actions(definition: &PlaybookDefinition) -> ActionRegistry {
    definition
        .steps
        .iter()
        .filter_map(|step| step.action_id.as_deref())
        .filter(|id| !id.trim().is_empty())
        .fold(ActionRegistry::builder().register(EchoAction::new()), |builder, id| {
            builder.register(EchoAction::named(id, RiskLevel::Low))
        })
        .build()
}

/// Approves and answers the execution's gates until none remain or the
/// execution stops.
async fn resolve_gates(
    engine: &PlaybookEngine,
    tenant: Uuid,
    user: Uuid,
    execution_id: Uuid,
    max_rounds: usize,
) -> anyhow::Result<()> {
    for _ in 0..=max_rounds {
        if !engine.get_execution(tenant, execution_id).await?.is_running() {
            break;
        }

        let approvals: Vec<_> = engine
            .list_pending_approvals(tenant)
            .await?
            .into_iter()
            .filter(|a| a.execution_id == execution_id)
            .collect();
        let inputs: Vec<_> = engine
            .list_pending_inputs(tenant)
            .await?
            .into_iter()
            .filter(|i| i.execution_id == execution_id)
            .collect();
        if approvals.is_empty() && inputs.is_empty() {
            break;
        }

        for approval in approvals {
            engine
                .decide(
                    tenant,
                    approval.id,
                    user,
                    ApprovalDecision::Approved,
                    Some("auto-approved during rehearsal".to_string()),
                )
                .await?;
        }
        for input in inputs {
            engine.submit_input(tenant, input.id, user, json!({})).await?;
        }
        engine.drain().await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use soar_core::{StepDefinition, StepType};

    #[test]
    fn test_stand_in_actions_cover_playbook() {
        let definition = PlaybookDefinition::new("Containment")
            .with_step(StepDefinition::new("Isolate", StepType::Automation).with_action("isolate_host"))
            .with_step(StepDefinition::new("Block", StepType::Automation).with_action("block_ip"))
            .with_step(StepDefinition::new("Review", StepType::Manual));

        let registry = stand_in_actions(&definition);

        assert!(registry.get("isolate_host").is_some());
        assert!(registry.get("block_ip").is_some());
        assert!(registry.get("echo").is_some());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_case_file_defaults() {
        let file: CaseFile = serde_json::from_str(
            r#"{"title": "Beaconing", "alerts": [{"title": "C2 traffic", "payload": {"ip": "203.0.113.9"}}]}"#,
        )
        .unwrap();

        assert_eq!(file.severity, "medium");
        assert_eq!(file.alerts[0].source, "rehearsal");
        assert!(file.alerts[0].payload.is_some());
    }
}
