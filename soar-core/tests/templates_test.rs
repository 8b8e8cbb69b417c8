use std::sync::Arc;

use serde_json::json;
use soar_core::config::EngineConfig;
use soar_core::engine::{ActionRegistry, PlaybookEngine};
use soar_core::error::SoarError;
use soar_core::models::{
    Case, ExecutionMode, PlaybookDefinition, PlaybookUpdate, StepDefinition, StepType,
    TriggerType,
};
use soar_core::repo::{InMemoryStore, Stores};
use uuid::Uuid;

const CONTAINMENT_YAML: &str = r#"
title: Phishing containment
description: Pull the message and block the sender
triggerType: alert_created
steps:
  - name: Enrich sender
    type: automation
    actionId: echo
    config:
      sender: "{{alert.payload.sender}}"
  - name: Severity gate
    type: condition
    config:
      condition: "{{case.severity}} == high"
      true_step: 4
  - name: Notify owner
    type: manual
  - name: Analyst sign-off
    type: approval
"#;

fn engine() -> (Arc<PlaybookEngine>, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let engine = PlaybookEngine::new(
        Stores::in_memory(store.clone()),
        ActionRegistry::with_builtins(),
        &EngineConfig::default(),
    );
    (engine, store)
}

mod definition_tests {
    use super::*;

    #[test]
    fn test_yaml_definition() {
        let definition = PlaybookDefinition::from_yaml(CONTAINMENT_YAML).unwrap();

        assert_eq!(definition.title, "Phishing containment");
        assert_eq!(definition.trigger_type, TriggerType::AlertCreated);
        assert_eq!(definition.steps.len(), 4);
        assert_eq!(definition.steps[0].action_id.as_deref(), Some("echo"));
        assert_eq!(definition.steps[1].step_type, StepType::Condition);
        assert_eq!(definition.steps[2].config, json!({}));
    }

    #[test]
    fn test_json_definition() {
        let definition = PlaybookDefinition::from_json(
            r#"{"title": "Triage", "steps": [{"name": "Look", "type": "manual"}]}"#,
        )
        .unwrap();

        assert_eq!(definition.trigger_type, TriggerType::Manual);
        assert_eq!(definition.steps[0].step_type, StepType::Manual);
    }

    #[test]
    fn test_unknown_step_type_is_rejected() {
        let result = PlaybookDefinition::from_json(
            r#"{"title": "Triage", "steps": [{"name": "Look", "type": "teleport"}]}"#,
        );
        assert!(result.is_err());
    }
}

mod crud_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_numbers_steps_from_one() {
        let (engine, _) = engine();
        let tenant = Uuid::new_v4();
        let definition = PlaybookDefinition::from_yaml(CONTAINMENT_YAML).unwrap();

        let playbook = engine
            .templates()
            .create(tenant, None, definition)
            .await
            .unwrap();

        let orders: Vec<i32> = playbook.steps.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4]);
        assert!(playbook.steps.iter().all(|s| s.playbook_id == playbook.id));

        let fetched = engine.templates().get(tenant, playbook.id).await.unwrap();
        assert_eq!(fetched.title, playbook.title);
        assert_eq!(fetched.steps.len(), 4);
        assert_eq!(fetched.first_step().unwrap().name, "Enrich sender");
        assert_eq!(fetched.step_at(4).unwrap().step_type, StepType::Approval);
    }

    #[tokio::test]
    async fn test_create_requires_title() {
        let (engine, _) = engine();
        let err = engine
            .templates()
            .create(Uuid::new_v4(), None, PlaybookDefinition::new("  "))
            .await
            .unwrap_err();

        assert!(matches!(err, SoarError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_update_replaces_steps() {
        let (engine, _) = engine();
        let tenant = Uuid::new_v4();
        let playbook = engine
            .templates()
            .create(
                tenant,
                None,
                PlaybookDefinition::from_yaml(CONTAINMENT_YAML).unwrap(),
            )
            .await
            .unwrap();

        let update = PlaybookUpdate {
            title: Some("Phishing containment v2".to_string()),
            steps: Some(vec![
                StepDefinition::new("Approve purge", StepType::Approval),
                StepDefinition::new("Purge", StepType::Automation).with_action("echo"),
            ]),
            ..Default::default()
        };
        let updated = engine
            .templates()
            .update(tenant, playbook.id, update)
            .await
            .unwrap();

        assert_eq!(updated.title, "Phishing containment v2");
        assert_eq!(
            updated.description.as_deref(),
            Some("Pull the message and block the sender")
        );
        assert_eq!(updated.steps.len(), 2);
        assert_eq!(updated.steps[0].order, 1);
        assert_eq!(updated.steps[0].step_type, StepType::Approval);
        assert_eq!(updated.steps[1].order, 2);
        assert!(updated
            .steps
            .iter()
            .all(|s| playbook.steps.iter().all(|old| old.id != s.id)));
    }

    #[tokio::test]
    async fn test_update_without_steps_keeps_them() {
        let (engine, _) = engine();
        let tenant = Uuid::new_v4();
        let playbook = engine
            .templates()
            .create(
                tenant,
                None,
                PlaybookDefinition::from_yaml(CONTAINMENT_YAML).unwrap(),
            )
            .await
            .unwrap();

        let updated = engine
            .templates()
            .update(
                tenant,
                playbook.id,
                PlaybookUpdate {
                    trigger_type: Some(TriggerType::CaseCreated),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.trigger_type, TriggerType::CaseCreated);
        let ids: Vec<Uuid> = updated.steps.iter().map(|s| s.id).collect();
        let original: Vec<Uuid> = playbook.steps.iter().map(|s| s.id).collect();
        assert_eq!(ids, original);

        let err = engine
            .templates()
            .update(
                tenant,
                playbook.id,
                PlaybookUpdate {
                    title: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SoarError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let (engine, _) = engine();
        let tenant = Uuid::new_v4();
        let playbook = engine
            .templates()
            .create(tenant, None, PlaybookDefinition::new("Short lived"))
            .await
            .unwrap();

        engine.templates().delete(tenant, playbook.id).await.unwrap();

        let err = engine.templates().get(tenant, playbook.id).await.unwrap_err();
        assert!(matches!(err, SoarError::PlaybookNotFound(_)));
        let err = engine
            .templates()
            .delete(tenant, playbook.id)
            .await
            .unwrap_err();
        assert!(matches!(err, SoarError::PlaybookNotFound(_)));
    }

    #[tokio::test]
    async fn test_templates_are_tenant_scoped() {
        let (engine, _) = engine();
        let tenant = Uuid::new_v4();
        let other = Uuid::new_v4();
        let playbook = engine
            .templates()
            .create(tenant, None, PlaybookDefinition::new("Mine"))
            .await
            .unwrap();
        engine
            .templates()
            .create(other, None, PlaybookDefinition::new("Theirs"))
            .await
            .unwrap();

        assert!(engine.templates().get(other, playbook.id).await.is_err());
        assert!(engine.templates().delete(other, playbook.id).await.is_err());
        let mine = engine.templates().list(tenant).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "Mine");
    }
}

mod history_tests {
    use super::*;

    #[tokio::test]
    async fn test_execution_outlives_template_delete() {
        let (engine, store) = engine();
        let tenant = Uuid::new_v4();
        let case = Case::new(tenant, "Suspicious login", "medium");
        store.add_case(case.clone()).await;
        let playbook = engine
            .templates()
            .create(
                tenant,
                None,
                PlaybookDefinition::new("Login review")
                    .with_step(StepDefinition::new("Review", StepType::Manual)),
            )
            .await
            .unwrap();
        let user = Uuid::new_v4();
        let execution = engine
            .run(tenant, case.id, playbook.id, user, ExecutionMode::Run)
            .await
            .unwrap();

        engine.templates().delete(tenant, playbook.id).await.unwrap();

        let kept = engine.get_execution(tenant, execution.id).await.unwrap();
        assert_eq!(kept.playbook_id, playbook.id);
        let steps = engine
            .list_execution_steps(tenant, execution.id)
            .await
            .unwrap();
        assert_eq!(steps.len(), 1);
    }
}
