use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const PLAYBOOK_YAML: &str = r#"
title: Beaconing host containment
steps:
  - name: Look up destination
    type: automation
    actionId: lookup_ip
    config:
      ip: "{{alert.payload.ip}}"
      host: "{{alert.payload.host}}"
  - name: High severity?
    type: condition
    config:
      condition: "{{case.severity}} == high"
      true_step: 4
  - name: Open low priority ticket
    type: automation
    actionId: open_ticket
  - name: Containment sign-off
    type: approval
  - name: Block destination
    type: automation
    actionId: block_ip
    config:
      ip: "{{alert.payload.ip}}"
"#;

const CASE_JSON: &str = r#"{
  "title": "Beaconing from WS-114",
  "severity": "high",
  "alerts": [
    {"title": "Periodic C2 traffic", "source": "ndr", "payload": {"ip": "203.0.113.9", "host": "ws-114"}}
  ]
}"#;

struct Fixture {
    _dir: TempDir,
    playbook: PathBuf,
    case: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let playbook = dir.path().join("beaconing.yaml");
        let case = dir.path().join("case.json");
        std::fs::write(&playbook, PLAYBOOK_YAML).expect("write playbook");
        std::fs::write(&case, CASE_JSON).expect("write case");
        Self {
            _dir: dir,
            playbook,
            case,
        }
    }
}

fn rehearse(playbook: &Path, case: &Path, extra: &[&str]) -> Output {
    let mut args = vec![
        "rehearse".to_string(),
        playbook.display().to_string(),
        "--case".to_string(),
        case.display().to_string(),
        "--format".to_string(),
        "json".to_string(),
    ];
    args.extend(extra.iter().map(|s| s.to_string()));

    Command::new(env!("CARGO_BIN_EXE_soar"))
        .args(&args)
        .env_remove("DATABASE_URL")
        .env_remove("SOAR_DATABASE_URL")
        .output()
        .expect("Failed to execute soar rehearse")
}

fn parse(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("invalid json ({e}): {stdout}"))
}

fn statuses(report: &Value) -> Vec<String> {
    report["steps"]
        .as_array()
        .expect("steps array")
        .iter()
        .map(|s| s["status"].as_str().unwrap_or_default().to_string())
        .collect()
}

mod rehearse_tests {
    use super::*;

    #[test]
    fn test_rehearse_stops_at_approval() {
        let fixture = Fixture::new();
        let output = rehearse(&fixture.playbook, &fixture.case, &[]);
        assert!(
            output.status.success(),
            "rehearse failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );

        let report = parse(&output);
        assert_eq!(report["execution"]["status"], "running");
        assert_eq!(report["execution"]["mode"], "dry_run");
        assert_eq!(
            statuses(&report),
            vec![
                "completed",
                "completed",
                "pending",
                "waiting_for_approval",
                "pending"
            ]
        );

        let lookup = &report["steps"][0]["result"];
        assert_eq!(lookup["action_id"], "lookup_ip");
        assert_eq!(lookup["data"]["inputs"]["ip"], "203.0.113.9");
        assert_eq!(lookup["data"]["inputs"]["host"], "ws-114");
        assert_eq!(lookup["data"]["inputs"]["mode"], "dry_run");
    }

    #[test]
    fn test_rehearse_auto_approve_completes() {
        let fixture = Fixture::new();
        let output = rehearse(&fixture.playbook, &fixture.case, &["--auto-approve"]);
        assert!(output.status.success());

        let report = parse(&output);
        assert_eq!(report["execution"]["status"], "completed");
        assert_eq!(
            statuses(&report),
            vec!["completed", "completed", "pending", "completed", "completed"]
        );
        assert_eq!(report["steps"][4]["result"]["data"]["action"], "block_ip");
    }

    #[test]
    fn test_rehearse_missing_case_file() {
        let fixture = Fixture::new();
        let output = rehearse(&fixture.playbook, Path::new("/nonexistent/case.json"), &[]);

        assert!(!output.status.success());
        assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to read"));
    }

    #[test]
    fn test_rehearse_text_output() {
        let fixture = Fixture::new();
        let output = Command::new(env!("CARGO_BIN_EXE_soar"))
            .args([
                "rehearse",
                &fixture.playbook.display().to_string(),
                "--case",
                &fixture.case.display().to_string(),
            ])
            .output()
            .expect("Failed to execute soar rehearse");

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("Beaconing host containment"));
        assert!(stdout.contains("waiting_for_approval"));
    }
}
