use clap::Subcommand;
use colored::Colorize;
use comfy_table::Cell;
use serde_json::json;
use soar_core::{ExecutionStep, PlaybookEngine, PlaybookExecution, PlaybookTemplate};
use uuid::Uuid;

use super::{print_json, short_id, status_cell, table, truncate};
use crate::config::CliConfig;

#[derive(Subcommand)]
pub enum ExecutionsCommand {
    #[command(about = "Show an execution and the state of each step")]
    Show {
        #[arg(help = "Execution id")]
        id: Uuid,

        #[arg(short, long, default_value = "text")]
        format: String,
    },

    #[command(about = "List executions for a case")]
    List {
        #[arg(long, help = "Case id")]
        case: Uuid,

        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

pub async fn handle_executions_command(
    cmd: ExecutionsCommand,
    config: &CliConfig,
) -> anyhow::Result<()> {
    let tenant = config.tenant()?;
    let (db, engine) = config.engine().await?;

    let result = match cmd {
        ExecutionsCommand::Show { id, format } => {
            let execution = engine.get_execution(tenant, id).await?;
            report_execution(&engine, &execution, &format).await
        }
        ExecutionsCommand::List { case, format } => {
            let executions = engine.list_executions(tenant, case).await?;
            if format == "json" {
                print_json(&executions)
            } else {
                print_execution_list(&executions);
                Ok(())
            }
        }
    };

    db.close().await;
    result
}

/// Prints an execution with its steps, joined to template step names when
/// the template still exists.
pub(crate) async fn report_execution(
    engine: &PlaybookEngine,
    execution: &PlaybookExecution,
    format: &str,
) -> anyhow::Result<()> {
    let steps = engine
        .list_execution_steps(execution.tenant_id, execution.id)
        .await?;
    let template = engine
        .templates()
        .get(execution.tenant_id, execution.playbook_id)
        .await
        .ok();

    if format == "json" {
        return print_json(&json!({
            "execution": execution,
            "steps": steps,
        }));
    }

    println!("{} {}", "Execution".cyan().bold(), execution.id);
    println!("{}", "═".repeat(40).dimmed());
    if let Some(template) = &template {
        println!("  {:<10} {}", "Playbook:".bold(), template.title);
    }
    println!("  {:<10} {}", "Case:".bold(), execution.case_id);
    println!("  {:<10} {}", "Mode:".bold(), execution.mode);
    println!("  {:<10} {}", "Status:".bold(), colored_status(&execution.status.to_string()));
    if let Some(seconds) = execution.duration_seconds() {
        println!("  {:<10} {}s", "Duration:".bold(), seconds);
    }
    if let Some(error) = &execution.error {
        println!("  {:<10} {}", "Error:".bold(), error.red());
    }
    println!();

    print_steps(&steps, template.as_ref());
    Ok(())
}

fn print_steps(steps: &[ExecutionStep], template: Option<&PlaybookTemplate>) {
    let mut table = table(&["Step", "#", "Name", "Status", "Result"]);
    for step in steps {
        let template_step =
            template.and_then(|t| t.steps.iter().find(|s| s.id == step.step_id));
        table.add_row(vec![
            Cell::new(short_id(step.id)),
            Cell::new(
                template_step
                    .map(|s| s.order.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(template_step.map(|s| s.name.as_str()).unwrap_or("(removed)")),
            status_cell(&step.status.to_string()),
            Cell::new(
                step.result
                    .as_ref()
                    .map(|r| truncate(&r.to_string(), 60))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }
    println!("{table}");
}

fn print_execution_list(executions: &[PlaybookExecution]) {
    if executions.is_empty() {
        println!("{}", "No executions found.".dimmed());
        return;
    }

    let mut table = table(&["ID", "Playbook", "Mode", "Status", "Started"]);
    for execution in executions {
        table.add_row(vec![
            Cell::new(short_id(execution.id)),
            Cell::new(short_id(execution.playbook_id)),
            Cell::new(execution.mode.to_string()),
            status_cell(&execution.status.to_string()),
            Cell::new(execution.started_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }
    println!("{table}");
}

fn colored_status(status: &str) -> colored::ColoredString {
    match status {
        "completed" => status.green(),
        "failed" => status.red(),
        _ => status.yellow(),
    }
}
