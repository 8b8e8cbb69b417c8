use clap::Subcommand;
use colored::Colorize;
use comfy_table::Cell;
use soar_core::{ApprovalDecision, ApprovalRequest};
use uuid::Uuid;

use super::{print_json, short_id, status_cell, table, truncate};
use crate::config::CliConfig;

#[derive(Subcommand)]
pub enum ApprovalsCommand {
    #[command(about = "List pending approval requests")]
    List {
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    #[command(about = "Approve a pending request and resume its execution")]
    Approve {
        #[arg(help = "Approval id")]
        id: Uuid,

        #[arg(short, long, help = "Comment stored with the decision")]
        comment: Option<String>,
    },

    #[command(about = "Reject a pending request, failing its execution")]
    Reject {
        #[arg(help = "Approval id")]
        id: Uuid,

        #[arg(short, long, help = "Comment stored with the decision")]
        comment: Option<String>,
    },
}

pub async fn handle_approvals_command(
    cmd: Option<ApprovalsCommand>,
    config: &CliConfig,
) -> anyhow::Result<()> {
    let tenant = config.tenant()?;
    let (db, engine) = config.engine().await?;

    let result = match cmd.unwrap_or(ApprovalsCommand::List {
        format: "text".to_string(),
    }) {
        ApprovalsCommand::List { format } => {
            let pending = engine.list_pending_approvals(tenant).await?;
            if format == "json" {
                print_json(&pending)
            } else {
                print_approval_list(&pending);
                Ok(())
            }
        }
        ApprovalsCommand::Approve { id, comment } => {
            let user = config.user()?;
            let decided = engine
                .decide(tenant, id, user, ApprovalDecision::Approved, comment)
                .await?;
            engine.drain().await;
            println!(
                "{} Approved {}; execution {} resumed",
                "✓".green().bold(),
                id,
                decided.execution_id
            );
            Ok(())
        }
        ApprovalsCommand::Reject { id, comment } => {
            let user = config.user()?;
            let decided = engine
                .decide(tenant, id, user, ApprovalDecision::Rejected, comment)
                .await?;
            println!(
                "{} Rejected {}; execution {} failed",
                "✗".red().bold(),
                id,
                decided.execution_id
            );
            Ok(())
        }
    };

    engine.shutdown().await;
    db.close().await;
    result
}

fn print_approval_list(requests: &[ApprovalRequest]) {
    if requests.is_empty() {
        println!("{}", "No pending approvals.".dimmed());
        return;
    }

    let mut table = table(&["ID", "Execution", "Reason", "Details", "Requested", "Status"]);
    for request in requests {
        let reason = request
            .details
            .get("reason")
            .and_then(|r| r.as_str())
            .unwrap_or("-");
        let summary = request
            .details
            .get("action_id")
            .or_else(|| request.details.get("step_name"))
            .map(|v| v.to_string())
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(request.id),
            Cell::new(short_id(request.execution_id)),
            Cell::new(reason),
            Cell::new(truncate(summary.trim_matches('"'), 30)),
            Cell::new(request.requested_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            status_cell(&request.status.to_string()),
        ]);
    }
    println!("{table}");
}
