use anyhow::Context;
use clap::Subcommand;
use colored::Colorize;
use comfy_table::Cell;
use serde_json::Value;
use soar_core::InputRequest;
use std::path::PathBuf;
use uuid::Uuid;

use super::{print_json, short_id, table, truncate};
use crate::config::CliConfig;

#[derive(Subcommand)]
pub enum InputsCommand {
    #[command(about = "List pending input requests")]
    List {
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    #[command(about = "Answer an input request and resume its execution")]
    Submit {
        #[arg(help = "Input request id")]
        id: Uuid,

        #[arg(long, conflicts_with = "file", help = "Answer as inline JSON")]
        data: Option<String>,

        #[arg(long, help = "Read the answer from a JSON file")]
        file: Option<PathBuf>,
    },
}

pub async fn handle_inputs_command(
    cmd: Option<InputsCommand>,
    config: &CliConfig,
) -> anyhow::Result<()> {
    let tenant = config.tenant()?;
    let (db, engine) = config.engine().await?;

    let result = match cmd.unwrap_or(InputsCommand::List {
        format: "text".to_string(),
    }) {
        InputsCommand::List { format } => {
            let pending = engine.list_pending_inputs(tenant).await?;
            if format == "json" {
                print_json(&pending)
            } else {
                print_input_list(&pending);
                Ok(())
            }
        }
        InputsCommand::Submit { id, data, file } => {
            let user = config.user()?;
            let answer = parse_answer(data.as_deref(), file)?;
            let submitted = engine.submit_input(tenant, id, user, answer).await?;
            engine.drain().await;
            println!(
                "{} Submitted {}; execution {} resumed",
                "✓".green().bold(),
                id,
                submitted.execution_id
            );
            Ok(())
        }
    };

    engine.shutdown().await;
    db.close().await;
    result
}

fn parse_answer(data: Option<&str>, file: Option<PathBuf>) -> anyhow::Result<Value> {
    let raw = match (data, file) {
        (Some(data), _) => data.to_string(),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => anyhow::bail!("Provide the answer with --data or --file"),
    };
    serde_json::from_str(&raw).context("Answer must be valid JSON")
}

fn print_input_list(requests: &[InputRequest]) {
    if requests.is_empty() {
        println!("{}", "No pending input requests.".dimmed());
        return;
    }

    let mut table = table(&["ID", "Execution", "Prompt", "Schema", "Requested"]);
    for request in requests {
        table.add_row(vec![
            Cell::new(request.id),
            Cell::new(short_id(request.execution_id)),
            Cell::new(request.prompt.as_deref().unwrap_or("-")),
            Cell::new(truncate(&request.input_schema.to_string(), 40)),
            Cell::new(request.requested_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }
    println!("{table}");
}
