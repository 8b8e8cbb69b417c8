use clap::Args;
use colored::Colorize;
use soar_core::{ExecutionMode, StepOutcome};
use uuid::Uuid;

use super::executions::report_execution;
use crate::config::CliConfig;

#[derive(Args)]
pub struct RunArgs {
    #[arg(help = "Playbook id")]
    pub playbook: Uuid,

    #[arg(long, help = "Case id to run against")]
    pub case: Uuid,

    #[arg(long, help = "Invoke actions in dry-run mode and skip risk approvals")]
    pub dry_run: bool,

    #[arg(short, long, default_value = "text")]
    pub format: String,
}

pub async fn handle_run_command(args: RunArgs, config: &CliConfig) -> anyhow::Result<()> {
    let tenant = config.tenant()?;
    let user = config.user()?;
    let mode = if args.dry_run {
        ExecutionMode::DryRun
    } else {
        ExecutionMode::Run
    };

    let (db, engine) = config.engine().await?;
    let started = engine
        .start(tenant, args.case, args.playbook, user, mode)
        .await;

    let result = match started {
        Ok((execution, outcome)) => {
            engine.drain().await;
            if args.format != "json" {
                print_first_outcome(outcome.as_ref());
            }
            let execution = engine.get_execution(tenant, execution.id).await?;
            report_execution(&engine, &execution, &args.format).await
        }
        Err(e) => Err(e.into()),
    };

    engine.shutdown().await;
    db.close().await;
    result
}

fn print_first_outcome(outcome: Option<&StepOutcome>) {
    match outcome {
        None => println!("{} First step is manual; waiting for an analyst.", "!".yellow()),
        Some(StepOutcome::Completed { .. }) => {
            println!("{} First step completed.", "✓".green().bold())
        }
        Some(StepOutcome::Failed { error }) => {
            println!("{} First step failed: {}", "✗".red().bold(), error)
        }
        Some(StepOutcome::AwaitingApproval { approval_id, .. }) => println!(
            "{} Waiting for approval {}",
            "!".yellow(),
            approval_id
        ),
        Some(StepOutcome::AwaitingInput { input_id, .. }) => {
            println!("{} Waiting for input {}", "!".yellow(), input_id)
        }
    }
    println!();
}
