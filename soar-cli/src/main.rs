use clap::{Parser, Subcommand};
use colored::Colorize;
use soar_core::{ActionRegistry, CliErrorDisplay, SoarConfig, SoarError};
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

mod commands;
mod config;

use commands::{
    handle_approvals_command, handle_executions_command, handle_inputs_command,
    handle_playbooks_command, handle_rehearse_command, handle_run_command, ApprovalsCommand,
    ExecutionsCommand, InputsCommand, PlaybooksCommand, RehearseArgs, RunArgs,
};
use config::{mask_password, CliConfig};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Parser)]
#[command(name = "soar")]
#[command(author = "Rohit Ghumare <ghumare64@gmail.com>")]
#[command(version = VERSION)]
#[command(about = "SOAR - Security playbook execution engine")]
#[command(long_about = r#"
SOAR runs incident-response playbooks against security cases. Playbooks are
ordered steps: automation actions, analyst approvals, input requests,
conditions and manual tasks.

Use 'soar init' to prepare the database, 'soar playbooks import' to load a
playbook and 'soar run' to start it against a case. 'soar rehearse' dry-runs
a playbook file in memory without a database.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON")]
    json_logs: bool,

    #[arg(long, global = true, env = "SOAR_TENANT_ID", help = "Tenant to act in")]
    tenant: Option<Uuid>,

    #[arg(long, global = true, env = "SOAR_USER_ID", help = "User acting")]
    user: Option<Uuid>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Initialize the database and run migrations")]
    Init,

    #[command(about = "Manage playbook templates")]
    Playbooks {
        #[command(subcommand)]
        action: Option<PlaybooksCommand>,
    },

    #[command(about = "Start a playbook against a case")]
    Run(RunArgs),

    #[command(about = "Inspect playbook executions")]
    Executions {
        #[command(subcommand)]
        action: ExecutionsCommand,
    },

    #[command(about = "List and decide approval requests")]
    Approvals {
        #[command(subcommand)]
        action: Option<ApprovalsCommand>,
    },

    #[command(about = "List and answer input requests")]
    Inputs {
        #[command(subcommand)]
        action: Option<InputsCommand>,
    },

    #[command(about = "Dry-run a playbook file against a case file in memory")]
    Rehearse(RehearseArgs),

    #[command(about = "Show version information")]
    Version {
        #[arg(short, long)]
        detailed: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let verbose = cli.verbose;
    init_logging(verbose, cli.json_logs);

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<SoarError>() {
                Some(soar) => {
                    if verbose {
                        soar.log();
                    }
                    eprint!("{}: {}", "Error".red().bold(), CliErrorDisplay::new(soar));
                }
                None => eprintln!("{}: {}", "Error".red().bold(), e),
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, json_logs: bool) {
    let logging = SoarConfig::load().map(|c| c.logging).unwrap_or_default();
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    if json_logs || logging.json_format {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let (tenant, user) = (cli.tenant, cli.user);
    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Playbooks { action } => {
            handle_playbooks_command(action, &CliConfig::load(tenant, user)?).await
        }
        Commands::Run(args) => handle_run_command(args, &CliConfig::load(tenant, user)?).await,
        Commands::Executions { action } => {
            handle_executions_command(action, &CliConfig::load(tenant, user)?).await
        }
        Commands::Approvals { action } => {
            handle_approvals_command(action, &CliConfig::load(tenant, user)?).await
        }
        Commands::Inputs { action } => {
            handle_inputs_command(action, &CliConfig::load(tenant, user)?).await
        }
        Commands::Rehearse(args) => handle_rehearse_command(args, user).await,
        Commands::Version { detailed } => cmd_version(detailed),
    }
}

async fn cmd_init() -> anyhow::Result<()> {
    println!("{}", "Initializing SOAR...".cyan().bold());
    println!();

    let config = CliConfig::load(None, None)?;
    println!(
        "  {} Database URL: {}",
        "→".blue(),
        mask_password(config.database_url())
    );

    println!("  {} Connecting to database...", "→".blue());
    let db = config.connect().await?;

    println!("  {} Running migrations...", "→".blue());
    db.run_migrations().await?;

    println!("  {} Verifying connection...", "→".blue());
    db.health_check().await?;

    db.close().await;

    println!();
    println!(
        "{} {}",
        "✓".green().bold(),
        "Database initialized successfully!".green()
    );

    Ok(())
}

fn cmd_version(detailed: bool) -> anyhow::Result<()> {
    if detailed {
        println!("{}", "SOAR Version Information".cyan().bold());
        println!("{}", "═".repeat(40).dimmed());
        println!("  {:<15} {}", "Version:".bold(), VERSION);
        println!("  {:<15} {}", "Name:".bold(), NAME);
        println!("  {:<15} Apache-2.0", "License:".bold());
        println!();
        println!("  {}", "Step Types:".bold());
        println!("    ▸ automation");
        println!("    ▸ approval");
        println!("    ▸ wait_for_input");
        println!("    ▸ condition");
        println!("    ▸ manual");
        println!();
        println!("  {}", "Built-in Actions:".bold());
        for action in ActionRegistry::with_builtins().list() {
            println!("    ▸ {} ({} risk)", action.id, action.risk_level);
        }
        println!();
        println!("  {}", "Build Information:".bold());
        println!("    Rust Edition: 2021");
        #[cfg(debug_assertions)]
        println!("    Build:        Debug");
        #[cfg(not(debug_assertions))]
        println!("    Build:        Release");
    } else {
        println!("soar {}", VERSION);
    }

    Ok(())
}
