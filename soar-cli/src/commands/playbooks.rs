use anyhow::Context;
use clap::Subcommand;
use colored::Colorize;
use comfy_table::Cell;
use soar_core::{PlaybookDefinition, PlaybookTemplate};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{print_json, short_id, table, truncate};
use crate::config::CliConfig;

#[derive(Subcommand)]
pub enum PlaybooksCommand {
    #[command(about = "List playbooks in the tenant")]
    List {
        #[arg(
            short,
            long,
            default_value = "text",
            help = "Output format (text, json)"
        )]
        format: String,
    },

    #[command(about = "Show a playbook and its steps")]
    Show {
        #[arg(help = "Playbook id")]
        id: Uuid,

        #[arg(short, long, default_value = "text")]
        format: String,
    },

    #[command(about = "Import a playbook from a YAML or JSON file")]
    Import {
        #[arg(help = "Path to the playbook definition")]
        path: PathBuf,
    },

    #[command(about = "Delete a playbook")]
    Delete {
        #[arg(help = "Playbook id")]
        id: Uuid,
    },
}

pub async fn handle_playbooks_command(
    cmd: Option<PlaybooksCommand>,
    config: &CliConfig,
) -> anyhow::Result<()> {
    let tenant = config.tenant()?;
    let (db, engine) = config.engine().await?;
    let templates = engine.templates();

    let result = match cmd.unwrap_or(PlaybooksCommand::List {
        format: "text".to_string(),
    }) {
        PlaybooksCommand::List { format } => {
            let playbooks = templates.list(tenant).await?;
            if format == "json" {
                print_json(&playbooks)
            } else {
                print_playbook_list(&playbooks);
                Ok(())
            }
        }
        PlaybooksCommand::Show { id, format } => {
            let playbook = templates.get(tenant, id).await?;
            if format == "json" {
                print_json(&playbook)
            } else {
                print_playbook(&playbook);
                Ok(())
            }
        }
        PlaybooksCommand::Import { path } => {
            let definition = read_definition(&path)?;
            let playbook = templates
                .create(tenant, config.user_id, definition)
                .await?;
            println!(
                "{} Imported {} ({} steps) as {}",
                "✓".green().bold(),
                playbook.title.bold(),
                playbook.steps.len(),
                playbook.id
            );
            Ok(())
        }
        PlaybooksCommand::Delete { id } => {
            templates.delete(tenant, id).await?;
            println!("{} Deleted playbook {}", "✓".green().bold(), id);
            Ok(())
        }
    };

    db.close().await;
    result
}

/// Reads a definition, choosing JSON by extension and YAML otherwise.
pub(crate) fn read_definition(path: &Path) -> anyhow::Result<PlaybookDefinition> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let definition = if is_json {
        PlaybookDefinition::from_json(&source)?
    } else {
        PlaybookDefinition::from_yaml(&source)?
    };
    Ok(definition)
}

fn print_playbook_list(playbooks: &[PlaybookTemplate]) {
    if playbooks.is_empty() {
        println!("{}", "No playbooks found.".dimmed());
        return;
    }

    let mut table = table(&["ID", "Title", "Trigger", "Steps", "Updated"]);
    for playbook in playbooks {
        table.add_row(vec![
            Cell::new(short_id(playbook.id)),
            Cell::new(truncate(&playbook.title, 40)),
            Cell::new(playbook.trigger_type.to_string()),
            Cell::new(playbook.steps.len().to_string()),
            Cell::new(playbook.updated_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }
    println!("{table}");
}

fn print_playbook(playbook: &PlaybookTemplate) {
    println!("{}", playbook.title.cyan().bold());
    println!("{}", "═".repeat(40).dimmed());
    println!("  {:<12} {}", "ID:".bold(), playbook.id);
    println!("  {:<12} {}", "Trigger:".bold(), playbook.trigger_type);
    if let Some(description) = &playbook.description {
        println!("  {:<12} {}", "About:".bold(), description);
    }
    println!();

    let mut table = table(&["#", "Name", "Type", "Action", "Config"]);
    for step in &playbook.steps {
        table.add_row(vec![
            Cell::new(step.order.to_string()),
            Cell::new(&step.name),
            Cell::new(step.step_type.to_string()),
            Cell::new(step.action_id.as_deref().unwrap_or("-")),
            Cell::new(truncate(&step.config.to_string(), 50)),
        ]);
    }
    println!("{table}");
}
