pub mod approvals;
pub mod executions;
pub mod inputs;
pub mod playbooks;
pub mod rehearse;
pub mod run;

pub use approvals::{handle_approvals_command, ApprovalsCommand};
pub use executions::{handle_executions_command, ExecutionsCommand};
pub use inputs::{handle_inputs_command, InputsCommand};
pub use playbooks::{handle_playbooks_command, PlaybooksCommand};
pub use rehearse::{handle_rehearse_command, RehearseArgs};
pub use run::{handle_run_command, RunArgs};

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use serde::Serialize;
use uuid::Uuid;

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).fg(Color::White))
                .collect::<Vec<_>>(),
        );
    table
}

pub(crate) fn status_cell(status: &str) -> Cell {
    let color = match status {
        "completed" | "approved" | "submitted" => Color::Green,
        "failed" | "rejected" => Color::Red,
        "pending" | "waiting_for_approval" | "waiting_for_input" => Color::Yellow,
        "running" | "in_progress" => Color::Cyan,
        _ => Color::DarkGrey,
    };
    Cell::new(status).fg(color)
}

pub(crate) fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
