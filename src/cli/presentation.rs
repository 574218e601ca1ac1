//! CLI presentation: text tables and JSON for command results.

use crate::error::JanitorError;
use crate::purge::{PurgeOutcome, PurgeProgress, Status};
use crate::scan::RoomSizeReport;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;

fn to_json<T: Serialize>(value: &T) -> Result<String, JanitorError> {
    serde_json::to_string_pretty(value).map_err(|e| JanitorError::Output(e.to_string()))
}

fn section_title(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn status_cell(status: Status) -> String {
    match status {
        Status::Complete => status.green().to_string(),
        Status::Failed => status.red().to_string(),
        Status::Purging | Status::ShuttingDown => status.yellow().to_string(),
        Status::Unknown => status.dimmed().to_string(),
    }
}

pub fn format_room_report_text(report: &RoomSizeReport, threshold: u64) -> String {
    if report.rooms.is_empty() {
        return format!(
            "No room has more than {} state rows ({} rows in total).",
            threshold, report.total
        );
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Room", "Name", "State rows"]);
    for room in &report.rooms {
        table.add_row(vec![
            room.room_id.clone(),
            room.name.clone().unwrap_or_default(),
            room.rows.to_string(),
        ]);
    }
    table.add_row(vec!["(others)".to_string(), String::new(), report.others.to_string()]);

    format!(
        "{}\n{}\nTotal state rows: {}",
        section_title("Largest rooms"),
        table,
        report.total
    )
}

pub fn format_room_report_json(report: &RoomSizeReport) -> Result<String, JanitorError> {
    to_json(report)
}

pub fn format_progress_text(progress: Option<&PurgeProgress>) -> String {
    let Some(progress) = progress else {
        return "No purge in progress.".to_string();
    };

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Room", "Name", "Ban", "Status", "Affected users", "Error"]);
    for room in &progress.rooms {
        table.add_row(vec![
            room.room_id.clone(),
            room.name.clone().unwrap_or_default(),
            if room.ban { "yes" } else { "no" }.to_string(),
            status_cell(room.status),
            room.affected_users.len().to_string(),
            room.error.clone().unwrap_or_default(),
        ]);
    }

    format!(
        "{}\n{}\nstate_groups_state: {}% ({}/{} state groups, {} rows deleted, {} errors)",
        section_title("Purge in progress"),
        table,
        progress.state_groups_state_progress,
        progress.state_groups_deleted,
        progress.state_group_count,
        progress.rows_deleted,
        progress.delete_errors
    )
}

pub fn format_progress_json(progress: Option<&PurgeProgress>) -> Result<String, JanitorError> {
    to_json(&progress)
}

pub fn format_purge_outcome(outcome: &PurgeOutcome) -> String {
    match outcome {
        PurgeOutcome::NothingToDo => "No purge in progress.".to_string(),
        PurgeOutcome::Cancelled => {
            "Purge interrupted. Progress was saved; run `janitor resume` to continue.".to_string()
        }
        PurgeOutcome::Completed(summary) => format!(
            "Purge complete:\n  Rooms: {}\n  State groups: {}\n  state_groups_state rows deleted: {}\n  Delete errors: {}\n  State group rows deleted: {}",
            summary.rooms,
            summary.state_groups,
            summary.rows_deleted,
            summary.delete_errors,
            summary.cleanup_rows
        ),
    }
}

pub fn format_verify_result(rooms: &[String], remaining: &[(String, u64)]) -> String {
    if remaining.is_empty() {
        return format!(
            "{} No state rows left for {} room(s).",
            "OK".green(),
            rooms.len()
        );
    }
    let mut lines = vec![format!(
        "{} {} of {} room(s) still have state rows:",
        "WARN".yellow(),
        remaining.len(),
        rooms.len()
    )];
    for (room_id, rows) in remaining {
        lines.push(format!("  - {}: {} rows", room_id, rows));
    }
    lines.join("\n")
}
