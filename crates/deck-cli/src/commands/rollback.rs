//! Rollback and history command implementations

use colored::Colorize;
use deck_core::SyncAuditLog;
use deck_core::rollback::{RollbackPreview, execute_rollback, preview_rollback, state_summary};
use dialoguer::Confirm;
use serde::Serialize;

use crate::context::DeckContext;
use crate::error::{CliError, Result};
use crate::render;

/// Run `deck sync rollback`
///
/// The rollback is applied to the store the sync wrote to.
pub fn run_rollback(ctx: &DeckContext, sync_id: &str, force: bool) -> Result<()> {
    let audit = ctx.audit_log();

    // The direction is only known once the log is read
    let operation = preview_rollback(&audit, sync_id, None)?.operation;
    let mut store = ctx.store(operation.target())?;
    let preview = preview_rollback(&audit, sync_id, Some(&store))?;

    print_preview(&preview);

    if !preview.can_rollback {
        return Err(CliError::user(format!(
            "Rollback of {} refused",
            preview.sync_id
        )));
    }

    if !force {
        let proceed = Confirm::new()
            .with_prompt(format!(
                "Roll back {} on the {}?",
                render::plural(preview.actions.len(), "change", "changes"),
                operation.target()
            ))
            .default(false)
            .interact()?;
        if !proceed {
            println!("{} Rollback cancelled.", "--".yellow().bold());
            return Ok(());
        }
    }

    let report = execute_rollback(&audit, &mut store, &preview)?;

    println!(
        "{} Restored {} ({} mode)",
        "OK".green().bold(),
        render::plural(report.restored(), "entity", "entities"),
        render::mode_label(report.mode)
    );
    for result in report.results.iter().filter(|r| !r.is_success()) {
        println!(
            "   {} {} '{}': {}",
            "!".red(),
            result.diff.entity_kind.singular(),
            result.diff.key,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    for error in &report.audit_errors {
        println!("   {} not audited: {}", "!".red(), error);
    }
    if let Some(id) = &report.sync_id {
        println!("Recorded as sync {}", id.cyan());
    }

    if report.failed() > 0 {
        return Err(CliError::user(format!(
            "{} could not be restored",
            render::plural(report.failed(), "entity", "entities")
        )));
    }
    if !report.audit_errors.is_empty() {
        return Err(CliError::user(format!(
            "Rollback applied but {} missing from the audit log",
            render::plural(report.audit_errors.len(), "change is", "changes are")
        )));
    }
    Ok(())
}

fn print_preview(preview: &RollbackPreview) {
    println!(
        "{} Rollback of {} ({} at {})",
        "=>".blue().bold(),
        preview.sync_id.cyan(),
        preview.operation,
        preview.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for action in &preview.actions {
        println!(
            "  {} {} {} (was {})",
            render::operation_marker(action.action),
            action.entity_type.singular().dimmed(),
            action.entity_name,
            action.original_action
        );
        tracing::debug!(
            "{} '{}': {} -> {}",
            action.entity_type,
            action.entity_name,
            state_summary(action.current_state.as_ref()),
            state_summary(action.restore_state.as_ref())
        );
    }
    if !preview.warnings.is_empty() {
        println!();
        for warning in &preview.warnings {
            println!("  {} {}", "WARNING".yellow().bold(), warning);
        }
    }
}

/// One history row as printed with `--json`
#[derive(Debug, Serialize)]
struct HistoryRow {
    sync_id: String,
    timestamp: String,
    direction: String,
    changes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    rollback_of: Option<String>,
}

/// Run `deck sync history`
pub fn run_history(ctx: &DeckContext, limit: Option<usize>, json: bool) -> Result<()> {
    let audit = ctx.audit_log();
    let rows = history(&audit, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No syncs recorded in {}", audit.dir().display());
        return Ok(());
    }
    for row in &rows {
        let note = match &row.rollback_of {
            Some(original) => format!(" (rollback of {original})"),
            None => String::new(),
        };
        println!(
            "{}  {}  {:<5} {}{}",
            row.sync_id.cyan(),
            row.timestamp.dimmed(),
            row.direction,
            render::plural(row.changes, "change", "changes"),
            note
        );
    }
    Ok(())
}

/// Most recent syncs first
fn history(audit: &SyncAuditLog, limit: Option<usize>) -> Result<Vec<HistoryRow>> {
    let mut entries = audit.entries()?;
    entries.reverse();
    if let Some(limit) = limit {
        entries.truncate(limit);
    }
    let rows = entries
        .into_iter()
        .map(|entry| {
            let changes = audit.records(&entry.sync_id).map(|r| r.len()).unwrap_or(0);
            HistoryRow {
                timestamp: entry.timestamp.to_rfc3339(),
                direction: entry.direction.to_string(),
                changes,
                rollback_of: entry.rollback_of,
                sync_id: entry.sync_id,
            }
        })
        .collect();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_core::diff::Operation;
    use deck_core::sync::Direction;
    use deck_store::EntityKind;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn history_lists_newest_first_and_honours_limit() {
        let temp = TempDir::new().unwrap();
        let audit = SyncAuditLog::new(temp.path());
        let mut ids = Vec::new();
        for direction in [Direction::Push, Direction::Pull] {
            let mut session = audit.begin(direction, None);
            session
                .record(EntityKind::Service, "api", None, Operation::Create, None, None)
                .unwrap();
            ids.push(session.sync_id().to_string());
        }

        let rows = history(&audit, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sync_id, ids[1]);
        assert_eq!(rows[0].direction, "pull");
        assert_eq!(rows[0].changes, 1);

        let limited = history(&audit, Some(1)).unwrap();
        assert_eq!(limited.len(), 1);
    }
}
