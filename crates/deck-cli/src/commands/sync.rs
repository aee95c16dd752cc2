//! Push and pull command implementations

use colored::Colorize;
use deck_core::sync::{Direction, SyncEngine, SyncReport};

use crate::cli::SyncArgs;
use crate::context::DeckContext;
use crate::error::{CliError, Result};
use crate::interactive::TerminalPrompt;
use crate::render;

/// Run `deck sync push` or `deck sync pull`
///
/// Option conflicts and missing credentials are reported before either store
/// is contacted.
pub fn run_sync(ctx: &DeckContext, direction: Direction, args: &SyncArgs) -> Result<()> {
    let options = args.options(ctx.kinds(&args.types));
    options.validate()?;

    let mut gateway = ctx.gateway()?;
    let mut control_plane = ctx.control_plane()?;
    let audit = ctx.audit_log();

    if !args.json {
        println!(
            "{} {} from {} to {}{}",
            "=>".blue().bold(),
            capitalized(direction),
            direction.source(),
            direction.target(),
            if args.dry_run { " (dry run)" } else { "" }
        );
    }

    let report = SyncEngine::new(&mut gateway, &mut control_plane)
        .with_audit(&audit)
        .run(direction, &options, &mut TerminalPrompt)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.failed.is_empty() {
        return Err(CliError::user(format!(
            "{} failed",
            render::plural(report.failed.len(), "entity", "entities")
        )));
    }
    if !report.audit_errors.is_empty() {
        return Err(CliError::user(format!(
            "{} applied but not recorded in the audit log",
            render::plural(report.audit_errors.len(), "change", "changes")
        )));
    }
    Ok(())
}

fn capitalized(direction: Direction) -> &'static str {
    match direction {
        Direction::Push => "Pushing",
        Direction::Pull => "Pulling",
    }
}

fn print_report(report: &SyncReport) {
    if report.is_cancelled() {
        println!("{} Cancelled. Nothing was changed.", "--".yellow().bold());
        return;
    }

    if report.dry_run {
        if report.planned.is_empty() && report.conflicts.is_empty() {
            println!("{} Already in sync.", "OK".green().bold());
        } else {
            println!("{}", "Planned changes:".bold());
            render::print_diffs(&report.planned);
        }
    } else if report.changed() == 0 && report.failed.is_empty() {
        if report.conflicts.is_empty() {
            println!("{} Already in sync.", "OK".green().bold());
        }
    } else {
        println!(
            "{} {} created, {} updated ({} mode)",
            "OK".green().bold(),
            report.created.len(),
            report.updated.len(),
            render::mode_label(report.mode)
        );
        for entity in &report.created {
            println!("   {} {}", "+".green(), entity);
        }
        for entity in &report.updated {
            println!("   {} {}", "~".yellow(), entity);
        }
    }

    if !report.conflicts.is_empty() {
        println!();
        println!(
            "{} {}:",
            "DRIFT".yellow().bold(),
            render::plural(report.conflicts.len(), "drifted entity", "drifted entities")
        );
        for conflict in &report.conflicts {
            println!(
                "   {} {} '{}' ({})",
                "!".yellow(),
                conflict.entity_kind.singular(),
                conflict.key,
                conflict.drift_fields.join(", ")
            );
        }
    }
    for detail in &report.drift {
        println!("   {}", detail.entity.to_string().bold());
        render::print_changes(&detail.changes, "      ");
    }

    for entity in &report.kept_target {
        println!("   {} {} (kept target)", "=".dimmed(), entity);
    }
    if let Some(message) = report.conflicts_skipped_message() {
        println!("{} {}", "SKIPPED".yellow().bold(), message);
    }

    if !report.target_only.is_empty() {
        println!();
        println!(
            "{} only on the {} (left untouched):",
            render::plural(report.target_only.len(), "entity", "entities"),
            report.direction.target()
        );
        for entity in &report.target_only {
            println!("   {} {}", "?".dimmed(), entity);
        }
    }

    if !report.failed.is_empty() {
        println!();
        println!("{}", "Failed:".red().bold());
        for failed in &report.failed {
            println!("   {} {}: {}", "!".red(), failed.entity, failed.error);
        }
    }

    if !report.audit_errors.is_empty() {
        println!();
        println!("{}", "Not audited:".red().bold());
        for error in &report.audit_errors {
            println!("   {} {}", "!".red(), error);
        }
    }

    if let Some(sync_id) = &report.sync_id {
        println!();
        println!("Sync id: {}", sync_id.cyan());
        println!(
            "Undo with {}",
            format!("deck sync rollback {sync_id}").cyan()
        );
    }
}
