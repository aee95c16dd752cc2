//! Dump, diff and apply: working with declarative state files

use std::fs;
use std::path::Path;

use colored::Colorize;
use deck_core::apply::{ReconcileReport, reconcile};
use deck_core::declarative::DeclarativeConfig;
use deck_core::diff::diff_configs;
use deck_core::export::{ExportOptions, export, flatten};
use deck_store::{EntityKind, StoreRole};

use crate::cli::Selection;
use crate::context::DeckContext;
use crate::error::{CliError, Result};
use crate::render;

/// Run `deck dump`
pub fn run_dump(
    ctx: &DeckContext,
    selection: &Selection,
    include_credentials: bool,
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let store = ctx.store(role(selection))?;
    let options = ExportOptions {
        include_targets: selection.include_targets,
        include_credentials,
    };
    let config = export(&store, &ctx.kinds(&selection.types), &options)?;

    let text = if json {
        config.to_json_string()?
    } else {
        config.to_yaml_string()?
    };

    match output {
        Some(path) => {
            fs::write(path, text)?;
            eprintln!(
                "{} Wrote {} to {}",
                "OK".green().bold(),
                render::plural(config.len(), "entity", "entities"),
                path.display()
            );
        }
        None => print!("{text}"),
    }
    Ok(())
}

/// The state file, flattened and restricted to what the export will hold
///
/// Nested lists the export skips (targets without `--include-targets`) are
/// dropped so that diff and apply compare like with like.
fn load_state(path: &Path, selection: &Selection) -> Result<(DeclarativeConfig, Vec<EntityKind>)> {
    let flat = flatten(&DeclarativeConfig::load(path)?);
    let desired = export_options(selection).retain_included(&flat);
    let kinds = if selection.types.is_empty() {
        desired.kinds().collect()
    } else {
        selection.types.clone()
    };
    Ok((desired.restrict(&kinds), kinds))
}

fn export_options(selection: &Selection) -> ExportOptions {
    ExportOptions {
        include_targets: selection.include_targets,
        include_credentials: true,
    }
}

/// Run `deck diff`
///
/// Only kinds present in the state file are compared, unless `--type` narrows
/// them further.
pub fn run_diff(ctx: &DeckContext, state: &Path, selection: &Selection, json: bool) -> Result<()> {
    let (desired, kinds) = load_state(state, selection)?;
    let store = ctx.store(role(selection))?;
    let current = if kinds.is_empty() {
        DeclarativeConfig::new()
    } else {
        export(&store, &kinds, &export_options(selection))?
    };

    let summary = diff_configs(&current, &desired);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    if summary.is_empty() {
        println!(
            "{} The {} matches {}",
            "OK".green().bold(),
            role(selection),
            state.display()
        );
        return Ok(());
    }
    render::print_diffs(&summary.diffs);
    println!();
    println!(
        "{} to reach {}",
        render::plural(summary.total_changes(), "change", "changes"),
        state.display()
    );
    Ok(())
}

/// Run `deck apply`
pub fn run_apply(
    ctx: &DeckContext,
    state: &Path,
    selection: &Selection,
    dry_run: bool,
) -> Result<()> {
    let (desired, kinds) = load_state(state, selection)?;
    let mut store = ctx.store(role(selection))?;
    let current = if kinds.is_empty() {
        DeclarativeConfig::new()
    } else {
        export(&store, &kinds, &export_options(selection))?
    };

    let report = reconcile(&mut store, &current, &desired, dry_run)?;
    print_apply(&report, selection, dry_run);

    let failed = report.failed_count();
    if failed > 0 {
        return Err(CliError::user(format!(
            "{} failed",
            render::plural(failed, "change", "changes")
        )));
    }
    Ok(())
}

fn print_apply(report: &ReconcileReport, selection: &Selection, dry_run: bool) {
    if report.summary.is_empty() {
        println!("{} The {} is up to date.", "OK".green().bold(), role(selection));
        return;
    }

    if dry_run {
        println!("{}", "Planned changes:".bold());
        render::print_diffs(&report.summary.diffs);
        return;
    }

    for result in &report.results {
        let diff = &result.diff;
        match &result.error {
            None => println!(
                "  {} {} {}",
                render::operation_marker(diff.operation),
                diff.entity_kind.singular().dimmed(),
                diff.key
            ),
            Some(error) => println!(
                "  {} {} {}: {}",
                "!".red(),
                diff.entity_kind.singular().dimmed(),
                diff.key,
                error
            ),
        }
    }
    let applied = report.results.len() - report.failed_count();
    println!(
        "{} Applied {} to the {} ({} mode)",
        "OK".green().bold(),
        render::plural(applied, "change", "changes"),
        role(selection),
        render::mode_label(report.mode)
    );
}

fn role(selection: &Selection) -> StoreRole {
    selection.target.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Target;
    use deck_test_utils::TestProject;
    use pretty_assertions::assert_eq;

    fn selection(types: Vec<EntityKind>) -> Selection {
        Selection {
            target: Target::Gateway,
            types,
            include_targets: false,
        }
    }

    const STATE: &str = r#"
_format_version: "3.0"
services:
  - name: api
    host: api.local
    routes:
      - name: api-route
        paths: ["/api"]
"#;

    #[test]
    fn state_kinds_follow_the_file() {
        let project = TestProject::new();
        let path = project.write_file("kong.yaml", STATE);

        let (desired, kinds) = load_state(&path, &selection(Vec::new())).unwrap();

        assert!(kinds.contains(&EntityKind::Service));
        assert!(kinds.contains(&EntityKind::Route));
        assert_eq!(desired.entities(EntityKind::Route).len(), 1);
    }

    #[test]
    fn type_flag_narrows_the_state() {
        let project = TestProject::new();
        let path = project.write_file("kong.yaml", STATE);

        let (desired, kinds) = load_state(&path, &selection(vec![EntityKind::Service])).unwrap();

        assert_eq!(kinds, vec![EntityKind::Service]);
        assert!(desired.entities(EntityKind::Route).is_empty());
        assert_eq!(desired.entities(EntityKind::Service).len(), 1);
    }

    #[test]
    fn targets_are_left_out_unless_included() {
        let project = TestProject::new();
        let path = project.write_file(
            "kong.yaml",
            "upstreams:\n  - name: up\n    targets:\n      - target: a:80\n",
        );

        let (plain, _) = load_state(&path, &selection(Vec::new())).unwrap();
        assert!(plain.entities(EntityKind::Upstream)[0].get("targets").is_none());

        let mut with_targets = selection(Vec::new());
        with_targets.include_targets = true;
        let (desired, _) = load_state(&path, &with_targets).unwrap();
        assert_eq!(
            desired.entities(EntityKind::Upstream)[0]["targets"],
            serde_json::json!([{"target": "a:80"}])
        );
    }
}
