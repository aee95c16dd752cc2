//! Status command implementation
//!
//! Compares both stores without changing either.

use colored::Colorize;
use deck_core::sync::SyncEngine;
use deck_core::unified::{Source, UnifiedView};
use deck_store::EntityKind;

use crate::context::DeckContext;
use crate::error::Result;
use crate::render;

pub fn run_status(
    ctx: &DeckContext,
    types: &[EntityKind],
    include_targets: bool,
    json: bool,
) -> Result<()> {
    let mut gateway = ctx.gateway()?;
    let mut control_plane = ctx.control_plane()?;
    let kinds = ctx.kinds(types);

    let view = SyncEngine::new(&mut gateway, &mut control_plane).status(&kinds, include_targets)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_view(&view);
    }
    Ok(())
}

fn print_view(view: &UnifiedView) {
    if view.entities.is_empty() {
        println!("{} Both stores are empty.", "OK".green().bold());
        return;
    }

    println!(
        "{:<16} {:>8} {:>8} {:>8} {:>8}",
        "TYPE".bold(),
        "SYNCED".bold(),
        "DRIFT".bold(),
        "GATEWAY".bold(),
        "CP".bold()
    );
    for (kind, summary) in &view.summary {
        println!(
            "{:<16} {:>8} {:>8} {:>8} {:>8}",
            kind.plural(),
            summary.synced,
            summary.drift,
            summary.gateway_only,
            summary.control_plane_only
        );
    }
    println!();

    for entity in &view.entities {
        let (marker, note) = match (entity.source, entity.has_drift) {
            (Source::Both, false) => continue,
            (Source::Both, true) => ("!".yellow(), entity.drift_fields.join(", ")),
            (Source::Gateway, _) => ("<".cyan(), "gateway only".to_string()),
            (Source::ControlPlane, _) => (">".cyan(), "control plane only".to_string()),
        };
        println!(
            "  {} {} {} ({})",
            marker,
            entity.kind.singular().dimmed(),
            entity.key,
            note
        );
        if entity.has_drift {
            render::print_changes(&entity.drift, "      ");
        }
    }

    if view.in_sync() {
        println!("{} Gateway and control plane are in sync.", "OK".green().bold());
    } else {
        let totals = view.totals();
        println!(
            "{} {} drifted, {} gateway only, {} control plane only",
            "=>".blue().bold(),
            render::plural(totals.drift, "entity", "entities"),
            totals.gateway_only,
            totals.control_plane_only
        );
    }
}
