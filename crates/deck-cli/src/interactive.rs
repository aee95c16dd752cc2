//! Interactive prompts for CLI commands
//!
//! Uses dialoguer for terminal-based confirmation and conflict resolution.

use std::collections::BTreeSet;

use colored::Colorize;
use deck_core::conflict::{Conflict, OperatorPrompt, Resolution, ResolutionAction};
use dialoguer::{Confirm, MultiSelect, Select};

use crate::render;

/// Choices offered for each conflict, in menu order
const CHOICES: &[&str] = &[
    "Keep source (overwrite target)",
    "Keep target",
    "Merge field by field",
    "Skip",
];

/// Operator answering through the terminal
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl OperatorPrompt for TerminalPrompt {
    fn confirm(&mut self, message: &str) -> deck_core::Result<bool> {
        Confirm::new()
            .with_prompt(message)
            .default(false)
            .interact()
            .map_err(prompt_error)
    }

    fn resolve_conflicts(&mut self, conflicts: &[Conflict]) -> deck_core::Result<Vec<Resolution>> {
        let mut resolutions = Vec::with_capacity(conflicts.len());
        for (index, conflict) in conflicts.iter().enumerate() {
            println!();
            println!(
                "{} {} {} '{}' ({} of {})",
                "CONFLICT".yellow().bold(),
                conflict.direction,
                conflict.entity_kind.singular(),
                conflict.key.cyan(),
                index + 1,
                conflicts.len()
            );
            println!(
                "  {} target ({}) {} source ({})",
                "-".red(),
                conflict.direction.target(),
                "+".green(),
                conflict.direction.source()
            );
            render::print_state_diff(&conflict.target_state, &conflict.source_state);

            let choice = Select::new()
                .with_prompt("Resolve")
                .items(CHOICES)
                .default(0)
                .interact()
                .map_err(prompt_error)?;
            let action = match choice {
                0 => ResolutionAction::KeepSource,
                1 => ResolutionAction::KeepTarget,
                2 => ResolutionAction::Merge(merge(conflict)?),
                _ => ResolutionAction::Skip,
            };
            tracing::debug!("{} '{}': {}", conflict.entity_kind, conflict.key, action.label());
            resolutions.push(Resolution::new(conflict.clone(), action));
        }
        Ok(resolutions)
    }
}

/// Ask which drifted fields to take from the source
fn merge(conflict: &Conflict) -> deck_core::Result<deck_store::EntityRecord> {
    let picked = MultiSelect::new()
        .with_prompt("Fields to take from the source (space to toggle, enter to confirm)")
        .items(&conflict.drift_fields)
        .interact()
        .map_err(prompt_error)?;
    let fields: BTreeSet<String> = picked
        .into_iter()
        .map(|i| conflict.drift_fields[i].clone())
        .collect();
    Ok(conflict.merge_fields(&fields))
}

fn prompt_error(e: dialoguer::Error) -> deck_core::Error {
    deck_core::Error::Io(std::io::Error::other(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_order_matches_actions() {
        assert_eq!(CHOICES.len(), 4);
        assert!(CHOICES[0].starts_with("Keep source"));
        assert_eq!(CHOICES[3], "Skip");
    }
}
