//! Terminal rendering shared by the commands

use colored::{ColoredString, Colorize};
use deck_core::apply::ApplyMode;
use deck_core::conflict::display_value;
use deck_core::diff::{Changes, ConfigDiff, Operation};
use deck_store::EntityRecord;
use serde_json::Value;
use similar::{ChangeTag, TextDiff};

/// `+`, `~` or `-` in the colour of the operation
pub fn operation_marker(operation: Operation) -> ColoredString {
    match operation {
        Operation::Create => "+".green(),
        Operation::Update => "~".yellow(),
        Operation::Delete => "-".red(),
    }
}

/// One line per diff, with field detail for updates
pub fn print_diffs(diffs: &[ConfigDiff]) {
    for diff in diffs {
        println!(
            "  {} {} {}",
            operation_marker(diff.operation),
            diff.entity_kind.singular().dimmed(),
            diff.key.cyan()
        );
        if diff.operation == Operation::Update {
            print_changes(&diff.changes, "    ");
        }
    }
}

/// `field: old -> new` for each changed field
pub fn print_changes(changes: &Changes, indent: &str) {
    for (field, change) in changes {
        println!(
            "{}{}: {} {} {}",
            indent,
            field.bold(),
            display_value(&change.old).red(),
            "->".dimmed(),
            display_value(&change.new).green()
        );
    }
}

/// Line diff of two entity states as pretty JSON
pub fn state_diff(old: &EntityRecord, new: &EntityRecord) -> Vec<(ChangeTag, String)> {
    let old = pretty(old);
    let new = pretty(new);
    TextDiff::from_lines(&old, &new)
        .iter_all_changes()
        .map(|change| (change.tag(), change.value().trim_end().to_string()))
        .collect()
}

/// Print [`state_diff`] with `-`/`+` gutters
pub fn print_state_diff(old: &EntityRecord, new: &EntityRecord) {
    for (tag, line) in state_diff(old, new) {
        match tag {
            ChangeTag::Delete => println!("    {}", format!("- {line}").red()),
            ChangeTag::Insert => println!("    {}", format!("+ {line}").green()),
            ChangeTag::Equal => println!("    {}", format!("  {line}").dimmed()),
        }
    }
}

fn pretty(record: &EntityRecord) -> String {
    let mut text = serde_json::to_string_pretty(&Value::Object(record.clone())).unwrap_or_default();
    text.push('\n');
    text
}

pub fn mode_label(mode: ApplyMode) -> &'static str {
    match mode {
        ApplyMode::Incremental => "incremental",
        ApplyMode::Bulk => "bulk",
    }
}

/// `1 entity` / `3 entities`
pub fn plural(count: usize, one: &str, many: &str) -> String {
    if count == 1 {
        format!("{count} {one}")
    } else {
        format!("{count} {many}")
    }
}
