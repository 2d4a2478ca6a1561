//! The `genta validate` command.

use std::path::PathBuf;

use anyhow::Result;

use crate::fixture::{parse_fixture, validate_fixture};

pub fn execute(fixture_path: PathBuf) -> Result<()> {
    let fixture = parse_fixture(&fixture_path)?;
    println!(
        "Fixture: {} ({} questions, {} answers)",
        fixture.practice.name,
        fixture.questions.len(),
        fixture.answers.len()
    );

    let warnings = validate_fixture(&fixture);
    for w in &warnings {
        let prefix = w
            .item
            .as_ref()
            .map(|id| format!("  [{id}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("Fixture valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
