//! Presets command implementation

use crate::error::Result;
use crate::output;
use colored::Colorize;
use serde::Serialize;
use transplant::plan::PRESETS;

#[derive(Serialize)]
struct PresetJson {
    name: &'static str,
    description: &'static str,
}

/// Run the presets command
pub(crate) fn run(json: bool) -> Result<()> {
    if json {
        let presets: Vec<PresetJson> = PRESETS
            .iter()
            .map(|p| PresetJson {
                name: p.name,
                description: p.description,
            })
            .collect();
        output::json(&presets)?;
        return Ok(());
    }

    output::section("Presets");
    for preset in PRESETS {
        println!("  {} {}", format!("{:<24}", preset.name).green().bold(), preset.description);
    }
    Ok(())
}
