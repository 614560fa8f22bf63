//! Output formatting utilities

use colored::Colorize;
use serde::Serialize;
use transplant::transfer::{TransferOutcome, TransferRecord, TransferSummary};

/// Print a section header
pub(crate) fn section(title: &str) {
    println!("\n{}", format!("=== {title} ===").cyan().bold());
}

/// Print a key-value pair
pub(crate) fn kv(key: &str, value: impl std::fmt::Display) {
    println!("  {}: {}", key.white().bold(), value);
}

/// Print a success message
pub(crate) fn success(msg: &str) {
    println!("{} {}", "[PASS]".green().bold(), msg);
}

/// Print a warning message
pub(crate) fn warning(msg: &str) {
    println!("{} {}", "[WARN]".yellow().bold(), msg);
}

/// Print an info message
pub(crate) fn info(msg: &str) {
    println!("{} {}", "[INFO]".blue(), msg);
}

/// Print a value as pretty JSON on stdout
pub(crate) fn json<T: Serialize>(value: &T) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Format bytes as human-readable size
pub(crate) fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Tag shown in front of a transfer record
pub(crate) fn outcome_tag(outcome: &TransferOutcome) -> String {
    let tag = format!("[{:>15}]", outcome.label());
    match outcome {
        TransferOutcome::Transferred { .. } => tag.green().to_string(),
        TransferOutcome::ChannelReduced { .. } => tag.cyan().to_string(),
        TransferOutcome::ShapeMismatchSkipped { .. } | TransferOutcome::SourceAbsent { .. } => {
            tag.yellow().to_string()
        }
        TransferOutcome::Unmapped => tag.dimmed().to_string(),
    }
}

/// Print one transfer record
pub(crate) fn record(record: &TransferRecord) {
    println!("  {} {record}", outcome_tag(&record.outcome));
}

/// Print the outcome counts of a run
pub(crate) fn summary(summary: &TransferSummary) {
    kv("Parameters", summary.total);
    kv("Transferred", summary.transferred);
    kv("Channel-reduced", summary.channel_reduced);
    kv("Shape mismatch", summary.shape_mismatch);
    kv("Source absent", summary.source_absent);
    kv("Unmapped", summary.unmapped);
}
