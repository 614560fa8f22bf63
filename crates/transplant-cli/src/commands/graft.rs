//! Graft command implementation
//!
//! Loads the target skeleton and every donor named by the plan, runs the
//! transfer engine and writes a fresh training checkpoint.

use crate::error::{CliError, Result};
use crate::output;
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use transplant::checkpoint::CheckpointOptions;
use transplant::plan::SurgeryPlan;
use transplant::surgery::{self, SurgeryOptions, SurgeryReport};
use transplant::transfer::TransferReport;

/// Switches of the graft command
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Flags {
    pub(crate) parallel: bool,
    pub(crate) best_fitness: bool,
    pub(crate) all: bool,
    pub(crate) json: bool,
    pub(crate) quiet: bool,
}

/// Parse a `NAME=PATH` donor argument
pub(crate) fn parse_donor(arg: &str) -> std::result::Result<(String, PathBuf), String> {
    let (name, path) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH, got '{arg}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("donor name missing in '{arg}' (expected NAME=PATH)"));
    }
    if path.is_empty() {
        return Err(format!("donor path missing in '{arg}' (expected NAME=PATH)"));
    }
    Ok((name.to_string(), PathBuf::from(path)))
}

fn donor_map(donors: Vec<(String, PathBuf)>) -> Result<BTreeMap<String, PathBuf>> {
    let mut map = BTreeMap::new();
    for (name, path) in donors {
        if !path.exists() {
            return Err(CliError::FileNotFound(path));
        }
        if map.insert(name.clone(), path).is_some() {
            return Err(CliError::InvalidArgument(format!(
                "donor '{name}' given more than once"
            )));
        }
    }
    Ok(map)
}

/// Run the graft command
pub(crate) fn run(
    plan: &SurgeryPlan,
    target: &Path,
    donors: Vec<(String, PathBuf)>,
    output: &Path,
    flags: Flags,
) -> Result<()> {
    if !target.exists() {
        return Err(CliError::FileNotFound(target.to_path_buf()));
    }
    let donor_paths = donor_map(donors)?;

    if !flags.json && !flags.quiet {
        output::section("Transplant");
        output::kv("Plan", plan.name());
        output::kv("Target", target.display());
        for (name, path) in &donor_paths {
            output::kv(&format!("Donor {name}"), path.display());
        }
        output::kv("Output", output.display());
        println!();
        println!("{}", "Grafting...".yellow());
    }

    let options = SurgeryOptions {
        parallel: flags.parallel,
        checkpoint: CheckpointOptions {
            include_best_fitness: flags.best_fitness,
        },
    };
    let report = surgery::run(plan, target, &donor_paths, output, options)?;

    if flags.json {
        output::json(&GraftJson::new(plan, &report))?;
    } else if !flags.quiet {
        display_report(&report, flags.all);
    }
    Ok(())
}

/// Machine-readable form of a finished run
#[derive(Serialize)]
struct GraftJson<'a> {
    plan: &'a str,
    architecture: &'a str,
    donors: &'a [String],
    output: &'a Path,
    output_size: u64,
    report: &'a TransferReport,
}

impl<'a> GraftJson<'a> {
    fn new(plan: &'a SurgeryPlan, report: &'a SurgeryReport) -> Self {
        Self {
            plan: plan.name(),
            architecture: &report.architecture,
            donors: &report.donors,
            output: &report.output,
            output_size: report.output_size,
            report: &report.transfer,
        }
    }
}

fn display_report(report: &SurgeryReport, all: bool) {
    let transfer = &report.transfer;
    let summary = transfer.summary();

    output::section("Records");
    if all {
        for record in transfer.records() {
            output::record(record);
        }
    } else if summary.skipped() == 0 {
        output::info("no mapped parameter was skipped");
    } else {
        for record in transfer.skipped() {
            output::record(record);
        }
    }

    output::section("Graft Report");
    output::kv("Architecture", &report.architecture);
    output::summary(&summary);
    output::kv("Output size", output::format_size(report.output_size));
    println!();

    let line = format!("applied {}/{} parameters", summary.applied(), summary.total);
    if summary.skipped() == 0 {
        output::success(&line);
    } else {
        output::warning(&format!("{line}, {} skipped", summary.skipped()));
    }
}
