//! Plan command implementation
//!
//! Validates a plan file or preset and prints it back as TOML, so a preset
//! can be dumped and edited into a custom plan.

use crate::error::{CliError, Result};
use crate::output;
use std::path::Path;
use transplant::plan::SurgeryPlan;

/// Resolve `--plan FILE` or `--preset NAME` into a validated plan
pub(crate) fn load(plan: Option<&Path>, preset: Option<&str>) -> Result<SurgeryPlan> {
    match (plan, preset) {
        (Some(path), None) => {
            if !path.exists() {
                return Err(CliError::FileNotFound(path.to_path_buf()));
            }
            Ok(SurgeryPlan::load(path)?)
        }
        (None, Some(name)) => Ok(SurgeryPlan::preset(name)?),
        _ => Err(CliError::InvalidArgument(
            "exactly one of --plan or --preset is required".to_string(),
        )),
    }
}

/// Run the plan command
pub(crate) fn run(plan: &SurgeryPlan, json: bool) -> Result<()> {
    if json {
        output::json(&plan.to_config())?;
    } else {
        print!("{}", plan.to_toml_string()?);
    }
    Ok(())
}
