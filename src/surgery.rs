//! Complete transplant runs.
//!
//! [`graft`] works on in-memory networks; [`run`] adds the file boundary:
//! it loads the target skeleton and every donor, transfers, assembles the
//! checkpoint and writes it. Loading finishes (or fails) before any transfer
//! starts.

use crate::checkpoint::{Checkpoint, CheckpointOptions, Network, Provenance};
use crate::error::{Result, TransplantError};
use crate::plan::SurgeryPlan;
use crate::state::TensorState;
use crate::transfer::{transfer, transfer_parallel, Donor, DonorSet, TransferReport};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Options for a transplant run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurgeryOptions {
    /// Use the rayon-backed engine
    pub parallel: bool,
    /// Checkpoint fields to write
    pub checkpoint: CheckpointOptions,
}

/// Result of [`graft`].
#[derive(Debug, Clone)]
pub struct Graft {
    pub checkpoint: Checkpoint,
    pub report: TransferReport,
}

/// Report of a file-to-file [`run`].
#[derive(Debug, Clone)]
pub struct SurgeryReport {
    /// Per-key records of the transfer
    pub transfer: TransferReport,
    /// Architecture recorded in the checkpoint
    pub architecture: String,
    /// Donor ids used, sorted
    pub donors: Vec<String>,
    /// Checkpoint path
    pub output: PathBuf,
    /// Checkpoint size in bytes
    pub output_size: u64,
}

// ============================================================================
// HELPERS
// ============================================================================

/// Check that donor paths cover exactly the donors the plan uses.
fn validate_donor_paths(plan: &SurgeryPlan, paths: &BTreeMap<String, PathBuf>) -> Result<()> {
    for branch in plan.table().branches() {
        if !paths.contains_key(branch.donor()) {
            return Err(TransplantError::MissingDonor {
                branch: branch.name().to_string(),
                donor: branch.donor().to_string(),
            });
        }
    }
    let used = plan.table().donors();
    if let Some(extra) = paths.keys().find(|id| !used.contains(id.as_str())) {
        return Err(TransplantError::Config {
            message: format!("donor '{extra}' is not used by plan '{}'", plan.name()),
        });
    }
    Ok(())
}

/// Load every donor of `plan`, applying its naming overrides.
///
/// # Errors
///
/// Returns an error if a donor required by the plan has no path, a path is
/// given for a donor the plan does not use, a file fails to load, or a
/// donor's naming cannot be detected.
pub fn load_donors(plan: &SurgeryPlan, paths: &BTreeMap<String, PathBuf>) -> Result<DonorSet> {
    validate_donor_paths(plan, paths)?;
    let mut donors = DonorSet::new();
    for (id, path) in paths {
        let state = TensorState::load(path)?;
        let donor = match plan.donor_naming(id) {
            Some(naming) => Donor::with_naming(id, state, naming.clone()),
            None => Donor::detect(id, state)?,
        };
        donors.insert(donor);
    }
    Ok(donors)
}

// ============================================================================
// RUNS
// ============================================================================

/// Transplant `donors` into `target` according to `plan`.
///
/// # Errors
///
/// Returns the engine's pre-transfer errors (missing donor, stray reduction
/// stem). Per-key problems are recorded in the report instead.
pub fn graft(
    plan: &SurgeryPlan,
    target: Network,
    donors: &DonorSet,
    options: SurgeryOptions,
) -> Result<Graft> {
    let engine = if options.parallel {
        transfer_parallel
    } else {
        transfer
    };
    let (state, report) = engine(target.state(), donors, plan.table(), plan.policy())?;

    let mut network = target;
    network.load_state(state)?;

    let provenance = Provenance::new(plan.table().donors(), report.summary());
    let checkpoint = Checkpoint::assemble(network, options.checkpoint).with_provenance(provenance);
    Ok(Graft { checkpoint, report })
}

/// Load, transplant and write a checkpoint.
///
/// # Errors
///
/// Any load error aborts the run before transfer; see also [`graft`] and
/// [`Checkpoint::save`].
pub fn run<P: AsRef<Path>>(
    plan: &SurgeryPlan,
    target: P,
    donor_paths: &BTreeMap<String, PathBuf>,
    output: P,
    options: SurgeryOptions,
) -> Result<SurgeryReport> {
    let target = Network::load_with_resolver(target, plan.target_resolver())?;
    let donors = load_donors(plan, donor_paths)?;
    info!(
        plan = plan.name(),
        architecture = target.architecture(),
        donors = donors.len(),
        "load phase complete"
    );

    let Graft { checkpoint, report } = graft(plan, target, &donors, options)?;

    let output = output.as_ref();
    let output_size = checkpoint.save(output)?;

    Ok(SurgeryReport {
        transfer: report,
        architecture: checkpoint.model.architecture().to_string(),
        donors: donors.ids().map(str::to_string).collect(),
        output: output.to_path_buf(),
        output_size,
    })
}

#[cfg(test)]
#[path = "surgery_tests.rs"]
mod tests;
