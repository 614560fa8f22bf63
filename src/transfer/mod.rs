//! Transfer engine.
//!
//! Walks every parameter of a target state and decides, key by key, whether
//! its value is replaced from a donor:
//!
//! ```text
//! target key ──▶ layer index ──▶ mapping table ──▶ (donor, donor layer)
//!                                                        │
//!                 donor naming + target suffix ◀─────────┘
//!                        │
//!                        ▼
//!          equal shape ─▶ copy       flagged stem ─▶ reduce channels
//!          otherwise   ─▶ skip, record both shapes
//! ```
//!
//! Inputs are never mutated. The engine returns a fresh state plus one
//! [`TransferRecord`] per target key; per-key problems never abort the run.
//! Only inconsistent inputs (a branch without its donor, a reduction stem on
//! an unclaimed layer) are errors, and they are raised before any key is
//! processed.

mod report;

pub use report::{TransferOutcome, TransferRecord, TransferReport, TransferSummary};

use crate::error::{Result, TransplantError};
use crate::mapping::MappingTable;
use crate::naming::KeyNaming;
use crate::reduce::{reduce_input_channels, ReductionPolicy};
use crate::state::{Parameter, TensorState};
use crate::tensor::Tensor;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

// ============================================================================
// DONORS
// ============================================================================

/// A read-only donor state and the naming used to address its layers.
#[derive(Debug)]
pub struct Donor {
    id: String,
    state: TensorState,
    naming: Box<dyn KeyNaming>,
}

impl Donor {
    /// Donor whose naming is detected from its own keys.
    ///
    /// # Errors
    ///
    /// Returns [`TransplantError::Format`] if no key of `state` resolves to a
    /// layer index, so no naming can be chosen.
    pub fn detect(id: impl Into<String>, state: TensorState) -> Result<Self> {
        let id = id.into();
        let naming = state.detect_naming().ok_or_else(|| TransplantError::Format {
            message: format!("donor '{id}' has no layer-indexed parameters"),
        })?;
        debug!(donor = %id, naming = %naming, "detected donor naming");
        Ok(Self {
            id,
            state,
            naming: Box::new(naming),
        })
    }

    /// Donor addressed with an explicit naming.
    #[must_use]
    pub fn with_naming<N: KeyNaming + 'static>(id: impl Into<String>, state: TensorState, naming: N) -> Self {
        Self {
            id: id.into(),
            state,
            naming: Box::new(naming),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn state(&self) -> &TensorState {
        &self.state
    }

    #[must_use]
    pub fn naming(&self) -> &dyn KeyNaming {
        self.naming.as_ref()
    }
}

/// Donors keyed by id.
#[derive(Debug, Default)]
pub struct DonorSet {
    donors: BTreeMap<String, Donor>,
}

impl DonorSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `donor`, returning any donor previously registered under its id.
    pub fn insert(&mut self, donor: Donor) -> Option<Donor> {
        self.donors.insert(donor.id.clone(), donor)
    }

    /// Builder form of [`DonorSet::insert`].
    #[must_use]
    pub fn with(mut self, donor: Donor) -> Self {
        self.insert(donor);
        self
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Donor> {
        self.donors.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.donors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Donor> {
        self.donors.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.donors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.donors.is_empty()
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Transfer donor weights into a copy of `target`.
///
/// Returns the updated state and one record per target key, in key order.
///
/// # Errors
///
/// * [`TransplantError::MissingDonor`] if a branch names a donor absent from
///   `donors`.
/// * [`TransplantError::InvalidMapping`] if `policy` flags a layer that no
///   branch claims.
///
/// # Example
///
/// ```
/// use transplant::mapping::{BranchMapping, MappingTable};
/// use transplant::reduce::ReductionPolicy;
/// use transplant::state::TensorState;
/// use transplant::tensor::Tensor;
/// use transplant::transfer::{transfer, Donor, DonorSet, TransferOutcome};
///
/// let donor = TensorState::from_tensors([("model.0.conv.weight", Tensor::full(vec![4, 3, 3, 3], 1.0))]);
/// let target = TensorState::from_tensors([("model.1.conv.weight", Tensor::zeros(vec![4, 3, 3, 3]))]);
/// let donors = DonorSet::new().with(Donor::detect("rgb", donor).unwrap());
/// let table = MappingTable::new(vec![BranchMapping::new("rgb", "rgb").map(1, 0)]).unwrap();
///
/// let (state, report) = transfer(&target, &donors, &table, &ReductionPolicy::new()).unwrap();
/// assert_eq!(report.records()[0].outcome, TransferOutcome::Transferred { cast_from: None });
/// assert!(state.get("model.1.conv.weight").unwrap().data().iter().all(|&v| v == 1.0));
/// ```
pub fn transfer(
    target: &TensorState,
    donors: &DonorSet,
    table: &MappingTable,
    policy: &ReductionPolicy,
) -> Result<(TensorState, TransferReport)> {
    validate_inputs(donors, table, policy)?;
    let resolutions = target
        .iter()
        .map(|param| resolve_parameter(param, donors, table, policy))
        .collect();
    Ok(assemble(target, resolutions))
}

/// [`transfer`] with per-key work spread over the rayon thread pool.
///
/// Produces exactly the same state and records as [`transfer`].
///
/// # Errors
///
/// See [`transfer`].
pub fn transfer_parallel(
    target: &TensorState,
    donors: &DonorSet,
    table: &MappingTable,
    policy: &ReductionPolicy,
) -> Result<(TensorState, TransferReport)> {
    validate_inputs(donors, table, policy)?;
    let params: Vec<&Parameter> = target.iter().collect();
    let resolutions = params
        .par_iter()
        .map(|param| resolve_parameter(param, donors, table, policy))
        .collect();
    Ok(assemble(target, resolutions))
}

/// Decision for one key: the record and, if applied, the new value.
struct Resolution {
    record: TransferRecord,
    value: Option<Tensor>,
}

/// Check that every branch's donor is present and every reduction stem sits
/// on a claimed layer.
fn validate_inputs(donors: &DonorSet, table: &MappingTable, policy: &ReductionPolicy) -> Result<()> {
    for branch in table.branches() {
        if donors.get(branch.donor()).is_none() {
            return Err(TransplantError::MissingDonor {
                branch: branch.name().to_string(),
                donor: branch.donor().to_string(),
            });
        }
    }
    policy.check_claimed(table)
}

fn resolve_parameter(
    param: &Parameter,
    donors: &DonorSet,
    table: &MappingTable,
    policy: &ReductionPolicy,
) -> Resolution {
    let key = param.key.as_str();
    let layer = param.key.layer();
    let unmapped = |layer| Resolution {
        record: TransferRecord::unmapped(key, layer),
        value: None,
    };

    let Some(target_layer) = layer else {
        debug!(key, "no layer index");
        return unmapped(None);
    };
    let Some(source) = table.lookup(target_layer) else {
        debug!(key, layer = target_layer, "layer not mapped");
        return unmapped(layer);
    };
    let Some(donor) = donors.get(source.donor()) else {
        return unmapped(layer);
    };
    let Some(candidate) = param.key.relocate(donor.naming(), source.donor_layer) else {
        return unmapped(layer);
    };

    let mut record = TransferRecord {
        key: key.to_string(),
        layer,
        branch: Some(source.branch.name().to_string()),
        donor: Some(donor.id().to_string()),
        source_key: None,
        outcome: TransferOutcome::Unmapped,
    };

    let Some(donor_tensor) = donor.state().get(&candidate) else {
        debug!(key, candidate = %candidate, donor = donor.id(), "source absent");
        record.outcome = TransferOutcome::SourceAbsent { candidate };
        return Resolution {
            record,
            value: None,
        };
    };
    record.source_key = Some(candidate);

    let target_tensor = &param.tensor;
    if donor_tensor.shape() == target_tensor.shape() {
        let cast_from = (donor_tensor.dtype() != target_tensor.dtype()).then_some(donor_tensor.dtype());
        debug!(key, source = ?record.source_key, cast_from = ?cast_from, "transferred");
        record.outcome = TransferOutcome::Transferred { cast_from };
        return Resolution {
            record,
            value: Some(donor_tensor.clone().cast_to(target_tensor.dtype())),
        };
    }

    let mismatch = |note: Option<String>| TransferOutcome::ShapeMismatchSkipped {
        target_shape: target_tensor.shape().to_vec(),
        source_shape: donor_tensor.shape().to_vec(),
        note,
    };

    let Some(reduction) = policy.reduction_for(&param.key) else {
        warn!(
            key,
            target = ?target_tensor.shape(),
            source = ?donor_tensor.shape(),
            "shape mismatch, keeping initial value"
        );
        record.outcome = mismatch(None);
        return Resolution {
            record,
            value: None,
        };
    };

    match reduce_input_channels(donor_tensor, target_tensor.shape(), reduction) {
        Ok(reduced) => {
            debug!(key, %reduction, "channel-reduced");
            record.outcome = TransferOutcome::ChannelReduced {
                reduction,
                from_channels: donor_tensor.shape()[1],
            };
            Resolution {
                record,
                value: Some(reduced.cast_to(target_tensor.dtype())),
            }
        }
        Err(err) => {
            warn!(key, error = %err, "configured reduction rejected");
            record.outcome = mismatch(Some(err.to_string()));
            Resolution {
                record,
                value: None,
            }
        }
    }
}

/// Build the output state from the untouched target plus every applied value.
fn assemble(target: &TensorState, resolutions: Vec<Resolution>) -> (TensorState, TransferReport) {
    let mut state = target.clone();
    let mut records = Vec::with_capacity(resolutions.len());
    for Resolution { record, value } in resolutions {
        if let Some(value) = value {
            state.replace_tensor(&record.key, value);
        }
        records.push(record);
    }
    let report = TransferReport::new(records);
    info!(summary = %report.summary(), "transfer complete");
    (state, report)
}

#[cfg(test)]
#[path = "transfer_tests.rs"]
mod tests;
