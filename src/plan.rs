//! Surgery plans.
//!
//! A [`SurgeryPlan`] bundles everything a transplant run needs besides the
//! tensors themselves: the branch mapping table, the reduction policy, and
//! naming overrides for donors whose keys cannot be auto-detected.
//!
//! Plans are either built in code, picked from the built-in presets, or
//! authored in TOML:
//!
//! ```toml
//! name = "dual-backbone"
//!
//! [[branch]]
//! name = "rgb"
//! donor = "rgb"
//! ranges = [{ target = 1, donor = 0, count = 10 }]
//!
//! [[branch]]
//! name = "nir"
//! donor = "nir"
//! pairs = [[11, 0], [12, 1]]
//!
//! [[stem]]
//! layer = 11
//! suffix = "conv.weight"
//! reduction = "mean"
//!
//! [donors.nir]
//! naming = "model.model"
//! ```
//!
//! TOML plans go through the same [`MappingTable`] validation as code-built
//! ones, so an overlapping or non-injective plan is rejected on load.

use crate::error::{Result, TransplantError};
use crate::mapping::{BranchMapping, MappingTable};
use crate::naming::{KeyConvention, LayerIndexResolver};
use crate::reduce::{Reduction, ReductionPolicy, StemRule};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

fn config_err(message: impl Into<String>) -> TransplantError {
    TransplantError::Config {
        message: message.into(),
    }
}

// ============================================================================
// TOML SCHEMA
// ============================================================================

/// On-disk form of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Key conventions of the target, highest priority first. Empty means
    /// the default `model` / `model.model` resolver.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_naming: Vec<KeyConvention>,
    #[serde(default, rename = "branch")]
    pub branches: Vec<BranchConfig>,
    #[serde(default, rename = "stem", skip_serializing_if = "Vec::is_empty")]
    pub stems: Vec<StemRule>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub donors: BTreeMap<String, DonorConfig>,
}

/// One `[[branch]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BranchConfig {
    pub name: String,
    pub donor: String,
    /// Individual `[target, donor]` layer pairs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pairs: Vec<(usize, usize)>,
    /// Runs of consecutive layers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranges: Vec<RangeConfig>,
}

/// `count` target layers from `target` mapped onto donor layers from `donor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RangeConfig {
    pub target: usize,
    pub donor: usize,
    pub count: usize,
}

/// Per-donor settings under `[donors.<id>]`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DonorConfig {
    /// Key prefix of the donor's layers; detected when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naming: Option<KeyConvention>,
}

impl BranchConfig {
    fn to_mapping(&self) -> Result<BranchMapping> {
        let mut branch = BranchMapping::new(&self.name, &self.donor).map_pairs(self.pairs.iter().copied());
        for range in &self.ranges {
            if range.count == 0 {
                return Err(config_err(format!(
                    "branch '{}' has a range with count 0",
                    self.name
                )));
            }
            branch = branch.map_range(range.target, range.donor, range.count);
        }
        Ok(branch)
    }

    fn from_mapping(branch: &BranchMapping) -> Self {
        let (ranges, pairs) = compress_pairs(&branch.pairs());
        Self {
            name: branch.name().to_string(),
            donor: branch.donor().to_string(),
            pairs,
            ranges,
        }
    }
}

/// Split sorted pairs into runs of two or more consecutive layers and the
/// leftover single pairs.
fn compress_pairs(pairs: &[(usize, usize)]) -> (Vec<RangeConfig>, Vec<(usize, usize)>) {
    let mut ranges = Vec::new();
    let mut singles = Vec::new();
    let mut i = 0;
    while i < pairs.len() {
        let (target, donor) = pairs[i];
        let mut count = 1;
        while i + count < pairs.len() && pairs[i + count] == (target + count, donor + count) {
            count += 1;
        }
        if count > 1 {
            ranges.push(RangeConfig {
                target,
                donor,
                count,
            });
        } else {
            singles.push((target, donor));
        }
        i += count;
    }
    (ranges, singles)
}

// ============================================================================
// PLAN
// ============================================================================

/// A validated mapping table and reduction policy, plus naming hints.
#[derive(Debug, Clone, PartialEq)]
pub struct SurgeryPlan {
    name: String,
    description: Option<String>,
    table: MappingTable,
    policy: ReductionPolicy,
    target_naming: Vec<KeyConvention>,
    donor_naming: BTreeMap<String, KeyConvention>,
}

impl SurgeryPlan {
    /// Pair a mapping table with its reduction policy.
    ///
    /// # Errors
    ///
    /// Returns [`TransplantError::InvalidMapping`] if a stem of `policy` sits
    /// on a layer no branch of `table` claims.
    pub fn new(name: impl Into<String>, table: MappingTable, policy: ReductionPolicy) -> Result<Self> {
        policy.check_claimed(&table)?;
        Ok(Self {
            name: name.into(),
            description: None,
            table,
            policy,
            target_naming: Vec::new(),
            donor_naming: BTreeMap::new(),
        })
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Address `donor`'s layers with `naming` instead of detecting it.
    #[must_use]
    pub fn with_donor_naming(mut self, donor: impl Into<String>, naming: KeyConvention) -> Self {
        self.donor_naming.insert(donor.into(), naming);
        self
    }

    /// Parse target keys with these conventions, highest priority first.
    #[must_use]
    pub fn with_target_naming(mut self, conventions: Vec<KeyConvention>) -> Self {
        self.target_naming = conventions;
        self
    }

    /// Validate a parsed TOML plan.
    ///
    /// # Errors
    ///
    /// Mapping-table errors are returned unchanged, as are conflicting stems
    /// and stems on layers no branch claims
    /// ([`TransplantError::InvalidMapping`]). A zero-length range or naming
    /// for a donor no branch uses is reported as [`TransplantError::Config`].
    pub fn from_config(config: PlanConfig) -> Result<Self> {
        let branches = config
            .branches
            .iter()
            .map(BranchConfig::to_mapping)
            .collect::<Result<Vec<_>>>()?;
        let table = MappingTable::new(branches)?;

        let mut policy = ReductionPolicy::new();
        for stem in config.stems {
            policy.add(stem)?;
        }
        policy.check_claimed(&table)?;

        let used = table.donors();
        let mut donor_naming = BTreeMap::new();
        for (donor, settings) in config.donors {
            if !used.contains(donor.as_str()) {
                return Err(config_err(format!(
                    "settings given for donor '{donor}', which no branch uses"
                )));
            }
            if let Some(naming) = settings.naming {
                donor_naming.insert(donor, naming);
            }
        }

        Ok(Self {
            name: config.name,
            description: config.description,
            table,
            policy,
            target_naming: config.target_naming,
            donor_naming,
        })
    }

    /// On-disk form of this plan.
    #[must_use]
    pub fn to_config(&self) -> PlanConfig {
        PlanConfig {
            name: self.name.clone(),
            description: self.description.clone(),
            target_naming: self.target_naming.clone(),
            branches: self
                .table
                .branches()
                .iter()
                .map(BranchConfig::from_mapping)
                .collect(),
            stems: self.policy.rules(),
            donors: self
                .donor_naming
                .iter()
                .map(|(donor, naming)| {
                    (
                        donor.clone(),
                        DonorConfig {
                            naming: Some(naming.clone()),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Parse and validate a TOML plan.
    ///
    /// # Errors
    ///
    /// Returns [`TransplantError::Config`] for TOML syntax or schema errors,
    /// and any error of [`SurgeryPlan::from_config`].
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PlanConfig = toml::from_str(text).map_err(|e| config_err(e.to_string()))?;
        Self::from_config(config)
    }

    /// Read a TOML plan file.
    ///
    /// # Errors
    ///
    /// See [`SurgeryPlan::from_toml_str`]; I/O errors are returned as
    /// [`TransplantError::Io`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let plan = Self::from_toml_str(&text)?;
        info!(path = %path.display(), plan = %plan.name, "loaded plan");
        Ok(plan)
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`TransplantError::Config`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(&self.to_config()).map_err(|e| config_err(e.to_string()))
    }

    /// Built-in plan by name. See [`PRESETS`].
    ///
    /// # Errors
    ///
    /// Returns [`TransplantError::Config`] for an unknown name.
    pub fn preset(name: &str) -> Result<Self> {
        match name {
            "dual-backbone" => dual_backbone(),
            "dual-rectify-feedback" => dual_rectify_feedback(),
            _ => Err(config_err(format!(
                "unknown preset '{name}' (available: {})",
                PRESETS
                    .iter()
                    .map(|p| p.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn table(&self) -> &MappingTable {
        &self.table
    }

    #[must_use]
    pub fn policy(&self) -> &ReductionPolicy {
        &self.policy
    }

    /// Naming override for `donor`, if the plan pins one.
    #[must_use]
    pub fn donor_naming(&self, donor: &str) -> Option<&KeyConvention> {
        self.donor_naming.get(donor)
    }

    /// Resolver for target keys.
    #[must_use]
    pub fn target_resolver(&self) -> LayerIndexResolver {
        if self.target_naming.is_empty() {
            LayerIndexResolver::default()
        } else {
            LayerIndexResolver::new(self.target_naming.clone())
        }
    }
}

// ============================================================================
// PRESETS
// ============================================================================

/// Name and one-line description of a built-in plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresetInfo {
    pub name: &'static str,
    pub description: &'static str,
}

/// Built-in plans.
pub const PRESETS: &[PresetInfo] = &[
    PresetInfo {
        name: "dual-backbone",
        description: "RGB backbone at layers 1-10, NIR backbone at 11-20; NIR stem mean-reduced",
    },
    PresetInfo {
        name: "dual-rectify-feedback",
        description: "Interleaved RGB/NIR stages with rectification; NIR stem at layer 4 sum-reduced",
    },
];

fn preset_description(name: &str) -> &'static str {
    PRESETS
        .iter()
        .find(|p| p.name == name)
        .map_or("", |p| p.description)
}

/// Two parallel backbones of ten layers each. Layer 11 is the single-channel
/// NIR stem.
fn dual_backbone() -> Result<SurgeryPlan> {
    let table = MappingTable::new(vec![
        BranchMapping::new("rgb", "rgb").map_range(1, 0, 10),
        BranchMapping::new("nir", "nir").map_range(11, 0, 10),
    ])?;
    let policy = ReductionPolicy::new().with_stem(11, "conv.weight", Reduction::Mean)?;
    Ok(SurgeryPlan::new("dual-backbone", table, policy)?
        .with_description(preset_description("dual-backbone")))
}

/// RGB and NIR stages interleaved with fusion blocks; layer 4 is the NIR stem.
fn dual_rectify_feedback() -> Result<SurgeryPlan> {
    let table = MappingTable::new(vec![
        BranchMapping::new("rgb", "rgb").map_pairs([
            (1, 0),
            (2, 1),
            (3, 2),
            (7, 3),
            (8, 4),
            (15, 5),
            (16, 6),
            (23, 7),
            (24, 8),
            (25, 9),
        ]),
        BranchMapping::new("nir", "nir").map_pairs([
            (4, 0),
            (5, 1),
            (6, 2),
            (9, 3),
            (10, 4),
            (17, 5),
            (18, 6),
            (26, 7),
            (27, 8),
            (28, 9),
        ]),
    ])?;
    let policy = ReductionPolicy::new().with_stem(4, "conv.weight", Reduction::Sum)?;
    Ok(SurgeryPlan::new("dual-rectify-feedback", table, policy)?
        .with_description(preset_description("dual-rectify-feedback")))
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
