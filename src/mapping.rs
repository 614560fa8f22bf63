//! Branch mapping tables.
//!
//! A multi-branch target network is initialised from several donors. Each
//! branch of the target owns a contiguous or scattered set of layer indices and
//! copies them from one donor:
//!
//! ```text
//! target layer 1  ──▶ rgb layer 0
//! target layer 2  ──▶ rgb layer 1
//! target layer 4  ──▶ nir layer 0
//! ```
//!
//! A [`MappingTable`] is the validated union of all [`BranchMapping`]s. Its
//! construction enforces that no target layer is claimed twice and that no
//! branch maps two target layers onto one donor layer.

use crate::error::{Result, TransplantError};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Target layers of one branch and the donor layers they are copied from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchMapping {
    name: String,
    donor: String,
    pairs: Vec<(usize, usize)>,
}

impl BranchMapping {
    /// Empty branch `name` drawing from donor `donor`.
    #[must_use]
    pub fn new(name: impl Into<String>, donor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            donor: donor.into(),
            pairs: Vec::new(),
        }
    }

    /// Map `target_layer` onto `donor_layer`.
    #[must_use]
    pub fn map(mut self, target_layer: usize, donor_layer: usize) -> Self {
        self.pairs.push((target_layer, donor_layer));
        self
    }

    /// Map `count` consecutive target layers starting at `target_start` onto
    /// consecutive donor layers starting at `donor_start`.
    #[must_use]
    pub fn map_range(mut self, target_start: usize, donor_start: usize, count: usize) -> Self {
        self.pairs
            .extend((0..count).map(|i| (target_start + i, donor_start + i)));
        self
    }

    /// Map every `(target, donor)` pair.
    #[must_use]
    pub fn map_pairs<I: IntoIterator<Item = (usize, usize)>>(mut self, pairs: I) -> Self {
        self.pairs.extend(pairs);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the donor this branch copies from.
    #[must_use]
    pub fn donor(&self) -> &str {
        &self.donor
    }

    /// `(target layer, donor layer)` pairs sorted by target layer.
    #[must_use]
    pub fn pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = self.pairs.clone();
        pairs.sort_unstable();
        pairs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Where a target layer gets its weights from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerSource<'a> {
    /// Branch claiming the target layer
    pub branch: &'a BranchMapping,
    /// Layer index in the branch's donor
    pub donor_layer: usize,
}

impl<'a> LayerSource<'a> {
    /// Donor id, shorthand for `self.branch.donor()`.
    #[must_use]
    pub fn donor(&self) -> &'a str {
        self.branch.donor()
    }
}

/// Validated set of branch mappings with an O(1) target-layer index.
///
/// # Example
///
/// ```
/// use transplant::mapping::{BranchMapping, MappingTable};
///
/// let table = MappingTable::new(vec![
///     BranchMapping::new("rgb", "rgb").map_range(1, 0, 10),
///     BranchMapping::new("nir", "nir").map_range(11, 0, 10),
/// ])
/// .unwrap();
///
/// let source = table.lookup(12).unwrap();
/// assert_eq!(source.donor(), "nir");
/// assert_eq!(source.donor_layer, 1);
/// assert!(table.lookup(0).is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingTable {
    branches: Vec<BranchMapping>,
    // target layer -> (branch position, donor layer)
    index: HashMap<usize, (usize, usize)>,
}

impl MappingTable {
    /// Validate `branches` and build the lookup index.
    ///
    /// # Errors
    ///
    /// * [`TransplantError::InvalidMapping`] for an empty table, an empty or
    ///   duplicated branch name, a branch without layers, or a branch listing
    ///   the same target layer twice.
    /// * [`TransplantError::OverlappingBranches`] when two branches claim the
    ///   same target layer.
    /// * [`TransplantError::NonInjectiveMapping`] when one branch maps two
    ///   target layers onto the same donor layer.
    pub fn new(mut branches: Vec<BranchMapping>) -> Result<Self> {
        validate_branches(&branches)?;
        for branch in &mut branches {
            branch.pairs.sort_unstable();
        }

        let mut index: HashMap<usize, (usize, usize)> = HashMap::new();
        for (position, branch) in branches.iter().enumerate() {
            let mut donor_layers = BTreeSet::new();
            for &(target, donor_layer) in &branch.pairs {
                if let Some(&(owner, _)) = index.get(&target) {
                    if owner == position {
                        return Err(TransplantError::InvalidMapping {
                            message: format!(
                                "branch '{}' lists target layer {target} twice",
                                branch.name
                            ),
                        });
                    }
                    return Err(TransplantError::OverlappingBranches {
                        layer: target,
                        first: branches[owner].name.clone(),
                        second: branch.name.clone(),
                    });
                }
                if !donor_layers.insert(donor_layer) {
                    return Err(TransplantError::NonInjectiveMapping {
                        branch: branch.name.clone(),
                        donor_layer,
                    });
                }
                index.insert(target, (position, donor_layer));
            }
        }

        Ok(Self { branches, index })
    }

    /// Source of `target_layer`, if any branch claims it.
    #[must_use]
    pub fn lookup(&self, target_layer: usize) -> Option<LayerSource<'_>> {
        self.index
            .get(&target_layer)
            .map(|&(position, donor_layer)| LayerSource {
                branch: &self.branches[position],
                donor_layer,
            })
    }

    #[must_use]
    pub fn branches(&self) -> &[BranchMapping] {
        &self.branches
    }

    /// Distinct donor ids referenced by the table.
    #[must_use]
    pub fn donors(&self) -> BTreeSet<&str> {
        self.branches.iter().map(BranchMapping::donor).collect()
    }

    /// Every claimed target layer, ascending.
    #[must_use]
    pub fn target_layers(&self) -> Vec<usize> {
        let mut layers: Vec<usize> = self.index.keys().copied().collect();
        layers.sort_unstable();
        layers
    }

    /// Number of claimed target layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl fmt::Display for MappingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for branch in &self.branches {
            writeln!(f, "{} <- {}", branch.name, branch.donor)?;
            for (target, donor_layer) in branch.pairs() {
                writeln!(f, "  {target:>3} <- {donor_layer}")?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// VALIDATION HELPERS
// ============================================================================

fn validate_branches(branches: &[BranchMapping]) -> Result<()> {
    if branches.is_empty() {
        return Err(TransplantError::InvalidMapping {
            message: "mapping table has no branches".to_string(),
        });
    }

    let mut names = BTreeSet::new();
    for branch in branches {
        validate_branch(branch)?;
        if !names.insert(branch.name.as_str()) {
            return Err(TransplantError::InvalidMapping {
                message: format!("branch name '{}' is used twice", branch.name),
            });
        }
    }
    Ok(())
}

fn validate_branch(branch: &BranchMapping) -> Result<()> {
    if branch.name.trim().is_empty() {
        return Err(TransplantError::InvalidMapping {
            message: "branch name must not be empty".to_string(),
        });
    }
    if branch.donor.trim().is_empty() {
        return Err(TransplantError::InvalidMapping {
            message: format!("branch '{}' names no donor", branch.name),
        });
    }
    if branch.pairs.is_empty() {
        return Err(TransplantError::InvalidMapping {
            message: format!("branch '{}' maps no layers", branch.name),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "mapping_tests.rs"]
mod tests;
