//! Input-channel reduction.
//!
//! A donor trained on 3-channel images has a stem convolution of shape
//! `[out, 3, kh, kw]`; a single-channel branch of the target expects
//! `[out, 1, kh, kw]`. [`reduce_input_channels`] collapses the input-channel
//! axis so the pretrained filters can still be used.
//!
//! Which parameters may be reduced, and how, is never guessed: a
//! [`ReductionPolicy`] names every compressible stem explicitly.

use crate::error::{Result, TransplantError};
use crate::key::ParameterKey;
use crate::mapping::MappingTable;
use crate::tensor::{numel, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How the input-channel axis is collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    /// Arithmetic mean over input channels
    Mean,
    /// Sum over input channels (preserves the response to a gray input)
    Sum,
}

impl std::str::FromStr for Reduction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mean" | "avg" | "average" => Ok(Self::Mean),
            "sum" => Ok(Self::Sum),
            _ => Err(format!("Unknown reduction: {s} (expected 'mean' or 'sum')")),
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mean => "mean",
            Self::Sum => "sum",
        })
    }
}

/// Collapse axis 1 of `donor` so it fits `target_shape`.
///
/// `donor` must have shape `[out, in, *spatial]` and `target_shape` must be
/// `[out, 1, *spatial]` with `in > 1`. Accumulation happens in `f64`; the
/// result keeps the donor's dtype.
///
/// # Errors
///
/// Returns [`TransplantError::InvalidReduction`] when the request is not a
/// pure input-channel compression: rank below 2, rank mismatch, differing
/// output or spatial dimensions, a target input count other than 1, a donor
/// that already has at most the target's input channels, or an integer donor.
///
/// # Example
///
/// ```
/// use transplant::reduce::{reduce_input_channels, Reduction};
/// use transplant::tensor::Tensor;
///
/// let donor = Tensor::new(vec![1, 3, 1, 1], vec![1.0, 2.0, 6.0]).unwrap();
/// let mean = reduce_input_channels(&donor, &[1, 1, 1, 1], Reduction::Mean).unwrap();
/// let sum = reduce_input_channels(&donor, &[1, 1, 1, 1], Reduction::Sum).unwrap();
/// assert_eq!(mean.data(), &[3.0]);
/// assert_eq!(sum.data(), &[9.0]);
/// ```
pub fn reduce_input_channels(
    donor: &Tensor,
    target_shape: &[usize],
    reduction: Reduction,
) -> Result<Tensor> {
    let source = donor.shape();
    validate_reduction(source, target_shape)?;
    if donor.dtype().is_integer() {
        return Err(TransplantError::invalid_reduction(
            source,
            target_shape,
            format!("{} tensors are never reduced", donor.dtype()),
        ));
    }

    let out_channels = source[0];
    let in_channels = source[1];
    let spatial = numel(&source[2..]);
    let data = donor.data();

    let mut reduced = Vec::with_capacity(out_channels * spatial);
    for o in 0..out_channels {
        let filter = &data[o * in_channels * spatial..(o + 1) * in_channels * spatial];
        for s in 0..spatial {
            let acc: f64 = (0..in_channels)
                .map(|c| f64::from(filter[c * spatial + s]))
                .sum();
            let value = match reduction {
                Reduction::Mean => acc / in_channels as f64,
                Reduction::Sum => acc,
            };
            reduced.push(value as f32);
        }
    }

    Tensor::with_dtype(target_shape.to_vec(), reduced, donor.dtype())
}

/// Whether `source` → `target` differs only in the input-channel axis and
/// could be handled by [`reduce_input_channels`].
#[must_use]
pub fn is_channel_compression(source: &[usize], target: &[usize]) -> bool {
    validate_reduction(source, target).is_ok()
}

fn validate_reduction(source: &[usize], target: &[usize]) -> Result<()> {
    let reject = |reason: &str| Err(TransplantError::invalid_reduction(source, target, reason));

    if source.len() < 2 || target.len() < 2 {
        return reject("reduction needs [out, in, ...] shapes of rank 2 or more");
    }
    if source.len() != target.len() {
        return reject("ranks differ");
    }
    if source[0] != target[0] {
        return reject("output channels differ");
    }
    if source[2..] != target[2..] {
        return reject("spatial dimensions differ");
    }
    if target[1] != 1 {
        return reject("only reduction to a single input channel is supported");
    }
    if source[1] <= target[1] {
        return reject("donor has no extra input channels to reduce");
    }
    Ok(())
}

// ============================================================================
// POLICY
// ============================================================================

/// One compressible stem: parameter `suffix` of target `layer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemRule {
    /// Target layer index
    pub layer: usize,
    /// Parameter suffix within the layer (`"conv.weight"`)
    pub suffix: String,
    /// Reduction applied when shapes differ on the input-channel axis
    pub reduction: Reduction,
}

/// Explicit set of parameters allowed to undergo channel reduction.
///
/// There is no default reduction: a parameter absent from the policy is never
/// reduced, and a shape mismatch on it is recorded as such.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReductionPolicy {
    rules: BTreeMap<(usize, String), Reduction>,
}

impl ReductionPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `suffix` of `layer` to be reduced with `reduction`.
    ///
    /// # Errors
    ///
    /// Returns [`TransplantError::InvalidMapping`] if the stem is already
    /// registered with a different reduction.
    pub fn with_stem(mut self, layer: usize, suffix: &str, reduction: Reduction) -> Result<Self> {
        self.add(StemRule {
            layer,
            suffix: suffix.to_string(),
            reduction,
        })?;
        Ok(self)
    }

    /// Register `rule`. Re-registering an identical rule is a no-op.
    ///
    /// # Errors
    ///
    /// See [`ReductionPolicy::with_stem`].
    pub fn add(&mut self, rule: StemRule) -> Result<()> {
        let suffix = rule.suffix.trim().trim_matches('.').to_string();
        if suffix.is_empty() {
            return Err(TransplantError::InvalidMapping {
                message: format!("stem rule for layer {} has an empty suffix", rule.layer),
            });
        }
        let slot = (rule.layer, suffix);
        match self.rules.get(&slot) {
            Some(&existing) if existing != rule.reduction => Err(TransplantError::InvalidMapping {
                message: format!(
                    "stem {}.{} is registered with both {existing} and {}",
                    slot.0, slot.1, rule.reduction
                ),
            }),
            _ => {
                self.rules.insert(slot, rule.reduction);
                Ok(())
            }
        }
    }

    /// Reduction registered for `layer` / `suffix`.
    #[must_use]
    pub fn get(&self, layer: usize, suffix: &str) -> Option<Reduction> {
        self.rules.get(&(layer, suffix.to_string())).copied()
    }

    /// Reduction registered for a parsed target key.
    #[must_use]
    pub fn reduction_for(&self, key: &ParameterKey) -> Option<Reduction> {
        let layer = key.layer()?;
        let suffix = key.suffix()?;
        self.get(layer, &suffix)
    }

    /// Rules ordered by layer then suffix.
    #[must_use]
    pub fn rules(&self) -> Vec<StemRule> {
        self.rules
            .iter()
            .map(|((layer, suffix), &reduction)| StemRule {
                layer: *layer,
                suffix: suffix.clone(),
                reduction,
            })
            .collect()
    }

    /// Layers with at least one registered stem.
    pub fn layers(&self) -> impl Iterator<Item = usize> + '_ {
        let mut last = None;
        self.rules.keys().filter_map(move |(layer, _)| {
            if last == Some(*layer) {
                None
            } else {
                last = Some(*layer);
                Some(*layer)
            }
        })
    }

    /// Check that every stem sits on a layer some branch of `table` claims.
    ///
    /// # Errors
    ///
    /// Returns [`TransplantError::InvalidMapping`] naming the first stray
    /// stem layer.
    pub fn check_claimed(&self, table: &MappingTable) -> Result<()> {
        match self.layers().find(|&layer| table.lookup(layer).is_none()) {
            Some(layer) => Err(TransplantError::InvalidMapping {
                message: format!("reduction stem on layer {layer}, which no branch claims"),
            }),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
#[path = "reduce_tests.rs"]
mod tests;
