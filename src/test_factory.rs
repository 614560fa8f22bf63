//! Test Factory - Pygmy Network Builders
//!
//! Builds minimal YOLO-shaped states in memory (and on disk) so transplant
//! runs can be exercised without real checkpoints. Every layer is a
//! `Conv + BatchNorm` block:
//!
//! ```text
//! model.<i>.conv.weight             [width, in, 3, 3]
//! model.<i>.bn.{weight,bias}        [width]
//! model.<i>.bn.running_{mean,var}   [width]
//! model.<i>.bn.num_batches_tracked  []  (I64)
//! ```
//!
//! # Example
//!
//! ```
//! use transplant::plan::SurgeryPlan;
//! use transplant::test_factory::{pygmy_donor, pygmy_target, PygmyConfig};
//! use transplant::naming::KeyConvention;
//!
//! let plan = SurgeryPlan::preset("dual-backbone").unwrap();
//! let config = PygmyConfig::default();
//! let target = pygmy_target(&plan, &config);
//! let donor = pygmy_donor(&config, &KeyConvention::flat("model"), 1.0);
//! assert!(target.contains("model.11.conv.weight"));
//! assert!(donor.contains("model.0.conv.weight"));
//! ```

use crate::checkpoint::Network;
use crate::error::Result;
use crate::naming::{KeyConvention, KeyNaming};
use crate::plan::SurgeryPlan;
use crate::serialization::UserMetadata;
use crate::state::TensorState;
use crate::tensor::{DType, Tensor};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Shape parameters of pygmy networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PygmyConfig {
    /// Output channels of every conv
    pub width: usize,
    /// Layers per donor
    pub donor_layers: usize,
    /// Input channels of donor stems
    pub image_channels: usize,
}

impl Default for PygmyConfig {
    fn default() -> Self {
        Self {
            width: 4,
            donor_layers: 10,
            image_channels: 3,
        }
    }
}

/// Deterministic, non-uniform values starting at `base`.
#[must_use]
pub fn ramp(shape: Vec<usize>, base: f32) -> Tensor {
    let mut tensor = Tensor::zeros(shape);
    for (i, v) in tensor.data_mut().iter_mut().enumerate() {
        *v = base + (i % 7) as f32 * 0.125;
    }
    tensor
}

/// Insert one `Conv + BatchNorm` block at `layer`.
pub fn insert_conv_block(
    state: &mut TensorState,
    naming: &dyn KeyNaming,
    layer: usize,
    shape: [usize; 4],
    base: f32,
) {
    let width = shape[0];
    let key = |suffix: &str| naming.layer_key(layer, suffix);
    state.insert(key("conv.weight"), ramp(shape.to_vec(), base));
    state.insert(key("bn.weight"), Tensor::full(vec![width], 1.0));
    state.insert(key("bn.bias"), Tensor::full(vec![width], base / 10.0));
    state.insert(key("bn.running_mean"), Tensor::zeros(vec![width]));
    state.insert(key("bn.running_var"), Tensor::full(vec![width], 1.0));
    state.insert(
        key("bn.num_batches_tracked"),
        Tensor::full(vec![], 100.0).cast_to(DType::I64),
    );
}

/// Donor with `config.donor_layers` blocks named under `convention`. Layer 0
/// takes `config.image_channels` inputs.
#[must_use]
pub fn pygmy_donor(config: &PygmyConfig, convention: &KeyConvention, base: f32) -> TensorState {
    let mut state = TensorState::new();
    for layer in 0..config.donor_layers {
        let inputs = if layer == 0 {
            config.image_channels
        } else {
            config.width
        };
        insert_conv_block(
            &mut state,
            convention,
            layer,
            [config.width, inputs, 3, 3],
            base + layer as f32,
        );
    }
    state
}

/// Target skeleton shaped for `plan`: one block per claimed layer, plus an
/// unclaimed head block after the last one.
///
/// Blocks mapped onto donor layer 0 are stems: they take one input channel
/// when the plan reduces them, `image_channels` otherwise.
#[must_use]
pub fn pygmy_target(plan: &SurgeryPlan, config: &PygmyConfig) -> TensorState {
    let naming = KeyConvention::flat("model");
    let mut state = TensorState::new();
    let layers = plan.table().target_layers();
    for &layer in &layers {
        let donor_layer = plan.table().lookup(layer).map_or(0, |s| s.donor_layer);
        let inputs = match donor_layer {
            0 if plan.policy().get(layer, "conv.weight").is_some() => 1,
            0 => config.image_channels,
            _ => config.width,
        };
        insert_conv_block(&mut state, &naming, layer, [config.width, inputs, 3, 3], -0.5);
    }
    let head = layers.last().map_or(0, |last| last + 1);
    insert_conv_block(
        &mut state,
        &naming,
        head,
        [config.width, 2 * config.width, 1, 1],
        -0.5,
    );
    state
}

/// Files written by [`write_pygmy_fixture`].
#[derive(Debug, Clone)]
pub struct PygmyFixture {
    /// Target skeleton
    pub target: PathBuf,
    /// Donor id → donor file
    pub donors: BTreeMap<String, PathBuf>,
}

/// Write a target skeleton and one donor per donor id of `plan` into `dir`.
///
/// Donors alternate between flat `model.<i>` and nested `model.model.<i>`
/// naming (in id order) so naming detection is exercised. The target records
/// `architecture = "pygmy-<plan name>"`.
///
/// # Errors
///
/// Returns an error if a file cannot be written.
pub fn write_pygmy_fixture(dir: &Path, plan: &SurgeryPlan, config: &PygmyConfig) -> Result<PygmyFixture> {
    let target = Network::new(format!("pygmy-{}", plan.name()), pygmy_target(plan, config));
    let target_path = dir.join("target.safetensors");
    let mut metadata = UserMetadata::new();
    metadata.insert("architecture".to_string(), target.architecture().to_string());
    target.state().save(&target_path, &metadata)?;

    let mut donors = BTreeMap::new();
    for (i, id) in plan.table().donors().into_iter().enumerate() {
        let convention = if i % 2 == 0 {
            KeyConvention::flat("model")
        } else {
            KeyConvention::nested("model", "model")
        };
        let state = pygmy_donor(config, &convention, 1.0 + i as f32);
        let path = dir.join(format!("{id}.safetensors"));
        state.save(&path, &UserMetadata::new())?;
        donors.insert(id.to_string(), path);
    }

    Ok(PygmyFixture {
        target: target_path,
        donors,
    })
}
