//! Transplant: cross-architecture weight transplantation in pure Rust.
//!
//! Builds the starting point of a multi-branch network by copying pretrained
//! tensors out of independently trained donors. Layers are matched by index
//! through a branch mapping table; stems whose input-channel count differs
//! from the donor's are collapsed by an explicit mean or sum reduction; every
//! other mismatch is recorded and left at its initial value.
//!
//! # Quick Start
//!
//! ```
//! use transplant::prelude::*;
//!
//! // Donors: an RGB network and a second RGB-trained network for the NIR branch.
//! let rgb = TensorState::from_tensors([("model.0.conv.weight", Tensor::full(vec![16, 3, 3, 3], 1.0))]);
//! let nir = TensorState::from_tensors([("model.model.3.conv.weight", Tensor::full(vec![32, 3, 3, 3], 2.0))]);
//!
//! // Target: layer 1 takes RGB input, layer 4 takes a single NIR channel.
//! let target = TensorState::from_tensors([
//!     ("model.1.conv.weight", Tensor::zeros(vec![16, 3, 3, 3])),
//!     ("model.4.conv.weight", Tensor::zeros(vec![32, 1, 3, 3])),
//! ]);
//!
//! let table = MappingTable::new(vec![
//!     BranchMapping::new("rgb", "rgb").map(1, 0),
//!     BranchMapping::new("nir", "nir").map(4, 3),
//! ])
//! .unwrap();
//! let policy = ReductionPolicy::new().with_stem(4, "conv.weight", Reduction::Mean).unwrap();
//! let donors = DonorSet::new()
//!     .with(Donor::detect("rgb", rgb).unwrap())
//!     .with(Donor::detect("nir", nir).unwrap());
//!
//! let (state, report) = transfer(&target, &donors, &table, &policy).unwrap();
//! assert_eq!(report.summary().applied(), 2);
//! assert!(state.get("model.4.conv.weight").unwrap().data().iter().all(|&v| v == 2.0));
//! ```
//!
//! # Modules
//!
//! - [`naming`]: Key conventions and the layer index resolver
//! - [`key`]: Parsed parameter keys
//! - [`tensor`]: Dense tensors with on-disk dtype
//! - [`state`]: Ordered parameter maps
//! - [`mapping`]: Branch mapping tables
//! - [`reduce`]: Input-channel reduction and reduction policies
//! - [`transfer`]: The transfer engine and its reports
//! - [`checkpoint`]: Networks and fresh training checkpoints
//! - [`plan`]: TOML surgery plans and built-in presets
//! - [`surgery`]: File-to-file transplant runs
//! - [`serialization`]: `SafeTensors` reader and writer

pub mod checkpoint;
pub mod error;
pub mod key;
pub mod mapping;
pub mod naming;
pub mod plan;
pub mod prelude;
pub mod reduce;
pub mod serialization;
pub mod state;
pub mod surgery;
pub mod tensor;
/// Pygmy network builders for tests and benchmarks.
pub mod test_factory;
pub mod transfer;

pub use error::{Result, TransplantError};
