//! Convenience re-exports for common usage.
//!
//! # Usage
//!
//! ```
//! use transplant::prelude::*;
//! ```

pub use crate::checkpoint::{Checkpoint, CheckpointOptions, Network};
pub use crate::error::{Result, TransplantError};
pub use crate::mapping::{BranchMapping, MappingTable};
pub use crate::naming::{KeyConvention, KeyNaming, LayerIndexResolver};
pub use crate::plan::SurgeryPlan;
pub use crate::reduce::{reduce_input_channels, Reduction, ReductionPolicy};
pub use crate::state::TensorState;
pub use crate::surgery::{graft, SurgeryOptions};
pub use crate::tensor::{DType, Tensor};
pub use crate::transfer::{
    transfer, transfer_parallel, Donor, DonorSet, TransferOutcome, TransferReport,
};
