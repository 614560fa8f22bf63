//! Tensor state serialization.
//!
//! Donor states, target skeletons and output checkpoints are all stored in the
//! `SafeTensors` format:
//!
//! ```text
//! [8-byte header: u64 metadata length (little-endian)]
//! [JSON metadata: tensor names, dtypes, shapes, data_offsets, __metadata__]
//! [Raw tensor data: little-endian values in each tensor's dtype]
//! ```
//!
//! The `__metadata__` section (string → string) carries checkpoint fields
//! such as `epoch` and `optimizer`.

pub mod safetensors;
mod safetensors_reader;

pub use safetensors::{
    save_safetensors, to_safetensors_bytes, MappedSafeTensors, SafeTensorsMetadata,
    TensorMetadata, UserMetadata,
};
