//! `SafeTensors` reader and writer.
//!
//! Compatible with files written by the `safetensors` Python package and the
//! `HuggingFace` ecosystem. F32, F16, BF16, F64, I64 and I32 tensors are
//! supported; everything is decoded to `f32` in memory and written back in the
//! tensor's recorded dtype.

use super::safetensors_reader::{decode_tensor, encode_tensor, parse_metadata, validate_and_read_header};
use crate::error::{Result, TransplantError};
use crate::tensor::{DType, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;
use tracing::debug;

/// Metadata for a single tensor in `SafeTensors` format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorMetadata {
    /// Data type of the tensor (e.g., "F32").
    pub dtype: String,
    /// Shape of the tensor (e.g., `[16, 3, 3, 3]`).
    pub shape: Vec<usize>,
    /// Data offsets `[start, end]` in the raw data section.
    pub data_offsets: [usize; 2],
}

/// Tensor entries of a `SafeTensors` header.
/// Uses `BTreeMap` for deterministic JSON serialization (sorted keys).
pub type SafeTensorsMetadata = BTreeMap<String, TensorMetadata>;

/// String → string metadata stored under `__metadata__`.
pub type UserMetadata = BTreeMap<String, String>;

/// Header JSON is padded with spaces to this alignment so the data section
/// starts on an 8-byte boundary.
const HEADER_ALIGN: usize = 8;

/// Saves tensors to `SafeTensors` format.
///
/// Tensors are laid out in iteration order; each is encoded in its own dtype.
///
/// # Errors
///
/// Returns an error if JSON serialization or the file write fails.
pub fn save_safetensors<'a, P, I>(path: P, tensors: I, user_metadata: &UserMetadata) -> Result<()>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = (&'a str, &'a Tensor)>,
{
    let bytes = to_safetensors_bytes(tensors, user_metadata)?;
    fs::write(path.as_ref(), &bytes)?;
    debug!(path = %path.as_ref().display(), bytes = bytes.len(), "wrote safetensors");
    Ok(())
}

/// Serialize tensors to an in-memory `SafeTensors` image.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn to_safetensors_bytes<'a, I>(tensors: I, user_metadata: &UserMetadata) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (&'a str, &'a Tensor)>,
{
    let mut header = serde_json::Map::new();

    if !user_metadata.is_empty() {
        let meta_obj: serde_json::Map<String, serde_json::Value> = user_metadata
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        header.insert(
            "__metadata__".to_string(),
            serde_json::Value::Object(meta_obj),
        );
    }

    let mut raw_data = Vec::new();
    let mut current_offset = 0;

    for (name, tensor) in tensors {
        let tensor_bytes = encode_tensor(tensor);
        let start_offset = current_offset;
        let end_offset = current_offset + tensor_bytes.len();

        let meta = TensorMetadata {
            dtype: tensor.dtype().as_str().to_string(),
            shape: tensor.shape().to_vec(),
            data_offsets: [start_offset, end_offset],
        };
        let value = serde_json::to_value(&meta).map_err(|e| TransplantError::Format {
            message: format!("JSON serialization failed: {e}"),
        })?;
        header.insert(name.to_string(), value);

        raw_data.extend_from_slice(&tensor_bytes);
        current_offset = end_offset;
    }

    let mut metadata_json = serde_json::to_string(&header).map_err(|e| TransplantError::Format {
        message: format!("JSON serialization failed: {e}"),
    })?;
    while (8 + metadata_json.len()) % HEADER_ALIGN != 0 {
        metadata_json.push(' ');
    }
    let metadata_bytes = metadata_json.as_bytes();
    let metadata_len = metadata_bytes.len() as u64;

    let mut output = Vec::with_capacity(8 + metadata_bytes.len() + raw_data.len());
    output.extend_from_slice(&metadata_len.to_le_bytes());
    output.extend_from_slice(metadata_bytes);
    output.extend_from_slice(&raw_data);
    Ok(output)
}

/// Memory-mapped `SafeTensors` file.
///
/// The header is parsed on open; tensor data is decoded lazily per tensor.
#[derive(Debug)]
pub struct MappedSafeTensors {
    mmap: memmap2::Mmap,
    metadata: SafeTensorsMetadata,
    user_metadata: UserMetadata,
    data_offset: usize,
}

#[allow(unsafe_code)]
impl MappedSafeTensors {
    /// Open a `SafeTensors` file with memory mapping.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be opened or the header is invalid.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        // SAFETY: the file is opened read-only and the mapping is dropped at
        // the end of the load phase. A concurrent truncation by another
        // process would fault; transplant runs assume exclusive inputs.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };

        let bytes: &[u8] = &mmap;
        let metadata_len = validate_and_read_header(bytes)?;
        let (metadata, user_metadata) = parse_metadata(bytes, metadata_len)?;
        let data_offset = 8 + metadata_len;

        debug!(
            path = %path.display(),
            tensors = metadata.len(),
            "mapped safetensors"
        );

        Ok(Self {
            mmap,
            metadata,
            user_metadata,
            data_offset,
        })
    }

    /// Get tensor metadata by name.
    #[must_use]
    pub fn get_metadata(&self, name: &str) -> Option<&TensorMetadata> {
        self.metadata.get(name)
    }

    /// Tensor names in sorted order.
    #[must_use]
    pub fn tensor_names(&self) -> Vec<&str> {
        self.metadata.keys().map(String::as_str).collect()
    }

    /// Decode one tensor.
    ///
    /// # Errors
    ///
    /// Returns error if the tensor is missing, out of bounds, of an
    /// unsupported dtype, or inconsistent with its shape.
    pub fn get_tensor(&self, name: &str) -> Result<Tensor> {
        let meta = self.metadata.get(name).ok_or_else(|| TransplantError::Format {
            message: format!("Tensor '{name}' not found"),
        })?;

        let bytes: &[u8] = &self.mmap;
        let [start, end] = meta.data_offsets;
        let out_of_bounds = || TransplantError::Format {
            message: format!(
                "Tensor '{name}' data out of bounds: [{start}, {end}) after header of {} bytes in {} bytes",
                self.data_offset,
                bytes.len()
            ),
        };
        let abs_start = self.data_offset.checked_add(start).ok_or_else(out_of_bounds)?;
        let abs_end = self.data_offset.checked_add(end).ok_or_else(out_of_bounds)?;

        if start > end || abs_end > bytes.len() {
            return Err(out_of_bounds());
        }

        let dtype = DType::from_tag(&meta.dtype).ok_or_else(|| TransplantError::Format {
            message: format!("Unsupported dtype for '{name}': {}", meta.dtype),
        })?;

        decode_tensor(name, &bytes[abs_start..abs_end], &meta.shape, dtype)
    }

    /// Decode every tensor, in sorted name order.
    ///
    /// # Errors
    ///
    /// Returns the first decoding error encountered.
    pub fn tensors(&self) -> Result<Vec<(String, Tensor)>> {
        self.metadata
            .keys()
            .map(|name| self.get_tensor(name).map(|t| (name.clone(), t)))
            .collect()
    }

    /// Number of tensors in the file.
    #[must_use]
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    /// Check if file has no tensors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// Metadata from the `__metadata__` header section.
    #[must_use]
    pub fn user_metadata(&self) -> &UserMetadata {
        &self.user_metadata
    }
}

#[cfg(test)]
#[path = "safetensors_tests.rs"]
mod tests;
