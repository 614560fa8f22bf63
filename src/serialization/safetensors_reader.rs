use super::safetensors::{SafeTensorsMetadata, TensorMetadata, UserMetadata};
use crate::error::{Result, TransplantError};
use crate::tensor::{checked_numel, DType, Tensor};
use half::{bf16, f16};

fn format_err(message: String) -> TransplantError {
    TransplantError::Format { message }
}

pub(super) fn validate_and_read_header(bytes: &[u8]) -> Result<usize> {
    if bytes.len() < 8 {
        return Err(format_err(format!(
            "file is {} bytes, need at least 8 bytes for header",
            bytes.len()
        )));
    }

    let header_bytes: [u8; 8] = bytes[0..8]
        .try_into()
        .map_err(|_| format_err("Failed to read header bytes".to_string()))?;
    let metadata_len = usize::try_from(u64::from_le_bytes(header_bytes))
        .map_err(|_| format_err("metadata length does not fit in memory".to_string()))?;

    if metadata_len == 0 {
        return Err(format_err("metadata length is 0".to_string()));
    }

    if metadata_len > bytes.len() - 8 {
        return Err(format_err(format!(
            "metadata length {metadata_len} exceeds file size"
        )));
    }

    Ok(metadata_len)
}

pub(super) fn parse_metadata(
    bytes: &[u8],
    metadata_len: usize,
) -> Result<(SafeTensorsMetadata, UserMetadata)> {
    let metadata_json = &bytes[8..8 + metadata_len];
    let metadata_str = std::str::from_utf8(metadata_json)
        .map_err(|e| format_err(format!("Metadata is not valid UTF-8: {e}")))?;

    let raw_metadata: serde_json::Value = serde_json::from_str(metadata_str)
        .map_err(|e| format_err(format!("JSON parsing failed: {e}")))?;

    let serde_json::Value::Object(map) = raw_metadata else {
        return Err(format_err("header is not a JSON object".to_string()));
    };

    let mut metadata = SafeTensorsMetadata::new();
    let mut user_metadata = UserMetadata::new();

    for (key, value) in map {
        if key == "__metadata__" {
            extract_user_metadata(value, &mut user_metadata);
            continue;
        }
        let tensor_meta: TensorMetadata = serde_json::from_value(value)
            .map_err(|e| format_err(format!("bad header entry for '{key}': {e}")))?;
        metadata.insert(key, tensor_meta);
    }

    Ok((metadata, user_metadata))
}

fn extract_user_metadata(value: serde_json::Value, user_metadata: &mut UserMetadata) {
    let serde_json::Value::Object(meta_map) = value else {
        return;
    };
    for (mk, mv) in meta_map {
        if let serde_json::Value::String(s) = mv {
            user_metadata.insert(mk, s);
        }
    }
}

/// Decode raw little-endian bytes of `dtype` into an f32 tensor.
pub(super) fn decode_tensor(name: &str, bytes: &[u8], shape: &[usize], dtype: DType) -> Result<Tensor> {
    let width = dtype.bytes_per_element();
    let expected = checked_numel(shape)
        .and_then(|n| n.checked_mul(width))
        .ok_or_else(|| format_err(format!("Tensor '{name}' shape {shape:?} overflows")))?;
    if bytes.len() != expected {
        return Err(format_err(format!(
            "Tensor '{name}' has {} bytes, shape {shape:?} as {dtype} needs {expected}",
            bytes.len()
        )));
    }

    let chunks = bytes.chunks_exact(width);
    let data: Vec<f32> = match dtype {
        DType::F32 => chunks
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        DType::F16 => chunks
            .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        DType::BF16 => chunks
            .map(|c| bf16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        DType::F64 => chunks
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32)
            .collect(),
        DType::I64 => chunks
            .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32)
            .collect(),
        DType::I32 => chunks
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32)
            .collect(),
    };

    Tensor::with_dtype(shape.to_vec(), data, dtype)
}

/// Encode a tensor's values in its recorded dtype.
pub(super) fn encode_tensor(tensor: &Tensor) -> Vec<u8> {
    let data = tensor.data();
    let mut bytes = Vec::with_capacity(tensor.size_bytes());
    match tensor.dtype() {
        DType::F32 => data.iter().for_each(|v| bytes.extend_from_slice(&v.to_le_bytes())),
        DType::F16 => data
            .iter()
            .for_each(|&v| bytes.extend_from_slice(&f16::from_f32(v).to_le_bytes())),
        DType::BF16 => data
            .iter()
            .for_each(|&v| bytes.extend_from_slice(&bf16::from_f32(v).to_le_bytes())),
        DType::F64 => data
            .iter()
            .for_each(|&v| bytes.extend_from_slice(&f64::from(v).to_le_bytes())),
        DType::I64 => data
            .iter()
            .for_each(|&v| bytes.extend_from_slice(&(v.round() as i64).to_le_bytes())),
        DType::I32 => data
            .iter()
            .for_each(|&v| bytes.extend_from_slice(&(v.round() as i32).to_le_bytes())),
    }
    bytes
}
