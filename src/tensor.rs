//! Dense tensor values carried through a transplant run.
//!
//! Every tensor is held as `f32` in memory regardless of how it was stored on
//! disk. The on-disk dtype is remembered so the checkpoint writer can emit
//! F16/BF16 weights and integer buffers back in their original encoding.

use crate::error::{Result, TransplantError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// On-disk element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit float
    #[default]
    F32,
    /// 16-bit float (IEEE 754 half-precision)
    F16,
    /// Brain float 16
    BF16,
    /// 64-bit float, narrowed to f32 in memory
    F64,
    /// 64-bit signed integer (e.g. BatchNorm `num_batches_tracked`)
    I64,
    /// 32-bit signed integer
    I32,
}

impl DType {
    /// Bytes per element
    #[must_use]
    pub fn bytes_per_element(self) -> usize {
        match self {
            Self::F64 | Self::I64 => 8,
            Self::F32 | Self::I32 => 4,
            Self::F16 | Self::BF16 => 2,
        }
    }

    /// SafeTensors dtype tag
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::F32 => "F32",
            Self::F16 => "F16",
            Self::BF16 => "BF16",
            Self::F64 => "F64",
            Self::I64 => "I64",
            Self::I32 => "I32",
        }
    }

    /// Parse a SafeTensors dtype tag. Returns `None` for dtypes with no
    /// faithful f32 representation here (bool, u8, fp8).
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "F32" => Some(Self::F32),
            "F16" => Some(Self::F16),
            "BF16" => Some(Self::BF16),
            "F64" => Some(Self::F64),
            "I64" => Some(Self::I64),
            "I32" => Some(Self::I32),
            _ => None,
        }
    }

    /// Integer dtypes are bookkeeping buffers, never reduced.
    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(self, Self::I64 | Self::I32)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dense, row-major tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
    dtype: DType,
}

impl Tensor {
    /// Create an F32 tensor, checking that `data` fills `shape` exactly.
    ///
    /// # Errors
    ///
    /// Returns an error if the element count does not match the shape.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        Self::with_dtype(shape, data, DType::F32)
    }

    /// Create a tensor that remembers its on-disk dtype.
    ///
    /// # Errors
    ///
    /// Returns an error if the element count does not match the shape.
    pub fn with_dtype(shape: Vec<usize>, data: Vec<f32>, dtype: DType) -> Result<Self> {
        let expected = numel(&shape);
        if data.len() != expected {
            return Err(TransplantError::Format {
                message: format!(
                    "shape {shape:?} needs {expected} elements, got {}",
                    data.len()
                ),
            });
        }
        Ok(Self { shape, data, dtype })
    }

    /// Tensor filled with a single value.
    #[must_use]
    pub fn full(shape: Vec<usize>, value: f32) -> Self {
        let data = vec![value; numel(&shape)];
        Self {
            shape,
            data,
            dtype: DType::F32,
        }
    }

    /// Tensor of zeros.
    #[must_use]
    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::full(shape, 0.0)
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable element access. Shape is fixed.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Convert to `dtype`, rounding values to what that dtype can represent
    /// so the in-memory tensor matches what gets written.
    #[must_use]
    pub fn cast_to(mut self, dtype: DType) -> Self {
        if dtype == self.dtype {
            return self;
        }
        match dtype {
            DType::F32 | DType::F64 => {}
            DType::F16 => self
                .data
                .iter_mut()
                .for_each(|v| *v = half::f16::from_f32(*v).to_f32()),
            DType::BF16 => self
                .data
                .iter_mut()
                .for_each(|v| *v = half::bf16::from_f32(*v).to_f32()),
            DType::I64 | DType::I32 => self.data.iter_mut().for_each(|v| *v = v.round()),
        }
        self.dtype = dtype;
        self
    }

    /// Number of elements.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Bytes this tensor occupies on disk in its dtype.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.numel() * self.dtype.bytes_per_element()
    }

    /// Bitwise equality of the stored values (distinguishes `-0.0`/`0.0` and
    /// compares NaN payloads), used for "untouched" checks.
    #[must_use]
    pub fn bit_eq(&self, other: &Tensor) -> bool {
        self.shape == other.shape
            && self.data.len() == other.data.len()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

/// Element count of a shape. A rank-0 shape holds one scalar.
#[must_use]
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// [`numel`] that returns `None` instead of overflowing.
#[must_use]
pub fn checked_numel(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}
