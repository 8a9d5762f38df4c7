//! Host-side element storage shared between buffers and profiling snapshots.

use std::sync::Arc;

use super::DType;

/// Immutable element payload of a buffer.
///
/// Payloads are reference counted, so cloning one is the cheap way to take a
/// value snapshot: later writes to the buffer swap in a new payload instead of
/// mutating this one.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Arc<[f32]>),
    I32(Arc<[i32]>),
    Bool(Arc<[u8]>),
}

impl TensorData {
    /// Returns a zero-filled payload of `len` elements.
    pub fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::F32 => TensorData::F32(Arc::from(vec![0.0f32; len])),
            DType::I32 => TensorData::I32(Arc::from(vec![0i32; len])),
            DType::Bool => TensorData::Bool(Arc::from(vec![0u8; len])),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            TensorData::F32(_) => DType::F32,
            TensorData::I32(_) => DType::I32,
            TensorData::Bool(_) => DType::Bool,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(values) => values.len(),
            TensorData::I32(values) => values.len(),
            TensorData::Bool(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_in_bytes(&self) -> usize {
        self.len() * self.dtype().size_in_bytes()
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            TensorData::F32(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            TensorData::I32(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<&[u8]> {
        match self {
            TensorData::Bool(values) => Some(values),
            _ => None,
        }
    }

    /// Widens every element to `f32`; booleans map to `0.0` / `1.0`.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self {
            TensorData::F32(values) => values.to_vec(),
            TensorData::I32(values) => values.iter().map(|&v| v as f32).collect(),
            TensorData::Bool(values) => values.iter().map(|&v| f32::from(v)).collect(),
        }
    }

    /// Reports whether a floating point payload contains a NaN.
    pub fn has_nan(&self) -> bool {
        match self {
            TensorData::F32(values) => values.iter().any(|v| v.is_nan()),
            TensorData::I32(_) | TensorData::Bool(_) => false,
        }
    }
}

impl From<Vec<f32>> for TensorData {
    fn from(values: Vec<f32>) -> Self {
        TensorData::F32(Arc::from(values))
    }
}

impl From<Vec<i32>> for TensorData {
    fn from(values: Vec<i32>) -> Self {
        TensorData::I32(Arc::from(values))
    }
}

impl From<Vec<bool>> for TensorData {
    fn from(values: Vec<bool>) -> Self {
        TensorData::Bool(values.into_iter().map(u8::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::TensorData;
    use crate::tensor::DType;

    #[test]
    fn bool_payload_widens_to_zero_and_one() {
        let data = TensorData::from(vec![true, false, true]);
        assert_eq!(data.dtype(), DType::Bool);
        assert_eq!(data.size_in_bytes(), 3);
        assert_eq!(data.to_f32_vec(), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn nan_detection_only_applies_to_floats() {
        assert!(TensorData::from(vec![1.0f32, f32::NAN]).has_nan());
        assert!(!TensorData::from(vec![1.0f32, f32::INFINITY]).has_nan());
        assert!(!TensorData::from(vec![1i32, 2]).has_nan());
    }
}
