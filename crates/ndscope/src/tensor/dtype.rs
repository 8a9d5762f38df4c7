//! Enumerates the scalar element types a buffer can hold.

use std::fmt;

/// Logical dtype identifier carried by every buffer and variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit floating point following IEEE-754 semantics.
    F32,
    /// 32-bit signed integer, primarily for index buffers.
    I32,
    /// Boolean stored as one byte per element (`0` or `1`).
    Bool,
}

impl DType {
    /// Returns the number of bytes required per scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::Bool => 1,
        }
    }

    /// Produces a stable tag used when crossing FFI boundaries.
    pub fn tag(self) -> u32 {
        match self {
            DType::F32 => 0,
            DType::I32 => 1,
            DType::Bool => 2,
        }
    }

    /// Reconstructs a `DType` from its tag representation.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(DType::F32),
            1 => Some(DType::I32),
            2 => Some(DType::Bool),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DType::F32 => "float32",
            DType::I32 => "int32",
            DType::Bool => "bool",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::DType;

    #[test]
    fn tags_are_stable() {
        for dtype in [DType::F32, DType::I32, DType::Bool] {
            assert_eq!(DType::from_tag(dtype.tag()), Some(dtype));
        }
        assert_eq!(DType::from_tag(7), None);
    }
}
