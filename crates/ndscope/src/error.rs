//! Ownership and bookkeeping failures raised by the arena and the variable registry.

use thiserror::Error;

use crate::tensor::{BufferId, DType, Shape};

/// Synchronous contract violation. Every operation that returns one of these
/// leaves arena, registry and buffers exactly as they were.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    #[error("buffer {id} has already been disposed")]
    DisposedBuffer { id: BufferId },
    #[error("no active scope to track the allocation in")]
    NoActiveScope,
    #[error("variable name '{name}' is already registered")]
    DuplicateName { name: String },
    #[error("buffer {id} already backs a variable")]
    DuplicateOwner { id: BufferId },
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: Shape, actual: Shape },
    #[error("dtype mismatch: expected {expected}, got {actual}")]
    DtypeMismatch { expected: DType, actual: DType },
    #[error("variable '{name}' not found")]
    NotFound { name: String },
    #[error("shape dimensions must be positive, got {dims:?}")]
    InvalidShape { dims: Vec<usize> },
    #[error("data length ({actual}) does not match the shape's element count ({expected})")]
    DataLength { expected: usize, actual: usize },
}

pub type ArenaResult<T> = Result<T, ArenaError>;
