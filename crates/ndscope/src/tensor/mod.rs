//! Core buffer abstractions.
//!
//! The tensor module defines shapes, dtypes, host payloads and the disposable
//! [`Buffer`] handle whose lifetime the scope arena and the variable registry
//! manage.

mod buffer;
mod data;
pub mod dtype;
pub mod shape;

pub use buffer::{Buffer, BufferId, Ownership};
pub use data::TensorData;
pub use dtype::DType;
pub use shape::Shape;
