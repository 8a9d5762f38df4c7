//! Scope-based buffer lifetime tracking and kernel profiling.
//!
//! Buffers allocated through an [`Engine`] belong to the innermost open scope
//! and are disposed when it exits unless they are returned or kept. Variables
//! are named buffers that outlive every scope. Kernels run through
//! [`Engine::run_kernel`] can be timed by a [`Profiler`], which logs exactly one
//! record per outermost kernel call.

pub mod arena;
pub mod config;
mod engine;
mod env;
pub mod error;
pub mod profiling;
pub mod tensor;
pub mod variables;

pub use arena::{MemoryInfo, ScopeArena, ScopeExit, ScopeOutput};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{ArenaError, ArenaResult};
pub use profiling::{
    BackendTimer, KernelProfile, Logger, ProfileError, Profiler, TimerHandle, TracingLogger,
};
pub use tensor::{Buffer, BufferId, DType, Ownership, Shape, TensorData};
pub use variables::{Variable, VariableRegistry};
