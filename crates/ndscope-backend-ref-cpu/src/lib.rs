//! Reference CPU kernels and a wall-clock [`BackendTimer`](ndscope::BackendTimer)
//! for `ndscope`.
//!
//! The kernels are deliberately naive. They allocate their outputs through an
//! [`Engine`](ndscope::Engine), so they exercise scope tracking, and dispatch
//! through [`Engine::run_kernel`](ndscope::Engine::run_kernel), so they are
//! profiled when the engine has profiling enabled.

pub mod cpu;
mod timer;

pub use cpu::{CpuBackend, KernelError};
pub use timer::CpuTimer;
