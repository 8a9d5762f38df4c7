use anyhow::Result;
use tracing::info;

use crate::tensor::{Buffer, TensorData};

/// Completed profiling record for one top-level kernel invocation.
#[derive(Debug, Clone)]
pub struct KernelProfile {
    pub name: String,
    /// Handle to the kernel's result. It may have been disposed by the time the
    /// record is logged; `snapshot` holds the values taken when the kernel returned.
    pub result: Buffer,
    pub snapshot: TensorData,
    pub elapsed_ms: f64,
}

/// Sink for profiling records.
pub trait Logger: Send + Sync {
    fn log_kernel_profile(&self, profile: &KernelProfile) -> Result<()>;
}

/// Emits one `info` event per record on the `ndscope::profile` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log_kernel_profile(&self, profile: &KernelProfile) -> Result<()> {
        info!(
            target: "ndscope::profile",
            kernel = %profile.name,
            elapsed_ms = profile.elapsed_ms,
            "{}",
            format_profile_row(profile)
        );
        Ok(())
    }
}

/// Formats a record as a tab-separated row:
/// `name (25)  time (9)  <rank>D shape (14)  size`.
pub fn format_profile_row(profile: &KernelProfile) -> String {
    let name = right_pad(&profile.name, 25);
    let time = right_pad(&format!("{}ms", profile.elapsed_ms), 9);
    let dims = profile
        .result
        .shape()
        .dims()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let shape = right_pad(&dims, 14);
    format!(
        "{name}\t{time}\t{}D {shape}\t{}",
        profile.result.rank(),
        profile.result.size()
    )
}

fn right_pad(value: &str, width: usize) -> String {
    format!("{value:<width$}")
}
