use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ndscope::{BackendTimer, TimerHandle};

/// Host wall-clock timer. CPU kernels finish before `end_timer` returns, so the
/// query resolves immediately.
#[derive(Debug, Default)]
pub struct CpuTimer {
    next_query: AtomicU64,
}

impl CpuTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timer queries opened so far.
    pub fn queries_started(&self) -> u64 {
        self.next_query.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BackendTimer for CpuTimer {
    fn start_timer(&self) -> TimerHandle {
        TimerHandle::start(self.next_query.fetch_add(1, Ordering::Relaxed))
    }

    fn end_timer(&self, handle: TimerHandle) -> TimerHandle {
        handle.end()
    }

    async fn query_time(&self, handle: TimerHandle) -> Result<f64> {
        let elapsed = handle
            .elapsed()
            .ok_or_else(|| anyhow!("timer query {} was never ended", handle.query()))?;
        Ok(elapsed.as_secs_f64() * 1000.0)
    }
}
