use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;

/// Opaque token identifying one bracketed unit of backend work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    query: u64,
    started_at: Instant,
    ended_at: Option<Instant>,
}

impl TimerHandle {
    /// Opens a handle for backend query `query`, stamped with the host clock.
    pub fn start(query: u64) -> Self {
        TimerHandle {
            query,
            started_at: Instant::now(),
            ended_at: None,
        }
    }

    /// Closes the handle. Ending twice keeps the first end stamp.
    pub fn end(self) -> Self {
        TimerHandle {
            ended_at: self.ended_at.or_else(|| Some(Instant::now())),
            ..self
        }
    }

    pub fn query(&self) -> u64 {
        self.query
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<Instant> {
        self.ended_at
    }

    /// Host-clock time between start and end, if the handle was ended.
    pub fn elapsed(&self) -> Option<Duration> {
        self.ended_at
            .map(|end| end.saturating_duration_since(self.started_at))
    }
}

/// Timing capability exposed by a backend.
///
/// `start_timer` / `end_timer` bracket the work synchronously. `query_time`
/// resolves once the backend confirms completion, possibly much later, and
/// yields the elapsed time in milliseconds.
#[async_trait]
pub trait BackendTimer: Send + Sync {
    fn start_timer(&self) -> TimerHandle;

    fn end_timer(&self, handle: TimerHandle) -> TimerHandle;

    async fn query_time(&self, handle: TimerHandle) -> Result<f64>;
}
