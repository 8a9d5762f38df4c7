//! Kernel profiling with nested-call suppression.
//!
//! [`Profiler::profile_kernel`] times a kernel through a [`BackendTimer`] and
//! hands a [`KernelProfile`] to a [`Logger`]. Only the outermost profiled kernel
//! on the current thread is timed; kernels it calls run normally but produce no
//! record.
//!
//! ## Top-level call
//!
//! ```text
//! start_timer -> kernel() -> end_timer -> snapshot result -> return result
//!                                              |
//!                                              +-> spawned: query_time.await
//!                                                           -> NaN check (warns)
//!                                                           -> logger
//! ```
//!
//! The snapshot is taken before `profile_kernel` returns, so a scope that
//! disposes the result right afterwards cannot race the logging task. Failures
//! in the spawned part are reported through `tracing` and counted; they never
//! reach the caller.

mod depth;
mod logger;
mod timer;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, trace, warn};

use crate::config::EngineConfig;
use crate::error::ArenaError;
use crate::tensor::{Buffer, TensorData};

use depth::DepthGuard;
pub use logger::{format_profile_row, KernelProfile, Logger, TracingLogger};
pub use timer::{BackendTimer, TimerHandle};

static PROFILER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Failure in the asynchronous part of a profiled call.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("timer query failed: {0}")]
    Timer(#[source] anyhow::Error),
    #[error("logger failed: {0}")]
    Logger(#[source] anyhow::Error),
    #[error("the result of kernel '{kernel}' contains NaN")]
    NanDetected { kernel: String },
    #[error("could not snapshot kernel result: {0}")]
    Snapshot(#[from] ArenaError),
}

#[derive(Default)]
struct TailStats {
    logged: AtomicU64,
    failures: AtomicU64,
    nan_results: AtomicU64,
}

pub struct Profiler {
    id: u64,
    timer: Arc<dyn BackendTimer>,
    logger: Arc<dyn Logger>,
    runtime: Handle,
    check_numerics: bool,
    pending: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<TailStats>,
}

impl Profiler {
    /// Creates a profiler whose logging tasks run on the current tokio runtime.
    pub fn new(timer: Arc<dyn BackendTimer>, logger: Arc<dyn Logger>) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|err| anyhow!("profiler requires a tokio runtime: {err}"))?;
        Ok(Self::with_handle(timer, logger, runtime))
    }

    /// Creates a profiler on the current runtime honouring `config.check_numerics`.
    pub fn from_config(
        timer: Arc<dyn BackendTimer>,
        logger: Arc<dyn Logger>,
        config: &EngineConfig,
    ) -> Result<Self> {
        Ok(Self::new(timer, logger)?.with_check_numerics(config.check_numerics))
    }

    pub fn with_handle(
        timer: Arc<dyn BackendTimer>,
        logger: Arc<dyn Logger>,
        runtime: Handle,
    ) -> Self {
        Profiler {
            id: PROFILER_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            timer,
            logger,
            runtime,
            check_numerics: true,
            pending: Mutex::new(Vec::new()),
            stats: Arc::new(TailStats::default()),
        }
    }

    /// Enables or disables the NaN check on profiled float results. A NaN is
    /// reported with a warning and counted; the record is still logged.
    pub fn with_check_numerics(mut self, enabled: bool) -> Self {
        self.check_numerics = enabled;
        self
    }

    /// Nesting depth of profiled kernels on the calling thread.
    pub fn depth(&self) -> u32 {
        depth::current(self.id)
    }

    /// Runs `kernel`, timing and logging it if no other kernel profiled by this
    /// profiler is executing on the calling thread.
    ///
    /// Returns as soon as the kernel does; the timer query and the logger run
    /// later on the runtime. A kernel error is returned unchanged and produces no
    /// record.
    pub fn profile_kernel<F>(&self, name: &str, kernel: F) -> Result<Buffer>
    where
        F: FnOnce() -> Result<Buffer>,
    {
        if depth::current(self.id) > 0 {
            let _nested = DepthGuard::enter(self.id);
            return kernel();
        }

        let handle = self.timer.start_timer();
        let outcome = {
            let _outermost = DepthGuard::enter(self.id);
            kernel()
        };
        let handle = self.timer.end_timer(handle);
        let result = outcome?;

        match result.data() {
            Ok(snapshot) => self.spawn_tail(name, result.clone(), snapshot, handle),
            Err(err) => report_failure(&self.stats, name, &ProfileError::from(err)),
        }
        Ok(result)
    }

    fn spawn_tail(&self, name: &str, result: Buffer, snapshot: TensorData, handle: TimerHandle) {
        let name = name.to_owned();
        let timer = Arc::clone(&self.timer);
        let logger = Arc::clone(&self.logger);
        let stats = Arc::clone(&self.stats);
        let check_numerics = self.check_numerics;

        let task = self.runtime.spawn(async move {
            let outcome: Result<(), ProfileError> = async {
                let elapsed_ms = timer
                    .query_time(handle)
                    .await
                    .map_err(ProfileError::Timer)?;
                if check_numerics && snapshot.has_nan() {
                    stats.nan_results.fetch_add(1, Ordering::Relaxed);
                    let err = ProfileError::NanDetected {
                        kernel: name.clone(),
                    };
                    warn!(kernel = %name, error = %err, "profiled kernel produced NaN");
                }
                let profile = KernelProfile {
                    name: name.clone(),
                    result,
                    snapshot,
                    elapsed_ms,
                };
                logger
                    .log_kernel_profile(&profile)
                    .map_err(ProfileError::Logger)
            }
            .await;

            match outcome {
                Ok(()) => {
                    stats.logged.fetch_add(1, Ordering::Relaxed);
                    trace!(kernel = %name, "logged kernel profile");
                }
                Err(err) => report_failure(&stats, &name, &err),
            }
        });

        let mut pending = self.pending.lock();
        pending.retain(|task| !task.is_finished());
        pending.push(task);
    }

    /// Number of logging tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        let mut pending = self.pending.lock();
        pending.retain(|task| !task.is_finished());
        pending.len()
    }

    /// Waits for every logging task spawned so far.
    pub async fn flush(&self) {
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.pending.lock());
        for task in tasks {
            if let Err(err) = task.await {
                error!(error = %err, "kernel profile task did not complete");
            }
        }
    }

    /// Records successfully handed to the logger.
    pub fn records_logged(&self) -> u64 {
        self.stats.logged.load(Ordering::Relaxed)
    }

    /// Logged records whose snapshot contained NaN. Only counted while the NaN
    /// check is enabled.
    pub fn nan_results(&self) -> u64 {
        self.stats.nan_results.load(Ordering::Relaxed)
    }

    /// Profiled calls whose record could not be produced or logged.
    pub fn tail_failures(&self) -> u64 {
        self.stats.failures.load(Ordering::Relaxed)
    }
}

fn report_failure(stats: &TailStats, kernel: &str, err: &ProfileError) {
    stats.failures.fetch_add(1, Ordering::Relaxed);
    error!(kernel = %kernel, error = %err, "kernel profiling failed");
}
