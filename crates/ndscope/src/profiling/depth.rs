use std::cell::RefCell;
use std::collections::HashMap;

// Profiler id -> number of profiled kernels currently executing on this thread.
thread_local! {
    static KERNEL_DEPTH: RefCell<HashMap<u64, u32>> = RefCell::new(HashMap::new());
}

pub(crate) fn current(profiler: u64) -> u32 {
    KERNEL_DEPTH.with(|depths| depths.borrow().get(&profiler).copied().unwrap_or(0))
}

/// Holds one level of kernel nesting for a profiler until dropped.
///
/// Unwinding drops the guard as well, so a failing kernel never leaves the
/// counter raised.
pub(crate) struct DepthGuard {
    profiler: u64,
}

impl DepthGuard {
    pub(crate) fn enter(profiler: u64) -> Self {
        KERNEL_DEPTH.with(|depths| {
            let mut depths = depths.borrow_mut();
            let depth = depths.entry(profiler).or_insert(0);
            *depth = depth.saturating_add(1);
        });
        DepthGuard { profiler }
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        KERNEL_DEPTH.with(|depths| {
            let mut depths = depths.borrow_mut();
            if let Some(depth) = depths.get_mut(&self.profiler) {
                *depth = depth.saturating_sub(1);
                if *depth == 0 {
                    depths.remove(&self.profiler);
                }
            }
        });
    }
}
