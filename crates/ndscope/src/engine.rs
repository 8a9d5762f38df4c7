//! Execution context tying the scope arena, the variable registry and the profiler together.
//!
//! An [`Engine`] is the explicit context every allocation, scope and variable
//! operation goes through. Its state lives in `RefCell`s, so an engine can move
//! between threads but cannot be shared by them; concurrent callers each own
//! an engine.
//!
//! ```rust,ignore
//! let engine = Engine::new();
//! let total = engine.scope("sum", |engine| {
//!     let a = engine.from_f32([3], vec![1.0, 2.0, 3.0])?;
//!     let b = engine.from_f32([3], vec![4.0, 5.0, 6.0])?;
//!     // `a` and `b` are disposed on exit, the returned buffer is kept.
//!     add(engine, &a, &b)
//! })?;
//! ```

use std::cell::RefCell;
use std::sync::Arc;

use anyhow::Result;
use tracing::warn;

use crate::arena::{MemoryInfo, ScopeArena, ScopeExit, ScopeOutput};
use crate::config::EngineConfig;
use crate::error::ArenaResult;
use crate::profiling::Profiler;
use crate::tensor::{Buffer, DType, Ownership, Shape, TensorData};
use crate::variables::{Variable, VariableRegistry};

pub struct Engine {
    arena: RefCell<ScopeArena>,
    variables: RefCell<VariableRegistry>,
    profiler: Option<Arc<Profiler>>,
    config: EngineConfig,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Builds an engine configured from `NDSCOPE_*` environment variables.
    pub fn from_env() -> Self {
        Self::with_config(EngineConfig::from_env())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let arena = if config.strict_scopes {
            ScopeArena::strict()
        } else {
            ScopeArena::new()
        };
        Engine {
            arena: RefCell::new(arena),
            variables: RefCell::new(VariableRegistry::new()),
            profiler: None,
            config,
        }
    }

    /// Attaches the profiler used by [`Engine::run_kernel`] when profiling is enabled.
    pub fn with_profiler(mut self, profiler: Arc<Profiler>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn profiler(&self) -> Option<&Arc<Profiler>> {
        self.profiler.as_ref()
    }

    /// Allocates a buffer and tracks it in the active scope.
    pub fn tensor(
        &self,
        shape: impl Into<Shape>,
        data: impl Into<TensorData>,
    ) -> ArenaResult<Buffer> {
        let buffer = Buffer::new(shape.into(), data.into())?;
        self.track(&buffer)?;
        Ok(buffer)
    }

    pub fn from_f32(&self, shape: impl Into<Shape>, values: Vec<f32>) -> ArenaResult<Buffer> {
        self.tensor(shape, values)
    }

    pub fn from_i32(&self, shape: impl Into<Shape>, values: Vec<i32>) -> ArenaResult<Buffer> {
        self.tensor(shape, values)
    }

    pub fn from_bool(&self, shape: impl Into<Shape>, values: Vec<bool>) -> ArenaResult<Buffer> {
        self.tensor(shape, values)
    }

    pub fn scalar(&self, value: f32) -> ArenaResult<Buffer> {
        self.tensor(Shape::scalar(), vec![value])
    }

    pub fn zeros(&self, shape: impl Into<Shape>, dtype: DType) -> ArenaResult<Buffer> {
        let shape = shape.into();
        let data = TensorData::zeros(dtype, shape.num_elements());
        self.tensor(shape, data)
    }

    /// Registers a buffer built outside the engine with the active scope.
    pub fn track(&self, buffer: &Buffer) -> ArenaResult<()> {
        self.arena.borrow_mut().track(buffer)
    }

    /// Keeps `buffer` alive past the exit of the scope that owns it.
    pub fn keep(&self, buffer: &Buffer) -> ArenaResult<()> {
        self.arena.borrow_mut().keep(buffer)
    }

    /// Disposes a buffer. A buffer backing a variable disposes the variable.
    pub fn dispose(&self, buffer: &Buffer) -> ArenaResult<()> {
        if buffer.ownership() == Ownership::Persistent && !buffer.is_disposed() {
            let owner = self.variables.borrow().find_by_buffer(buffer.id());
            if let Some(variable) = owner {
                return self.dispose_variable(&variable);
            }
        }
        self.arena.borrow_mut().dispose(buffer)
    }

    /// Live buffers, variables included.
    pub fn count(&self) -> usize {
        self.arena.borrow().count()
    }

    pub fn memory(&self) -> MemoryInfo {
        self.arena.borrow().memory()
    }

    pub fn enter_scope(&self, name: Option<&str>) {
        self.arena.borrow_mut().enter_scope(name);
    }

    pub fn exit_scope(&self, keep: &[Buffer]) -> ArenaResult<ScopeExit> {
        self.arena.borrow_mut().exit_scope(keep)
    }

    /// Runs `body` inside a fresh scope.
    ///
    /// Buffers reachable from the returned value move to the enclosing scope;
    /// everything else allocated inside is disposed. The scope is closed on
    /// error and while unwinding from a panic as well.
    pub fn scope<T, F>(&self, name: &str, body: F) -> Result<T>
    where
        T: ScopeOutput,
        F: FnOnce(&Engine) -> Result<T>,
    {
        self.enter_scope(Some(name));
        let guard = ScopeGuard {
            engine: self,
            name,
            armed: true,
        };
        let output = body(self)?;
        guard.disarm();

        let mut keep = Vec::new();
        output.collect_buffers(&mut keep);
        self.exit_scope(&keep)?;
        Ok(output)
    }

    pub fn variable(
        &self,
        initial: Buffer,
        trainable: bool,
        name: Option<&str>,
    ) -> ArenaResult<Variable> {
        let mut variables = self.variables.borrow_mut();
        let mut arena = self.arena.borrow_mut();
        variables.create(&mut arena, initial, trainable, name)
    }

    pub fn assign(&self, variable: &Variable, next: Buffer) -> ArenaResult<()> {
        let mut variables = self.variables.borrow_mut();
        let mut arena = self.arena.borrow_mut();
        variables.assign(&mut arena, variable, next)
    }

    pub fn dispose_variable(&self, variable: &Variable) -> ArenaResult<()> {
        let mut variables = self.variables.borrow_mut();
        let mut arena = self.arena.borrow_mut();
        variables.dispose(&mut arena, variable)
    }

    /// Disposes every variable, returning how many were removed.
    pub fn dispose_variables(&self) -> ArenaResult<usize> {
        let mut variables = self.variables.borrow_mut();
        let mut arena = self.arena.borrow_mut();
        variables.dispose_all(&mut arena)
    }

    pub fn lookup_variable(&self, name: &str) -> ArenaResult<Variable> {
        self.variables.borrow().lookup(name)
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.variables.borrow().names()
    }

    pub fn trainable_variables(&self) -> Vec<Variable> {
        self.variables.borrow().trainable_variables()
    }

    /// Executes a kernel, profiling it when `config.profile` is set and a
    /// profiler is attached.
    pub fn run_kernel<F>(&self, name: &str, kernel: F) -> Result<Buffer>
    where
        F: FnOnce() -> Result<Buffer>,
    {
        match &self.profiler {
            Some(profiler) if self.config.profile => profiler.profile_kernel(name, kernel),
            _ => kernel(),
        }
    }
}

/// Closes a scope opened by [`Engine::scope`] unless the body completed.
struct ScopeGuard<'a> {
    engine: &'a Engine,
    name: &'a str,
    armed: bool,
}

impl ScopeGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(mut arena) = self.engine.arena.try_borrow_mut() else {
            warn!(scope = self.name, "arena busy; scope left open while unwinding");
            return;
        };
        match arena.exit_scope(&[]) {
            Ok(exit) => warn!(
                scope = self.name,
                disposed = exit.disposed,
                "scope body failed; disposed its buffers"
            ),
            Err(err) => warn!(scope = self.name, error = %err, "failed to close scope"),
        }
    }
}
