//! Named, persistent buffers that outlive the scope that created them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::arena::ScopeArena;
use crate::error::{ArenaError, ArenaResult};
use crate::tensor::{Buffer, BufferId, DType, Ownership, Shape, TensorData};

const DEFAULT_NAME_PREFIX: &str = "variable_";

struct VariableInner {
    name: String,
    trainable: bool,
    shape: Shape,
    dtype: DType,
    current: Mutex<Buffer>,
}

/// Handle to a registered variable.
///
/// Clones share state: an `assign` through the registry is visible from every
/// handle.
#[derive(Clone)]
pub struct Variable {
    inner: Arc<VariableInner>,
}

impl Variable {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn trainable(&self) -> bool {
        self.inner.trainable
    }

    /// Declared shape; every assigned buffer must match it exactly.
    pub fn shape(&self) -> &Shape {
        &self.inner.shape
    }

    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    /// Returns the buffer currently backing the variable.
    pub fn buffer(&self) -> Buffer {
        self.inner.current.lock().clone()
    }

    pub fn data(&self) -> ArenaResult<TensorData> {
        self.buffer().data()
    }

    pub fn to_f32_vec(&self) -> ArenaResult<Vec<f32>> {
        self.buffer().to_f32_vec()
    }

    pub fn is_disposed(&self) -> bool {
        self.buffer().is_disposed()
    }

    fn same_variable(&self, other: &Variable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.same_variable(other)
    }
}

impl Eq for Variable {}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("name", &self.name())
            .field("trainable", &self.trainable())
            .field("buffer", &self.buffer())
            .finish()
    }
}

/// Name-to-variable mapping owned by one engine.
///
/// Every mutating call takes the arena explicitly so ownership moves between the
/// frame stack and the persistent set in one place. Names of disposed variables
/// may be registered again.
#[derive(Default)]
pub struct VariableRegistry {
    variables: HashMap<String, Variable>,
    next_default_id: u64,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `initial` as a new variable.
    ///
    /// Without a name, `variable_<n>` is generated, skipping names already in
    /// use. The buffer leaves whatever frame owned it and becomes persistent.
    pub fn create(
        &mut self,
        arena: &mut ScopeArena,
        initial: Buffer,
        trainable: bool,
        name: Option<&str>,
    ) -> ArenaResult<Variable> {
        if initial.is_disposed() {
            return Err(ArenaError::DisposedBuffer { id: initial.id() });
        }
        if initial.ownership() == Ownership::Persistent {
            return Err(ArenaError::DuplicateOwner { id: initial.id() });
        }
        let name = match name {
            Some(name) if self.variables.contains_key(name) => {
                return Err(ArenaError::DuplicateName {
                    name: name.to_owned(),
                });
            }
            Some(name) => name.to_owned(),
            None => self.generate_name(),
        };

        arena.promote(&initial)?;
        let variable = Variable {
            inner: Arc::new(VariableInner {
                name: name.clone(),
                trainable,
                shape: initial.shape().clone(),
                dtype: initial.dtype(),
                current: Mutex::new(initial),
            }),
        };
        self.variables.insert(name, variable.clone());
        debug!(variable = variable.name(), trainable, "created variable");
        Ok(variable)
    }

    /// Replaces the variable's buffer with `next`, disposing the previous one.
    ///
    /// Fails without touching either buffer when shape or dtype differ.
    pub fn assign(
        &mut self,
        arena: &mut ScopeArena,
        variable: &Variable,
        next: Buffer,
    ) -> ArenaResult<()> {
        self.ensure_registered(variable)?;
        let previous = variable.buffer();
        if previous.same_buffer(&next) {
            return Ok(());
        }
        if next.is_disposed() {
            return Err(ArenaError::DisposedBuffer { id: next.id() });
        }
        if next.shape() != variable.shape() {
            return Err(ArenaError::ShapeMismatch {
                expected: variable.shape().clone(),
                actual: next.shape().clone(),
            });
        }
        if next.dtype() != variable.dtype() {
            return Err(ArenaError::DtypeMismatch {
                expected: variable.dtype(),
                actual: next.dtype(),
            });
        }
        if next.ownership() == Ownership::Persistent {
            return Err(ArenaError::DuplicateOwner { id: next.id() });
        }

        arena.release_persistent(&previous)?;
        arena.promote(&next)?;
        *variable.inner.current.lock() = next;
        Ok(())
    }

    /// Removes the variable and disposes its current buffer.
    pub fn dispose(&mut self, arena: &mut ScopeArena, variable: &Variable) -> ArenaResult<()> {
        self.ensure_registered(variable)?;
        arena.release_persistent(&variable.buffer())?;
        self.variables.remove(variable.name());
        debug!(variable = variable.name(), "disposed variable");
        Ok(())
    }

    /// Disposes every registered variable, returning how many were removed.
    ///
    /// Stops at the first failure; variables disposed before it stay removed and
    /// the rest stay registered.
    pub fn dispose_all(&mut self, arena: &mut ScopeArena) -> ArenaResult<usize> {
        let mut disposed = 0;
        for name in self.names() {
            if let Some(variable) = self.variables.get(&name) {
                arena.release_persistent(&variable.buffer())?;
                self.variables.remove(&name);
                disposed += 1;
            }
        }
        Ok(disposed)
    }

    pub fn lookup(&self, name: &str) -> ArenaResult<Variable> {
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| ArenaError::NotFound {
                name: name.to_owned(),
            })
    }

    /// Finds the variable currently backed by `id`.
    pub fn find_by_buffer(&self, id: BufferId) -> Option<Variable> {
        self.variables
            .values()
            .find(|variable| variable.buffer().id() == id)
            .cloned()
    }

    /// Registered names in lexical order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.variables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn trainable_variables(&self) -> Vec<Variable> {
        let mut variables: Vec<Variable> = self
            .variables
            .values()
            .filter(|variable| variable.trainable())
            .cloned()
            .collect();
        variables.sort_by(|a, b| a.name().cmp(b.name()));
        variables
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    fn ensure_registered(&self, variable: &Variable) -> ArenaResult<()> {
        match self.variables.get(variable.name()) {
            Some(registered) if registered.same_variable(variable) => Ok(()),
            _ => Err(ArenaError::NotFound {
                name: variable.name().to_owned(),
            }),
        }
    }

    fn generate_name(&mut self) -> String {
        loop {
            let candidate = format!("{DEFAULT_NAME_PREFIX}{}", self.next_default_id);
            self.next_default_id += 1;
            if !self.variables.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: &[f32]) -> Buffer {
        Buffer::new(Shape::from([values.len()]), TensorData::from(values.to_vec())).unwrap()
    }

    #[test]
    fn generated_names_skip_registered_ones() {
        let mut arena = ScopeArena::new();
        let mut registry = VariableRegistry::new();
        registry
            .create(&mut arena, vector(&[1.0]), true, Some("variable_0"))
            .unwrap();
        let generated = registry
            .create(&mut arena, vector(&[2.0]), true, None)
            .unwrap();
        assert_eq!(generated.name(), "variable_1");
    }

    #[test]
    fn failed_dispose_keeps_the_name_registered() {
        let mut arena = ScopeArena::new();
        let mut registry = VariableRegistry::new();
        let variable = registry
            .create(&mut arena, vector(&[1.0]), true, Some("w"))
            .unwrap();

        assert_eq!(
            arena.dispose(&variable.buffer()),
            Err(ArenaError::DuplicateOwner {
                id: variable.buffer().id()
            })
        );
        assert!(!variable.is_disposed());

        // Released behind the registry's back: the registry call fails and
        // leaves the name in place.
        variable.buffer().release().unwrap();
        assert_eq!(
            registry.dispose(&mut arena, &variable),
            Err(ArenaError::DisposedBuffer {
                id: variable.buffer().id()
            })
        );
        assert_eq!(registry.names(), vec!["w".to_owned()]);
        assert_eq!(
            registry.dispose_all(&mut arena),
            Err(ArenaError::DisposedBuffer {
                id: variable.buffer().id()
            })
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stale_handle_is_not_found() {
        let mut arena = ScopeArena::new();
        let mut registry = VariableRegistry::new();
        let first = registry
            .create(&mut arena, vector(&[1.0]), true, Some("w"))
            .unwrap();
        registry.dispose(&mut arena, &first).unwrap();
        let second = registry
            .create(&mut arena, vector(&[2.0]), true, Some("w"))
            .unwrap();

        assert_eq!(
            registry.assign(&mut arena, &first, vector(&[3.0])),
            Err(ArenaError::NotFound {
                name: "w".to_owned()
            })
        );
        assert_eq!(second.to_f32_vec().unwrap(), vec![2.0]);
    }
}
