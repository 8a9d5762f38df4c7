//! Disposable buffer handle with shape metadata and ownership tagging.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{DType, Shape, TensorData};
use crate::error::{ArenaError, ArenaResult};

static BUFFER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_buffer_id() -> BufferId {
    BufferId(BUFFER_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed))
}

/// Process-wide unique buffer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Who is responsible for disposing a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Owned by a scope frame (or not tracked yet); swept on scope exit.
    Scoped,
    /// Backs a variable; only the variable registry may dispose it.
    Persistent,
}

struct BufferState {
    data: Option<TensorData>,
    ownership: Ownership,
}

struct BufferInner {
    id: BufferId,
    shape: Shape,
    dtype: DType,
    state: Mutex<BufferState>,
}

/// Handle to a block of numeric storage.
///
/// Cloning a `Buffer` clones the handle, not the storage. Shape and dtype stay
/// readable after disposal; element access fails with
/// [`ArenaError::DisposedBuffer`].
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<BufferInner>,
}

impl Buffer {
    /// Allocates an untracked buffer, validating the shape and the payload length.
    ///
    /// Kernel code normally goes through `Engine::tensor`, which also tracks the
    /// result in the active scope.
    pub fn new(shape: Shape, data: TensorData) -> ArenaResult<Self> {
        shape.validate()?;
        if data.len() != shape.num_elements() {
            return Err(ArenaError::DataLength {
                expected: shape.num_elements(),
                actual: data.len(),
            });
        }
        Ok(Buffer {
            inner: Arc::new(BufferInner {
                id: next_buffer_id(),
                shape,
                dtype: data.dtype(),
                state: Mutex::new(BufferState {
                    data: Some(data),
                    ownership: Ownership::Scoped,
                }),
            }),
        })
    }

    pub fn id(&self) -> BufferId {
        self.inner.id
    }

    pub fn shape(&self) -> &Shape {
        &self.inner.shape
    }

    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    pub fn rank(&self) -> usize {
        self.inner.shape.rank()
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        self.inner.shape.num_elements()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.size() * self.inner.dtype.size_in_bytes()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().data.is_none()
    }

    pub fn ownership(&self) -> Ownership {
        self.inner.state.lock().ownership
    }

    /// Returns a snapshot of the current contents.
    pub fn data(&self) -> ArenaResult<TensorData> {
        self.inner
            .state
            .lock()
            .data
            .clone()
            .ok_or(ArenaError::DisposedBuffer { id: self.id() })
    }

    /// Copies the contents out as `f32` values.
    pub fn to_f32_vec(&self) -> ArenaResult<Vec<f32>> {
        Ok(self.data()?.to_f32_vec())
    }

    /// Replaces the contents in place; dtype and element count must match.
    pub fn overwrite(&self, data: TensorData) -> ArenaResult<()> {
        if data.dtype() != self.dtype() {
            return Err(ArenaError::DtypeMismatch {
                expected: self.dtype(),
                actual: data.dtype(),
            });
        }
        if data.len() != self.size() {
            return Err(ArenaError::DataLength {
                expected: self.size(),
                actual: data.len(),
            });
        }
        let mut state = self.inner.state.lock();
        if state.data.is_none() {
            return Err(ArenaError::DisposedBuffer { id: self.id() });
        }
        state.data = Some(data);
        Ok(())
    }

    /// Returns true when both handles refer to the same storage.
    pub fn same_buffer(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Releases the storage. Fails if it was already released.
    pub(crate) fn release(&self) -> ArenaResult<()> {
        let mut state = self.inner.state.lock();
        match state.data.take() {
            Some(_) => Ok(()),
            None => Err(ArenaError::DisposedBuffer { id: self.id() }),
        }
    }

    pub(crate) fn set_ownership(&self, ownership: Ownership) {
        self.inner.state.lock().ownership = ownership;
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.same_buffer(other)
    }
}

impl Eq for Buffer {}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id())
            .field("shape", self.shape())
            .field("dtype", &self.dtype())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
