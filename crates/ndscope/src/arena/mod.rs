//! Scope-based lifetime tracking for buffers.
//!
//! The arena keeps a strict stack of frames. Every allocation is tracked by the
//! frame that is on top when it happens; popping a frame disposes everything it
//! owns except the buffers the caller asks to keep, which move to the parent
//! frame. Buffers that back variables are held in a separate persistent set and
//! never belong to a frame.
//!
//! ## Frame stack
//!
//! ```text
//! frames[0]  root frame, never popped
//! frames[1]  outermost user scope
//! ...
//! frames[n]  active frame (receives `track`)
//! ```
//!
//! In strict mode the root frame still exists to receive buffers that escape the
//! outermost scope, but tracking into it directly fails with
//! [`ArenaError::NoActiveScope`].

mod frame;
mod output;

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::error::{ArenaError, ArenaResult};
use crate::tensor::{Buffer, BufferId, Ownership};

use frame::Frame;
pub use output::ScopeOutput;

/// Snapshot of what the arena currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryInfo {
    /// Live buffers, variables included.
    pub num_buffers: usize,
    pub num_bytes: usize,
    pub num_variables: usize,
    /// Number of open user scopes.
    pub scope_depth: usize,
}

/// Outcome of popping a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScopeExit {
    pub disposed: usize,
    pub kept: usize,
}

/// Stack of scope frames plus the set of persistent buffers.
pub struct ScopeArena {
    frames: Vec<Frame>,
    owners: HashMap<BufferId, usize>,
    persistent: HashMap<BufferId, Buffer>,
    strict: bool,
}

impl Default for ScopeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeArena {
    /// Creates an arena whose root frame accepts top-level allocations.
    pub fn new() -> Self {
        ScopeArena {
            frames: vec![Frame::new(Some("root"))],
            owners: HashMap::new(),
            persistent: HashMap::new(),
            strict: false,
        }
    }

    /// Creates an arena that rejects allocations made outside any user scope.
    pub fn strict() -> Self {
        ScopeArena {
            strict: true,
            ..Self::new()
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Number of open user scopes (the root frame is not counted).
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn enter_scope(&mut self, name: Option<&str>) {
        self.frames.push(Frame::new(name));
        debug!(
            scope = self.frames[self.frames.len() - 1].name(),
            depth = self.depth(),
            "entered scope"
        );
    }

    /// Registers a buffer with the active frame.
    ///
    /// Tracking a buffer that is already tracked, or that backs a variable, is a
    /// no-op.
    pub fn track(&mut self, buffer: &Buffer) -> ArenaResult<()> {
        if buffer.is_disposed() {
            return Err(ArenaError::DisposedBuffer { id: buffer.id() });
        }
        if self.strict && self.depth() == 0 {
            return Err(ArenaError::NoActiveScope);
        }
        if buffer.ownership() == Ownership::Persistent || self.owners.contains_key(&buffer.id()) {
            return Ok(());
        }
        let index = self.frames.len() - 1;
        self.frames[index].push(buffer.clone());
        self.owners.insert(buffer.id(), index);
        trace!(buffer = %buffer.id(), frame = index, "tracked buffer");
        Ok(())
    }

    /// Marks a buffer so that it survives the exit of the frame that owns it.
    ///
    /// Untracked buffers are tracked by the active frame first.
    pub fn keep(&mut self, buffer: &Buffer) -> ArenaResult<()> {
        if buffer.is_disposed() {
            return Err(ArenaError::DisposedBuffer { id: buffer.id() });
        }
        if buffer.ownership() == Ownership::Persistent {
            return Ok(());
        }
        if !self.owners.contains_key(&buffer.id()) {
            self.track(buffer)?;
        }
        let index = self.owners[&buffer.id()];
        self.frames[index].mark_kept(buffer.id());
        Ok(())
    }

    /// Pops the active frame.
    ///
    /// Buffers listed in `keep` or marked kept are re-tracked by the parent
    /// frame; everything else the frame owns is disposed.
    pub fn exit_scope(&mut self, keep: &[Buffer]) -> ArenaResult<ScopeExit> {
        if self.depth() == 0 {
            return Err(ArenaError::NoActiveScope);
        }
        let frame = self.frames.remove(self.frames.len() - 1);
        let name = frame.name().to_owned();
        let parent = self.frames.len() - 1;
        let (buffers, mut kept_ids) = frame.into_parts();
        kept_ids.extend(keep.iter().map(Buffer::id));

        let mut exit = ScopeExit::default();
        for buffer in buffers {
            let id = buffer.id();
            self.owners.remove(&id);
            if kept_ids.contains(&id) {
                self.frames[parent].push(buffer);
                self.owners.insert(id, parent);
                exit.kept += 1;
            } else if buffer.release().is_ok() {
                trace!(buffer = %id, "disposed buffer on scope exit");
                exit.disposed += 1;
            }
        }

        debug!(
            scope = %name,
            disposed = exit.disposed,
            kept = exit.kept,
            live = self.count(),
            "exited scope"
        );
        Ok(exit)
    }

    /// Disposes a scoped buffer and forgets it.
    ///
    /// Disposing a buffer twice fails with [`ArenaError::DisposedBuffer`] and
    /// changes nothing. Buffers backing a variable are rejected with
    /// [`ArenaError::DuplicateOwner`]; they are released through the variable
    /// registry.
    pub fn dispose(&mut self, buffer: &Buffer) -> ArenaResult<()> {
        if buffer.ownership() == Ownership::Persistent && !buffer.is_disposed() {
            return Err(ArenaError::DuplicateOwner { id: buffer.id() });
        }
        buffer.release()?;
        let id = buffer.id();
        if let Some(index) = self.owners.remove(&id) {
            self.frames[index].remove(id);
        }
        trace!(buffer = %id, "disposed buffer");
        Ok(())
    }

    /// Disposes a persistent buffer on behalf of the variable registry.
    pub(crate) fn release_persistent(&mut self, buffer: &Buffer) -> ArenaResult<()> {
        buffer.release()?;
        self.persistent.remove(&buffer.id());
        trace!(buffer = %buffer.id(), "released persistent buffer");
        Ok(())
    }

    /// Moves a buffer out of its frame into the persistent set.
    pub fn promote(&mut self, buffer: &Buffer) -> ArenaResult<()> {
        if buffer.is_disposed() {
            return Err(ArenaError::DisposedBuffer { id: buffer.id() });
        }
        let id = buffer.id();
        if let Some(index) = self.owners.remove(&id) {
            self.frames[index].remove(id);
        }
        buffer.set_ownership(Ownership::Persistent);
        self.persistent.insert(id, buffer.clone());
        Ok(())
    }

    pub fn is_tracked(&self, buffer: &Buffer) -> bool {
        self.owners.contains_key(&buffer.id()) || self.persistent.contains_key(&buffer.id())
    }

    /// Number of live buffers, persistent ones included.
    pub fn count(&self) -> usize {
        self.owners.len() + self.persistent.len()
    }

    pub fn memory(&self) -> MemoryInfo {
        let scoped_bytes: usize = self.frames.iter().map(Frame::size_in_bytes).sum();
        let persistent_bytes: usize = self.persistent.values().map(Buffer::size_in_bytes).sum();
        MemoryInfo {
            num_buffers: self.count(),
            num_bytes: scoped_bytes + persistent_bytes,
            num_variables: self.persistent.len(),
            scope_depth: self.depth(),
        }
    }

    /// Number of buffers owned by the active frame.
    pub fn active_frame_len(&self) -> usize {
        self.frames.last().map(Frame::len).unwrap_or(0)
    }
}
