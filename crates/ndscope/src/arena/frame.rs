use std::collections::HashSet;

use crate::tensor::{Buffer, BufferId};

/// One level of the scope stack: the buffers allocated while it was active.
pub(crate) struct Frame {
    name: Option<String>,
    buffers: Vec<Buffer>,
    kept: HashSet<BufferId>,
}

impl Frame {
    pub(crate) fn new(name: Option<&str>) -> Self {
        Frame {
            name: name.map(str::to_owned),
            buffers: Vec::new(),
            kept: HashSet::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    pub(crate) fn len(&self) -> usize {
        self.buffers.len()
    }

    pub(crate) fn push(&mut self, buffer: Buffer) {
        self.buffers.push(buffer);
    }

    pub(crate) fn remove(&mut self, id: BufferId) -> Option<Buffer> {
        let index = self.buffers.iter().position(|buffer| buffer.id() == id)?;
        self.kept.remove(&id);
        Some(self.buffers.remove(index))
    }

    pub(crate) fn mark_kept(&mut self, id: BufferId) {
        self.kept.insert(id);
    }

    pub(crate) fn size_in_bytes(&self) -> usize {
        self.buffers.iter().map(Buffer::size_in_bytes).sum()
    }

    /// Consumes the frame, yielding its buffers in allocation order and the ids
    /// marked kept while it was active.
    pub(crate) fn into_parts(self) -> (Vec<Buffer>, HashSet<BufferId>) {
        (self.buffers, self.kept)
    }
}
