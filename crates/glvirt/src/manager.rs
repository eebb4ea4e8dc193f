//! Consumer-side scheduling of received buffers.
//!
//! Buffers queue in arrival order. The render path only ever wants the
//! latest frame, while the resource path wants every resource buffer, in
//! order, exactly once. Render buffers popped by either path are folded
//! into a single "last known rendering buffer" so no frame is replayed
//! twice as new and no stale frame is ever returned.

use std::collections::VecDeque;

use glvirt_core::{CommandBuffer, Envelope};
use tracing::{trace, warn};

/// Anything the manager can schedule.
pub trait Submission {
    fn is_rendering(&self) -> bool;
    fn buffer_id(&self) -> u64;
}

impl Submission for CommandBuffer {
    fn is_rendering(&self) -> bool {
        CommandBuffer::is_rendering(self)
    }

    fn buffer_id(&self) -> u64 {
        self.id()
    }
}

impl Submission for Envelope {
    fn is_rendering(&self) -> bool {
        Envelope::is_rendering(self)
    }

    fn buffer_id(&self) -> u64 {
        self.message.buffer_id
    }
}

#[derive(Debug)]
pub struct CommandBufferManager<T> {
    queue: VecDeque<T>,
    last_render: Option<T>,
    fresh: bool,
}

impl<T> Default for CommandBufferManager<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            last_render: None,
            fresh: false,
        }
    }
}

impl<T: Submission> CommandBufferManager<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a received buffer behind everything already queued.
    pub fn push(&mut self, item: T) {
        trace!(
            buffer = item.buffer_id(),
            render = item.is_rendering(),
            queued = self.queue.len(),
            "buffer queued"
        );
        self.queue.push_back(item);
    }

    /// Buffers received but not yet popped by either path.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// `true` when a render buffer was folded since the render path last
    /// returned one.
    pub fn has_fresh_render(&self) -> bool {
        self.fresh
    }

    pub fn last_render(&self) -> Option<&T> {
        self.last_render.as_ref()
    }

    /// Latest frame, draining the whole queue.
    pub fn get_render_command_buffer(&mut self) -> Option<&T> {
        self.get_render_command_buffer_with(|_| {})
    }

    /// Like [`get_render_command_buffer`](Self::get_render_command_buffer),
    /// calling `on_fold` for each render buffer as it is folded.
    pub fn get_render_command_buffer_with(&mut self, mut on_fold: impl FnMut(&mut T)) -> Option<&T> {
        while let Some(item) = self.queue.pop_front() {
            if item.is_rendering() {
                self.fold(item, &mut on_fold);
            } else {
                warn!(
                    buffer = item.buffer_id(),
                    "resource buffer discarded by the render path before it was executed"
                );
            }
        }
        self.fresh = false;
        self.last_render.as_ref()
    }

    /// Next resource buffer in arrival order.
    pub fn get_resource_command_buffer(&mut self) -> Option<T> {
        self.get_resource_command_buffer_with(|_| {})
    }

    pub fn get_resource_command_buffer_with(&mut self, mut on_fold: impl FnMut(&mut T)) -> Option<T> {
        while let Some(item) = self.queue.pop_front() {
            if !item.is_rendering() {
                return Some(item);
            }
            self.fold(item, &mut on_fold);
        }
        None
    }

    fn fold(&mut self, mut item: T, on_fold: &mut impl FnMut(&mut T)) {
        on_fold(&mut item);
        if let Some(previous) = &self.last_render {
            trace!(
                superseded = previous.buffer_id(),
                by = item.buffer_id(),
                "render buffer superseded"
            );
        }
        self.last_render = Some(item);
        self.fresh = true;
    }
}
