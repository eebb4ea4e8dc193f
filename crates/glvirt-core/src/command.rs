//! Recorded calls and the buffers that batch them.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::arg::Arg;
use crate::handle::Handle;
use crate::op::Op;
use crate::slot::ResponseSlot;

/// One recorded, serializable API call.
///
/// Fields are private: a command never changes after it is recorded.
#[derive(Clone)]
pub struct Command {
    op: Op,
    args: Vec<Arg>,
    handle: Option<Handle>,
    response: Option<Arc<ResponseSlot>>,
}

impl Command {
    pub fn new(op: Op, args: Vec<Arg>) -> Self {
        Self {
            op,
            args,
            handle: None,
            response: None,
        }
    }

    /// A command that creates the resource named by `handle`.
    pub fn with_handle(op: Op, args: Vec<Arg>, handle: Handle) -> Self {
        Self {
            handle: Some(handle),
            ..Self::new(op, args)
        }
    }

    /// A command whose result the consumer writes into `slot`.
    pub fn with_response(op: Op, args: Vec<Arg>, slot: Arc<ResponseSlot>) -> Self {
        Self {
            response: Some(slot),
            ..Self::new(op, args)
        }
    }

    pub(crate) fn from_parts(
        op: Op,
        args: Vec<Arg>,
        handle: Option<Handle>,
        response: Option<Arc<ResponseSlot>>,
    ) -> Self {
        Self {
            op,
            args,
            handle,
            response,
        }
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&Arg> {
        self.args.get(index)
    }

    pub fn handle(&self) -> Option<Handle> {
        self.handle
    }

    pub fn response(&self) -> Option<&Arc<ResponseSlot>> {
        self.response.as_ref()
    }

    pub fn is_blocking(&self) -> bool {
        self.response.is_some()
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Command");
        s.field("op", &self.op).field("args", &self.args);
        if let Some(handle) = self.handle {
            s.field("handle", &handle);
        }
        if self.response.is_some() {
            s.field("blocking", &true);
        }
        s.finish()
    }
}

/// Ordered batch of commands, tagged render or resource.
#[derive(Debug, Clone)]
pub struct CommandBuffer {
    id: u64,
    is_rendering: bool,
    commands: Vec<Command>,
    cleared: bool,
}

impl CommandBuffer {
    pub fn new(id: u64, is_rendering: bool) -> Self {
        Self {
            id,
            is_rendering,
            commands: Vec::new(),
            cleared: false,
        }
    }

    pub(crate) fn from_commands(id: u64, is_rendering: bool, commands: Vec<Command>) -> Self {
        Self {
            id,
            is_rendering,
            commands,
            cleared: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_rendering(&self) -> bool {
        self.is_rendering
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// `true` once the buffer has been emptied after execution.
    pub fn is_cleared(&self) -> bool {
        self.cleared
    }

    pub fn has_blocking(&self) -> bool {
        self.commands.iter().any(Command::is_blocking)
    }

    /// Append a plain command.
    pub fn add_message(&mut self, op: Op, args: Vec<Arg>) {
        self.push(Command::new(op, args));
    }

    /// Append a command that creates the resource named by `handle`.
    pub fn add_message_with_handle(&mut self, op: Op, args: Vec<Arg>, handle: Handle) {
        self.push(Command::with_handle(op, args, handle));
    }

    /// Append a blocking command. The slot is re-armed here; the caller
    /// executes the buffer and waits on `slot`.
    pub fn add_message_and_wait(&mut self, op: Op, args: Vec<Arg>, slot: Arc<ResponseSlot>) {
        slot.reset();
        self.push(Command::with_response(op, args, slot));
    }

    pub fn push(&mut self, command: Command) {
        trace!(buffer = self.id, op = %command.op, "recorded");
        self.cleared = false;
        self.commands.push(command);
    }

    /// Drop every command, keeping the buffer reusable.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.cleared = true;
    }

    /// Move the commands out, leaving the buffer cleared.
    pub fn take_commands(&mut self) -> Vec<Command> {
        self.cleared = true;
        std::mem::take(&mut self.commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_insertion_order() {
        let mut buffer = CommandBuffer::new(3, true);
        buffer.add_message(Op::Enable, vec![Arg::Enum(gl::BLEND)]);
        buffer.add_message_with_handle(Op::CreateTexture, vec![], Handle::from_raw(1));
        buffer.add_message(Op::DrawArrays, vec![Arg::Enum(gl::TRIANGLES), 0.into(), 3.into()]);

        let ops: Vec<Op> = buffer.commands().iter().map(Command::op).collect();
        assert_eq!(ops, vec![Op::Enable, Op::CreateTexture, Op::DrawArrays]);
        assert_eq!(buffer.commands()[1].handle(), Some(Handle::from_raw(1)));
        assert!(!buffer.has_blocking());
    }

    #[test]
    fn blocking_commands_rearm_their_slot() {
        let slot = Arc::new(ResponseSlot::new());
        slot.complete(vec![1]);

        let mut buffer = CommandBuffer::new(0, false);
        buffer.add_message_and_wait(Op::GetError, vec![], Arc::clone(&slot));
        assert!(buffer.has_blocking());
        assert!(!slot.is_complete());
    }

    #[test]
    fn clear_marks_buffer() {
        let mut buffer = CommandBuffer::new(0, false);
        buffer.add_message(Op::Flush, vec![]);
        assert!(!buffer.is_cleared());
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.is_cleared());
    }
}
