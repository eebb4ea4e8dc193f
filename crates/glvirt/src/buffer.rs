//! Producer-side creation and dispatch of command buffers.

use std::sync::atomic::{AtomicU32, Ordering};

use glvirt_channel::BufferSink;
use glvirt_core::{CommandBuffer, Envelope, VirtError};
use tracing::{debug, error};

static NEXT_PRODUCER: AtomicU32 = AtomicU32::new(1);

/// Numbers buffers for one producer and hands them to its sink.
pub struct CommandBufferFactory {
    producer_id: u32,
    next_id: u64,
    sink: Box<dyn BufferSink>,
}

impl CommandBufferFactory {
    pub fn new(sink: Box<dyn BufferSink>) -> Self {
        Self {
            producer_id: NEXT_PRODUCER.fetch_add(1, Ordering::Relaxed),
            next_id: 0,
            sink,
        }
    }

    pub fn producer_id(&self) -> u32 {
        self.producer_id
    }

    /// A fresh, empty buffer with the next id.
    pub fn create(&mut self, is_rendering: bool) -> CommandBuffer {
        let id = self.next_id;
        self.next_id += 1;
        CommandBuffer::new(id, is_rendering)
    }

    /// Send `buffer` to the consumer and clear it. Empty buffers are not
    /// sent.
    pub fn execute(&self, buffer: &mut CommandBuffer) -> Result<(), VirtError> {
        if buffer.is_empty() {
            return Ok(());
        }
        if buffer.is_rendering() {
            if let Some(command) = buffer.commands().iter().find(|c| c.is_blocking()) {
                let op = command.op();
                error!(buffer = buffer.id(), %op, "render buffer carries a blocking command");
                return Err(VirtError::BlockingInRenderBuffer(op));
            }
        }
        let envelope = Envelope::from_buffer(self.producer_id, buffer);
        debug!(
            producer = self.producer_id,
            buffer = envelope.message.buffer_id,
            render = envelope.is_rendering(),
            commands = envelope.message.commands.len(),
            "dispatching buffer"
        );
        self.sink.submit(envelope)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glvirt_core::{Op, ResponseSlot};
    use std::sync::Arc;

    #[test]
    fn ids_increase_and_empty_buffers_stay_home() {
        let (producer, consumer) = glvirt_channel::connect();
        let mut factory = CommandBufferFactory::new(Box::new(producer));
        let mut first = factory.create(true);
        let mut second = factory.create(false);
        assert_eq!((first.id(), second.id()), (0, 1));

        factory.execute(&mut first).unwrap();
        second.add_message(Op::Flush, vec![]);
        factory.execute(&mut second).unwrap();
        assert!(second.is_cleared());

        let sent: Vec<u64> = consumer.drain().map(|e| e.message.buffer_id).collect();
        assert_eq!(sent, vec![1]);
    }

    #[test]
    fn render_buffers_refuse_blocking_commands() {
        let (producer, consumer) = glvirt_channel::connect();
        let mut factory = CommandBufferFactory::new(Box::new(producer));
        let mut frame = factory.create(true);
        frame.add_message_and_wait(Op::GetError, vec![], Arc::new(ResponseSlot::new()));
        assert_eq!(
            factory.execute(&mut frame),
            Err(VirtError::BlockingInRenderBuffer(Op::GetError))
        );
        assert_eq!(consumer.drain().count(), 0);
    }
}
