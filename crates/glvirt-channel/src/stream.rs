//! A [`BufferSink`] over a byte stream.
//!
//! Response slots cannot cross a byte transport, so the sink keeps them until
//! the matching [`Frame::Responses`] comes back and is handed to
//! [`StreamSink::deliver`].

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use glvirt_core::{ChannelError, Envelope, ResponseSlot, WireError};
use parking_lot::Mutex;
use tracing::{error, trace, warn};

use crate::bridge::BufferSink;
use crate::framing::{deliver_responses, write_frame, Frame};

pub struct StreamSink<W> {
    writer: Mutex<W>,
    awaiting: Mutex<HashMap<u64, Vec<Arc<ResponseSlot>>>>,
}

impl<W: Write + Send> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            awaiting: Mutex::new(HashMap::new()),
        }
    }

    /// Route a frame read from the consumer. Only response frames are
    /// expected after the handshake.
    pub fn deliver(&self, frame: Frame) -> Result<(), WireError> {
        match frame {
            Frame::Responses { buffer_id, payloads } => {
                let Some(slots) = self.awaiting.lock().remove(&buffer_id) else {
                    warn!(buffer_id, "responses for a buffer that awaits none");
                    return Ok(());
                };
                deliver_responses(buffer_id, &slots, payloads)
            }
            Frame::Buffer(message) => {
                error!(buffer_id = message.buffer_id, "consumer sent a command buffer");
                Ok(())
            }
            Frame::Description(_) => {
                warn!("device description after the handshake ignored");
                Ok(())
            }
        }
    }

    /// Buffers whose responses have not come back yet.
    pub fn awaiting(&self) -> usize {
        self.awaiting.lock().len()
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> BufferSink for StreamSink<W> {
    fn submit(&self, envelope: Envelope) -> Result<(), ChannelError> {
        let buffer_id = envelope.message.buffer_id;
        if !envelope.responses.is_empty() {
            self.awaiting.lock().insert(buffer_id, envelope.responses);
        }
        let frame = Frame::Buffer(envelope.message);
        match write_frame(&mut *self.writer.lock(), &frame) {
            Ok(()) => {
                trace!(buffer_id, "framed");
                Ok(())
            }
            Err(e) => {
                self.awaiting.lock().remove(&buffer_id);
                error!(buffer_id, "transport write failed: {e}");
                Err(ChannelError::Disconnected)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::read_frame;
    use glvirt_core::{CommandBuffer, Handle, Op};
    use std::io::Cursor;

    #[test]
    fn responses_complete_the_producer_slots() {
        let sink = StreamSink::new(Vec::new());
        let slot = Arc::new(ResponseSlot::new());
        let mut buffer = CommandBuffer::new(11, false);
        buffer.add_message_with_handle(Op::CreateProgram, vec![], Handle::from_raw(1));
        buffer.add_message_and_wait(Op::GetError, vec![], Arc::clone(&slot));
        sink.submit(Envelope::from_buffer(0, &mut buffer)).unwrap();
        assert_eq!(sink.awaiting(), 1);

        // Consumer side: decode, complete the stand-in slot, answer.
        let bytes = sink_bytes(&sink);
        let Some(Frame::Buffer(message)) = read_frame(&mut Cursor::new(bytes)).unwrap() else {
            panic!("expected a buffer frame");
        };
        let detached = Envelope::detached(message);
        detached.responses[0].complete(gl_no_error());
        let answer = Frame::responses(11, &detached.responses);

        sink.deliver(answer).unwrap();
        assert!(slot.is_complete());
        assert_eq!(slot.take_payload().unwrap(), gl_no_error());
        assert_eq!(sink.awaiting(), 0);
    }

    #[test]
    fn buffers_without_blocking_commands_await_nothing() {
        let sink = StreamSink::new(Vec::new());
        let mut buffer = CommandBuffer::new(1, true);
        buffer.add_message(Op::Flush, vec![]);
        sink.submit(Envelope::from_buffer(0, &mut buffer)).unwrap();
        assert_eq!(sink.awaiting(), 0);
    }

    fn sink_bytes(sink: &StreamSink<Vec<u8>>) -> Vec<u8> {
        sink.writer.lock().clone()
    }

    fn gl_no_error() -> Vec<u8> {
        0u32.to_le_bytes().to_vec()
    }
}
