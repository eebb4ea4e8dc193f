//! Cross-context payload: one message per buffer dispatch.
//!
//! [`BufferMessage`] is the serializable part. Response slots cannot be
//! serialized, so an [`Envelope`] carries them next to the message, one per
//! command whose `hasResponse` is set, in command order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::arg::Arg;
use crate::command::{Command, CommandBuffer};
use crate::error::WireError;
use crate::handle::Handle;
use crate::op::Op;
use crate::slot::ResponseSlot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCommand {
    pub name: Op,
    pub args: Vec<Arg>,
    pub handle: Option<Handle>,
    pub has_response: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferMessage {
    pub producer_id: u32,
    pub buffer_id: u64,
    pub is_rendering: bool,
    pub commands: Vec<WireCommand>,
}

impl BufferMessage {
    pub fn blocking_count(&self) -> usize {
        self.commands.iter().filter(|c| c.has_response).count()
    }
}

/// A dispatched buffer in flight.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub message: BufferMessage,
    pub responses: Vec<Arc<ResponseSlot>>,
}

impl Envelope {
    /// Package `buffer` for dispatch, leaving it cleared.
    pub fn from_buffer(producer_id: u32, buffer: &mut CommandBuffer) -> Self {
        let buffer_id = buffer.id();
        let is_rendering = buffer.is_rendering();
        let mut responses = Vec::new();
        let commands = buffer
            .take_commands()
            .into_iter()
            .map(|command| {
                if let Some(slot) = command.response() {
                    responses.push(Arc::clone(slot));
                }
                WireCommand {
                    name: command.op(),
                    handle: command.handle(),
                    has_response: command.is_blocking(),
                    args: command.args().to_vec(),
                }
            })
            .collect();

        Self {
            message: BufferMessage {
                producer_id,
                buffer_id,
                is_rendering,
                commands,
            },
            responses,
        }
    }

    /// Wrap a message that arrived over a byte transport. Fresh slots stand in
    /// for the producer's; the transport ships their payloads back.
    pub fn detached(message: BufferMessage) -> Self {
        let responses = (0..message.blocking_count())
            .map(|_| Arc::new(ResponseSlot::new()))
            .collect();
        Self { message, responses }
    }

    pub fn is_rendering(&self) -> bool {
        self.message.is_rendering
    }

    /// Rebuild the command buffer on the consumer side.
    pub fn into_command_buffer(self) -> Result<CommandBuffer, WireError> {
        let blocking = self.message.blocking_count();
        if blocking != self.responses.len() {
            return Err(WireError::SlotCount {
                buffer_id: self.message.buffer_id,
                commands: blocking,
                slots: self.responses.len(),
            });
        }

        let mut slots = self.responses.into_iter();
        let commands = self
            .message
            .commands
            .into_iter()
            .map(|wire| {
                let response = if wire.has_response { slots.next() } else { None };
                Command::from_parts(wire.name, wire.args, wire.handle, response)
            })
            .collect();

        Ok(CommandBuffer::from_commands(
            self.message.buffer_id,
            self.message.is_rendering,
            commands,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_buffer() -> (CommandBuffer, Arc<ResponseSlot>) {
        let slot = Arc::new(ResponseSlot::new());
        let mut buffer = CommandBuffer::new(7, false);
        buffer.add_message_with_handle(Op::CreateProgram, vec![], Handle::from_raw(1));
        buffer.add_message_and_wait(
            Op::GetAttribLocation,
            vec![Handle::from_raw(1).into(), "position".into()],
            Arc::clone(&slot),
        );
        (buffer, slot)
    }

    #[test]
    fn envelope_keeps_slots_attached_to_their_commands() {
        let (mut buffer, slot) = sample_buffer();
        let envelope = Envelope::from_buffer(2, &mut buffer);
        assert!(buffer.is_empty());
        assert_eq!(envelope.message.producer_id, 2);
        assert_eq!(envelope.message.buffer_id, 7);

        let rebuilt = envelope.into_command_buffer().unwrap();
        assert_eq!(rebuilt.id(), 7);
        let query = &rebuilt.commands()[1];
        assert!(Arc::ptr_eq(query.response().unwrap(), &slot));
        assert!(rebuilt.commands()[0].response().is_none());
    }

    #[test]
    fn missing_slot_is_rejected() {
        let (mut buffer, _slot) = sample_buffer();
        let mut envelope = Envelope::from_buffer(0, &mut buffer);
        envelope.responses.clear();
        assert!(matches!(
            envelope.into_command_buffer(),
            Err(WireError::SlotCount { commands: 1, slots: 0, .. })
        ));
    }

    #[test]
    fn message_uses_camel_case_fields() {
        let (mut buffer, _slot) = sample_buffer();
        let envelope = Envelope::from_buffer(0, &mut buffer);
        let json = serde_json::to_value(&envelope.message).unwrap();
        assert_eq!(json["isRendering"], false);
        assert_eq!(json["commands"][0]["name"], "createProgram");
        assert_eq!(json["commands"][0]["handle"], 1);
        assert_eq!(json["commands"][1]["hasResponse"], true);
    }
}
