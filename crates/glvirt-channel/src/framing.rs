//! JSON framing for byte-oriented transports (pipes, sockets).
//!
//! Each frame is a little-endian `u32` byte length followed by one JSON
//! [`Frame`]. The consumer sends [`Frame::Description`] once, then answers
//! every buffer carrying blocking commands with [`Frame::Responses`].

use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;

use glvirt_core::{BufferMessage, DeviceDescription, ResponseSlot, WireError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Upper bound on one frame, pixel uploads included.
pub const MAX_FRAME_LEN: usize = 256 << 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Frame {
    Description(DeviceDescription),
    Buffer(BufferMessage),
    /// Payloads of one buffer's blocking commands, in command order.
    #[serde(rename_all = "camelCase")]
    Responses { buffer_id: u64, payloads: Vec<Vec<u8>> },
}

impl Frame {
    /// Collect the payloads a consumer wrote into `slots`.
    ///
    /// A slot left incomplete is reported and answered empty, so the waiting
    /// producer is never stranded.
    pub fn responses(buffer_id: u64, slots: &[Arc<ResponseSlot>]) -> Frame {
        let payloads = slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.take_payload().unwrap_or_else(|_| {
                    warn!(buffer_id, index, "response slot not completed, answering empty");
                    Vec::new()
                })
            })
            .collect();
        Frame::Responses { buffer_id, payloads }
    }
}

pub fn encode(frame: &Frame) -> Result<Vec<u8>, WireError> {
    Ok(serde_json::to_vec(frame)?)
}

pub fn decode(bytes: &[u8]) -> Result<Frame, WireError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Write one length-prefixed frame.
pub fn write_frame<W: Write + ?Sized>(writer: &mut W, frame: &Frame) -> Result<(), WireError> {
    let body = encode(frame)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(WireError::Oversized(body.len()));
    }
    writer.write_all(&(body.len() as u32).to_le_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed frame. `Ok(None)` on a clean end of stream
/// between frames.
pub fn read_frame<R: Read + ?Sized>(reader: &mut R) -> Result<Option<Frame>, WireError> {
    let mut len = [0u8; 4];
    match reader.read_exact(&mut len) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_le_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        return Err(WireError::Oversized(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    decode(&body).map(Some)
}

/// Complete producer slots from a [`Frame::Responses`] payload list.
pub fn deliver_responses(
    buffer_id: u64,
    slots: &[Arc<ResponseSlot>],
    payloads: Vec<Vec<u8>>,
) -> Result<(), WireError> {
    if slots.len() != payloads.len() {
        return Err(WireError::SlotCount {
            buffer_id,
            commands: slots.len(),
            slots: payloads.len(),
        });
    }
    for (slot, payload) in slots.iter().zip(payloads) {
        slot.complete(payload);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glvirt_core::{Arg, Op, WireCommand};
    use std::io::Cursor;

    fn message() -> BufferMessage {
        BufferMessage {
            producer_id: 1,
            buffer_id: 4,
            is_rendering: true,
            commands: vec![WireCommand {
                name: Op::Viewport,
                args: vec![Arg::Int(0), Arg::Int(0), Arg::Int(64), Arg::Int(32)],
                handle: None,
                has_response: false,
            }],
        }
    }

    #[test]
    fn frames_are_read_back_in_order() {
        let mut stream = Vec::new();
        write_frame(&mut stream, &Frame::Buffer(message())).unwrap();
        write_frame(
            &mut stream,
            &Frame::Responses {
                buffer_id: 4,
                payloads: vec![vec![1, 2]],
            },
        )
        .unwrap();

        let mut reader = Cursor::new(stream);
        assert_eq!(read_frame(&mut reader).unwrap(), Some(Frame::Buffer(message())));
        assert!(matches!(
            read_frame(&mut reader).unwrap(),
            Some(Frame::Responses { buffer_id: 4, .. })
        ));
        assert_eq!(read_frame(&mut reader).unwrap(), None);
    }

    #[test]
    fn truncated_body_is_an_error() {
        let mut stream = Vec::new();
        write_frame(&mut stream, &Frame::Buffer(message())).unwrap();
        stream.truncate(stream.len() - 3);
        assert!(matches!(
            read_frame(&mut Cursor::new(stream)),
            Err(WireError::Io(_))
        ));
    }

    #[test]
    fn oversized_length_is_refused_before_allocation() {
        let stream = (u32::MAX).to_le_bytes().to_vec();
        assert!(matches!(
            read_frame(&mut Cursor::new(stream)),
            Err(WireError::Oversized(_))
        ));
    }

    #[test]
    fn variants_are_tagged_by_name() {
        let json = serde_json::to_value(Frame::Responses {
            buffer_id: 2,
            payloads: vec![],
        })
        .unwrap();
        assert_eq!(json["responses"]["bufferId"], 2);
    }

    #[test]
    fn incomplete_slots_answer_empty() {
        let done = Arc::new(ResponseSlot::new());
        done.complete(vec![7]);
        let pending = Arc::new(ResponseSlot::new());
        let frame = Frame::responses(3, &[done, pending]);
        assert_eq!(
            frame,
            Frame::Responses {
                buffer_id: 3,
                payloads: vec![vec![7], vec![]]
            }
        );
    }

    #[test]
    fn delivery_checks_the_slot_count() {
        let slot = Arc::new(ResponseSlot::new());
        assert!(matches!(
            deliver_responses(1, &[slot.clone()], vec![]),
            Err(WireError::SlotCount { .. })
        ));
        deliver_responses(1, &[slot.clone()], vec![vec![5]]).unwrap();
        assert_eq!(slot.take_payload().unwrap(), vec![5]);
    }
}
