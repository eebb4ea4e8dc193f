//! Error types shared by every glvirt crate.

use thiserror::Error;

use crate::handle::{Handle, ResourceKind};
use crate::op::Op;

/// Reasons a call is rejected before it is recorded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("{op}: expected {expected} arguments, got {got}")]
    Arity { op: Op, expected: usize, got: usize },
    #[error("{op}: argument {index} has the wrong shape")]
    ArgShape { op: Op, index: usize },
    #[error("{op}: array argument {index} has length {got}, expected {expected}")]
    ArrayLength {
        op: Op,
        index: usize,
        expected: String,
        got: usize,
    },
    #[error("{op}: texture unit {unit} out of range (max {max})")]
    TextureUnit { op: Op, unit: u32, max: u32 },
    #[error("{op}: pixel data has {got} bytes, expected {expected}")]
    PixelLength { op: Op, expected: usize, got: usize },
    #[error("{op}: {handle:?} names a deleted resource")]
    DeletedHandle { op: Op, handle: Handle },
    #[error("{op}: {handle:?} is a {actual:?}, expected {expected:?}")]
    MistypedHandle {
        op: Op,
        handle: Handle,
        expected: ResourceKind,
        actual: ResourceKind,
    },
    #[error("{op}: unsupported enum {value:#x}")]
    BadEnum { op: Op, value: u32 },
    #[error("{0}: not available on the consumer device")]
    Unavailable(Op),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("timed out waiting for the consumer")]
    TimedOut,
    #[error("response slot read before completion")]
    NotComplete,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("consumer end disconnected")]
    Disconnected,
    #[error("device description handshake failed: {0}")]
    Handshake(String),
}

/// Errors surfaced to producer callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VirtError {
    #[error("no active command buffer")]
    NoActiveBuffer,
    #[error("{0}: blocking call recorded into a render buffer")]
    BlockingInRenderBuffer(Op),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Slot(#[from] SlotError),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Failures while moving a context between states.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("{0:?} has no native object on this context")]
    UnresolvedHandle(Handle),
}

/// Failures on the cross-context payload.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("buffer {buffer_id} carries {commands} blocking commands but {slots} response slots")]
    SlotCount {
        buffer_id: u64,
        commands: usize,
        slots: usize,
    },
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame of {0} bytes exceeds the transport limit")]
    Oversized(usize),
    #[error("transport i/o: {0}")]
    Io(#[from] std::io::Error),
}
