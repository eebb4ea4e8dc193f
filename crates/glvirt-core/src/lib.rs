//! Core data model for recording graphics API calls in one execution context
//! and replaying them in another.
//!
//! - [`Handle`] / [`HandleRegistry`]: integer surrogates for native objects
//! - [`Arg`] / [`Op`] / [`Command`] / [`CommandBuffer`]: recorded calls
//! - [`ResponseSlot`]: completion slot for blocking round trips
//! - [`BufferMessage`] / [`Envelope`]: the cross-context payload
//! - [`DeviceDescription`]: the consumer's capabilities, sent once

pub mod arg;
pub mod command;
pub mod device;
pub mod error;
pub mod handle;
pub mod logging;
pub mod op;
pub mod pixels;
pub mod slot;
pub mod wire;

pub use arg::{Arg, ArgKind};
pub use command::{Command, CommandBuffer};
pub use device::{DeviceDescription, PrecisionFormat, StagePrecision};
pub use error::{ChannelError, EncodeError, SlotError, StateError, VirtError, WireError};
pub use handle::{Handle, HandleRegistry, ResourceKind};
pub use op::Op;
pub use slot::ResponseSlot;
pub use wire::{BufferMessage, Envelope, WireCommand};
