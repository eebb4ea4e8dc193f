//! Producer-side interface of a cross-context channel.

use glvirt_core::{ChannelError, Envelope};

/// Where a producer sends dispatched buffers.
///
/// Submission never blocks: blocking calls wait on their response slot, not
/// on the channel. Envelopes must reach the consumer in submission order.
pub trait BufferSink: Send {
    /// Queue `envelope` for the consumer.
    fn submit(&self, envelope: Envelope) -> Result<(), ChannelError>;

    /// `false` once the consumer end is gone and nothing more can be
    /// delivered.
    fn is_connected(&self) -> bool {
        true
    }
}

impl<S: BufferSink + Sync + ?Sized> BufferSink for std::sync::Arc<S> {
    fn submit(&self, envelope: Envelope) -> Result<(), ChannelError> {
        (**self).submit(envelope)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}
