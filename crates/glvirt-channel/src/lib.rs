//! Cross-context transport for dispatched command buffers.
//!
//! This crate defines the [`BufferSink`] trait, the producer's view of the
//! channel. The in-process [`local`] link carries [`Envelope`]s over an
//! ordered crossbeam channel, so response slots travel by reference and the
//! consumer completes them directly. Byte-oriented transports use the JSON
//! [`framing`] instead and ship response payloads back as frames.
//!
//! [`Envelope`]: glvirt_core::Envelope

pub mod bridge;
pub mod framing;
pub mod local;
pub mod stream;

pub use bridge::BufferSink;
pub use framing::Frame;
pub use local::{connect, ConsumerEnd, ProducerEnd};
pub use stream::StreamSink;
