//! In-process link between a producer thread and the consumer thread that
//! owns the real context.
//!
//! Two crossbeam channels make up a link: an unbounded, ordered envelope
//! channel from producer to consumer, and a single-slot channel the consumer
//! uses once to announce its [`DeviceDescription`].
//!
//! [`DeviceDescription`]: glvirt_core::DeviceDescription

mod link;

pub use link::{connect, ConsumerEnd, ProducerEnd};
