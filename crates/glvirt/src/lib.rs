#![allow(clippy::too_many_arguments)]

//! Record OpenGL-style calls in one execution context and replay them
//! against a real context owned by another.
//!
//! This crate ties together [`glvirt_core`] (commands, handles, wire
//! payload), [`glvirt_state`] (state tracking and diffing) and
//! [`glvirt_channel`] (transport) into a producer and a consumer.
//!
//! # Overview
//!
//! - [`ProxyContext`] is what the producer programs against. It validates
//!   each call, mirrors its effect on a [`GlState`] and records it into the
//!   active command buffer.
//! - [`CommandBufferFactory`] numbers buffers and hands them to a
//!   [`BufferSink`].
//! - [`Replayer`] owns the consumer side: it folds received buffers into
//!   the logical state, schedules them through a [`CommandBufferManager`]
//!   and replays them with an [`Executor`], diffing the real context from
//!   the state it is in to the state each buffer starts from.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use glvirt::{ProxyContext, Replayer, VirtConfig};
//! use glvirt_state::{describe, SoftContext};
//!
//! let (producer, consumer) = glvirt_channel::connect();
//! let consumer_thread = std::thread::spawn(move || {
//!     let mut ctx = SoftContext::default();
//!     let device = describe(&mut ctx);
//!     let mut replayer = Replayer::new(&mut ctx, device, &VirtConfig::default());
//!     replayer.serve(&mut ctx, &consumer, Duration::from_millis(16))
//! });
//!
//! let mut proxy = ProxyContext::connect(producer, VirtConfig::default())?;
//! proxy.create_and_activate(true)?;
//! proxy.clear_color(0.0, 0.0, 1.0, 1.0)?;
//! proxy.clear(gl::COLOR_BUFFER_BIT)?;
//! proxy.execute()?;
//! drop(proxy);
//! consumer_thread.join().unwrap()?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! [`GlState`]: glvirt_state::GlState
//! [`BufferSink`]: glvirt_channel::BufferSink

pub mod buffer;
pub mod bytes;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod execute;
pub mod manager;
pub mod replay;
pub mod texture;

pub use buffer::CommandBufferFactory;
pub use bytes::AsBytes;
pub use config::VirtConfig;
pub use context::{Parameter, ProxyContext};
pub use execute::{ExecError, Executor};
pub use manager::{CommandBufferManager, Submission};
pub use replay::{Pumped, Received, Replayer};
pub use texture::{PixelBuffer, PixelSource};
