#![allow(dead_code)]

use glvirt::{ProxyContext, Replayer, VirtConfig};
use glvirt_channel::ConsumerEnd;
use glvirt_state::{describe, SoftContext};

/// A proxy wired to a replayer on this thread. Nothing is replayed until
/// [`Rig::deliver`] moves the dispatched envelopes across.
pub struct Rig {
    pub proxy: ProxyContext,
    pub consumer: ConsumerEnd,
    pub replayer: Replayer,
    pub ctx: SoftContext,
}

impl Rig {
    pub fn new() -> Self {
        glvirt_core::logging::init();
        let config = VirtConfig::default();
        let (producer, consumer) = glvirt_channel::connect();
        let mut ctx = SoftContext::default();
        let device = describe(&mut ctx);
        let replayer = Replayer::new(&mut ctx, device.clone(), &config);
        let proxy = ProxyContext::new(device, Box::new(producer), config);
        Self {
            proxy,
            consumer,
            replayer,
            ctx,
        }
    }

    /// Hand every dispatched envelope to the replayer without pumping.
    pub fn deliver(&mut self) -> usize {
        let mut delivered = 0;
        for envelope in self.consumer.drain() {
            self.replayer.accept(envelope);
            delivered += 1;
        }
        delivered
    }

    pub fn pixel(&mut self) -> [u8; 4] {
        use glvirt_state::GlContext;
        let rgba = self.ctx.read_pixels(0, 0, 1, 1, gl::RGBA, gl::UNSIGNED_BYTE);
        [rgba[0], rgba[1], rgba[2], rgba[3]]
    }
}

pub const VERTEX_SHADER: &str = "attribute vec2 position;\nattribute vec2 uv;\nuniform mat4 mvp;\nvoid main() {}";
pub const FRAGMENT_SHADER: &str = "precision mediump float;\nuniform vec4 tint;\nvoid main() {}";
