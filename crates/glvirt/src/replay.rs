//! The consumer loop: receive, fold, schedule, replay.
//!
//! Every received buffer is folded into the *logical* state at arrival and
//! queued together with the state it begins from. Replaying a buffer first
//! diffs the real context from the state it is in to that begin state, then
//! executes the commands in order.
//!
//! Render buffers can be replayed more than once, so their creations and
//! program setup run once, in buffer order, when they are folded. Deletions
//! of anything the frame on screen uses are held back until the next frame
//! is folded or [`Replayer::retire_deferred`] is called.

use std::io::{Read, Write};
use std::time::Duration;

use anyhow::Context as _;
use glvirt_channel::framing::{read_frame, write_frame};
use glvirt_channel::{ConsumerEnd, Frame};
use glvirt_core::{
    Arg, ChannelError, Command, CommandBuffer, DeviceDescription, Envelope, Handle, HandleRegistry,
    StateError,
};
use glvirt_state::{GlContext, GlState, StateLayout};
use tracing::{debug, error, trace, warn};

use crate::config::VirtConfig;
use crate::dispatch;
use crate::execute::{ExecError, Executor};
use crate::manager::{CommandBufferManager, Submission};

/// A received buffer and the logical state it starts from.
#[derive(Debug)]
pub struct Received {
    pub buffer: CommandBuffer,
    pub begin: GlState,
}

impl Received {
    /// Whether replaying this buffer needs `handle` to stay alive.
    pub fn uses(&self, handle: Handle) -> bool {
        self.begin.references(handle)
            || self
                .buffer
                .commands()
                .iter()
                .flat_map(|c| c.args())
                .any(|arg| matches!(arg, Arg::Handle(h) if *h == handle))
    }
}

impl Submission for Received {
    fn is_rendering(&self) -> bool {
        self.buffer.is_rendering()
    }

    fn buffer_id(&self) -> u64 {
        self.buffer.id()
    }
}

/// What one [`Replayer::pump`] did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Pumped {
    pub resources: usize,
    /// Id of the frame rendered, if a new one was available.
    pub frame: Option<u64>,
}

pub struct Replayer {
    device: DeviceDescription,
    manager: CommandBufferManager<Received>,
    logical: GlState,
    exec: Executor,
    retiring: Vec<Command>,
}

impl Replayer {
    /// Capture `ctx` as the real starting point. The logical state starts
    /// from fresh-context defaults, which is what producers assume.
    ///
    /// `config` must match the producer's so both derive the same layout.
    pub fn new(ctx: &mut dyn GlContext, device: DeviceDescription, config: &VirtConfig) -> Self {
        let layout = StateLayout::from_device(&device, &config.layout_caps());
        let exec = Executor::new(ctx, &layout);
        Self {
            device,
            manager: CommandBufferManager::new(),
            logical: GlState::new(layout),
            exec,
            retiring: Vec::new(),
        }
    }

    pub fn device(&self) -> &DeviceDescription {
        &self.device
    }

    /// State after every buffer received so far.
    pub fn logical(&self) -> &GlState {
        &self.logical
    }

    /// State the real context is in.
    pub fn current(&self) -> &GlState {
        self.exec.current()
    }

    pub fn registry(&self) -> &HandleRegistry {
        self.exec.registry()
    }

    pub fn pending(&self) -> usize {
        self.manager.pending()
    }

    /// Fold a dispatched buffer into the logical state and queue it.
    pub fn accept(&mut self, envelope: Envelope) {
        let buffer = match envelope.into_command_buffer() {
            Ok(buffer) => buffer,
            Err(e) => {
                error!("dropping received buffer: {e}");
                return;
            }
        };
        if buffer.is_rendering() && buffer.has_blocking() {
            for command in buffer.commands().iter().filter(|c| c.is_blocking()) {
                error!(
                    buffer = buffer.id(),
                    op = %command.op(),
                    "blocking command in a render buffer, answering empty"
                );
                answer(command, Ok(None));
            }
        }

        let begin = self.logical.clone();
        self.logical.fold_buffer(&buffer);
        debug!(
            buffer = buffer.id(),
            render = buffer.is_rendering(),
            commands = buffer.len(),
            "received"
        );
        self.manager.push(Received { buffer, begin });
    }

    /// Execute every queued resource buffer in arrival order, then render
    /// the latest frame if a new one arrived.
    pub fn pump(&mut self, ctx: &mut dyn GlContext) -> Pumped {
        let mut pumped = Pumped::default();
        loop {
            let Self {
                manager,
                exec,
                retiring,
                ..
            } = &mut *self;
            let next = manager.get_resource_command_buffer_with(|frame| fold_frame(exec, retiring, ctx, frame));
            let Some(received) = next else {
                break;
            };
            run_resource(exec, retiring, ctx, &received, manager.last_render());
            pumped.resources += 1;
        }

        if self.manager.has_fresh_render() {
            let Self {
                manager,
                exec,
                retiring,
                ..
            } = &mut *self;
            if let Some(frame) = manager.get_render_command_buffer_with(|frame| fold_frame(exec, retiring, ctx, frame)) {
                render(exec, ctx, frame);
                pumped.frame = Some(frame.buffer.id());
            }
        }
        pumped
    }

    /// Render the latest frame again.
    pub fn render_latest(&mut self, ctx: &mut dyn GlContext) -> Option<u64> {
        let frame = self.manager.last_render()?;
        render(&mut self.exec, ctx, frame);
        Some(frame.buffer.id())
    }

    /// Run every held-back deletion now. The latest frame can no longer be
    /// re-rendered if it used what they delete.
    pub fn retire_deferred(&mut self, ctx: &mut dyn GlContext) -> usize {
        let count = self.retiring.len();
        if count > 0 {
            debug!(count, "retiring deferred deletes");
            retire(&mut self.exec, &mut self.retiring, ctx);
        }
        count
    }

    /// Recapture the real context and force the logical state onto it, for
    /// when the context was disturbed behind our back.
    pub fn resynchronize(&mut self, ctx: &mut dyn GlContext) -> Result<(), StateError> {
        warn!("resynchronizing with the live context");
        self.exec.recapture(ctx);
        let logical = self.logical.clone();
        self.exec.force(ctx, &logical)
    }

    /// Announce the device on `consumer`, then replay until every producer
    /// is gone, pumping at least every `poll`.
    pub fn serve(
        &mut self,
        ctx: &mut dyn GlContext,
        consumer: &ConsumerEnd,
        poll: Duration,
    ) -> anyhow::Result<()> {
        consumer
            .announce(self.device.clone())
            .context("announcing the device description")?;
        loop {
            match consumer.recv_timeout(poll) {
                Ok(Some(envelope)) => {
                    self.accept(envelope);
                    for envelope in consumer.drain() {
                        self.accept(envelope);
                    }
                }
                Ok(None) => {}
                Err(ChannelError::Disconnected) => {
                    self.pump(ctx);
                    self.retire_deferred(ctx);
                    debug!("producers gone, replay finished");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
            self.pump(ctx);
        }
    }

    /// The same over a byte stream: describe the device, then answer every
    /// buffer frame with the payloads of its blocking commands.
    pub fn serve_stream<R: Read, W: Write>(
        &mut self,
        ctx: &mut dyn GlContext,
        reader: &mut R,
        writer: &mut W,
    ) -> anyhow::Result<()> {
        write_frame(writer, &Frame::Description(self.device.clone()))
            .context("writing the device description")?;
        while let Some(frame) = read_frame(reader).context("reading a frame")? {
            let Frame::Buffer(message) = frame else {
                warn!("producer sent something other than a buffer, ignored");
                continue;
            };
            let buffer_id = message.buffer_id;
            let envelope = Envelope::detached(message);
            let slots = envelope.responses.clone();
            self.accept(envelope);
            self.pump(ctx);
            if !slots.is_empty() {
                write_frame(writer, &Frame::responses(buffer_id, &slots))
                    .context("writing responses")?;
            }
        }
        self.retire_deferred(ctx);
        debug!("stream closed, replay finished");
        Ok(())
    }
}

/// Complete the slot of a blocking command. A failed command answers
/// empty so its producer never waits forever.
fn answer(command: &Command, result: Result<Option<Vec<u8>>, ExecError>) {
    let payload = match result {
        Ok(payload) => payload.unwrap_or_default(),
        Err(e) => {
            error!(op = %command.op(), "command failed: {e}");
            Vec::new()
        }
    };
    if let Some(slot) = command.response() {
        slot.complete(payload);
    }
}

/// Runs once per render buffer, in arrival order.
fn fold_frame(exec: &mut Executor, retiring: &mut Vec<Command>, ctx: &mut dyn GlContext, frame: &mut Received) {
    retire(exec, retiring, ctx);
    for command in frame.buffer.commands() {
        let spec = dispatch::spec(command.op());
        if spec.runs_at_fold() {
            answer(command, exec.run(ctx, command));
        } else if spec.deletes.is_some() {
            retiring.push(command.clone());
        }
    }
    trace!(buffer = frame.buffer.id(), retiring = retiring.len(), "frame folded");
}

fn retire(exec: &mut Executor, retiring: &mut Vec<Command>, ctx: &mut dyn GlContext) {
    for command in retiring.drain(..) {
        answer(&command, exec.run(ctx, &command));
    }
}

fn run_resource(
    exec: &mut Executor,
    retiring: &mut Vec<Command>,
    ctx: &mut dyn GlContext,
    received: &Received,
    on_screen: Option<&Received>,
) {
    let buffer = &received.buffer;
    if let Err(e) = exec.transition(ctx, &received.begin) {
        error!(buffer = buffer.id(), "skipping resource buffer: {e}");
        for command in buffer.commands().iter().filter(|c| c.is_blocking()) {
            answer(command, Err(e.clone().into()));
        }
        return;
    }
    for command in buffer.commands() {
        if dispatch::spec(command.op()).deletes.is_some() {
            let held = command.args().first().and_then(Arg::as_handle);
            if let (Some(frame), Some(handle)) = (on_screen, held) {
                if frame.uses(handle) {
                    trace!(?handle, frame = frame.buffer.id(), "delete held for the frame on screen");
                    retiring.push(command.clone());
                    continue;
                }
            }
        }
        answer(command, exec.run(ctx, command));
    }
    debug!(buffer = buffer.id(), commands = buffer.len(), "resource buffer executed");
}

fn render(exec: &mut Executor, ctx: &mut dyn GlContext, frame: &Received) {
    let buffer = &frame.buffer;
    if let Err(e) = exec.transition(ctx, &frame.begin) {
        error!(buffer = buffer.id(), "skipping frame: {e}");
        return;
    }
    for command in buffer.commands() {
        let spec = dispatch::spec(command.op());
        if command.is_blocking() || spec.is_lifecycle() || spec.program_setup {
            continue;
        }
        if let Err(e) = exec.run(ctx, command) {
            error!(buffer = buffer.id(), op = %command.op(), "command failed: {e}");
        }
    }
    debug!(buffer = buffer.id(), commands = buffer.len(), "frame rendered");
}
