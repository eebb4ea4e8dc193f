//! The producer-side proxy of a graphics context.
//!
//! Calls fall into four groups:
//!
//! - pure queries, answered from the [`DeviceDescription`] or the mirror;
//! - recording calls, appended to the active buffer;
//! - creation calls, which also allocate and return a placeholder
//!   [`Handle`];
//! - blocking calls, which dispatch the active buffer and wait for the
//!   consumer's answer.
//!
//! Every recorded call is validated first and folded into the mirrored
//! [`GlState`] with the same arguments. A call that fails validation is
//! logged and dropped before anything is recorded or mirrored.

use std::collections::HashMap;
use std::sync::Arc;

use gl::types::{GLbitfield, GLenum};
use glvirt_channel::{BufferSink, ProducerEnd};
use glvirt_core::{
    Arg, Command, CommandBuffer, DeviceDescription, EncodeError, Handle, HandleRegistry, Op,
    PrecisionFormat, ResourceKind, ResponseSlot, VirtError,
};
use glvirt_state::{ActiveInfo, GlState, ParamValue, StateLayout};
use tracing::{debug, error, warn};

use crate::buffer::CommandBufferFactory;
use crate::bytes::{self, AsBytes};
use crate::config::VirtConfig;
use crate::dispatch::{self, CheckContext, OpSpec};
use crate::texture::PixelSource;

/// Answer to [`ProxyContext::get_parameter`].
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    /// Mirrored context state.
    State(ParamValue),
    /// A device limit, one entry per component.
    Limit(Vec<i32>),
    Text(String),
}

pub struct ProxyContext {
    factory: CommandBufferFactory,
    active: Option<CommandBuffer>,
    registry: HandleRegistry,
    mirror: GlState,
    device: DeviceDescription,
    config: VirtConfig,
    slot: Arc<ResponseSlot>,
    /// Uniform location handles of each program, released with it.
    locations: HashMap<Handle, Vec<Handle>>,
}

impl ProxyContext {
    /// Wait for the consumer's device description, then wrap the link.
    pub fn connect(producer: ProducerEnd, config: VirtConfig) -> Result<Self, VirtError> {
        let device = producer.wait_for_description(config.response_timeout)?;
        Ok(Self::new(device, Box::new(producer), config))
    }

    pub fn new(device: DeviceDescription, sink: Box<dyn BufferSink>, config: VirtConfig) -> Self {
        let layout = StateLayout::from_device(&device, &config.layout_caps());
        debug!(
            units = layout.texture_units,
            vertex_arrays = layout.vertex_arrays,
            "proxy context ready"
        );
        Self {
            factory: CommandBufferFactory::new(sink),
            active: None,
            registry: HandleRegistry::new(),
            mirror: GlState::new(layout),
            device,
            config,
            slot: Arc::new(ResponseSlot::new()),
            locations: HashMap::new(),
        }
    }

    pub fn producer_id(&self) -> u32 {
        self.factory.producer_id()
    }

    pub fn device(&self) -> &DeviceDescription {
        &self.device
    }

    pub fn mirror(&self) -> &GlState {
        &self.mirror
    }

    pub fn active_buffer(&self) -> Option<&CommandBuffer> {
        self.active.as_ref()
    }

    /// `true` while `handle` names a created, undeleted resource.
    pub fn is_live(&self, handle: Handle) -> bool {
        self.registry.is_live(handle)
    }

    // -----------------------------------------------------------------------
    // Buffers
    // -----------------------------------------------------------------------

    /// Install a fresh buffer as the recording target and return its id.
    ///
    /// Commands still pending in the previous buffer are dispatched first.
    pub fn create_and_activate(&mut self, is_rendering: bool) -> Result<u64, VirtError> {
        if let Some(mut previous) = self.active.take() {
            if !previous.is_empty() {
                debug!(buffer = previous.id(), "dispatching unfinished buffer");
                self.factory.execute(&mut previous)?;
            }
        }
        let buffer = self.factory.create(is_rendering);
        let id = buffer.id();
        self.active = Some(buffer);
        Ok(id)
    }

    /// Dispatch the active buffer and clear it. It stays active.
    pub fn execute(&mut self) -> Result<(), VirtError> {
        let Some(buffer) = self.active.as_mut() else {
            error!("execute with no active command buffer");
            return Err(VirtError::NoActiveBuffer);
        };
        self.factory.execute(buffer)
    }

    // -----------------------------------------------------------------------
    // Pure queries
    // -----------------------------------------------------------------------

    pub fn get_parameter(&self, pname: GLenum) -> Option<Parameter> {
        if let Some(value) = self.mirror.get(pname) {
            return Some(Parameter::State(value));
        }
        if let Some(values) = self.device.limit_values(pname) {
            return Some(Parameter::Limit(values.to_vec()));
        }
        let text = match pname {
            gl::VERSION => self.device.version.clone(),
            gl::VENDOR => self.device.vendor.clone(),
            gl::RENDERER => self.device.renderer.clone(),
            gl::SHADING_LANGUAGE_VERSION => self
                .device
                .shading_language_versions
                .first()
                .cloned()
                .unwrap_or_default(),
            _ => {
                warn!(pname = format_args!("{pname:#x}"), "unknown parameter queried");
                return None;
            }
        };
        Some(Parameter::Text(text))
    }

    pub fn get_supported_extensions(&self) -> Vec<String> {
        self.device.extensions.iter().cloned().collect()
    }

    /// `false`, logged, when the consumer lacks `name`.
    pub fn get_extension(&self, name: &str) -> bool {
        let supported = self.device.has_extension(name);
        if !supported {
            error!(extension = name, "query for an unsupported extension");
        }
        supported
    }

    pub fn get_shader_precision_format(
        &self,
        stage: GLenum,
        precision_type: GLenum,
    ) -> Option<PrecisionFormat> {
        self.device.precision(stage, precision_type)
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    /// Arity, shape, op-specific and handle checks.
    fn prepare(&self, op: Op, args: &[Arg]) -> Result<&'static OpSpec, VirtError> {
        let spec = dispatch::spec(op);
        let cx = CheckContext {
            op,
            layout: self.mirror.layout(),
            mirror: &self.mirror,
        };
        spec.encode_check(&cx, args)?;
        for &(index, expected) in spec.handles {
            if let Some(handle) = args[index].as_handle() {
                self.check_handle(op, handle, expected)?;
            }
        }
        Ok(spec)
    }

    fn check_handle(&self, op: Op, handle: Handle, expected: ResourceKind) -> Result<(), EncodeError> {
        if handle.is_null() {
            return Ok(());
        }
        match self.registry.kind_of(handle) {
            None => Err(EncodeError::DeletedHandle { op, handle }),
            Some(actual) if actual != expected => Err(EncodeError::MistypedHandle {
                op,
                handle,
                expected,
                actual,
            }),
            Some(_) => Ok(()),
        }
    }

    fn submit(&mut self, op: Op, args: Vec<Arg>) -> Result<Option<Handle>, VirtError> {
        let result = self.try_submit(op, args);
        if let Err(e) = &result {
            error!(%op, "call dropped: {e}");
        }
        result
    }

    fn try_submit(&mut self, op: Op, args: Vec<Arg>) -> Result<Option<Handle>, VirtError> {
        if self.active.is_none() {
            return Err(VirtError::NoActiveBuffer);
        }
        let spec = self.prepare(op, &args)?;
        let created = spec.creates.map(|kind| self.registry.allocate(kind));
        let command = match created {
            Some(handle) => Command::with_handle(op, args, handle),
            None => Command::new(op, args),
        };

        if spec.mirrors {
            self.mirror.process_one_command(&command);
        }
        if let (Some(location), Some(program)) = (
            created.filter(|_| op == Op::GetUniformLocation),
            command.arg(0).and_then(Arg::as_handle),
        ) {
            self.locations.entry(program).or_default().push(location);
        }
        if spec.deletes.is_some() {
            if let Some(handle) = command.arg(0).and_then(Arg::as_handle) {
                self.release(op, handle);
            }
        }

        if let Some(buffer) = self.active.as_mut() {
            buffer.push(command);
        }
        Ok(created)
    }

    fn release(&mut self, op: Op, handle: Handle) {
        if handle.is_null() {
            return;
        }
        self.registry.release(handle);
        if op == Op::DeleteProgram {
            for location in self.locations.remove(&handle).unwrap_or_default() {
                self.registry.release(location);
            }
        }
    }

    fn record(&mut self, op: Op, args: Vec<Arg>) -> Result<(), VirtError> {
        self.submit(op, args).map(drop)
    }

    fn record_create(&mut self, op: Op, args: Vec<Arg>) -> Result<Handle, VirtError> {
        self.submit(op, args)?
            .ok_or_else(|| VirtError::Unsupported(format!("{op} creates nothing")))
    }

    /// Record a blocking command, dispatch the active buffer and wait for
    /// the consumer's payload.
    fn round_trip(&mut self, op: Op, args: Vec<Arg>) -> Result<Vec<u8>, VirtError> {
        let result = self.try_round_trip(op, args);
        if let Err(e) = &result {
            error!(%op, "round trip failed: {e}");
        }
        result
    }

    fn try_round_trip(&mut self, op: Op, args: Vec<Arg>) -> Result<Vec<u8>, VirtError> {
        match self.active.as_ref() {
            None => return Err(VirtError::NoActiveBuffer),
            Some(buffer) if buffer.is_rendering() => {
                return Err(VirtError::BlockingInRenderBuffer(op))
            }
            Some(_) => {}
        }
        self.prepare(op, &args)?;

        let slot = Arc::clone(&self.slot);
        let buffer = self.active.as_mut().ok_or(VirtError::NoActiveBuffer)?;
        buffer.add_message_and_wait(op, args, Arc::clone(&slot));
        self.factory.execute(buffer)?;

        if let Err(e) = slot.wait(self.config.response_timeout) {
            // A late answer must not land in the next round trip.
            self.slot = Arc::new(ResponseSlot::new());
            return Err(e.into());
        }
        Ok(slot.take_payload()?)
    }

    // -----------------------------------------------------------------------
    // Bindings and draw state
    // -----------------------------------------------------------------------

    pub fn use_program(&mut self, program: Handle) -> Result<(), VirtError> {
        self.record(Op::UseProgram, vec![program.into()])
    }

    pub fn bind_buffer(&mut self, target: GLenum, buffer: Handle) -> Result<(), VirtError> {
        self.record(Op::BindBuffer, vec![Arg::Enum(target), buffer.into()])
    }

    pub fn bind_buffer_base(
        &mut self,
        target: GLenum,
        index: u32,
        buffer: Handle,
    ) -> Result<(), VirtError> {
        self.record(
            Op::BindBufferBase,
            vec![Arg::Enum(target), Arg::Int(index as i32), buffer.into()],
        )
    }

    pub fn bind_framebuffer(&mut self, target: GLenum, framebuffer: Handle) -> Result<(), VirtError> {
        self.record(Op::BindFramebuffer, vec![Arg::Enum(target), framebuffer.into()])
    }

    pub fn bind_renderbuffer(
        &mut self,
        target: GLenum,
        renderbuffer: Handle,
    ) -> Result<(), VirtError> {
        self.record(Op::BindRenderbuffer, vec![Arg::Enum(target), renderbuffer.into()])
    }

    pub fn bind_vertex_array(&mut self, array: Handle) -> Result<(), VirtError> {
        self.record(Op::BindVertexArray, vec![array.into()])
    }

    pub fn active_texture(&mut self, unit: GLenum) -> Result<(), VirtError> {
        self.record(Op::ActiveTexture, vec![Arg::Enum(unit)])
    }

    pub fn bind_texture(&mut self, target: GLenum, texture: Handle) -> Result<(), VirtError> {
        self.record(Op::BindTexture, vec![Arg::Enum(target), texture.into()])
    }

    pub fn tex_parameter_i(&mut self, target: GLenum, pname: GLenum, value: i32) -> Result<(), VirtError> {
        self.record(
            Op::TexParameteri,
            vec![Arg::Enum(target), Arg::Enum(pname), Arg::Int(value)],
        )
    }

    pub fn tex_parameter_f(&mut self, target: GLenum, pname: GLenum, value: f32) -> Result<(), VirtError> {
        self.record(
            Op::TexParameterf,
            vec![Arg::Enum(target), Arg::Enum(pname), Arg::Float(value)],
        )
    }

    pub fn enable(&mut self, cap: GLenum) -> Result<(), VirtError> {
        self.record(Op::Enable, vec![Arg::Enum(cap)])
    }

    pub fn disable(&mut self, cap: GLenum) -> Result<(), VirtError> {
        self.record(Op::Disable, vec![Arg::Enum(cap)])
    }

    pub fn cull_face(&mut self, mode: GLenum) -> Result<(), VirtError> {
        self.record(Op::CullFace, vec![Arg::Enum(mode)])
    }

    pub fn depth_func(&mut self, func: GLenum) -> Result<(), VirtError> {
        self.record(Op::DepthFunc, vec![Arg::Enum(func)])
    }

    pub fn front_face(&mut self, mode: GLenum) -> Result<(), VirtError> {
        self.record(Op::FrontFace, vec![Arg::Enum(mode)])
    }

    pub fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) -> Result<(), VirtError> {
        self.record(Op::ClearColor, vec![r.into(), g.into(), b.into(), a.into()])
    }

    pub fn clear_depth(&mut self, depth: f32) -> Result<(), VirtError> {
        self.record(Op::ClearDepth, vec![depth.into()])
    }

    pub fn clear_stencil(&mut self, s: i32) -> Result<(), VirtError> {
        self.record(Op::ClearStencil, vec![s.into()])
    }

    pub fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) -> Result<(), VirtError> {
        self.record(Op::Scissor, vec![x.into(), y.into(), width.into(), height.into()])
    }

    pub fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) -> Result<(), VirtError> {
        self.record(Op::Viewport, vec![x.into(), y.into(), width.into(), height.into()])
    }

    pub fn blend_func(&mut self, src: GLenum, dst: GLenum) -> Result<(), VirtError> {
        self.record(Op::BlendFunc, vec![Arg::Enum(src), Arg::Enum(dst)])
    }

    pub fn blend_func_separate(
        &mut self,
        src_rgb: GLenum,
        dst_rgb: GLenum,
        src_alpha: GLenum,
        dst_alpha: GLenum,
    ) -> Result<(), VirtError> {
        self.record(
            Op::BlendFuncSeparate,
            vec![
                Arg::Enum(src_rgb),
                Arg::Enum(dst_rgb),
                Arg::Enum(src_alpha),
                Arg::Enum(dst_alpha),
            ],
        )
    }

    pub fn blend_equation(&mut self, mode: GLenum) -> Result<(), VirtError> {
        self.record(Op::BlendEquation, vec![Arg::Enum(mode)])
    }

    pub fn blend_equation_separate(&mut self, rgb: GLenum, alpha: GLenum) -> Result<(), VirtError> {
        self.record(Op::BlendEquationSeparate, vec![Arg::Enum(rgb), Arg::Enum(alpha)])
    }

    pub fn blend_color(&mut self, r: f32, g: f32, b: f32, a: f32) -> Result<(), VirtError> {
        self.record(Op::BlendColor, vec![r.into(), g.into(), b.into(), a.into()])
    }

    pub fn color_mask(&mut self, r: bool, g: bool, b: bool, a: bool) -> Result<(), VirtError> {
        self.record(Op::ColorMask, vec![r.into(), g.into(), b.into(), a.into()])
    }

    pub fn depth_mask(&mut self, flag: bool) -> Result<(), VirtError> {
        self.record(Op::DepthMask, vec![flag.into()])
    }

    pub fn depth_range(&mut self, near: f32, far: f32) -> Result<(), VirtError> {
        self.record(Op::DepthRange, vec![near.into(), far.into()])
    }

    pub fn line_width(&mut self, width: f32) -> Result<(), VirtError> {
        self.record(Op::LineWidth, vec![width.into()])
    }

    pub fn polygon_offset(&mut self, factor: f32, units: f32) -> Result<(), VirtError> {
        self.record(Op::PolygonOffset, vec![factor.into(), units.into()])
    }

    pub fn pixel_store_i(&mut self, pname: GLenum, value: i32) -> Result<(), VirtError> {
        self.record(Op::PixelStorei, vec![Arg::Enum(pname), value.into()])
    }

    // -----------------------------------------------------------------------
    // Object lifecycle
    // -----------------------------------------------------------------------

    pub fn create_texture(&mut self) -> Result<Handle, VirtError> {
        self.record_create(Op::CreateTexture, vec![])
    }

    pub fn create_buffer(&mut self) -> Result<Handle, VirtError> {
        self.record_create(Op::CreateBuffer, vec![])
    }

    pub fn create_framebuffer(&mut self) -> Result<Handle, VirtError> {
        self.record_create(Op::CreateFramebuffer, vec![])
    }

    pub fn create_renderbuffer(&mut self) -> Result<Handle, VirtError> {
        self.record_create(Op::CreateRenderbuffer, vec![])
    }

    pub fn create_vertex_array(&mut self) -> Result<Handle, VirtError> {
        self.record_create(Op::CreateVertexArray, vec![])
    }

    pub fn create_program(&mut self) -> Result<Handle, VirtError> {
        self.record_create(Op::CreateProgram, vec![])
    }

    pub fn create_shader(&mut self, kind: GLenum) -> Result<Handle, VirtError> {
        self.record_create(Op::CreateShader, vec![Arg::Enum(kind)])
    }

    /// A handle standing for the location of `name` in `program`. Inactive
    /// uniforms resolve to location -1 on the consumer, where uploads to
    /// them are ignored.
    pub fn get_uniform_location(&mut self, program: Handle, name: &str) -> Result<Handle, VirtError> {
        self.record_create(Op::GetUniformLocation, vec![program.into(), name.into()])
    }

    pub fn delete_texture(&mut self, texture: Handle) -> Result<(), VirtError> {
        self.record(Op::DeleteTexture, vec![texture.into()])
    }

    pub fn delete_buffer(&mut self, buffer: Handle) -> Result<(), VirtError> {
        self.record(Op::DeleteBuffer, vec![buffer.into()])
    }

    pub fn delete_framebuffer(&mut self, framebuffer: Handle) -> Result<(), VirtError> {
        self.record(Op::DeleteFramebuffer, vec![framebuffer.into()])
    }

    pub fn delete_renderbuffer(&mut self, renderbuffer: Handle) -> Result<(), VirtError> {
        self.record(Op::DeleteRenderbuffer, vec![renderbuffer.into()])
    }

    pub fn delete_vertex_array(&mut self, array: Handle) -> Result<(), VirtError> {
        self.record(Op::DeleteVertexArray, vec![array.into()])
    }

    /// Also invalidates every uniform location handle of `program`.
    pub fn delete_program(&mut self, program: Handle) -> Result<(), VirtError> {
        self.record(Op::DeleteProgram, vec![program.into()])
    }

    pub fn delete_shader(&mut self, shader: Handle) -> Result<(), VirtError> {
        self.record(Op::DeleteShader, vec![shader.into()])
    }

    // -----------------------------------------------------------------------
    // Resource setup
    // -----------------------------------------------------------------------

    pub fn shader_source(&mut self, shader: Handle, source: &str) -> Result<(), VirtError> {
        self.record(Op::ShaderSource, vec![shader.into(), source.into()])
    }

    pub fn compile_shader(&mut self, shader: Handle) -> Result<(), VirtError> {
        self.record(Op::CompileShader, vec![shader.into()])
    }

    pub fn attach_shader(&mut self, program: Handle, shader: Handle) -> Result<(), VirtError> {
        self.record(Op::AttachShader, vec![program.into(), shader.into()])
    }

    pub fn link_program(&mut self, program: Handle) -> Result<(), VirtError> {
        self.record(Op::LinkProgram, vec![program.into()])
    }

    pub fn bind_attrib_location(
        &mut self,
        program: Handle,
        index: u32,
        name: &str,
    ) -> Result<(), VirtError> {
        self.record(
            Op::BindAttribLocation,
            vec![program.into(), Arg::Int(index as i32), name.into()],
        )
    }

    pub fn buffer_data(&mut self, target: GLenum, data: &[u8], usage: GLenum) -> Result<(), VirtError> {
        self.record(
            Op::BufferData,
            vec![
                Arg::Enum(target),
                Arg::Int(data.len() as i32),
                data.into(),
                Arg::Enum(usage),
            ],
        )
    }

    /// Allocate `size` uninitialized bytes.
    pub fn buffer_data_size(&mut self, target: GLenum, size: usize, usage: GLenum) -> Result<(), VirtError> {
        self.record(
            Op::BufferData,
            vec![Arg::Enum(target), Arg::Int(size as i32), Arg::Null, Arg::Enum(usage)],
        )
    }

    pub fn buffer_data_of<T: AsBytes>(
        &mut self,
        target: GLenum,
        value: &T,
        usage: GLenum,
    ) -> Result<(), VirtError> {
        self.buffer_data(target, value.as_bytes(), usage)
    }

    pub fn buffer_sub_data(&mut self, target: GLenum, offset: usize, data: &[u8]) -> Result<(), VirtError> {
        self.record(
            Op::BufferSubData,
            vec![Arg::Enum(target), Arg::Int(offset as i32), data.into()],
        )
    }

    /// `pixels == None` allocates the level without uploading.
    pub fn tex_image_2d(
        &mut self,
        target: GLenum,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        format: GLenum,
        ty: GLenum,
        pixels: Option<&[u8]>,
    ) -> Result<(), VirtError> {
        self.record(
            Op::TexImage2D,
            vec![
                Arg::Enum(target),
                level.into(),
                internal_format.into(),
                width.into(),
                height.into(),
                Arg::Enum(format),
                Arg::Enum(ty),
                pixels.map_or(Arg::Null, Arg::from),
            ],
        )
    }

    /// Rasterize `source` and upload it as a whole level.
    pub fn tex_image_2d_from(
        &mut self,
        target: GLenum,
        level: i32,
        internal_format: i32,
        source: &dyn PixelSource,
    ) -> Result<(), VirtError> {
        let pixels = source.rasterize()?;
        let data = pixels.aligned(self.unpack_alignment());
        self.tex_image_2d(
            target,
            level,
            internal_format,
            pixels.width as i32,
            pixels.height as i32,
            pixels.format,
            pixels.ty,
            Some(data.as_ref()),
        )
    }

    pub fn tex_sub_image_2d(
        &mut self,
        target: GLenum,
        level: i32,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: GLenum,
        ty: GLenum,
        pixels: &[u8],
    ) -> Result<(), VirtError> {
        self.record(
            Op::TexSubImage2D,
            vec![
                Arg::Enum(target),
                level.into(),
                x.into(),
                y.into(),
                width.into(),
                height.into(),
                Arg::Enum(format),
                Arg::Enum(ty),
                pixels.into(),
            ],
        )
    }

    pub fn tex_sub_image_2d_from(
        &mut self,
        target: GLenum,
        level: i32,
        x: i32,
        y: i32,
        source: &dyn PixelSource,
    ) -> Result<(), VirtError> {
        let pixels = source.rasterize()?;
        let data = pixels.aligned(self.unpack_alignment());
        self.tex_sub_image_2d(
            target,
            level,
            x,
            y,
            pixels.width as i32,
            pixels.height as i32,
            pixels.format,
            pixels.ty,
            &data,
        )
    }

    fn unpack_alignment(&self) -> u32 {
        self.mirror
            .get(gl::UNPACK_ALIGNMENT)
            .and_then(|v| v.as_int())
            .unwrap_or(4) as u32
    }

    pub fn generate_mipmap(&mut self, target: GLenum) -> Result<(), VirtError> {
        self.record(Op::GenerateMipmap, vec![Arg::Enum(target)])
    }

    pub fn framebuffer_texture_2d(
        &mut self,
        target: GLenum,
        attachment: GLenum,
        tex_target: GLenum,
        texture: Handle,
        level: i32,
    ) -> Result<(), VirtError> {
        self.record(
            Op::FramebufferTexture2D,
            vec![
                Arg::Enum(target),
                Arg::Enum(attachment),
                Arg::Enum(tex_target),
                texture.into(),
                level.into(),
            ],
        )
    }

    pub fn framebuffer_renderbuffer(
        &mut self,
        target: GLenum,
        attachment: GLenum,
        rb_target: GLenum,
        renderbuffer: Handle,
    ) -> Result<(), VirtError> {
        self.record(
            Op::FramebufferRenderbuffer,
            vec![
                Arg::Enum(target),
                Arg::Enum(attachment),
                Arg::Enum(rb_target),
                renderbuffer.into(),
            ],
        )
    }

    pub fn renderbuffer_storage(
        &mut self,
        target: GLenum,
        format: GLenum,
        width: i32,
        height: i32,
    ) -> Result<(), VirtError> {
        self.record(
            Op::RenderbufferStorage,
            vec![Arg::Enum(target), Arg::Enum(format), width.into(), height.into()],
        )
    }

    pub fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        ty: GLenum,
        normalized: bool,
        stride: i32,
        offset: usize,
    ) -> Result<(), VirtError> {
        self.record(
            Op::VertexAttribPointer,
            vec![
                Arg::Int(index as i32),
                size.into(),
                Arg::Enum(ty),
                normalized.into(),
                stride.into(),
                Arg::Int(offset as i32),
            ],
        )
    }

    pub fn enable_vertex_attrib_array(&mut self, index: u32) -> Result<(), VirtError> {
        self.record(Op::EnableVertexAttribArray, vec![Arg::Int(index as i32)])
    }

    pub fn disable_vertex_attrib_array(&mut self, index: u32) -> Result<(), VirtError> {
        self.record(Op::DisableVertexAttribArray, vec![Arg::Int(index as i32)])
    }

    /// `values` holds one or more `components`-wide float vectors.
    pub fn uniform_floats(
        &mut self,
        location: Handle,
        components: i32,
        values: &[f32],
    ) -> Result<(), VirtError> {
        self.record(
            Op::UniformFloats,
            vec![location.into(), components.into(), values.into()],
        )
    }

    pub fn uniform_ints(
        &mut self,
        location: Handle,
        components: i32,
        values: &[i32],
    ) -> Result<(), VirtError> {
        self.record(
            Op::UniformInts,
            vec![location.into(), components.into(), values.into()],
        )
    }

    /// `values` holds one or more column-major `dim` x `dim` matrices.
    pub fn uniform_matrix(
        &mut self,
        location: Handle,
        dim: i32,
        transpose: bool,
        values: &[f32],
    ) -> Result<(), VirtError> {
        self.record(
            Op::UniformMatrix,
            vec![location.into(), dim.into(), transpose.into(), values.into()],
        )
    }

    pub fn uniform1f(&mut self, location: Handle, x: f32) -> Result<(), VirtError> {
        self.uniform_floats(location, 1, &[x])
    }

    pub fn uniform2f(&mut self, location: Handle, x: f32, y: f32) -> Result<(), VirtError> {
        self.uniform_floats(location, 2, &[x, y])
    }

    pub fn uniform3f(&mut self, location: Handle, x: f32, y: f32, z: f32) -> Result<(), VirtError> {
        self.uniform_floats(location, 3, &[x, y, z])
    }

    pub fn uniform4f(&mut self, location: Handle, x: f32, y: f32, z: f32, w: f32) -> Result<(), VirtError> {
        self.uniform_floats(location, 4, &[x, y, z, w])
    }

    pub fn uniform1i(&mut self, location: Handle, x: i32) -> Result<(), VirtError> {
        self.uniform_ints(location, 1, &[x])
    }

    pub fn uniform2i(&mut self, location: Handle, x: i32, y: i32) -> Result<(), VirtError> {
        self.uniform_ints(location, 2, &[x, y])
    }

    pub fn uniform1fv(&mut self, location: Handle, values: &[f32]) -> Result<(), VirtError> {
        self.uniform_floats(location, 1, values)
    }

    pub fn uniform2fv(&mut self, location: Handle, values: &[f32]) -> Result<(), VirtError> {
        self.uniform_floats(location, 2, values)
    }

    pub fn uniform3fv(&mut self, location: Handle, values: &[f32]) -> Result<(), VirtError> {
        self.uniform_floats(location, 3, values)
    }

    pub fn uniform4fv(&mut self, location: Handle, values: &[f32]) -> Result<(), VirtError> {
        self.uniform_floats(location, 4, values)
    }

    pub fn uniform1iv(&mut self, location: Handle, values: &[i32]) -> Result<(), VirtError> {
        self.uniform_ints(location, 1, values)
    }

    pub fn uniform_matrix2fv(&mut self, location: Handle, transpose: bool, values: &[f32]) -> Result<(), VirtError> {
        self.uniform_matrix(location, 2, transpose, values)
    }

    pub fn uniform_matrix3fv(&mut self, location: Handle, transpose: bool, values: &[f32]) -> Result<(), VirtError> {
        self.uniform_matrix(location, 3, transpose, values)
    }

    pub fn uniform_matrix4fv(&mut self, location: Handle, transpose: bool, values: &[f32]) -> Result<(), VirtError> {
        self.uniform_matrix(location, 4, transpose, values)
    }

    // -----------------------------------------------------------------------
    // Drawing
    // -----------------------------------------------------------------------

    pub fn clear(&mut self, mask: GLbitfield) -> Result<(), VirtError> {
        self.record(Op::Clear, vec![Arg::Enum(mask)])
    }

    pub fn draw_arrays(&mut self, mode: GLenum, first: i32, count: i32) -> Result<(), VirtError> {
        self.record(Op::DrawArrays, vec![Arg::Enum(mode), first.into(), count.into()])
    }

    pub fn draw_elements(
        &mut self,
        mode: GLenum,
        count: i32,
        ty: GLenum,
        offset: usize,
    ) -> Result<(), VirtError> {
        self.record(
            Op::DrawElements,
            vec![Arg::Enum(mode), count.into(), Arg::Enum(ty), Arg::Int(offset as i32)],
        )
    }

    pub fn flush(&mut self) -> Result<(), VirtError> {
        self.record(Op::Flush, vec![])
    }

    // -----------------------------------------------------------------------
    // Blocking queries
    // -----------------------------------------------------------------------

    pub fn get_attrib_location(&mut self, program: Handle, name: &str) -> Result<i32, VirtError> {
        let payload = self.round_trip(Op::GetAttribLocation, vec![program.into(), name.into()])?;
        bytes::decode_int(&payload)
    }

    pub fn get_program_parameter(&mut self, program: Handle, pname: GLenum) -> Result<i32, VirtError> {
        let payload =
            self.round_trip(Op::GetProgramParameter, vec![program.into(), Arg::Enum(pname)])?;
        bytes::decode_int(&payload)
    }

    pub fn get_shader_parameter(&mut self, shader: Handle, pname: GLenum) -> Result<i32, VirtError> {
        let payload =
            self.round_trip(Op::GetShaderParameter, vec![shader.into(), Arg::Enum(pname)])?;
        bytes::decode_int(&payload)
    }

    pub fn get_program_info_log(&mut self, program: Handle) -> Result<String, VirtError> {
        let payload = self.round_trip(Op::GetProgramInfoLog, vec![program.into()])?;
        bytes::decode_str(payload)
    }

    pub fn get_shader_info_log(&mut self, shader: Handle) -> Result<String, VirtError> {
        let payload = self.round_trip(Op::GetShaderInfoLog, vec![shader.into()])?;
        bytes::decode_str(payload)
    }

    pub fn get_active_attrib(&mut self, program: Handle, index: u32) -> Result<Option<ActiveInfo>, VirtError> {
        let payload =
            self.round_trip(Op::GetActiveAttrib, vec![program.into(), Arg::Int(index as i32)])?;
        bytes::decode_active_info(&payload)
    }

    pub fn get_active_uniform(&mut self, program: Handle, index: u32) -> Result<Option<ActiveInfo>, VirtError> {
        let payload =
            self.round_trip(Op::GetActiveUniform, vec![program.into(), Arg::Int(index as i32)])?;
        bytes::decode_active_info(&payload)
    }

    pub fn get_error(&mut self) -> Result<GLenum, VirtError> {
        let payload = self.round_trip(Op::GetError, vec![])?;
        bytes::decode_enum(&payload)
    }

    pub fn check_framebuffer_status(&mut self, target: GLenum) -> Result<GLenum, VirtError> {
        let payload = self.round_trip(Op::CheckFramebufferStatus, vec![Arg::Enum(target)])?;
        bytes::decode_enum(&payload)
    }

    /// Tightly packed rows, bottom row first.
    pub fn read_pixels(
        &mut self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: GLenum,
        ty: GLenum,
    ) -> Result<Vec<u8>, VirtError> {
        self.round_trip(
            Op::ReadPixels,
            vec![
                x.into(),
                y.into(),
                width.into(),
                height.into(),
                Arg::Enum(format),
                Arg::Enum(ty),
            ],
        )
    }

    /// Block until the consumer has executed everything sent so far.
    pub fn finish(&mut self) -> Result<(), VirtError> {
        self.round_trip(Op::Finish, vec![]).map(drop)
    }
}
