//! Translation of recorded commands into native calls on the consumer.
//!
//! The [`Executor`] owns everything that maps producer handles onto the real
//! context: the consumer registry, the uniform location table and the state
//! the context is actually in. That state is only ever moved by calls the
//! executor itself issued, so it can always serve as the baseline of a diff.

use std::collections::HashMap;

use gl::types::GLenum;
use glvirt_core::{Arg, Command, EncodeError, Handle, HandleRegistry, Op, ResourceKind, StateError};
use glvirt_state::{GlContext, GlState, StateLayout};
use thiserror::Error;
use tracing::trace;

use crate::bytes;
use crate::dispatch::{self, CheckContext};

/// Why one command was not executed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("rejected: {0}")]
    Rejected(#[from] EncodeError),
    #[error("{0}: malformed arguments")]
    Malformed(Op),
}

pub struct Executor {
    registry: HandleRegistry,
    /// Location handle -> (program handle, native location).
    locations: HashMap<Handle, (Handle, i32)>,
    current: GlState,
}

impl Executor {
    /// Capture `ctx` as the starting point.
    pub fn new(ctx: &mut dyn GlContext, layout: &StateLayout) -> Self {
        let mut registry = HandleRegistry::new();
        let current = GlState::create_from_live_context(ctx, layout, &mut registry);
        Self {
            registry,
            locations: HashMap::new(),
            current,
        }
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// The state `ctx` is in.
    pub fn current(&self) -> &GlState {
        &self.current
    }

    /// Forget what we believed and query `ctx` again.
    pub fn recapture(&mut self, ctx: &mut dyn GlContext) {
        let layout = self.current.layout().clone();
        self.current = GlState::create_from_live_context(ctx, &layout, &mut self.registry);
    }

    /// Move `ctx` to `target` with the fewest calls.
    pub fn transition(&mut self, ctx: &mut dyn GlContext, target: &GlState) -> Result<(), StateError> {
        target.apply_diff(&self.current, ctx, &self.registry)?;
        self.current = target.clone();
        Ok(())
    }

    /// Move `ctx` to `target` assuming nothing about it.
    pub fn force(&mut self, ctx: &mut dyn GlContext, target: &GlState) -> Result<(), StateError> {
        target.force_apply(ctx, &self.registry)?;
        self.current = target.clone();
        Ok(())
    }

    /// Check and execute one command, folding it into the current state.
    /// Blocking commands return their response payload.
    pub fn run(&mut self, ctx: &mut dyn GlContext, command: &Command) -> Result<Option<Vec<u8>>, ExecError> {
        let op = command.op();
        let cx = CheckContext {
            op,
            layout: self.current.layout(),
            mirror: &self.current,
        };
        dispatch::spec(op).encode_check(&cx, command.args())?;

        trace!(%op, "execute");
        let payload = self.call(ctx, command)?;
        self.current.process_one_command(command);
        Ok(payload)
    }

    fn native(&self, handle: Handle) -> Result<u32, ExecError> {
        self.registry
            .resolve(handle)
            .ok_or(ExecError::State(StateError::UnresolvedHandle(handle)))
    }

    /// Native location for a location handle. NULL is location -1, which
    /// GL silently ignores.
    fn location(&self, handle: Handle) -> Result<i32, ExecError> {
        if handle.is_null() {
            return Ok(-1);
        }
        self.locations
            .get(&handle)
            .map(|&(_, location)| location)
            .ok_or(ExecError::State(StateError::UnresolvedHandle(handle)))
    }

    fn create(
        &mut self,
        command: &Command,
        kind: ResourceKind,
        gen: impl FnOnce() -> u32,
    ) -> Result<(), ExecError> {
        let handle = command.handle().ok_or(ExecError::Malformed(command.op()))?;
        let name = gen();
        self.registry.bind(handle, kind, name);
        trace!(?handle, ?kind, name, "created");
        Ok(())
    }

    fn delete(
        &mut self,
        ctx: &mut dyn GlContext,
        handle: Handle,
        delete: impl FnOnce(&mut dyn GlContext, u32),
    ) -> Result<(), ExecError> {
        if handle.is_null() {
            return Ok(());
        }
        let name = self.native(handle)?;
        delete(ctx, name);
        self.registry.release(handle);
        Ok(())
    }

    fn call(&mut self, ctx: &mut dyn GlContext, command: &Command) -> Result<Option<Vec<u8>>, ExecError> {
        let a = Reader {
            op: command.op(),
            args: command.args(),
        };
        match command.op() {
            Op::UseProgram => ctx.use_program(self.native(a.handle(0)?)?),
            Op::BindBuffer => ctx.bind_buffer(a.enm(0)?, self.native(a.handle(1)?)?),
            Op::BindBufferBase => {
                ctx.bind_buffer_base(a.enm(0)?, a.uint(1)?, self.native(a.handle(2)?)?)
            }
            Op::BindFramebuffer => ctx.bind_framebuffer(a.enm(0)?, self.native(a.handle(1)?)?),
            Op::BindRenderbuffer => ctx.bind_renderbuffer(a.enm(0)?, self.native(a.handle(1)?)?),
            Op::BindVertexArray => ctx.bind_vertex_array(self.native(a.handle(0)?)?),
            Op::ActiveTexture => ctx.active_texture(a.enm(0)?),
            Op::BindTexture => ctx.bind_texture(a.enm(0)?, self.native(a.handle(1)?)?),
            Op::TexParameteri => ctx.tex_parameter_i(a.enm(0)?, a.enm(1)?, a.int(2)?),
            Op::TexParameterf => ctx.tex_parameter_f(a.enm(0)?, a.enm(1)?, a.float(2)?),

            Op::Enable => ctx.enable(a.enm(0)?),
            Op::Disable => ctx.disable(a.enm(0)?),
            Op::CullFace => ctx.cull_face(a.enm(0)?),
            Op::DepthFunc => ctx.depth_func(a.enm(0)?),
            Op::FrontFace => ctx.front_face(a.enm(0)?),
            Op::ClearColor => ctx.clear_color(a.float(0)?, a.float(1)?, a.float(2)?, a.float(3)?),
            Op::ClearDepth => ctx.clear_depth(a.float(0)?),
            Op::ClearStencil => ctx.clear_stencil(a.int(0)?),
            Op::Scissor => ctx.scissor(a.int(0)?, a.int(1)?, a.int(2)?, a.int(3)?),
            Op::Viewport => ctx.viewport(a.int(0)?, a.int(1)?, a.int(2)?, a.int(3)?),
            Op::BlendFunc => {
                let (src, dst) = (a.enm(0)?, a.enm(1)?);
                ctx.blend_func_separate(src, dst, src, dst)
            }
            Op::BlendFuncSeparate => ctx.blend_func_separate(a.enm(0)?, a.enm(1)?, a.enm(2)?, a.enm(3)?),
            Op::BlendEquation => {
                let mode = a.enm(0)?;
                ctx.blend_equation_separate(mode, mode)
            }
            Op::BlendEquationSeparate => ctx.blend_equation_separate(a.enm(0)?, a.enm(1)?),
            Op::BlendColor => ctx.blend_color(a.float(0)?, a.float(1)?, a.float(2)?, a.float(3)?),
            Op::ColorMask => ctx.color_mask(a.boolean(0)?, a.boolean(1)?, a.boolean(2)?, a.boolean(3)?),
            Op::DepthMask => ctx.depth_mask(a.boolean(0)?),
            Op::DepthRange => ctx.depth_range(a.float(0)?, a.float(1)?),
            Op::LineWidth => ctx.line_width(a.float(0)?),
            Op::PolygonOffset => ctx.polygon_offset(a.float(0)?, a.float(1)?),
            Op::PixelStorei => ctx.pixel_store_i(a.enm(0)?, a.int(1)?),

            Op::CreateTexture => self.create(command, ResourceKind::Texture, || ctx.gen_texture())?,
            Op::CreateBuffer => self.create(command, ResourceKind::Buffer, || ctx.gen_buffer())?,
            Op::CreateFramebuffer => {
                self.create(command, ResourceKind::Framebuffer, || ctx.gen_framebuffer())?
            }
            Op::CreateRenderbuffer => {
                self.create(command, ResourceKind::Renderbuffer, || ctx.gen_renderbuffer())?
            }
            Op::CreateVertexArray => {
                self.create(command, ResourceKind::VertexArray, || ctx.gen_vertex_array())?
            }
            Op::CreateProgram => self.create(command, ResourceKind::Program, || ctx.create_program())?,
            Op::CreateShader => {
                let kind = a.enm(0)?;
                self.create(command, ResourceKind::Shader, || ctx.create_shader(kind))?
            }
            Op::GetUniformLocation => {
                let handle = command.handle().ok_or(ExecError::Malformed(command.op()))?;
                let program = a.handle(0)?;
                let location = ctx.get_uniform_location(self.native(program)?, a.string(1)?);
                trace!(?handle, location, "uniform location");
                self.locations.insert(handle, (program, location));
            }
            Op::DeleteTexture => self.delete(ctx, a.handle(0)?, |ctx, n| ctx.delete_texture(n))?,
            Op::DeleteBuffer => self.delete(ctx, a.handle(0)?, |ctx, n| ctx.delete_buffer(n))?,
            Op::DeleteFramebuffer => {
                self.delete(ctx, a.handle(0)?, |ctx, n| ctx.delete_framebuffer(n))?
            }
            Op::DeleteRenderbuffer => {
                self.delete(ctx, a.handle(0)?, |ctx, n| ctx.delete_renderbuffer(n))?
            }
            Op::DeleteVertexArray => {
                self.delete(ctx, a.handle(0)?, |ctx, n| ctx.delete_vertex_array(n))?
            }
            Op::DeleteProgram => {
                let program = a.handle(0)?;
                // GL keeps a deleted current program in use until it is
                // replaced. The tracked state drops it right away, so unbind
                // it here to match.
                if !program.is_null() && self.current.program() == program {
                    ctx.use_program(0);
                }
                self.delete(ctx, program, |ctx, n| ctx.delete_program(n))?;
                self.locations.retain(|_, (owner, _)| *owner != program);
            }
            Op::DeleteShader => self.delete(ctx, a.handle(0)?, |ctx, n| ctx.delete_shader(n))?,

            Op::ShaderSource => ctx.shader_source(self.native(a.handle(0)?)?, a.string(1)?),
            Op::CompileShader => ctx.compile_shader(self.native(a.handle(0)?)?),
            Op::AttachShader => {
                ctx.attach_shader(self.native(a.handle(0)?)?, self.native(a.handle(1)?)?)
            }
            Op::LinkProgram => ctx.link_program(self.native(a.handle(0)?)?),
            Op::BindAttribLocation => {
                ctx.bind_attrib_location(self.native(a.handle(0)?)?, a.uint(1)?, a.string(2)?)
            }
            Op::BufferData => ctx.buffer_data(a.enm(0)?, a.uint(1)? as usize, a.bytes(2)?, a.enm(3)?),
            Op::BufferSubData => {
                let data = a.bytes(2)?.ok_or(ExecError::Malformed(command.op()))?;
                ctx.buffer_sub_data(a.enm(0)?, a.uint(1)? as usize, data)
            }
            Op::TexImage2D => ctx.tex_image_2d(
                a.enm(0)?,
                a.int(1)?,
                a.int(2)?,
                a.int(3)?,
                a.int(4)?,
                a.enm(5)?,
                a.enm(6)?,
                a.bytes(7)?,
            ),
            Op::TexSubImage2D => {
                let pixels = a.bytes(8)?.ok_or(ExecError::Malformed(command.op()))?;
                ctx.tex_sub_image_2d(
                    a.enm(0)?,
                    a.int(1)?,
                    a.int(2)?,
                    a.int(3)?,
                    a.int(4)?,
                    a.int(5)?,
                    a.enm(6)?,
                    a.enm(7)?,
                    pixels,
                )
            }
            Op::GenerateMipmap => ctx.generate_mipmap(a.enm(0)?),
            Op::FramebufferTexture2D => ctx.framebuffer_texture_2d(
                a.enm(0)?,
                a.enm(1)?,
                a.enm(2)?,
                self.native(a.handle(3)?)?,
                a.int(4)?,
            ),
            Op::FramebufferRenderbuffer => ctx.framebuffer_renderbuffer(
                a.enm(0)?,
                a.enm(1)?,
                a.enm(2)?,
                self.native(a.handle(3)?)?,
            ),
            Op::RenderbufferStorage => {
                ctx.renderbuffer_storage(a.enm(0)?, a.enm(1)?, a.int(2)?, a.int(3)?)
            }
            Op::VertexAttribPointer => ctx.vertex_attrib_pointer(
                a.uint(0)?,
                a.int(1)?,
                a.enm(2)?,
                a.boolean(3)?,
                a.int(4)?,
                a.uint(5)? as usize,
            ),
            Op::EnableVertexAttribArray => ctx.enable_vertex_attrib_array(a.uint(0)?),
            Op::DisableVertexAttribArray => ctx.disable_vertex_attrib_array(a.uint(0)?),
            Op::UniformFloats => {
                ctx.uniform_floats(self.location(a.handle(0)?)?, a.int(1)?, a.floats(2)?)
            }
            Op::UniformInts => ctx.uniform_ints(self.location(a.handle(0)?)?, a.int(1)?, a.ints(2)?),
            Op::UniformMatrix => ctx.uniform_matrix(
                self.location(a.handle(0)?)?,
                a.int(1)?,
                a.boolean(2)?,
                a.floats(3)?,
            ),

            Op::Clear => ctx.clear(a.enm(0)?),
            Op::DrawArrays => ctx.draw_arrays(a.enm(0)?, a.int(1)?, a.int(2)?),
            Op::DrawElements => ctx.draw_elements(a.enm(0)?, a.int(1)?, a.enm(2)?, a.uint(3)? as usize),
            Op::Flush => ctx.flush(),

            Op::GetAttribLocation => {
                let location = ctx.get_attrib_location(self.native(a.handle(0)?)?, a.string(1)?);
                return Ok(Some(bytes::encode_int(location)));
            }
            Op::GetProgramParameter => {
                let value = ctx.get_program_parameter(self.native(a.handle(0)?)?, a.enm(1)?);
                return Ok(Some(bytes::encode_int(value)));
            }
            Op::GetShaderParameter => {
                let value = ctx.get_shader_parameter(self.native(a.handle(0)?)?, a.enm(1)?);
                return Ok(Some(bytes::encode_int(value)));
            }
            Op::GetProgramInfoLog => {
                let log = ctx.get_program_info_log(self.native(a.handle(0)?)?);
                return Ok(Some(bytes::encode_str(&log)));
            }
            Op::GetShaderInfoLog => {
                let log = ctx.get_shader_info_log(self.native(a.handle(0)?)?);
                return Ok(Some(bytes::encode_str(&log)));
            }
            Op::GetActiveAttrib => {
                let info = ctx.get_active_attrib(self.native(a.handle(0)?)?, a.uint(1)?);
                return Ok(Some(bytes::encode_active_info(info.as_ref())));
            }
            Op::GetActiveUniform => {
                let info = ctx.get_active_uniform(self.native(a.handle(0)?)?, a.uint(1)?);
                return Ok(Some(bytes::encode_active_info(info.as_ref())));
            }
            Op::GetError => return Ok(Some(bytes::encode_enum(ctx.get_error()))),
            Op::CheckFramebufferStatus => {
                let status = ctx.check_framebuffer_status(a.enm(0)?);
                return Ok(Some(bytes::encode_enum(status)));
            }
            Op::ReadPixels => {
                let pixels = ctx.read_pixels(a.int(0)?, a.int(1)?, a.int(2)?, a.int(3)?, a.enm(4)?, a.enm(5)?);
                return Ok(Some(pixels));
            }
            Op::Finish => {
                ctx.finish();
                return Ok(Some(Vec::new()));
            }
        }
        Ok(None)
    }
}

/// Typed access to a command's arguments.
struct Reader<'a> {
    op: Op,
    args: &'a [Arg],
}

impl<'a> Reader<'a> {
    fn get<T>(&self, i: usize, read: impl FnOnce(&'a Arg) -> Option<T>) -> Result<T, ExecError> {
        self.args.get(i).and_then(read).ok_or(ExecError::Malformed(self.op))
    }

    fn enm(&self, i: usize) -> Result<GLenum, ExecError> {
        self.get(i, Arg::as_enum)
    }

    fn int(&self, i: usize) -> Result<i32, ExecError> {
        self.get(i, Arg::as_int)
    }

    fn uint(&self, i: usize) -> Result<u32, ExecError> {
        self.get(i, |arg| arg.as_int().and_then(|v| u32::try_from(v).ok()))
    }

    fn float(&self, i: usize) -> Result<f32, ExecError> {
        self.get(i, Arg::as_float)
    }

    fn boolean(&self, i: usize) -> Result<bool, ExecError> {
        self.get(i, Arg::as_bool)
    }

    fn handle(&self, i: usize) -> Result<Handle, ExecError> {
        self.get(i, Arg::as_handle)
    }

    fn floats(&self, i: usize) -> Result<&'a [f32], ExecError> {
        self.get(i, Arg::as_floats)
    }

    fn ints(&self, i: usize) -> Result<&'a [i32], ExecError> {
        self.get(i, Arg::as_ints)
    }

    /// A blob, or `None` for an explicit null.
    fn bytes(&self, i: usize) -> Result<Option<&'a [u8]>, ExecError> {
        self.get(i, Arg::as_bytes)
    }

    fn string(&self, i: usize) -> Result<&'a str, ExecError> {
        self.get(i, Arg::as_str)
    }
}
