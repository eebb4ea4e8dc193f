//! Static dispatch table: one [`OpSpec`] per [`Op`], built once.
//!
//! An entry says how arguments are encoded and checked, whether the call
//! moves the mirrored state, which resource it creates or deletes, and how
//! its response payload is decoded. Adding a call means adding an [`Op`]
//! variant and one arm to [`spec_for`].

use gl::types::GLenum;
use glvirt_core::pixels::image_len;
use glvirt_core::{Arg, ArgKind, EncodeError, Op, ResourceKind};
use glvirt_state::params::is_tracked_capability;
use glvirt_state::validate::buffer_binding;
use glvirt_state::{GlState, StateLayout};
use once_cell::sync::Lazy;

use crate::bytes::Response;

use glvirt_core::ArgKind::{
    Bool as B, Bytes as By, BytesOrNull as BN, Enum as E, Float as F, Floats as Fs, Handle as H,
    Int as I, Ints as Is, Str as S,
};
use glvirt_core::ResourceKind::{
    Buffer, Framebuffer, Program, Renderbuffer, Shader, Texture, UniformLocation, VertexArray,
};

/// What an op-specific check can see.
pub struct CheckContext<'a> {
    pub op: Op,
    pub layout: &'a StateLayout,
    pub mirror: &'a GlState,
}

type Check = fn(&CheckContext<'_>, &[Arg]) -> Result<(), EncodeError>;

pub struct OpSpec {
    pub op: Op,
    pub signature: &'static [ArgKind],
    /// Expected resource kind of each handle argument, by position.
    pub handles: &'static [(usize, ResourceKind)],
    pub check: Option<Check>,
    /// Folds into the mirrored state.
    pub mirrors: bool,
    pub creates: Option<ResourceKind>,
    /// Releases the handle in argument 0.
    pub deletes: Option<ResourceKind>,
    /// Builds a program object without touching bindings.
    pub program_setup: bool,
    pub response: Option<Response>,
}

impl OpSpec {
    fn new(op: Op, signature: &'static [ArgKind]) -> Self {
        Self {
            op,
            signature,
            handles: &[],
            check: None,
            mirrors: false,
            creates: None,
            deletes: None,
            program_setup: false,
            response: None,
        }
    }

    fn handles(mut self, handles: &'static [(usize, ResourceKind)]) -> Self {
        self.handles = handles;
        self
    }

    fn check(mut self, check: Check) -> Self {
        self.check = Some(check);
        self
    }

    fn mirrored(mut self) -> Self {
        self.mirrors = true;
        self
    }

    fn creates(mut self, kind: ResourceKind) -> Self {
        self.creates = Some(kind);
        self
    }

    fn deletes(mut self, kind: ResourceKind) -> Self {
        self.deletes = Some(kind);
        self.handles = match kind {
            Texture => &[(0, Texture)],
            Buffer => &[(0, Buffer)],
            Framebuffer => &[(0, Framebuffer)],
            Renderbuffer => &[(0, Renderbuffer)],
            VertexArray => &[(0, VertexArray)],
            Program => &[(0, Program)],
            Shader => &[(0, Shader)],
            UniformLocation => &[(0, UniformLocation)],
        };
        self.mirrors = true;
        self
    }

    fn program_setup(mut self) -> Self {
        self.program_setup = true;
        self
    }

    fn responds(mut self, response: Response) -> Self {
        self.response = Some(response);
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.response.is_some()
    }

    /// Creation and deletion commands, run once per buffer on the consumer.
    pub fn is_lifecycle(&self) -> bool {
        self.creates.is_some() || self.deletes.is_some()
    }

    /// Run once when a render buffer is folded, in buffer order, and
    /// skipped whenever the frame is drawn.
    pub fn runs_at_fold(&self) -> bool {
        self.creates.is_some() || self.program_setup
    }

    /// Arity, shape and op-specific checks. Handle liveness is checked by
    /// the caller, which owns the registry.
    pub fn encode_check(&self, cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
        if args.len() != self.signature.len() {
            return Err(EncodeError::Arity {
                op: self.op,
                expected: self.signature.len(),
                got: args.len(),
            });
        }
        if let Some(index) = self
            .signature
            .iter()
            .zip(args)
            .position(|(kind, arg)| !kind.accepts(arg))
        {
            return Err(EncodeError::ArgShape { op: self.op, index });
        }
        match self.check {
            Some(check) => check(cx, args),
            None => Ok(()),
        }
    }
}

static TABLE: Lazy<Vec<OpSpec>> = Lazy::new(|| Op::ALL.iter().map(|&op| spec_for(op)).collect());

/// The table entry for `op`.
pub fn spec(op: Op) -> &'static OpSpec {
    &TABLE[op as usize]
}

fn spec_for(op: Op) -> OpSpec {
    let spec = OpSpec::new;
    match op {
        Op::UseProgram => spec(op, &[H]).handles(&[(0, Program)]).mirrored(),
        Op::BindBuffer => spec(op, &[E, H])
            .handles(&[(1, Buffer)])
            .check(buffer_target)
            .mirrored(),
        Op::BindBufferBase => spec(op, &[E, I, H])
            .handles(&[(2, Buffer)])
            .check(indexed_binding)
            .mirrored(),
        Op::BindFramebuffer => spec(op, &[E, H])
            .handles(&[(1, Framebuffer)])
            .check(framebuffer_target)
            .mirrored(),
        Op::BindRenderbuffer => spec(op, &[E, H])
            .handles(&[(1, Renderbuffer)])
            .check(renderbuffer_target)
            .mirrored(),
        Op::BindVertexArray => spec(op, &[H])
            .handles(&[(0, VertexArray)])
            .check(vertex_arrays)
            .mirrored(),
        Op::ActiveTexture => spec(op, &[E]).check(texture_unit).mirrored(),
        Op::BindTexture => spec(op, &[E, H])
            .handles(&[(1, Texture)])
            .check(texture_target)
            .mirrored(),
        Op::TexParameteri => spec(op, &[E, E, I]).check(texture_parameter).mirrored(),
        Op::TexParameterf => spec(op, &[E, E, F]).check(texture_parameter).mirrored(),

        Op::Enable | Op::Disable => spec(op, &[E]).check(capability).mirrored(),
        Op::CullFace | Op::DepthFunc | Op::FrontFace | Op::BlendEquation => {
            spec(op, &[E]).mirrored()
        }
        Op::ClearColor | Op::BlendColor => spec(op, &[F, F, F, F]).mirrored(),
        Op::ClearDepth => spec(op, &[F]).mirrored(),
        Op::LineWidth => spec(op, &[F]).check(positive_width).mirrored(),
        Op::ClearStencil => spec(op, &[I]).mirrored(),
        Op::Scissor | Op::Viewport => spec(op, &[I, I, I, I]).check(non_negative_size).mirrored(),
        Op::BlendFunc | Op::BlendEquationSeparate => spec(op, &[E, E]).mirrored(),
        Op::BlendFuncSeparate => spec(op, &[E, E, E, E]).mirrored(),
        Op::ColorMask => spec(op, &[B, B, B, B]).mirrored(),
        Op::DepthMask => spec(op, &[B]).mirrored(),
        Op::DepthRange | Op::PolygonOffset => spec(op, &[F, F]).mirrored(),
        Op::PixelStorei => spec(op, &[E, I]).check(pixel_store).mirrored(),

        Op::CreateTexture => spec(op, &[]).creates(Texture),
        Op::CreateBuffer => spec(op, &[]).creates(Buffer),
        Op::CreateFramebuffer => spec(op, &[]).creates(Framebuffer),
        Op::CreateRenderbuffer => spec(op, &[]).creates(Renderbuffer),
        Op::CreateVertexArray => spec(op, &[]).check(vertex_arrays).creates(VertexArray),
        Op::CreateProgram => spec(op, &[]).creates(Program),
        Op::CreateShader => spec(op, &[E]).check(shader_stage).creates(Shader),
        Op::GetUniformLocation => spec(op, &[H, S])
            .handles(&[(0, Program)])
            .creates(UniformLocation),
        Op::DeleteTexture => spec(op, &[H]).deletes(Texture),
        Op::DeleteBuffer => spec(op, &[H]).deletes(Buffer),
        Op::DeleteFramebuffer => spec(op, &[H]).deletes(Framebuffer),
        Op::DeleteRenderbuffer => spec(op, &[H]).deletes(Renderbuffer),
        Op::DeleteVertexArray => spec(op, &[H]).check(vertex_arrays).deletes(VertexArray),
        Op::DeleteProgram => spec(op, &[H]).deletes(Program),
        Op::DeleteShader => spec(op, &[H]).deletes(Shader),

        Op::ShaderSource => spec(op, &[H, S]).handles(&[(0, Shader)]).program_setup(),
        Op::CompileShader => spec(op, &[H]).handles(&[(0, Shader)]).program_setup(),
        Op::AttachShader => spec(op, &[H, H])
            .handles(&[(0, Program), (1, Shader)])
            .program_setup(),
        Op::LinkProgram => spec(op, &[H]).handles(&[(0, Program)]).program_setup(),
        Op::BindAttribLocation => spec(op, &[H, I, S])
            .handles(&[(0, Program)])
            .check(attrib_index)
            .program_setup(),
        Op::BufferData => spec(op, &[E, I, BN, E]).check(buffer_data),
        Op::BufferSubData => spec(op, &[E, I, By]).check(buffer_sub_data),
        Op::TexImage2D => spec(op, &[E, I, I, I, I, E, E, BN]).check(tex_image),
        Op::TexSubImage2D => spec(op, &[E, I, I, I, I, I, E, E, By]).check(tex_sub_image),
        Op::GenerateMipmap => spec(op, &[E]).check(texture_target),
        Op::FramebufferTexture2D => spec(op, &[E, E, E, H, I])
            .handles(&[(3, Texture)])
            .check(framebuffer_target),
        Op::FramebufferRenderbuffer => spec(op, &[E, E, E, H])
            .handles(&[(3, Renderbuffer)])
            .check(framebuffer_target),
        Op::RenderbufferStorage => spec(op, &[E, E, I, I]).check(renderbuffer_target),
        Op::VertexAttribPointer => spec(op, &[I, I, E, B, I, I]).check(attrib_pointer),
        Op::EnableVertexAttribArray | Op::DisableVertexAttribArray => {
            spec(op, &[I]).check(attrib_index_first)
        }
        Op::UniformFloats => spec(op, &[H, I, Fs])
            .handles(&[(0, UniformLocation)])
            .check(uniform_vector),
        Op::UniformInts => spec(op, &[H, I, Is])
            .handles(&[(0, UniformLocation)])
            .check(uniform_vector),
        Op::UniformMatrix => spec(op, &[H, I, B, Fs])
            .handles(&[(0, UniformLocation)])
            .check(uniform_matrix),

        Op::Clear => spec(op, &[E]),
        Op::DrawArrays => spec(op, &[E, I, I]),
        Op::DrawElements => spec(op, &[E, I, E, I]),
        Op::Flush => spec(op, &[]),

        Op::GetAttribLocation => spec(op, &[H, S])
            .handles(&[(0, Program)])
            .responds(Response::Int),
        Op::GetProgramParameter => spec(op, &[H, E])
            .handles(&[(0, Program)])
            .responds(Response::Int),
        Op::GetShaderParameter => spec(op, &[H, E])
            .handles(&[(0, Shader)])
            .responds(Response::Int),
        Op::GetProgramInfoLog => spec(op, &[H])
            .handles(&[(0, Program)])
            .responds(Response::Str),
        Op::GetShaderInfoLog => spec(op, &[H])
            .handles(&[(0, Shader)])
            .responds(Response::Str),
        Op::GetActiveAttrib | Op::GetActiveUniform => spec(op, &[H, I])
            .handles(&[(0, Program)])
            .responds(Response::ActiveInfo),
        Op::GetError => spec(op, &[]).responds(Response::Enum),
        Op::CheckFramebufferStatus => spec(op, &[E])
            .check(framebuffer_target)
            .responds(Response::Enum),
        Op::ReadPixels => spec(op, &[I, I, I, I, E, E])
            .check(read_pixels)
            .responds(Response::Pixels),
        Op::Finish => spec(op, &[]).responds(Response::Empty),
    }
}

// ---------------------------------------------------------------------------
// Op-specific checks
// ---------------------------------------------------------------------------

fn enm(args: &[Arg], i: usize) -> GLenum {
    args[i].as_enum().unwrap_or_default()
}

fn int(args: &[Arg], i: usize) -> i32 {
    args[i].as_int().unwrap_or_default()
}

fn float(args: &[Arg], i: usize) -> f32 {
    args[i].as_float().unwrap_or_default()
}

fn bad_enum(cx: &CheckContext<'_>, value: GLenum) -> EncodeError {
    EncodeError::BadEnum { op: cx.op, value }
}

fn texture_unit(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    let unit = enm(args, 0).wrapping_sub(gl::TEXTURE0);
    if unit >= cx.layout.texture_units {
        return Err(EncodeError::TextureUnit {
            op: cx.op,
            unit,
            max: cx.layout.texture_units - 1,
        });
    }
    Ok(())
}

fn texture_target(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    let target = enm(args, 0);
    if cx.layout.tracks_texture_target(target) {
        Ok(())
    } else {
        Err(bad_enum(cx, target))
    }
}

fn texture_parameter(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    texture_target(cx, args)?;
    let pname = enm(args, 1);
    if cx.layout.texture_param(pname).is_none() {
        return Err(bad_enum(cx, pname));
    }
    Ok(())
}

fn buffer_target(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    let target = enm(args, 0);
    match buffer_binding(target) {
        Some(_) => Ok(()),
        None => Err(bad_enum(cx, target)),
    }
}

fn indexed_binding(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    let target = enm(args, 0);
    if target != gl::UNIFORM_BUFFER {
        return Err(bad_enum(cx, target));
    }
    let index = int(args, 1);
    if index < 0 || index as u32 >= cx.layout.indexed_uniform_bindings {
        return Err(EncodeError::ArgShape { op: cx.op, index: 1 });
    }
    Ok(())
}

fn framebuffer_target(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    match enm(args, 0) {
        gl::FRAMEBUFFER | gl::DRAW_FRAMEBUFFER | gl::READ_FRAMEBUFFER => Ok(()),
        other => Err(bad_enum(cx, other)),
    }
}

fn renderbuffer_target(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    match enm(args, 0) {
        gl::RENDERBUFFER => Ok(()),
        other => Err(bad_enum(cx, other)),
    }
}

fn vertex_arrays(cx: &CheckContext<'_>, _: &[Arg]) -> Result<(), EncodeError> {
    if cx.layout.vertex_arrays {
        Ok(())
    } else {
        Err(EncodeError::Unavailable(cx.op))
    }
}

fn capability(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    let cap = enm(args, 0);
    // Untracked but valid toggles still reach the consumer.
    if is_tracked_capability(cap) || matches!(cap, gl::PROGRAM_POINT_SIZE | gl::RASTERIZER_DISCARD)
    {
        Ok(())
    } else {
        Err(bad_enum(cx, cap))
    }
}

fn shader_stage(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    match enm(args, 0) {
        gl::VERTEX_SHADER | gl::FRAGMENT_SHADER => Ok(()),
        other => Err(bad_enum(cx, other)),
    }
}

fn non_negative_size(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    for index in [2, 3] {
        if int(args, index) < 0 {
            return Err(EncodeError::ArgShape { op: cx.op, index });
        }
    }
    Ok(())
}

fn positive_width(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    if float(args, 0) > 0.0 {
        Ok(())
    } else {
        Err(EncodeError::ArgShape { op: cx.op, index: 0 })
    }
}

fn pixel_store(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    let pname = enm(args, 0);
    if !matches!(pname, gl::UNPACK_ALIGNMENT | gl::PACK_ALIGNMENT) {
        return Err(bad_enum(cx, pname));
    }
    if !matches!(int(args, 1), 1 | 2 | 4 | 8) {
        return Err(EncodeError::ArgShape { op: cx.op, index: 1 });
    }
    Ok(())
}

fn attrib_index(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    if int(args, 1) < 0 {
        return Err(EncodeError::ArgShape { op: cx.op, index: 1 });
    }
    Ok(())
}

fn attrib_index_first(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    if int(args, 0) < 0 {
        return Err(EncodeError::ArgShape { op: cx.op, index: 0 });
    }
    Ok(())
}

fn attrib_pointer(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    attrib_index_first(cx, args)?;
    if !(1..=4).contains(&int(args, 1)) {
        return Err(EncodeError::ArgShape { op: cx.op, index: 1 });
    }
    for index in [4, 5] {
        if int(args, index) < 0 {
            return Err(EncodeError::ArgShape { op: cx.op, index });
        }
    }
    Ok(())
}

fn buffer_data(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    buffer_target(cx, args)?;
    let size = int(args, 1);
    if size < 0 {
        return Err(EncodeError::ArgShape { op: cx.op, index: 1 });
    }
    if let Some(Some(data)) = args[2].as_bytes() {
        if data.len() != size as usize {
            return Err(EncodeError::ArrayLength {
                op: cx.op,
                index: 2,
                expected: size.to_string(),
                got: data.len(),
            });
        }
    }
    Ok(())
}

fn buffer_sub_data(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    buffer_target(cx, args)?;
    if int(args, 1) < 0 {
        return Err(EncodeError::ArgShape { op: cx.op, index: 1 });
    }
    Ok(())
}

fn image_target(cx: &CheckContext<'_>, target: GLenum) -> Result<(), EncodeError> {
    let cube_face = (gl::TEXTURE_CUBE_MAP_POSITIVE_X..=gl::TEXTURE_CUBE_MAP_NEGATIVE_Z)
        .contains(&target);
    if target == gl::TEXTURE_2D || (cube_face && cx.layout.tracks_texture_target(gl::TEXTURE_CUBE_MAP))
    {
        Ok(())
    } else {
        Err(bad_enum(cx, target))
    }
}

fn unpack_alignment(cx: &CheckContext<'_>) -> u32 {
    cx.mirror
        .get(gl::UNPACK_ALIGNMENT)
        .and_then(|v| v.as_int())
        .unwrap_or(4) as u32
}

/// Pixel data must cover exactly `width` x `height` at the mirrored unpack
/// alignment, with or without padding after the last row.
fn pixel_length(
    cx: &CheckContext<'_>,
    (width, height): (i32, i32),
    (format, ty): (GLenum, GLenum),
    data: &[u8],
) -> Result<(), EncodeError> {
    let (tight, padded) = image_len(width as u32, height as u32, format, ty, unpack_alignment(cx));
    if data.len() == tight || data.len() == padded {
        return Ok(());
    }
    Err(EncodeError::PixelLength {
        op: cx.op,
        expected: tight,
        got: data.len(),
    })
}

fn image_size(cx: &CheckContext<'_>, args: &[Arg], first: usize) -> Result<(i32, i32), EncodeError> {
    let (width, height) = (int(args, first), int(args, first + 1));
    if width < 0 {
        return Err(EncodeError::ArgShape { op: cx.op, index: first });
    }
    if height < 0 {
        return Err(EncodeError::ArgShape { op: cx.op, index: first + 1 });
    }
    Ok((width, height))
}

fn tex_image(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    image_target(cx, enm(args, 0))?;
    let size = image_size(cx, args, 3)?;
    match args[7].as_bytes() {
        Some(Some(data)) => pixel_length(cx, size, (enm(args, 5), enm(args, 6)), data),
        _ => Ok(()),
    }
}

fn tex_sub_image(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    image_target(cx, enm(args, 0))?;
    let size = image_size(cx, args, 4)?;
    let data = args[8].as_bytes().flatten().unwrap_or_default();
    pixel_length(cx, size, (enm(args, 6), enm(args, 7)), data)
}

fn read_pixels(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    image_size(cx, args, 2).map(drop)
}

fn uniform_vector(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    let components = int(args, 1);
    if !(1..=4).contains(&components) {
        return Err(EncodeError::ArgShape { op: cx.op, index: 1 });
    }
    let len = match &args[2] {
        Arg::Floats(v) => v.len(),
        Arg::Ints(v) => v.len(),
        _ => 0,
    };
    array_multiple(cx, 2, components as usize, len)
}

fn uniform_matrix(cx: &CheckContext<'_>, args: &[Arg]) -> Result<(), EncodeError> {
    let dim = int(args, 1);
    if !(2..=4).contains(&dim) {
        return Err(EncodeError::ArgShape { op: cx.op, index: 1 });
    }
    let len = args[3].as_floats().map_or(0, <[f32]>::len);
    array_multiple(cx, 3, (dim * dim) as usize, len)
}

fn array_multiple(
    cx: &CheckContext<'_>,
    index: usize,
    unit: usize,
    len: usize,
) -> Result<(), EncodeError> {
    if len == 0 || len % unit != 0 {
        return Err(EncodeError::ArrayLength {
            op: cx.op,
            index,
            expected: format!("a non-zero multiple of {unit}"),
            got: len,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cx<'a>(op: Op, layout: &'a StateLayout, mirror: &'a GlState) -> CheckContext<'a> {
        CheckContext { op, layout, mirror }
    }

    #[test]
    fn table_is_indexed_by_op() {
        for &op in Op::ALL {
            assert_eq!(spec(op).op, op);
        }
    }

    #[test]
    fn blocking_ops_never_mirror() {
        for &op in Op::ALL {
            let s = spec(op);
            assert!(!(s.is_blocking() && s.mirrors), "{op}");
            assert!(!(s.is_blocking() && s.is_lifecycle()), "{op}");
        }
    }

    #[test]
    fn rejects_wrong_arity_and_shape() {
        let layout = StateLayout::default();
        let mirror = GlState::new(layout.clone());
        let s = spec(Op::Viewport);
        let c = cx(Op::Viewport, &layout, &mirror);
        assert!(matches!(
            s.encode_check(&c, &[Arg::Int(0)]),
            Err(EncodeError::Arity { expected: 4, got: 1, .. })
        ));
        assert!(matches!(
            s.encode_check(&c, &[Arg::Int(0), Arg::Float(0.0), Arg::Int(1), Arg::Int(1)]),
            Err(EncodeError::ArgShape { index: 1, .. })
        ));
    }

    #[test]
    fn fold_time_ops_leave_state_alone() {
        for &op in Op::ALL {
            let s = spec(op);
            if s.runs_at_fold() {
                assert!(!s.mirrors, "{op}");
                assert!(!s.is_blocking(), "{op}");
            }
        }
        assert!(spec(Op::LinkProgram).runs_at_fold());
        assert!(spec(Op::GetUniformLocation).runs_at_fold());
        assert!(!spec(Op::BufferData).runs_at_fold());
    }

    #[test]
    fn line_width_must_be_positive() {
        let layout = StateLayout::default();
        let mirror = GlState::new(layout.clone());
        let c = cx(Op::LineWidth, &layout, &mirror);
        let s = spec(Op::LineWidth);
        assert!(s.encode_check(&c, &[Arg::Float(2.0)]).is_ok());
        assert!(matches!(
            s.encode_check(&c, &[Arg::Float(0.0)]),
            Err(EncodeError::ArgShape { index: 0, .. })
        ));
    }

    #[test]
    fn texture_unit_is_range_checked() {
        let layout = StateLayout::default();
        let mirror = GlState::new(layout.clone());
        let c = cx(Op::ActiveTexture, &layout, &mirror);
        let s = spec(Op::ActiveTexture);
        assert!(s.encode_check(&c, &[Arg::Enum(gl::TEXTURE0 + 15)]).is_ok());
        assert!(matches!(
            s.encode_check(&c, &[Arg::Enum(gl::TEXTURE0 + 16)]),
            Err(EncodeError::TextureUnit { unit: 16, max: 15, .. })
        ));
    }

    #[test]
    fn pixel_length_follows_unpack_alignment() {
        let layout = StateLayout::default();
        let mut mirror = GlState::new(layout.clone());
        let upload = |data: Vec<u8>| {
            vec![
                Arg::Enum(gl::TEXTURE_2D),
                Arg::Int(0),
                Arg::Int(gl::RGB as i32),
                Arg::Int(3),
                Arg::Int(2),
                Arg::Enum(gl::RGB),
                Arg::Enum(gl::UNSIGNED_BYTE),
                Arg::Bytes(data),
            ]
        };
        let s = spec(Op::TexImage2D);
        {
            let c = cx(Op::TexImage2D, &layout, &mirror);
            assert!(s.encode_check(&c, &upload(vec![0; 24])).is_ok());
            assert!(s.encode_check(&c, &upload(vec![0; 21])).is_ok());
            assert!(matches!(
                s.encode_check(&c, &upload(vec![0; 18])),
                Err(EncodeError::PixelLength { expected: 21, got: 18, .. })
            ));
        }
        mirror.process_one_command(&glvirt_core::Command::new(
            Op::PixelStorei,
            vec![Arg::Enum(gl::UNPACK_ALIGNMENT), Arg::Int(1)],
        ));
        let c = cx(Op::TexImage2D, &layout, &mirror);
        assert!(s.encode_check(&c, &upload(vec![0; 18])).is_ok());
    }

    #[test]
    fn uniform_payloads_must_fill_whole_vectors() {
        let layout = StateLayout::default();
        let mirror = GlState::new(layout.clone());
        let c = cx(Op::UniformFloats, &layout, &mirror);
        let loc = Arg::Handle(glvirt_core::Handle::from_raw(1));
        let s = spec(Op::UniformFloats);
        assert!(s
            .encode_check(&c, &[loc.clone(), Arg::Int(3), Arg::Floats(vec![0.0; 6])])
            .is_ok());
        assert!(matches!(
            s.encode_check(&c, &[loc, Arg::Int(3), Arg::Floats(vec![0.0; 4])]),
            Err(EncodeError::ArrayLength { index: 2, got: 4, .. })
        ));
    }

    #[test]
    fn indexed_bindings_are_limited_to_tracked_uniform_slots() {
        let layout = StateLayout::default();
        let mirror = GlState::new(layout.clone());
        let c = cx(Op::BindBufferBase, &layout, &mirror);
        let s = spec(Op::BindBufferBase);
        let args = |target, index| vec![Arg::Enum(target), Arg::Int(index), Arg::Handle(Default::default())];
        assert!(s.encode_check(&c, &args(gl::UNIFORM_BUFFER, 7)).is_ok());
        assert!(s.encode_check(&c, &args(gl::UNIFORM_BUFFER, 8)).is_err());
        assert!(s.encode_check(&c, &args(gl::ARRAY_BUFFER, 0)).is_err());
    }
}
