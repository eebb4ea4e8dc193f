//! Typed parameter values and the tables that drive capture, defaults and
//! application of every tracked scalar and array parameter.

use gl::types::GLenum;
use glvirt_core::Handle;

use crate::context::GlContext;
use crate::state::StateLayout;

/// Anisotropic filtering level (`EXT`/`ARB_texture_filter_anisotropic`).
pub const TEXTURE_MAX_ANISOTROPY: GLenum = 0x84FE;

/// One tracked parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i32),
    Enum(GLenum),
    Float(f32),
    Handle(Handle),
    Ints2([i32; 2]),
    Ints4([i32; 4]),
    Floats2([f32; 2]),
    Floats4([f32; 4]),
    Bools4([bool; 4]),
}

impl ParamValue {
    pub fn as_handle(&self) -> Option<Handle> {
        match *self {
            ParamValue::Handle(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match *self {
            ParamValue::Int(v) => Some(v),
            ParamValue::Enum(v) => Some(v as i32),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match *self {
            ParamValue::Float(v) => Some(v),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Toggles
// ---------------------------------------------------------------------------

/// Tracked capabilities and their fresh-context value.
pub const CAPABILITIES: [(GLenum, bool); 9] = [
    (gl::BLEND, false),
    (gl::CULL_FACE, false),
    (gl::DEPTH_TEST, false),
    (gl::DITHER, true),
    (gl::SCISSOR_TEST, false),
    (gl::STENCIL_TEST, false),
    (gl::POLYGON_OFFSET_FILL, false),
    (gl::SAMPLE_COVERAGE, false),
    (gl::SAMPLE_ALPHA_TO_COVERAGE, false),
];

pub fn is_tracked_capability(cap: GLenum) -> bool {
    CAPABILITIES.iter().any(|&(c, _)| c == cap)
}

// ---------------------------------------------------------------------------
// Scalar and array values
// ---------------------------------------------------------------------------

/// Clear and blend colors are clamped to `[0, 1]` when specified.
pub fn unit_color(color: [f32; 4]) -> [f32; 4] {
    color.map(|c| c.clamp(0.0, 1.0))
}

/// A value group, keyed by the first pname that reads it back.
pub struct ValueParam {
    pub key: GLenum,
    pub default: fn(&StateLayout) -> ParamValue,
    pub capture: fn(&mut dyn GlContext) -> ParamValue,
    pub apply: fn(&mut dyn GlContext, ParamValue),
}

fn ints<const N: usize>(ctx: &mut dyn GlContext, pname: GLenum) -> [i32; N] {
    let mut out = [0; N];
    ctx.get_integers(pname, &mut out);
    out
}

fn floats<const N: usize>(ctx: &mut dyn GlContext, pname: GLenum) -> [f32; N] {
    let mut out = [0.0; N];
    ctx.get_floats(pname, &mut out);
    out
}

fn full_drawable(layout: &StateLayout) -> ParamValue {
    let (w, h) = layout.drawable;
    ParamValue::Ints4([0, 0, w as i32, h as i32])
}

pub static VALUE_PARAMS: &[ValueParam] = &[
    ValueParam {
        key: gl::CULL_FACE_MODE,
        default: |_| ParamValue::Enum(gl::BACK),
        capture: |ctx| ParamValue::Enum(ctx.get_integer(gl::CULL_FACE_MODE) as GLenum),
        apply: |ctx, v| {
            if let ParamValue::Enum(mode) = v {
                ctx.cull_face(mode)
            }
        },
    },
    ValueParam {
        key: gl::DEPTH_FUNC,
        default: |_| ParamValue::Enum(gl::LESS),
        capture: |ctx| ParamValue::Enum(ctx.get_integer(gl::DEPTH_FUNC) as GLenum),
        apply: |ctx, v| {
            if let ParamValue::Enum(func) = v {
                ctx.depth_func(func)
            }
        },
    },
    ValueParam {
        key: gl::FRONT_FACE,
        default: |_| ParamValue::Enum(gl::CCW),
        capture: |ctx| ParamValue::Enum(ctx.get_integer(gl::FRONT_FACE) as GLenum),
        apply: |ctx, v| {
            if let ParamValue::Enum(mode) = v {
                ctx.front_face(mode)
            }
        },
    },
    ValueParam {
        key: gl::COLOR_CLEAR_VALUE,
        default: |_| ParamValue::Floats4([0.0; 4]),
        capture: |ctx| ParamValue::Floats4(floats(ctx, gl::COLOR_CLEAR_VALUE)),
        apply: |ctx, v| {
            if let ParamValue::Floats4([r, g, b, a]) = v {
                ctx.clear_color(r, g, b, a)
            }
        },
    },
    ValueParam {
        key: gl::DEPTH_CLEAR_VALUE,
        default: |_| ParamValue::Float(1.0),
        capture: |ctx| ParamValue::Float(ctx.get_float(gl::DEPTH_CLEAR_VALUE)),
        apply: |ctx, v| {
            if let ParamValue::Float(depth) = v {
                ctx.clear_depth(depth)
            }
        },
    },
    ValueParam {
        key: gl::STENCIL_CLEAR_VALUE,
        default: |_| ParamValue::Int(0),
        capture: |ctx| ParamValue::Int(ctx.get_integer(gl::STENCIL_CLEAR_VALUE)),
        apply: |ctx, v| {
            if let ParamValue::Int(s) = v {
                ctx.clear_stencil(s)
            }
        },
    },
    ValueParam {
        key: gl::SCISSOR_BOX,
        default: full_drawable,
        capture: |ctx| ParamValue::Ints4(ints(ctx, gl::SCISSOR_BOX)),
        apply: |ctx, v| {
            if let ParamValue::Ints4([x, y, w, h]) = v {
                ctx.scissor(x, y, w, h)
            }
        },
    },
    ValueParam {
        key: gl::VIEWPORT,
        default: full_drawable,
        capture: |ctx| ParamValue::Ints4(ints(ctx, gl::VIEWPORT)),
        apply: |ctx, v| {
            if let ParamValue::Ints4([x, y, w, h]) = v {
                ctx.viewport(x, y, w, h)
            }
        },
    },
    ValueParam {
        key: gl::BLEND_COLOR,
        default: |_| ParamValue::Floats4([0.0; 4]),
        capture: |ctx| ParamValue::Floats4(floats(ctx, gl::BLEND_COLOR)),
        apply: |ctx, v| {
            if let ParamValue::Floats4([r, g, b, a]) = v {
                ctx.blend_color(r, g, b, a)
            }
        },
    },
    // [src_rgb, dst_rgb, src_alpha, dst_alpha]
    ValueParam {
        key: gl::BLEND_SRC_RGB,
        default: |_| {
            ParamValue::Ints4([gl::ONE as i32, gl::ZERO as i32, gl::ONE as i32, gl::ZERO as i32])
        },
        capture: |ctx| {
            ParamValue::Ints4([
                ctx.get_integer(gl::BLEND_SRC_RGB),
                ctx.get_integer(gl::BLEND_DST_RGB),
                ctx.get_integer(gl::BLEND_SRC_ALPHA),
                ctx.get_integer(gl::BLEND_DST_ALPHA),
            ])
        },
        apply: |ctx, v| {
            if let ParamValue::Ints4([sr, dr, sa, da]) = v {
                ctx.blend_func_separate(sr as GLenum, dr as GLenum, sa as GLenum, da as GLenum)
            }
        },
    },
    // [rgb, alpha]
    ValueParam {
        key: gl::BLEND_EQUATION_RGB,
        default: |_| ParamValue::Ints2([gl::FUNC_ADD as i32; 2]),
        capture: |ctx| {
            ParamValue::Ints2([
                ctx.get_integer(gl::BLEND_EQUATION_RGB),
                ctx.get_integer(gl::BLEND_EQUATION_ALPHA),
            ])
        },
        apply: |ctx, v| {
            if let ParamValue::Ints2([rgb, alpha]) = v {
                ctx.blend_equation_separate(rgb as GLenum, alpha as GLenum)
            }
        },
    },
    ValueParam {
        key: gl::COLOR_WRITEMASK,
        default: |_| ParamValue::Bools4([true; 4]),
        capture: |ctx| {
            let mut out = [false; 4];
            ctx.get_booleans(gl::COLOR_WRITEMASK, &mut out);
            ParamValue::Bools4(out)
        },
        apply: |ctx, v| {
            if let ParamValue::Bools4([r, g, b, a]) = v {
                ctx.color_mask(r, g, b, a)
            }
        },
    },
    ValueParam {
        key: gl::DEPTH_WRITEMASK,
        default: |_| ParamValue::Bool(true),
        capture: |ctx| {
            let mut out = [false];
            ctx.get_booleans(gl::DEPTH_WRITEMASK, &mut out);
            ParamValue::Bool(out[0])
        },
        apply: |ctx, v| {
            if let ParamValue::Bool(flag) = v {
                ctx.depth_mask(flag)
            }
        },
    },
    ValueParam {
        key: gl::DEPTH_RANGE,
        default: |_| ParamValue::Floats2([0.0, 1.0]),
        capture: |ctx| ParamValue::Floats2(floats(ctx, gl::DEPTH_RANGE)),
        apply: |ctx, v| {
            if let ParamValue::Floats2([near, far]) = v {
                ctx.depth_range(near, far)
            }
        },
    },
    ValueParam {
        key: gl::LINE_WIDTH,
        default: |_| ParamValue::Float(1.0),
        capture: |ctx| ParamValue::Float(ctx.get_float(gl::LINE_WIDTH)),
        apply: |ctx, v| {
            if let ParamValue::Float(width) = v {
                ctx.line_width(width)
            }
        },
    },
    // [factor, units]
    ValueParam {
        key: gl::POLYGON_OFFSET_FACTOR,
        default: |_| ParamValue::Floats2([0.0, 0.0]),
        capture: |ctx| {
            ParamValue::Floats2([
                ctx.get_float(gl::POLYGON_OFFSET_FACTOR),
                ctx.get_float(gl::POLYGON_OFFSET_UNITS),
            ])
        },
        apply: |ctx, v| {
            if let ParamValue::Floats2([factor, units]) = v {
                ctx.polygon_offset(factor, units)
            }
        },
    },
    ValueParam {
        key: gl::UNPACK_ALIGNMENT,
        default: |_| ParamValue::Int(4),
        capture: |ctx| ParamValue::Int(ctx.get_integer(gl::UNPACK_ALIGNMENT)),
        apply: |ctx, v| {
            if let ParamValue::Int(align) = v {
                ctx.pixel_store_i(gl::UNPACK_ALIGNMENT, align)
            }
        },
    },
    ValueParam {
        key: gl::PACK_ALIGNMENT,
        default: |_| ParamValue::Int(4),
        capture: |ctx| ParamValue::Int(ctx.get_integer(gl::PACK_ALIGNMENT)),
        apply: |ctx, v| {
            if let ParamValue::Int(align) = v {
                ctx.pixel_store_i(gl::PACK_ALIGNMENT, align)
            }
        },
    },
];

pub fn value_param(key: GLenum) -> Option<&'static ValueParam> {
    VALUE_PARAMS.iter().find(|p| p.key == key)
}

// ---------------------------------------------------------------------------
// Texture sampling parameters
// ---------------------------------------------------------------------------

/// How a texture parameter is stored and read back.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TexParamKind {
    Int,
    Float,
}

pub struct TextureParam {
    pub pname: GLenum,
    pub kind: TexParamKind,
    pub default: ParamValue,
}

const fn int_param(pname: GLenum, default: GLenum) -> TextureParam {
    TextureParam {
        pname,
        kind: TexParamKind::Int,
        default: ParamValue::Int(default as i32),
    }
}

const fn float_param(pname: GLenum, default: f32) -> TextureParam {
    TextureParam {
        pname,
        kind: TexParamKind::Float,
        default: ParamValue::Float(default),
    }
}

/// Always-tracked sampling parameters.
pub static TEXTURE_PARAMS: [TextureParam; 11] = [
    int_param(gl::TEXTURE_MIN_FILTER, gl::NEAREST_MIPMAP_LINEAR),
    int_param(gl::TEXTURE_MAG_FILTER, gl::LINEAR),
    int_param(gl::TEXTURE_WRAP_S, gl::REPEAT),
    int_param(gl::TEXTURE_WRAP_T, gl::REPEAT),
    int_param(gl::TEXTURE_WRAP_R, gl::REPEAT),
    int_param(gl::TEXTURE_COMPARE_MODE, gl::NONE),
    int_param(gl::TEXTURE_COMPARE_FUNC, gl::LEQUAL),
    float_param(gl::TEXTURE_MIN_LOD, -1000.0),
    float_param(gl::TEXTURE_MAX_LOD, 1000.0),
    int_param(gl::TEXTURE_BASE_LEVEL, 0),
    int_param(gl::TEXTURE_MAX_LEVEL, 1000),
];

/// Tracked only when the device exposes anisotropic filtering.
pub static ANISOTROPY_PARAM: TextureParam = float_param(TEXTURE_MAX_ANISOTROPY, 1.0);

/// Store a texture parameter the way GL converts it for its type.
pub fn normalize_tex_param(kind: TexParamKind, value: ParamValue) -> Option<ParamValue> {
    match (kind, value) {
        (TexParamKind::Int, ParamValue::Int(v)) => Some(ParamValue::Int(v)),
        (TexParamKind::Int, ParamValue::Float(v)) => Some(ParamValue::Int(v as i32)),
        (TexParamKind::Float, ParamValue::Float(v)) => Some(ParamValue::Float(v)),
        (TexParamKind::Float, ParamValue::Int(v)) => Some(ParamValue::Float(v as f32)),
        _ => None,
    }
}

pub fn apply_tex_param(ctx: &mut dyn GlContext, target: GLenum, pname: GLenum, value: ParamValue) {
    match value {
        ParamValue::Int(v) => ctx.tex_parameter_i(target, pname, v),
        ParamValue::Float(v) => ctx.tex_parameter_f(target, pname, v),
        _ => {}
    }
}

pub fn capture_tex_param(ctx: &mut dyn GlContext, target: GLenum, param: &TextureParam) -> ParamValue {
    match param.kind {
        TexParamKind::Int => ParamValue::Int(ctx.get_tex_parameter_i(target, param.pname)),
        TexParamKind::Float => ParamValue::Float(ctx.get_tex_parameter_f(target, param.pname)),
    }
}
