//! The surface of a real graphics context that replay and state
//! synchronization drive.
//!
//! Object names are native `u32`s here; handle translation happens before
//! any of these methods is called. Every method takes `&mut self` so
//! implementations are free to record or count what they are asked to do.

use gl::types::{GLbitfield, GLenum};
use glvirt_core::device::{parse_api_version, LIMIT_PNAMES, PRECISION_TYPES, SHADER_STAGES};
use glvirt_core::{DeviceDescription, PrecisionFormat, StagePrecision};
use tracing::debug;

use crate::glsl::{parse_shading_language_version, version_directive};

/// Name, size and type of one active program attribute or uniform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveInfo {
    pub size: i32,
    pub ty: GLenum,
    pub name: String,
}

pub trait GlContext {
    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    fn get_integers(&mut self, pname: GLenum, out: &mut [i32]);
    fn get_floats(&mut self, pname: GLenum, out: &mut [f32]);
    fn get_booleans(&mut self, pname: GLenum, out: &mut [bool]);
    fn get_integer_indexed(&mut self, pname: GLenum, index: u32) -> i32;
    fn is_enabled(&mut self, cap: GLenum) -> bool;
    /// Integer parameter of the texture bound to `target` on the active unit.
    fn get_tex_parameter_i(&mut self, target: GLenum, pname: GLenum) -> i32;
    fn get_tex_parameter_f(&mut self, target: GLenum, pname: GLenum) -> f32;
    fn get_string(&mut self, name: GLenum) -> String;
    fn get_extensions(&mut self) -> Vec<String>;
    fn get_shader_precision_format(&mut self, stage: GLenum, precision: GLenum) -> PrecisionFormat;
    fn drawable_size(&mut self) -> (u32, u32);

    fn get_integer(&mut self, pname: GLenum) -> i32 {
        let mut out = [0];
        self.get_integers(pname, &mut out);
        out[0]
    }

    fn get_float(&mut self, pname: GLenum) -> f32 {
        let mut out = [0.0];
        self.get_floats(pname, &mut out);
        out[0]
    }

    // -----------------------------------------------------------------------
    // Bindings and draw state
    // -----------------------------------------------------------------------

    fn use_program(&mut self, program: u32);
    fn bind_buffer(&mut self, target: GLenum, buffer: u32);
    fn bind_buffer_base(&mut self, target: GLenum, index: u32, buffer: u32);
    fn bind_framebuffer(&mut self, target: GLenum, framebuffer: u32);
    fn bind_renderbuffer(&mut self, target: GLenum, renderbuffer: u32);
    fn bind_vertex_array(&mut self, array: u32);
    fn active_texture(&mut self, unit: GLenum);
    fn bind_texture(&mut self, target: GLenum, texture: u32);
    fn tex_parameter_i(&mut self, target: GLenum, pname: GLenum, value: i32);
    fn tex_parameter_f(&mut self, target: GLenum, pname: GLenum, value: f32);
    fn enable(&mut self, cap: GLenum);
    fn disable(&mut self, cap: GLenum);
    fn cull_face(&mut self, mode: GLenum);
    fn depth_func(&mut self, func: GLenum);
    fn front_face(&mut self, mode: GLenum);
    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32);
    fn clear_depth(&mut self, depth: f32);
    fn clear_stencil(&mut self, s: i32);
    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn blend_func_separate(&mut self, src_rgb: GLenum, dst_rgb: GLenum, src_a: GLenum, dst_a: GLenum);
    fn blend_equation_separate(&mut self, rgb: GLenum, alpha: GLenum);
    fn blend_color(&mut self, r: f32, g: f32, b: f32, a: f32);
    fn color_mask(&mut self, r: bool, g: bool, b: bool, a: bool);
    fn depth_mask(&mut self, flag: bool);
    fn depth_range(&mut self, near: f32, far: f32);
    fn line_width(&mut self, width: f32);
    fn polygon_offset(&mut self, factor: f32, units: f32);
    fn pixel_store_i(&mut self, pname: GLenum, value: i32);

    // -----------------------------------------------------------------------
    // Object lifecycle
    // -----------------------------------------------------------------------

    fn gen_texture(&mut self) -> u32;
    fn gen_buffer(&mut self) -> u32;
    fn gen_framebuffer(&mut self) -> u32;
    fn gen_renderbuffer(&mut self) -> u32;
    fn gen_vertex_array(&mut self) -> u32;
    fn create_program(&mut self) -> u32;
    fn create_shader(&mut self, kind: GLenum) -> u32;
    fn delete_texture(&mut self, texture: u32);
    fn delete_buffer(&mut self, buffer: u32);
    fn delete_framebuffer(&mut self, framebuffer: u32);
    fn delete_renderbuffer(&mut self, renderbuffer: u32);
    fn delete_vertex_array(&mut self, array: u32);
    fn delete_program(&mut self, program: u32);
    fn delete_shader(&mut self, shader: u32);

    // -----------------------------------------------------------------------
    // Resource setup
    // -----------------------------------------------------------------------

    fn shader_source(&mut self, shader: u32, source: &str);
    fn compile_shader(&mut self, shader: u32);
    fn attach_shader(&mut self, program: u32, shader: u32);
    fn link_program(&mut self, program: u32);
    fn bind_attrib_location(&mut self, program: u32, index: u32, name: &str);
    /// `data == None` allocates `size` uninitialized bytes.
    fn buffer_data(&mut self, target: GLenum, size: usize, data: Option<&[u8]>, usage: GLenum);
    fn buffer_sub_data(&mut self, target: GLenum, offset: usize, data: &[u8]);
    #[allow(clippy::too_many_arguments)]
    fn tex_image_2d(
        &mut self,
        target: GLenum,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        format: GLenum,
        ty: GLenum,
        pixels: Option<&[u8]>,
    );
    #[allow(clippy::too_many_arguments)]
    fn tex_sub_image_2d(
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
    );
    fn generate_mipmap(&mut self, target: GLenum);
    fn framebuffer_texture_2d(
        &mut self,
        target: GLenum,
        attachment: GLenum,
        tex_target: GLenum,
        texture: u32,
        level: i32,
    );
    fn framebuffer_renderbuffer(
        &mut self,
        target: GLenum,
        attachment: GLenum,
        rb_target: GLenum,
        renderbuffer: u32,
    );
    fn renderbuffer_storage(&mut self, target: GLenum, format: GLenum, width: i32, height: i32);
    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        ty: GLenum,
        normalized: bool,
        stride: i32,
        offset: usize,
    );
    fn enable_vertex_attrib_array(&mut self, index: u32);
    fn disable_vertex_attrib_array(&mut self, index: u32);
    /// `-1` when `name` is not an active uniform of `program`.
    fn get_uniform_location(&mut self, program: u32, name: &str) -> i32;
    /// `values.len()` is a multiple of `components` (1 to 4).
    fn uniform_floats(&mut self, location: i32, components: i32, values: &[f32]);
    fn uniform_ints(&mut self, location: i32, components: i32, values: &[i32]);
    /// `values.len()` is a multiple of `dim * dim` (dim 2 to 4).
    fn uniform_matrix(&mut self, location: i32, dim: i32, transpose: bool, values: &[f32]);

    // -----------------------------------------------------------------------
    // Drawing
    // -----------------------------------------------------------------------

    fn clear(&mut self, mask: GLbitfield);
    fn draw_arrays(&mut self, mode: GLenum, first: i32, count: i32);
    fn draw_elements(&mut self, mode: GLenum, count: i32, ty: GLenum, offset: usize);
    fn flush(&mut self);
    fn finish(&mut self);

    // -----------------------------------------------------------------------
    // Round-trip queries
    // -----------------------------------------------------------------------

    fn get_attrib_location(&mut self, program: u32, name: &str) -> i32;
    fn get_program_parameter(&mut self, program: u32, pname: GLenum) -> i32;
    fn get_shader_parameter(&mut self, shader: u32, pname: GLenum) -> i32;
    fn get_program_info_log(&mut self, program: u32) -> String;
    fn get_shader_info_log(&mut self, shader: u32) -> String;
    fn get_active_attrib(&mut self, program: u32, index: u32) -> Option<ActiveInfo>;
    fn get_active_uniform(&mut self, program: u32, index: u32) -> Option<ActiveInfo>;
    fn get_error(&mut self) -> GLenum;
    fn check_framebuffer_status(&mut self, target: GLenum) -> GLenum;
    /// Tightly packed rows, bottom row first.
    fn read_pixels(
        &mut self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: GLenum,
        ty: GLenum,
    ) -> Vec<u8>;
}

/// Build the description a consumer sends before any buffer traffic.
///
/// GLSL versions come from `GL_SHADING_LANGUAGE_VERSION` only, written as
/// `#version` directive values.
pub fn describe(ctx: &mut dyn GlContext) -> DeviceDescription {
    let version = ctx.get_string(gl::VERSION);
    let glsl = ctx.get_string(gl::SHADING_LANGUAGE_VERSION);
    let shading_language_versions = parse_shading_language_version(&glsl)
        .map(|v| version_directive(&v))
        .into_iter()
        .collect();

    let limits = LIMIT_PNAMES
        .iter()
        .map(|&(pname, n)| {
            let mut v = vec![0; n];
            ctx.get_integers(pname, &mut v);
            (pname, v)
        })
        .collect();

    let mut precisions = Vec::new();
    for stage in SHADER_STAGES {
        for precision_type in PRECISION_TYPES {
            precisions.push(StagePrecision {
                stage,
                precision_type,
                format: ctx.get_shader_precision_format(stage, precision_type),
            });
        }
    }

    let desc = DeviceDescription {
        api_version: parse_api_version(&version),
        version,
        vendor: ctx.get_string(gl::VENDOR),
        renderer: ctx.get_string(gl::RENDERER),
        shading_language_versions,
        extensions: ctx.get_extensions().into_iter().collect(),
        limits,
        precisions,
        drawable: ctx.drawable_size(),
    };
    // Queries of pnames the driver lacks leave an error behind.
    for _ in 0..32 {
        if ctx.get_error() == gl::NO_ERROR {
            break;
        }
    }
    debug!(
        version = %desc.version,
        renderer = %desc.renderer,
        extensions = desc.extensions.len(),
        "described device"
    );
    desc
}
