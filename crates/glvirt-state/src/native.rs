//! [`GlContext`] over the process's current OpenGL context.

use std::ffi::{c_void, CStr, CString};
use std::ptr;
use std::sync::Once;

use gl::types::{GLboolean, GLbitfield, GLchar, GLenum, GLint, GLsizei, GLsizeiptr, GLuint};
use glvirt_core::pixels::pixel_size;
use glvirt_core::PrecisionFormat;
use tracing::{debug, warn};

use crate::context::{ActiveInfo, GlContext};
use crate::params::unit_color;

static GL_INIT_ONCE: Once = Once::new();

/// Load GL function pointers through `gl_loader`, exactly once per process.
fn load_gl() {
    GL_INIT_ONCE.call_once(|| {
        gl_loader::init_gl();
        gl::load_with(|s| gl_loader::get_proc_address(s).cast());
        debug!("loaded GL function pointers");
    });
}

/// Issues raw `gl::*` calls.
///
/// Every method assumes a GL context is current on the calling thread; the
/// constructor is `unsafe` for that reason and the methods are not.
#[derive(Debug)]
pub struct NativeContext {
    drawable: (u32, u32),
}

impl NativeContext {
    /// # Safety
    ///
    /// A GL context must be current on this thread for as long as the
    /// returned value is used, and only on this thread.
    pub unsafe fn new(drawable: (u32, u32)) -> Self {
        load_gl();
        Self { drawable }
    }

    pub fn set_drawable_size(&mut self, drawable: (u32, u32)) {
        self.drawable = drawable;
    }
}

fn c_string(s: &str) -> Option<CString> {
    match CString::new(s) {
        Ok(c) => Some(c),
        Err(_) => {
            warn!(s, "string contains an interior NUL, call skipped");
            None
        }
    }
}

fn gl_bool(b: bool) -> GLboolean {
    if b {
        gl::TRUE
    } else {
        gl::FALSE
    }
}

/// Read back a driver info log of `len` bytes (including the terminator).
fn info_log(len: GLint, read: impl FnOnce(GLsizei, *mut GLsizei, *mut GLchar)) -> String {
    if len <= 0 {
        return String::new();
    }
    let mut buf = vec![0u8; len as usize];
    let mut written = 0;
    read(len, &mut written, buf.as_mut_ptr().cast());
    buf.truncate(written.max(0) as usize);
    String::from_utf8_lossy(&buf).into_owned()
}

impl GlContext for NativeContext {
    fn get_integers(&mut self, pname: GLenum, out: &mut [i32]) {
        // Some pnames write more components than callers ask for.
        let mut scratch = [0; 16];
        unsafe { gl::GetIntegerv(pname, scratch.as_mut_ptr()) };
        let n = out.len().min(scratch.len());
        out[..n].copy_from_slice(&scratch[..n]);
    }

    fn get_floats(&mut self, pname: GLenum, out: &mut [f32]) {
        let mut scratch = [0.0; 16];
        unsafe { gl::GetFloatv(pname, scratch.as_mut_ptr()) };
        let n = out.len().min(scratch.len());
        out[..n].copy_from_slice(&scratch[..n]);
    }

    fn get_booleans(&mut self, pname: GLenum, out: &mut [bool]) {
        let mut scratch = [gl::FALSE; 16];
        unsafe { gl::GetBooleanv(pname, scratch.as_mut_ptr()) };
        for (o, v) in out.iter_mut().zip(scratch) {
            *o = v == gl::TRUE;
        }
    }

    fn get_integer_indexed(&mut self, pname: GLenum, index: u32) -> i32 {
        let mut v = 0;
        unsafe { gl::GetIntegeri_v(pname, index, &mut v) };
        v
    }

    fn is_enabled(&mut self, cap: GLenum) -> bool {
        unsafe { gl::IsEnabled(cap) == gl::TRUE }
    }

    fn get_tex_parameter_i(&mut self, target: GLenum, pname: GLenum) -> i32 {
        let mut v = 0;
        unsafe { gl::GetTexParameteriv(target, pname, &mut v) };
        v
    }

    fn get_tex_parameter_f(&mut self, target: GLenum, pname: GLenum) -> f32 {
        let mut v = 0.0;
        unsafe { gl::GetTexParameterfv(target, pname, &mut v) };
        v
    }

    fn get_string(&mut self, name: GLenum) -> String {
        unsafe {
            let s = gl::GetString(name);
            if s.is_null() {
                return String::new();
            }
            CStr::from_ptr(s.cast()).to_string_lossy().into_owned()
        }
    }

    fn get_extensions(&mut self) -> Vec<String> {
        let count = self.get_integer(gl::NUM_EXTENSIONS);
        if count <= 0 {
            // Pre-3.0 contexts only have the space separated list.
            return self
                .get_string(gl::EXTENSIONS)
                .split_whitespace()
                .map(str::to_owned)
                .collect();
        }
        (0..count as GLuint)
            .filter_map(|i| unsafe {
                let s = gl::GetStringi(gl::EXTENSIONS, i);
                (!s.is_null()).then(|| CStr::from_ptr(s.cast()).to_string_lossy().into_owned())
            })
            .collect()
    }

    fn get_shader_precision_format(&mut self, stage: GLenum, precision: GLenum) -> PrecisionFormat {
        let int = matches!(precision, gl::LOW_INT | gl::MEDIUM_INT | gl::HIGH_INT);
        if !gl::GetShaderPrecisionFormat::is_loaded() {
            return if int {
                PrecisionFormat::INT32
            } else {
                PrecisionFormat::FLOAT32
            };
        }
        let mut range = [0; 2];
        let mut bits = 0;
        unsafe { gl::GetShaderPrecisionFormat(stage, precision, range.as_mut_ptr(), &mut bits) };
        PrecisionFormat {
            range_min: range[0],
            range_max: range[1],
            precision: bits,
        }
    }

    fn drawable_size(&mut self) -> (u32, u32) {
        self.drawable
    }

    // -----------------------------------------------------------------------
    // Bindings and draw state
    // -----------------------------------------------------------------------

    fn use_program(&mut self, program: u32) {
        unsafe { gl::UseProgram(program) }
    }

    fn bind_buffer(&mut self, target: GLenum, buffer: u32) {
        unsafe { gl::BindBuffer(target, buffer) }
    }

    fn bind_buffer_base(&mut self, target: GLenum, index: u32, buffer: u32) {
        unsafe { gl::BindBufferBase(target, index, buffer) }
    }

    fn bind_framebuffer(&mut self, target: GLenum, framebuffer: u32) {
        unsafe { gl::BindFramebuffer(target, framebuffer) }
    }

    fn bind_renderbuffer(&mut self, target: GLenum, renderbuffer: u32) {
        unsafe { gl::BindRenderbuffer(target, renderbuffer) }
    }

    fn bind_vertex_array(&mut self, array: u32) {
        unsafe { gl::BindVertexArray(array) }
    }

    fn active_texture(&mut self, unit: GLenum) {
        unsafe { gl::ActiveTexture(unit) }
    }

    fn bind_texture(&mut self, target: GLenum, texture: u32) {
        unsafe { gl::BindTexture(target, texture) }
    }

    fn tex_parameter_i(&mut self, target: GLenum, pname: GLenum, value: i32) {
        unsafe { gl::TexParameteri(target, pname, value) }
    }

    fn tex_parameter_f(&mut self, target: GLenum, pname: GLenum, value: f32) {
        unsafe { gl::TexParameterf(target, pname, value) }
    }

    fn enable(&mut self, cap: GLenum) {
        unsafe { gl::Enable(cap) }
    }

    fn disable(&mut self, cap: GLenum) {
        unsafe { gl::Disable(cap) }
    }

    fn cull_face(&mut self, mode: GLenum) {
        unsafe { gl::CullFace(mode) }
    }

    fn depth_func(&mut self, func: GLenum) {
        unsafe { gl::DepthFunc(func) }
    }

    fn front_face(&mut self, mode: GLenum) {
        unsafe { gl::FrontFace(mode) }
    }

    // Desktop GL 3+ stores unclamped colors; clamp so every context
    // agrees with the tracked state.
    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        let [r, g, b, a] = unit_color([r, g, b, a]);
        unsafe { gl::ClearColor(r, g, b, a) }
    }

    fn clear_depth(&mut self, depth: f32) {
        unsafe { gl::ClearDepth(depth as f64) }
    }

    fn clear_stencil(&mut self, s: i32) {
        unsafe { gl::ClearStencil(s) }
    }

    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { gl::Scissor(x, y, width, height) }
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { gl::Viewport(x, y, width, height) }
    }

    fn blend_func_separate(&mut self, src_rgb: GLenum, dst_rgb: GLenum, src_a: GLenum, dst_a: GLenum) {
        unsafe { gl::BlendFuncSeparate(src_rgb, dst_rgb, src_a, dst_a) }
    }

    fn blend_equation_separate(&mut self, rgb: GLenum, alpha: GLenum) {
        unsafe { gl::BlendEquationSeparate(rgb, alpha) }
    }

    fn blend_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        let [r, g, b, a] = unit_color([r, g, b, a]);
        unsafe { gl::BlendColor(r, g, b, a) }
    }

    fn color_mask(&mut self, r: bool, g: bool, b: bool, a: bool) {
        unsafe { gl::ColorMask(gl_bool(r), gl_bool(g), gl_bool(b), gl_bool(a)) }
    }

    fn depth_mask(&mut self, flag: bool) {
        unsafe { gl::DepthMask(gl_bool(flag)) }
    }

    fn depth_range(&mut self, near: f32, far: f32) {
        unsafe { gl::DepthRange(near as f64, far as f64) }
    }

    fn line_width(&mut self, width: f32) {
        unsafe { gl::LineWidth(width) }
    }

    fn polygon_offset(&mut self, factor: f32, units: f32) {
        unsafe { gl::PolygonOffset(factor, units) }
    }

    fn pixel_store_i(&mut self, pname: GLenum, value: i32) {
        unsafe { gl::PixelStorei(pname, value) }
    }

    // -----------------------------------------------------------------------
    // Object lifecycle
    // -----------------------------------------------------------------------

    fn gen_texture(&mut self) -> u32 {
        let mut name = 0;
        unsafe { gl::GenTextures(1, &mut name) };
        name
    }

    fn gen_buffer(&mut self) -> u32 {
        let mut name = 0;
        unsafe { gl::GenBuffers(1, &mut name) };
        name
    }

    fn gen_framebuffer(&mut self) -> u32 {
        let mut name = 0;
        unsafe { gl::GenFramebuffers(1, &mut name) };
        name
    }

    fn gen_renderbuffer(&mut self) -> u32 {
        let mut name = 0;
        unsafe { gl::GenRenderbuffers(1, &mut name) };
        name
    }

    fn gen_vertex_array(&mut self) -> u32 {
        let mut name = 0;
        unsafe { gl::GenVertexArrays(1, &mut name) };
        name
    }

    fn create_program(&mut self) -> u32 {
        unsafe { gl::CreateProgram() }
    }

    fn create_shader(&mut self, kind: GLenum) -> u32 {
        unsafe { gl::CreateShader(kind) }
    }

    fn delete_texture(&mut self, texture: u32) {
        unsafe { gl::DeleteTextures(1, &texture) }
    }

    fn delete_buffer(&mut self, buffer: u32) {
        unsafe { gl::DeleteBuffers(1, &buffer) }
    }

    fn delete_framebuffer(&mut self, framebuffer: u32) {
        unsafe { gl::DeleteFramebuffers(1, &framebuffer) }
    }

    fn delete_renderbuffer(&mut self, renderbuffer: u32) {
        unsafe { gl::DeleteRenderbuffers(1, &renderbuffer) }
    }

    fn delete_vertex_array(&mut self, array: u32) {
        unsafe { gl::DeleteVertexArrays(1, &array) }
    }

    fn delete_program(&mut self, program: u32) {
        unsafe { gl::DeleteProgram(program) }
    }

    fn delete_shader(&mut self, shader: u32) {
        unsafe { gl::DeleteShader(shader) }
    }

    // -----------------------------------------------------------------------
    // Resource setup
    // -----------------------------------------------------------------------

    fn shader_source(&mut self, shader: u32, source: &str) {
        let ptr = source.as_ptr() as *const GLchar;
        let len = source.len() as GLint;
        unsafe { gl::ShaderSource(shader, 1, &ptr, &len) }
    }

    fn compile_shader(&mut self, shader: u32) {
        unsafe { gl::CompileShader(shader) }
    }

    fn attach_shader(&mut self, program: u32, shader: u32) {
        unsafe { gl::AttachShader(program, shader) }
    }

    fn link_program(&mut self, program: u32) {
        unsafe { gl::LinkProgram(program) }
    }

    fn bind_attrib_location(&mut self, program: u32, index: u32, name: &str) {
        if let Some(name) = c_string(name) {
            unsafe { gl::BindAttribLocation(program, index, name.as_ptr()) }
        }
    }

    fn buffer_data(&mut self, target: GLenum, size: usize, data: Option<&[u8]>, usage: GLenum) {
        let (size, ptr) = match data {
            Some(bytes) => (bytes.len(), bytes.as_ptr().cast()),
            None => (size, ptr::null()),
        };
        unsafe { gl::BufferData(target, size as GLsizeiptr, ptr, usage) }
    }

    fn buffer_sub_data(&mut self, target: GLenum, offset: usize, data: &[u8]) {
        unsafe {
            gl::BufferSubData(
                target,
                offset as isize,
                data.len() as GLsizeiptr,
                data.as_ptr().cast(),
            )
        }
    }

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
    ) {
        let ptr = pixels.map_or(ptr::null(), |p| p.as_ptr().cast());
        unsafe {
            gl::TexImage2D(target, level, internal_format, width, height, 0, format, ty, ptr)
        }
    }

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
    ) {
        unsafe {
            gl::TexSubImage2D(
                target,
                level,
                x,
                y,
                width,
                height,
                format,
                ty,
                pixels.as_ptr().cast(),
            )
        }
    }

    fn generate_mipmap(&mut self, target: GLenum) {
        unsafe { gl::GenerateMipmap(target) }
    }

    fn framebuffer_texture_2d(
        &mut self,
        target: GLenum,
        attachment: GLenum,
        tex_target: GLenum,
        texture: u32,
        level: i32,
    ) {
        unsafe { gl::FramebufferTexture2D(target, attachment, tex_target, texture, level) }
    }

    fn framebuffer_renderbuffer(
        &mut self,
        target: GLenum,
        attachment: GLenum,
        rb_target: GLenum,
        renderbuffer: u32,
    ) {
        unsafe { gl::FramebufferRenderbuffer(target, attachment, rb_target, renderbuffer) }
    }

    fn renderbuffer_storage(&mut self, target: GLenum, format: GLenum, width: i32, height: i32) {
        unsafe { gl::RenderbufferStorage(target, format, width, height) }
    }

    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        ty: GLenum,
        normalized: bool,
        stride: i32,
        offset: usize,
    ) {
        unsafe {
            gl::VertexAttribPointer(
                index,
                size,
                ty,
                gl_bool(normalized),
                stride,
                offset as *const c_void,
            )
        }
    }

    fn enable_vertex_attrib_array(&mut self, index: u32) {
        unsafe { gl::EnableVertexAttribArray(index) }
    }

    fn disable_vertex_attrib_array(&mut self, index: u32) {
        unsafe { gl::DisableVertexAttribArray(index) }
    }

    fn get_uniform_location(&mut self, program: u32, name: &str) -> i32 {
        match c_string(name) {
            Some(name) => unsafe { gl::GetUniformLocation(program, name.as_ptr()) },
            None => -1,
        }
    }

    fn uniform_floats(&mut self, location: i32, components: i32, values: &[f32]) {
        let count = values.len() as GLsizei / components.max(1);
        let ptr = values.as_ptr();
        unsafe {
            match components {
                1 => gl::Uniform1fv(location, count, ptr),
                2 => gl::Uniform2fv(location, count, ptr),
                3 => gl::Uniform3fv(location, count, ptr),
                4 => gl::Uniform4fv(location, count, ptr),
                _ => warn!(components, "unsupported uniform width"),
            }
        }
    }

    fn uniform_ints(&mut self, location: i32, components: i32, values: &[i32]) {
        let count = values.len() as GLsizei / components.max(1);
        let ptr = values.as_ptr();
        unsafe {
            match components {
                1 => gl::Uniform1iv(location, count, ptr),
                2 => gl::Uniform2iv(location, count, ptr),
                3 => gl::Uniform3iv(location, count, ptr),
                4 => gl::Uniform4iv(location, count, ptr),
                _ => warn!(components, "unsupported uniform width"),
            }
        }
    }

    fn uniform_matrix(&mut self, location: i32, dim: i32, transpose: bool, values: &[f32]) {
        let count = values.len() as GLsizei / (dim * dim).max(1);
        let (transpose, ptr) = (gl_bool(transpose), values.as_ptr());
        unsafe {
            match dim {
                2 => gl::UniformMatrix2fv(location, count, transpose, ptr),
                3 => gl::UniformMatrix3fv(location, count, transpose, ptr),
                4 => gl::UniformMatrix4fv(location, count, transpose, ptr),
                _ => warn!(dim, "unsupported matrix dimension"),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Drawing
    // -----------------------------------------------------------------------

    fn clear(&mut self, mask: GLbitfield) {
        unsafe { gl::Clear(mask) }
    }

    fn draw_arrays(&mut self, mode: GLenum, first: i32, count: i32) {
        unsafe { gl::DrawArrays(mode, first, count) }
    }

    fn draw_elements(&mut self, mode: GLenum, count: i32, ty: GLenum, offset: usize) {
        unsafe { gl::DrawElements(mode, count, ty, offset as *const c_void) }
    }

    fn flush(&mut self) {
        unsafe { gl::Flush() }
    }

    fn finish(&mut self) {
        unsafe { gl::Finish() }
    }

    // -----------------------------------------------------------------------
    // Round-trip queries
    // -----------------------------------------------------------------------

    fn get_attrib_location(&mut self, program: u32, name: &str) -> i32 {
        match c_string(name) {
            Some(name) => unsafe { gl::GetAttribLocation(program, name.as_ptr()) },
            None => -1,
        }
    }

    fn get_program_parameter(&mut self, program: u32, pname: GLenum) -> i32 {
        let mut v = 0;
        unsafe { gl::GetProgramiv(program, pname, &mut v) };
        v
    }

    fn get_shader_parameter(&mut self, shader: u32, pname: GLenum) -> i32 {
        let mut v = 0;
        unsafe { gl::GetShaderiv(shader, pname, &mut v) };
        v
    }

    fn get_program_info_log(&mut self, program: u32) -> String {
        let len = self.get_program_parameter(program, gl::INFO_LOG_LENGTH);
        info_log(len, |cap, written, buf| unsafe {
            gl::GetProgramInfoLog(program, cap, written, buf)
        })
    }

    fn get_shader_info_log(&mut self, shader: u32) -> String {
        let len = self.get_shader_parameter(shader, gl::INFO_LOG_LENGTH);
        info_log(len, |cap, written, buf| unsafe {
            gl::GetShaderInfoLog(shader, cap, written, buf)
        })
    }

    fn get_active_attrib(&mut self, program: u32, index: u32) -> Option<ActiveInfo> {
        let count = self.get_program_parameter(program, gl::ACTIVE_ATTRIBUTES);
        if index as i32 >= count {
            return None;
        }
        let cap = self
            .get_program_parameter(program, gl::ACTIVE_ATTRIBUTE_MAX_LENGTH)
            .max(1);
        let mut buf = vec![0u8; cap as usize];
        let (mut len, mut size, mut ty) = (0, 0, 0);
        unsafe {
            gl::GetActiveAttrib(
                program,
                index,
                cap,
                &mut len,
                &mut size,
                &mut ty,
                buf.as_mut_ptr().cast(),
            )
        };
        buf.truncate(len.max(0) as usize);
        Some(ActiveInfo {
            size,
            ty,
            name: String::from_utf8_lossy(&buf).into_owned(),
        })
    }

    fn get_active_uniform(&mut self, program: u32, index: u32) -> Option<ActiveInfo> {
        let count = self.get_program_parameter(program, gl::ACTIVE_UNIFORMS);
        if index as i32 >= count {
            return None;
        }
        let cap = self
            .get_program_parameter(program, gl::ACTIVE_UNIFORM_MAX_LENGTH)
            .max(1);
        let mut buf = vec![0u8; cap as usize];
        let (mut len, mut size, mut ty) = (0, 0, 0);
        unsafe {
            gl::GetActiveUniform(
                program,
                index,
                cap,
                &mut len,
                &mut size,
                &mut ty,
                buf.as_mut_ptr().cast(),
            )
        };
        buf.truncate(len.max(0) as usize);
        Some(ActiveInfo {
            size,
            ty,
            name: String::from_utf8_lossy(&buf).into_owned(),
        })
    }

    fn get_error(&mut self) -> GLenum {
        unsafe { gl::GetError() }
    }

    fn check_framebuffer_status(&mut self, target: GLenum) -> GLenum {
        unsafe { gl::CheckFramebufferStatus(target) }
    }

    fn read_pixels(
        &mut self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: GLenum,
        ty: GLenum,
    ) -> Vec<u8> {
        let row = width.max(0) as usize * pixel_size(format, ty);
        let mut out = vec![0u8; row * height.max(0) as usize];
        let previous = self.get_integer(gl::PACK_ALIGNMENT);
        unsafe {
            gl::PixelStorei(gl::PACK_ALIGNMENT, 1);
            gl::ReadPixels(x, y, width, height, format, ty, out.as_mut_ptr().cast());
            gl::PixelStorei(gl::PACK_ALIGNMENT, previous);
        }
        out
    }
}
