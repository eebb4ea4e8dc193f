//! In-memory reference implementation of [`GlContext`].
//!
//! Models the GL state machine closely enough to stand in for a driver:
//! per-kind object namespaces with GL-style name reuse, per-object texture
//! parameters, deletion unbinding, simple shader interface reflection from
//! source text, and clears that `read_pixels` can observe. It rasterizes
//! nothing. Every mutating call is counted so tests can compare how much
//! work two call sequences did.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use gl::types::{GLbitfield, GLenum};
use glvirt_core::PrecisionFormat;

use crate::context::{ActiveInfo, GlContext};
use crate::params::{unit_color, TEXTURE_MAX_ANISOTROPY};
use crate::validate::{BUFFER_TARGETS, TEXTURE_TARGETS};

const UNIFORM_BINDINGS: u32 = 24;

#[derive(Debug, Clone)]
pub struct SoftConfig {
    pub drawable: (u32, u32),
    pub texture_units: u32,
    pub anisotropy: bool,
    pub volume_textures: bool,
    pub version: String,
}

impl Default for SoftConfig {
    fn default() -> Self {
        Self {
            drawable: (300, 150),
            texture_units: 16,
            anisotropy: false,
            volume_textures: true,
            version: "3.3 (glvirt software)".to_owned(),
        }
    }
}

/// GL-style name allocation: the lowest released name is reused first.
#[derive(Debug, Default)]
struct Names {
    next: u32,
    free: BTreeSet<u32>,
}

impl Names {
    fn alloc(&mut self) -> u32 {
        if let Some(name) = self.free.pop_first() {
            return name;
        }
        self.next += 1;
        self.next
    }

    fn release(&mut self, name: u32) {
        self.free.insert(name);
    }
}

#[derive(Debug, Clone)]
struct Image {
    width: i32,
    height: i32,
    /// RGBA8 contents; empty for other formats.
    rgba: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
struct Texture {
    target: Option<GLenum>,
    params: BTreeMap<GLenum, f64>,
    /// Keyed by (image target, level); cube faces are separate targets.
    images: HashMap<(GLenum, i32), Image>,
}

#[derive(Debug, Clone, Copy)]
enum Attachment {
    Texture { target: GLenum, name: u32, level: i32 },
    Renderbuffer(u32),
}

#[derive(Debug, Default)]
struct Framebuffer {
    attachments: BTreeMap<GLenum, Attachment>,
}

#[derive(Debug, Default)]
struct VertexArray {
    element_buffer: u32,
    enabled: BTreeSet<u32>,
}

#[derive(Debug, Clone)]
struct Shader {
    kind: GLenum,
    source: String,
    compiled: bool,
    log: String,
    delete_pending: bool,
}

#[derive(Debug, Default)]
struct Program {
    shaders: Vec<u32>,
    linked: bool,
    log: String,
    attrib_bindings: HashMap<String, u32>,
    attribs: Vec<(ActiveInfo, i32)>,
    uniforms: Vec<ActiveInfo>,
    delete_pending: bool,
}

/// Software GL context.
#[derive(Debug)]
pub struct SoftContext {
    config: SoftConfig,
    calls: usize,
    draws: usize,
    error: GLenum,

    texture_names: Names,
    buffer_names: Names,
    framebuffer_names: Names,
    renderbuffer_names: Names,
    vertex_array_names: Names,
    /// Programs and shaders share one namespace.
    program_names: Names,

    textures: HashMap<u32, Texture>,
    default_textures: BTreeMap<GLenum, Texture>,
    buffers: HashMap<u32, Vec<u8>>,
    framebuffers: HashMap<u32, Framebuffer>,
    renderbuffers: HashMap<u32, (GLenum, i32, i32)>,
    vertex_arrays: HashMap<u32, VertexArray>,
    programs: HashMap<u32, Program>,
    shaders: HashMap<u32, Shader>,
    uniform_values: HashMap<(u32, i32), Vec<f32>>,

    program: u32,
    vertex_array: u32,
    generic_buffers: BTreeMap<GLenum, u32>,
    indexed_buffers: BTreeMap<(GLenum, u32), u32>,
    draw_framebuffer: u32,
    read_framebuffer: u32,
    renderbuffer: u32,
    active_unit: u32,
    units: Vec<BTreeMap<GLenum, u32>>,
    caps: BTreeMap<GLenum, bool>,
    values: HashMap<GLenum, Vec<f64>>,
    limits: HashMap<GLenum, Vec<f64>>,
    /// Default framebuffer contents, RGBA8.
    drawable: Vec<u8>,
}

fn default_tex_params(anisotropy: bool) -> BTreeMap<GLenum, f64> {
    let mut params: BTreeMap<GLenum, f64> = [
        (gl::TEXTURE_MIN_FILTER, gl::NEAREST_MIPMAP_LINEAR as f64),
        (gl::TEXTURE_MAG_FILTER, gl::LINEAR as f64),
        (gl::TEXTURE_WRAP_S, gl::REPEAT as f64),
        (gl::TEXTURE_WRAP_T, gl::REPEAT as f64),
        (gl::TEXTURE_WRAP_R, gl::REPEAT as f64),
        (gl::TEXTURE_COMPARE_MODE, gl::NONE as f64),
        (gl::TEXTURE_COMPARE_FUNC, gl::LEQUAL as f64),
        (gl::TEXTURE_MIN_LOD, -1000.0),
        (gl::TEXTURE_MAX_LOD, 1000.0),
        (gl::TEXTURE_BASE_LEVEL, 0.0),
        (gl::TEXTURE_MAX_LEVEL, 1000.0),
    ]
    .into_iter()
    .collect();
    if anisotropy {
        params.insert(TEXTURE_MAX_ANISOTROPY, 1.0);
    }
    params
}

fn is_float_tex_param(pname: GLenum) -> bool {
    matches!(
        pname,
        gl::TEXTURE_MIN_LOD | gl::TEXTURE_MAX_LOD | TEXTURE_MAX_ANISOTROPY
    )
}

/// Binding target of a texture image target (cube faces map to the cube).
fn texture_target_of(image_target: GLenum) -> GLenum {
    match image_target {
        gl::TEXTURE_CUBE_MAP_POSITIVE_X..=gl::TEXTURE_CUBE_MAP_NEGATIVE_Z => gl::TEXTURE_CUBE_MAP,
        other => other,
    }
}

fn unorm8(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl Default for SoftContext {
    fn default() -> Self {
        Self::new(SoftConfig::default())
    }
}

impl SoftContext {
    pub fn new(config: SoftConfig) -> Self {
        let (w, h) = config.drawable;
        let (wf, hf) = (w as f64, h as f64);
        let e = |v: GLenum| v as f64;

        let values: HashMap<GLenum, Vec<f64>> = [
            (gl::CULL_FACE_MODE, vec![e(gl::BACK)]),
            (gl::DEPTH_FUNC, vec![e(gl::LESS)]),
            (gl::FRONT_FACE, vec![e(gl::CCW)]),
            (gl::COLOR_CLEAR_VALUE, vec![0.0; 4]),
            (gl::DEPTH_CLEAR_VALUE, vec![1.0]),
            (gl::STENCIL_CLEAR_VALUE, vec![0.0]),
            (gl::SCISSOR_BOX, vec![0.0, 0.0, wf, hf]),
            (gl::VIEWPORT, vec![0.0, 0.0, wf, hf]),
            (gl::BLEND_COLOR, vec![0.0; 4]),
            (gl::BLEND_SRC_RGB, vec![e(gl::ONE)]),
            (gl::BLEND_DST_RGB, vec![e(gl::ZERO)]),
            (gl::BLEND_SRC_ALPHA, vec![e(gl::ONE)]),
            (gl::BLEND_DST_ALPHA, vec![e(gl::ZERO)]),
            (gl::BLEND_EQUATION_RGB, vec![e(gl::FUNC_ADD)]),
            (gl::BLEND_EQUATION_ALPHA, vec![e(gl::FUNC_ADD)]),
            (gl::COLOR_WRITEMASK, vec![1.0; 4]),
            (gl::DEPTH_WRITEMASK, vec![1.0]),
            (gl::DEPTH_RANGE, vec![0.0, 1.0]),
            (gl::LINE_WIDTH, vec![1.0]),
            (gl::POLYGON_OFFSET_FACTOR, vec![0.0]),
            (gl::POLYGON_OFFSET_UNITS, vec![0.0]),
            (gl::UNPACK_ALIGNMENT, vec![4.0]),
            (gl::PACK_ALIGNMENT, vec![4.0]),
        ]
        .into_iter()
        .collect();

        let volume = if config.volume_textures { 256.0 } else { 0.0 };
        let units = config.texture_units as f64;
        let limits: HashMap<GLenum, Vec<f64>> = [
            (gl::MAX_TEXTURE_SIZE, vec![4096.0]),
            (gl::MAX_CUBE_MAP_TEXTURE_SIZE, vec![4096.0]),
            (gl::MAX_3D_TEXTURE_SIZE, vec![volume]),
            (gl::MAX_ARRAY_TEXTURE_LAYERS, vec![volume]),
            (gl::MAX_RENDERBUFFER_SIZE, vec![4096.0]),
            (gl::MAX_TEXTURE_IMAGE_UNITS, vec![units]),
            (gl::MAX_COMBINED_TEXTURE_IMAGE_UNITS, vec![units]),
            (gl::MAX_VERTEX_TEXTURE_IMAGE_UNITS, vec![units]),
            (gl::MAX_VERTEX_ATTRIBS, vec![16.0]),
            (gl::MAX_VERTEX_UNIFORM_VECTORS, vec![256.0]),
            (gl::MAX_FRAGMENT_UNIFORM_VECTORS, vec![256.0]),
            (gl::MAX_VARYING_VECTORS, vec![15.0]),
            (gl::MAX_UNIFORM_BUFFER_BINDINGS, vec![UNIFORM_BINDINGS as f64]),
            (gl::MAX_COLOR_ATTACHMENTS, vec![8.0]),
            (gl::MAX_DRAW_BUFFERS, vec![8.0]),
            (gl::MAX_SAMPLES, vec![4.0]),
            (gl::MAX_VIEWPORT_DIMS, vec![4096.0, 4096.0]),
            (gl::ALIASED_LINE_WIDTH_RANGE, vec![1.0, 1.0]),
        ]
        .into_iter()
        .collect();

        let mut targets: Vec<GLenum> = vec![gl::TEXTURE_2D, gl::TEXTURE_CUBE_MAP];
        if config.volume_textures {
            targets.extend([gl::TEXTURE_3D, gl::TEXTURE_2D_ARRAY]);
        }
        let default_textures = targets
            .iter()
            .map(|&t| {
                (
                    t,
                    Texture {
                        target: Some(t),
                        params: default_tex_params(config.anisotropy),
                        images: HashMap::new(),
                    },
                )
            })
            .collect();
        let unit: BTreeMap<GLenum, u32> = targets.iter().map(|&t| (t, 0)).collect();

        let mut vertex_arrays = HashMap::new();
        vertex_arrays.insert(0, VertexArray::default());

        Self {
            calls: 0,
            draws: 0,
            error: gl::NO_ERROR,
            texture_names: Names::default(),
            buffer_names: Names::default(),
            framebuffer_names: Names::default(),
            renderbuffer_names: Names::default(),
            vertex_array_names: Names::default(),
            program_names: Names::default(),
            textures: HashMap::new(),
            default_textures,
            buffers: HashMap::new(),
            framebuffers: HashMap::new(),
            renderbuffers: HashMap::new(),
            vertex_arrays,
            programs: HashMap::new(),
            shaders: HashMap::new(),
            uniform_values: HashMap::new(),
            program: 0,
            vertex_array: 0,
            generic_buffers: BUFFER_TARGETS
                .iter()
                .filter(|p| p.target != gl::ELEMENT_ARRAY_BUFFER)
                .map(|p| (p.target, 0))
                .collect(),
            indexed_buffers: BTreeMap::new(),
            draw_framebuffer: 0,
            read_framebuffer: 0,
            renderbuffer: 0,
            active_unit: 0,
            units: vec![unit; config.texture_units as usize],
            caps: [
                (gl::BLEND, false),
                (gl::CULL_FACE, false),
                (gl::DEPTH_TEST, false),
                (gl::DITHER, true),
                (gl::SCISSOR_TEST, false),
                (gl::STENCIL_TEST, false),
                (gl::POLYGON_OFFSET_FILL, false),
                (gl::SAMPLE_COVERAGE, false),
                (gl::SAMPLE_ALPHA_TO_COVERAGE, false),
            ]
            .into_iter()
            .collect(),
            values,
            limits,
            drawable: vec![0; (w * h * 4) as usize],
            config,
        }
    }

    /// Mutating calls issued so far.
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn reset_calls(&mut self) {
        self.calls = 0;
    }

    pub fn draw_calls(&self) -> usize {
        self.draws
    }

    pub fn is_texture(&self, name: u32) -> bool {
        self.textures.contains_key(&name)
    }

    pub fn is_buffer(&self, name: u32) -> bool {
        self.buffers.contains_key(&name)
    }

    pub fn buffer_contents(&self, name: u32) -> Option<&[u8]> {
        self.buffers.get(&name).map(Vec::as_slice)
    }

    /// Last value uploaded to `location` of `program`.
    pub fn uniform_value(&self, program: u32, location: i32) -> Option<&[f32]> {
        self.uniform_values
            .get(&(program, location))
            .map(Vec::as_slice)
    }

    pub fn is_vertex_attrib_enabled(&self, index: u32) -> bool {
        self.vertex_arrays
            .get(&self.vertex_array)
            .is_some_and(|v| v.enabled.contains(&index))
    }

    fn count(&mut self) {
        self.calls += 1;
    }

    fn fail(&mut self, error: GLenum) {
        if self.error == gl::NO_ERROR {
            self.error = error;
        }
    }

    fn unit_mut(&mut self) -> Option<&mut BTreeMap<GLenum, u32>> {
        self.units.get_mut(self.active_unit as usize)
    }

    fn bound_texture_name(&self, target: GLenum) -> Option<u32> {
        self.units
            .get(self.active_unit as usize)?
            .get(&target)
            .copied()
    }

    fn bound_texture_mut(&mut self, target: GLenum) -> Option<&mut Texture> {
        match self.bound_texture_name(target)? {
            0 => self.default_textures.get_mut(&target),
            name => self.textures.get_mut(&name),
        }
    }

    fn bound_texture(&self, target: GLenum) -> Option<&Texture> {
        match self.bound_texture_name(target)? {
            0 => self.default_textures.get(&target),
            name => self.textures.get(&name),
        }
    }

    fn framebuffer_for(&self, target: GLenum) -> Option<u32> {
        match target {
            gl::FRAMEBUFFER | gl::DRAW_FRAMEBUFFER => Some(self.draw_framebuffer),
            gl::READ_FRAMEBUFFER => Some(self.read_framebuffer),
            _ => None,
        }
    }

    fn query(&self, pname: GLenum) -> Option<Vec<f64>> {
        let one = |v: u32| Some(vec![v as f64]);
        match pname {
            gl::CURRENT_PROGRAM => one(self.program),
            gl::VERTEX_ARRAY_BINDING => one(self.vertex_array),
            gl::DRAW_FRAMEBUFFER_BINDING => one(self.draw_framebuffer),
            gl::READ_FRAMEBUFFER_BINDING => one(self.read_framebuffer),
            gl::RENDERBUFFER_BINDING => one(self.renderbuffer),
            gl::ACTIVE_TEXTURE => one(gl::TEXTURE0 + self.active_unit),
            gl::ELEMENT_ARRAY_BUFFER_BINDING => {
                one(self.vertex_arrays.get(&self.vertex_array)?.element_buffer)
            }
            _ => {
                if let Some(p) = BUFFER_TARGETS.iter().find(|p| p.binding == pname) {
                    return one(self.generic_buffers.get(&p.target).copied().unwrap_or(0));
                }
                if let Some(p) = TEXTURE_TARGETS.iter().find(|p| p.binding == pname) {
                    return one(self.bound_texture_name(p.target)?);
                }
                self.values
                    .get(&pname)
                    .or_else(|| self.limits.get(&pname))
                    .cloned()
            }
        }
    }

    fn set_value(&mut self, pname: GLenum, value: Vec<f64>) {
        self.count();
        self.values.insert(pname, value);
    }

    /// Color image a framebuffer binding currently reads or draws.
    fn color_image_mut(&mut self, framebuffer: u32) -> Option<(&mut Vec<u8>, i32, i32)> {
        if framebuffer == 0 {
            let (w, h) = self.config.drawable;
            return Some((&mut self.drawable, w as i32, h as i32));
        }
        let attachment = *self
            .framebuffers
            .get(&framebuffer)?
            .attachments
            .get(&gl::COLOR_ATTACHMENT0)?;
        match attachment {
            Attachment::Texture {
                target,
                name,
                level,
            } => {
                let image = self.textures.get_mut(&name)?.images.get_mut(&(target, level))?;
                if image.rgba.is_empty() {
                    return None;
                }
                Some((&mut image.rgba, image.width, image.height))
            }
            Attachment::Renderbuffer(_) => None,
        }
    }

    fn unbind_program_if_pending(&mut self, program: u32) {
        let pending = self
            .programs
            .get(&program)
            .is_some_and(|p| p.delete_pending);
        if pending && self.program != program {
            self.destroy_program(program);
        }
    }

    fn destroy_program(&mut self, program: u32) {
        if let Some(p) = self.programs.remove(&program) {
            self.program_names.release(program);
            for shader in p.shaders {
                self.release_shader_if_unused(shader);
            }
        }
        self.uniform_values.retain(|&(p, _), _| p != program);
    }

    fn release_shader_if_unused(&mut self, shader: u32) {
        let pending = self.shaders.get(&shader).is_some_and(|s| s.delete_pending);
        let attached = self.programs.values().any(|p| p.shaders.contains(&shader));
        if pending && !attached {
            self.shaders.remove(&shader);
            self.program_names.release(shader);
        }
    }
}

// ---------------------------------------------------------------------------
// Shader reflection
// ---------------------------------------------------------------------------

fn glsl_type(name: &str) -> Option<GLenum> {
    Some(match name {
        "float" => gl::FLOAT,
        "vec2" => gl::FLOAT_VEC2,
        "vec3" => gl::FLOAT_VEC3,
        "vec4" => gl::FLOAT_VEC4,
        "int" => gl::INT,
        "ivec2" => gl::INT_VEC2,
        "ivec3" => gl::INT_VEC3,
        "ivec4" => gl::INT_VEC4,
        "bool" => gl::BOOL,
        "mat2" => gl::FLOAT_MAT2,
        "mat3" => gl::FLOAT_MAT3,
        "mat4" => gl::FLOAT_MAT4,
        "sampler2D" => gl::SAMPLER_2D,
        "samplerCube" => gl::SAMPLER_CUBE,
        "sampler3D" => gl::SAMPLER_3D,
        "sampler2DArray" => gl::SAMPLER_2D_ARRAY,
        _ => return None,
    })
}

/// Declarations `qualifier type name[size];` found in `source`, for any of
/// the given storage qualifiers.
fn declarations(source: &str, qualifiers: &[&str]) -> Vec<ActiveInfo> {
    const SKIP: [&str; 8] = [
        "highp", "mediump", "lowp", "flat", "smooth", "centroid", "invariant", "const",
    ];
    let mut out = Vec::new();
    for statement in source.split(';') {
        let statement = match statement.rfind(['}', '{']) {
            Some(i) => &statement[i + 1..],
            None => statement,
        };
        // Drop `layout(...)` qualifiers and line comments.
        let cleaned: String = statement
            .lines()
            .map(|l| l.split("//").next().unwrap_or(""))
            .collect::<Vec<_>>()
            .join(" ");
        let cleaned = match (cleaned.find("layout"), cleaned.find(')')) {
            (Some(start), Some(end)) if start < end => {
                format!("{} {}", &cleaned[..start], &cleaned[end + 1..])
            }
            _ => cleaned,
        };

        let mut words = cleaned.split_whitespace().filter(|w| !SKIP.contains(w));
        let Some(qualifier) = words.next() else {
            continue;
        };
        if !qualifiers.contains(&qualifier) {
            continue;
        }
        let (Some(ty), Some(rest)) = (words.next().and_then(glsl_type), words.next()) else {
            continue;
        };
        for declarator in rest.split(',').chain(words.flat_map(|w| w.split(','))) {
            let declarator = declarator.trim();
            if declarator.is_empty() {
                continue;
            }
            let (name, size) = match declarator.split_once('[') {
                Some((base, len)) => {
                    let size = len.trim_end_matches(']').trim().parse().unwrap_or(1);
                    (format!("{base}[0]"), size)
                }
                None => (declarator.to_owned(), 1),
            };
            out.push(ActiveInfo { size, ty, name });
        }
    }
    out
}

// ---------------------------------------------------------------------------
// GlContext
// ---------------------------------------------------------------------------

impl GlContext for SoftContext {
    fn get_integers(&mut self, pname: GLenum, out: &mut [i32]) {
        match self.query(pname) {
            Some(v) => out
                .iter_mut()
                .zip(v)
                .for_each(|(o, v)| *o = v.round() as i32),
            None => self.fail(gl::INVALID_ENUM),
        }
    }

    fn get_floats(&mut self, pname: GLenum, out: &mut [f32]) {
        match self.query(pname) {
            Some(v) => out.iter_mut().zip(v).for_each(|(o, v)| *o = v as f32),
            None => self.fail(gl::INVALID_ENUM),
        }
    }

    fn get_booleans(&mut self, pname: GLenum, out: &mut [bool]) {
        match self.query(pname) {
            Some(v) => out.iter_mut().zip(v).for_each(|(o, v)| *o = v != 0.0),
            None => self.fail(gl::INVALID_ENUM),
        }
    }

    fn get_integer_indexed(&mut self, pname: GLenum, index: u32) -> i32 {
        if pname != gl::UNIFORM_BUFFER_BINDING || index >= UNIFORM_BINDINGS {
            self.fail(gl::INVALID_VALUE);
            return 0;
        }
        self.indexed_buffers
            .get(&(gl::UNIFORM_BUFFER, index))
            .copied()
            .unwrap_or(0) as i32
    }

    fn is_enabled(&mut self, cap: GLenum) -> bool {
        match self.caps.get(&cap) {
            Some(&on) => on,
            None => {
                self.fail(gl::INVALID_ENUM);
                false
            }
        }
    }

    fn get_tex_parameter_i(&mut self, target: GLenum, pname: GLenum) -> i32 {
        match self.bound_texture(target).and_then(|t| t.params.get(&pname)) {
            Some(&v) => v.round() as i32,
            None => {
                self.fail(gl::INVALID_ENUM);
                0
            }
        }
    }

    fn get_tex_parameter_f(&mut self, target: GLenum, pname: GLenum) -> f32 {
        match self.bound_texture(target).and_then(|t| t.params.get(&pname)) {
            Some(&v) => v as f32,
            None => {
                self.fail(gl::INVALID_ENUM);
                0.0
            }
        }
    }

    fn get_string(&mut self, name: GLenum) -> String {
        match name {
            gl::VERSION => self.config.version.clone(),
            gl::VENDOR => "glvirt".to_owned(),
            gl::RENDERER => "software".to_owned(),
            gl::SHADING_LANGUAGE_VERSION => "3.30".to_owned(),
            _ => {
                self.fail(gl::INVALID_ENUM);
                String::new()
            }
        }
    }

    fn get_extensions(&mut self) -> Vec<String> {
        let mut extensions = vec!["GL_ARB_vertex_array_object".to_owned()];
        if self.config.anisotropy {
            extensions.push("GL_EXT_texture_filter_anisotropic".to_owned());
        }
        extensions
    }

    fn get_shader_precision_format(&mut self, _stage: GLenum, precision: GLenum) -> PrecisionFormat {
        match precision {
            gl::LOW_INT | gl::MEDIUM_INT | gl::HIGH_INT => PrecisionFormat::INT32,
            _ => PrecisionFormat::FLOAT32,
        }
    }

    fn drawable_size(&mut self) -> (u32, u32) {
        self.config.drawable
    }

    // -----------------------------------------------------------------------
    // Bindings and draw state
    // -----------------------------------------------------------------------

    fn use_program(&mut self, program: u32) {
        self.count();
        if program != 0 && !self.programs.contains_key(&program) {
            return self.fail(gl::INVALID_OPERATION);
        }
        let previous = std::mem::replace(&mut self.program, program);
        self.unbind_program_if_pending(previous);
    }

    fn bind_buffer(&mut self, target: GLenum, buffer: u32) {
        self.count();
        if buffer != 0 && !self.buffers.contains_key(&buffer) {
            return self.fail(gl::INVALID_OPERATION);
        }
        if target == gl::ELEMENT_ARRAY_BUFFER {
            if let Some(vao) = self.vertex_arrays.get_mut(&self.vertex_array) {
                vao.element_buffer = buffer;
            }
            return;
        }
        match self.generic_buffers.get_mut(&target) {
            Some(bound) => *bound = buffer,
            None => self.fail(gl::INVALID_ENUM),
        }
    }

    fn bind_buffer_base(&mut self, target: GLenum, index: u32, buffer: u32) {
        self.count();
        if !matches!(target, gl::UNIFORM_BUFFER | gl::TRANSFORM_FEEDBACK_BUFFER) {
            return self.fail(gl::INVALID_ENUM);
        }
        if index >= UNIFORM_BINDINGS {
            return self.fail(gl::INVALID_VALUE);
        }
        if buffer != 0 && !self.buffers.contains_key(&buffer) {
            return self.fail(gl::INVALID_OPERATION);
        }
        if buffer == 0 {
            self.indexed_buffers.remove(&(target, index));
        } else {
            self.indexed_buffers.insert((target, index), buffer);
        }
        self.generic_buffers.insert(target, buffer);
    }

    fn bind_framebuffer(&mut self, target: GLenum, framebuffer: u32) {
        self.count();
        if framebuffer != 0 && !self.framebuffers.contains_key(&framebuffer) {
            return self.fail(gl::INVALID_OPERATION);
        }
        match target {
            gl::FRAMEBUFFER => {
                self.draw_framebuffer = framebuffer;
                self.read_framebuffer = framebuffer;
            }
            gl::DRAW_FRAMEBUFFER => self.draw_framebuffer = framebuffer,
            gl::READ_FRAMEBUFFER => self.read_framebuffer = framebuffer,
            _ => self.fail(gl::INVALID_ENUM),
        }
    }

    fn bind_renderbuffer(&mut self, target: GLenum, renderbuffer: u32) {
        self.count();
        if target != gl::RENDERBUFFER {
            return self.fail(gl::INVALID_ENUM);
        }
        if renderbuffer != 0 && !self.renderbuffers.contains_key(&renderbuffer) {
            return self.fail(gl::INVALID_OPERATION);
        }
        self.renderbuffer = renderbuffer;
    }

    fn bind_vertex_array(&mut self, array: u32) {
        self.count();
        if !self.vertex_arrays.contains_key(&array) {
            return self.fail(gl::INVALID_OPERATION);
        }
        self.vertex_array = array;
    }

    fn active_texture(&mut self, unit: GLenum) {
        self.count();
        match unit.checked_sub(gl::TEXTURE0) {
            Some(i) if i < self.config.texture_units => self.active_unit = i,
            _ => self.fail(gl::INVALID_ENUM),
        }
    }

    fn bind_texture(&mut self, target: GLenum, texture: u32) {
        self.count();
        if !self.default_textures.contains_key(&target) {
            return self.fail(gl::INVALID_ENUM);
        }
        if texture != 0 {
            let anisotropy = self.config.anisotropy;
            let Some(object) = self.textures.get_mut(&texture) else {
                return self.fail(gl::INVALID_OPERATION);
            };
            match object.target {
                Some(bound) if bound != target => return self.fail(gl::INVALID_OPERATION),
                Some(_) => {}
                None => {
                    object.target = Some(target);
                    object.params = default_tex_params(anisotropy);
                }
            }
        }
        if let Some(unit) = self.unit_mut() {
            unit.insert(target, texture);
        }
    }

    fn tex_parameter_i(&mut self, target: GLenum, pname: GLenum, value: i32) {
        self.tex_parameter_f(target, pname, value as f32);
        // Integer input is exact for integer parameters.
        if !is_float_tex_param(pname) {
            if let Some(texture) = self.bound_texture_mut(target) {
                if let Some(slot) = texture.params.get_mut(&pname) {
                    *slot = value as f64;
                }
            }
        }
    }

    fn tex_parameter_f(&mut self, target: GLenum, pname: GLenum, value: f32) {
        self.count();
        let Some(texture) = self.bound_texture_mut(target) else {
            return self.fail(gl::INVALID_ENUM);
        };
        match texture.params.get_mut(&pname) {
            Some(slot) if is_float_tex_param(pname) => *slot = value as f64,
            Some(slot) => *slot = value.trunc() as f64,
            None => self.fail(gl::INVALID_ENUM),
        }
    }

    fn enable(&mut self, cap: GLenum) {
        self.count();
        match self.caps.get_mut(&cap) {
            Some(on) => *on = true,
            None => self.fail(gl::INVALID_ENUM),
        }
    }

    fn disable(&mut self, cap: GLenum) {
        self.count();
        match self.caps.get_mut(&cap) {
            Some(on) => *on = false,
            None => self.fail(gl::INVALID_ENUM),
        }
    }

    fn cull_face(&mut self, mode: GLenum) {
        self.set_value(gl::CULL_FACE_MODE, vec![mode as f64]);
    }

    fn depth_func(&mut self, func: GLenum) {
        self.set_value(gl::DEPTH_FUNC, vec![func as f64]);
    }

    fn front_face(&mut self, mode: GLenum) {
        self.set_value(gl::FRONT_FACE, vec![mode as f64]);
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        let color = unit_color([r, g, b, a]).map(f64::from);
        self.set_value(gl::COLOR_CLEAR_VALUE, color.to_vec());
    }

    fn clear_depth(&mut self, depth: f32) {
        self.set_value(gl::DEPTH_CLEAR_VALUE, vec![depth.clamp(0.0, 1.0) as f64]);
    }

    fn clear_stencil(&mut self, s: i32) {
        self.set_value(gl::STENCIL_CLEAR_VALUE, vec![s as f64]);
    }

    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        if width < 0 || height < 0 {
            self.count();
            return self.fail(gl::INVALID_VALUE);
        }
        self.set_value(
            gl::SCISSOR_BOX,
            vec![x as f64, y as f64, width as f64, height as f64],
        );
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        if width < 0 || height < 0 {
            self.count();
            return self.fail(gl::INVALID_VALUE);
        }
        self.set_value(
            gl::VIEWPORT,
            vec![x as f64, y as f64, width as f64, height as f64],
        );
    }

    fn blend_func_separate(&mut self, src_rgb: GLenum, dst_rgb: GLenum, src_a: GLenum, dst_a: GLenum) {
        self.count();
        for (pname, v) in [
            (gl::BLEND_SRC_RGB, src_rgb),
            (gl::BLEND_DST_RGB, dst_rgb),
            (gl::BLEND_SRC_ALPHA, src_a),
            (gl::BLEND_DST_ALPHA, dst_a),
        ] {
            self.values.insert(pname, vec![v as f64]);
        }
    }

    fn blend_equation_separate(&mut self, rgb: GLenum, alpha: GLenum) {
        self.count();
        self.values.insert(gl::BLEND_EQUATION_RGB, vec![rgb as f64]);
        self.values.insert(gl::BLEND_EQUATION_ALPHA, vec![alpha as f64]);
    }

    fn blend_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        let color = unit_color([r, g, b, a]).map(f64::from);
        self.set_value(gl::BLEND_COLOR, color.to_vec());
    }

    fn color_mask(&mut self, r: bool, g: bool, b: bool, a: bool) {
        let bit = |v: bool| if v { 1.0 } else { 0.0 };
        self.set_value(gl::COLOR_WRITEMASK, vec![bit(r), bit(g), bit(b), bit(a)]);
    }

    fn depth_mask(&mut self, flag: bool) {
        self.set_value(gl::DEPTH_WRITEMASK, vec![if flag { 1.0 } else { 0.0 }]);
    }

    fn depth_range(&mut self, near: f32, far: f32) {
        self.set_value(
            gl::DEPTH_RANGE,
            vec![near.clamp(0.0, 1.0) as f64, far.clamp(0.0, 1.0) as f64],
        );
    }

    fn line_width(&mut self, width: f32) {
        if width <= 0.0 {
            self.count();
            return self.fail(gl::INVALID_VALUE);
        }
        self.set_value(gl::LINE_WIDTH, vec![width as f64]);
    }

    fn polygon_offset(&mut self, factor: f32, units: f32) {
        self.count();
        self.values.insert(gl::POLYGON_OFFSET_FACTOR, vec![factor as f64]);
        self.values.insert(gl::POLYGON_OFFSET_UNITS, vec![units as f64]);
    }

    fn pixel_store_i(&mut self, pname: GLenum, value: i32) {
        if !matches!(pname, gl::UNPACK_ALIGNMENT | gl::PACK_ALIGNMENT) {
            self.count();
            return self.fail(gl::INVALID_ENUM);
        }
        if !matches!(value, 1 | 2 | 4 | 8) {
            self.count();
            return self.fail(gl::INVALID_VALUE);
        }
        self.set_value(pname, vec![value as f64]);
    }

    // -----------------------------------------------------------------------
    // Object lifecycle
    // -----------------------------------------------------------------------

    fn gen_texture(&mut self) -> u32 {
        self.count();
        let name = self.texture_names.alloc();
        self.textures.insert(name, Texture::default());
        name
    }

    fn gen_buffer(&mut self) -> u32 {
        self.count();
        let name = self.buffer_names.alloc();
        self.buffers.insert(name, Vec::new());
        name
    }

    fn gen_framebuffer(&mut self) -> u32 {
        self.count();
        let name = self.framebuffer_names.alloc();
        self.framebuffers.insert(name, Framebuffer::default());
        name
    }

    fn gen_renderbuffer(&mut self) -> u32 {
        self.count();
        let name = self.renderbuffer_names.alloc();
        self.renderbuffers.insert(name, (gl::RGBA4, 0, 0));
        name
    }

    fn gen_vertex_array(&mut self) -> u32 {
        self.count();
        let name = self.vertex_array_names.alloc();
        self.vertex_arrays.insert(name, VertexArray::default());
        name
    }

    fn create_program(&mut self) -> u32 {
        self.count();
        let name = self.program_names.alloc();
        self.programs.insert(name, Program::default());
        name
    }

    fn create_shader(&mut self, kind: GLenum) -> u32 {
        self.count();
        if !matches!(kind, gl::VERTEX_SHADER | gl::FRAGMENT_SHADER) {
            self.fail(gl::INVALID_ENUM);
            return 0;
        }
        let name = self.program_names.alloc();
        self.shaders.insert(
            name,
            Shader {
                kind,
                source: String::new(),
                compiled: false,
                log: String::new(),
                delete_pending: false,
            },
        );
        name
    }

    fn delete_texture(&mut self, texture: u32) {
        self.count();
        if texture == 0 || self.textures.remove(&texture).is_none() {
            return;
        }
        for unit in &mut self.units {
            for bound in unit.values_mut() {
                if *bound == texture {
                    *bound = 0;
                }
            }
        }
        self.texture_names.release(texture);
    }

    fn delete_buffer(&mut self, buffer: u32) {
        self.count();
        if buffer == 0 || self.buffers.remove(&buffer).is_none() {
            return;
        }
        for bound in self.generic_buffers.values_mut() {
            if *bound == buffer {
                *bound = 0;
            }
        }
        self.indexed_buffers.retain(|_, bound| *bound != buffer);
        if let Some(vao) = self.vertex_arrays.get_mut(&self.vertex_array) {
            if vao.element_buffer == buffer {
                vao.element_buffer = 0;
            }
        }
        self.buffer_names.release(buffer);
    }

    fn delete_framebuffer(&mut self, framebuffer: u32) {
        self.count();
        if framebuffer == 0 || self.framebuffers.remove(&framebuffer).is_none() {
            return;
        }
        if self.draw_framebuffer == framebuffer {
            self.draw_framebuffer = 0;
        }
        if self.read_framebuffer == framebuffer {
            self.read_framebuffer = 0;
        }
        self.framebuffer_names.release(framebuffer);
    }

    fn delete_renderbuffer(&mut self, renderbuffer: u32) {
        self.count();
        if renderbuffer == 0 || self.renderbuffers.remove(&renderbuffer).is_none() {
            return;
        }
        if self.renderbuffer == renderbuffer {
            self.renderbuffer = 0;
        }
        self.renderbuffer_names.release(renderbuffer);
    }

    fn delete_vertex_array(&mut self, array: u32) {
        self.count();
        if array == 0 || self.vertex_arrays.remove(&array).is_none() {
            return;
        }
        if self.vertex_array == array {
            self.vertex_array = 0;
        }
        self.vertex_array_names.release(array);
    }

    fn delete_program(&mut self, program: u32) {
        self.count();
        let Some(p) = self.programs.get_mut(&program) else {
            if program != 0 {
                self.fail(gl::INVALID_VALUE);
            }
            return;
        };
        p.delete_pending = true;
        self.unbind_program_if_pending(program);
    }

    fn delete_shader(&mut self, shader: u32) {
        self.count();
        let Some(s) = self.shaders.get_mut(&shader) else {
            if shader != 0 {
                self.fail(gl::INVALID_VALUE);
            }
            return;
        };
        s.delete_pending = true;
        self.release_shader_if_unused(shader);
    }

    // -----------------------------------------------------------------------
    // Resource setup
    // -----------------------------------------------------------------------

    fn shader_source(&mut self, shader: u32, source: &str) {
        self.count();
        match self.shaders.get_mut(&shader) {
            Some(s) => s.source = source.to_owned(),
            None => self.fail(gl::INVALID_VALUE),
        }
    }

    fn compile_shader(&mut self, shader: u32) {
        self.count();
        let Some(s) = self.shaders.get_mut(&shader) else {
            return self.fail(gl::INVALID_VALUE);
        };
        s.compiled = s.source.contains("main");
        s.log = if s.compiled {
            String::new()
        } else {
            "ERROR: 0:1: 'main' : function not defined".to_owned()
        };
    }

    fn attach_shader(&mut self, program: u32, shader: u32) {
        self.count();
        if !self.shaders.contains_key(&shader) {
            return self.fail(gl::INVALID_VALUE);
        }
        match self.programs.get_mut(&program) {
            Some(p) if p.shaders.contains(&shader) => self.fail(gl::INVALID_OPERATION),
            Some(p) => p.shaders.push(shader),
            None => self.fail(gl::INVALID_VALUE),
        }
    }

    fn link_program(&mut self, program: u32) {
        self.count();
        let Some(p) = self.programs.get(&program) else {
            return self.fail(gl::INVALID_VALUE);
        };
        let shaders: Vec<&Shader> = p.shaders.iter().filter_map(|s| self.shaders.get(s)).collect();
        let stage = |kind| shaders.iter().find(|s| s.kind == kind && s.compiled);
        let (vertex, fragment) = (stage(gl::VERTEX_SHADER), stage(gl::FRAGMENT_SHADER));

        let (linked, log, inputs, uniforms) = match (vertex, fragment) {
            (Some(v), Some(f)) => {
                let inputs = declarations(&v.source, &["attribute", "in"]);
                let mut uniforms = declarations(&v.source, &["uniform"]);
                for u in declarations(&f.source, &["uniform"]) {
                    if !uniforms.iter().any(|e| e.name == u.name) {
                        uniforms.push(u);
                    }
                }
                (true, String::new(), inputs, uniforms)
            }
            _ => (
                false,
                "error: program lacks a compiled vertex and fragment shader".to_owned(),
                Vec::new(),
                Vec::new(),
            ),
        };

        let Some(p) = self.programs.get_mut(&program) else {
            return;
        };
        let mut used: BTreeSet<i32> = inputs
            .iter()
            .filter_map(|a| p.attrib_bindings.get(&a.name).map(|&l| l as i32))
            .collect();
        let mut next = 0;
        p.attribs = inputs
            .into_iter()
            .map(|info| {
                let location = match p.attrib_bindings.get(&info.name) {
                    Some(&l) => l as i32,
                    None => {
                        while used.contains(&next) {
                            next += 1;
                        }
                        used.insert(next);
                        next
                    }
                };
                (info, location)
            })
            .collect();
        p.uniforms = uniforms;
        p.linked = linked;
        p.log = log;
    }

    fn bind_attrib_location(&mut self, program: u32, index: u32, name: &str) {
        self.count();
        match self.programs.get_mut(&program) {
            Some(p) => {
                p.attrib_bindings.insert(name.to_owned(), index);
            }
            None => self.fail(gl::INVALID_VALUE),
        }
    }

    fn buffer_data(&mut self, target: GLenum, size: usize, data: Option<&[u8]>, _usage: GLenum) {
        self.count();
        let bound = match target {
            gl::ELEMENT_ARRAY_BUFFER => self
                .vertex_arrays
                .get(&self.vertex_array)
                .map_or(0, |v| v.element_buffer),
            _ => self.generic_buffers.get(&target).copied().unwrap_or(0),
        };
        match self.buffers.get_mut(&bound) {
            Some(contents) => {
                *contents = match data {
                    Some(bytes) => bytes.to_vec(),
                    None => vec![0; size],
                }
            }
            None => self.fail(gl::INVALID_OPERATION),
        }
    }

    fn buffer_sub_data(&mut self, target: GLenum, offset: usize, data: &[u8]) {
        self.count();
        let bound = match target {
            gl::ELEMENT_ARRAY_BUFFER => self
                .vertex_arrays
                .get(&self.vertex_array)
                .map_or(0, |v| v.element_buffer),
            _ => self.generic_buffers.get(&target).copied().unwrap_or(0),
        };
        match self.buffers.get_mut(&bound) {
            Some(contents) if offset + data.len() <= contents.len() => {
                contents[offset..offset + data.len()].copy_from_slice(data);
            }
            Some(_) => self.fail(gl::INVALID_VALUE),
            None => self.fail(gl::INVALID_OPERATION),
        }
    }

    fn tex_image_2d(
        &mut self,
        target: GLenum,
        level: i32,
        _internal_format: i32,
        width: i32,
        height: i32,
        format: GLenum,
        ty: GLenum,
        pixels: Option<&[u8]>,
    ) {
        self.count();
        if width < 0 || height < 0 || level < 0 {
            return self.fail(gl::INVALID_VALUE);
        }
        let rgba8 = format == gl::RGBA && ty == gl::UNSIGNED_BYTE;
        let len = (width * height * 4) as usize;
        let rgba = match (rgba8, pixels) {
            (true, Some(p)) if p.len() >= len => p[..len].to_vec(),
            (true, Some(_)) => return self.fail(gl::INVALID_OPERATION),
            (true, None) => vec![0; len],
            (false, _) => Vec::new(),
        };
        let Some(texture) = self.bound_texture_mut(texture_target_of(target)) else {
            return self.fail(gl::INVALID_ENUM);
        };
        texture.images.insert(
            (target, level),
            Image {
                width,
                height,
                rgba,
            },
        );
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
        self.count();
        let Some(texture) = self.bound_texture_mut(texture_target_of(target)) else {
            return self.fail(gl::INVALID_ENUM);
        };
        let Some(image) = texture.images.get_mut(&(target, level)) else {
            return self.fail(gl::INVALID_OPERATION);
        };
        if x < 0 || y < 0 || x + width > image.width || y + height > image.height {
            return self.fail(gl::INVALID_VALUE);
        }
        if format != gl::RGBA || ty != gl::UNSIGNED_BYTE || image.rgba.is_empty() {
            return;
        }
        let row = (width * 4) as usize;
        for (r, src) in pixels.chunks(row).take(height as usize).enumerate() {
            let start = (((y + r as i32) * image.width + x) * 4) as usize;
            image.rgba[start..start + src.len()].copy_from_slice(src);
        }
    }

    fn generate_mipmap(&mut self, target: GLenum) {
        self.count();
        if self.bound_texture(target).is_none() {
            self.fail(gl::INVALID_ENUM);
        }
    }

    fn framebuffer_texture_2d(
        &mut self,
        target: GLenum,
        attachment: GLenum,
        tex_target: GLenum,
        texture: u32,
        level: i32,
    ) {
        self.count();
        let Some(framebuffer) = self.framebuffer_for(target) else {
            return self.fail(gl::INVALID_ENUM);
        };
        if texture != 0 && !self.textures.contains_key(&texture) {
            return self.fail(gl::INVALID_OPERATION);
        }
        let Some(fb) = self.framebuffers.get_mut(&framebuffer) else {
            return self.fail(gl::INVALID_OPERATION);
        };
        if texture == 0 {
            fb.attachments.remove(&attachment);
        } else {
            fb.attachments.insert(
                attachment,
                Attachment::Texture {
                    target: tex_target,
                    name: texture,
                    level,
                },
            );
        }
    }

    fn framebuffer_renderbuffer(
        &mut self,
        target: GLenum,
        attachment: GLenum,
        _rb_target: GLenum,
        renderbuffer: u32,
    ) {
        self.count();
        let Some(framebuffer) = self.framebuffer_for(target) else {
            return self.fail(gl::INVALID_ENUM);
        };
        let Some(fb) = self.framebuffers.get_mut(&framebuffer) else {
            return self.fail(gl::INVALID_OPERATION);
        };
        if renderbuffer == 0 {
            fb.attachments.remove(&attachment);
        } else {
            fb.attachments
                .insert(attachment, Attachment::Renderbuffer(renderbuffer));
        }
    }

    fn renderbuffer_storage(&mut self, target: GLenum, format: GLenum, width: i32, height: i32) {
        self.count();
        if target != gl::RENDERBUFFER {
            return self.fail(gl::INVALID_ENUM);
        }
        match self.renderbuffers.get_mut(&self.renderbuffer) {
            Some(storage) => *storage = (format, width, height),
            None => self.fail(gl::INVALID_OPERATION),
        }
    }

    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        _size: i32,
        _ty: GLenum,
        _normalized: bool,
        _stride: i32,
        _offset: usize,
    ) {
        self.count();
        if index >= 16 {
            self.fail(gl::INVALID_VALUE);
        }
    }

    fn enable_vertex_attrib_array(&mut self, index: u32) {
        self.count();
        if let Some(vao) = self.vertex_arrays.get_mut(&self.vertex_array) {
            vao.enabled.insert(index);
        }
    }

    fn disable_vertex_attrib_array(&mut self, index: u32) {
        self.count();
        if let Some(vao) = self.vertex_arrays.get_mut(&self.vertex_array) {
            vao.enabled.remove(&index);
        }
    }

    fn get_uniform_location(&mut self, program: u32, name: &str) -> i32 {
        self.count();
        let Some(p) = self.programs.get(&program) else {
            self.fail(gl::INVALID_VALUE);
            return -1;
        };
        if !p.linked {
            self.fail(gl::INVALID_OPERATION);
            return -1;
        }
        p.uniforms
            .iter()
            .position(|u| u.name == name || u.name.strip_suffix("[0]") == Some(name))
            .map_or(-1, |i| i as i32)
    }

    fn uniform_floats(&mut self, location: i32, _components: i32, values: &[f32]) {
        self.count();
        if self.program == 0 {
            return self.fail(gl::INVALID_OPERATION);
        }
        if location >= 0 {
            self.uniform_values
                .insert((self.program, location), values.to_vec());
        }
    }

    fn uniform_ints(&mut self, location: i32, _components: i32, values: &[i32]) {
        self.count();
        if self.program == 0 {
            return self.fail(gl::INVALID_OPERATION);
        }
        if location >= 0 {
            self.uniform_values
                .insert((self.program, location), values.iter().map(|&v| v as f32).collect());
        }
    }

    fn uniform_matrix(&mut self, location: i32, dim: i32, transpose: bool, values: &[f32]) {
        self.count();
        if self.program == 0 {
            return self.fail(gl::INVALID_OPERATION);
        }
        if location < 0 {
            return;
        }
        let stored = if transpose {
            let n = dim as usize;
            values
                .chunks(n * n)
                .flat_map(|m| (0..n * n).map(move |i| m[(i % n) * n + i / n]))
                .collect()
        } else {
            values.to_vec()
        };
        self.uniform_values.insert((self.program, location), stored);
    }

    // -----------------------------------------------------------------------
    // Drawing
    // -----------------------------------------------------------------------

    fn clear(&mut self, mask: GLbitfield) {
        self.count();
        if mask & gl::COLOR_BUFFER_BIT == 0 {
            return;
        }
        let color = self.values[&gl::COLOR_CLEAR_VALUE].clone();
        let rgba = [unorm8(color[0]), unorm8(color[1]), unorm8(color[2]), unorm8(color[3])];
        let scissor = self.caps[&gl::SCISSOR_TEST].then(|| {
            let b = &self.values[&gl::SCISSOR_BOX];
            (b[0] as i32, b[1] as i32, b[2] as i32, b[3] as i32)
        });
        let Some((pixels, width, height)) = self.color_image_mut(self.draw_framebuffer) else {
            return;
        };
        let (x0, y0, w, h) = scissor.unwrap_or((0, 0, width, height));
        for y in y0.max(0)..(y0 + h).min(height) {
            for x in x0.max(0)..(x0 + w).min(width) {
                let i = ((y * width + x) * 4) as usize;
                pixels[i..i + 4].copy_from_slice(&rgba);
            }
        }
    }

    fn draw_arrays(&mut self, _mode: GLenum, first: i32, count: i32) {
        self.count();
        if first < 0 || count < 0 {
            return self.fail(gl::INVALID_VALUE);
        }
        if self.program == 0 {
            return self.fail(gl::INVALID_OPERATION);
        }
        self.draws += 1;
    }

    fn draw_elements(&mut self, _mode: GLenum, count: i32, _ty: GLenum, _offset: usize) {
        self.count();
        if count < 0 {
            return self.fail(gl::INVALID_VALUE);
        }
        if self.program == 0 {
            return self.fail(gl::INVALID_OPERATION);
        }
        self.draws += 1;
    }

    fn flush(&mut self) {
        self.count();
    }

    fn finish(&mut self) {
        self.count();
    }

    // -----------------------------------------------------------------------
    // Round-trip queries
    // -----------------------------------------------------------------------

    fn get_attrib_location(&mut self, program: u32, name: &str) -> i32 {
        match self.programs.get(&program) {
            Some(p) if p.linked => p
                .attribs
                .iter()
                .find(|(info, _)| info.name == name)
                .map_or(-1, |&(_, location)| location),
            Some(_) => {
                self.fail(gl::INVALID_OPERATION);
                -1
            }
            None => {
                self.fail(gl::INVALID_VALUE);
                -1
            }
        }
    }

    fn get_program_parameter(&mut self, program: u32, pname: GLenum) -> i32 {
        let Some(p) = self.programs.get(&program) else {
            self.fail(gl::INVALID_VALUE);
            return 0;
        };
        match pname {
            gl::LINK_STATUS => p.linked as i32,
            gl::DELETE_STATUS => p.delete_pending as i32,
            gl::ATTACHED_SHADERS => p.shaders.len() as i32,
            gl::ACTIVE_ATTRIBUTES => p.attribs.len() as i32,
            gl::ACTIVE_UNIFORMS => p.uniforms.len() as i32,
            gl::INFO_LOG_LENGTH => p.log.len() as i32,
            _ => {
                self.fail(gl::INVALID_ENUM);
                0
            }
        }
    }

    fn get_shader_parameter(&mut self, shader: u32, pname: GLenum) -> i32 {
        let Some(s) = self.shaders.get(&shader) else {
            self.fail(gl::INVALID_VALUE);
            return 0;
        };
        match pname {
            gl::COMPILE_STATUS => s.compiled as i32,
            gl::SHADER_TYPE => s.kind as i32,
            gl::DELETE_STATUS => s.delete_pending as i32,
            gl::INFO_LOG_LENGTH => s.log.len() as i32,
            _ => {
                self.fail(gl::INVALID_ENUM);
                0
            }
        }
    }

    fn get_program_info_log(&mut self, program: u32) -> String {
        self.programs
            .get(&program)
            .map(|p| p.log.clone())
            .unwrap_or_default()
    }

    fn get_shader_info_log(&mut self, shader: u32) -> String {
        self.shaders
            .get(&shader)
            .map(|s| s.log.clone())
            .unwrap_or_default()
    }

    fn get_active_attrib(&mut self, program: u32, index: u32) -> Option<ActiveInfo> {
        let info = self
            .programs
            .get(&program)?
            .attribs
            .get(index as usize)
            .map(|(info, _)| info.clone());
        if info.is_none() {
            self.fail(gl::INVALID_VALUE);
        }
        info
    }

    fn get_active_uniform(&mut self, program: u32, index: u32) -> Option<ActiveInfo> {
        let info = self
            .programs
            .get(&program)?
            .uniforms
            .get(index as usize)
            .cloned();
        if info.is_none() {
            self.fail(gl::INVALID_VALUE);
        }
        info
    }

    fn get_error(&mut self) -> GLenum {
        std::mem::replace(&mut self.error, gl::NO_ERROR)
    }

    fn check_framebuffer_status(&mut self, target: GLenum) -> GLenum {
        let Some(framebuffer) = self.framebuffer_for(target) else {
            self.fail(gl::INVALID_ENUM);
            return 0;
        };
        if framebuffer == 0 {
            return gl::FRAMEBUFFER_COMPLETE;
        }
        let complete = self
            .framebuffers
            .get(&framebuffer)
            .and_then(|fb| fb.attachments.get(&gl::COLOR_ATTACHMENT0))
            .is_some_and(|attachment| match *attachment {
                Attachment::Texture {
                    target,
                    name,
                    level,
                } => self
                    .textures
                    .get(&name)
                    .is_some_and(|t| t.images.contains_key(&(target, level))),
                Attachment::Renderbuffer(name) => self
                    .renderbuffers
                    .get(&name)
                    .is_some_and(|&(_, w, h)| w > 0 && h > 0),
            });
        if complete {
            gl::FRAMEBUFFER_COMPLETE
        } else {
            gl::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT
        }
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
        let mut out = vec![0; (width.max(0) * height.max(0) * 4) as usize];
        if format != gl::RGBA || ty != gl::UNSIGNED_BYTE {
            self.fail(gl::INVALID_ENUM);
            return out;
        }
        let Some((pixels, fb_w, fb_h)) = self.color_image_mut(self.read_framebuffer) else {
            self.fail(gl::INVALID_FRAMEBUFFER_OPERATION);
            return out;
        };
        for row in 0..height {
            for col in 0..width {
                let (sx, sy) = (x + col, y + row);
                if sx < 0 || sy < 0 || sx >= fb_w || sy >= fb_h {
                    continue;
                }
                let src = ((sy * fb_w + sx) * 4) as usize;
                let dst = ((row * width + col) * 4) as usize;
                out[dst..dst + 4].copy_from_slice(&pixels[src..src + 4]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deleted_names_are_reused() {
        let mut ctx = SoftContext::default();
        let a = ctx.gen_texture();
        let b = ctx.gen_texture();
        ctx.delete_texture(a);
        assert_eq!(ctx.gen_texture(), a);
        assert_ne!(a, b);
    }

    #[test]
    fn texture_parameters_belong_to_the_object() {
        let mut ctx = SoftContext::default();
        let a = ctx.gen_texture();
        let b = ctx.gen_texture();
        ctx.bind_texture(gl::TEXTURE_2D, a);
        ctx.tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as i32);
        ctx.bind_texture(gl::TEXTURE_2D, b);
        assert_eq!(
            ctx.get_tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER),
            gl::NEAREST_MIPMAP_LINEAR as i32
        );
        ctx.bind_texture(gl::TEXTURE_2D, a);
        assert_eq!(
            ctx.get_tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER),
            gl::LINEAR as i32
        );
    }

    #[test]
    fn texture_target_is_fixed_by_first_bind() {
        let mut ctx = SoftContext::default();
        let t = ctx.gen_texture();
        ctx.bind_texture(gl::TEXTURE_2D, t);
        ctx.bind_texture(gl::TEXTURE_CUBE_MAP, t);
        assert_eq!(ctx.get_error(), gl::INVALID_OPERATION);
        assert_eq!(ctx.get_error(), gl::NO_ERROR);
    }

    #[test]
    fn bind_buffer_base_replaces_generic_binding() {
        let mut ctx = SoftContext::default();
        let buffer = ctx.gen_buffer();
        ctx.bind_buffer_base(gl::UNIFORM_BUFFER, 3, buffer);
        assert_eq!(ctx.get_integer(gl::UNIFORM_BUFFER_BINDING), buffer as i32);
        assert_eq!(ctx.get_integer_indexed(gl::UNIFORM_BUFFER_BINDING, 3), buffer as i32);
        ctx.delete_buffer(buffer);
        assert_eq!(ctx.get_integer_indexed(gl::UNIFORM_BUFFER_BINDING, 3), 0);
    }

    #[test]
    fn reflection_finds_attributes_and_uniforms() {
        let mut ctx = SoftContext::default();
        let vs = ctx.create_shader(gl::VERTEX_SHADER);
        ctx.shader_source(
            vs,
            "attribute vec2 position;\nattribute vec4 color;\nuniform mat4 mvp;\nvoid main() {}",
        );
        ctx.compile_shader(vs);
        let fs = ctx.create_shader(gl::FRAGMENT_SHADER);
        ctx.shader_source(fs, "precision mediump float;\nuniform sampler2D tex[2];\nvoid main() {}");
        ctx.compile_shader(fs);

        let program = ctx.create_program();
        ctx.attach_shader(program, vs);
        ctx.attach_shader(program, fs);
        ctx.bind_attrib_location(program, 0, "color");
        ctx.link_program(program);

        assert_eq!(ctx.get_program_parameter(program, gl::LINK_STATUS), 1);
        assert_eq!(ctx.get_attrib_location(program, "color"), 0);
        assert_eq!(ctx.get_attrib_location(program, "position"), 1);
        assert_eq!(ctx.get_attrib_location(program, "missing"), -1);
        assert_eq!(ctx.get_uniform_location(program, "mvp"), 0);
        assert_eq!(ctx.get_uniform_location(program, "tex"), 1);

        let sampler = ctx.get_active_uniform(program, 1).unwrap();
        assert_eq!(sampler.name, "tex[0]");
        assert_eq!(sampler.size, 2);
        assert_eq!(sampler.ty, gl::SAMPLER_2D);
    }

    #[test]
    fn clear_is_visible_to_read_pixels() {
        let mut ctx = SoftContext::default();
        ctx.clear_color(1.0, 0.0, 0.0, 1.0);
        ctx.clear(gl::COLOR_BUFFER_BIT);
        assert_eq!(ctx.read_pixels(10, 10, 1, 1, gl::RGBA, gl::UNSIGNED_BYTE), vec![255, 0, 0, 255]);
    }

    #[test]
    fn calls_count_mutations_only() {
        let mut ctx = SoftContext::default();
        ctx.enable(gl::BLEND);
        ctx.get_integer(gl::VIEWPORT);
        ctx.is_enabled(gl::BLEND);
        assert_eq!(ctx.calls(), 1);
    }
}
