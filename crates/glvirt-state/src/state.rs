//! Structured, diffable snapshot of every tracked piece of context state.
//!
//! A [`GlState`] can be derived two ways that must agree: by capturing a live
//! context ([`GlState::create_from_live_context`]) or by folding recorded
//! commands into a known state ([`GlState::process_one_command`]). It can
//! then drive a real context to itself, either unconditionally
//! ([`GlState::force_apply`]) or from a known starting point with only the
//! calls that change something ([`GlState::apply_diff`]).

use std::collections::{BTreeMap, BTreeSet};

use gl::types::GLenum;
use glvirt_core::{
    Arg, Command, CommandBuffer, DeviceDescription, Handle, HandleRegistry, Op, ResourceKind,
    StateError,
};
use tracing::{debug, trace, warn};

use crate::context::GlContext;
use crate::params::{
    apply_tex_param, capture_tex_param, is_tracked_capability, normalize_tex_param, unit_color,
    value_param, ParamValue, TextureParam, ANISOTROPY_PARAM, CAPABILITIES, TEXTURE_PARAMS, VALUE_PARAMS,
};
use crate::validate::{texture_binding, BindingPoint, BUFFER_TARGETS, TEXTURE_TARGETS};

/// Sampling parameters of one texture object, keyed by pname.
pub type TextureParams = BTreeMap<GLenum, ParamValue>;

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Caps applied on top of what the device reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutCaps {
    pub max_texture_units: u32,
    pub indexed_uniform_bindings: u32,
    pub track_vertex_arrays: bool,
}

impl Default for LayoutCaps {
    fn default() -> Self {
        Self {
            max_texture_units: 32,
            indexed_uniform_bindings: 8,
            track_vertex_arrays: true,
        }
    }
}

/// Which parameters a [`GlState`] tracks on a given device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    pub texture_units: u32,
    pub texture_targets: Vec<GLenum>,
    pub vertex_arrays: bool,
    pub anisotropy: bool,
    pub indexed_uniform_bindings: u32,
    pub drawable: (u32, u32),
}

impl Default for StateLayout {
    fn default() -> Self {
        Self {
            texture_units: 16,
            texture_targets: TEXTURE_TARGETS.iter().map(|p| p.target).collect(),
            vertex_arrays: true,
            anisotropy: false,
            indexed_uniform_bindings: 8,
            drawable: (300, 150),
        }
    }
}

impl StateLayout {
    pub fn from_device(desc: &DeviceDescription, caps: &LayoutCaps) -> Self {
        let mut texture_targets = vec![gl::TEXTURE_2D, gl::TEXTURE_CUBE_MAP];
        if desc.supports_volume_textures() {
            texture_targets.extend([gl::TEXTURE_3D, gl::TEXTURE_2D_ARRAY]);
        }
        let uniform_bindings = desc
            .limit(gl::MAX_UNIFORM_BUFFER_BINDINGS)
            .unwrap_or(0)
            .max(0) as u32;

        Self {
            texture_units: desc.max_texture_units().min(caps.max_texture_units).max(1),
            texture_targets,
            vertex_arrays: caps.track_vertex_arrays && desc.supports_vertex_arrays(),
            anisotropy: desc.supports_anisotropy(),
            indexed_uniform_bindings: caps.indexed_uniform_bindings.min(uniform_bindings),
            drawable: desc.drawable,
        }
    }

    pub fn tracks_texture_target(&self, target: GLenum) -> bool {
        self.texture_targets.contains(&target)
    }

    pub fn buffer_targets(&self) -> impl Iterator<Item = BindingPoint> + '_ {
        BUFFER_TARGETS
            .iter()
            .copied()
            .filter(move |p| p.target != gl::ELEMENT_ARRAY_BUFFER || !self.vertex_arrays)
    }

    pub fn tracks_buffer_target(&self, target: GLenum) -> bool {
        self.buffer_targets().any(|p| p.target == target)
    }

    pub fn texture_params(&self) -> impl Iterator<Item = &'static TextureParam> {
        TEXTURE_PARAMS
            .iter()
            .chain(self.anisotropy.then_some(&ANISOTROPY_PARAM))
    }

    pub fn texture_param(&self, pname: GLenum) -> Option<&'static TextureParam> {
        self.texture_params().find(|p| p.pname == pname)
    }

    pub fn default_texture_params(&self) -> TextureParams {
        self.texture_params().map(|p| (p.pname, p.default)).collect()
    }
}

// ---------------------------------------------------------------------------
// Texture units
// ---------------------------------------------------------------------------

/// One target of one texture unit: the bound texture and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureState {
    pub texture: Handle,
    pub parameters: TextureParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureUnitState {
    pub targets: BTreeMap<GLenum, TextureState>,
}

impl TextureUnitState {
    fn new(layout: &StateLayout) -> Self {
        let defaults = layout.default_texture_params();
        Self {
            targets: layout
                .texture_targets
                .iter()
                .map(|&t| {
                    (
                        t,
                        TextureState {
                            texture: Handle::NULL,
                            parameters: defaults.clone(),
                        },
                    )
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// GlState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GlState {
    layout: StateLayout,
    program: Handle,
    vertex_array: Handle,
    buffers: BTreeMap<GLenum, Handle>,
    /// Sparse; an absent binding is NULL.
    indexed_buffers: BTreeMap<(GLenum, u32), Handle>,
    draw_framebuffer: Handle,
    read_framebuffer: Handle,
    renderbuffer: Handle,
    capabilities: BTreeMap<GLenum, bool>,
    values: BTreeMap<GLenum, ParamValue>,
    active_unit: u32,
    units: Vec<TextureUnitState>,
    /// Parameters of every texture object this state has seen bound.
    texture_objects: BTreeMap<(GLenum, Handle), TextureParams>,
}

impl PartialEq for GlState {
    /// Tracked parameters only; the texture-object store is bookkeeping.
    fn eq(&self, other: &Self) -> bool {
        self.layout == other.layout
            && self.program == other.program
            && self.vertex_array == other.vertex_array
            && self.buffers == other.buffers
            && self.indexed_buffers == other.indexed_buffers
            && self.draw_framebuffer == other.draw_framebuffer
            && self.read_framebuffer == other.read_framebuffer
            && self.renderbuffer == other.renderbuffer
            && self.capabilities == other.capabilities
            && self.values == other.values
            && self.active_unit == other.active_unit
            && self.units == other.units
    }
}

impl GlState {
    /// Fresh-context defaults.
    pub fn new(layout: StateLayout) -> Self {
        let unit = TextureUnitState::new(&layout);
        let texture_objects = layout
            .texture_targets
            .iter()
            .map(|&t| ((t, Handle::NULL), layout.default_texture_params()))
            .collect();

        Self {
            program: Handle::NULL,
            vertex_array: Handle::NULL,
            buffers: layout
                .buffer_targets()
                .map(|p| (p.target, Handle::NULL))
                .collect(),
            indexed_buffers: BTreeMap::new(),
            draw_framebuffer: Handle::NULL,
            read_framebuffer: Handle::NULL,
            renderbuffer: Handle::NULL,
            capabilities: CAPABILITIES.iter().copied().collect(),
            values: VALUE_PARAMS
                .iter()
                .map(|p| (p.key, (p.default)(&layout)))
                .collect(),
            active_unit: 0,
            units: vec![unit; layout.texture_units as usize],
            texture_objects,
            layout,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn program(&self) -> Handle {
        self.program
    }

    pub fn vertex_array(&self) -> Handle {
        self.vertex_array
    }

    pub fn buffer_binding(&self, target: GLenum) -> Option<Handle> {
        self.buffers.get(&target).copied()
    }

    pub fn indexed_buffer(&self, target: GLenum, index: u32) -> Handle {
        self.indexed_buffers
            .get(&(target, index))
            .copied()
            .unwrap_or(Handle::NULL)
    }

    pub fn draw_framebuffer(&self) -> Handle {
        self.draw_framebuffer
    }

    pub fn read_framebuffer(&self) -> Handle {
        self.read_framebuffer
    }

    pub fn renderbuffer(&self) -> Handle {
        self.renderbuffer
    }

    pub fn is_enabled(&self, cap: GLenum) -> Option<bool> {
        self.capabilities.get(&cap).copied()
    }

    pub fn value(&self, key: GLenum) -> Option<ParamValue> {
        self.values.get(&key).copied()
    }

    pub fn active_unit(&self) -> u32 {
        self.active_unit
    }

    pub fn units(&self) -> &[TextureUnitState] {
        &self.units
    }

    pub fn texture_unit(&self, unit: u32) -> Option<&TextureUnitState> {
        self.units.get(unit as usize)
    }

    /// Texture state of `target` on the active unit.
    pub fn bound_texture(&self, target: GLenum) -> Option<&TextureState> {
        self.texture_unit(self.active_unit)?.targets.get(&target)
    }

    /// Whether any binding of this state names `handle`.
    pub fn references(&self, handle: Handle) -> bool {
        if handle.is_null() {
            return false;
        }
        [
            self.program,
            self.vertex_array,
            self.draw_framebuffer,
            self.read_framebuffer,
            self.renderbuffer,
        ]
        .contains(&handle)
            || self.buffers.values().any(|&b| b == handle)
            || self.indexed_buffers.values().any(|&b| b == handle)
            || self
                .units
                .iter()
                .flat_map(|u| u.targets.values())
                .any(|t| t.texture == handle)
    }

    pub fn texture_object(&self, target: GLenum, texture: Handle) -> Option<&TextureParams> {
        self.texture_objects.get(&(target, texture))
    }

    /// Value of `pname` as a `glGet*` on the mirrored context would report it.
    pub fn get(&self, pname: GLenum) -> Option<ParamValue> {
        let component = |key: GLenum, i: usize| match self.values.get(&key)? {
            ParamValue::Ints4(v) => Some(ParamValue::Enum(v[i] as GLenum)),
            ParamValue::Ints2(v) => Some(ParamValue::Enum(v[i] as GLenum)),
            ParamValue::Floats2(v) => Some(ParamValue::Float(v[i])),
            _ => None,
        };

        match pname {
            gl::CURRENT_PROGRAM => Some(ParamValue::Handle(self.program)),
            gl::VERTEX_ARRAY_BINDING if self.layout.vertex_arrays => {
                Some(ParamValue::Handle(self.vertex_array))
            }
            gl::DRAW_FRAMEBUFFER_BINDING => Some(ParamValue::Handle(self.draw_framebuffer)),
            gl::READ_FRAMEBUFFER_BINDING => Some(ParamValue::Handle(self.read_framebuffer)),
            gl::RENDERBUFFER_BINDING => Some(ParamValue::Handle(self.renderbuffer)),
            gl::ACTIVE_TEXTURE => Some(ParamValue::Enum(gl::TEXTURE0 + self.active_unit)),
            gl::BLEND_SRC_RGB => component(gl::BLEND_SRC_RGB, 0),
            gl::BLEND_DST_RGB => component(gl::BLEND_SRC_RGB, 1),
            gl::BLEND_SRC_ALPHA => component(gl::BLEND_SRC_RGB, 2),
            gl::BLEND_DST_ALPHA => component(gl::BLEND_SRC_RGB, 3),
            gl::BLEND_EQUATION_RGB => component(gl::BLEND_EQUATION_RGB, 0),
            gl::BLEND_EQUATION_ALPHA => component(gl::BLEND_EQUATION_RGB, 1),
            gl::POLYGON_OFFSET_FACTOR => component(gl::POLYGON_OFFSET_FACTOR, 0),
            gl::POLYGON_OFFSET_UNITS => component(gl::POLYGON_OFFSET_FACTOR, 1),
            _ => {
                if let Some(&on) = self.capabilities.get(&pname) {
                    return Some(ParamValue::Bool(on));
                }
                if let Some(p) = BUFFER_TARGETS.iter().find(|p| p.binding == pname) {
                    return self.buffers.get(&p.target).map(|&h| ParamValue::Handle(h));
                }
                if let Some(p) = TEXTURE_TARGETS.iter().find(|p| p.binding == pname) {
                    return self
                        .bound_texture(p.target)
                        .map(|t| ParamValue::Handle(t.texture));
                }
                self.values.get(&pname).copied()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Folding commands
    // -----------------------------------------------------------------------

    /// Update the parameters `command` touches. Ops that do not change
    /// tracked state are ignored.
    pub fn process_one_command(&mut self, command: &Command) {
        if self.fold(command).is_none() {
            warn!(op = %command.op(), args = ?command.args(), "malformed command, state not updated");
        }
    }

    /// Clone `begin` and fold every command of `buffer` into the copy.
    pub fn create_end_state_from_command_buffer(begin: &GlState, buffer: &CommandBuffer) -> GlState {
        let mut end = begin.clone();
        end.fold_buffer(buffer);
        end
    }

    pub fn fold_buffer(&mut self, buffer: &CommandBuffer) {
        for command in buffer.commands() {
            self.process_one_command(command);
        }
    }

    fn fold(&mut self, command: &Command) -> Option<()> {
        let args = Args(command.args());
        match command.op() {
            Op::UseProgram => self.program = args.handle(0)?,
            Op::BindBuffer => {
                let (target, buffer) = (args.enm(0)?, args.handle(1)?);
                if self.layout.tracks_buffer_target(target) {
                    self.buffers.insert(target, buffer);
                }
            }
            Op::BindBufferBase => {
                let (target, index, buffer) = (args.enm(0)?, args.int(1)? as u32, args.handle(2)?);
                if buffer.is_null() {
                    self.indexed_buffers.remove(&(target, index));
                } else {
                    self.indexed_buffers.insert((target, index), buffer);
                }
                if self.layout.tracks_buffer_target(target) {
                    self.buffers.insert(target, buffer);
                }
            }
            Op::BindFramebuffer => {
                let framebuffer = args.handle(1)?;
                match args.enm(0)? {
                    gl::FRAMEBUFFER => {
                        self.draw_framebuffer = framebuffer;
                        self.read_framebuffer = framebuffer;
                    }
                    gl::DRAW_FRAMEBUFFER => self.draw_framebuffer = framebuffer,
                    gl::READ_FRAMEBUFFER => self.read_framebuffer = framebuffer,
                    _ => return None,
                }
            }
            Op::BindRenderbuffer => self.renderbuffer = args.handle(1)?,
            Op::BindVertexArray => {
                let array = args.handle(0)?;
                if self.layout.vertex_arrays {
                    self.vertex_array = array;
                }
            }
            Op::ActiveTexture => {
                let unit = args.enm(0)?.checked_sub(gl::TEXTURE0)?;
                if unit >= self.layout.texture_units {
                    return None;
                }
                self.active_unit = unit;
            }
            Op::BindTexture => self.bind_texture(args.enm(0)?, args.handle(1)?)?,
            Op::TexParameteri => {
                self.set_tex_param(args.enm(0)?, args.enm_or_int(1)?, ParamValue::Int(args.int(2)?))?
            }
            Op::TexParameterf => {
                self.set_tex_param(args.enm(0)?, args.enm_or_int(1)?, ParamValue::Float(args.float(2)?))?
            }

            Op::Enable | Op::Disable => {
                let cap = args.enm(0)?;
                if is_tracked_capability(cap) {
                    self.capabilities.insert(cap, command.op() == Op::Enable);
                }
            }
            Op::CullFace => self.set_value(gl::CULL_FACE_MODE, ParamValue::Enum(args.enm(0)?)),
            Op::DepthFunc => self.set_value(gl::DEPTH_FUNC, ParamValue::Enum(args.enm(0)?)),
            Op::FrontFace => self.set_value(gl::FRONT_FACE, ParamValue::Enum(args.enm(0)?)),
            Op::ClearColor => {
                let color = unit_color(args.floats4()?);
                self.set_value(gl::COLOR_CLEAR_VALUE, ParamValue::Floats4(color))
            }
            Op::ClearDepth => {
                self.set_value(gl::DEPTH_CLEAR_VALUE, ParamValue::Float(args.float(0)?.clamp(0.0, 1.0)))
            }
            Op::ClearStencil => self.set_value(gl::STENCIL_CLEAR_VALUE, ParamValue::Int(args.int(0)?)),
            Op::Scissor => self.set_value(gl::SCISSOR_BOX, ParamValue::Ints4(args.ints4()?)),
            Op::Viewport => self.set_value(gl::VIEWPORT, ParamValue::Ints4(args.ints4()?)),
            Op::BlendFunc => {
                let (src, dst) = (args.enm(0)? as i32, args.enm(1)? as i32);
                self.set_value(gl::BLEND_SRC_RGB, ParamValue::Ints4([src, dst, src, dst]))
            }
            Op::BlendFuncSeparate => {
                let funcs = [args.enm(0)?, args.enm(1)?, args.enm(2)?, args.enm(3)?];
                self.set_value(gl::BLEND_SRC_RGB, ParamValue::Ints4(funcs.map(|f| f as i32)))
            }
            Op::BlendEquation => {
                let mode = args.enm(0)? as i32;
                self.set_value(gl::BLEND_EQUATION_RGB, ParamValue::Ints2([mode, mode]))
            }
            Op::BlendEquationSeparate => {
                let modes = [args.enm(0)? as i32, args.enm(1)? as i32];
                self.set_value(gl::BLEND_EQUATION_RGB, ParamValue::Ints2(modes))
            }
            Op::BlendColor => {
                let color = unit_color(args.floats4()?);
                self.set_value(gl::BLEND_COLOR, ParamValue::Floats4(color))
            }
            Op::ColorMask => {
                let mask = [args.boolean(0)?, args.boolean(1)?, args.boolean(2)?, args.boolean(3)?];
                self.set_value(gl::COLOR_WRITEMASK, ParamValue::Bools4(mask))
            }
            Op::DepthMask => self.set_value(gl::DEPTH_WRITEMASK, ParamValue::Bool(args.boolean(0)?)),
            Op::DepthRange => {
                let range = [args.float(0)?.clamp(0.0, 1.0), args.float(1)?.clamp(0.0, 1.0)];
                self.set_value(gl::DEPTH_RANGE, ParamValue::Floats2(range))
            }
            Op::LineWidth => {
                // GL rejects a non-positive width without changing state.
                let width = args.float(0)?;
                if width > 0.0 {
                    self.set_value(gl::LINE_WIDTH, ParamValue::Float(width));
                }
            }
            Op::PolygonOffset => {
                let offset = [args.float(0)?, args.float(1)?];
                self.set_value(gl::POLYGON_OFFSET_FACTOR, ParamValue::Floats2(offset))
            }
            Op::PixelStorei => {
                let pname = args.enm(0)?;
                if matches!(pname, gl::UNPACK_ALIGNMENT | gl::PACK_ALIGNMENT) {
                    self.set_value(pname, ParamValue::Int(args.int(1)?));
                }
            }

            Op::DeleteTexture => self.forget_texture(args.handle(0)?),
            Op::DeleteBuffer => self.forget_buffer(args.handle(0)?),
            Op::DeleteFramebuffer => {
                let framebuffer = args.handle(0)?;
                if !framebuffer.is_null() {
                    if self.draw_framebuffer == framebuffer {
                        self.draw_framebuffer = Handle::NULL;
                    }
                    if self.read_framebuffer == framebuffer {
                        self.read_framebuffer = Handle::NULL;
                    }
                }
            }
            Op::DeleteRenderbuffer => {
                let renderbuffer = args.handle(0)?;
                if self.renderbuffer == renderbuffer {
                    self.renderbuffer = Handle::NULL;
                }
            }
            Op::DeleteVertexArray => {
                let array = args.handle(0)?;
                if self.vertex_array == array {
                    self.vertex_array = Handle::NULL;
                }
            }
            // Unlike GL, a deleted program does not stay current. The
            // executor issues `useProgram(0)` before the delete so the real
            // context agrees.
            Op::DeleteProgram => {
                let program = args.handle(0)?;
                if self.program == program {
                    self.program = Handle::NULL;
                }
            }

            _ => {}
        }
        Some(())
    }

    fn set_value(&mut self, key: GLenum, value: ParamValue) {
        self.values.insert(key, value);
    }

    fn bind_texture(&mut self, target: GLenum, texture: Handle) -> Option<()> {
        if !self.layout.tracks_texture_target(target) {
            return Some(());
        }
        let layout = &self.layout;
        let parameters = self
            .texture_objects
            .entry((target, texture))
            .or_insert_with(|| layout.default_texture_params())
            .clone();
        let unit = self.units.get_mut(self.active_unit as usize)?;
        unit.targets.insert(target, TextureState { texture, parameters });
        Some(())
    }

    fn set_tex_param(&mut self, target: GLenum, pname: GLenum, raw: ParamValue) -> Option<()> {
        if !self.layout.tracks_texture_target(target) {
            return Some(());
        }
        let param = self.layout.texture_param(pname)?;
        let value = normalize_tex_param(param.kind, raw)?;
        let texture = self.bound_texture(target)?.texture;

        let layout = &self.layout;
        self.texture_objects
            .entry((target, texture))
            .or_insert_with(|| layout.default_texture_params())
            .insert(pname, value);

        // Every unit with the same object bound observes the change.
        for unit in &mut self.units {
            if let Some(state) = unit.targets.get_mut(&target) {
                if state.texture == texture {
                    state.parameters.insert(pname, value);
                }
            }
        }
        Some(())
    }

    fn forget_texture(&mut self, texture: Handle) {
        if texture.is_null() {
            return;
        }
        self.texture_objects.retain(|&(_, h), _| h != texture);
        let objects = &self.texture_objects;
        let layout = &self.layout;
        for unit in &mut self.units {
            for (&target, state) in unit.targets.iter_mut() {
                if state.texture == texture {
                    *state = TextureState {
                        texture: Handle::NULL,
                        parameters: objects
                            .get(&(target, Handle::NULL))
                            .cloned()
                            .unwrap_or_else(|| layout.default_texture_params()),
                    };
                }
            }
        }
    }

    fn forget_buffer(&mut self, buffer: Handle) {
        if buffer.is_null() {
            return;
        }
        for bound in self.buffers.values_mut() {
            if *bound == buffer {
                *bound = Handle::NULL;
            }
        }
        self.indexed_buffers.retain(|_, bound| *bound != buffer);
    }

    // -----------------------------------------------------------------------
    // Live capture
    // -----------------------------------------------------------------------

    /// Query every tracked parameter from `ctx`, keying native objects
    /// through `registry`. The active texture unit is touched and restored.
    pub fn create_from_live_context(
        ctx: &mut dyn GlContext,
        layout: &StateLayout,
        registry: &mut HandleRegistry,
    ) -> GlState {
        let mut state = GlState::new(layout.clone());
        let key = |ctx: &mut dyn GlContext, registry: &mut HandleRegistry, kind, pname| {
            registry.key_for(kind, ctx.get_integer(pname) as u32)
        };

        state.program = key(ctx, registry, ResourceKind::Program, gl::CURRENT_PROGRAM);
        if layout.vertex_arrays {
            state.vertex_array =
                key(ctx, registry, ResourceKind::VertexArray, gl::VERTEX_ARRAY_BINDING);
        }
        for p in layout.buffer_targets() {
            let buffer = key(ctx, registry, ResourceKind::Buffer, p.binding);
            state.buffers.insert(p.target, buffer);
        }
        state.draw_framebuffer =
            key(ctx, registry, ResourceKind::Framebuffer, gl::DRAW_FRAMEBUFFER_BINDING);
        state.read_framebuffer =
            key(ctx, registry, ResourceKind::Framebuffer, gl::READ_FRAMEBUFFER_BINDING);
        state.renderbuffer =
            key(ctx, registry, ResourceKind::Renderbuffer, gl::RENDERBUFFER_BINDING);

        for index in 0..layout.indexed_uniform_bindings {
            let native = ctx.get_integer_indexed(gl::UNIFORM_BUFFER_BINDING, index) as u32;
            let buffer = registry.key_for(ResourceKind::Buffer, native);
            if !buffer.is_null() {
                state.indexed_buffers.insert((gl::UNIFORM_BUFFER, index), buffer);
            }
        }

        for &(cap, _) in CAPABILITIES.iter() {
            state.capabilities.insert(cap, ctx.is_enabled(cap));
        }
        for param in VALUE_PARAMS {
            state.values.insert(param.key, (param.capture)(ctx));
        }

        let active = ctx.get_integer(gl::ACTIVE_TEXTURE) as GLenum;
        state.active_unit = active.saturating_sub(gl::TEXTURE0);
        if state.active_unit >= layout.texture_units {
            warn!(
                unit = state.active_unit,
                tracked = layout.texture_units,
                "live context has an untracked texture unit active"
            );
        }

        for (i, unit) in state.units.iter_mut().enumerate() {
            ctx.active_texture(gl::TEXTURE0 + i as u32);
            for &target in &layout.texture_targets {
                let Some(binding) = texture_binding(target) else {
                    continue;
                };
                let texture = registry.key_for(ResourceKind::Texture, ctx.get_integer(binding) as u32);
                let parameters: TextureParams = layout
                    .texture_params()
                    .map(|p| (p.pname, capture_tex_param(ctx, target, p)))
                    .collect();
                state
                    .texture_objects
                    .insert((target, texture), parameters.clone());
                unit.targets.insert(target, TextureState { texture, parameters });
            }
        }
        ctx.active_texture(active);

        debug!(
            units = layout.texture_units,
            objects = state.texture_objects.len(),
            "captured live context state"
        );
        state
    }

    // -----------------------------------------------------------------------
    // Applying
    // -----------------------------------------------------------------------

    /// Issue every tracked native call, assuming nothing about `ctx`.
    pub fn force_apply(
        &self,
        ctx: &mut dyn GlContext,
        registry: &HandleRegistry,
    ) -> Result<(), StateError> {
        self.apply(ctx, registry, None)
    }

    /// Move `ctx` from `other`, the state it is known to be in, to this state,
    /// issuing only the calls whose value differs.
    pub fn apply_diff(
        &self,
        other: &GlState,
        ctx: &mut dyn GlContext,
        registry: &HandleRegistry,
    ) -> Result<(), StateError> {
        self.apply(ctx, registry, Some(other))
    }

    /// Shared by forcing (`baseline == None`) and diffing.
    fn apply(
        &self,
        ctx: &mut dyn GlContext,
        registry: &HandleRegistry,
        baseline: Option<&GlState>,
    ) -> Result<(), StateError> {
        let names = self.resolve_all(registry)?;
        let name = |h: Handle| names.get(&h).copied().unwrap_or(0);
        let differs = |pick: &dyn Fn(&GlState) -> Handle| baseline.map_or(true, |b| pick(b) != pick(self));

        if self.layout.vertex_arrays && differs(&|s| s.vertex_array) {
            ctx.bind_vertex_array(name(self.vertex_array));
        }
        if differs(&|s| s.program) {
            ctx.use_program(name(self.program));
        }

        // Indexed binds also replace the generic binding of their target.
        let mut rebind_generic = BTreeSet::new();
        for index in 0..self.layout.indexed_uniform_bindings {
            if differs(&|s| s.indexed_buffer(gl::UNIFORM_BUFFER, index)) {
                let buffer = self.indexed_buffer(gl::UNIFORM_BUFFER, index);
                ctx.bind_buffer_base(gl::UNIFORM_BUFFER, index, name(buffer));
                rebind_generic.insert(gl::UNIFORM_BUFFER);
            }
        }
        for (&target, &buffer) in &self.buffers {
            let changed = baseline.map_or(true, |b| b.buffer_binding(target) != Some(buffer));
            if changed || rebind_generic.contains(&target) {
                ctx.bind_buffer(target, name(buffer));
            }
        }

        if differs(&|s| s.draw_framebuffer) {
            ctx.bind_framebuffer(gl::DRAW_FRAMEBUFFER, name(self.draw_framebuffer));
        }
        if differs(&|s| s.read_framebuffer) {
            ctx.bind_framebuffer(gl::READ_FRAMEBUFFER, name(self.read_framebuffer));
        }
        if differs(&|s| s.renderbuffer) {
            ctx.bind_renderbuffer(gl::RENDERBUFFER, name(self.renderbuffer));
        }

        for (&cap, &on) in &self.capabilities {
            if baseline.map_or(true, |b| b.capabilities.get(&cap) != Some(&on)) {
                if on {
                    ctx.enable(cap);
                } else {
                    ctx.disable(cap);
                }
            }
        }

        for (&key, &value) in &self.values {
            if baseline.map_or(true, |b| b.values.get(&key) != Some(&value)) {
                if let Some(param) = value_param(key) {
                    (param.apply)(ctx, value);
                }
            }
        }

        self.apply_textures(ctx, baseline, &name);
        Ok(())
    }

    fn apply_textures(
        &self,
        ctx: &mut dyn GlContext,
        baseline: Option<&GlState>,
        name: &dyn Fn(Handle) -> u32,
    ) {
        // Parameters each texture object is known to hold on `ctx`.
        let mut known = baseline
            .map(|b| b.texture_objects.clone())
            .unwrap_or_default();
        let mut active = baseline.map(|b| b.active_unit);

        for (i, unit) in self.units.iter().enumerate() {
            let i = i as u32;
            for (&target, state) in &unit.targets {
                let rebind = baseline.map_or(true, |b| {
                    b.texture_unit(i)
                        .and_then(|u| u.targets.get(&target))
                        .map(|t| t.texture)
                        != Some(state.texture)
                });
                let dirty = dirty_params(&state.parameters, known.get(&(target, state.texture)));
                if !rebind && dirty.is_empty() {
                    continue;
                }

                if active != Some(i) {
                    ctx.active_texture(gl::TEXTURE0 + i);
                    active = Some(i);
                }
                if rebind {
                    ctx.bind_texture(target, name(state.texture));
                }
                for (pname, value) in dirty {
                    apply_tex_param(ctx, target, pname, value);
                }
                known.insert((target, state.texture), state.parameters.clone());
            }
        }

        // Objects not bound anywhere are synchronized through a temporary
        // bind on the final active unit.
        let final_unit = self.active_unit;
        for (&(target, texture), parameters) in &self.texture_objects {
            let dirty = dirty_params(parameters, known.get(&(target, texture)));
            if dirty.is_empty() {
                continue;
            }
            if active != Some(final_unit) {
                ctx.active_texture(gl::TEXTURE0 + final_unit);
                active = Some(final_unit);
            }
            trace!(?texture, target, count = dirty.len(), "synchronizing unbound texture object");
            ctx.bind_texture(target, name(texture));
            for (pname, value) in dirty {
                apply_tex_param(ctx, target, pname, value);
            }
            let restore = self
                .texture_unit(final_unit)
                .and_then(|u| u.targets.get(&target))
                .map_or(Handle::NULL, |t| t.texture);
            ctx.bind_texture(target, name(restore));
            known.insert((target, texture), parameters.clone());
        }

        if active != Some(final_unit) {
            ctx.active_texture(gl::TEXTURE0 + final_unit);
        }
    }

    /// Native names for every handle this state references.
    fn resolve_all(&self, registry: &HandleRegistry) -> Result<BTreeMap<Handle, u32>, StateError> {
        let mut handles = vec![
            self.program,
            self.draw_framebuffer,
            self.read_framebuffer,
            self.renderbuffer,
        ];
        if self.layout.vertex_arrays {
            handles.push(self.vertex_array);
        }
        handles.extend(self.buffers.values());
        handles.extend(self.indexed_buffers.values());
        handles.extend(
            self.units
                .iter()
                .flat_map(|u| u.targets.values().map(|t| t.texture)),
        );
        handles.extend(self.texture_objects.keys().map(|&(_, h)| h));

        let mut names = BTreeMap::new();
        for handle in handles {
            if names.contains_key(&handle) {
                continue;
            }
            let native = registry
                .resolve(handle)
                .ok_or(StateError::UnresolvedHandle(handle))?;
            names.insert(handle, native);
        }
        Ok(names)
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    /// Human-readable list of tracked parameters that differ from `other`.
    pub fn differences(&self, other: &GlState) -> Vec<String> {
        let mut out = Vec::new();
        let mut check = |label: String, same: bool| {
            if !same {
                out.push(label);
            }
        };

        check("layout".into(), self.layout == other.layout);
        check("CURRENT_PROGRAM".into(), self.program == other.program);
        check("VERTEX_ARRAY_BINDING".into(), self.vertex_array == other.vertex_array);
        for (target, buffer) in &self.buffers {
            check(
                format!("buffer binding {target:#x}"),
                other.buffers.get(target) == Some(buffer),
            );
        }
        check(
            "indexed buffer bindings".into(),
            self.indexed_buffers == other.indexed_buffers,
        );
        check(
            "DRAW_FRAMEBUFFER_BINDING".into(),
            self.draw_framebuffer == other.draw_framebuffer,
        );
        check(
            "READ_FRAMEBUFFER_BINDING".into(),
            self.read_framebuffer == other.read_framebuffer,
        );
        check("RENDERBUFFER_BINDING".into(), self.renderbuffer == other.renderbuffer);
        for (cap, on) in &self.capabilities {
            check(format!("capability {cap:#x}"), other.capabilities.get(cap) == Some(on));
        }
        for (key, value) in &self.values {
            check(format!("value {key:#x}"), other.values.get(key) == Some(value));
        }
        check("ACTIVE_TEXTURE".into(), self.active_unit == other.active_unit);
        for (i, unit) in self.units.iter().enumerate() {
            for (target, state) in &unit.targets {
                let theirs = other.texture_unit(i as u32).and_then(|u| u.targets.get(target));
                match theirs {
                    Some(t) => {
                        check(
                            format!("unit {i} target {target:#x} texture"),
                            t.texture == state.texture,
                        );
                        for (pname, value) in &state.parameters {
                            check(
                                format!("unit {i} target {target:#x} parameter {pname:#x}"),
                                t.parameters.get(pname) == Some(value),
                            );
                        }
                    }
                    None => check(format!("unit {i} target {target:#x}"), false),
                }
            }
        }
        out
    }
}

fn dirty_params(wanted: &TextureParams, known: Option<&TextureParams>) -> Vec<(GLenum, ParamValue)> {
    wanted
        .iter()
        .filter(|(pname, value)| known.and_then(|k| k.get(pname)) != Some(value))
        .map(|(&pname, &value)| (pname, value))
        .collect()
}

/// Typed access to a command's arguments.
struct Args<'a>(&'a [Arg]);

impl Args<'_> {
    fn enm(&self, i: usize) -> Option<GLenum> {
        self.0.get(i)?.as_enum()
    }

    fn enm_or_int(&self, i: usize) -> Option<GLenum> {
        let arg = self.0.get(i)?;
        arg.as_enum().or_else(|| arg.as_int().map(|v| v as GLenum))
    }

    fn int(&self, i: usize) -> Option<i32> {
        self.0.get(i)?.as_int()
    }

    fn float(&self, i: usize) -> Option<f32> {
        self.0.get(i)?.as_float()
    }

    fn boolean(&self, i: usize) -> Option<bool> {
        self.0.get(i)?.as_bool()
    }

    fn handle(&self, i: usize) -> Option<Handle> {
        self.0.get(i)?.as_handle()
    }

    fn floats4(&self) -> Option<[f32; 4]> {
        Some([self.float(0)?, self.float(1)?, self.float(2)?, self.float(3)?])
    }

    fn ints4(&self) -> Option<[i32; 4]> {
        Some([self.int(0)?, self.int(1)?, self.int(2)?, self.int(3)?])
    }
}
