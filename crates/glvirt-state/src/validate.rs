//! Binding-point tables and live-context consistency checks.

use gl::types::GLenum;
use glvirt_core::HandleRegistry;

use crate::context::GlContext;
use crate::state::GlState;

/// Describes an OpenGL bind target and the pname that reads it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingPoint {
    pub target: GLenum,
    pub binding: GLenum,
}

const fn point(target: GLenum, binding: GLenum) -> BindingPoint {
    BindingPoint { target, binding }
}

/// Texture targets a unit can hold, in capture order.
pub const TEXTURE_TARGETS: [BindingPoint; 4] = [
    point(gl::TEXTURE_2D, gl::TEXTURE_BINDING_2D),
    point(gl::TEXTURE_CUBE_MAP, gl::TEXTURE_BINDING_CUBE_MAP),
    point(gl::TEXTURE_3D, gl::TEXTURE_BINDING_3D),
    point(gl::TEXTURE_2D_ARRAY, gl::TEXTURE_BINDING_2D_ARRAY),
];

/// Non-indexed buffer targets. `ELEMENT_ARRAY_BUFFER` is vertex-array state
/// whenever vertex arrays exist.
pub const BUFFER_TARGETS: [BindingPoint; 8] = [
    point(gl::ARRAY_BUFFER, gl::ARRAY_BUFFER_BINDING),
    point(gl::COPY_READ_BUFFER, gl::COPY_READ_BUFFER_BINDING),
    point(gl::COPY_WRITE_BUFFER, gl::COPY_WRITE_BUFFER_BINDING),
    point(gl::PIXEL_PACK_BUFFER, gl::PIXEL_PACK_BUFFER_BINDING),
    point(gl::PIXEL_UNPACK_BUFFER, gl::PIXEL_UNPACK_BUFFER_BINDING),
    point(gl::UNIFORM_BUFFER, gl::UNIFORM_BUFFER_BINDING),
    point(gl::TRANSFORM_FEEDBACK_BUFFER, gl::TRANSFORM_FEEDBACK_BUFFER_BINDING),
    point(gl::ELEMENT_ARRAY_BUFFER, gl::ELEMENT_ARRAY_BUFFER_BINDING),
];

pub fn texture_binding(target: GLenum) -> Option<GLenum> {
    TEXTURE_TARGETS
        .iter()
        .find(|p| p.target == target)
        .map(|p| p.binding)
}

pub fn buffer_binding(target: GLenum) -> Option<GLenum> {
    BUFFER_TARGETS
        .iter()
        .find(|p| p.target == target)
        .map(|p| p.binding)
}

/// Names of tracked parameters where `ctx` disagrees with `expected`.
///
/// Captures `ctx` through a scratch copy of `registry`, so handles minted for
/// natives `expected` never saw show up as differences instead of leaking
/// into the caller's registry.
pub fn diverged_parameters(
    expected: &GlState,
    ctx: &mut dyn GlContext,
    registry: &HandleRegistry,
) -> Vec<String> {
    let mut scratch = registry.clone();
    let live = GlState::create_from_live_context(ctx, expected.layout(), &mut scratch);
    expected.differences(&live)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_texture_target_has_a_binding() {
        for p in TEXTURE_TARGETS {
            assert_eq!(texture_binding(p.target), Some(p.binding));
        }
        assert_eq!(texture_binding(gl::TEXTURE_1D), None);
    }

    #[test]
    fn element_array_is_listed_last() {
        assert_eq!(
            BUFFER_TARGETS.last().map(|p| p.target),
            Some(gl::ELEMENT_ARRAY_BUFFER)
        );
    }
}
