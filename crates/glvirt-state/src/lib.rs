//! Context state tracking for replayed command buffers.
//!
//! [`GlState`] is a diffable snapshot of every tracked binding, capability,
//! value and texture parameter. It is derived either from a live context
//! or by folding recorded commands, and applied back to a context with as
//! few native calls as the known starting state allows.
//!
//! Contexts are reached through the [`GlContext`] trait:
//!
//! - [`NativeContext`] issues raw `gl::*` calls on the current context
//! - [`SoftContext`] is an in-memory reference implementation

pub mod context;
pub mod glsl;
pub mod native;
pub mod params;
pub mod soft;
pub mod state;
pub mod validate;

pub use context::{describe, ActiveInfo, GlContext};
pub use native::NativeContext;
pub use params::{ParamValue, TEXTURE_MAX_ANISOTROPY};
pub use soft::{SoftConfig, SoftContext};
pub use state::{GlState, LayoutCaps, StateLayout, TextureParams, TextureState, TextureUnitState};
pub use validate::diverged_parameters;
