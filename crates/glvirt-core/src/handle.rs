//! Integer surrogates for native graphics resources.
//!
//! Native GL objects cannot cross the execution boundary by value, so both
//! sides agree on small signed integers instead:
//!
//! - positive handles are allocated sequentially by the producer for objects
//!   it creates, and travel with the creating command;
//! - negative handles are minted by [`HandleRegistry::key_for`] the first time
//!   a pre-existing native object is observed during a live capture;
//! - [`Handle::NULL`] names "nothing bound".

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, trace};

/// Integer surrogate for one native, non-serializable resource.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(i32);

impl Handle {
    /// "No resource bound".
    pub const NULL: Handle = Handle(0);

    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Allocated by a producer alongside a creation command.
    pub const fn is_producer_allocated(self) -> bool {
        self.0 > 0
    }

    /// Minted during a live capture for a pre-existing native object.
    pub const fn is_captured(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("Handle(null)")
        } else {
            write!(f, "Handle({})", self.0)
        }
    }
}

/// Kind of native object a handle stands for.
///
/// GL names are only unique per kind (texture 1 and buffer 1 are unrelated),
/// so native identity is always the pair (kind, name).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Texture,
    Buffer,
    Program,
    Shader,
    VertexArray,
    Framebuffer,
    Renderbuffer,
    UniformLocation,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    kind: ResourceKind,
    native: Option<u32>,
}

/// Bidirectional map between handles and native objects.
///
/// The producer only uses [`allocate`](Self::allocate) /
/// [`release`](Self::release) / [`is_live`](Self::is_live); the consumer binds
/// the same handles to the natives it creates and mints negative handles for
/// objects it finds already present in its context.
#[derive(Debug, Clone)]
pub struct HandleRegistry {
    next_positive: i32,
    next_negative: i32,
    entries: HashMap<Handle, Entry>,
    by_native: HashMap<(ResourceKind, u32), Handle>,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            next_positive: 1,
            next_negative: -1,
            entries: HashMap::new(),
            by_native: HashMap::new(),
        }
    }

    /// Fresh positive handle for a resource the producer is about to create.
    pub fn allocate(&mut self, kind: ResourceKind) -> Handle {
        let handle = Handle(self.next_positive);
        self.next_positive = self
            .next_positive
            .checked_add(1)
            .expect("positive handle space exhausted");
        self.entries.insert(handle, Entry { kind, native: None });
        trace!(?handle, ?kind, "allocated handle");
        handle
    }

    /// Stable handle for a native object seen during a capture.
    ///
    /// Returns the handle already associated with `(kind, native)` if there is
    /// one, otherwise mints the next negative handle. Name 0 is the GL null
    /// object and always maps to [`Handle::NULL`].
    pub fn key_for(&mut self, kind: ResourceKind, native: u32) -> Handle {
        if native == 0 {
            return Handle::NULL;
        }
        if let Some(&handle) = self.by_native.get(&(kind, native)) {
            return handle;
        }
        let handle = Handle(self.next_negative);
        self.next_negative = self
            .next_negative
            .checked_sub(1)
            .expect("negative handle space exhausted");
        self.entries.insert(
            handle,
            Entry {
                kind,
                native: Some(native),
            },
        );
        self.by_native.insert((kind, native), handle);
        trace!(?handle, ?kind, native, "keyed pre-existing native");
        handle
    }

    /// Associate a producer-allocated handle with the native created for it.
    pub fn bind(&mut self, handle: Handle, kind: ResourceKind, native: u32) {
        if let Some(previous) = self.entries.get(&handle).and_then(|e| e.native) {
            self.by_native.remove(&(kind, previous));
        }
        self.entries.insert(
            handle,
            Entry {
                kind,
                native: Some(native),
            },
        );
        if native != 0 {
            self.by_native.insert((kind, native), handle);
        }
        if handle.is_producer_allocated() && handle.raw() >= self.next_positive {
            self.next_positive = handle.raw() + 1;
        }
    }

    /// Native name for `handle`. The null handle resolves to 0.
    pub fn resolve(&self, handle: Handle) -> Option<u32> {
        if handle.is_null() {
            return Some(0);
        }
        self.entries.get(&handle).and_then(|e| e.native)
    }

    pub fn kind_of(&self, handle: Handle) -> Option<ResourceKind> {
        self.entries.get(&handle).map(|e| e.kind)
    }

    /// `true` while `handle` names an allocated or bound, undeleted resource.
    pub fn is_live(&self, handle: Handle) -> bool {
        handle.is_null() || self.entries.contains_key(&handle)
    }

    /// Forget `handle` in both directions. Returns the native it was bound to.
    pub fn release(&mut self, handle: Handle) -> Option<u32> {
        if handle.is_null() {
            return None;
        }
        match self.entries.remove(&handle) {
            Some(entry) => {
                if let Some(native) = entry.native {
                    if self.by_native.get(&(entry.kind, native)) == Some(&handle) {
                        self.by_native.remove(&(entry.kind, native));
                    }
                }
                trace!(?handle, "released handle");
                entry.native
            }
            None => {
                error!(?handle, "release of unknown or already deleted handle");
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_for_is_idempotent() {
        let mut reg = HandleRegistry::new();
        let a = reg.key_for(ResourceKind::Texture, 7);
        let b = reg.key_for(ResourceKind::Texture, 7);
        assert_eq!(a, b);
        assert!(a.is_captured());
        assert_eq!(reg.key_for(ResourceKind::Texture, 0), Handle::NULL);
        assert_eq!(reg.key_for(ResourceKind::Texture, 0), Handle::NULL);
    }

    #[test]
    fn distinct_natives_get_distinct_handles() {
        let mut reg = HandleRegistry::new();
        let a = reg.key_for(ResourceKind::Texture, 1);
        let b = reg.key_for(ResourceKind::Texture, 2);
        let c = reg.key_for(ResourceKind::Buffer, 1);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn released_native_name_is_not_conflated_on_reuse() {
        let mut reg = HandleRegistry::new();
        let old = reg.key_for(ResourceKind::Texture, 3);
        assert_eq!(reg.release(old), Some(3));
        assert!(!reg.is_live(old));

        let new = reg.key_for(ResourceKind::Texture, 3);
        assert_ne!(old, new);
        assert_eq!(reg.resolve(new), Some(3));
        assert_eq!(reg.resolve(old), None);
    }

    #[test]
    fn bound_handles_are_found_by_capture() {
        let mut reg = HandleRegistry::new();
        let h = reg.allocate(ResourceKind::Buffer);
        assert!(h.is_producer_allocated());
        assert_eq!(reg.resolve(h), None);

        reg.bind(h, ResourceKind::Buffer, 12);
        assert_eq!(reg.resolve(h), Some(12));
        assert_eq!(reg.key_for(ResourceKind::Buffer, 12), h);
    }

    #[test]
    fn allocation_never_reuses_released_handles() {
        let mut reg = HandleRegistry::new();
        let a = reg.allocate(ResourceKind::Texture);
        reg.release(a);
        let b = reg.allocate(ResourceKind::Texture);
        assert!(b.raw() > a.raw());
    }
}
