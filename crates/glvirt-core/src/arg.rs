//! Explicit value types for recorded call arguments.
//!
//! Arguments are copied into owned values when a call is recorded, so a caller
//! mutating its slices afterwards can never reach an already queued command.

use serde::{Deserialize, Serialize};

use crate::handle::Handle;

/// One recorded argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "camelCase")]
pub enum Arg {
    Null,
    Bool(bool),
    Int(i32),
    Enum(u32),
    Float(f32),
    Handle(Handle),
    /// Fixed-size numeric arrays and uniform payloads.
    Floats(Vec<f32>),
    Ints(Vec<i32>),
    /// Opaque binary blob (buffer contents, pixels).
    Bytes(Vec<u8>),
    Str(String),
}

impl Arg {
    pub fn kind(&self) -> ArgKind {
        match self {
            Arg::Null => ArgKind::Null,
            Arg::Bool(_) => ArgKind::Bool,
            Arg::Int(_) => ArgKind::Int,
            Arg::Enum(_) => ArgKind::Enum,
            Arg::Float(_) => ArgKind::Float,
            Arg::Handle(_) => ArgKind::Handle,
            Arg::Floats(_) => ArgKind::Floats,
            Arg::Ints(_) => ArgKind::Ints,
            Arg::Bytes(_) => ArgKind::Bytes,
            Arg::Str(_) => ArgKind::Str,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Arg::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match *self {
            Arg::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<u32> {
        match *self {
            Arg::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match *self {
            Arg::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<Handle> {
        match *self {
            Arg::Handle(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f32]> {
        match self {
            Arg::Floats(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ints(&self) -> Option<&[i32]> {
        match self {
            Arg::Ints(v) => Some(v),
            _ => None,
        }
    }

    /// Blob contents; `Some(None)` for an explicit null blob.
    pub fn as_bytes(&self) -> Option<Option<&[u8]>> {
        match self {
            Arg::Bytes(v) => Some(Some(v)),
            Arg::Null => Some(None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Arg {
    fn from(v: bool) -> Self {
        Arg::Bool(v)
    }
}

impl From<i32> for Arg {
    fn from(v: i32) -> Self {
        Arg::Int(v)
    }
}

impl From<f32> for Arg {
    fn from(v: f32) -> Self {
        Arg::Float(v)
    }
}

impl From<Handle> for Arg {
    fn from(v: Handle) -> Self {
        Arg::Handle(v)
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::Str(v.to_owned())
    }
}

impl From<&[f32]> for Arg {
    fn from(v: &[f32]) -> Self {
        Arg::Floats(v.to_vec())
    }
}

impl From<&[i32]> for Arg {
    fn from(v: &[i32]) -> Self {
        Arg::Ints(v.to_vec())
    }
}

impl From<&[u8]> for Arg {
    fn from(v: &[u8]) -> Self {
        Arg::Bytes(v.to_vec())
    }
}

/// Accepted shape of one signature slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArgKind {
    Null,
    Bool,
    Int,
    Enum,
    Float,
    Handle,
    Floats,
    Ints,
    Bytes,
    /// Pixel data that may be absent (allocate-only uploads).
    BytesOrNull,
    Str,
}

impl ArgKind {
    pub fn accepts(self, arg: &Arg) -> bool {
        match self {
            ArgKind::BytesOrNull => matches!(arg, Arg::Bytes(_) | Arg::Null),
            kind => arg.kind() == kind,
        }
    }
}
