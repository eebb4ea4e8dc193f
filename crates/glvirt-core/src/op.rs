//! Operation identifiers for every virtualized call.
//!
//! Ops are numbered (`#[repr(u16)]`) so byte-oriented transports can carry
//! them compactly, and serialize as the camelCase name of the API call.
//! Either form deserializes.

use std::fmt;

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

macro_rules! define_ops {
    ($($variant:ident => $name:literal,)*) => {
        /// One virtualized API call.
        #[derive(
            Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord,
            FromPrimitive, ToPrimitive, Serialize,
        )]
        #[repr(u16)]
        pub enum Op {
            $(
                #[serde(rename = $name)]
                $variant,
            )*
        }

        impl Op {
            /// Every op, in numbering order.
            pub const ALL: &'static [Op] = &[$(Op::$variant,)*];

            /// Name of the API call this op records.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Op::$variant => $name,)*
                }
            }
        }
    };
}

define_ops! {
    // Bindings
    UseProgram => "useProgram",
    BindBuffer => "bindBuffer",
    BindBufferBase => "bindBufferBase",
    BindFramebuffer => "bindFramebuffer",
    BindRenderbuffer => "bindRenderbuffer",
    BindVertexArray => "bindVertexArray",
    ActiveTexture => "activeTexture",
    BindTexture => "bindTexture",
    TexParameteri => "texParameteri",
    TexParameterf => "texParameterf",

    // Draw-state toggles and values
    Enable => "enable",
    Disable => "disable",
    CullFace => "cullFace",
    DepthFunc => "depthFunc",
    FrontFace => "frontFace",
    ClearColor => "clearColor",
    ClearDepth => "clearDepth",
    ClearStencil => "clearStencil",
    Scissor => "scissor",
    Viewport => "viewport",
    BlendFunc => "blendFunc",
    BlendFuncSeparate => "blendFuncSeparate",
    BlendEquation => "blendEquation",
    BlendEquationSeparate => "blendEquationSeparate",
    BlendColor => "blendColor",
    ColorMask => "colorMask",
    DepthMask => "depthMask",
    DepthRange => "depthRange",
    LineWidth => "lineWidth",
    PolygonOffset => "polygonOffset",
    PixelStorei => "pixelStorei",

    // Object lifecycle
    CreateTexture => "createTexture",
    CreateBuffer => "createBuffer",
    CreateFramebuffer => "createFramebuffer",
    CreateRenderbuffer => "createRenderbuffer",
    CreateVertexArray => "createVertexArray",
    CreateProgram => "createProgram",
    CreateShader => "createShader",
    GetUniformLocation => "getUniformLocation",
    DeleteTexture => "deleteTexture",
    DeleteBuffer => "deleteBuffer",
    DeleteFramebuffer => "deleteFramebuffer",
    DeleteRenderbuffer => "deleteRenderbuffer",
    DeleteVertexArray => "deleteVertexArray",
    DeleteProgram => "deleteProgram",
    DeleteShader => "deleteShader",

    // Resource setup
    ShaderSource => "shaderSource",
    CompileShader => "compileShader",
    AttachShader => "attachShader",
    LinkProgram => "linkProgram",
    BindAttribLocation => "bindAttribLocation",
    BufferData => "bufferData",
    BufferSubData => "bufferSubData",
    TexImage2D => "texImage2D",
    TexSubImage2D => "texSubImage2D",
    GenerateMipmap => "generateMipmap",
    FramebufferTexture2D => "framebufferTexture2D",
    FramebufferRenderbuffer => "framebufferRenderbuffer",
    RenderbufferStorage => "renderbufferStorage",
    VertexAttribPointer => "vertexAttribPointer",
    EnableVertexAttribArray => "enableVertexAttribArray",
    DisableVertexAttribArray => "disableVertexAttribArray",
    UniformFloats => "uniformFloats",
    UniformInts => "uniformInts",
    UniformMatrix => "uniformMatrix",

    // Drawing
    Clear => "clear",
    DrawArrays => "drawArrays",
    DrawElements => "drawElements",
    Flush => "flush",

    // Round trips
    GetAttribLocation => "getAttribLocation",
    GetProgramParameter => "getProgramParameter",
    GetShaderParameter => "getShaderParameter",
    GetProgramInfoLog => "getProgramInfoLog",
    GetShaderInfoLog => "getShaderInfoLog",
    GetActiveAttrib => "getActiveAttrib",
    GetActiveUniform => "getActiveUniform",
    GetError => "getError",
    CheckFramebufferStatus => "checkFramebufferStatus",
    ReadPixels => "readPixels",
    Finish => "finish",
}

impl Op {
    /// Position in [`Op::ALL`].
    pub fn code(self) -> u16 {
        self.to_u16().unwrap_or(u16::MAX)
    }

    pub fn from_code(code: u16) -> Option<Op> {
        Op::from_u16(code)
    }

    pub fn from_name(name: &str) -> Option<Op> {
        Op::ALL.iter().copied().find(|op| op.name() == name)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Op {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(OpVisitor)
    }
}

struct OpVisitor;

impl Visitor<'_> for OpVisitor {
    type Value = Op;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an API call name or op code")
    }

    fn visit_str<E: de::Error>(self, name: &str) -> Result<Op, E> {
        Op::from_name(name).ok_or_else(|| E::unknown_variant(name, &[]))
    }

    fn visit_u64<E: de::Error>(self, code: u64) -> Result<Op, E> {
        Op::from_u64(code).ok_or_else(|| E::invalid_value(de::Unexpected::Unsigned(code), &self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_matches_table_order() {
        for (i, op) in Op::ALL.iter().enumerate() {
            assert_eq!(op.to_u16(), Some(i as u16));
            assert_eq!(Op::from_u16(i as u16), Some(*op));
        }
        assert_eq!(Op::from_u16(Op::ALL.len() as u16), None);
    }

    #[test]
    fn serializes_as_call_name() {
        let json = serde_json::to_string(&Op::TexImage2D).unwrap();
        assert_eq!(json, "\"texImage2D\"");
        let op: Op = serde_json::from_str("\"bindTexture\"").unwrap();
        assert_eq!(op, Op::BindTexture);
    }

    #[test]
    fn codes_deserialize_too() {
        let code = Op::Viewport.code();
        assert_eq!(Op::from_code(code), Some(Op::Viewport));
        let op: Op = serde_json::from_str(&code.to_string()).unwrap();
        assert_eq!(op, Op::Viewport);
        assert!(serde_json::from_str::<Op>("\"drawQuads\"").is_err());
        assert!(serde_json::from_str::<Op>("60000").is_err());
    }
}
