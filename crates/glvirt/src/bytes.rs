//! Byte payloads: uniform-block uploads and blocking-call responses.
//!
//! Responses are little-endian. Integers and enums are 4 bytes, strings
//! are raw UTF-8, and an active attribute or uniform is its size (`i32`),
//! type (`u32`) and name. An empty active-info payload means "no such
//! index".

use gl::types::GLenum;
use glvirt_core::VirtError;
use glvirt_state::ActiveInfo;

/// Convert a `#[repr(C)]` struct to a byte slice for `bufferData` uploads,
/// typically a uniform block.
///
/// # Safety
///
/// Only implement on `#[repr(C)]` structs whose fields are all plain numeric
/// types (f32, i32, u32, etc.) with no pointers, references, or
/// padding-dependent invariants.
///
/// # Example
///
/// ```rust,ignore
/// #[repr(C)]
/// struct Light {
///     position: [f32; 4],
///     color: [f32; 4],
/// }
///
/// unsafe impl AsBytes for Light {}
///
/// proxy.buffer_data_of(gl::UNIFORM_BUFFER, &light, gl::DYNAMIC_DRAW)?;
/// ```
pub unsafe trait AsBytes: Sized {
    /// View `self` as a byte slice of length `size_of::<Self>()`.
    fn as_bytes(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(self as *const Self as *const u8, std::mem::size_of::<Self>())
        }
    }
}

/// Shape of a blocking call's response payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Response {
    Int,
    Enum,
    Str,
    ActiveInfo,
    Pixels,
    Empty,
}

pub fn encode_int(value: i32) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn encode_enum(value: GLenum) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn encode_str(value: &str) -> Vec<u8> {
    value.as_bytes().to_vec()
}

pub fn encode_active_info(info: Option<&ActiveInfo>) -> Vec<u8> {
    let Some(info) = info else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(8 + info.name.len());
    out.extend_from_slice(&info.size.to_le_bytes());
    out.extend_from_slice(&info.ty.to_le_bytes());
    out.extend_from_slice(info.name.as_bytes());
    out
}

fn word(payload: &[u8], what: &str) -> Result<[u8; 4], VirtError> {
    payload
        .try_into()
        .map_err(|_| VirtError::Decode(format!("{what}: expected 4 bytes, got {}", payload.len())))
}

pub fn decode_int(payload: &[u8]) -> Result<i32, VirtError> {
    word(payload, "int").map(i32::from_le_bytes)
}

pub fn decode_enum(payload: &[u8]) -> Result<GLenum, VirtError> {
    word(payload, "enum").map(u32::from_le_bytes)
}

pub fn decode_str(payload: Vec<u8>) -> Result<String, VirtError> {
    String::from_utf8(payload).map_err(|e| VirtError::Decode(format!("string: {e}")))
}

pub fn decode_active_info(payload: &[u8]) -> Result<Option<ActiveInfo>, VirtError> {
    if payload.is_empty() {
        return Ok(None);
    }
    if payload.len() < 8 {
        return Err(VirtError::Decode(format!(
            "active info: {} bytes is shorter than its header",
            payload.len()
        )));
    }
    let (size, rest) = payload.split_at(4);
    let (ty, name) = rest.split_at(4);
    Ok(Some(ActiveInfo {
        size: decode_int(size)?,
        ty: decode_enum(ty)?,
        name: std::str::from_utf8(name)
            .map_err(|e| VirtError::Decode(format!("active info name: {e}")))?
            .to_owned(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    struct Params {
        brightness: f32,
        steps: i32,
    }

    unsafe impl AsBytes for Params {}

    #[test]
    fn repr_c_structs_view_as_their_fields() {
        let params = Params {
            brightness: 1.0,
            steps: 3,
        };
        let bytes = params.as_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_ne_bytes());
        assert_eq!(&bytes[4..], &3i32.to_ne_bytes());
    }

    #[test]
    fn active_info_payloads() {
        let info = ActiveInfo {
            size: 2,
            ty: gl::FLOAT_VEC4,
            name: "colors[0]".into(),
        };
        assert_eq!(decode_active_info(&encode_active_info(Some(&info))).unwrap(), Some(info));
        assert_eq!(decode_active_info(&encode_active_info(None)).unwrap(), None);
        assert!(decode_active_info(&[1, 2, 3]).is_err());
    }

    #[test]
    fn short_words_are_decode_errors() {
        assert_eq!(decode_int(&encode_int(-1)).unwrap(), -1);
        assert!(matches!(decode_enum(&[]), Err(VirtError::Decode(_))));
    }
}
