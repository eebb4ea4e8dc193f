//! Immutable device description sent once by the consumer before any buffer
//! traffic. Producers answer capability queries from it.

use std::collections::{BTreeMap, BTreeSet};

use gl::types::GLenum;
use serde::{Deserialize, Serialize};

/// Numeric limits captured in a description, with their component count.
pub const LIMIT_PNAMES: &[(GLenum, usize)] = &[
    (gl::MAX_TEXTURE_SIZE, 1),
    (gl::MAX_CUBE_MAP_TEXTURE_SIZE, 1),
    (gl::MAX_3D_TEXTURE_SIZE, 1),
    (gl::MAX_ARRAY_TEXTURE_LAYERS, 1),
    (gl::MAX_RENDERBUFFER_SIZE, 1),
    (gl::MAX_TEXTURE_IMAGE_UNITS, 1),
    (gl::MAX_COMBINED_TEXTURE_IMAGE_UNITS, 1),
    (gl::MAX_VERTEX_TEXTURE_IMAGE_UNITS, 1),
    (gl::MAX_VERTEX_ATTRIBS, 1),
    (gl::MAX_VERTEX_UNIFORM_VECTORS, 1),
    (gl::MAX_FRAGMENT_UNIFORM_VECTORS, 1),
    (gl::MAX_VARYING_VECTORS, 1),
    (gl::MAX_UNIFORM_BUFFER_BINDINGS, 1),
    (gl::MAX_COLOR_ATTACHMENTS, 1),
    (gl::MAX_DRAW_BUFFERS, 1),
    (gl::MAX_SAMPLES, 1),
    (gl::MAX_VIEWPORT_DIMS, 2),
    (gl::ALIASED_LINE_WIDTH_RANGE, 2),
];

pub const SHADER_STAGES: [GLenum; 2] = [gl::VERTEX_SHADER, gl::FRAGMENT_SHADER];

pub const PRECISION_TYPES: [GLenum; 6] = [
    gl::LOW_FLOAT,
    gl::MEDIUM_FLOAT,
    gl::HIGH_FLOAT,
    gl::LOW_INT,
    gl::MEDIUM_INT,
    gl::HIGH_INT,
];

pub const ANISOTROPY_EXTENSIONS: [&str; 2] = [
    "GL_EXT_texture_filter_anisotropic",
    "GL_ARB_texture_filter_anisotropic",
];

/// Range and precision of one numeric format in one shader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecisionFormat {
    pub range_min: i32,
    pub range_max: i32,
    pub precision: i32,
}

/// One `(stage, precision type)` entry of a description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagePrecision {
    pub stage: GLenum,
    pub precision_type: GLenum,
    pub format: PrecisionFormat,
}

impl PrecisionFormat {
    /// IEEE single precision, what desktop GL reports for every float format.
    pub const FLOAT32: PrecisionFormat = PrecisionFormat {
        range_min: 127,
        range_max: 127,
        precision: 23,
    };

    pub const INT32: PrecisionFormat = PrecisionFormat {
        range_min: 31,
        range_max: 30,
        precision: 0,
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescription {
    pub version: String,
    /// Parsed `(major, minor)` API version.
    pub api_version: (u32, u32),
    pub vendor: String,
    pub renderer: String,
    /// GLSL versions the consumer can compile, newest first.
    pub shading_language_versions: Vec<String>,
    pub extensions: BTreeSet<String>,
    pub limits: BTreeMap<GLenum, Vec<i32>>,
    pub precisions: Vec<StagePrecision>,
    /// Default framebuffer size.
    pub drawable: (u32, u32),
}

impl DeviceDescription {
    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    /// First component of a captured limit.
    pub fn limit(&self, pname: GLenum) -> Option<i32> {
        self.limits.get(&pname).and_then(|v| v.first().copied())
    }

    pub fn limit_values(&self, pname: GLenum) -> Option<&[i32]> {
        self.limits.get(&pname).map(Vec::as_slice)
    }

    pub fn precision(&self, stage: GLenum, precision_type: GLenum) -> Option<PrecisionFormat> {
        self.precisions
            .iter()
            .find(|p| p.stage == stage && p.precision_type == precision_type)
            .map(|p| p.format)
    }

    pub fn max_texture_units(&self) -> u32 {
        self.limit(gl::MAX_COMBINED_TEXTURE_IMAGE_UNITS)
            .unwrap_or(8)
            .max(1) as u32
    }

    pub fn supports_vertex_arrays(&self) -> bool {
        self.api_version.0 >= 3
            || self.has_extension("GL_ARB_vertex_array_object")
            || self.has_extension("GL_OES_vertex_array_object")
    }

    pub fn supports_volume_textures(&self) -> bool {
        self.limit(gl::MAX_3D_TEXTURE_SIZE).unwrap_or(0) > 0
            && self.limit(gl::MAX_ARRAY_TEXTURE_LAYERS).unwrap_or(0) > 0
    }

    pub fn supports_anisotropy(&self) -> bool {
        ANISOTROPY_EXTENSIONS.iter().any(|e| self.has_extension(e))
    }
}

/// Parse the leading `major.minor` of a `GL_VERSION` string, skipping an
/// `OpenGL ES ` prefix.
pub fn parse_api_version(version: &str) -> (u32, u32) {
    let numeric = version
        .split_whitespace()
        .find(|word| word.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or("");
    let mut parts = numeric.split('.').map(|p| {
        p.chars()
            .take_while(char::is_ascii_digit)
            .collect::<String>()
            .parse::<u32>()
            .unwrap_or(0)
    });
    (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_desktop_and_es_versions() {
        assert_eq!(parse_api_version("4.1 Metal - 88"), (4, 1));
        assert_eq!(parse_api_version("OpenGL ES 3.2 NVIDIA 535.54"), (3, 2));
        assert_eq!(parse_api_version("3.3.0 Mesa 23.0"), (3, 3));
        assert_eq!(parse_api_version(""), (0, 0));
    }

    #[test]
    fn description_survives_json() {
        let mut desc = DeviceDescription {
            version: "3.3".into(),
            api_version: (3, 3),
            vendor: "v".into(),
            renderer: "r".into(),
            shading_language_versions: vec!["330 core".into()],
            extensions: ["GL_EXT_texture_filter_anisotropic".to_owned()].into(),
            limits: BTreeMap::new(),
            precisions: Vec::new(),
            drawable: (64, 32),
        };
        desc.limits.insert(gl::MAX_VIEWPORT_DIMS, vec![4096, 4096]);
        desc.precisions.push(StagePrecision {
            stage: gl::FRAGMENT_SHADER,
            precision_type: gl::HIGH_FLOAT,
            format: PrecisionFormat::FLOAT32,
        });

        let json = serde_json::to_string(&desc).unwrap();
        let back: DeviceDescription = serde_json::from_str(&json).unwrap();
        assert_eq!(back, desc);
        assert!(back.supports_anisotropy());
        assert_eq!(
            back.precision(gl::FRAGMENT_SHADER, gl::HIGH_FLOAT),
            Some(PrecisionFormat::FLOAT32)
        );
        assert_eq!(back.limit_values(gl::MAX_VIEWPORT_DIMS), Some(&[4096, 4096][..]));
    }
}
