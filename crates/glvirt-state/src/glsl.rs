//! GLSL version listing for device descriptions.

use glium::{Api, Version};

/// `#version` directive value for a GLSL version, e.g. `330` or `300 es`.
pub fn version_directive(version: &Version) -> String {
    let Version(api, major, minor) = *version;
    let number = major as u32 * 100 + minor as u32 * 10;
    match api {
        // GLSL ES 1.00 is the only ES version without the suffix.
        Api::GlEs if number == 100 => "100".to_owned(),
        Api::GlEs => format!("{number} es"),
        Api::Gl => format!("{number}"),
    }
}

/// Parse a `GL_SHADING_LANGUAGE_VERSION` string such as `4.60 NVIDIA` or
/// `OpenGL ES GLSL ES 3.00`.
pub fn parse_shading_language_version(text: &str) -> Option<Version> {
    let api = if text.contains(" ES ") || text.starts_with("OpenGL ES") {
        Api::GlEs
    } else {
        Api::Gl
    };
    let number = text
        .split_whitespace()
        .find(|w| w.starts_with(|c: char| c.is_ascii_digit()))?;
    let (major, minor) = number.split_once('.')?;
    let major = major.parse().ok()?;
    // "4.60" is minor version 6.
    let minor = minor
        .chars()
        .next()
        .and_then(|c| c.to_digit(10))
        .and_then(|d| u8::try_from(d).ok())?;
    Some(Version(api, major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_follow_glsl_numbering() {
        assert_eq!(version_directive(&Version(Api::Gl, 3, 3)), "330");
        assert_eq!(version_directive(&Version(Api::Gl, 1, 2)), "120");
        assert_eq!(version_directive(&Version(Api::GlEs, 1, 0)), "100");
        assert_eq!(version_directive(&Version(Api::GlEs, 3, 0)), "300 es");
    }

    #[test]
    fn driver_strings_parse() {
        assert_eq!(
            parse_shading_language_version("4.60 NVIDIA"),
            Some(Version(Api::Gl, 4, 6))
        );
        assert_eq!(
            parse_shading_language_version("OpenGL ES GLSL ES 3.00"),
            Some(Version(Api::GlEs, 3, 0))
        );
        assert_eq!(
            parse_shading_language_version("OpenGL ES GLSL ES 1.0.17"),
            Some(Version(Api::GlEs, 1, 0))
        );
        assert_eq!(parse_shading_language_version("unknown"), None);
    }
}
