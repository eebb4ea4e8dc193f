//! Client-side pixel transfer sizes.

use gl::types::GLenum;

// Unsized ES formats, absent from the core profile bindings.
const ALPHA: GLenum = 0x1906;
const LUMINANCE: GLenum = 0x1909;
const LUMINANCE_ALPHA: GLenum = 0x190A;

/// Bytes per pixel of a client-side pixel transfer.
pub fn pixel_size(format: GLenum, ty: GLenum) -> usize {
    let components = match format {
        gl::RED | ALPHA | LUMINANCE | gl::DEPTH_COMPONENT | gl::RED_INTEGER => 1,
        gl::RG | gl::RG_INTEGER | LUMINANCE_ALPHA => 2,
        gl::RGB | gl::BGR | gl::RGB_INTEGER => 3,
        _ => 4,
    };
    match ty {
        gl::UNSIGNED_SHORT_5_6_5 | gl::UNSIGNED_SHORT_4_4_4_4 | gl::UNSIGNED_SHORT_5_5_5_1 => 2,
        gl::UNSIGNED_INT_2_10_10_10_REV | gl::UNSIGNED_INT_24_8 => 4,
        gl::UNSIGNED_SHORT | gl::SHORT | gl::HALF_FLOAT => 2 * components,
        gl::UNSIGNED_INT | gl::INT | gl::FLOAT => 4 * components,
        _ => components,
    }
}

/// Accepted byte lengths of a `width` x `height` image whose rows are
/// padded to `alignment`: with the last row tight, and fully padded.
pub fn image_len(
    width: u32,
    height: u32,
    format: GLenum,
    ty: GLenum,
    alignment: u32,
) -> (usize, usize) {
    if width == 0 || height == 0 {
        return (0, 0);
    }
    let row = width as usize * pixel_size(format, ty);
    let alignment = alignment.max(1) as usize;
    let stride = row.div_ceil(alignment) * alignment;
    let height = height as usize;
    (stride * (height - 1) + row, stride * height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_sizes() {
        assert_eq!(pixel_size(gl::RGBA, gl::UNSIGNED_BYTE), 4);
        assert_eq!(pixel_size(gl::RGB, gl::UNSIGNED_BYTE), 3);
        assert_eq!(pixel_size(gl::RGBA, gl::FLOAT), 16);
        assert_eq!(pixel_size(gl::RGB, gl::UNSIGNED_SHORT_5_6_5), 2);
    }

    #[test]
    fn rows_pad_to_the_unpack_alignment() {
        // 3 RGB pixels = 9 bytes, padded to 12.
        assert_eq!(image_len(3, 2, gl::RGB, gl::UNSIGNED_BYTE, 4), (21, 24));
        assert_eq!(image_len(3, 2, gl::RGB, gl::UNSIGNED_BYTE, 1), (18, 18));
        assert_eq!(image_len(2, 2, gl::RGBA, gl::UNSIGNED_BYTE, 8), (16, 16));
        assert_eq!(image_len(0, 4, gl::RGBA, gl::UNSIGNED_BYTE, 4), (0, 0));
    }
}
