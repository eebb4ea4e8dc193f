//! Image-like upload sources, rasterized to plain pixels before recording so
//! the consumer never sees the original object.

use std::borrow::Cow;

use gl::types::GLenum;
use glium::texture::{ClientFormat, RawImage2d};
use glvirt_core::pixels::pixel_size;
use glvirt_core::VirtError;

/// Tightly packed pixels, bottom row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub format: GLenum,
    pub ty: GLenum,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    pub fn rgba8(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format: gl::RGBA,
            ty: gl::UNSIGNED_BYTE,
            data,
        }
    }

    /// Every pixel set to `rgba`.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba.repeat(width as usize * height as usize);
        Self::rgba8(width, height, data)
    }

    fn row_len(&self) -> usize {
        self.width as usize * pixel_size(self.format, self.ty)
    }

    /// The pixels with each row padded to `alignment` bytes, as a matching
    /// `UNPACK_ALIGNMENT` expects them.
    pub fn aligned(&self, alignment: u32) -> Cow<'_, [u8]> {
        let row = self.row_len();
        let alignment = alignment.max(1) as usize;
        let stride = row.div_ceil(alignment) * alignment;
        if stride == row || row == 0 {
            return Cow::Borrowed(&self.data);
        }
        let mut out = Vec::with_capacity(stride * self.height as usize);
        for line in self.data.chunks(row) {
            out.extend_from_slice(line);
            out.resize(out.len() + stride - row, 0);
        }
        Cow::Owned(out)
    }
}

/// Anything that can be turned into a [`PixelBuffer`].
pub trait PixelSource {
    fn rasterize(&self) -> Result<PixelBuffer, VirtError>;
}

impl PixelSource for PixelBuffer {
    fn rasterize(&self) -> Result<PixelBuffer, VirtError> {
        Ok(self.clone())
    }
}

impl PixelSource for RawImage2d<'_, u8> {
    fn rasterize(&self) -> Result<PixelBuffer, VirtError> {
        let format = match self.format {
            ClientFormat::U8 => gl::RED,
            ClientFormat::U8U8 => gl::RG,
            ClientFormat::U8U8U8 => gl::RGB,
            ClientFormat::U8U8U8U8 => gl::RGBA,
            other => {
                return Err(VirtError::Unsupported(format!(
                    "{other:?} images cannot be uploaded as bytes"
                )))
            }
        };
        Ok(PixelBuffer {
            width: self.width,
            height: self.height,
            format,
            ty: gl::UNSIGNED_BYTE,
            data: self.data.to_vec(),
        })
    }
}

impl PixelSource for RawImage2d<'_, f32> {
    fn rasterize(&self) -> Result<PixelBuffer, VirtError> {
        let format = match self.format {
            ClientFormat::F32 => gl::RED,
            ClientFormat::F32F32 => gl::RG,
            ClientFormat::F32F32F32 => gl::RGB,
            ClientFormat::F32F32F32F32 => gl::RGBA,
            other => {
                return Err(VirtError::Unsupported(format!(
                    "{other:?} images cannot be uploaded as floats"
                )))
            }
        };
        Ok(PixelBuffer {
            width: self.width,
            height: self.height,
            format,
            ty: gl::FLOAT,
            data: self.data.iter().flat_map(|v| v.to_ne_bytes()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glium_images_rasterize_with_their_format() {
        let image = RawImage2d::from_raw_rgb(vec![1u8, 2, 3, 4, 5, 6], (2, 1));
        let pixels = image.rasterize().unwrap();
        assert_eq!((pixels.format, pixels.ty), (gl::RGB, gl::UNSIGNED_BYTE));
        assert_eq!(pixels.data, vec![1, 2, 3, 4, 5, 6]);

        let image = RawImage2d::from_raw_rgba(vec![0.5f32; 4], (1, 1));
        let pixels = image.rasterize().unwrap();
        assert_eq!((pixels.format, pixels.ty), (gl::RGBA, gl::FLOAT));
        assert_eq!(pixels.data.len(), 16);
    }

    #[test]
    fn rows_are_padded_only_when_needed() {
        let rgba = PixelBuffer::solid(3, 2, [9, 9, 9, 9]);
        assert!(matches!(rgba.aligned(4), Cow::Borrowed(_)));

        let rgb = PixelBuffer {
            width: 3,
            height: 2,
            format: gl::RGB,
            ty: gl::UNSIGNED_BYTE,
            data: (0..18).collect(),
        };
        let padded = rgb.aligned(4);
        assert_eq!(padded.len(), 24);
        assert_eq!(&padded[..9], &(0..9).collect::<Vec<u8>>()[..]);
        assert_eq!(&padded[9..12], &[0, 0, 0]);
        assert_eq!(&padded[12..21], &(9..18).collect::<Vec<u8>>()[..]);
    }
}
