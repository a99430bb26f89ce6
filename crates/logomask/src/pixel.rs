use image::RgbaImage;

use crate::NormalizeError;

/// Row-major, non-premultiplied RGBA8 pixels.
///
/// `data.len() == width * height * 4` holds for every value of this type.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, NormalizeError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(4));
        match expected {
            Some(len) if width > 0 && height > 0 && len == data.len() => Ok(Self {
                width,
                height,
                data,
            }),
            _ => Err(NormalizeError::BufferSize {
                width,
                height,
                len: data.len(),
            }),
        }
    }

    pub fn from_rgba_image(image: RgbaImage) -> Result<Self, NormalizeError> {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Width over height, as fed to the shader's `u_img_ratio`.
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_rgba_image(self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data)
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Converts premultiplied RGBA8 in place back to straight alpha.
pub(crate) fn demultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 || a == 255 {
            continue;
        }
        for channel in &mut px[..3] {
            let value = (*channel as u16 * 255 + a / 2) / a;
            *channel = value.min(255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_length() {
        let err = PixelBuffer::new(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::BufferSize {
                width: 2,
                height: 2,
                len: 15
            }
        ));
    }

    #[test]
    fn rejects_empty_dimensions() {
        assert!(PixelBuffer::new(0, 4, Vec::new()).is_err());
    }

    #[test]
    fn reports_aspect_ratio() {
        let buffer = PixelBuffer::new(4, 2, vec![0; 32]).unwrap();
        assert_eq!(buffer.aspect_ratio(), 2.0);
        assert_eq!(buffer.as_bytes().len(), 32);
    }

    #[test]
    fn demultiply_restores_straight_colour() {
        let mut px = [64u8, 32, 0, 128, 10, 20, 30, 255, 9, 9, 9, 0];
        demultiply_rgba8_in_place(&mut px);
        assert_eq!(&px[..4], &[128, 64, 0, 128]);
        assert_eq!(&px[4..8], &[10, 20, 30, 255]);
        assert_eq!(&px[8..], &[9, 9, 9, 0]);
    }
}
