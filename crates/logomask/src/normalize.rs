use std::sync::{Arc, OnceLock};

use image::imageops::{self, FilterType};
use image::RgbaImage;
use resvg::tiny_skia;
use tracing::debug;

use crate::pixel::demultiply_rgba8_in_place;
use crate::{ImageKind, NormalizeError, PixelBuffer};

/// Upper bound for either side of a normalised image.
pub const MAX_SIDE: u32 = 1000;
/// Lower bound the shorter side is grown to.
pub const MIN_SIDE: u32 = 500;
/// Square canvas vector logos are rasterised into before measuring.
pub const VECTOR_CANVAS: u32 = 1000;

/// Encoded logo bytes together with their detected encoding.
#[derive(Clone)]
pub struct RawImage {
    bytes: Vec<u8>,
    kind: ImageKind,
}

impl RawImage {
    pub fn new(bytes: Vec<u8>, kind: ImageKind) -> Self {
        Self { bytes, kind }
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for RawImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawImage")
            .field("kind", &self.kind)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Computes the output size for a `width` x `height` source.
///
/// Oversized inputs shrink so their longer side is [`MAX_SIDE`]. Otherwise
/// undersized inputs grow so their shorter side is [`MIN_SIDE`], unless that
/// pushes the longer side past [`MAX_SIDE`], in which case the upper bound
/// wins. Aspect ratio is kept and neither side drops below one pixel.
pub fn fit_dimensions(width: u32, height: u32) -> (u32, u32) {
    let width = width.max(1);
    let height = height.max(1);
    let (long, short) = if width >= height {
        (width, height)
    } else {
        (height, width)
    };

    let scaled = |side: u32, target: u32, basis: u32| -> u32 {
        let value = (side as f64 * target as f64 / basis as f64).round();
        (value as u32).max(1)
    };

    let (long, short) = if long > MAX_SIDE {
        (MAX_SIDE, scaled(short, MAX_SIDE, long))
    } else if short < MIN_SIDE {
        let grown_long = scaled(long, MIN_SIDE, short);
        if grown_long > MAX_SIDE {
            (MAX_SIDE, scaled(short, MAX_SIDE, long))
        } else {
            (grown_long, MIN_SIDE)
        }
    } else {
        (long, short)
    };

    if width >= height {
        (long, short)
    } else {
        (short, long)
    }
}

/// Decodes `input` and resamples it into the canonical size envelope.
pub fn normalize(input: &RawImage) -> Result<PixelBuffer, NormalizeError> {
    let source = match input.kind.raster_format() {
        Some(format) => decode_raster(input.bytes(), input.kind, format)?,
        None => rasterize_vector(input.bytes(), VECTOR_CANVAS)?,
    };

    let (width, height) = source.dimensions();
    let (target_w, target_h) = fit_dimensions(width, height);
    let resized = if (target_w, target_h) == (width, height) {
        source
    } else {
        debug!(
            from_w = width,
            from_h = height,
            to_w = target_w,
            to_h = target_h,
            "resampling logo"
        );
        imageops::resize(&source, target_w, target_h, FilterType::Triangle)
    };

    PixelBuffer::from_rgba_image(resized)
}

fn decode_raster(
    bytes: &[u8],
    kind: ImageKind,
    format: image::ImageFormat,
) -> Result<RgbaImage, NormalizeError> {
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|source| NormalizeError::ImageDecode { kind, source })?;
    Ok(decoded.to_rgba8())
}

fn svg_options() -> usvg::Options<'static> {
    static FONTS: OnceLock<Arc<usvg::fontdb::Database>> = OnceLock::new();
    let fontdb = FONTS
        .get_or_init(|| {
            let mut db = usvg::fontdb::Database::new();
            db.load_system_fonts();
            Arc::new(db)
        })
        .clone();
    usvg::Options {
        fontdb,
        ..Default::default()
    }
}

/// Renders an SVG document fitted and centred into a `side` x `side` canvas.
fn rasterize_vector(bytes: &[u8], side: u32) -> Result<RgbaImage, NormalizeError> {
    let tree = usvg::Tree::from_data(bytes, &svg_options())?;

    let mut pixmap = tiny_skia::Pixmap::new(side, side).ok_or(
        NormalizeError::SurfaceUnavailable {
            width: side,
            height: side,
        },
    )?;

    let size = tree.size();
    let (doc_w, doc_h) = (size.width(), size.height());
    if doc_w > 0.0 && doc_h > 0.0 {
        let scale = (side as f32 / doc_w).min(side as f32 / doc_h);
        let offset_x = (side as f32 - doc_w * scale) / 2.0;
        let offset_y = (side as f32 - doc_h * scale) / 2.0;
        let transform = tiny_skia::Transform::from_row(scale, 0.0, 0.0, scale, offset_x, offset_y);
        resvg::render(&tree, transform, &mut pixmap.as_mut());
    }

    let mut data = pixmap.take();
    demultiply_rgba8_in_place(&mut data);
    RgbaImage::from_raw(side, side, data).ok_or(NormalizeError::SurfaceUnavailable {
        width: side,
        height: side,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageEncoder, Rgba};

    fn encode_png(width: u32, height: u32) -> RawImage {
        let mut img = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([255, 255, 255, 0]));
        let mut bytes = Vec::new();
        image::codecs::png::PngEncoder::new(&mut bytes)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
            .unwrap();
        RawImage::new(bytes, ImageKind::Png)
    }

    #[test]
    fn in_range_dimensions_are_untouched() {
        assert_eq!(fit_dimensions(500, 500), (500, 500));
        assert_eq!(fit_dimensions(1000, 500), (1000, 500));
        assert_eq!(fit_dimensions(640, 900), (640, 900));
    }

    #[test]
    fn oversized_longer_side_lands_on_upper_bound() {
        assert_eq!(fit_dimensions(2000, 500), (1000, 250));
        assert_eq!(fit_dimensions(1500, 3000), (500, 1000));
        assert_eq!(fit_dimensions(1001, 1001), (1000, 1000));
    }

    #[test]
    fn undersized_shorter_side_lands_on_lower_bound() {
        assert_eq!(fit_dimensions(100, 100), (500, 500));
        assert_eq!(fit_dimensions(300, 150), (1000, 500));
        assert_eq!(fit_dimensions(240, 400), (500, 833));
    }

    #[test]
    fn conflicting_bounds_favour_the_upper_bound() {
        // Growing 100 to 500 would push 800 to 4000.
        assert_eq!(fit_dimensions(800, 100), (1000, 125));
        assert_eq!(fit_dimensions(1, 400), (3, 1000));
    }

    #[test]
    fn degenerate_sides_never_collapse_to_zero() {
        assert_eq!(fit_dimensions(5000, 1), (1000, 1));
        assert_eq!(fit_dimensions(0, 0), (500, 500));
    }

    #[test]
    fn aspect_ratio_is_kept_within_a_pixel() {
        for &(w, h) in &[(1234, 567), (3000, 2999), (120, 77), (77, 120), (999, 501)] {
            let (ow, oh) = fit_dimensions(w, h);
            let expected_h = ow as f64 * h as f64 / w as f64;
            assert!((oh as f64 - expected_h).abs() <= 1.0, "{w}x{h} -> {ow}x{oh}");
        }
    }

    #[test]
    fn normalizes_png_into_envelope() {
        let buffer = normalize(&encode_png(2000, 500)).unwrap();
        assert_eq!(buffer.dimensions(), (1000, 250));
        assert_eq!(buffer.as_bytes().len(), 1000 * 250 * 4);

        let buffer = normalize(&encode_png(100, 100)).unwrap();
        assert_eq!(buffer.dimensions(), (500, 500));
    }

    #[test]
    fn in_range_png_is_byte_identical() {
        let buffer = normalize(&encode_png(600, 520)).unwrap();
        assert_eq!(buffer.dimensions(), (600, 520));
        assert_eq!(&buffer.as_bytes()[..4], &[255, 255, 255, 0]);
        assert_eq!(&buffer.as_bytes()[4..8], &[0, 0, 0, 255]);
    }

    #[test]
    fn svg_renders_on_square_canvas() {
        let svg = br##"<svg xmlns="http://www.w3.org/2000/svg" width="20" height="10" viewBox="0 0 20 10">
            <rect x="0" y="0" width="20" height="10" fill="#000"/>
        </svg>"##;
        let buffer = normalize(&RawImage::new(svg.to_vec(), ImageKind::Svg)).unwrap();
        assert_eq!(buffer.dimensions(), (1000, 1000));
        let px = |x: usize, y: usize| {
            let offset = (y * 1000 + x) * 4;
            buffer.as_bytes()[offset + 3]
        };
        // Letterboxed top and bottom, opaque through the middle.
        assert_eq!(px(500, 10), 0);
        assert_eq!(px(500, 500), 255);
        assert_eq!(px(500, 990), 0);
    }

    #[test]
    fn corrupt_raster_reports_decode_error() {
        let raw = RawImage::new(b"\x89PNG\r\n\x1a\nnot really".to_vec(), ImageKind::Png);
        let err = normalize(&raw).unwrap_err();
        assert!(matches!(err, NormalizeError::ImageDecode { kind: ImageKind::Png, .. }));
    }

    #[test]
    fn malformed_svg_reports_vector_error() {
        let raw = RawImage::new(b"<svg".to_vec(), ImageKind::Svg);
        let err = normalize(&raw).unwrap_err();
        assert!(matches!(err, NormalizeError::VectorDecode(_)));
    }
}
