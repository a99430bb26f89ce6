//! Turns arbitrary raster or vector logos into the canonical RGBA buffer the
//! liquid metal shader samples as its mask.

mod kind;
mod loader;
mod normalize;
mod pixel;

pub use kind::ImageKind;
pub use loader::{ImageLoader, LoadEvent, LoadTicket};
pub use normalize::{fit_dimensions, normalize, RawImage, MAX_SIDE, MIN_SIDE, VECTOR_CANVAS};
pub use pixel::PixelBuffer;

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("failed to decode {kind} image: {source}")]
    ImageDecode {
        kind: ImageKind,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to parse SVG document: {0}")]
    VectorDecode(#[from] usvg::Error),
    #[error("could not acquire a {width}x{height} drawing surface")]
    SurfaceUnavailable { width: u32, height: u32 },
    #[error("pixel buffer of {len} bytes does not match {width}x{height} RGBA")]
    BufferSize { width: u32, height: u32, len: usize },
}
