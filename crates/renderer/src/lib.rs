//! Renderer crate for the liquid metal logo effect.
//!
//! A [`RenderSurface`] owns one shader program, one mask texture and the
//! full-screen quad, and issues every GPU call through a [`SurfaceBackend`].
//! The [`AnimationClock`] feeds speed-scaled time into it and
//! [`FrameCapture`] reads frames back for PNG and GIF export:
//!
//! ```text
//!   PixelBuffer ──▶ RenderSurface::set_image ──▶ mask texture
//!                          ▲
//!   AnimationClock::tick ──┘ render(time_ms) ──▶ draw ──▶ FrameCapture
//!                                                          │
//!                                            PNG / GIF ◀───┘
//! ```
//!
//! Two drivers sit on top: [`HeadlessRunner`] for offscreen export and
//! [`PreviewWindow`] for the interactive winit window.

mod backend;
mod capture;
mod clock;
mod compile;
mod gpu;
mod runtime;
mod surface;
mod types;
mod uniforms;
mod window;

use std::path::PathBuf;

pub use backend::SurfaceBackend;
pub use capture::{
    AnimationEncoder, CapturedFrame, EncodedAnimation, EncodedImage, FrameCapture,
    GifAnimationEncoder, SequenceProgress, SequenceRequest,
    timestamped_export_path,
};
pub use clock::AnimationClock;
pub use gpu::{GpuTexture, WgpuBackend};
pub use runtime::{
    BoxedTimeSource, HeadlessRunner, SimulatedTimeSource, SystemTimeSource, TimeSource,
    DISPLAY_FRAME_PERIOD,
};
pub use surface::RenderSurface;
pub use types::{AdapterProfile, GpuOptions, GpuPowerPreference, RowOrigin, SurfaceId};
pub use uniforms::{LiquidUniforms, UniformRole, UniformSlot, UNIFORM_TABLE};
pub use window::{LogoFetcher, PreviewCommand, PreviewOptions, PreviewProxy, PreviewWindow};

/// Failures raised while creating or driving a render surface.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no compatible GPU adapter: {0}")]
    AdapterUnavailable(String),
    #[error("failed to open GPU device: {0}")]
    DeviceRequest(String),
    #[error("{stage} shader failed to compile: {message}")]
    ShaderCompile { stage: &'static str, message: String },
    #[error("shader program failed to link: {0}")]
    ShaderLink(String),
    #[error("texture upload failed: {0}")]
    TextureUpload(String),
    #[error("pixel read-back failed: {0}")]
    Readback(String),
    #[error("presentation surface error: {0}")]
    Surface(String),
    #[error("render surface {0} has been destroyed")]
    Destroyed(SurfaceId),
}

/// Failures raised by still and sequence capture.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("a capture is already in progress")]
    InProgress,
    #[error("render surface was destroyed while a capture was running")]
    SurfaceDestroyed,
    #[error("failed to encode {format}: {message}")]
    Encode {
        format: &'static str,
        message: String,
    },
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
