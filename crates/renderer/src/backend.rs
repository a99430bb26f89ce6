use logomask::PixelBuffer;

use crate::capture::CapturedFrame;
use crate::uniforms::LiquidUniforms;
use crate::RenderError;

/// GPU operations a [`crate::RenderSurface`] issues.
///
/// The surface owns ordering and lifetime rules; a backend only executes
/// what it is told. Implementations must not retain textures they hand out
/// beyond [`SurfaceBackend::release_texture`].
pub trait SurfaceBackend {
    type Texture;

    /// Uploads `image` into a new linear, clamp-to-edge texture.
    fn create_texture(&mut self, image: &PixelBuffer) -> Result<Self::Texture, RenderError>;

    /// Makes `texture` the one sampled by draws. `None` binds an opaque
    /// white placeholder, which the liquid shader reads as background and so
    /// draws fully transparent.
    fn bind_texture(&mut self, texture: Option<&Self::Texture>);

    fn release_texture(&mut self, texture: Self::Texture);

    fn write_uniforms(&mut self, uniforms: &LiquidUniforms);

    /// Sizes the square render target to `side` device pixels.
    fn set_viewport(&mut self, side: u32) -> Result<(), RenderError>;

    fn draw(&mut self) -> Result<(), RenderError>;

    /// Copies the last drawn frame. Must not change any GPU state that a
    /// later draw depends on.
    fn read_pixels(&mut self) -> Result<CapturedFrame, RenderError>;

    /// Frees the program, geometry and any remaining GPU objects.
    fn release(&mut self);
}
