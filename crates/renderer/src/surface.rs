use liquidconfig::{ShaderParameterSet, SurfaceSettings};
use logomask::PixelBuffer;
use tracing::{debug, warn};

use crate::backend::SurfaceBackend;
use crate::capture::CapturedFrame;
use crate::types::SurfaceId;
use crate::uniforms::LiquidUniforms;
use crate::RenderError;

/// One mounted liquid metal surface: the program, at most one mask texture
/// and the quad, all reached through `B`.
///
/// Every GPU mutation goes through `&mut self`, so a surface is driven from a
/// single thread. Dropping it releases all GPU resources.
pub struct RenderSurface<B: SurfaceBackend> {
    id: SurfaceId,
    backend: B,
    texture: Option<B::Texture>,
    uniforms: LiquidUniforms,
    params: ShaderParameterSet,
    side: u32,
    pixel_ratio: f32,
    destroyed: bool,
}

impl<B: SurfaceBackend> RenderSurface<B> {
    /// Wraps a backend whose program already compiled and linked, sizes the
    /// square viewport and writes the initial uniforms.
    pub fn new(
        mut backend: B,
        settings: &SurfaceSettings,
        params: &ShaderParameterSet,
    ) -> Result<Self, RenderError> {
        let uniforms = LiquidUniforms::new(params);
        let side = settings.device_side();
        backend.set_viewport(side)?;
        backend.bind_texture(None);
        backend.write_uniforms(&uniforms);

        let id = SurfaceId::next();
        debug!(surface = %id, side, "render surface created");
        Ok(Self {
            id,
            backend,
            texture: None,
            uniforms,
            params: *params,
            side: settings.side,
            pixel_ratio: settings.pixel_ratio,
            destroyed: false,
        })
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn has_image(&self) -> bool {
        self.texture.is_some()
    }

    pub fn parameters(&self) -> &ShaderParameterSet {
        &self.params
    }

    pub fn uniforms(&self) -> &LiquidUniforms {
        &self.uniforms
    }

    /// Device pixels along one edge of the viewport.
    pub fn device_side(&self) -> u32 {
        SurfaceSettings {
            side: self.side,
            pixel_ratio: self.pixel_ratio,
        }
        .device_side()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Stores the knobs and writes them to the uniform block. Values are
    /// used as given; the last write wins.
    pub fn set_parameters(&mut self, params: &ShaderParameterSet) -> Result<(), RenderError> {
        self.ensure_live()?;
        self.params = *params;
        self.uniforms.apply_parameters(params);
        self.backend.write_uniforms(&self.uniforms);
        Ok(())
    }

    /// Replaces the mask texture.
    ///
    /// The new texture is created before the old one is released, so a
    /// failed upload leaves the previous image bound and intact.
    pub fn set_image(&mut self, image: &PixelBuffer) -> Result<(), RenderError> {
        self.ensure_live()?;
        let texture = self.backend.create_texture(image).map_err(|err| {
            warn!(surface = %self.id, error = %err, "mask upload failed, keeping previous image");
            err
        })?;
        self.backend.bind_texture(Some(&texture));
        if let Some(previous) = self.texture.replace(texture) {
            self.backend.release_texture(previous);
        }
        self.uniforms.img_ratio = image.aspect_ratio();
        self.backend.write_uniforms(&self.uniforms);
        debug!(
            surface = %self.id,
            width = image.width(),
            height = image.height(),
            "mask texture bound"
        );
        Ok(())
    }

    /// Reapplies the square viewport for a new device pixel ratio. The
    /// texture is left alone.
    pub fn resize(&mut self, pixel_ratio: f32) -> Result<(), RenderError> {
        self.ensure_live()?;
        if pixel_ratio.is_finite() && pixel_ratio > 0.0 {
            self.pixel_ratio = pixel_ratio;
        }
        let side = self.device_side();
        self.backend.set_viewport(side)?;
        self.uniforms.ratio = 1.0;
        self.backend.write_uniforms(&self.uniforms);
        debug!(surface = %self.id, side, "render surface resized");
        Ok(())
    }

    /// Draws one frame at `time_ms` of accumulated animation time.
    pub fn render(&mut self, time_ms: f32) -> Result<(), RenderError> {
        self.ensure_live()?;
        self.uniforms.time = time_ms;
        self.backend.write_uniforms(&self.uniforms);
        self.backend.draw()
    }

    /// Reads back the last drawn frame without touching draw state.
    pub fn read_pixels(&mut self) -> Result<CapturedFrame, RenderError> {
        self.ensure_live()?;
        self.backend.read_pixels()
    }

    /// Releases the texture and every other GPU resource. Later calls fail
    /// with [`RenderError::Destroyed`].
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.backend.bind_texture(None);
        if let Some(texture) = self.texture.take() {
            self.backend.release_texture(texture);
        }
        self.backend.release();
        self.destroyed = true;
        debug!(surface = %self.id, "render surface destroyed");
    }

    fn ensure_live(&self) -> Result<(), RenderError> {
        if self.destroyed {
            Err(RenderError::Destroyed(self.id))
        } else {
            Ok(())
        }
    }
}

impl<B: SurfaceBackend> Drop for RenderSurface<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}
