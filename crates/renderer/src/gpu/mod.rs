//! wgpu implementation of [`SurfaceBackend`].
//!
//! The liquid program renders into a square offscreen target. Read-back copies
//! from that target; a window, when present, gets a scaled blit of it.

mod context;
mod pipeline;
mod present;
mod target;
mod texture;

use std::sync::Arc;

use logomask::PixelBuffer;
use raw_window_handle::{HasWindowHandle, RawWindowHandle};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::backend::SurfaceBackend;
use crate::capture::CapturedFrame;
use crate::types::{AdapterProfile, GpuOptions, RowOrigin};
use crate::uniforms::LiquidUniforms;
use crate::RenderError;

use context::{create_instance, GpuContext};
use pipeline::{create_quad, texture_bind_group, LiquidPipeline};
use present::Presenter;
use target::RenderTarget;

pub use texture::GpuTexture;

pub struct WgpuBackend {
    context: GpuContext,
    pipeline: LiquidPipeline,
    quad: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    placeholder: GpuTexture,
    mask_bind_group: wgpu::BindGroup,
    target: RenderTarget,
    presenter: Option<Presenter>,
    released: bool,
}

impl WgpuBackend {
    /// Offscreen backend for export and tests on machines with an adapter.
    pub fn headless(options: &GpuOptions) -> Result<Self, RenderError> {
        let context = GpuContext::new(create_instance(), options, None)?;
        Self::build(context, None)
    }

    /// Backend that can also present into `window`.
    pub fn for_window(window: Arc<Window>, options: &GpuOptions) -> Result<Self, RenderError> {
        let instance = create_instance();
        let size = window.inner_size();
        if let Ok(handle) = window.window_handle() {
            tracing::debug!(
                platform = window_platform(handle.as_raw()),
                width = size.width,
                height = size.height,
                "creating window surface"
            );
        }
        let surface = instance
            .create_surface(window)
            .map_err(|err| RenderError::Surface(err.to_string()))?;
        let context = GpuContext::new(instance, options, Some(&surface))?;
        let presenter = Presenter::new(&context, surface, size.width, size.height)?;
        Self::build(context, Some(presenter))
    }

    fn build(context: GpuContext, presenter: Option<Presenter>) -> Result<Self, RenderError> {
        let device = &context.device;
        let pipeline = LiquidPipeline::new(device)?;
        let quad = create_quad(device);

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("liquid uniforms"),
            contents: LiquidUniforms::new(&Default::default()).as_bytes(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("liquid uniform bind group"),
            layout: &pipeline.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let sampler = texture::linear_clamp_sampler(device, "mask sampler");
        let placeholder = texture::placeholder(device, &context.queue);
        let mask_bind_group = texture_bind_group(
            device,
            "placeholder mask bind group",
            &pipeline.mask_layout,
            &placeholder.view,
            &sampler,
        );
        let target = RenderTarget::new(device, 1);

        Ok(Self {
            context,
            pipeline,
            quad,
            uniform_buffer,
            uniform_bind_group,
            sampler,
            placeholder,
            mask_bind_group,
            target,
            presenter,
            released: false,
        })
    }

    pub fn adapter_profile(&self) -> &AdapterProfile {
        &self.context.profile
    }

    /// Reconfigures the window surface; the render target is unaffected.
    pub fn resize_window(&mut self, width: u32, height: u32) {
        if let Some(presenter) = self.presenter.as_mut() {
            presenter.resize(&self.context.device, width, height);
        }
    }

    /// Blits the last drawn frame to the window, if there is one.
    pub fn present(&mut self) -> Result<(), RenderError> {
        self.ensure_live()?;
        match self.presenter.as_mut() {
            Some(presenter) => {
                presenter.present(&self.context.device, &self.context.queue, &self.target.view)
            }
            None => Ok(()),
        }
    }

    fn ensure_live(&self) -> Result<(), RenderError> {
        if self.released {
            Err(RenderError::Surface("GPU resources were released".into()))
        } else {
            Ok(())
        }
    }
}

fn window_platform(handle: RawWindowHandle) -> &'static str {
    match handle {
        RawWindowHandle::Wayland(_) => "wayland",
        RawWindowHandle::Xlib(_) | RawWindowHandle::Xcb(_) => "x11",
        RawWindowHandle::Win32(_) => "win32",
        RawWindowHandle::AppKit(_) => "appkit",
        _ => "other",
    }
}

impl SurfaceBackend for WgpuBackend {
    type Texture = GpuTexture;

    fn create_texture(&mut self, image: &PixelBuffer) -> Result<GpuTexture, RenderError> {
        self.ensure_live()?;
        texture::upload_mask(
            &self.context.device,
            &self.context.queue,
            image,
            self.context.profile.max_texture_side,
        )
    }

    fn bind_texture(&mut self, texture: Option<&GpuTexture>) {
        let view = texture.map_or(&self.placeholder.view, |texture| &texture.view);
        self.mask_bind_group = texture_bind_group(
            &self.context.device,
            "mask bind group",
            &self.pipeline.mask_layout,
            view,
            &self.sampler,
        );
    }

    fn release_texture(&mut self, texture: GpuTexture) {
        let (width, height) = texture.dimensions();
        texture.destroy();
        tracing::debug!(width, height, "released mask texture");
    }

    fn write_uniforms(&mut self, uniforms: &LiquidUniforms) {
        if self.released {
            return;
        }
        self.context
            .queue
            .write_buffer(&self.uniform_buffer, 0, uniforms.as_bytes());
    }

    fn set_viewport(&mut self, side: u32) -> Result<(), RenderError> {
        self.ensure_live()?;
        let max_side = self.context.profile.max_texture_side;
        let side = if side > max_side {
            tracing::warn!(
                requested = side,
                max_side,
                "surface larger than the adapter allows; clamping"
            );
            max_side
        } else {
            side.max(1)
        };
        if side != self.target.side() {
            self.target.destroy();
            self.target = RenderTarget::new(&self.context.device, side);
        }
        Ok(())
    }

    fn draw(&mut self) -> Result<(), RenderError> {
        self.ensure_live()?;
        let device = &self.context.device;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("liquid encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("liquid pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline.pipeline);
            pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            pass.set_bind_group(1, &self.mask_bind_group, &[]);
            pass.set_vertex_buffer(0, self.quad.slice(..));
            pass.draw(0..4, 0..1);
        }
        self.context.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn read_pixels(&mut self) -> Result<CapturedFrame, RenderError> {
        self.ensure_live()?;
        let data = self.target.read(&self.context.device, &self.context.queue)?;
        let side = self.target.side();
        Ok(CapturedFrame::new(side, side, data, RowOrigin::TopLeft))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.presenter = None;
        self.target.destroy();
        self.placeholder.texture.destroy();
        self.quad.destroy();
        self.uniform_buffer.destroy();
        self.released = true;
        tracing::debug!("released GPU resources");
    }
}
