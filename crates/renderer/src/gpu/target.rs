use crossbeam_channel::bounded;

use super::pipeline::TARGET_FORMAT;
use crate::RenderError;

/// Square offscreen colour target plus the staging buffer used to read it.
pub(crate) struct RenderTarget {
    texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    side: u32,
    readback: wgpu::Buffer,
    padded_bytes_per_row: u32,
}

/// Rows in a texture-to-buffer copy must start on 256 byte boundaries.
pub(crate) fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

impl RenderTarget {
    pub fn new(device: &wgpu::Device, side: u32) -> Self {
        let side = side.max(1);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("liquid target"),
            size: wgpu::Extent3d {
                width: side,
                height: side,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let padded_bytes_per_row = padded_bytes_per_row(side);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("liquid readback"),
            size: padded_bytes_per_row as u64 * side as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self {
            texture,
            view,
            side,
            readback,
            padded_bytes_per_row,
        }
    }

    pub fn side(&self) -> u32 {
        self.side
    }

    /// Copies the target into host memory, top row first, without padding.
    pub fn read(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u8>, RenderError> {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("liquid readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.side),
                },
            },
            wgpu::Extent3d {
                width: self.side,
                height: self.side,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(Some(encoder.finish()));

        let slice = self.readback.slice(..);
        let (tx, rx) = bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| RenderError::Readback(format!("device poll failed: {err:?}")))?;
        rx.recv()
            .map_err(|_| RenderError::Readback("map callback never ran".into()))?
            .map_err(|err| RenderError::Readback(format!("buffer map failed: {err:?}")))?;

        let row_bytes = self.side as usize * 4;
        let padded = self.padded_bytes_per_row as usize;
        let mapped = slice.get_mapped_range();
        let mut out = Vec::with_capacity(row_bytes * self.side as usize);
        for row in mapped.chunks_exact(padded) {
            out.extend_from_slice(&row[..row_bytes]);
        }
        drop(mapped);
        self.readback.unmap();
        Ok(out)
    }

    pub fn destroy(&self) {
        self.texture.destroy();
        self.readback.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_pad_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(1000), 4096);
        assert_eq!(padded_bytes_per_row(2000), 8192);
        assert_eq!(padded_bytes_per_row(1), 256);
    }
}
