//! Render target readback.
//!
//! Copies a target into a mapped buffer and optionally writes a PNG. Meant
//! for debugging capture/chain output, not for the per-frame path: the map
//! wait stalls the queue.

use crate::gpu::target::RenderTarget;
use anyhow::{Context, Result};
use std::path::Path;

/// Read a target's pixels as tightly packed RGBA8 rows.
pub fn read_rgba(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    target: &RenderTarget,
) -> Result<Vec<u8>> {
    let (width, height) = target.size();
    let bytes_per_pixel = std::mem::size_of::<u32>() as u32;
    let unpadded_bytes_per_row = bytes_per_pixel * width;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padding = (align - unpadded_bytes_per_row % align) % align;
    let padded_bytes_per_row = unpadded_bytes_per_row + padding;

    let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Buffer"),
        size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture: target.texture(),
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &output_buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(Some(encoder.finish()));

    let buffer_slice = output_buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .context("readback mapping dropped")?
        .context("readback mapping failed")?;

    let data = buffer_slice.get_mapped_range();
    let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
    for row in 0..height {
        let start = (row * padded_bytes_per_row) as usize;
        let end = start + unpadded_bytes_per_row as usize;
        pixels.extend_from_slice(&data[start..end]);
    }
    drop(data);
    output_buffer.unmap();

    Ok(pixels)
}

/// Dump a target to a PNG file.
pub fn save_png(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    target: &RenderTarget,
    path: impl AsRef<Path>,
) -> Result<()> {
    let (width, height) = target.size();
    let pixels = read_rgba(device, queue, target)?;
    image::save_buffer(path.as_ref(), &pixels, width, height, image::ColorType::Rgba8)
        .with_context(|| format!("write png {:?}", path.as_ref()))?;
    log::info!("wrote {:?}", path.as_ref());
    Ok(())
}
