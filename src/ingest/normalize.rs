use anyhow::{anyhow, Result};

use crate::frame::Frame;

/// Capture layouts a camera may hand back after format negotiation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Yuyv,
    Nv12,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(Self::Rgb24),
            b"YUYV" => Some(Self::Yuyv),
            b"NV12" => Some(Self::Nv12),
            _ => None,
        }
    }
}

/// Convert one captured buffer into an RGB frame.
pub(crate) fn normalize_to_frame(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
    index: u64,
) -> Result<Frame> {
    let rgb = match format {
        PixelFormat::Rgb24 => {
            let expected = plane_len(width, height, 3)?;
            let data = pixels.get(..expected).ok_or_else(|| {
                anyhow!(
                    "RGB frame length mismatch: expected {}, got {}",
                    expected,
                    pixels.len()
                )
            })?;
            data.to_vec()
        }
        PixelFormat::Yuyv => yuyv_to_rgb(pixels, width, height)?,
        PixelFormat::Nv12 => nv12_to_rgb(pixels, width, height)?,
    };
    Frame::from_rgb(rgb, width, height, index)
}

fn plane_len(width: u32, height: u32, bytes_per_pixel: u32) -> Result<usize> {
    width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(bytes_per_pixel))
        .map(|v| v as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected = plane_len(width, height, 2)?;
    let data = pixels.get(..expected).ok_or_else(|| {
        anyhow!(
            "YUYV frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        )
    })?;

    let mut rgb = Vec::with_capacity(plane_len(width, height, 3)?);
    for quad in data.chunks_exact(4) {
        let u = quad[1] as f32 - 128.0;
        let v = quad[3] as f32 - 128.0;
        for y in [quad[0], quad[2]] {
            rgb.extend_from_slice(&yuv_to_rgb(y as f32, u, v));
        }
    }
    Ok(rgb)
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = plane_len(width, height, 1)?;
    let expected = y_plane
        .checked_add(y_plane / 2)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    if pixels.len() < expected {
        return Err(anyhow!(
            "NV12 frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;

            let offset = (j * w + i) * 3;
            rgb[offset..offset + 3].copy_from_slice(&yuv_to_rgb(y, u, v));
        }
    }

    Ok(rgb)
}

fn yuv_to_rgb(y: f32, u: f32, v: f32) -> [u8; 3] {
    [
        clamp_to_u8(y + 1.402_f32 * v),
        clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v),
        clamp_to_u8(y + 1.772_f32 * u),
    ]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
