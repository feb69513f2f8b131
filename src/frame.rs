use std::path::Path;

use image::{ImageError, RgbImage};

use crate::error::{BenchError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl Frame {
    pub fn new(channels: usize, height: usize, width: usize, data: Vec<f32>) -> Result<Self> {
        let expected = channels
            .checked_mul(height)
            .and_then(|v| v.checked_mul(width))
            .ok_or_else(|| BenchError::Decode("frame size overflow".to_string()))?;
        if channels == 0 || height == 0 || width == 0 {
            return Err(BenchError::Decode(
                "frame dimensions must be positive".to_string(),
            ));
        }
        if data.len() != expected {
            return Err(BenchError::Decode(format!(
                "frame data has {} values, expected {expected} for {channels}x{height}x{width}",
                data.len()
            )));
        }
        Ok(Self {
            channels,
            height,
            width,
            data,
        })
    }

    pub fn from_rgb24(width: usize, height: usize, rgb: &[u8]) -> Result<Self> {
        let plane = width.saturating_mul(height);
        if rgb.len() != plane.saturating_mul(3) {
            return Err(BenchError::Decode(format!(
                "rgb24 payload has {} bytes, expected {} for {width}x{height}",
                rgb.len(),
                plane * 3
            )));
        }
        let mut data = vec![0_f32; plane * 3];
        for (i, px) in rgb.chunks_exact(3).enumerate() {
            data[i] = f32::from(px[0]) / 255.0;
            data[plane + i] = f32::from(px[1]) / 255.0;
            data[2 * plane + i] = f32::from(px[2]) / 255.0;
        }
        Self::new(3, height, width, data)
    }

    pub fn from_image(image: &RgbImage) -> Result<Self> {
        Self::from_rgb24(
            image.width() as usize,
            image.height() as usize,
            image.as_raw(),
        )
    }

    pub fn to_image(&self) -> Result<RgbImage> {
        if self.channels != 3 {
            return Err(BenchError::Decode(format!(
                "only 3-channel frames can be saved, got {} channels",
                self.channels
            )));
        }
        let plane = self.height * self.width;
        let mut raw = Vec::with_capacity(plane * 3);
        for i in 0..plane {
            for c in 0..3 {
                raw.push(to_u8(self.data[c * plane + i]));
            }
        }
        RgbImage::from_raw(self.width as u32, self.height as u32, raw)
            .ok_or_else(|| BenchError::Decode("rgb buffer does not match frame size".to_string()))
    }

    pub fn channel(&self, c: usize) -> &[f32] {
        let plane = self.height * self.width;
        &self.data[c * plane..(c + 1) * plane]
    }

    pub fn same_shape(&self, other: &Self) -> bool {
        self.channels == other.channels && self.height == other.height && self.width == other.width
    }
}

#[inline]
fn to_u8(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

pub fn frame_file_name(index: usize) -> String {
    format!("frame_{index:06}.png")
}

pub fn frame_index(timestamp: f64, fps: u32) -> usize {
    (timestamp * f64::from(fps)).round().max(0.0) as usize
}

pub fn load_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path).map_err(|err| match err {
        ImageError::IoError(source) => BenchError::ReadFile {
            path: path.to_path_buf(),
            source,
        },
        other => BenchError::Image(other),
    })?;
    Frame::from_image(&image.to_rgb8())
}

pub fn save_frame(frame: &Frame, path: &Path) -> Result<()> {
    frame.to_image()?.save(path).map_err(|err| match err {
        ImageError::IoError(source) => BenchError::WriteFile {
            path: path.to_path_buf(),
            source,
        },
        other => BenchError::Image(other),
    })
}

pub fn load_original_frames(imgs_dir: &Path, timestamps: &[f64], fps: u32) -> Result<Vec<Frame>> {
    timestamps
        .iter()
        .map(|&ts| load_frame(&imgs_dir.join(frame_file_name(frame_index(ts, fps)))))
        .collect()
}
