use crate::error::{BenchError, Result};
use crate::frame::Frame;

pub const SSIM_WINDOW: usize = 7;

const K1: f64 = 0.01;
const K2: f64 = 0.03;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityTriple {
    pub mse: f64,
    pub psnr: f64,
    pub ssim: f64,
}

pub fn evaluate(decoded: &Frame, reference: &Frame, data_range: f64) -> Result<QualityTriple> {
    let mse = mean_squared_error(reference, decoded)?;
    Ok(QualityTriple {
        mse,
        psnr: psnr_from_mse(mse, data_range)?,
        ssim: structural_similarity(reference, decoded, data_range)?,
    })
}

pub fn mean_squared_error(reference: &Frame, decoded: &Frame) -> Result<f64> {
    check_shapes(reference, decoded)?;
    let sum: f64 = reference
        .data
        .iter()
        .zip(&decoded.data)
        .map(|(&r, &d)| {
            let diff = f64::from(r) - f64::from(d);
            diff * diff
        })
        .sum();
    Ok(sum / reference.data.len() as f64)
}

pub fn peak_signal_noise_ratio(reference: &Frame, decoded: &Frame, data_range: f64) -> Result<f64> {
    psnr_from_mse(mean_squared_error(reference, decoded)?, data_range)
}

fn psnr_from_mse(mse: f64, data_range: f64) -> Result<f64> {
    if !(data_range > 0.0) {
        return Err(BenchError::Metric(format!(
            "data range must be positive, got {data_range}"
        )));
    }
    if mse == 0.0 {
        return Ok(f64::INFINITY);
    }
    Ok(10.0 * (data_range * data_range / mse).log10())
}

pub fn structural_similarity(reference: &Frame, decoded: &Frame, data_range: f64) -> Result<f64> {
    check_shapes(reference, decoded)?;
    if reference.height < SSIM_WINDOW || reference.width < SSIM_WINDOW {
        return Err(BenchError::Metric(format!(
            "frame {}x{} is smaller than the {SSIM_WINDOW}x{SSIM_WINDOW} SSIM window",
            reference.width, reference.height
        )));
    }
    if !(data_range > 0.0) {
        return Err(BenchError::Metric(format!(
            "data range must be positive, got {data_range}"
        )));
    }
    let total: f64 = (0..reference.channels)
        .map(|c| {
            channel_ssim(
                reference.channel(c),
                decoded.channel(c),
                reference.width,
                reference.height,
                data_range,
            )
        })
        .sum();
    Ok(total / reference.channels as f64)
}

fn check_shapes(reference: &Frame, decoded: &Frame) -> Result<()> {
    if !reference.same_shape(decoded) {
        return Err(BenchError::Metric(format!(
            "shape mismatch: reference {}x{}x{}, decoded {}x{}x{}",
            reference.channels,
            reference.height,
            reference.width,
            decoded.channels,
            decoded.height,
            decoded.width
        )));
    }
    Ok(())
}

// Summed-area tables of x, y and their products, with one leading zero row and column.
struct MomentTables {
    stride: usize,
    x: Vec<f64>,
    y: Vec<f64>,
    xx: Vec<f64>,
    yy: Vec<f64>,
    xy: Vec<f64>,
}

impl MomentTables {
    fn new(x: &[f32], y: &[f32], width: usize, height: usize) -> Self {
        let stride = width + 1;
        let size = stride * (height + 1);
        let mut tables = Self {
            stride,
            x: vec![0.0; size],
            y: vec![0.0; size],
            xx: vec![0.0; size],
            yy: vec![0.0; size],
            xy: vec![0.0; size],
        };
        for row in 0..height {
            let (mut rx, mut ry, mut rxx, mut ryy, mut rxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
            for col in 0..width {
                let a = f64::from(x[row * width + col]);
                let b = f64::from(y[row * width + col]);
                rx += a;
                ry += b;
                rxx += a * a;
                ryy += b * b;
                rxy += a * b;
                let above = row * stride + col + 1;
                let here = above + stride;
                tables.x[here] = tables.x[above] + rx;
                tables.y[here] = tables.y[above] + ry;
                tables.xx[here] = tables.xx[above] + rxx;
                tables.yy[here] = tables.yy[above] + ryy;
                tables.xy[here] = tables.xy[above] + rxy;
            }
        }
        tables
    }

    #[inline]
    fn window_sum(&self, table: &[f64], top: usize, left: usize) -> f64 {
        let s = self.stride;
        let bottom = top + SSIM_WINDOW;
        let right = left + SSIM_WINDOW;
        table[bottom * s + right] - table[top * s + right] - table[bottom * s + left]
            + table[top * s + left]
    }
}

fn channel_ssim(x: &[f32], y: &[f32], width: usize, height: usize, data_range: f64) -> f64 {
    let tables = MomentTables::new(x, y, width, height);
    let n = (SSIM_WINDOW * SSIM_WINDOW) as f64;
    let cov_norm = n / (n - 1.0);
    let c1 = (K1 * data_range).powi(2);
    let c2 = (K2 * data_range).powi(2);

    let rows = height - SSIM_WINDOW + 1;
    let cols = width - SSIM_WINDOW + 1;
    let mut total = 0.0;
    for top in 0..rows {
        for left in 0..cols {
            let ux = tables.window_sum(&tables.x, top, left) / n;
            let uy = tables.window_sum(&tables.y, top, left) / n;
            let uxx = tables.window_sum(&tables.xx, top, left) / n;
            let uyy = tables.window_sum(&tables.yy, top, left) / n;
            let uxy = tables.window_sum(&tables.xy, top, left) / n;
            let vx = cov_norm * (uxx - ux * ux);
            let vy = cov_norm * (uyy - uy * uy);
            let vxy = cov_norm * (uxy - ux * uy);

            let numerator = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
            let denominator = (ux * ux + uy * uy + c1) * (vx + vy + c2);
            total += numerator / denominator;
        }
    }
    total / (rows * cols) as f64
}
