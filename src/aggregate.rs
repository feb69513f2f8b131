use crate::error::{BenchError, Result};
use crate::task::SampleResult;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateMetrics {
    pub avg_load_time_video_ms: f64,
    pub avg_load_time_images_ms: f64,
    pub video_images_load_time_ratio: f64,
    pub avg_mse: f64,
    pub avg_psnr: f64,
    pub avg_ssim: f64,
    pub num_samples: usize,
    pub num_frames: usize,
}

pub fn aggregate(results: &[SampleResult]) -> Result<AggregateMetrics> {
    if results.is_empty() {
        return Err(BenchError::Metric(
            "cannot aggregate zero sample results".to_string(),
        ));
    }
    // Fixed summation order keeps averages bit-identical across worker counts.
    let mut ordered: Vec<&SampleResult> = results.iter().collect();
    ordered.sort_by_key(|r| r.task_index);

    let num_samples = ordered.len();
    let video_ms = ordered.iter().map(|r| r.decode_ms_per_frame).sum::<f64>() / num_samples as f64;
    let images_ms = ordered.iter().map(|r| r.load_ms_per_frame).sum::<f64>() / num_samples as f64;

    let (mut mse, mut psnr, mut ssim, mut num_frames) = (0.0, 0.0, 0.0, 0_usize);
    for quality in ordered.iter().flat_map(|r| &r.qualities) {
        mse += quality.mse;
        psnr += quality.psnr;
        ssim += quality.ssim;
        num_frames += 1;
    }
    if num_frames == 0 {
        return Err(BenchError::Metric(
            "sample results carry no frame metrics".to_string(),
        ));
    }
    let frames = num_frames as f64;

    Ok(AggregateMetrics {
        avg_load_time_video_ms: video_ms,
        avg_load_time_images_ms: images_ms,
        video_images_load_time_ratio: video_ms / images_ms,
        avg_mse: mse / frames,
        avg_psnr: psnr / frames,
        avg_ssim: ssim / frames,
        num_samples,
        num_frames,
    })
}
