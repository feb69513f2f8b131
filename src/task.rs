use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;

use crate::contract::FrameDecoder;
use crate::dataset::count_frames;
use crate::error::{BenchError, Result};
use crate::frame::{Frame, frame_file_name, load_original_frames, save_frame};
use crate::metrics::{QualityTriple, evaluate};
use crate::sampler::{TimestampMode, sample};

#[derive(Debug, Clone, PartialEq)]
pub struct SampleResult {
    pub task_index: usize,
    pub frame_indices: Vec<usize>,
    pub decode_ms_per_frame: f64,
    pub load_ms_per_frame: f64,
    pub qualities: Vec<QualityTriple>,
}

pub trait SampleTask: Sync {
    fn run(&self, task_index: usize) -> Result<SampleResult>;
}

#[derive(Clone, Copy)]
pub struct DecodeBenchmarkTask<'a> {
    pub artifact_path: &'a Path,
    pub imgs_dir: &'a Path,
    pub mode: TimestampMode,
    pub backend: &'a str,
    pub decoder: &'a dyn FrameDecoder,
    pub episode_frame_count: usize,
    pub fps: u32,
    pub tolerance_s: f64,
    pub base_seed: u64,
    pub save_frames: bool,
}

impl DecodeBenchmarkTask<'_> {
    pub fn diagnostic_dir(&self) -> PathBuf {
        self.artifact_path
            .with_extension("")
            .join(format!("{}_{}", self.mode, self.backend))
    }
}

impl SampleTask for DecodeBenchmarkTask<'_> {
    fn run(&self, task_index: usize) -> Result<SampleResult> {
        let mut rng = StdRng::seed_from_u64(self.base_seed.wrapping_add(task_index as u64));
        let timestamps = sample(self.mode, self.episode_frame_count, self.fps, &mut rng)?;
        let frame_indices = timestamps.frame_indices(self.fps);

        let started = Instant::now();
        let decoded = self.decoder.decode(
            self.artifact_path,
            &timestamps,
            self.fps,
            self.tolerance_s,
        )?;
        let decode_ms = started.elapsed().as_secs_f64() * 1000.0;
        if decoded.len() != timestamps.len() {
            return Err(BenchError::FrameCountMismatch {
                expected: timestamps.len(),
                actual: decoded.len(),
            });
        }

        let started = Instant::now();
        let originals = load_original_frames(self.imgs_dir, timestamps.as_slice(), self.fps)?;
        let load_ms = started.elapsed().as_secs_f64() * 1000.0;

        let qualities = decoded
            .iter()
            .zip(&originals)
            .map(|(frame, original)| evaluate(frame, original, 1.0))
            .collect::<Result<Vec<_>>>()?;

        if self.save_frames && task_index == 0 {
            let save_dir = self.diagnostic_dir();
            if save_diagnostic_frames(self.imgs_dir, &save_dir, &decoded, &frame_indices)? {
                debug!(dir = %save_dir.display(), "saved diagnostic frames");
            }
        }

        let count = timestamps.len() as f64;
        Ok(SampleResult {
            task_index,
            frame_indices,
            decode_ms_per_frame: decode_ms / count,
            load_ms_per_frame: load_ms / count,
            qualities,
        })
    }
}

pub fn save_diagnostic_frames(
    imgs_dir: &Path,
    save_dir: &Path,
    frames: &[Frame],
    frame_indices: &[usize],
) -> Result<bool> {
    if save_dir.is_dir() && count_frames(save_dir, "_decoded.png")? == frames.len() {
        return Ok(false);
    }
    fs::create_dir_all(save_dir).map_err(BenchError::write(save_dir))?;
    for (frame, &idx) in frames.iter().zip(frame_indices) {
        save_frame(frame, &save_dir.join(format!("frame_{idx:06}_decoded.png")))?;
        let original = imgs_dir.join(frame_file_name(idx));
        let copy = save_dir.join(format!("frame_{idx:06}_original.png"));
        fs::copy(&original, &copy).map_err(BenchError::read(&original))?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;
    use crate::frame::load_frame;
    use crate::sampler::TimestampSet;

    struct GroundTruth<'a>(&'a Path);

    impl FrameDecoder for GroundTruth<'_> {
        fn decode(
            &self,
            _artifact_path: &Path,
            timestamps: &TimestampSet,
            fps: u32,
            _tolerance_s: f64,
        ) -> Result<Vec<Frame>> {
            load_original_frames(self.0, timestamps.as_slice(), fps)
        }
    }

    struct Truncating;

    impl FrameDecoder for Truncating {
        fn decode(
            &self,
            _artifact_path: &Path,
            _timestamps: &TimestampSet,
            _fps: u32,
            _tolerance_s: f64,
        ) -> Result<Vec<Frame>> {
            Ok(Vec::new())
        }
    }

    fn write_frames(dir: &Path, count: usize) {
        for idx in 0..count {
            let image = RgbImage::from_fn(8, 8, |x, y| {
                Rgb([(x * 30) as u8, (y * 30) as u8, idx as u8])
            });
            image.save(dir.join(frame_file_name(idx))).unwrap();
        }
    }

    fn task<'a>(
        artifact: &'a Path,
        imgs: &'a Path,
        decoder: &'a dyn FrameDecoder,
        save_frames: bool,
    ) -> DecodeBenchmarkTask<'a> {
        DecodeBenchmarkTask {
            artifact_path: artifact,
            imgs_dir: imgs,
            mode: TimestampMode::TwoFrames,
            backend: "truth",
            decoder,
            episode_frame_count: 12,
            fps: 10,
            tolerance_s: 1e-4,
            base_seed: 1337,
            save_frames,
        }
    }

    #[test]
    fn lossless_decoder_scores_perfectly() {
        let imgs = tempfile::tempdir().unwrap();
        write_frames(imgs.path(), 12);
        let decoder = GroundTruth(imgs.path());
        let artifact = imgs.path().join("video.mp4");
        let task = task(&artifact, imgs.path(), &decoder, false);

        let result = task.run(3).unwrap();
        assert_eq!(result.task_index, 3);
        assert_eq!(result.frame_indices.len(), 2);
        assert_eq!(result.frame_indices[1], result.frame_indices[0] + 1);
        assert_eq!(result.qualities.len(), 2);
        for q in &result.qualities {
            assert_eq!(q.mse, 0.0);
            assert!(q.psnr.is_infinite());
        }
        assert_eq!(task.run(3).unwrap().frame_indices, result.frame_indices);
    }

    #[test]
    fn short_decode_is_a_task_error() {
        let imgs = tempfile::tempdir().unwrap();
        write_frames(imgs.path(), 12);
        let artifact = imgs.path().join("video.mp4");
        let err = task(&artifact, imgs.path(), &Truncating, false)
            .run(0)
            .unwrap_err();
        assert!(matches!(
            err,
            BenchError::FrameCountMismatch {
                expected: 2,
                actual: 0
            }
        ));
    }

    #[test]
    fn first_task_saves_diagnostic_pairs_once() {
        let root = tempfile::tempdir().unwrap();
        let imgs = root.path().join("images");
        fs::create_dir_all(&imgs).unwrap();
        write_frames(&imgs, 12);
        let decoder = GroundTruth(&imgs);
        let artifact = root.path().join("videos").join("key").join("set.mp4");
        let task = task(&artifact, &imgs, &decoder, true);

        task.run(1).unwrap();
        let save_dir = root.path().join("videos/key/set/2_frames_truth");
        assert_eq!(task.diagnostic_dir(), save_dir);
        assert!(!save_dir.exists());

        let result = task.run(0).unwrap();
        assert_eq!(count_frames(&save_dir, "_decoded.png").unwrap(), 2);
        assert_eq!(count_frames(&save_dir, "_original.png").unwrap(), 2);
        let idx = result.frame_indices[0];
        let decoded = load_frame(&save_dir.join(format!("frame_{idx:06}_decoded.png"))).unwrap();
        let original = load_frame(&imgs.join(frame_file_name(idx))).unwrap();
        assert_eq!(decoded, original);

        let frames = vec![original.clone(), original];
        let saved =
            save_diagnostic_frames(&imgs, &save_dir, &frames, &result.frame_indices).unwrap();
        assert!(!saved);
    }
}
