use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::Mutex;

use tracing::debug;

use crate::contract::{DecoderRegistry, FrameDecoder, VideoEncoder};
use crate::encoding::EncodingConfig;
use crate::error::{BenchError, Result};
use crate::frame::{Frame, frame_index};
use crate::sampler::TimestampSet;

pub const FFMPEG_SEEK: &str = "ffmpeg-seek";
pub const FFMPEG_SELECT: &str = "ffmpeg-select";

const FFMPEG: &str = "ffmpeg";
const FFPROBE: &str = "ffprobe";

fn run(program: &'static str, args: &[String]) -> Result<Output> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| BenchError::Spawn { program, source })
}

fn stderr_tail(output: &Output) -> String {
    let text = String::from_utf8_lossy(&output.stderr);
    text.lines().rev().take(3).collect::<Vec<_>>().join(" | ")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegEncoder;

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self
    }

    pub fn encode_args(
        raw_frames_dir: &Path,
        output_path: &Path,
        fps: u32,
        config: &EncodingConfig,
        overwrite: bool,
    ) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            if overwrite { "-y" } else { "-n" },
            "-f",
            "image2",
            "-r",
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect();
        args.push(fps.to_string());
        args.push("-i".to_string());
        args.push(
            raw_frames_dir
                .join("frame_%06d.png")
                .to_string_lossy()
                .into_owned(),
        );
        for (key, value) in config.entries() {
            if value.is_unset() {
                continue;
            }
            args.push(format!("-{key}"));
            args.push(value.to_string());
        }
        args.push(output_path.to_string_lossy().into_owned());
        args
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn encode(
        &self,
        raw_frames_dir: &Path,
        output_path: &Path,
        fps: u32,
        config: &EncodingConfig,
        overwrite: bool,
    ) -> Result<()> {
        if !overwrite && output_path.exists() {
            return Ok(());
        }
        let args = Self::encode_args(raw_frames_dir, output_path, fps, config, overwrite);
        debug!(command = %format!("{FFMPEG} {}", args.join(" ")), "encoding");
        let output = run(FFMPEG, &args)?;
        if !output.status.success() {
            return Err(BenchError::Encode(format!(
                "{FFMPEG} exited with {} for {}: {}",
                output.status,
                output_path.display(),
                stderr_tail(&output)
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStrategy {
    InputSeek,
    SelectFilter,
}

#[derive(Debug)]
pub struct FfmpegDecoder {
    strategy: SeekStrategy,
    dims: Mutex<HashMap<PathBuf, (usize, usize)>>,
}

impl FfmpegDecoder {
    pub fn new(strategy: SeekStrategy) -> Self {
        Self {
            strategy,
            dims: Mutex::new(HashMap::new()),
        }
    }

    fn frame_args(&self, artifact_path: &Path, timestamp: f64, index: usize) -> Vec<String> {
        let input = artifact_path.to_string_lossy().into_owned();
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "info"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        match self.strategy {
            SeekStrategy::InputSeek => {
                args.extend([
                    "-copyts".to_string(),
                    "-ss".to_string(),
                    format!("{timestamp:.6}"),
                    "-i".to_string(),
                    input,
                    "-vf".to_string(),
                    "showinfo".to_string(),
                ]);
            }
            SeekStrategy::SelectFilter => {
                args.extend([
                    "-i".to_string(),
                    input,
                    "-vf".to_string(),
                    format!("select=eq(n\\,{index}),showinfo"),
                    "-vsync".to_string(),
                    "0".to_string(),
                ]);
            }
        }
        args.extend(
            ["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"]
                .iter()
                .map(|s| (*s).to_string()),
        );
        args
    }

    fn dimensions(&self, artifact_path: &Path) -> Result<(usize, usize)> {
        let poisoned = || BenchError::Decode("dimension cache lock poisoned".to_string());
        if let Some(dims) = self.dims.lock().map_err(|_| poisoned())?.get(artifact_path) {
            return Ok(*dims);
        }
        let dims = probe_dimensions(artifact_path)?;
        self.dims
            .lock()
            .map_err(|_| poisoned())?
            .insert(artifact_path.to_path_buf(), dims);
        Ok(dims)
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn decode(
        &self,
        artifact_path: &Path,
        timestamps: &TimestampSet,
        fps: u32,
        tolerance_s: f64,
    ) -> Result<Vec<Frame>> {
        let indices = timestamps
            .as_slice()
            .iter()
            .map(|&ts| resolve_frame_index(ts, fps, tolerance_s))
            .collect::<Result<Vec<_>>>()?;
        let (width, height) = self.dimensions(artifact_path)?;
        let frame_bytes = width * height * 3;

        timestamps
            .as_slice()
            .iter()
            .zip(indices)
            .map(|(&timestamp, index)| {
                let output = run(FFMPEG, &self.frame_args(artifact_path, timestamp, index))?;
                if !output.status.success() {
                    return Err(BenchError::Decode(format!(
                        "{FFMPEG} exited with {} for {} at {timestamp}s: {}",
                        output.status,
                        artifact_path.display(),
                        stderr_tail(&output)
                    )));
                }
                if output.stdout.len() < frame_bytes {
                    return Err(BenchError::FrameNotFound {
                        path: artifact_path.to_path_buf(),
                        timestamp,
                    });
                }
                let decoded = parse_pts_time(&String::from_utf8_lossy(&output.stderr))
                    .ok_or_else(|| BenchError::FrameNotFound {
                        path: artifact_path.to_path_buf(),
                        timestamp,
                    })?;
                check_decoded_timestamp(artifact_path, timestamp, decoded, tolerance_s)?;
                Frame::from_rgb24(width, height, &output.stdout[..frame_bytes])
            })
            .collect()
    }
}

pub fn resolve_frame_index(timestamp: f64, fps: u32, tolerance_s: f64) -> Result<usize> {
    let out_of_tolerance = || BenchError::TimestampOutOfTolerance {
        timestamp,
        tolerance_s,
        fps,
    };
    if fps == 0 || !timestamp.is_finite() || timestamp < 0.0 {
        return Err(out_of_tolerance());
    }
    let index = frame_index(timestamp, fps);
    let grid = index as f64 / f64::from(fps);
    if (grid - timestamp).abs() > tolerance_s {
        return Err(out_of_tolerance());
    }
    Ok(index)
}

// First `pts_time:` reported by the `showinfo` filter.
fn parse_pts_time(stderr: &str) -> Option<f64> {
    stderr
        .lines()
        .filter(|line| line.contains("showinfo"))
        .find_map(|line| {
            let (_, rest) = line.split_once("pts_time:")?;
            rest.split_whitespace().next()?.parse::<f64>().ok()
        })
        .filter(|pts| pts.is_finite())
}

pub fn check_decoded_timestamp(
    artifact_path: &Path,
    requested: f64,
    decoded: f64,
    tolerance_s: f64,
) -> Result<()> {
    if (decoded - requested).abs() > tolerance_s {
        return Err(BenchError::DecodedTimestampMismatch {
            path: artifact_path.to_path_buf(),
            requested,
            decoded,
            tolerance_s,
        });
    }
    Ok(())
}

pub fn probe_dimensions(artifact_path: &Path) -> Result<(usize, usize)> {
    let args: Vec<String> = [
        "-v",
        "error",
        "-select_streams",
        "v:0",
        "-show_entries",
        "stream=width,height",
        "-of",
        "csv=p=0:s=x",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .chain([artifact_path.to_string_lossy().into_owned()])
    .collect();
    let output = run(FFPROBE, &args)?;
    if !output.status.success() {
        return Err(BenchError::Decode(format!(
            "{FFPROBE} exited with {} for {}: {}",
            output.status,
            artifact_path.display(),
            stderr_tail(&output)
        )));
    }
    let text = String::from_utf8_lossy(&output.stdout);
    parse_dimensions(&text).ok_or_else(|| {
        BenchError::Decode(format!(
            "unexpected {FFPROBE} output for {}: {}",
            artifact_path.display(),
            text.trim()
        ))
    })
}

fn parse_dimensions(text: &str) -> Option<(usize, usize)> {
    let line = text.lines().find(|line| !line.trim().is_empty())?;
    let (width, height) = line.trim().split_once('x')?;
    let width = width.parse::<usize>().ok().filter(|w| *w > 0)?;
    let height = height
        .trim_end_matches('x')
        .parse::<usize>()
        .ok()
        .filter(|h| *h > 0)?;
    Some((width, height))
}

pub fn default_registry() -> DecoderRegistry {
    DecoderRegistry::new()
        .with(
            FFMPEG_SEEK,
            Box::new(FfmpegDecoder::new(SeekStrategy::InputSeek)),
        )
        .with(
            FFMPEG_SELECT,
            Box::new(FfmpegDecoder::new(SeekStrategy::SelectFilter)),
        )
}
