use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BenchError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Precondition,
    Task,
    Io,
}

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("invalid timestamps mode: {0}")]
    InvalidMode(String),
    #[error("unknown decode backend: {0}")]
    UnknownBackend(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("dataset {0} is a video dataset, an image dataset is required")]
    VideoDataset(String),
    #[error("episode has {frame_count} frames, at least {min} are required for sampling")]
    EpisodeTooShort { frame_count: usize, min: usize },
    #[error("timestamp {timestamp}s is not within {tolerance_s}s of a frame at {fps} fps")]
    TimestampOutOfTolerance {
        timestamp: f64,
        tolerance_s: f64,
        fps: u32,
    },
    #[error("decoded pts {decoded}s in {path} is not within {tolerance_s}s of {requested}s")]
    DecodedTimestampMismatch {
        path: PathBuf,
        requested: f64,
        decoded: f64,
        tolerance_s: f64,
    },
    #[error("frame not found in {path} at {timestamp}s")]
    FrameNotFound { path: PathBuf, timestamp: f64 },
    #[error("decoder returned {actual} frames for {expected} timestamps")]
    FrameCountMismatch { expected: usize, actual: usize },
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("metric computation failed: {0}")]
    Metric(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("cache path collision at {path}: expected config {expected}, manifest has {found}")]
    CacheCollision {
        path: PathBuf,
        expected: String,
        found: String,
    },
    #[error("worker pool error: {0}")]
    WorkerPool(String),
    #[error("failed to read file: {path}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file: {path}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn {program}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BenchError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMode(_)
            | Self::UnknownBackend(_)
            | Self::InvalidConfig(_)
            | Self::WorkerPool(_) => ErrorKind::Configuration,
            Self::VideoDataset(_) | Self::EpisodeTooShort { .. } => ErrorKind::Precondition,
            Self::TimestampOutOfTolerance { .. }
            | Self::DecodedTimestampMismatch { .. }
            | Self::FrameNotFound { .. }
            | Self::FrameCountMismatch { .. }
            | Self::Decode(_)
            | Self::Metric(_) => ErrorKind::Task,
            Self::Encode(_)
            | Self::CacheCollision { .. }
            | Self::ReadFile { .. }
            | Self::WriteFile { .. }
            | Self::Spawn { .. }
            | Self::Image(_)
            | Self::Csv(_)
            | Self::Json(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn read(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::ReadFile { path, source }
    }

    pub(crate) fn write(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::WriteFile { path, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_classified_into_tiers() {
        assert_eq!(
            BenchError::InvalidMode("3_frames".to_string()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            BenchError::VideoDataset("lerobot/pusht".to_string()).kind(),
            ErrorKind::Precondition
        );
        assert_eq!(
            BenchError::TimestampOutOfTolerance {
                timestamp: 0.55,
                tolerance_s: 1e-4,
                fps: 10,
            }
            .kind(),
            ErrorKind::Task
        );
        assert_eq!(
            BenchError::CacheCollision {
                path: PathBuf::from("videos/a/b.mp4"),
                expected: "a".to_string(),
                found: "b".to_string(),
            }
            .kind(),
            ErrorKind::Io
        );
    }

    #[test]
    fn write_helper_keeps_path_in_message() {
        let err = BenchError::write("out/table.csv")(std::io::Error::other("denied"));
        assert_eq!(err.to_string(), "failed to write file: out/table.csv");
    }
}
