use std::str::FromStr;
use std::{fmt, fmt::Display};

use rand::Rng;

use crate::error::{BenchError, Result};
use crate::frame::frame_index;

pub const MIN_PIVOT_INDEX: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampMode {
    OneFrame,
    TwoFrames,
    TwoFramesFourSpace,
    SixFrames,
}

impl TimestampMode {
    pub const ALL: [Self; 4] = [
        Self::OneFrame,
        Self::TwoFrames,
        Self::TwoFramesFourSpace,
        Self::SixFrames,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneFrame => "1_frame",
            Self::TwoFrames => "2_frames",
            Self::TwoFramesFourSpace => "2_frames_4_space",
            Self::SixFrames => "6_frames",
        }
    }

    // Backward distances from the pivot, in ascending frame order.
    fn offsets(self) -> &'static [usize] {
        match self {
            Self::OneFrame => &[0],
            Self::TwoFrames => &[1, 0],
            Self::TwoFramesFourSpace => &[5, 0],
            Self::SixFrames => &[5, 4, 3, 2, 1, 0],
        }
    }

    pub fn frame_count(self) -> usize {
        self.offsets().len()
    }

    // Exact for any pivot at or above MIN_PIVOT_INDEX.
    pub(crate) fn frame_indices(self, pivot: usize) -> Vec<usize> {
        self.offsets()
            .iter()
            .map(|offset| pivot.saturating_sub(*offset))
            .collect()
    }
}

impl Display for TimestampMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimestampMode {
    type Err = BenchError;

    fn from_str(value: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == value)
            .ok_or_else(|| BenchError::InvalidMode(value.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimestampSet {
    seconds: Vec<f64>,
}

impl TimestampSet {
    pub fn from_indices(indices: &[usize], fps: u32) -> Self {
        let fps = f64::from(fps);
        Self {
            seconds: indices.iter().map(|&idx| idx as f64 / fps).collect(),
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.seconds
    }

    pub fn len(&self) -> usize {
        self.seconds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seconds.is_empty()
    }

    pub fn frame_indices(&self, fps: u32) -> Vec<usize> {
        self.seconds
            .iter()
            .map(|&ts| frame_index(ts, fps))
            .collect()
    }
}

pub fn timestamps_for_pivot(mode: TimestampMode, pivot: usize, fps: u32) -> Result<TimestampSet> {
    if pivot < MIN_PIVOT_INDEX {
        return Err(BenchError::InvalidConfig(format!(
            "pivot {pivot} is below {MIN_PIVOT_INDEX}"
        )));
    }
    Ok(TimestampSet::from_indices(&mode.frame_indices(pivot), fps))
}

pub fn sample<R: Rng + ?Sized>(
    mode: TimestampMode,
    episode_frame_count: usize,
    fps: u32,
    rng: &mut R,
) -> Result<TimestampSet> {
    if fps == 0 {
        return Err(BenchError::InvalidConfig(
            "fps must be positive".to_string(),
        ));
    }
    if episode_frame_count <= MIN_PIVOT_INDEX {
        return Err(BenchError::EpisodeTooShort {
            frame_count: episode_frame_count,
            min: MIN_PIVOT_INDEX + 1,
        });
    }
    let pivot = rng.gen_range(MIN_PIVOT_INDEX..episode_frame_count);
    timestamps_for_pivot(mode, pivot, fps)
}
