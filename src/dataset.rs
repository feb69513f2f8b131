use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::contract::EpisodeSource;
use crate::error::{BenchError, Result};
use crate::frame::frame_file_name;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatasetInfo {
    pub fps: u32,
    #[serde(default)]
    pub video: bool,
    pub episode_lengths: Vec<usize>,
    #[serde(default = "default_image_dir")]
    pub image_dir: String,
}

fn default_image_dir() -> String {
    "images".to_string()
}

#[derive(Debug, Clone)]
pub struct LocalImageDataset {
    id: String,
    root: PathBuf,
    info: DatasetInfo,
}

impl LocalImageDataset {
    pub fn open(root: &Path) -> Result<Self> {
        let id = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                BenchError::InvalidConfig(format!("dataset path has no name: {}", root.display()))
            })?;
        Self::open_as(root, id)
    }

    pub fn open_as(root: &Path, id: impl Into<String>) -> Result<Self> {
        let info_path = root.join("info.json");
        let text = fs::read_to_string(&info_path).map_err(BenchError::read(&info_path))?;
        let info: DatasetInfo = serde_json::from_str(&text)?;
        if info.fps == 0 {
            return Err(BenchError::InvalidConfig(format!(
                "{}: fps must be positive",
                info_path.display()
            )));
        }
        Ok(Self {
            id: id.into(),
            root: root.to_path_buf(),
            info,
        })
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join(&self.info.image_dir)
    }
}

impl EpisodeSource for LocalImageDataset {
    fn dataset_id(&self) -> &str {
        &self.id
    }

    fn fps(&self) -> u32 {
        self.info.fps
    }

    fn is_video(&self) -> bool {
        self.info.video
    }

    fn episode_frame_count(&self) -> usize {
        self.info.episode_lengths.first().copied().unwrap_or(0)
    }

    fn materialize_first_episode(&self, dir: &Path) -> Result<()> {
        if self.is_video() {
            return Err(BenchError::VideoDataset(self.id.clone()));
        }
        let count = self.episode_frame_count();
        if dir.is_dir() && count_frames(dir, ".png")? == count {
            debug!(dataset = %self.id, dir = %dir.display(), "episode frames already materialized");
            return Ok(());
        }
        fs::create_dir_all(dir).map_err(BenchError::write(dir))?;
        let source = self.frames_dir();
        for idx in 0..count {
            let name = frame_file_name(idx);
            let from = source.join(&name);
            fs::copy(&from, dir.join(&name)).map_err(BenchError::read(&from))?;
        }
        debug!(dataset = %self.id, frames = count, "materialized first episode");
        Ok(())
    }
}

pub fn count_frames(dir: &Path, suffix: &str) -> Result<usize> {
    let entries = fs::read_dir(dir).map_err(BenchError::read(dir))?;
    let mut count = 0;
    for entry in entries {
        let entry = entry.map_err(BenchError::read(dir))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("frame_") && name.ends_with(suffix) {
            count += 1;
        }
    }
    Ok(count)
}

pub fn dataset_dir_name(dataset_id: &str) -> String {
    dataset_id.replace('/', "_")
}
