use std::convert::Infallible;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{fmt, fmt::Display};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::contract::VideoEncoder;
use crate::dataset::dataset_dir_name;
use crate::error::{BenchError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EncodingValue {
    Int(i64),
    Text(String),
    Unset,
}

impl EncodingValue {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    pub fn csv_field(&self) -> String {
        match self {
            Self::Unset => String::new(),
            other => other.to_string(),
        }
    }
}

impl Display for EncodingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Unset => f.write_str("None"),
        }
    }
}

impl FromStr for EncodingValue {
    type Err = Infallible;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("none") {
            return Ok(Self::Unset);
        }
        Ok(value
            .parse::<i64>()
            .map_or_else(|_| Self::Text(value.to_owned()), Self::Int))
    }
}

impl From<i64> for EncodingValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for EncodingValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingConfig {
    entries: Vec<(String, EncodingValue)>,
}

impl EncodingConfig {
    pub fn new(entries: Vec<(String, EncodingValue)>) -> Result<Self> {
        for (i, (key, _)) in entries.iter().enumerate() {
            if entries[..i].iter().any(|(earlier, _)| earlier == key) {
                return Err(BenchError::InvalidConfig(format!(
                    "duplicate encoding key: {key}"
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn baseline() -> Self {
        Self {
            entries: vec![
                ("vcodec".to_string(), EncodingValue::from("libx264")),
                ("pix_fmt".to_string(), EncodingValue::from("yuv444p")),
                ("g".to_string(), EncodingValue::Int(2)),
                ("crf".to_string(), EncodingValue::Unset),
            ],
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn entries(&self) -> &[(String, EncodingValue)] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&EncodingValue> {
        self.entries
            .iter()
            .find(|(known, _)| known == key)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn with_override(&self, key: &str, value: EncodingValue) -> Result<Self> {
        let mut next = self.clone();
        let slot = next
            .entries
            .iter_mut()
            .find(|(known, _)| known == key)
            .ok_or_else(|| BenchError::InvalidConfig(format!("unknown encoding key: {key}")))?;
        slot.1 = value;
        Ok(next)
    }

    pub fn cache_key(&self) -> String {
        self.entries
            .iter()
            .map(|(_, value)| value.to_string().replace(['/', '\\'], "-"))
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl Display for EncodingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactManifest {
    cache_key: String,
    config: EncodingConfig,
    size_bytes: u64,
    xxh3: String,
}

fn checksum(bytes: &[u8]) -> String {
    format!("{:016x}", xxh3_64(bytes))
}

impl ArtifactManifest {
    fn describe(config: &EncodingConfig, artifact: &Path) -> Result<Self> {
        let bytes = fs::read(artifact).map_err(BenchError::read(artifact))?;
        Ok(Self {
            cache_key: config.cache_key(),
            config: config.clone(),
            size_bytes: bytes.len() as u64,
            xxh3: checksum(&bytes),
        })
    }

    // Size first, so a truncated artifact is rejected without hashing it.
    fn staleness(&self, artifact: &Path) -> Result<Option<String>> {
        let size = fs::metadata(artifact)
            .map_err(BenchError::read(artifact))?
            .len();
        if size != self.size_bytes {
            return Ok(Some(format!(
                "size {size} bytes, manifest has {}",
                self.size_bytes
            )));
        }
        let bytes = fs::read(artifact).map_err(BenchError::read(artifact))?;
        let found = checksum(&bytes);
        if found != self.xxh3 {
            return Ok(Some(format!("xxh3 {found}, manifest has {}", self.xxh3)));
        }
        Ok(None)
    }

    fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path).map_err(BenchError::read(path))?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn store(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(BenchError::write(path))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOutcome {
    pub path: PathBuf,
    pub encoded: bool,
}

#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            root: output_dir.join("videos"),
        }
    }

    pub fn artifact_path(&self, config: &EncodingConfig, dataset_id: &str) -> PathBuf {
        self.root
            .join(config.cache_key())
            .join(format!("{}.mp4", dataset_dir_name(dataset_id)))
    }

    pub fn manifest_path(artifact: &Path) -> PathBuf {
        let mut name = artifact.as_os_str().to_owned();
        name.push(".manifest.json");
        PathBuf::from(name)
    }

    pub fn ensure(
        &self,
        encoder: &dyn VideoEncoder,
        imgs_dir: &Path,
        config: &EncodingConfig,
        dataset_id: &str,
        fps: u32,
        overwrite: bool,
    ) -> Result<CacheOutcome> {
        let path = self.artifact_path(config, dataset_id);
        let manifest_path = Self::manifest_path(&path);

        if !overwrite && path.is_file() {
            match ArtifactManifest::load(&manifest_path)? {
                Some(manifest) if manifest.config != *config => {
                    return Err(BenchError::CacheCollision {
                        path,
                        expected: config.to_string(),
                        found: manifest.config.to_string(),
                    });
                }
                Some(manifest) => match manifest.staleness(&path)? {
                    None => {
                        debug!(path = %path.display(), "cache hit");
                        return Ok(CacheOutcome {
                            path,
                            encoded: false,
                        });
                    }
                    Some(reason) => {
                        warn!(
                            path = %path.display(),
                            %reason,
                            "stale cached artifact, re-encoding"
                        );
                    }
                },
                None => {
                    warn!(path = %path.display(), "cached artifact has no manifest, trusting it");
                    ArtifactManifest::describe(config, &path)?.store(&manifest_path)?;
                    return Ok(CacheOutcome {
                        path,
                        encoded: false,
                    });
                }
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(BenchError::write(parent))?;
        }
        debug!(path = %path.display(), config = %config, "encoding artifact");
        encoder.encode(imgs_dir, &path, fps, config, true)?;
        if !path.is_file() {
            return Err(BenchError::Encode(format!(
                "encoder reported success but {} was not written",
                path.display()
            )));
        }
        ArtifactManifest::describe(config, &path)?.store(&manifest_path)?;
        Ok(CacheOutcome {
            path,
            encoded: true,
        })
    }
}
