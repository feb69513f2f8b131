use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::aggregate::aggregate;
use crate::contract::{DecoderRegistry, EpisodeSource, VideoEncoder};
use crate::dataset::dataset_dir_name;
use crate::encoding::{ArtifactCache, EncodingConfig, EncodingValue};
use crate::error::{BenchError, Result};
use crate::executor::SampleExecutor;
use crate::frame::frame_file_name;
use crate::sampler::{MIN_PIVOT_INDEX, TimestampMode};
use crate::table::{AggregateRow, ArtifactFacts, ResultTable};
use crate::task::DecodeBenchmarkTask;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SweepPolicy {
    #[default]
    OneAtATime,
    FullGrid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingAxis {
    pub key: String,
    pub values: Vec<EncodingValue>,
}

impl EncodingAxis {
    pub fn new(key: impl Into<String>, values: Vec<EncodingValue>) -> Self {
        Self {
            key: key.into(),
            values,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepPlan {
    pub baseline: EncodingConfig,
    pub axes: Vec<EncodingAxis>,
    pub policy: SweepPolicy,
    pub modes: Vec<TimestampMode>,
    pub backends: Vec<String>,
}

impl SweepPlan {
    pub fn new(
        baseline: EncodingConfig,
        axes: Vec<EncodingAxis>,
        policy: SweepPolicy,
        modes: &[String],
        backends: Vec<String>,
    ) -> Result<Self> {
        let modes = modes
            .iter()
            .map(|mode| mode.parse())
            .collect::<Result<Vec<TimestampMode>>>()?;
        if modes.is_empty() {
            return Err(BenchError::InvalidConfig(
                "at least one timestamps mode is required".to_string(),
            ));
        }
        if backends.is_empty() {
            return Err(BenchError::InvalidConfig(
                "at least one decode backend is required".to_string(),
            ));
        }
        for (i, axis) in axes.iter().enumerate() {
            if !baseline.contains_key(&axis.key) {
                return Err(BenchError::InvalidConfig(format!(
                    "unknown encoding key: {} (known: {})",
                    axis.key,
                    baseline.keys().collect::<Vec<_>>().join(", ")
                )));
            }
            if axes[..i].iter().any(|earlier| earlier.key == axis.key) {
                return Err(BenchError::InvalidConfig(format!(
                    "encoding key swept twice: {}",
                    axis.key
                )));
            }
        }
        Ok(Self {
            baseline,
            axes,
            policy,
            modes,
            backends,
        })
    }

    pub fn encoding_configs(&self) -> Result<Vec<EncodingConfig>> {
        match self.policy {
            SweepPolicy::OneAtATime => {
                let mut configs = Vec::new();
                for axis in &self.axes {
                    for value in &axis.values {
                        configs.push(self.baseline.with_override(&axis.key, value.clone())?);
                    }
                }
                Ok(configs)
            }
            SweepPolicy::FullGrid => {
                let mut configs = vec![self.baseline.clone()];
                for axis in &self.axes {
                    let mut next = Vec::with_capacity(configs.len() * axis.values.len());
                    for config in &configs {
                        for value in &axis.values {
                            next.push(config.with_override(&axis.key, value.clone())?);
                        }
                    }
                    configs = next;
                }
                Ok(configs)
            }
        }
    }

    pub fn rows_per_dataset(&self) -> Result<usize> {
        Ok(self.encoding_configs()?.len() * self.modes.len() * self.backends.len())
    }

    pub fn encoding_keys(&self) -> Vec<String> {
        self.baseline.keys().map(str::to_string).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepSettings {
    pub output_dir: PathBuf,
    pub num_samples: usize,
    pub num_workers: usize,
    pub save_frames: bool,
    pub overwrite: bool,
    pub seed: u64,
    pub tolerance_s: f64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs/video_benchmark"),
            num_samples: 50,
            num_workers: 10,
            save_frames: false,
            overwrite: false,
            seed: 1337,
            tolerance_s: 1e-4,
        }
    }
}

pub struct SweepController<'a> {
    plan: SweepPlan,
    settings: SweepSettings,
    encoder: &'a dyn VideoEncoder,
    decoders: &'a DecoderRegistry,
    executor: SampleExecutor,
    cache: ArtifactCache,
}

impl<'a> SweepController<'a> {
    pub fn new(
        plan: SweepPlan,
        settings: SweepSettings,
        encoder: &'a dyn VideoEncoder,
        decoders: &'a DecoderRegistry,
    ) -> Result<Self> {
        if settings.num_samples == 0 {
            return Err(BenchError::InvalidConfig(
                "num_samples must be at least 1".to_string(),
            ));
        }
        if !(settings.tolerance_s.is_finite() && settings.tolerance_s >= 0.0) {
            return Err(BenchError::InvalidConfig(format!(
                "tolerance must be a non-negative number of seconds, got {}",
                settings.tolerance_s
            )));
        }
        decoders.resolve_all(&plan.backends)?;
        plan.encoding_configs()?;
        let executor = SampleExecutor::new(settings.num_workers)?;
        let cache = ArtifactCache::new(&settings.output_dir);
        Ok(Self {
            plan,
            settings,
            encoder,
            decoders,
            executor,
            cache,
        })
    }

    pub fn plan(&self) -> &SweepPlan {
        &self.plan
    }

    pub fn new_table(&self) -> ResultTable {
        ResultTable::new(self.plan.encoding_keys())
    }

    pub fn check_sources(sources: &[&dyn EpisodeSource]) -> Result<()> {
        for source in sources {
            if source.is_video() {
                return Err(BenchError::VideoDataset(source.dataset_id().to_string()));
            }
            let frame_count = source.episode_frame_count();
            if frame_count <= MIN_PIVOT_INDEX {
                return Err(BenchError::EpisodeTooShort {
                    frame_count,
                    min: MIN_PIVOT_INDEX + 1,
                });
            }
        }
        Ok(())
    }

    pub fn images_dir(&self, dataset_id: &str) -> PathBuf {
        self.settings
            .output_dir
            .join("images")
            .join(dataset_dir_name(dataset_id))
    }

    pub fn run(&self, sources: &[&dyn EpisodeSource], table: &mut ResultTable) -> Result<()> {
        Self::check_sources(sources)?;
        let configs = self.plan.encoding_configs()?;
        let rows = configs.len() * self.plan.modes.len() * self.plan.backends.len();

        for source in sources {
            let dataset_id = source.dataset_id();
            let fps = source.fps();
            info!(dataset = dataset_id, fps, rows, "benchmarking dataset");
            let imgs_dir = self.images_dir(dataset_id);
            source.materialize_first_episode(&imgs_dir)?;

            for config in &configs {
                let outcome = self.cache.ensure(
                    self.encoder,
                    &imgs_dir,
                    config,
                    dataset_id,
                    fps,
                    self.settings.overwrite,
                )?;
                let facts = artifact_facts(&outcome.path, &imgs_dir)?;
                info!(
                    dataset = dataset_id,
                    config = %config,
                    encoded = outcome.encoded,
                    video_size_bytes = facts.video_size_bytes,
                    "artifact ready"
                );

                for &mode in &self.plan.modes {
                    for backend in &self.plan.backends {
                        let task = DecodeBenchmarkTask {
                            artifact_path: &outcome.path,
                            imgs_dir: &imgs_dir,
                            mode,
                            backend,
                            decoder: self.decoders.get(backend)?,
                            episode_frame_count: source.episode_frame_count(),
                            fps,
                            tolerance_s: self.settings.tolerance_s,
                            base_seed: self.settings.seed,
                            save_frames: self.settings.save_frames,
                        };
                        let results = self.executor.run(&task, self.settings.num_samples)?;
                        let metrics = aggregate(&results)?;
                        debug!(
                            mode = %mode,
                            backend = backend.as_str(),
                            frames = metrics.num_frames,
                            "aggregated samples"
                        );
                        table.push(AggregateRow {
                            dataset_id: dataset_id.to_string(),
                            encoding: config.clone(),
                            facts,
                            mode,
                            backend: backend.clone(),
                            metrics,
                        })?;
                        info!(
                            row = table.len(),
                            mode = %mode,
                            backend = backend.as_str(),
                            avg_psnr = metrics.avg_psnr,
                            avg_ssim = metrics.avg_ssim,
                            load_time_ratio = metrics.video_images_load_time_ratio,
                            "row complete"
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

pub fn artifact_facts(artifact: &Path, imgs_dir: &Path) -> Result<ArtifactFacts> {
    let video_size_bytes = fs::metadata(artifact)
        .map_err(BenchError::read(artifact))?
        .len();
    let images_size_bytes = directory_size(imgs_dir)?;
    let (width, height) = image::image_dimensions(imgs_dir.join(frame_file_name(0)))?;
    Ok(ArtifactFacts {
        width,
        height,
        video_size_bytes,
        images_size_bytes,
    })
}

pub fn directory_size(dir: &Path) -> Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|err| BenchError::read(dir)(err.into()))?;
        if entry.file_type().is_file() {
            let metadata = entry
                .metadata()
                .map_err(|err| BenchError::read(entry.path())(err.into()))?;
            total += metadata.len();
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn axes() -> Vec<EncodingAxis> {
        vec![
            EncodingAxis::new(
                "pix_fmt",
                vec![
                    EncodingValue::from("yuv444p"),
                    EncodingValue::from("yuv420p"),
                ],
            ),
            EncodingAxis::new(
                "g",
                vec![
                    EncodingValue::Int(1),
                    EncodingValue::Int(2),
                    EncodingValue::Unset,
                ],
            ),
        ]
    }

    fn all_modes() -> Vec<String> {
        TimestampMode::ALL.iter().map(|m| m.to_string()).collect()
    }

    #[rstest]
    #[case(SweepPolicy::OneAtATime, 5)]
    #[case(SweepPolicy::FullGrid, 6)]
    fn config_count_follows_policy(#[case] policy: SweepPolicy, #[case] configs: usize) {
        let plan = SweepPlan::new(
            EncodingConfig::baseline(),
            axes(),
            policy,
            &all_modes(),
            vec!["a".to_string(), "b".to_string()],
        )
        .unwrap();
        assert_eq!(plan.encoding_configs().unwrap().len(), configs);
        assert_eq!(plan.rows_per_dataset().unwrap(), configs * 4 * 2);
    }

    #[test]
    fn one_at_a_time_overrides_a_single_field() {
        let plan = SweepPlan::new(
            EncodingConfig::baseline(),
            axes(),
            SweepPolicy::OneAtATime,
            &["1_frame".to_string()],
            vec!["a".to_string()],
        )
        .unwrap();
        let baseline = EncodingConfig::baseline();
        for config in plan.encoding_configs().unwrap() {
            let changed = config
                .entries()
                .iter()
                .zip(baseline.entries())
                .filter(|(a, b)| a != b)
                .count();
            assert!(changed <= 1, "{config}");
        }
        let keys: Vec<String> = plan
            .encoding_configs()
            .unwrap()
            .iter()
            .map(EncodingConfig::cache_key)
            .collect();
        assert_eq!(keys[3], "libx264_yuv444p_2_None");
        assert_eq!(keys[4], "libx264_yuv444p_None_None");
    }

    #[test]
    fn plan_rejects_bad_modes_and_keys() {
        let err = SweepPlan::new(
            EncodingConfig::baseline(),
            Vec::new(),
            SweepPolicy::OneAtATime,
            &["4_frames".to_string()],
            vec!["a".to_string()],
        )
        .unwrap_err();
        assert!(matches!(err, BenchError::InvalidMode(_)));

        let err = SweepPlan::new(
            EncodingConfig::baseline(),
            vec![EncodingAxis::new("preset", vec![EncodingValue::from("fast")])],
            SweepPolicy::OneAtATime,
            &["1_frame".to_string()],
            vec!["a".to_string()],
        )
        .unwrap_err();
        assert!(matches!(err, BenchError::InvalidConfig(_)));
    }

    #[test]
    fn directory_size_walks_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), [0_u8; 10]).unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("b.bin"), [0_u8; 32]).unwrap();
        assert_eq!(directory_size(dir.path()).unwrap(), 42);
    }
}
