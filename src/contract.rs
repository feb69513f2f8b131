use std::path::Path;

use crate::encoding::EncodingConfig;
use crate::error::{BenchError, Result};
use crate::frame::Frame;
use crate::sampler::TimestampSet;

pub trait VideoEncoder: Send + Sync {
    fn encode(
        &self,
        raw_frames_dir: &Path,
        output_path: &Path,
        fps: u32,
        config: &EncodingConfig,
        overwrite: bool,
    ) -> Result<()>;
}

pub trait FrameDecoder: Send + Sync {
    fn decode(
        &self,
        artifact_path: &Path,
        timestamps: &TimestampSet,
        fps: u32,
        tolerance_s: f64,
    ) -> Result<Vec<Frame>>;
}

pub trait EpisodeSource {
    fn dataset_id(&self) -> &str;
    fn fps(&self) -> u32;
    fn is_video(&self) -> bool;
    fn episode_frame_count(&self) -> usize;
    fn materialize_first_episode(&self, dir: &Path) -> Result<()>;
}

#[derive(Default)]
pub struct DecoderRegistry {
    decoders: Vec<(String, Box<dyn FrameDecoder>)>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: impl Into<String>, decoder: Box<dyn FrameDecoder>) {
        let id = id.into();
        match self.decoders.iter_mut().find(|(known, _)| *known == id) {
            Some(slot) => slot.1 = decoder,
            None => self.decoders.push((id, decoder)),
        }
    }

    pub fn with(mut self, id: impl Into<String>, decoder: Box<dyn FrameDecoder>) -> Self {
        self.register(id, decoder);
        self
    }

    pub fn get(&self, id: &str) -> Result<&dyn FrameDecoder> {
        self.decoders
            .iter()
            .find(|(known, _)| known == id)
            .map(|(_, decoder)| decoder.as_ref())
            .ok_or_else(|| {
                BenchError::UnknownBackend(format!(
                    "{id} (available: [{}])",
                    self.ids().collect::<Vec<_>>().join(", ")
                ))
            })
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.decoders.iter().map(|(id, _)| id.as_str())
    }

    pub fn resolve_all(&self, ids: &[String]) -> Result<()> {
        ids.iter().try_for_each(|id| self.get(id).map(|_| ()))
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("ids", &self.ids().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Blank(usize);

    impl FrameDecoder for Blank {
        fn decode(
            &self,
            _artifact_path: &Path,
            timestamps: &TimestampSet,
            _fps: u32,
            _tolerance_s: f64,
        ) -> Result<Vec<Frame>> {
            (0..timestamps.len())
                .map(|_| Frame::new(3, self.0, self.0, vec![0.0; 3 * self.0 * self.0]))
                .collect()
        }
    }

    #[test]
    fn unknown_backend_lists_available_ids() {
        let registry = DecoderRegistry::new()
            .with("alpha", Box::new(Blank(1)))
            .with("beta", Box::new(Blank(1)));
        let err = registry
            .get("gamma")
            .err()
            .expect("gamma should not be registered");
        assert_eq!(
            err.to_string(),
            "unknown decode backend: gamma (available: [alpha, beta])"
        );
        assert!(registry.resolve_all(&["beta".to_string()]).is_ok());
        assert!(
            registry
                .resolve_all(&["alpha".to_string(), "gamma".to_string()])
                .is_err()
        );
    }

    #[test]
    fn register_replaces_same_id() {
        let mut registry = DecoderRegistry::new();
        registry.register("alpha", Box::new(Blank(1)));
        registry.register("alpha", Box::new(Blank(2)));
        assert_eq!(registry.ids().count(), 1);
        let frames = registry
            .get("alpha")
            .unwrap()
            .decode(
                Path::new("unused.mp4"),
                &TimestampSet::from_indices(&[0], 10),
                10,
                1e-4,
            )
            .unwrap();
        assert_eq!(frames[0].width, 2);
    }
}
