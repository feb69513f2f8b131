mod aggregate;
mod contract;
mod dataset;
mod encoding;
mod error;
mod executor;
pub mod ffmpeg;
mod frame;
mod metrics;
mod queue;
mod sampler;
mod sweep;
mod table;
mod task;

pub use aggregate::{AggregateMetrics, aggregate};
pub use contract::{DecoderRegistry, EpisodeSource, FrameDecoder, VideoEncoder};
pub use dataset::{DatasetInfo, LocalImageDataset, count_frames, dataset_dir_name};
pub use encoding::{ArtifactCache, CacheOutcome, EncodingConfig, EncodingValue};
pub use error::{BenchError, ErrorKind, Result};
pub use executor::SampleExecutor;
pub use frame::{
    Frame, frame_file_name, frame_index, load_frame, load_original_frames, save_frame,
};
pub use metrics::{
    QualityTriple, SSIM_WINDOW, evaluate, mean_squared_error, peak_signal_noise_ratio,
    structural_similarity,
};
pub use queue::{
    BoundedQueueRx, BoundedQueueTx, QueueRecvError, QueueSendError, QueueStats, bounded_queue,
};
pub use sampler::{MIN_PIVOT_INDEX, TimestampMode, TimestampSet, sample, timestamps_for_pivot};
pub use sweep::{
    EncodingAxis, SweepController, SweepPlan, SweepPolicy, SweepSettings, artifact_facts,
    directory_size,
};
pub use table::{AggregateRow, ArtifactFacts, CsvRowSink, ResultTable, result_file_name};
pub use task::{DecodeBenchmarkTask, SampleResult, SampleTask, save_diagnostic_frames};
