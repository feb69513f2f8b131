use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use video_bench::ffmpeg::{self, FFMPEG_SEEK, FFMPEG_SELECT, FfmpegEncoder};
use video_bench::{
    CsvRowSink, EncodingAxis, EncodingConfig, EncodingValue, EpisodeSource, LocalImageDataset,
    SweepController, SweepPlan, SweepPolicy, SweepSettings, result_file_name,
};

#[derive(Debug, Parser)]
#[command(about = "Benchmark video encodings of image datasets for decode speed and reconstruction quality")]
struct Args {
    /// Root of the output tree: images/, videos/ and result CSV files.
    #[arg(long, default_value = "outputs/video_benchmark")]
    output_dir: PathBuf,

    /// Local image dataset directories, each holding an info.json.
    #[arg(long, num_args = 1.., required = true)]
    datasets: Vec<PathBuf>,

    /// Codec candidates; the codec stays at the baseline unless given.
    #[arg(long, num_args = 1..)]
    vcodec: Vec<EncodingValue>,

    #[arg(long, num_args = 1.., default_values = ["yuv444p", "yuv420p"])]
    pix_fmt: Vec<EncodingValue>,

    /// Keyframe interval candidates; `none` leaves the encoder default.
    #[arg(long, num_args = 1.., default_values = ["1", "2", "3", "4", "5", "6", "10", "15", "20", "40", "100", "none"])]
    g: Vec<EncodingValue>,

    #[arg(long, num_args = 1.., default_values = ["0", "5", "10", "15", "20", "25", "30", "40", "50", "none"])]
    crf: Vec<EncodingValue>,

    #[arg(long, num_args = 1.., default_values = ["1_frame", "2_frames", "2_frames_4_space", "6_frames"])]
    timestamps_modes: Vec<String>,

    #[arg(long, num_args = 1.., default_values = [FFMPEG_SEEK, FFMPEG_SELECT])]
    backends: Vec<String>,

    #[arg(long, default_value_t = 50)]
    num_samples: usize,

    #[arg(long, default_value_t = 10)]
    num_workers: usize,

    /// Dump decoded/original frame pairs of the first sample of every row.
    #[arg(long)]
    save_frames: bool,

    /// Re-encode even when a cached artifact exists.
    #[arg(long)]
    overwrite: bool,

    /// Sweep the Cartesian product of all axes instead of one axis at a time.
    #[arg(long)]
    full_grid: bool,

    #[arg(long, default_value_t = 1337)]
    seed: u64,

    #[arg(long, default_value_t = 1e-4)]
    tolerance_s: f64,
}

impl Args {
    fn plan(&self) -> video_bench::Result<SweepPlan> {
        let mut axes = Vec::new();
        if !self.vcodec.is_empty() {
            axes.push(EncodingAxis::new("vcodec", self.vcodec.clone()));
        }
        axes.extend([
            EncodingAxis::new("pix_fmt", self.pix_fmt.clone()),
            EncodingAxis::new("g", self.g.clone()),
            EncodingAxis::new("crf", self.crf.clone()),
        ]);
        let policy = if self.full_grid {
            SweepPolicy::FullGrid
        } else {
            SweepPolicy::OneAtATime
        };
        SweepPlan::new(
            EncodingConfig::baseline(),
            axes,
            policy,
            &self.timestamps_modes,
            self.backends.clone(),
        )
    }

    fn settings(&self) -> SweepSettings {
        SweepSettings {
            output_dir: self.output_dir.clone(),
            num_samples: self.num_samples,
            num_workers: self.num_workers,
            save_frames: self.save_frames,
            overwrite: self.overwrite,
            seed: self.seed,
            tolerance_s: self.tolerance_s,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("video_bench=info")),
        )
        .init();

    let args = Args::parse();
    let plan = args.plan().context("invalid sweep plan")?;
    let settings = args.settings();

    let datasets = args
        .datasets
        .iter()
        .map(|root| {
            LocalImageDataset::open(root)
                .with_context(|| format!("open dataset {}", root.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let sources: Vec<&dyn EpisodeSource> = datasets
        .iter()
        .map(|d| d as &dyn EpisodeSource)
        .collect();

    let encoder = FfmpegEncoder::new();
    let decoders = ffmpeg::default_registry();
    let controller = SweepController::new(plan, settings, &encoder, &decoders)
        .context("invalid sweep configuration")?;
    SweepController::check_sources(&sources).context("dataset precondition failed")?;

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("create output directory {}", args.output_dir.display()))?;
    let csv_path = args
        .output_dir
        .join(result_file_name(chrono::Local::now(), args.num_samples));
    let table = controller.new_table();
    let sink = CsvRowSink::create(&csv_path, &table.columns())
        .with_context(|| format!("create result file {}", csv_path.display()))?;
    let mut table = table.with_sink(sink);

    info!(
        datasets = sources.len(),
        rows_per_dataset = controller.plan().rows_per_dataset()?,
        csv = %csv_path.display(),
        "starting sweep"
    );
    controller
        .run(&sources, &mut table)
        .with_context(|| format!("sweep aborted, completed rows are in {}", csv_path.display()))?;

    let rows = table.finish();
    info!(rows = rows.len(), csv = %csv_path.display(), "sweep finished");
    Ok(())
}
