use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::aggregate::AggregateMetrics;
use crate::encoding::EncodingConfig;
use crate::error::{BenchError, Result};
use crate::sampler::TimestampMode;

const LEADING_COLUMNS: [&str; 3] = ["repo_id", "resolution", "num_pixels"];
const TRAILING_COLUMNS: [&str; 11] = [
    "video_size_bytes",
    "images_size_bytes",
    "video_images_size_ratio",
    "timestamps_mode",
    "backend",
    "avg_load_time_video_ms",
    "avg_load_time_images_ms",
    "video_images_load_time_ratio",
    "avg_mse",
    "avg_psnr",
    "avg_ssim",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactFacts {
    pub width: u32,
    pub height: u32,
    pub video_size_bytes: u64,
    pub images_size_bytes: u64,
}

impl ArtifactFacts {
    pub fn num_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn size_ratio(&self) -> f64 {
        self.video_size_bytes as f64 / self.images_size_bytes as f64
    }

    pub fn resolution(&self) -> String {
        format!("{} x {}", self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub dataset_id: String,
    pub encoding: EncodingConfig,
    pub facts: ArtifactFacts,
    pub mode: TimestampMode,
    pub backend: String,
    pub metrics: AggregateMetrics,
}

impl AggregateRow {
    pub fn record(&self, encoding_keys: &[String]) -> Vec<String> {
        let mut record = vec![
            self.dataset_id.clone(),
            self.facts.resolution(),
            self.facts.num_pixels().to_string(),
        ];
        record.extend(encoding_keys.iter().map(|key| {
            self.encoding
                .get(key)
                .map(|value| value.csv_field())
                .unwrap_or_default()
        }));
        let m = &self.metrics;
        record.extend([
            self.facts.video_size_bytes.to_string(),
            self.facts.images_size_bytes.to_string(),
            self.facts.size_ratio().to_string(),
            self.mode.to_string(),
            self.backend.clone(),
            m.avg_load_time_video_ms.to_string(),
            m.avg_load_time_images_ms.to_string(),
            m.video_images_load_time_ratio.to_string(),
            m.avg_mse.to_string(),
            m.avg_psnr.to_string(),
            m.avg_ssim.to_string(),
        ]);
        record
    }
}

pub struct CsvRowSink {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvRowSink {
    pub fn create(path: &Path, columns: &[String]) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(BenchError::write(parent))?;
        }
        let file = File::create(path).map_err(BenchError::write(path))?;
        let mut sink = Self {
            path: path.to_path_buf(),
            writer: csv::Writer::from_writer(file),
        };
        sink.append(columns)?;
        Ok(sink)
    }

    pub fn append(&mut self, record: &[String]) -> Result<()> {
        self.writer.write_record(record)?;
        self.writer.flush().map_err(BenchError::write(&self.path))
    }

}

impl std::fmt::Debug for CsvRowSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvRowSink")
            .field("path", &self.path)
            .finish()
    }
}

#[derive(Debug)]
pub struct ResultTable {
    encoding_keys: Vec<String>,
    rows: Vec<AggregateRow>,
    sink: Option<CsvRowSink>,
}

impl ResultTable {
    pub fn new(encoding_keys: Vec<String>) -> Self {
        Self {
            encoding_keys,
            rows: Vec::new(),
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: CsvRowSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn columns(&self) -> Vec<String> {
        LEADING_COLUMNS
            .iter()
            .map(|c| (*c).to_string())
            .chain(self.encoding_keys.iter().cloned())
            .chain(TRAILING_COLUMNS.iter().map(|c| (*c).to_string()))
            .collect()
    }

    pub fn push(&mut self, row: AggregateRow) -> Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            sink.append(&row.record(&self.encoding_keys))?;
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn rows(&self) -> &[AggregateRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn finish(self) -> Vec<AggregateRow> {
        self.rows
    }
}

pub fn result_file_name(started: DateTime<Local>, num_samples: usize) -> String {
    format!(
        "{}_{num_samples}-samples.csv",
        started.format("%Y-%m-%d_%H-%M-%S")
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::encoding::EncodingValue;

    fn row(psnr: f64) -> AggregateRow {
        AggregateRow {
            dataset_id: "lerobot/pusht".to_string(),
            encoding: EncodingConfig::baseline(),
            facts: ArtifactFacts {
                width: 96,
                height: 64,
                video_size_bytes: 500,
                images_size_bytes: 2000,
            },
            mode: TimestampMode::TwoFrames,
            backend: "ffmpeg-seek".to_string(),
            metrics: AggregateMetrics {
                avg_load_time_video_ms: 4.0,
                avg_load_time_images_ms: 2.0,
                video_images_load_time_ratio: 2.0,
                avg_mse: 0.5,
                avg_psnr: psnr,
                avg_ssim: 1.0,
                num_samples: 3,
                num_frames: 6,
            },
        }
    }

    fn keys() -> Vec<String> {
        EncodingConfig::baseline()
            .keys()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn columns_follow_fixed_schema() {
        let table = ResultTable::new(keys());
        let columns = table.columns();
        assert_eq!(columns.len(), 18);
        assert_eq!(
            &columns[..7],
            [
                "repo_id",
                "resolution",
                "num_pixels",
                "vcodec",
                "pix_fmt",
                "g",
                "crf"
            ]
        );
        assert_eq!(columns[17], "avg_ssim");
    }

    #[test]
    fn record_renders_facts_and_unset_values() {
        let record = row(f64::INFINITY).record(&keys());
        assert_eq!(record[0], "lerobot/pusht");
        assert_eq!(record[1], "96 x 64");
        assert_eq!(record[2], "6144");
        assert_eq!(record[5], "2");
        assert_eq!(record[6], "");
        assert_eq!(record[9], "0.25");
        assert_eq!(record[10], "2_frames");
        assert_eq!(record[16], "inf");
    }

    #[test]
    fn sink_flushes_each_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("results.csv");
        let table = ResultTable::new(keys());
        let sink = CsvRowSink::create(&path, &table.columns()).unwrap();
        let mut table = table.with_sink(sink);

        table.push(row(30.0)).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().next().unwrap().starts_with("repo_id,resolution"));

        let mut crf = row(31.0);
        crf.encoding = crf
            .encoding
            .with_override("crf", EncodingValue::Int(20))
            .unwrap();
        table.push(crf).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().nth(2).unwrap().contains(",20,"));
        assert_eq!(table.finish().len(), 2);
    }

    #[test]
    fn file_name_carries_start_time_and_samples() {
        let started = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            result_file_name(started, 50),
            "2024-03-09_07-05-01_50-samples.csv"
        );
    }
}
