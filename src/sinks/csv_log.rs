use async_trait::async_trait;
use log::{debug, info};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

use super::Sink;
use crate::core::{DispatchBatch, CHANNEL_COUNT};
use crate::error::SinkError;

const SINK_NAME: &str = "log";
const FLUSH_EVERY_ROWS: u64 = 100;

/// Append-only CSV log, one row per sample.
///
/// Never overwrites: `{base}.csv` is used if free, otherwise the first free
/// `{base}_NNN.csv`. File IO goes through `tokio::fs`, so writes and flushes
/// run on the blocking pool instead of stalling the acquisition task.
pub struct CsvLogSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    rows: u64,
}

impl CsvLogSink {
    pub async fn create(directory: &Path, base_name: &str) -> Result<Self, SinkError> {
        let io = |source| SinkError::Io { sink: SINK_NAME, source };

        fs::create_dir_all(directory).await.map_err(io)?;
        let path = Self::next_free_path(directory, base_name).await;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(io)?;

        let mut writer = BufWriter::new(file);
        writer
            .write_all(format!("{}\n", Self::header()).as_bytes())
            .await
            .map_err(io)?;
        info!("logging to {}", path.display());

        Ok(Self {
            path,
            writer: Some(writer),
            rows: 0,
        })
    }

    /// First of `{base}.csv`, `{base}_001.csv`, ... that does not exist yet
    pub async fn next_free_path(directory: &Path, base_name: &str) -> PathBuf {
        let first = directory.join(format!("{}.csv", base_name));
        if !exists(&first).await {
            return first;
        }
        let mut index = 1u32;
        loop {
            let candidate = directory.join(format!("{}_{:03}.csv", base_name, index));
            if !exists(&candidate).await || index == u32::MAX {
                return candidate;
            }
            index += 1;
        }
    }

    pub fn header() -> String {
        let mut columns = vec!["timestamp_local".to_string(), "timestamp_esp32".to_string()];
        for ch in 0..CHANNEL_COUNT {
            columns.push(format!("ch{}_raw", ch));
            columns.push(format!("ch{}_voltage", ch));
        }
        columns.join(",")
    }

    /// Render one row. Absent channels are written as `0,0.0`.
    pub fn format_row(batch: &DispatchBatch) -> String {
        let mut fields = vec![
            batch.received_at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            batch.device_timestamp.unwrap_or(0.0).to_string(),
        ];
        for ch in 0..CHANNEL_COUNT {
            match batch.record(ch) {
                Some(record) => {
                    fields.push(record.raw.to_string());
                    fields.push(format!("{:?}", record.chosen_voltage));
                }
                None => {
                    fields.push("0".to_string());
                    fields.push("0.0".to_string());
                }
            }
        }
        fields.join(",")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }
}

// An unreadable path counts as taken; `create_new` still refuses to clobber it
async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(true)
}

#[async_trait]
impl Sink for CsvLogSink {
    fn name(&self) -> &'static str {
        SINK_NAME
    }

    async fn deliver(&mut self, batch: &DispatchBatch) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed(SINK_NAME))?;
        let io = |source| SinkError::Io { sink: SINK_NAME, source };

        let row = format!("{}\n", Self::format_row(batch));
        writer.write_all(row.as_bytes()).await.map_err(io)?;
        self.rows += 1;

        if self.rows % FLUSH_EVERY_ROWS == 0 {
            writer.flush().await.map_err(io)?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .shutdown()
                .await
                .map_err(|source| SinkError::Io { sink: SINK_NAME, source })?;
            debug!("closed {} after {} rows", self.path.display(), self.rows);
        }
        Ok(())
    }
}
