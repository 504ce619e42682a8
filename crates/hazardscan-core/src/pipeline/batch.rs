//! Batch driver: decode, analyze and aggregate every file in enumeration order.
//!
//! Images are processed concurrently through an order-preserving buffered
//! stream, so rows reach the sink in exactly the order the files were given,
//! regardless of which image finishes first.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{self, StreamExt};
use tokio::sync::watch;

use super::analyzer::{file_name_of, Analyzer};
use super::decode::ImageDecoder;
use crate::config::{Config, LimitsConfig};
use crate::report::build_row;
use crate::types::{DetectionRecord, ProcessingStats, ReportRow, Stage, StageFailure};

/// Drives the analyzer over a list of files.
pub struct BatchRunner {
    analyzer: Arc<Analyzer>,
    decoder: ImageDecoder,
    parallel: usize,
}

impl BatchRunner {
    pub fn new(analyzer: Arc<Analyzer>, config: &Config) -> Self {
        Self::with_limits(
            analyzer,
            config.limits.clone(),
            config.processing.parallel_workers,
        )
    }

    pub fn with_limits(analyzer: Arc<Analyzer>, limits: LimitsConfig, parallel: usize) -> Self {
        Self {
            analyzer,
            decoder: ImageDecoder::new(limits),
            parallel: parallel.max(1),
        }
    }

    /// Process `files` and hand each finished row to `on_row`, in input order.
    ///
    /// Every file yields exactly one row unless the run is cancelled: once
    /// `cancel` flips to `true`, in-flight images are dropped and no further
    /// rows are emitted. An error from `on_row` stops the run and is returned.
    pub async fn run<F>(
        &self,
        files: Vec<PathBuf>,
        mut cancel: watch::Receiver<bool>,
        mut on_row: F,
    ) -> crate::error::Result<ProcessingStats>
    where
        F: FnMut(&DetectionRecord, &ReportRow) -> crate::error::Result<()>,
    {
        let start = Instant::now();
        let total = files.len();
        let mut stats = ProcessingStats::default();

        tracing::info!(
            "Processing {} images with {} workers",
            total,
            self.parallel
        );

        let mut records = stream::iter(files)
            .map(|path| self.process_one(path))
            .buffered(self.parallel);

        loop {
            let record = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => {
                    stats.cancelled = total - stats.rows();
                    tracing::warn!(
                        "Cancelled after {} of {} images",
                        stats.rows(),
                        total
                    );
                    break;
                }
                next = records.next() => match next {
                    Some(record) => record,
                    None => break,
                },
            };

            let row = build_row(&record, self.analyzer.taxonomy());
            if record.is_complete() {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
            }
            on_row(&record, &row)?;
        }

        stats.total_seconds = start.elapsed().as_secs_f64();
        Ok(stats)
    }

    async fn process_one(&self, path: PathBuf) -> DetectionRecord {
        match self.decoder.decode(&path).await {
            Ok(decoded) => {
                tracing::trace!(
                    "Decoded {:?} ({}x{}, {} bytes)",
                    path,
                    decoded.width,
                    decoded.height,
                    decoded.file_size
                );
                self.analyzer.analyze(Arc::new(decoded.image), &path).await
            }
            Err(err) => {
                let file_name = file_name_of(&path);
                tracing::warn!("decode failed for {}: {}", file_name, err);
                DetectionRecord::failed(file_name, StageFailure::from_error(Stage::Decode, &err))
            }
        }
    }
}

/// Resolves when cancellation is requested. A dropped sender never cancels.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let closed = cancel.wait_for(|requested| *requested).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}
