//! Ingestion pipeline: one JSON document per line into `Driver::ingest`.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::io::AsyncBufRead;

use ftsbench_core::{Document, Driver, Result};

use crate::lines::{Line, LineReader};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Documents handed to the driver.
    pub processed: usize,
    /// Lines that were not UTF-8 or did not parse as a document.
    pub skipped: usize,
    pub elapsed: Duration,
}

/// Feeds every parsable line of `source` to `driver`, then calls the
/// completion barrier exactly once.
///
/// Unparsable lines are logged and skipped. Blank lines are ignored. Any
/// driver error aborts the pipeline.
pub async fn run<R>(driver: &mut dyn Driver, source: R, progress: bool) -> Result<IngestReport>
where
    R: AsyncBufRead + Unpin,
{
    let started = Instant::now();
    let bar = spinner(progress);
    let mut report = IngestReport::default();
    let mut lines = LineReader::new(source);

    while let Some(line) = lines.next_line().await? {
        let line_no = lines.line_no();
        let Line::Text(line) = line else {
            tracing::warn!(line = line_no, "skipping line that is not valid UTF-8");
            report.skipped += 1;
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }
        match Document::parse_line(&line, line_no) {
            Ok(document) => {
                driver.ingest(document).await?;
                report.processed += 1;
                bar.inc(1);
            }
            Err(e) => {
                tracing::warn!(line = line_no, text = %line, error = %e, "skipping line that is not a document");
                report.skipped += 1;
            }
        }
    }

    bar.set_message("waiting for the last batch");
    driver.ingest_wait().await?;
    bar.finish_and_clear();

    report.elapsed = started.elapsed();
    tracing::debug!(engine = driver.engine(), processed = report.processed, skipped = report.skipped, "ingestion finished");
    Ok(report)
}

fn spinner(enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
    let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} documents {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}
