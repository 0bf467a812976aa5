//! Query pipeline: one phrase per line into `Driver::query`, timed.

use std::io::Write;
use std::time::{Duration, Instant};

use tokio::io::AsyncBufRead;

use ftsbench_core::timing::{QueryTiming, TimingFormat};
use ftsbench_core::types::parse_phrase_line;
use ftsbench_core::{Driver, Result};

use crate::lines::{Line, LineReader};

/// Where timing records go when timing is enabled.
pub struct TimingSink<'a> {
    pub format: TimingFormat,
    pub out: &'a mut (dyn Write + Send),
}

impl<'a> TimingSink<'a> {
    pub fn new(format: TimingFormat, out: &'a mut (dyn Write + Send)) -> Self {
        Self { format, out }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryReport {
    pub queried: usize,
    pub skipped: usize,
    /// Sum of ids returned over all phrases.
    pub total_ids: usize,
    pub elapsed: Duration,
    pub slowest: Option<Duration>,
    pub fastest: Option<Duration>,
    pub mean: Option<Duration>,
}

impl QueryReport {
    fn record(&mut self, latency: Duration, count: usize) {
        self.queried += 1;
        self.total_ids += count;
        self.slowest = Some(self.slowest.map_or(latency, |s| s.max(latency)));
        self.fastest = Some(self.fastest.map_or(latency, |f| f.min(latency)));
    }
}

/// Runs every phrase in `source` against `driver`, one at a time.
///
/// With a sink, each query writes exactly one timing record to it. Lines
/// that are not a phrase are logged and skipped; a failing query aborts.
pub async fn run<R>(driver: &mut dyn Driver, source: R, mut timing: Option<TimingSink<'_>>) -> Result<QueryReport>
where
    R: AsyncBufRead + Unpin,
{
    let started = Instant::now();
    let engine = driver.engine().to_string();
    let mut report = QueryReport::default();
    let mut spent = Duration::ZERO;
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
        let phrase = match parse_phrase_line(&line, line_no) {
            Ok(phrase) => phrase,
            Err(e) => {
                tracing::warn!(line = line_no, text = %line, error = %e, "skipping line that is not a phrase");
                report.skipped += 1;
                continue;
            }
        };

        let before = Instant::now();
        let result = driver.query(&phrase).await?;
        let latency = before.elapsed();

        spent += latency;
        report.record(latency, result.ids.len());
        if let Some(sink) = timing.as_mut() {
            let record = QueryTiming::new(phrase, result.ids.len(), latency);
            writeln!(sink.out, "{}", record.render(&engine, sink.format))?;
        }
        if report.queried % 1000 == 0 {
            tracing::debug!(engine = %engine, queried = report.queried, "query progress");
        }
    }

    if report.queried > 0 {
        report.mean = u32::try_from(report.queried).ok().map(|n| spent / n);
    }
    report.elapsed = started.elapsed();
    tracing::debug!(engine = %engine, queried = report.queried, skipped = report.skipped, "finished running search queries");
    Ok(report)
}
