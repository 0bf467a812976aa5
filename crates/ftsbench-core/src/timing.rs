//! Per-query timing records written to the diagnostic stream.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimingFormat {
    /// `[timing] phrase ["..."]: returned [n] results in x.ms`
    #[default]
    Plain,
    /// One markdown table row per query: engine, phrase, count, ms, ms/result.
    MdTable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryTiming {
    pub phrase: String,
    pub count: usize,
    pub elapsed: Duration,
}

impl QueryTiming {
    pub fn new(phrase: impl Into<String>, count: usize, elapsed: Duration) -> Self {
        Self { phrase: phrase.into(), count, elapsed }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1_000.0
    }

    /// Average latency per returned id; `None` when nothing matched.
    pub fn ms_per_result(&self) -> Option<f64> {
        (self.count > 0).then(|| self.elapsed_ms() / self.count as f64)
    }

    pub fn render(&self, engine: &str, format: TimingFormat) -> String {
        match format {
            TimingFormat::Plain => format!(
                "[timing] phrase [\"{}\"]: returned [{}] results in {:.3}ms",
                self.phrase,
                self.count,
                self.elapsed_ms()
            ),
            TimingFormat::MdTable => format!(
                "| `{}` | \"{}\" | `{}` | `{:.3}` | `{}` |",
                engine,
                self.phrase.replace('|', "\\|"),
                self.count,
                self.elapsed_ms(),
                self.ms_per_result().map_or_else(|| "-".to_string(), |v| format!("{v:.3}")),
            ),
        }
    }
}
