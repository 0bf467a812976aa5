//! Run modes and their sequencing.
//!
//! A run is: read [`Settings`], turn them into a [`RunPlan`], validate the
//! plan (before any backend is contacted), build the driver through the
//! [`Registry`], then execute the pipelines the mode asks for.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokio::io::BufReader;

use ftsbench_core::config::{expand_path, Config, Settings};
use ftsbench_core::timing::TimingFormat;
use ftsbench_core::{Driver, DriverOptions, Error, Result};

use crate::ingest::{self, IngestReport};
use crate::query::{self, QueryReport, TimingSink};
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Ingest,
    Query,
    IngestQuery,
}

impl Mode {
    pub fn ingests(self) -> bool {
        matches!(self, Mode::Ingest | Mode::IngestQuery)
    }

    pub fn queries(self) -> bool {
        matches!(self, Mode::Query | Mode::IngestQuery)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Ingest => "ingest",
            Mode::Query => "query",
            Mode::IngestQuery => "ingest+query",
        }
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "ingest" => Ok(Mode::Ingest),
            "query" => Ok(Mode::Query),
            "ingest+query" => Ok(Mode::IngestQuery),
            other => Err(Error::Configuration(format!("Invalid operation [{}] (did you specify APP_OP?)", other))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one invocation will do, resolved from settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub engine: String,
    pub mode: Mode,
    pub ingest_input: Option<PathBuf>,
    pub query_input: Option<PathBuf>,
    /// `None` when timing is off.
    pub timing: Option<TimingFormat>,
    pub progress: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub engine: String,
    pub mode: Mode,
    pub ingest: Option<IngestReport>,
    pub query: Option<QueryReport>,
    pub timing: bool,
}

impl RunSummary {
    pub fn log(&self) {
        if let Some(r) = &self.ingest {
            tracing::info!(
                engine = %self.engine,
                processed = r.processed,
                skipped = r.skipped,
                elapsed_ms = r.elapsed.as_millis() as u64,
                "successfully processed lines"
            );
        }
        if let Some(r) = &self.query {
            tracing::info!(
                engine = %self.engine,
                queried = r.queried,
                skipped = r.skipped,
                total_ids = r.total_ids,
                mean_ms = r.mean.map(|d| d.as_secs_f64() * 1_000.0),
                slowest_ms = r.slowest.map(|d| d.as_secs_f64() * 1_000.0),
                fastest_ms = r.fastest.map(|d| d.as_secs_f64() * 1_000.0),
                "finished running search queries"
            );
            if !self.timing {
                tracing::info!("set APP_TIMING=true to see timing data for each query");
            }
        }
    }
}

impl RunPlan {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let engine = settings
            .engine
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| Error::Configuration("Invalid/missing FTS engine (did you specify APP_ENGINE?)".into()))?;
        let mode: Mode = settings
            .op
            .as_deref()
            .ok_or_else(|| Error::Configuration("Invalid/missing operation (did you specify APP_OP?)".into()))?
            .parse()?;
        Ok(Self {
            engine: engine.to_string(),
            mode,
            ingest_input: settings.ingest_input_path.as_deref().map(expand_path),
            query_input: settings.query_input_path.as_deref().map(expand_path),
            timing: settings.timing.then_some(settings.timing_format),
            progress: settings.progress,
        })
    }

    /// Every source the mode needs must exist and be readable.
    pub fn validate(&self) -> Result<()> {
        if self.mode.ingests() {
            check_source(self.ingest_input.as_deref(), "INGEST_INPUT_PATH", "ndjson file of documents")?;
        }
        if self.mode.queries() {
            check_source(self.query_input.as_deref(), "QUERY_INPUT_PATH", "ndjson file of search phrases")?;
        }
        Ok(())
    }

    /// Runs the pipelines for this mode against `driver`. Timing records go to `diagnostics`.
    pub async fn execute(&self, driver: &mut dyn Driver, diagnostics: &mut (dyn Write + Send)) -> Result<RunSummary> {
        let mut summary = RunSummary {
            engine: self.engine.clone(),
            mode: self.mode,
            ingest: None,
            query: None,
            timing: self.timing.is_some(),
        };

        if let Some(path) = self.ingest_input.as_deref().filter(|_| self.mode.ingests()) {
            tracing::info!(path = %path.display(), "ingesting lines");
            let source = BufReader::new(tokio::fs::File::open(path).await?);
            summary.ingest = Some(ingest::run(driver, source, self.progress).await?);
        }

        if let Some(path) = self.query_input.as_deref().filter(|_| self.mode.queries()) {
            tracing::info!(path = %path.display(), "running search phrases");
            let source = BufReader::new(tokio::fs::File::open(path).await?);
            let sink = match self.timing {
                Some(format) => Some(TimingSink::new(format, &mut *diagnostics)),
                None => None,
            };
            summary.query = Some(query::run(driver, source, sink).await?);
        }

        Ok(summary)
    }
}

fn check_source(path: Option<&Path>, key: &str, what: &str) -> Result<()> {
    let invalid = |shown: String| {
        Error::Configuration(format!("Invalid/missing input path [{}] (did you specify a valid {} for APP_{}?)", shown, what, key))
    };
    let path = path.ok_or_else(|| invalid(String::new()))?;
    match std::fs::File::open(path) {
        Ok(file) if file.metadata().map(|m| m.is_file()).unwrap_or(false) => Ok(()),
        _ => Err(invalid(path.display().to_string())),
    }
}

/// Full run from layered configuration: validate, build, execute.
pub async fn run(config: &Config, registry: &Registry, diagnostics: &mut (dyn Write + Send)) -> Result<RunSummary> {
    let settings = config.settings()?;
    let plan = RunPlan::from_settings(&settings)?;
    plan.validate()?;
    let options = DriverOptions::from_settings(config.clone(), &settings);
    let mut driver = registry.build(&plan.engine, options).await?;
    plan.execute(driver.as_mut(), diagnostics).await
}
