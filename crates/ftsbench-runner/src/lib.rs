//! ftsbench-runner
//!
//! The two pipelines, the orchestrator that sequences them for a run mode,
//! and the registry that maps engine names to driver factories.

pub mod ingest;
mod lines;
pub mod orchestrator;
pub mod query;
pub mod registry;

pub use ingest::IngestReport;
pub use orchestrator::{Mode, RunPlan, RunSummary};
pub use query::{QueryReport, TimingSink};
pub use registry::Registry;
