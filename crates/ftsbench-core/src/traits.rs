use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::batch::RejectPolicy;
use crate::config::{Config, Settings};
use crate::error::Result;
use crate::types::{Document, QueryResult};
use crate::wait::PollPolicy;

/// Cap on ids collected for one phrase when the backend allows it.
pub const LARGE_LIMIT: usize = 100_000;

/// Name of the index / collection / table every backend writes to.
pub const INDEX_NAME: &str = "movies";

/// Backend adapter driven by the ingest and query pipelines.
///
/// Calls are strictly sequential: the pipelines await each call before issuing
/// the next, and one instance never serves two pipelines at once. Batching and
/// pagination are the adapter's business.
#[async_trait]
pub trait Driver: Send {
    fn engine(&self) -> &str;

    /// Buffers one document, flushing when the batch is full.
    async fn ingest(&mut self, document: Document) -> Result<()>;

    /// Completion barrier: flush whatever is still buffered. Safe on an empty buffer.
    async fn ingest_wait(&mut self) -> Result<()> {
        Ok(())
    }

    /// All ids matching `phrase`, up to [`LARGE_LIMIT`] or the backend's window.
    async fn query(&mut self, phrase: &str) -> Result<QueryResult>;
}

/// Everything a factory needs to bring a driver up.
#[derive(Clone)]
pub struct DriverOptions {
    /// Full layered config; adapters read their own section from it.
    pub config: Config,
    pub reset: bool,
    pub batch_size: usize,
    pub reject_policy: RejectPolicy,
    pub poll: PollPolicy,
}

impl DriverOptions {
    pub fn from_settings(config: Config, settings: &Settings) -> Self {
        Self {
            config,
            reset: settings.reset_at_init,
            batch_size: settings.batch_size,
            reject_policy: settings.reject_policy,
            poll: settings.poll_policy(),
        }
    }
}

pub type BuildFuture = BoxFuture<'static, Result<Box<dyn Driver>>>;

/// `build` entry point of a backend: connect, ensure the index exists, and
/// optionally reset it.
pub type DriverFactory = fn(DriverOptions) -> BuildFuture;
