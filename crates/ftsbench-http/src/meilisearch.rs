//! MeiliSearch adapter.
//!
//! Every write (index create/delete, document batch) is an asynchronous task
//! on the server side; the adapter polls `/tasks/{uid}` until the task reaches
//! a terminal state so that a returned flush means the batch is searchable.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

use ftsbench_core::batch::{Batch, FlushReport, RejectPolicy};
use ftsbench_core::traits::{BuildFuture, Driver, DriverOptions, INDEX_NAME, LARGE_LIMIT};
use ftsbench_core::wait::{poll_until, PollPolicy};
use ftsbench_core::{Document, DocumentId, Error, QueryResult, Result};

use crate::client::{require, send, Api};

pub const ENGINE: &str = "meilisearch";

/// `[meilisearch]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MeiliSettings {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub index: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Task {
    pub status: String,
    #[serde(default)]
    pub error: Option<TaskError>,
    #[serde(default)]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TaskError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl Task {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }

    fn failed_with(&self, code: &str) -> bool {
        self.status == "failed" && self.error.as_ref().is_some_and(|e| e.code == code)
    }

    fn failure(&self) -> String {
        match &self.error {
            Some(e) => format!("task {} ({}): {}", self.status, e.code, e.message),
            None => format!("task {}", self.status),
        }
    }

    /// Documents the task received but did not index.
    fn rejected_documents(&self) -> usize {
        let count = |key: &str| self.details.as_ref().and_then(|d| d.get(key)).and_then(Value::as_u64);
        match (count("receivedDocuments"), count("indexedDocuments")) {
            (Some(received), Some(indexed)) => received.saturating_sub(indexed) as usize,
            _ => 0,
        }
    }
}

pub struct MeiliDriver {
    api: Api,
    index: String,
    batch: Batch<Document>,
    reject_policy: RejectPolicy,
    poll: PollPolicy,
}

pub fn build(options: DriverOptions) -> BuildFuture {
    Box::pin(async move {
        let driver: Box<dyn Driver> = Box::new(MeiliDriver::connect(&options).await?);
        Ok(driver)
    })
}

impl MeiliDriver {
    pub async fn connect(options: &DriverOptions) -> Result<Self> {
        let settings: MeiliSettings = options.config.section(ENGINE)?;
        let url = require(settings.url, "MeiliSearch URL", "APP_MEILISEARCH__URL")?;
        let api_key = require(settings.api_key, "MeiliSearch API key", "APP_MEILISEARCH__API_KEY")?;

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| Error::Connection("MeiliSearch API key is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, bearer);

        let driver = Self {
            api: Api::new(&url, headers, false)?,
            index: settings.index.unwrap_or_else(|| INDEX_NAME.to_string()),
            batch: Batch::new(options.batch_size)?,
            reject_policy: options.reject_policy,
            poll: options.poll,
        };
        tracing::debug!(engine = ENGINE, url = driver.api.base(), index = %driver.index, "connecting");

        if options.reset {
            driver.delete_index().await?;
        }
        driver.create_index().await?;
        Ok(driver)
    }

    async fn delete_index(&self) -> Result<()> {
        let reply = send(self.api.request(Method::DELETE, &format!("/indexes/{}", self.index)), Error::Connection).await?;
        if reply.status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !reply.is_success() {
            return Err(reply.setup_error("index deletion"));
        }
        let uid = task_uid(&reply.json().map_err(|e| Error::Initialization(e.to_string()))?, Error::Initialization)?;
        let task = self.wait_task(uid, Error::Initialization).await.map_err(as_init_error)?;
        if task.status == "succeeded" || task.failed_with("index_not_found") {
            tracing::info!(engine = ENGINE, index = %self.index, "index reset");
            Ok(())
        } else {
            Err(Error::Initialization(format!("index deletion {}", task.failure())))
        }
    }

    async fn create_index(&self) -> Result<()> {
        let body = json!({ "uid": self.index, "primaryKey": "id" });
        let reply = send(self.api.request(Method::POST, "/indexes").json(&body), Error::Connection).await?;
        if !reply.is_success() {
            return Err(reply.setup_error("index creation"));
        }
        let uid = task_uid(&reply.json().map_err(|e| Error::Initialization(e.to_string()))?, Error::Initialization)?;
        let task = self.wait_task(uid, Error::Initialization).await.map_err(as_init_error)?;
        if task.status == "succeeded" {
            Ok(())
        } else if task.failed_with("index_already_exists") {
            tracing::debug!(engine = ENGINE, index = %self.index, "index already exists");
            Ok(())
        } else {
            Err(Error::Initialization(format!("index creation {}", task.failure())))
        }
    }

    async fn wait_task(&self, uid: u64, wrap: fn(String) -> Error) -> Result<Task> {
        let path = format!("/tasks/{}", uid);
        let (api, path) = (&self.api, path.as_str());
        poll_until(self.poll, move || async move {
            let task: Task = serde_json::from_value(send(api.request(Method::GET, path), wrap).await?.into_json(wrap)?)
                .map_err(|e| wrap(format!("malformed task: {}", e)))?;
            Ok(task.is_terminal().then_some(task))
        })
        .await
    }

    async fn send_batch(&mut self, docs: Vec<Document>) -> Result<FlushReport> {
        tracing::debug!(engine = ENGINE, documents = docs.len(), "sending batch");
        let submitted = docs.len();
        let req = self.api.request(Method::PUT, &format!("/indexes/{}/documents", self.index)).query(&[("primaryKey", "id")]).json(&docs);
        let accepted = send(req, Error::Ingest).await?.into_json(Error::Ingest)?;
        let task = self.wait_task(task_uid(&accepted, Error::Ingest)?, Error::Ingest).await?;
        if task.status != "succeeded" {
            return Err(Error::Ingest(format!("document batch {}", task.failure())));
        }
        FlushReport::new(submitted, task.rejected_documents()).settle(ENGINE, self.reject_policy)
    }
}

fn task_uid(accepted: &Value, wrap: fn(String) -> Error) -> Result<u64> {
    accepted
        .get("taskUid")
        .or_else(|| accepted.get("uid"))
        .and_then(Value::as_u64)
        .ok_or_else(|| wrap(format!("response carries no task uid: {}", accepted)))
}

fn as_init_error(e: Error) -> Error {
    match e {
        Error::FlushTimeout(after) => Error::Initialization(format!("index task not acknowledged within {:?}", after)),
        other => other,
    }
}

#[async_trait]
impl Driver for MeiliDriver {
    fn engine(&self) -> &str {
        ENGINE
    }

    async fn ingest(&mut self, document: Document) -> Result<()> {
        if let Some(full) = self.batch.push(document) {
            self.send_batch(full).await?;
        }
        Ok(())
    }

    async fn ingest_wait(&mut self) -> Result<()> {
        if let Some(rest) = self.batch.take() {
            self.send_batch(rest).await?;
        }
        Ok(())
    }

    async fn query(&mut self, phrase: &str) -> Result<QueryResult> {
        let body = json!({ "q": phrase, "limit": LARGE_LIMIT, "attributesToRetrieve": ["id"] });
        let req = self.api.request(Method::POST, &format!("/indexes/{}/search", self.index)).json(&body);
        let results = send(req, Error::Query).await?.into_json(Error::Query)?;
        let ids: Vec<DocumentId> = results
            .get("hits")
            .and_then(Value::as_array)
            .map(|hits| hits.iter().filter_map(|h| h.get("id").and_then(DocumentId::from_json)).collect())
            .unwrap_or_default();
        tracing::debug!(engine = ENGINE, phrase, count = ids.len(), "query returned");
        Ok(QueryResult { ids })
    }
}
