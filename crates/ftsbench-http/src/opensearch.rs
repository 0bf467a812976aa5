//! OpenSearch adapter. Bulk writes are synchronous (`refresh=wait_for`).

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use ftsbench_core::batch::{Batch, FlushReport, RejectPolicy};
use ftsbench_core::traits::{BuildFuture, Driver, DriverOptions, INDEX_NAME};
use ftsbench_core::{Document, DocumentId, Error, QueryResult, Result};

use crate::client::{require, send, Api};

pub const ENGINE: &str = "opensearch";

/// Default `index.max_result_window`; one page is all a plain search can return.
const RESULT_WINDOW: usize = 10_000;

const SEARCH_FIELDS: [&str; 3] = ["title", "original_title", "overview"];

/// `[opensearch]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenSearchSettings {
    pub protocol: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub accept_invalid_certs: bool,
    pub index: Option<String>,
    pub shards: u32,
    pub replicas: u32,
}

impl Default for OpenSearchSettings {
    fn default() -> Self {
        Self {
            protocol: "https".to_string(),
            host: None,
            port: None,
            username: None,
            password: None,
            accept_invalid_certs: false,
            index: None,
            shards: 1,
            replicas: 1,
        }
    }
}

pub struct OpenSearchDriver {
    api: Api,
    index: String,
    batch: Batch<Document>,
    reject_policy: RejectPolicy,
}

pub fn build(options: DriverOptions) -> BuildFuture {
    Box::pin(async move {
        let driver: Box<dyn Driver> = Box::new(OpenSearchDriver::connect(&options).await?);
        Ok(driver)
    })
}

impl OpenSearchDriver {
    pub async fn connect(options: &DriverOptions) -> Result<Self> {
        let settings: OpenSearchSettings = options.config.section(ENGINE)?;
        let host = require(settings.host, "OpenSearch host", "APP_OPENSEARCH__HOST")?;
        let port = settings
            .port
            .ok_or_else(|| Error::Connection("Missing/invalid OpenSearch port (did you specify APP_OPENSEARCH__PORT?)".into()))?;
        let username = require(settings.username, "OpenSearch auth username", "APP_OPENSEARCH__USERNAME")?;
        let password = require(settings.password, "OpenSearch auth password", "APP_OPENSEARCH__PASSWORD")?;

        let base = format!("{}://{}:{}", settings.protocol, host, port);
        let api = Api::new(&base, HeaderMap::new(), settings.accept_invalid_certs)?.with_basic_auth(username, password);
        tracing::debug!(engine = ENGINE, node = %base, "connecting");

        let driver = Self {
            api,
            index: settings.index.unwrap_or_else(|| INDEX_NAME.to_string()),
            batch: Batch::new(options.batch_size)?,
            reject_policy: options.reject_policy,
        };
        if options.reset {
            driver.delete_index().await?;
        }
        driver.create_index(settings.shards, settings.replicas).await?;
        Ok(driver)
    }

    async fn delete_index(&self) -> Result<()> {
        let reply = send(self.api.request(Method::DELETE, &format!("/{}", self.index)), Error::Connection).await?;
        if reply.is_success() || reply.status == StatusCode::NOT_FOUND {
            tracing::info!(engine = ENGINE, index = %self.index, "index reset");
            Ok(())
        } else {
            Err(reply.setup_error("index deletion"))
        }
    }

    async fn create_index(&self, shards: u32, replicas: u32) -> Result<()> {
        let text = json!({ "type": "text" });
        let body = json!({
            "settings": { "index": { "number_of_shards": shards, "number_of_replicas": replicas } },
            "mappings": { "properties": { "title": text, "original_title": text, "overview": text } },
        });
        let reply = send(self.api.request(Method::PUT, &format!("/{}", self.index)).json(&body), Error::Connection).await?;
        if reply.is_success() {
            return Ok(());
        }
        if reply.json().map(|v| already_exists(&v)).unwrap_or(false) {
            tracing::debug!(engine = ENGINE, index = %self.index, "skipping index creation, it already exists");
            return Ok(());
        }
        Err(reply.setup_error("index creation"))
    }

    async fn send_batch(&mut self, docs: Vec<Document>) -> Result<FlushReport> {
        tracing::debug!(engine = ENGINE, documents = docs.len(), "sending batch");
        let submitted = docs.len();
        let body = bulk_body(&self.index, &docs)?;
        let req = self
            .api
            .request(Method::POST, "/_bulk")
            .query(&[("refresh", "wait_for")])
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        let response = send(req, Error::Ingest).await?.into_json(Error::Ingest)?;
        FlushReport::new(submitted, count_bulk_failures(&response, submitted)).settle(ENGINE, self.reject_policy)
    }
}

fn already_exists(body: &Value) -> bool {
    let error = match body.get("error") {
        Some(e) => e,
        None => return false,
    };
    let is_exists = |v: &Value| v.get("type").and_then(Value::as_str) == Some("resource_already_exists_exception");
    is_exists(error) || error.get("root_cause").and_then(Value::as_array).is_some_and(|causes| causes.iter().any(is_exists))
}

/// Action line + source line per document.
fn bulk_body(index: &str, docs: &[Document]) -> Result<String> {
    let mut body = String::new();
    for doc in docs {
        let action = json!({ "index": { "_index": index, "_id": doc.id.to_string() } });
        let source = json!({ "title": doc.title, "original_title": doc.original_title, "overview": doc.overview });
        for line in [action, source] {
            body.push_str(&serde_json::to_string(&line).map_err(|e| Error::Ingest(e.to_string()))?);
            body.push('\n');
        }
    }
    Ok(body)
}

/// Items that carry an error or a non-2xx status, plus any the response omits.
fn count_bulk_failures(response: &Value, submitted: usize) -> usize {
    let items = match response.get("items").and_then(Value::as_array) {
        Some(items) => items,
        None => return submitted,
    };
    let failed = items
        .iter()
        .filter_map(|item| item.as_object().and_then(|o| o.values().next()))
        .filter(|result| {
            result.get("error").is_some() || result.get("status").and_then(Value::as_u64).is_some_and(|s| !(200..300).contains(&s))
        })
        .count();
    failed + submitted.saturating_sub(items.len())
}

#[async_trait]
impl Driver for OpenSearchDriver {
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
        let body = json!({
            "size": RESULT_WINDOW,
            "_source": false,
            "query": { "multi_match": { "query": phrase, "fields": SEARCH_FIELDS } },
        });
        let req = self.api.request(Method::POST, &format!("/{}/_search", self.index)).json(&body);
        let resp = send(req, Error::Query).await?.into_json(Error::Query)?;
        let ids: Vec<DocumentId> = resp
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .map(|hits| hits.iter().filter_map(|h| h.get("_id").and_then(Value::as_str)).map(DocumentId::from_backend).collect())
            .unwrap_or_default();
        tracing::debug!(engine = ENGINE, phrase, count = ids.len(), "query returned");
        Ok(QueryResult { ids })
    }
}
