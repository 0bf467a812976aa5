//! Typesense adapter.
//!
//! Imports are upserts; each JSONL response line reports one document.
//! Searches page through results 250 at a time.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use ftsbench_core::batch::{Batch, FlushReport, RejectPolicy};
use ftsbench_core::traits::{BuildFuture, Driver, DriverOptions, INDEX_NAME, LARGE_LIMIT};
use ftsbench_core::{Document, DocumentId, Error, QueryResult, Result};

use crate::client::{require, send, Api};

pub const ENGINE: &str = "typesense";

/// Largest page Typesense serves.
const PER_PAGE: usize = 250;

const QUERY_BY: &str = "title,original_title,overview";

/// `[typesense]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TypesenseSettings {
    pub protocol: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub api_key: Option<String>,
    pub collection: Option<String>,
}

impl Default for TypesenseSettings {
    fn default() -> Self {
        Self { protocol: "http".to_string(), host: None, port: None, api_key: None, collection: None }
    }
}

/// Typesense ids are strings; absent fields stay absent.
#[derive(Debug, Serialize)]
struct ImportRecord<'a> {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    overview: Option<&'a str>,
}

impl<'a> From<&'a Document> for ImportRecord<'a> {
    fn from(doc: &'a Document) -> Self {
        Self {
            id: doc.id.to_string(),
            title: doc.title.as_deref(),
            original_title: doc.original_title.as_deref(),
            overview: doc.overview.as_deref(),
        }
    }
}

pub struct TypesenseDriver {
    api: Api,
    collection: String,
    batch: Batch<Document>,
    reject_policy: RejectPolicy,
}

pub fn build(options: DriverOptions) -> BuildFuture {
    Box::pin(async move {
        let driver: Box<dyn Driver> = Box::new(TypesenseDriver::connect(&options).await?);
        Ok(driver)
    })
}

impl TypesenseDriver {
    pub async fn connect(options: &DriverOptions) -> Result<Self> {
        let settings: TypesenseSettings = options.config.section(ENGINE)?;
        let host = require(settings.host, "Typesense host", "APP_TYPESENSE__HOST")?;
        let port = settings
            .port
            .ok_or_else(|| Error::Connection("Missing/invalid Typesense port (did you specify APP_TYPESENSE__PORT?)".into()))?;
        let api_key = require(settings.api_key, "Typesense API key", "APP_TYPESENSE__API_KEY")?;

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&api_key)
            .map_err(|_| Error::Connection("Typesense API key is not a valid header value".into()))?;
        headers.insert("x-typesense-api-key", key);

        let base = format!("{}://{}:{}", settings.protocol, host, port);
        let driver = Self {
            api: Api::new(&base, headers, false)?,
            collection: settings.collection.unwrap_or_else(|| INDEX_NAME.to_string()),
            batch: Batch::new(options.batch_size)?,
            reject_policy: options.reject_policy,
        };
        tracing::debug!(engine = ENGINE, node = %base, collection = %driver.collection, "connecting");

        if options.reset {
            driver.delete_collection().await?;
        }
        driver.create_collection().await?;
        Ok(driver)
    }

    async fn delete_collection(&self) -> Result<()> {
        let reply = send(self.api.request(Method::DELETE, &format!("/collections/{}", self.collection)), Error::Connection).await?;
        if reply.is_success() || reply.status == StatusCode::NOT_FOUND {
            tracing::info!(engine = ENGINE, collection = %self.collection, "collection reset");
            Ok(())
        } else {
            Err(reply.setup_error("collection deletion"))
        }
    }

    async fn create_collection(&self) -> Result<()> {
        let field = |name: &str| json!({ "name": name, "type": "string", "facet": false, "optional": true });
        let schema = json!({
            "name": self.collection,
            "fields": [field("title"), field("original_title"), field("overview")],
        });
        let reply = send(self.api.request(Method::POST, "/collections").json(&schema), Error::Connection).await?;
        if reply.is_success() {
            Ok(())
        } else if reply.status == StatusCode::CONFLICT {
            tracing::debug!(engine = ENGINE, collection = %self.collection, "collection already exists");
            Ok(())
        } else {
            Err(reply.setup_error("collection creation"))
        }
    }

    async fn send_batch(&mut self, docs: Vec<Document>) -> Result<FlushReport> {
        tracing::debug!(engine = ENGINE, documents = docs.len(), "sending batch");
        let submitted = docs.len();
        let body = import_body(&docs)?;
        let req = self
            .api
            .request(Method::POST, &format!("/collections/{}/documents/import", self.collection))
            .query(&[("action", "upsert")])
            .header(CONTENT_TYPE, "text/plain")
            .body(body);
        let reply = send(req, Error::Ingest).await?;
        if !reply.is_success() {
            return Err(Error::Ingest(reply.describe()));
        }
        FlushReport::new(submitted, count_import_failures(&reply.text, submitted)).settle(ENGINE, self.reject_policy)
    }

    async fn search_page(&self, phrase: &str, page: usize) -> Result<Value> {
        let query = [
            ("q", phrase.to_string()),
            ("query_by", QUERY_BY.to_string()),
            ("per_page", PER_PAGE.to_string()),
            ("page", page.to_string()),
            ("include_fields", "id".to_string()),
        ];
        let req = self.api.request(Method::GET, &format!("/collections/{}/documents/search", self.collection)).query(&query);
        send(req, Error::Query).await?.into_json(Error::Query)
    }
}

fn import_body(docs: &[Document]) -> Result<String> {
    let mut body = String::new();
    for doc in docs {
        body.push_str(&serde_json::to_string(&ImportRecord::from(doc)).map_err(|e| Error::Ingest(e.to_string()))?);
        body.push('\n');
    }
    Ok(body)
}

/// Lines without `"success": true`, plus any the response omits.
fn count_import_failures(text: &str, submitted: usize) -> usize {
    let mut seen = 0;
    let mut failed = 0;
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        seen += 1;
        let ok = serde_json::from_str::<Value>(line).ok().and_then(|v| v.get("success").and_then(Value::as_bool)).unwrap_or(false);
        if !ok {
            tracing::trace!(engine = ENGINE, line, "document rejected");
            failed += 1;
        }
    }
    failed + submitted.saturating_sub(seen)
}

/// Number of hits on the page, and the ids that could be read from them.
fn page_ids(page: &Value) -> (usize, Vec<DocumentId>) {
    let hits = page.get("hits").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();
    let ids: Vec<DocumentId> = hits.iter().filter_map(|h| h.pointer("/document/id").and_then(DocumentId::from_json)).collect();
    if ids.len() < hits.len() {
        tracing::warn!(engine = ENGINE, dropped = hits.len() - ids.len(), "hits without a readable id");
    }
    (hits.len(), ids)
}

#[async_trait]
impl Driver for TypesenseDriver {
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
        let mut ids = Vec::new();
        let mut seen = 0;
        let mut page = 1;
        loop {
            let resp = self.search_page(phrase, page).await?;
            let (hits, readable) = page_ids(&resp);
            seen += hits;
            ids.extend(readable);
            let found = resp.get("found").and_then(Value::as_u64).map(|f| f as usize);
            if hits < PER_PAGE || found.is_some_and(|f| seen >= f) || seen >= LARGE_LIMIT {
                break;
            }
            page += 1;
        }
        ids.truncate(LARGE_LIMIT);
        tracing::debug!(engine = ENGINE, phrase, count = ids.len(), pages = page, "query returned");
        Ok(QueryResult { ids })
    }
}
