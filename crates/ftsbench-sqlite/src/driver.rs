use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OpenFlags};
use serde::Deserialize;

use ftsbench_core::batch::{Batch, FlushReport, RejectPolicy};
use ftsbench_core::config::expand_path;
use ftsbench_core::traits::{BuildFuture, Driver, DriverOptions, LARGE_LIMIT};
use ftsbench_core::{Document, DocumentId, Error, QueryResult, Result};

pub const ENGINE: &str = "sqlite";

const CREATE_TABLE: &str = "CREATE VIRTUAL TABLE IF NOT EXISTS movies_fts USING fts5(title, original_title, overview)";
const CLEAR_TABLE: &str = "DELETE FROM movies_fts";
const INSERT: &str = "INSERT INTO movies_fts (rowid, title, original_title, overview) VALUES (?1, ?2, ?3, ?4)";
const SEARCH: &str = "SELECT rowid FROM movies_fts WHERE movies_fts MATCH ?1 LIMIT ?2";

/// `[sqlite]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SqliteSettings {
    pub db_path: Option<String>,
    /// Refuse to create the database file when it is missing.
    pub must_exist: bool,
    /// Keep the database in RAM; `db_path` is then ignored.
    pub in_memory: bool,
}

pub struct SqliteDriver {
    conn: Arc<Mutex<Connection>>,
    batch: Batch<Document>,
    reject_policy: RejectPolicy,
}

/// Registry entry point.
pub fn build(options: DriverOptions) -> BuildFuture {
    Box::pin(async move {
        let driver: Box<dyn Driver> = Box::new(SqliteDriver::open(&options)?);
        Ok(driver)
    })
}

impl SqliteDriver {
    pub fn open(options: &DriverOptions) -> Result<Self> {
        let settings: SqliteSettings = options.config.section(ENGINE)?;
        let conn = if settings.in_memory {
            Connection::open_in_memory().map_err(|e| Error::Connection(format!("cannot open in-memory sqlite: {}", e)))?
        } else {
            let db_path = settings.db_path.as_deref().map(expand_path).ok_or_else(|| {
                Error::Connection("Missing SQLite DB path (did you specify APP_SQLITE__DB_PATH?)".into())
            })?;
            open_file(&db_path, settings.must_exist)?
        };

        // Creating an existing table is a no-op.
        conn.execute(CREATE_TABLE, []).map_err(|e| Error::Initialization(format!("cannot create movies_fts: {}", e)))?;
        if options.reset {
            let cleared = conn.execute(CLEAR_TABLE, []).map_err(|e| Error::Initialization(format!("cannot clear movies_fts: {}", e)))?;
            tracing::info!(engine = ENGINE, rows = cleared, "reset movies_fts");
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            batch: Batch::new(options.batch_size)?,
            reject_policy: options.reject_policy,
        })
    }

    async fn send_batch(&mut self, docs: Vec<Document>) -> Result<FlushReport> {
        tracing::debug!(engine = ENGINE, documents = docs.len(), "sending batch");
        let submitted = docs.len();
        let conn = self.conn.clone();
        let failed = tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| Error::Ingest("sqlite connection lock poisoned".into()))?;
            write_rows(&mut conn, &docs)
        })
        .await
        .map_err(|e| Error::Ingest(format!("sqlite writer task failed: {}", e)))??;
        FlushReport::new(submitted, failed).settle(ENGINE, self.reject_policy)
    }
}

fn open_file(db_path: &Path, must_exist: bool) -> Result<Connection> {
    let mut flags = OpenFlags::default();
    if must_exist {
        flags.remove(OpenFlags::SQLITE_OPEN_CREATE);
    } else if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::Connection(format!("cannot create {}: {}", parent.display(), e)))?;
    }
    tracing::info!(engine = ENGINE, path = %db_path.display(), "using SQLite DB");
    Connection::open_with_flags(db_path, flags).map_err(|e| Error::Connection(format!("cannot open {}: {}", db_path.display(), e)))
}

/// Inserts `docs` in one transaction and returns how many rows were rejected.
///
/// Rows are rejected when the id cannot be a rowid or the rowid is already taken.
fn write_rows(conn: &mut Connection, docs: &[Document]) -> Result<usize> {
    let ingest_err = |e: rusqlite::Error| Error::Ingest(e.to_string());
    let tx = conn.transaction().map_err(ingest_err)?;
    let mut failed = 0;
    {
        let mut insert = tx.prepare_cached(INSERT).map_err(ingest_err)?;
        for doc in docs {
            let Some(rowid) = rowid(&doc.id) else {
                tracing::trace!(engine = ENGINE, id = %doc.id, "id is not an integer rowid");
                failed += 1;
                continue;
            };
            match insert.execute(params![rowid, doc.title, doc.original_title, doc.overview]) {
                Ok(_) => {}
                Err(e) if is_constraint_violation(&e) => {
                    tracing::trace!(engine = ENGINE, rowid, "rowid already present");
                    failed += 1;
                }
                Err(e) => return Err(ingest_err(e)),
            }
        }
    }
    tx.commit().map_err(ingest_err)?;
    Ok(failed)
}

fn rowid(id: &DocumentId) -> Option<i64> {
    match id {
        DocumentId::Int(n) => Some(*n),
        DocumentId::Str(s) => match DocumentId::from_backend(s) {
            DocumentId::Int(n) => Some(n),
            DocumentId::Str(_) => None,
        },
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

/// Turns free text into an FTS5 expression: every word quoted, all required.
///
/// `None` when the phrase has no searchable word.
fn match_expression(phrase: &str) -> Option<String> {
    let terms: Vec<String> = phrase
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{}\"", w))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" "))
}

fn search(conn: &Connection, expression: &str) -> Result<Vec<DocumentId>> {
    let query_err = |e: rusqlite::Error| Error::Query(e.to_string());
    let mut stmt = conn.prepare_cached(SEARCH).map_err(query_err)?;
    let rows = stmt.query_map(params![expression, LARGE_LIMIT as i64], |row| row.get::<_, i64>(0)).map_err(query_err)?;
    let ids = rows.map(|row| row.map(DocumentId::Int).map_err(query_err)).collect();
    ids
}

#[async_trait]
impl Driver for SqliteDriver {
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
        let Some(expression) = match_expression(phrase) else {
            return Ok(QueryResult::empty());
        };
        let conn = self.conn.clone();
        let ids = tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| Error::Query("sqlite connection lock poisoned".into()))?;
            search(&conn, &expression)
        })
        .await
        .map_err(|e| Error::Query(format!("sqlite search task failed: {}", e)))??;
        tracing::debug!(engine = ENGINE, phrase, count = ids.len(), "query returned");
        Ok(QueryResult { ids })
    }
}
