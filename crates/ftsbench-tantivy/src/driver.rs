use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::QueryParser;
use tantivy::schema::Value;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use ftsbench_core::batch::{Batch, FlushReport, RejectPolicy};
use ftsbench_core::config::expand_path;
use ftsbench_core::traits::{BuildFuture, Driver, DriverOptions, LARGE_LIMIT};
use ftsbench_core::{Document, DocumentId, Error, QueryResult, Result};

use crate::schema::{build_schema, register_tokenizer, MovieFields};

pub const ENGINE: &str = "tantivy";

const DEFAULT_WRITER_MEMORY: usize = 50_000_000;

/// `[tantivy]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TantivySettings {
	pub index_dir: Option<String>,
	/// Keep the index in RAM; `index_dir` is then ignored.
	pub in_memory: bool,
	pub writer_memory_bytes: Option<usize>,
}

pub struct TantivyDriver {
	index: Index,
	reader: IndexReader,
	fields: MovieFields,
	batch: Batch<Document>,
	reject_policy: RejectPolicy,
	writer_memory: usize,
}

/// Registry entry point.
pub fn build(options: DriverOptions) -> BuildFuture {
	Box::pin(async move {
		let driver: Box<dyn Driver> = Box::new(TantivyDriver::open(&options)?);
		Ok(driver)
	})
}

impl TantivyDriver {
	pub fn open(options: &DriverOptions) -> Result<Self> {
		let settings: TantivySettings = options.config.section(ENGINE)?;
		let index = if settings.in_memory {
			Index::create_in_ram(build_schema())
		} else {
			let index_dir = settings.index_dir.as_deref().map(expand_path).ok_or_else(|| {
				Error::Connection("Missing tantivy index directory (did you specify APP_TANTIVY__INDEX_DIR?)".into())
			})?;
			Self::open_dir(index_dir, options.reset)?
		};
		register_tokenizer(&index);
		let fields = MovieFields::resolve(&index.schema()).map_err(|e| Error::Initialization(format!("unexpected schema: {}", e)))?;
		let reader = index
			.reader_builder()
			.reload_policy(ReloadPolicy::Manual)
			.try_into()
			.map_err(|e| Error::Initialization(format!("failed to open reader: {}", e)))?;
		Ok(Self {
			index,
			reader,
			fields,
			batch: Batch::new(options.batch_size)?,
			reject_policy: options.reject_policy,
			writer_memory: settings.writer_memory_bytes.unwrap_or(DEFAULT_WRITER_MEMORY),
		})
	}

	fn open_dir(index_dir: PathBuf, reset: bool) -> Result<Index> {
		if reset && index_dir.exists() {
			tracing::info!(path = %index_dir.display(), "resetting tantivy index");
			std::fs::remove_dir_all(&index_dir).map_err(|e| Error::Initialization(format!("failed to remove {}: {}", index_dir.display(), e)))?;
		}
		std::fs::create_dir_all(&index_dir).map_err(|e| Error::Connection(format!("cannot create {}: {}", index_dir.display(), e)))?;
		let dir = MmapDirectory::open(&index_dir).map_err(|e| Error::Connection(format!("cannot open {}: {}", index_dir.display(), e)))?;
		// Opening an existing index with the same schema is the idempotent path.
		let index = Index::open_or_create(dir, build_schema()).map_err(|e| Error::Initialization(format!("{}: {}", index_dir.display(), e)))?;
		tracing::debug!(path = %index_dir.display(), "tantivy index ready");
		Ok(index)
	}

	async fn send_batch(&mut self, docs: Vec<Document>) -> Result<FlushReport> {
		tracing::debug!(engine = ENGINE, documents = docs.len(), "sending batch");
		let index = self.index.clone();
		let fields = self.fields;
		let writer_memory = self.writer_memory;
		let submitted = docs.len();
		tokio::task::spawn_blocking(move || write_documents(&index, fields, writer_memory, docs))
			.await
			.map_err(|e| Error::Ingest(format!("tantivy writer task failed: {}", e)))??;
		self.reader.reload().map_err(|e| Error::Ingest(format!("failed to reload reader: {}", e)))?;
		FlushReport::all_succeeded(submitted).settle(ENGINE, self.reject_policy)
	}
}

fn write_documents(index: &Index, fields: MovieFields, writer_memory: usize, docs: Vec<Document>) -> Result<()> {
	let ingest_err = |e: tantivy::TantivyError| Error::Ingest(e.to_string());
	let mut writer: IndexWriter = index.writer(writer_memory).map_err(ingest_err)?;
	for document in docs {
		let id_json = serde_json::to_string(&document.id).map_err(|e| Error::Ingest(e.to_string()))?;
		// Upsert: drop any earlier copy, including one added earlier in this batch.
		writer.delete_term(Term::from_field_text(fields.id_json, &id_json));
		let mut doc = TantivyDocument::default();
		doc.add_text(fields.id_json, &id_json);
		if let Some(title) = &document.title { doc.add_text(fields.title, title); }
		if let Some(original_title) = &document.original_title { doc.add_text(fields.original_title, original_title); }
		if let Some(overview) = &document.overview { doc.add_text(fields.overview, overview); }
		writer.add_document(doc).map_err(ingest_err)?;
	}
	writer.commit().map_err(ingest_err)?;
	Ok(())
}

#[async_trait]
impl Driver for TantivyDriver {
	fn engine(&self) -> &str { ENGINE }

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
		let searcher = self.reader.searcher();
		let parser = QueryParser::for_index(&self.index, self.fields.searchable());
		let (query, errors) = parser.parse_query_lenient(phrase);
		if !errors.is_empty() {
			tracing::debug!(phrase, ignored = errors.len(), "lenient parse dropped parts of the phrase");
		}
		let top_docs = searcher.search(&query, &TopDocs::with_limit(LARGE_LIMIT)).map_err(|e| Error::Query(e.to_string()))?;
		let mut ids = Vec::with_capacity(top_docs.len());
		for (_score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr).map_err(|e| Error::Query(e.to_string()))?;
			let raw = doc.get_first(self.fields.id_json).and_then(|v| v.as_str()).ok_or_else(|| Error::Query("stored id missing".into()))?;
			let id: DocumentId = serde_json::from_str(raw).map_err(|e| Error::Query(format!("corrupt stored id {}: {}", raw, e)))?;
			ids.push(id);
		}
		tracing::debug!(engine = ENGINE, phrase, count = ids.len(), "query returned");
		Ok(QueryResult { ids })
	}
}
