use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ftsbench_core::batch::Batch;
use ftsbench_core::timing::TimingFormat;
use ftsbench_core::{Document, DocumentId, Driver, Error, QueryResult, Result};
use ftsbench_runner::orchestrator::{Mode, RunPlan};
use ftsbench_runner::{ingest, query, TimingSink};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Flush(Vec<DocumentId>),
    Wait,
    Query(String),
}

/// Batches like a real adapter and journals every backend call.
struct Recording {
    batch: Batch<Document>,
    journal: Arc<Mutex<Vec<Event>>>,
    index: HashMap<String, Vec<DocumentId>>,
    /// Reject the document with this id as a backend would on a failed write.
    fail_ingest_on: Option<DocumentId>,
    fail_queries: bool,
}

impl Recording {
    fn new(capacity: usize) -> (Self, Arc<Mutex<Vec<Event>>>) {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let driver = Self {
            batch: Batch::new(capacity).unwrap(),
            journal: journal.clone(),
            index: HashMap::new(),
            fail_ingest_on: None,
            fail_queries: false,
        };
        (driver, journal)
    }

    fn journal_len(journal: &Arc<Mutex<Vec<Event>>>) -> usize {
        journal.lock().unwrap().len()
    }

    fn flush(&mut self, docs: Vec<Document>) {
        for doc in &docs {
            for word in doc.title.iter().flat_map(|t| t.split_whitespace()) {
                self.index.entry(word.to_lowercase()).or_default().push(doc.id.clone());
            }
        }
        self.journal.lock().unwrap().push(Event::Flush(docs.into_iter().map(|d| d.id).collect()));
    }
}

#[async_trait]
impl Driver for Recording {
    fn engine(&self) -> &str {
        "recording"
    }

    async fn ingest(&mut self, document: Document) -> Result<()> {
        if self.fail_ingest_on.as_ref() == Some(&document.id) {
            return Err(Error::Ingest(format!("backend refused document {}", document.id)));
        }
        if let Some(full) = self.batch.push(document) {
            self.flush(full);
        }
        Ok(())
    }

    async fn ingest_wait(&mut self) -> Result<()> {
        self.journal.lock().unwrap().push(Event::Wait);
        if let Some(rest) = self.batch.take() {
            self.flush(rest);
        }
        Ok(())
    }

    async fn query(&mut self, phrase: &str) -> Result<QueryResult> {
        self.journal.lock().unwrap().push(Event::Query(phrase.to_string()));
        if self.fail_queries {
            return Err(Error::Query("backend unavailable".into()));
        }
        Ok(QueryResult { ids: self.index.get(&phrase.to_lowercase()).cloned().unwrap_or_default() })
    }
}

fn doc_lines(ids: std::ops::RangeInclusive<i64>) -> String {
    ids.map(|id| format!("{{\"id\":{id},\"title\":\"Movie {id}\"}}\n")).collect()
}

fn flushes(journal: &Arc<Mutex<Vec<Event>>>) -> Vec<Vec<DocumentId>> {
    journal
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            Event::Flush(ids) => Some(ids.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn capacity_many_documents_flush_exactly_once() {
    let (mut driver, journal) = Recording::new(3);
    let report = ingest::run(&mut driver, doc_lines(1..=3).as_bytes(), false).await.unwrap();
    assert_eq!(report.processed, 3);
    assert_eq!(flushes(&journal), vec![vec![DocumentId::Int(1), DocumentId::Int(2), DocumentId::Int(3)]]);
    assert_eq!(journal.lock().unwrap().last(), Some(&Event::Wait), "barrier on an empty buffer sends nothing");
    assert!(driver.batch.is_empty());
}

#[tokio::test]
async fn every_document_lands_in_exactly_one_flush() {
    let (mut driver, journal) = Recording::new(3);
    ingest::run(&mut driver, doc_lines(1..=7).as_bytes(), false).await.unwrap();
    let sent = flushes(&journal);
    assert_eq!(sent.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 3, 1]);
    let all: Vec<DocumentId> = sent.into_iter().flatten().collect();
    assert_eq!(all, (1..=7).map(DocumentId::Int).collect::<Vec<_>>());
    let waits = journal.lock().unwrap().iter().filter(|e| **e == Event::Wait).count();
    assert_eq!(waits, 1);
}

#[tokio::test]
async fn malformed_lines_are_skipped_not_fatal() {
    let (mut driver, _journal) = Recording::new(10);
    let source = "{\"id\":1,\"title\":\"Heat\"}\r\nnot json\n\n   \n{\"title\":\"no id\"}\n{\"id\":\"tt2\",\"title\":\"Ronin\"}\n";
    let report = ingest::run(&mut driver, source.as_bytes(), false).await.unwrap();
    assert_eq!((report.processed, report.skipped), (2, 2));

    let phrases = "\"heat\"\n{\"q\":\"ronin\"}\nbare words\n[1,2]\n\n\"nothing\"\n";
    let report = query::run(&mut driver, phrases.as_bytes(), None).await.unwrap();
    assert_eq!((report.queried, report.skipped), (3, 2));
    assert_eq!(report.total_ids, 2);
}

#[tokio::test]
async fn one_timing_record_per_query_with_matching_count() {
    let (mut driver, _journal) = Recording::new(10);
    ingest::run(&mut driver, doc_lines(1..=4).as_bytes(), false).await.unwrap();

    let mut out: Vec<u8> = Vec::new();
    let phrases = "\"movie\"\n\"3\"\n\"absent\"\n";
    let report = query::run(&mut driver, phrases.as_bytes(), Some(TimingSink::new(TimingFormat::Plain, &mut out))).await.unwrap();

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("[timing] phrase [\"movie\"]: returned [4] results in "), "{}", lines[0]);
    assert!(lines[1].contains("returned [1] results"));
    assert!(lines[2].contains("returned [0] results"), "empty result is not an error");
    assert_eq!(report.total_ids, 5);
    assert!(report.fastest <= report.mean && report.mean <= report.slowest);
}

#[tokio::test]
async fn md_table_rows_name_the_engine() {
    let (mut driver, _journal) = Recording::new(10);
    let mut out: Vec<u8> = Vec::new();
    query::run(&mut driver, "\"x\"\n".as_bytes(), Some(TimingSink::new(TimingFormat::MdTable, &mut out))).await.unwrap();
    let row = String::from_utf8(out).unwrap();
    assert!(row.starts_with("| `recording` | \"x\" | `0` | `"), "{row}");
    assert!(row.trim_end().ends_with("| `-` |"));
}

#[tokio::test]
async fn ingest_then_query_runs_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs.ndjson");
    let phrases = tmp.path().join("phrases.ndjson");
    std::fs::write(&docs, doc_lines(1..=2)).unwrap();
    std::fs::write(&phrases, "\"movie\"\n").unwrap();

    let plan = RunPlan {
        engine: "recording".into(),
        mode: Mode::IngestQuery,
        ingest_input: Some(docs),
        query_input: Some(phrases),
        timing: None,
        progress: false,
    };
    plan.validate().unwrap();
    let (mut driver, journal) = Recording::new(2);
    let mut diagnostics: Vec<u8> = Vec::new();
    let summary = plan.execute(&mut driver, &mut diagnostics).await.unwrap();

    assert_eq!(
        *journal.lock().unwrap(),
        vec![Event::Flush(vec![DocumentId::Int(1), DocumentId::Int(2)]), Event::Wait, Event::Query("movie".into())]
    );
    assert_eq!(summary.ingest.map(|r| r.processed), Some(2));
    assert_eq!(summary.query.map(|r| r.total_ids), Some(2));
    assert!(diagnostics.is_empty(), "timing is off");
}

#[tokio::test]
async fn query_mode_skips_ingestion() {
    let tmp = tempfile::tempdir().unwrap();
    let phrases = tmp.path().join("phrases.ndjson");
    std::fs::write(&phrases, "\"movie\"\n").unwrap();
    let plan = RunPlan {
        engine: "recording".into(),
        mode: Mode::Query,
        ingest_input: Some(tmp.path().join("missing.ndjson")),
        query_input: Some(phrases),
        timing: Some(TimingFormat::Plain),
        progress: false,
    };
    plan.validate().expect("ingest path is irrelevant in query mode");
    let (mut driver, journal) = Recording::new(2);
    let mut diagnostics: Vec<u8> = Vec::new();
    let summary = plan.execute(&mut driver, &mut diagnostics).await.unwrap();
    assert!(summary.ingest.is_none());
    assert_eq!(*journal.lock().unwrap(), vec![Event::Query("movie".into())]);
    assert_eq!(String::from_utf8(diagnostics).unwrap().lines().count(), 1);
}

#[tokio::test]
async fn invalid_utf8_line_is_skipped_in_both_pipelines() {
    let (mut driver, journal) = Recording::new(10);
    let mut source = doc_lines(1..=2).into_bytes();
    source.extend_from_slice(b"{\"id\":99,\"title\":\"Bad \xff\"}\n");
    source.extend_from_slice(doc_lines(3..=4).as_bytes());
    let report = ingest::run(&mut driver, &source[..], false).await.unwrap();
    assert_eq!((report.processed, report.skipped), (4, 1));
    assert_eq!(flushes(&journal), vec![(1..=4).map(DocumentId::Int).collect::<Vec<_>>()]);
    assert_eq!(journal.lock().unwrap().last(), Some(&Event::Wait), "barrier still runs");

    let phrases = b"\"movie\"\n\"caf\xe9\"\n\"3\"\n";
    let report = query::run(&mut driver, &phrases[..], None).await.unwrap();
    assert_eq!((report.queried, report.skipped), (2, 1));
    assert_eq!(report.total_ids, 5);
}

#[tokio::test]
async fn driver_ingest_error_aborts_before_the_barrier() {
    let (mut driver, journal) = Recording::new(2);
    driver.fail_ingest_on = Some(DocumentId::Int(4));
    let err = ingest::run(&mut driver, doc_lines(1..=6).as_bytes(), false).await.unwrap_err();
    assert!(matches!(err, Error::Ingest(_)), "got {err}");
    assert_eq!(flushes(&journal), vec![vec![DocumentId::Int(1), DocumentId::Int(2)]]);
    assert!(!journal.lock().unwrap().contains(&Event::Wait), "no barrier after a failed ingest");
    assert_eq!(driver.batch.len(), 1, "document 3 is buffered, 5 and 6 were never read");
}

#[tokio::test]
async fn query_error_aborts_without_retry() {
    let (mut driver, journal) = Recording::new(10);
    driver.fail_queries = true;
    let mut out: Vec<u8> = Vec::new();
    let phrases = "\"movie\"\n\"heat\"\n";
    let err = query::run(&mut driver, phrases.as_bytes(), Some(TimingSink::new(TimingFormat::Plain, &mut out))).await.unwrap_err();
    assert!(matches!(err, Error::Query(_)), "got {err}");
    assert_eq!(Recording::journal_len(&journal), 1, "one attempt, second phrase never sent");
    assert!(out.is_empty(), "no timing record for a failed query");
}
