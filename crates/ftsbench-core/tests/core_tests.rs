use std::fs;

use async_trait::async_trait;
use figment::providers::{Format, Toml};
use figment::Figment;
use serde::Deserialize;
use tempfile::TempDir;

use ftsbench_core::batch::RejectPolicy;
use ftsbench_core::config::Config;
use ftsbench_core::timing::TimingFormat;
use ftsbench_core::{Document, DocumentId, Driver, DriverOptions, QueryResult, Result};

#[derive(Debug, Default, Deserialize)]
struct MeiliSection {
    url: Option<String>,
    api_key: Option<String>,
}

#[test]
fn toml_file_drives_settings_and_backend_sections() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");
    fs::write(
        &path,
        r#"
engine = "meilisearch"
op = "ingest+query"
timing = true
timing_format = "md-table"
batch_size = 500
reject_policy = "abort"

[meilisearch]
url = "http://localhost:7700"
api_key = "masterKey"
"#,
    )
    .unwrap();

    let config = Config::from_figment(Figment::new().merge(Toml::file(&path)));
    let settings = config.settings().expect("settings");
    assert_eq!(settings.engine.as_deref(), Some("meilisearch"));
    assert_eq!(settings.op.as_deref(), Some("ingest+query"));
    assert!(settings.timing);
    assert_eq!(settings.timing_format, TimingFormat::MdTable);
    assert_eq!(settings.batch_size, 500);
    assert_eq!(settings.reject_policy, RejectPolicy::Abort);

    let meili: MeiliSection = config.section("meilisearch").expect("section");
    assert_eq!(meili.url.as_deref(), Some("http://localhost:7700"));
    assert_eq!(meili.api_key.as_deref(), Some("masterKey"));

    let options = DriverOptions::from_settings(config, &settings);
    assert_eq!(options.batch_size, 500);
    assert!(!options.reset);
}

struct EchoDriver {
    seen: Vec<DocumentId>,
}

#[async_trait]
impl Driver for EchoDriver {
    fn engine(&self) -> &str { "echo" }

    async fn ingest(&mut self, document: Document) -> Result<()> {
        self.seen.push(document.id);
        Ok(())
    }

    async fn query(&mut self, _phrase: &str) -> Result<QueryResult> {
        Ok(QueryResult { ids: self.seen.clone() })
    }
}

#[tokio::test]
async fn ingest_wait_defaults_to_a_no_op() {
    let mut driver = EchoDriver { seen: Vec::new() };
    driver.ingest_wait().await.expect("empty barrier");
    driver
        .ingest(Document::parse_line(r#"{"id":1,"title":"The Matrix"}"#, 1).unwrap())
        .await
        .unwrap();
    driver.ingest_wait().await.expect("barrier");
    assert_eq!(driver.query("anything").await.unwrap().ids, vec![DocumentId::Int(1)]);
}
