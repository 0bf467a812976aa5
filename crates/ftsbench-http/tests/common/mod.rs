#![allow(dead_code)]

use std::time::Duration;

use axum::Router;
use figment::providers::Serialized;
use figment::Figment;
use serde_json::{json, Value};

use ftsbench_core::batch::RejectPolicy;
use ftsbench_core::config::Config;
use ftsbench_core::wait::PollPolicy;
use ftsbench_core::{Document, DocumentId, DriverOptions};

/// Serves `router` on an ephemeral local port and returns its address.
pub async fn serve(router: Router) -> (String, u16) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    ("127.0.0.1".to_string(), port)
}

pub fn options(engine: &str, section: Value, batch_size: usize, reset: bool) -> DriverOptions {
    DriverOptions {
        config: Config::from_figment(Figment::from(Serialized::defaults(json!({ engine: section })))),
        reset,
        batch_size,
        reject_policy: RejectPolicy::Skip,
        poll: PollPolicy::new(Duration::from_secs(5), Duration::from_millis(1)),
    }
}

pub fn movie(id: i64, title: &str) -> Document {
    Document { id: DocumentId::Int(id), title: Some(title.into()), original_title: None, overview: None }
}
