//! ftsbench-http
//!
//! Adapters for search servers reached over HTTP. Each module exposes a
//! `build` factory for the registry and the driver type itself.

mod client;
pub mod meilisearch;
pub mod opensearch;
pub mod typesense;

pub use meilisearch::MeiliDriver;
pub use opensearch::OpenSearchDriver;
pub use typesense::TypesenseDriver;
