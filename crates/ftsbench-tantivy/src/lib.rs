//! ftsbench-tantivy
//!
//! Embedded backend: an on-disk (or in-RAM) tantivy index behind the
//! [`ftsbench_core::Driver`] contract.

pub mod driver;
pub mod schema;

pub use driver::{build, TantivyDriver, TantivySettings, ENGINE};
