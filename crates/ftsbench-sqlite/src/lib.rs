//! ftsbench-sqlite
//!
//! Embedded backend: an SQLite FTS5 virtual table behind the
//! [`ftsbench_core::Driver`] contract.

pub mod driver;

pub use driver::{build, SqliteDriver, SqliteSettings, ENGINE};
