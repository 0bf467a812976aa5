#![deny(unused_variables)]

pub mod batch;
pub mod config;
pub mod error;
pub mod timing;
pub mod traits;
pub mod types;
pub mod wait;

pub use error::{Error, Result};
pub use traits::{Driver, DriverFactory, DriverOptions};
pub use types::{Document, DocumentId, QueryResult};
