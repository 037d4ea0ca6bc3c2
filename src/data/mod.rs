//! Data ingestion and storage
//!
//! Page fetching, odds-table extraction, output sinks and SQLite storage.

pub mod calendar;
pub mod database;
pub mod extractor;
pub mod fetcher;
pub mod sink;

pub use database::Database;
pub use extractor::{extract, Field, RawFieldMap};
pub use fetcher::{DonbestFetcher, PageFetcher};
pub use sink::{CsvSink, JsonSink, RecordSink};
