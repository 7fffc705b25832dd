pub mod connection;
pub mod db_loader;
pub mod identifiers;
pub mod ingestion;
pub mod readers;
pub mod schema_builder;
pub mod type_inference;

pub use ingestion::{ingest, IngestionRun};
