//! Data layer for the batch ingestion pipeline.
//!
//! Responsible for discovering and parsing CSV inputs, persisting stamped rows
//! in the store, and maintaining the running price statistics.

pub mod aggregator;
pub mod loader;
pub mod reader;
pub mod store;
