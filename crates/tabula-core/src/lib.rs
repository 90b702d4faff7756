//! Core types and trait definitions for tabula.
//!
//! This crate is deliberately free of HTTP, filesystem and database
//! dependencies. It holds the pure pieces of the ingestion-and-query
//! subsystem (type inference, schema building, SQL extraction, storage-key
//! conventions) plus the traits every collaborator is reached through.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod blob;
pub mod chat;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod infer;
pub mod keys;
pub mod oracle;
pub mod store;
pub mod table;

pub use error::{Error, ErrorKind, Result};

/// One decoded source record: field name to scalar (or composite) value.
///
/// Field order is the order fields were first seen in the source.
pub type Record = serde_json::Map<String, serde_json::Value>;
