//! Ingestion, query and conversation engine for tabula.
//!
//! Everything that touches an embedded database file lives here:
//!
//! - [`pipeline`] creates tables and bulk-loads rows in one transaction.
//! - [`source`] turns CSV and JSON uploads into an [`pipeline::IngestPlan`].
//! - [`materialize`] runs upload → scratch file → pipeline → blob store.
//! - [`sandbox`] fetches a stored file and reads it strictly read-only.
//! - [`catalog`] lists, renames, deletes and hands out datasets.
//! - [`conversation`] drives one question/answer exchange with the oracle.
//!
//! [`blob::FsBlobStore`] and [`oracle::HttpOracle`] are the concrete
//! collaborators the server binary wires in.

pub mod blob;
pub mod catalog;
pub mod conversation;
pub mod error;
pub mod materialize;
pub mod oracle;
pub mod pipeline;
pub mod sandbox;
pub mod source;

mod db;
mod scratch;

pub use error::{Error, Result};

#[cfg(test)]
mod testutil;
