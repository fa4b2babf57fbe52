//! A path-addressed store of YAML documents kept in a directory tree.
//!
//! Every path segment descends one level: through directories, into a
//! `name.yaml` document, then through its mapping keys and sequence indices.
//! Queries record steps and replay them on [`Query::commit`],
//! [`Query::value`] or [`Query::list`]; [`Seer::sync`] writes changed documents
//! back with their comments intact.

pub mod config;
pub mod document;
pub mod error;
pub mod fs;
pub mod query;
mod resolver;
pub mod store;

pub use config::{Options, SeerConfig};
pub use document::Document;
pub use error::{BuildError, Result, SeerError};
pub use fs::{FileSystem, MemFs, OsFs};
pub use query::Query;
pub use store::{Batch, Seer};
