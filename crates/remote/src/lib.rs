//! Remote side of a quill sync: a relational store that keeps every version
//! of every file.
//!
//! Live records sit in `notes`. Server-side triggers archive the previous
//! content on every update (`deltas`) and move deleted records with their
//! history into a graveyard (`deleted`, `dead_deltas`), so the state at any
//! past instant can be rebuilt with [`Session::snapshot`].
//!
//! All work happens inside a [`Session`] obtained from [`Database::begin`].

mod db;
pub mod error;
mod models;
mod repo;
mod schema;
mod session;

pub use crate::db::Database;
pub use crate::models::{DeadDelta, DeletedRecord, Delta, Download, StoredRecord, Upload};
pub use crate::session::Session;
