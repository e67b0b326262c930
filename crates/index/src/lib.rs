//! SQLite index of local file metadata.
//!
//! The index remembers `(path, ctime, size, hash)` for every tracked file as
//! of the last time the local tree was known to be in sync, plus a log of
//! numbered commits. It is an accelerator only: a file whose ctime or size
//! changed is hashed again, and deleting the index database merely makes the
//! next run slower.
//!
//! # Platform note
//! Staleness is judged by the POSIX status-change time. On platforms without
//! one the modification time is used instead, which misses changes that
//! preserve mtime; leave `index` unset there if that matters.

mod compare;
mod db;
pub mod error;
mod models;
mod repo;

pub use crate::compare::{IndexDelta, compare};
pub use crate::db::Database;
pub use crate::models::{Commit, IndexEntry};
pub use crate::repo::Repository;
