//! Local side of a quill sync.
//!
//! - [`Scanner`] walks the tracked root and produces a [`LocalInventory`] of
//!   content-hashed [`FileEntry`]s and [`DirectoryEntry`]s.
//! - [`FsTransaction`] rewrites the tracked root atomically: all writes go to
//!   a temporary sibling tree that is swapped in on commit.
//! - [`ContentHash`] is the 64-bit identity both sides agree on.

pub mod error;
mod hash;
mod models;
mod path;
mod scan;
mod transaction;

pub use crate::hash::ContentHash;
pub use crate::models::{DirectoryEntry, FileEntry, LocalFile, LocalInventory, LocalListing};
pub use crate::path::{resolve as resolve_path, to_posix, validate as validate_path};
pub use crate::scan::{Entry, EntryStream, Scanner, ctime, hash_all};
pub use crate::transaction::{FsTransaction, TransactionState};
