//! Synchronisation between a local tree and the versioned remote store.
//!
//! The [`flow`] module holds the operations a user runs: [`diff`](flow::diff)
//! reports, [`get`](flow::get) makes the local tree mirror the store,
//! [`give`](flow::give) makes the store mirror the local tree, and
//! [`init`](flow::init) prepares both. How the local side is inventoried is
//! a [`LocalState`] strategy: a full scan, or an index-assisted one.

pub mod diff;
pub mod error;
pub mod flow;
mod local;
pub mod transfer;

pub use crate::flow::{Always, Confirm, Context, GetMode, GiveMode, Never, Outcome};
pub use crate::local::{IndexedState, LocalState, LocalTree, ScanState};
