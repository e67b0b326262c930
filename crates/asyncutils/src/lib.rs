//! Small async helpers shared across the quill crates.
//!
//! The only resident right now is [`RetryPolicy`], the single place where
//! "try again in a bit" is decided. Connection recovery in `quill-remote` and
//! directory cleanup in `quill-storage` both go through it, so the numbers
//! live here and nowhere else.

mod retry;

pub use crate::retry::{
    DIRECTORY_DELETE_ATTEMPTS, DIRECTORY_DELETE_DELAY, RECONNECT_ATTEMPTS, RECONNECT_DELAY, RetryPolicy,
};
