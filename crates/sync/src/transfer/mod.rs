//! Batched movement of file contents between the store and the local tree.
//!
//! Batches are sized so that one round trip stays under the store's maximum
//! payload, with a safety margin for protocol overhead.

mod download;
mod meter;
mod sizing;
mod upload;

pub use self::download::download;
pub use self::meter::{ProgressFn, TransferMeter, TransferProgress, TransferStats};
pub use self::sizing::{DEFAULT_BATCH_SIZE, SAFETY_MARGIN, batch_size, payload_budget, plan_uploads};
pub use self::upload::{UploadKind, upload};
