use crate::transfer::{ProgressFn, TransferProgress};
use std::fmt;
use std::sync::Arc;

pub use quill_config::DEFAULT_MAX_PACKET_SIZE;

/// Asks the user whether to go ahead.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Says yes without asking; what `--force` installs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl Confirm for Always {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Says no without asking; what `--silent` installs unless forced.
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl Confirm for Never {
    fn confirm(&self, prompt: &str) -> bool {
        tracing::warn!(prompt, "declined without asking");
        false
    }
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Everything a flow needs besides its stores.
#[derive(Clone)]
pub struct Context {
    max_packet_size: u64,
    confirm: Arc<dyn Confirm>,
    forced: bool,
    progress: Option<Arc<ProgressFn>>,
}

impl Context {
    /// Prompts through `confirm`.
    pub fn new(max_packet_size: u64, confirm: impl Confirm + 'static) -> Self {
        Self { max_packet_size, confirm: Arc::new(confirm), forced: false, progress: None }
    }

    /// Never prompts; a failing commit is reported as a forced commit.
    pub fn forced(max_packet_size: u64) -> Self {
        Self { forced: true, ..Self::new(max_packet_size, Always) }
    }

    pub fn with_progress(mut self, progress: impl Fn(&TransferProgress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn max_packet_size(&self) -> u64 {
        self.max_packet_size
    }

    pub fn is_forced(&self) -> bool {
        self.forced
    }

    pub(crate) fn progress(&self) -> Option<&ProgressFn> {
        self.progress.as_deref()
    }

    pub(crate) fn confirm(&self, prompt: &str) -> bool {
        let answer = self.confirm.confirm(prompt);
        tracing::debug!(prompt, answer, "confirmation");
        answer
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("max_packet_size", &self.max_packet_size)
            .field("forced", &self.forced)
            .finish_non_exhaustive()
    }
}
