use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, EngineResult};

/// Per-request context threaded through every store and iterator call.
///
/// Cloning is cheap and clones share the same cancellation state.
#[derive(Clone, Debug, Default)]
pub struct LinkContext {
    cancel: CancellationToken,
}

impl LinkContext {
    /// A context that is never cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that is cancelled whenever `token` is.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self { cancel: token }
    }

    /// The token behind this context, for wiring into other cancellable work.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// `Err(Cancelled)` once the context has been cancelled.
    pub fn check(&self) -> EngineResult<()> {
        if self.cancel.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}
