//! Cooperative cancellation shared between the runner and its listeners

use crate::AutomationError;
use tokio_util::sync::CancellationToken;

/// Cloneable stop flag observed before every step and every loop iteration.
///
/// Once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationMonitor {
    token: CancellationToken,
}

impl CancellationMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token, e.g. one also cancelled by a Ctrl-C handler
    pub fn from_token(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// `Err(Cancelled)` once a stop was requested
    pub fn check(&self) -> Result<(), AutomationError> {
        if self.is_cancelled() {
            Err(AutomationError::Cancelled)
        } else {
            Ok(())
        }
    }
}
