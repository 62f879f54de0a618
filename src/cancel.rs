//! Run-wide cancellation signal
//!
//! One flag is shared by every loader task and validator. Workers poll it at
//! their checkpoints and stop; a cancelled run never produces a report.

use crate::domain::violations::{GuardianError, GuardianResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable handle to the cancellation flag of one run
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Checkpoint: `Err(Cancelled)` once cancellation was requested
    pub fn checkpoint(&self) -> GuardianResult<()> {
        if self.is_cancelled() {
            Err(GuardianError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Cancel this flag on Ctrl+C
    pub fn install_ctrlc_handler(&self) -> GuardianResult<()> {
        let flag = self.clone();
        ctrlc::set_handler(move || {
            tracing::warn!("Cancellation requested");
            flag.cancel();
        })
        .map_err(|e| GuardianError::internal("signal", format!("Error setting Ctrl+C handler: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = CancelFlag::new();
        let worker = flag.clone();
        assert!(worker.checkpoint().is_ok());

        flag.cancel();
        assert!(worker.is_cancelled());
        assert!(matches!(worker.checkpoint(), Err(GuardianError::Cancelled)));
    }
}
