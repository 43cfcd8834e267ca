//! Restart-only handler.
//!
//! Runs on the restart chain just before the hardware reset and tells a
//! cooperating subsystem (the power-management firmware on the reference
//! platform) to get ready for it.

use std::sync::Arc;
use tracing::{error, info};

use crate::error::Result;
use crate::observer::{Ack, Observer, RebootEvent};

/// Cooperating subsystem that must be told about an imminent reset.
pub trait RestartPreparer: Send + Sync {
    /// Prepare for the reset that follows.
    ///
    /// # Errors
    ///
    /// Returns an error when the subsystem could not be signalled.
    fn prepare_reboot(&self) -> Result<()>;
}

/// Observer registered on the restart chain.
#[derive(Clone, Default)]
pub struct RestartHandler {
    preparer: Option<Arc<dyn RestartPreparer>>,
}

impl std::fmt::Debug for RestartHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartHandler")
            .field("has_preparer", &self.preparer.is_some())
            .finish()
    }
}

impl RestartHandler {
    /// Create a handler; with no preparer it only logs.
    #[must_use]
    pub fn new(preparer: Option<Arc<dyn RestartPreparer>>) -> Self {
        Self { preparer }
    }
}

impl Observer for RestartHandler {
    fn notify(&self, event: RebootEvent, _reason: Option<&str>) -> Result<Ack> {
        if event != RebootEvent::Restart {
            return Ok(Ack::Done);
        }

        if let Some(preparer) = &self.preparer {
            if let Err(e) = preparer.prepare_reboot() {
                error!(error = %e, "Failed to prepare firmware for restart");
                return Err(e);
            }
        }

        info!("ready to do restart.");
        Ok(Ack::Done)
    }
}
