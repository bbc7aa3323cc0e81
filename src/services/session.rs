use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::portal::{PortalAdapter, PortalError};

/// The authenticated portal session shared by every component of a run.
///
/// Only one interaction may drive the portal at a time: callers hold the
/// guard from `lock` for as long as they use the adapter. `release` takes the
/// same lock and disposes the adapter at most once, however many shutdown
/// paths reach it.
pub struct PortalSession {
    adapter: Arc<dyn PortalAdapter>,
    released: AtomicBool,
    turn: Mutex<()>,
}

impl PortalSession {
    pub fn new(adapter: Arc<dyn PortalAdapter>) -> Self {
        Self {
            adapter,
            released: AtomicBool::new(false),
            turn: Mutex::new(()),
        }
    }

    pub fn adapter(&self) -> Result<&dyn PortalAdapter, PortalError> {
        if self.is_released() {
            return Err(PortalError::SessionClosed);
        }
        Ok(self.adapter.as_ref())
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Waits until no other interaction is using the portal.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.turn.lock().await
    }

    /// Returns `true` only for the call that actually disposed the session.
    /// Waits for any interaction in flight to finish first.
    pub async fn release(&self) -> bool {
        let _turn = self.lock().await;
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.adapter.dispose().await;
        info!("Portal session disposed");
        true
    }
}
