//! Exclusive hardware session. One control command owns the camera and
//! mount at a time; a second acquire fails immediately instead of queuing.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::error::ServiceError;

#[derive(Clone)]
pub struct SessionGuard {
    slot: Arc<Semaphore>,
}

/// Held for the duration of one control-service invocation. Dropping it
/// releases the hardware.
pub struct Session {
    _permit: OwnedSemaphorePermit,
}

impl SessionGuard {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn try_acquire(&self) -> Result<Session, ServiceError> {
        match self.slot.clone().try_acquire_owned() {
            Ok(permit) => Ok(Session { _permit: permit }),
            Err(TryAcquireError::NoPermits) => Err(ServiceError::ResourceBusy),
            Err(TryAcquireError::Closed) => Err(ServiceError::ResourceBusy),
        }
    }
}

impl Default for SessionGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort outer deadline for the synchronous services. Checked only
/// between backend calls; an in-flight call always completes.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit_s: Option<f64>,
}

impl Deadline {
    pub fn new(limit_s: Option<f64>) -> Self {
        Self {
            started: Instant::now(),
            limit_s,
        }
    }

    pub fn check(&self) -> Result<(), ServiceError> {
        if let Some(limit) = self.limit_s {
            let elapsed = self.started.elapsed().as_secs_f64();
            if elapsed > limit {
                return Err(ServiceError::Timeout(elapsed));
            }
        }
        Ok(())
    }
}
