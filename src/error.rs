use thiserror::Error;

use crate::backend::BackendError;

/// Service-layer error taxonomy. The service layer is the sole decision
/// point for retry-vs-fatal policy; backend failures propagate through
/// `Backend` unmodified in identity.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("plate solve failed {attempts} consecutive times: {last}")]
    SolveFailed { attempts: u32, last: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("hardware session already held by another command")]
    ResourceBusy,
    #[error("aborted after {0:.1}s: outer timeout exceeded")]
    Timeout(f64),
    #[error("RA rotation {got_deg:.2} deg below minimum baseline {min_deg:.2} deg")]
    InsufficientBaseline { got_deg: f64, min_deg: f64 },
    #[error("calibration failed: {0}")]
    CalibrationFailed(String),
    #[error("guide star lost for {0} consecutive frames")]
    StarLostTimeout(u32),
}

impl ServiceError {
    /// Recoverable errors may be retried by the caller; the rest require
    /// operator intervention (hardware or configuration).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ServiceError::SolveFailed { .. }
                | ServiceError::Timeout(_)
                | ServiceError::StarLostTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_split() {
        assert!(ServiceError::SolveFailed {
            attempts: 2,
            last: "no stars".into()
        }
        .is_recoverable());
        assert!(ServiceError::StarLostTimeout(20).is_recoverable());
        assert!(!ServiceError::ResourceBusy.is_recoverable());
        assert!(!ServiceError::InvalidConfig("x".into()).is_recoverable());
    }
}
