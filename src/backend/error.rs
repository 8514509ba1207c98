use thiserror::Error;

/// Backend failures carry a stable reason code alongside free-form detail.
/// The code survives propagation so callers can branch without string
/// matching.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("connection error [{reason}]: {detail}")]
    Connection { reason: &'static str, detail: String },
    #[error("camera error [{reason}]: {detail}")]
    Camera { reason: &'static str, detail: String },
    #[error("mount error [{reason}]: {detail}")]
    Mount { reason: &'static str, detail: String },
    #[error("solver error [{reason}]: {detail}")]
    Solver { reason: &'static str, detail: String },
}

impl BackendError {
    pub fn reason(&self) -> &'static str {
        match self {
            BackendError::Connection { reason, .. }
            | BackendError::Camera { reason, .. }
            | BackendError::Mount { reason, .. }
            | BackendError::Solver { reason, .. } => reason,
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, BackendError::Connection { .. })
    }
}
