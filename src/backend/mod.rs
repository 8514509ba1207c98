//! Hardware capability ports. One contract per device; services never
//! branch on a concrete backend identity.

mod error;
#[cfg(test)]
pub mod fakes;
pub mod sim;
mod types;

pub use error::BackendError;
pub use types::{CaptureSettings, Image, MountState, Solution, SolveRequest, SolveResult};

pub trait CameraPort: Send {
    fn connect(&mut self) -> Result<(), BackendError>;
    fn disconnect(&mut self) -> Result<(), BackendError>;
    fn is_connected(&self) -> bool;
    fn capture(
        &mut self,
        exposure_s: f64,
        settings: &CaptureSettings,
    ) -> Result<Image, BackendError>;
}

pub trait SolverPort: Send {
    fn solve(&mut self, request: &SolveRequest<'_>) -> Result<SolveResult, BackendError>;
}

/// All angular I/O is radians in ICRS. ICRS<->apparent conversion and any
/// site latitude/longitude/elevation it requires live entirely behind this
/// port. Implementations auto-connect on every call except `stop` and
/// `disconnect`.
pub trait MountPort: Send {
    fn connect(&mut self) -> Result<(), BackendError>;
    fn disconnect(&mut self) -> Result<(), BackendError>;
    fn is_connected(&self) -> bool;
    fn get_state(&mut self) -> Result<MountState, BackendError>;
    fn slew_to(&mut self, ra_rad: f64, dec_rad: f64) -> Result<(), BackendError>;
    fn sync(&mut self, ra_rad: f64, dec_rad: f64) -> Result<(), BackendError>;
    fn set_tracking(&mut self, enabled: bool) -> Result<(), BackendError>;
    fn stop(&mut self) -> Result<(), BackendError>;
    fn park(&mut self) -> Result<(), BackendError>;
    /// Timed tracking-rate offsets, in signed milliseconds per axis.
    fn pulse_guide(&mut self, ra_ms: f64, dec_ms: f64) -> Result<(), BackendError>;
    /// Local sidereal time, radians. The boundary owns time and site, so it
    /// also answers where the meridian currently points.
    fn sidereal_time(&mut self) -> Result<f64, BackendError>;
}
