//! Capture-and-solve plumbing shared by the pointing and polar-align
//! services, including the consecutive-failure retry policy.

use std::time::Duration;

use crate::angles::Equatorial;
use crate::backend::{CameraPort, CaptureSettings, MountPort, Solution, SolveRequest, SolverPort};
use crate::config::{CameraConfig, SolverConfig};
use crate::error::ServiceError;
use crate::session::Deadline;

const SLEW_POLL: Duration = Duration::from_millis(200);
const SLEW_POLL_LIMIT: u32 = 600;

pub struct FieldSolver<'a> {
    camera: &'a mut dyn CameraPort,
    solver: &'a mut dyn SolverPort,
    exposure_s: f64,
    settings: CaptureSettings,
    search_radius_rad: Option<f64>,
    solve_timeout_s: Option<f64>,
    failure_limit: u32,
    consecutive_failures: u32,
}

impl<'a> FieldSolver<'a> {
    pub fn new(
        camera: &'a mut dyn CameraPort,
        solver: &'a mut dyn SolverPort,
        camera_cfg: &CameraConfig,
        solver_cfg: &SolverConfig,
        failure_limit: u32,
    ) -> Self {
        Self {
            camera,
            solver,
            exposure_s: camera_cfg.exposure_s,
            settings: CaptureSettings {
                gain: camera_cfg.gain,
                binning: camera_cfg.binning,
                roi: None,
            },
            search_radius_rad: Some(solver_cfg.search_radius_deg.to_radians()),
            solve_timeout_s: Some(solver_cfg.timeout_s),
            failure_limit,
            consecutive_failures: 0,
        }
    }

    /// One capture + solve. A failed solve counts against the consecutive
    /// failure budget; hitting the budget surfaces `SolveFailed`. Backend
    /// errors propagate untouched.
    pub fn attempt(&mut self, hint: Option<&Equatorial>) -> Result<Option<Solution>, ServiceError> {
        let image = self.camera.capture(self.exposure_s, &self.settings)?;
        let mut request = SolveRequest::new(&image);
        if let Some(hint) = hint {
            request.ra_hint_rad = Some(hint.ra_rad);
            request.dec_hint_rad = Some(hint.dec_rad);
        }
        request.search_radius_rad = self.search_radius_rad;
        request.timeout_s = self.solve_timeout_s;

        let result = self.solver.solve(&request)?;
        match result.solution() {
            Some(solution) => {
                self.consecutive_failures = 0;
                Ok(Some(*solution))
            }
            None => {
                self.consecutive_failures += 1;
                let detail = result.message.unwrap_or_else(|| "no solution".to_string());
                log::warn!(
                    "plate solve failed ({}/{}): {detail}",
                    self.consecutive_failures,
                    self.failure_limit
                );
                if self.consecutive_failures >= self.failure_limit {
                    return Err(ServiceError::SolveFailed {
                        attempts: self.consecutive_failures,
                        last: detail,
                    });
                }
                Ok(None)
            }
        }
    }

    /// Retry until a solution or the failure budget is exhausted. The
    /// deadline is checked between attempts, never mid-call.
    pub fn solve(
        &mut self,
        hint: Option<&Equatorial>,
        deadline: &Deadline,
    ) -> Result<Solution, ServiceError> {
        loop {
            deadline.check()?;
            if let Some(solution) = self.attempt(hint)? {
                return Ok(solution);
            }
        }
    }
}

/// Poll mount state until the slew settles. The boundary bounds each call;
/// this bounds the overall wait.
pub fn wait_for_slew(mount: &mut dyn MountPort, deadline: &Deadline) -> Result<(), ServiceError> {
    for _ in 0..SLEW_POLL_LIMIT {
        let state = mount.get_state()?;
        if !state.slewing {
            return Ok(());
        }
        deadline.check()?;
        std::thread::sleep(SLEW_POLL);
    }
    Err(ServiceError::Timeout(
        SLEW_POLL_LIMIT as f64 * SLEW_POLL.as_secs_f64(),
    ))
}
