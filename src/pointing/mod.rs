//! Closed-loop target centering: slew, solve, correct, repeat.

use serde::Serialize;
use std::f64::consts::FRAC_PI_2;

use crate::angles::{
    angular_separation, format_dms, format_hms, normalize_ra, signed_delta, to_arcsec, Equatorial,
};
use crate::backend::{CameraPort, MountPort, SolverPort};
use crate::config::{CameraConfig, GotoConfig, SolverConfig};
use crate::error::ServiceError;
use crate::session::Deadline;
use crate::solving::{wait_for_slew, FieldSolver};

#[derive(Debug, Clone, Serialize)]
pub struct GotoResult {
    pub success: bool,
    pub final_error_arcsec: Option<f64>,
    pub iterations: u32,
    pub message: Option<String>,
}

pub struct GotoService<'a> {
    mount: &'a mut dyn MountPort,
    camera: &'a mut dyn CameraPort,
    solver: &'a mut dyn SolverPort,
    cfg: &'a GotoConfig,
    camera_cfg: &'a CameraConfig,
    solver_cfg: &'a SolverConfig,
}

impl<'a> GotoService<'a> {
    pub fn new(
        mount: &'a mut dyn MountPort,
        camera: &'a mut dyn CameraPort,
        solver: &'a mut dyn SolverPort,
        cfg: &'a GotoConfig,
        camera_cfg: &'a CameraConfig,
        solver_cfg: &'a SolverConfig,
    ) -> Self {
        Self {
            mount,
            camera,
            solver,
            cfg,
            camera_cfg,
            solver_cfg,
        }
    }

    /// Center `target` to within `tolerance_arcsec`, spending at most
    /// `max_iterations` slew/solve rounds. Failed solves do not consume
    /// iterations; two consecutive failures abort. Non-convergence is a
    /// value (`success = false`), not an error.
    pub fn center_target(
        &mut self,
        target: Equatorial,
        tolerance_arcsec: f64,
        max_iterations: u32,
    ) -> Result<GotoResult, ServiceError> {
        if max_iterations == 0 {
            return Err(ServiceError::InvalidConfig(
                "max_iterations must be at least 1".into(),
            ));
        }
        if !(tolerance_arcsec > 0.0) {
            return Err(ServiceError::InvalidConfig(format!(
                "tolerance_arcsec must be positive, got {tolerance_arcsec}"
            )));
        }
        if !(self.cfg.gain > 0.0 && self.cfg.gain <= 1.0) {
            return Err(ServiceError::InvalidConfig(format!(
                "correction gain must be in (0, 1], got {}",
                self.cfg.gain
            )));
        }

        let deadline = Deadline::new(self.cfg.timeout_s);
        let mut solve = FieldSolver::new(
            &mut *self.camera,
            &mut *self.solver,
            self.camera_cfg,
            self.solver_cfg,
            self.cfg.solve_failure_limit,
        );

        let mut commanded = target;
        let mut iterations = 0u32;
        let mut last_error_arcsec = None;

        loop {
            deadline.check()?;
            log::info!(
                "goto: slewing to {} {}",
                format_hms(commanded.ra_rad, 2),
                format_dms(commanded.dec_rad, 2)
            );
            self.mount.slew_to(commanded.ra_rad, commanded.dec_rad)?;
            wait_for_slew(&mut *self.mount, &deadline)?;
            deadline.check()?;

            let solution = match solve.attempt(Some(&target)) {
                Ok(Some(solution)) => solution,
                // budget not yet spent; repeat the full slew/solve pass
                Ok(None) => continue,
                Err(ServiceError::SolveFailed { attempts, last }) => {
                    return Ok(GotoResult {
                        success: false,
                        final_error_arcsec: last_error_arcsec,
                        iterations,
                        message: Some(format!(
                            "plate solve failed {attempts} consecutive times: {last}"
                        )),
                    });
                }
                Err(other) => return Err(other),
            };

            iterations += 1;
            let error_arcsec = to_arcsec(angular_separation(&target, &solution.coord));
            last_error_arcsec = Some(error_arcsec);
            log::info!("goto: iteration {iterations}, pointing error {error_arcsec:.1} arcsec");

            if error_arcsec <= tolerance_arcsec {
                return Ok(GotoResult {
                    success: true,
                    final_error_arcsec: last_error_arcsec,
                    iterations,
                    message: None,
                });
            }
            if iterations >= max_iterations {
                return Ok(GotoResult {
                    success: false,
                    final_error_arcsec: last_error_arcsec,
                    iterations,
                    message: Some(format!(
                        "did not converge within {max_iterations} iterations"
                    )),
                });
            }

            let gain = self.cfg.gain;
            commanded = Equatorial {
                ra_rad: normalize_ra(
                    commanded.ra_rad + gain * signed_delta(target.ra_rad, solution.coord.ra_rad),
                ),
                dec_rad: (commanded.dec_rad + gain * (target.dec_rad - solution.coord.dec_rad))
                    .clamp(-FRAC_PI_2, FRAC_PI_2),
            };
        }
    }
}
