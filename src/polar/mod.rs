//! Polar-axis misalignment estimation from two solved poses separated by a
//! commanded RA rotation.

mod geometry;

pub use geometry::{fit_mechanical_pole, GeometryError, PoleFit};

use serde::Serialize;
use std::f64::consts::FRAC_PI_2;

use crate::angles::{
    angular_separation, format_dms, format_hms, from_degrees, normalize_ra, signed_delta,
    to_arcsec, Equatorial,
};
use crate::backend::{CameraPort, MountPort, SolverPort};
use crate::config::{CameraConfig, PolarConfig, SiteConfig, SolverConfig};
use crate::error::ServiceError;
use crate::session::Deadline;
use crate::solving::{wait_for_slew, FieldSolver};

#[derive(Debug, Clone, Serialize)]
pub struct PolarResult {
    /// Positive: raise the polar axis.
    pub alt_correction_arcsec: f64,
    /// Positive: rotate the axis head toward the east.
    pub az_correction_arcsec: f64,
    pub residual_arcsec: f64,
    pub confidence: f64,
    pub message: Option<String>,
}

pub struct PolarAlignService<'a> {
    mount: &'a mut dyn MountPort,
    camera: &'a mut dyn CameraPort,
    solver: &'a mut dyn SolverPort,
    cfg: &'a PolarConfig,
    site: &'a SiteConfig,
    camera_cfg: &'a CameraConfig,
    solver_cfg: &'a SolverConfig,
}

impl<'a> PolarAlignService<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mount: &'a mut dyn MountPort,
        camera: &'a mut dyn CameraPort,
        solver: &'a mut dyn SolverPort,
        cfg: &'a PolarConfig,
        site: &'a SiteConfig,
        camera_cfg: &'a CameraConfig,
        solver_cfg: &'a SolverConfig,
    ) -> Self {
        Self {
            mount,
            camera,
            solver,
            cfg,
            site,
            camera_cfg,
            solver_cfg,
        }
    }

    pub fn run(&mut self, ra_rotation_rad: f64) -> Result<PolarResult, ServiceError> {
        // shortest equivalent rotation; 350 deg commanded is a -10 deg baseline
        let rotation = signed_delta(ra_rotation_rad, 0.0);
        let min_rad = from_degrees(self.cfg.min_rotation_deg);
        if rotation.abs() < min_rad {
            return Err(ServiceError::InsufficientBaseline {
                got_deg: rotation.abs().to_degrees(),
                min_deg: self.cfg.min_rotation_deg,
            });
        }

        let deadline = Deadline::new(self.cfg.timeout_s);
        let mut solve = FieldSolver::new(
            &mut *self.camera,
            &mut *self.solver,
            self.camera_cfg,
            self.solver_cfg,
            self.cfg.solve_failure_limit,
        );

        log::info!("polar: solving pose A");
        let pose_a = solve.solve(None, &deadline)?;

        let state = self.mount.get_state()?;
        deadline.check()?;
        let rotated_ra = normalize_ra(state.ra_rad + ra_rotation_rad);
        log::info!(
            "polar: rotating RA axis by {:.1} deg to {}",
            rotation.to_degrees(),
            format_hms(rotated_ra, 2)
        );
        self.mount.slew_to(rotated_ra, state.dec_rad)?;
        wait_for_slew(&mut *self.mount, &deadline)?;
        deadline.check()?;

        log::info!("polar: solving pose B");
        let pose_b = solve.solve(None, &deadline)?;

        let northern = self.site.latitude_deg >= 0.0;
        let fit = match fit_mechanical_pole(&pose_a.coord, &pose_b.coord, rotation, northern) {
            Ok(fit) => fit,
            Err(GeometryError::Degenerate(detail)) => {
                log::warn!("polar: {detail}");
                return Ok(PolarResult {
                    alt_correction_arcsec: 0.0,
                    az_correction_arcsec: 0.0,
                    residual_arcsec: 0.0,
                    confidence: 0.0,
                    message: Some(detail),
                });
            }
        };

        let lst = self.mount.sidereal_time()?;
        let (alt_correction, az_correction) =
            decompose_pole_offset(&fit.pole, lst, self.site.latitude_deg, northern);

        let message = format!(
            "mechanical pole at {} {}, {:.1} arcmin from the celestial pole",
            format_hms(fit.pole.ra_rad, 2),
            format_dms(fit.pole.dec_rad, 2),
            to_arcsec(angular_separation(&fit.pole, &celestial_pole(northern))) / 60.0,
        );
        log::info!("polar: {message}");

        Ok(PolarResult {
            alt_correction_arcsec: to_arcsec(alt_correction),
            az_correction_arcsec: to_arcsec(az_correction),
            residual_arcsec: to_arcsec(fit.residual_rad),
            confidence: fit.confidence,
            message: Some(message),
        })
    }
}

fn celestial_pole(northern: bool) -> Equatorial {
    Equatorial {
        ra_rad: 0.0,
        dec_rad: if northern { FRAC_PI_2 } else { -FRAC_PI_2 },
    }
}

/// Split the pole offset into local alt/az corrections. With the pole at
/// hour angle H and polar distance rho: the axis sits rho*cos(H) too high
/// and rho*sin(H)/cos(lat) too far west; corrections negate the errors.
fn decompose_pole_offset(
    pole: &Equatorial,
    lst_rad: f64,
    latitude_deg: f64,
    northern: bool,
) -> (f64, f64) {
    let rho = angular_separation(pole, &celestial_pole(northern));
    let hour_angle = signed_delta(lst_rad, pole.ra_rad);
    let cos_lat = latitude_deg.to_radians().cos().max(1e-6);

    let alt_error = rho * hour_angle.cos();
    let az_error = -rho * hour_angle.sin() / cos_lat;
    (-alt_error, -az_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fakes::{FakeCamera, FakeMount, ScriptedSolver};
    use crate::backend::sim::{SimOptions, SimRig};

    fn run_with_sim(opts: SimOptions, rotation_rad: f64) -> Result<PolarResult, ServiceError> {
        let latitude_deg = opts.latitude_deg;
        let rig = SimRig::new(opts);
        let mut mount = rig.mount();
        let mut camera = rig.camera();
        let mut solver = rig.solver();
        // start away from the meridian so the poses are well conditioned
        mount.slew_to(0.8, from_degrees(35.0)).unwrap();

        let cfg = PolarConfig::default();
        let site = SiteConfig { latitude_deg };
        let camera_cfg = CameraConfig {
            exposure_s: 2.0,
            ..CameraConfig::default()
        };
        let solver_cfg = SolverConfig::default();
        let mut service = PolarAlignService::new(
            &mut mount,
            &mut camera,
            &mut solver,
            &cfg,
            &site,
            &camera_cfg,
            &solver_cfg,
        );
        service.run(rotation_rad)
    }

    #[test]
    fn recovers_simulated_axis_error() {
        let opts = SimOptions {
            pole_alt_error_arcmin: 10.0,
            pole_az_error_arcmin: -6.0,
            solve_noise_arcsec: 0.0,
            ..SimOptions::default()
        };
        let result = run_with_sim(opts, from_degrees(30.0)).unwrap();

        assert!(result.residual_arcsec < 0.5, "residual {}", result.residual_arcsec);
        assert!(result.confidence > 0.9, "confidence {}", result.confidence);
        // axis is 10' too high: lower it. Axis is 6' west: push it east.
        assert!(
            (result.alt_correction_arcsec + 600.0).abs() < 5.0,
            "alt {}",
            result.alt_correction_arcsec
        );
        assert!(
            (result.az_correction_arcsec - 360.0).abs() < 5.0,
            "az {}",
            result.az_correction_arcsec
        );
    }

    #[test]
    fn aligned_mount_reports_near_zero_corrections() {
        let opts = SimOptions {
            pole_alt_error_arcmin: 0.0,
            pole_az_error_arcmin: 0.0,
            solve_noise_arcsec: 0.0,
            ..SimOptions::default()
        };
        let result = run_with_sim(opts, from_degrees(30.0)).unwrap();
        assert!(result.alt_correction_arcsec.abs() < 2.0);
        assert!(result.az_correction_arcsec.abs() < 2.0);
    }

    #[test]
    fn tiny_baseline_rejected_before_hardware() {
        let mut mount = FakeMount::new();
        let mut camera = FakeCamera::new();
        let mut solver = ScriptedSolver::always_failing("unused");
        let cfg = PolarConfig::default();
        let site = SiteConfig::default();
        let camera_cfg = CameraConfig::default();
        let solver_cfg = SolverConfig::default();
        let mut service = PolarAlignService::new(
            &mut mount,
            &mut camera,
            &mut solver,
            &cfg,
            &site,
            &camera_cfg,
            &solver_cfg,
        );

        let err = service.run(from_degrees(0.5)).unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientBaseline { .. }));
        assert_eq!(camera.captures, 0);
        assert!(mount.slews.is_empty());
    }

    #[test]
    fn expired_deadline_aborts_between_steps() {
        let mut mount = FakeMount::new();
        let mut camera = FakeCamera::new();
        let mut solver = ScriptedSolver::always_failing("unused");
        let cfg = PolarConfig {
            timeout_s: Some(0.0),
            ..PolarConfig::default()
        };
        let site = SiteConfig::default();
        let camera_cfg = CameraConfig::default();
        let solver_cfg = SolverConfig::default();
        let mut service = PolarAlignService::new(
            &mut mount,
            &mut camera,
            &mut solver,
            &cfg,
            &site,
            &camera_cfg,
            &solver_cfg,
        );

        let err = service.run(from_degrees(30.0)).unwrap_err();
        assert!(matches!(err, ServiceError::Timeout(_)));
        // pose A never starts once the deadline is spent
        assert_eq!(camera.captures, 0);
        assert!(mount.slews.is_empty());
    }

    #[test]
    fn pose_a_solve_failure_fails_fast() {
        let mut mount = FakeMount::new();
        let mut camera = FakeCamera::new();
        let mut solver = ScriptedSolver::always_failing("clouds");
        let cfg = PolarConfig::default();
        let site = SiteConfig::default();
        let camera_cfg = CameraConfig::default();
        let solver_cfg = SolverConfig::default();
        let mut service = PolarAlignService::new(
            &mut mount,
            &mut camera,
            &mut solver,
            &cfg,
            &site,
            &camera_cfg,
            &solver_cfg,
        );

        let err = service.run(from_degrees(30.0)).unwrap_err();
        assert!(matches!(err, ServiceError::SolveFailed { attempts: 2, .. }));
        assert_eq!(camera.captures, 2);
        assert!(mount.slews.is_empty());
    }
}
