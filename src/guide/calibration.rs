//! Guide calibration: pulse each axis, measure the centroid displacement,
//! derive arcsec-per-millisecond scales and direction signs.

use serde::Serialize;

use crate::backend::{CameraPort, CaptureSettings, MountPort};
use crate::config::GuideConfig;
use crate::error::ServiceError;
use crate::guide::tracker::{StarTrack, StarTracker};

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationResult {
    pub ra_scale_arcsec_per_ms: f64,
    pub dec_scale_arcsec_per_ms: f64,
    /// +1 when a positive pulse moves the star toward +x/+y.
    pub ra_sign: f64,
    pub dec_sign: f64,
    pub valid: bool,
}

enum Axis {
    Ra,
    Dec,
}

pub fn run_calibration(
    camera: &mut dyn CameraPort,
    mount: &mut dyn MountPort,
    cfg: &GuideConfig,
    duration_s: f64,
) -> Result<CalibrationResult, ServiceError> {
    if !(duration_s > 0.0) {
        return Err(ServiceError::InvalidConfig(format!(
            "calibration duration must be positive, got {duration_s}"
        )));
    }
    let pulse_ms = duration_s * 1000.0;
    let tracker = StarTracker::new(cfg.detection_sigma, cfg.min_flux);

    let reference = detect_star(camera, &tracker, cfg)?;
    log::info!(
        "calibration: reference star at ({:.2}, {:.2})",
        reference.x_px,
        reference.y_px
    );

    let (ra_scale, ra_sign, after_ra) =
        calibrate_axis(camera, mount, &tracker, cfg, Axis::Ra, pulse_ms, &reference)?;
    let (dec_scale, dec_sign, _) =
        calibrate_axis(camera, mount, &tracker, cfg, Axis::Dec, pulse_ms, &after_ra)?;

    let result = CalibrationResult {
        ra_scale_arcsec_per_ms: ra_scale,
        dec_scale_arcsec_per_ms: dec_scale,
        ra_sign,
        dec_sign,
        valid: true,
    };
    log::info!(
        "calibration: ra {:.4} arcsec/ms (sign {:+.0}), dec {:.4} arcsec/ms (sign {:+.0})",
        result.ra_scale_arcsec_per_ms,
        result.ra_sign,
        result.dec_scale_arcsec_per_ms,
        result.dec_sign
    );
    Ok(result)
}

fn calibrate_axis(
    camera: &mut dyn CameraPort,
    mount: &mut dyn MountPort,
    tracker: &StarTracker,
    cfg: &GuideConfig,
    axis: Axis,
    pulse_ms: f64,
    reference: &StarTrack,
) -> Result<(f64, f64, StarTrack), ServiceError> {
    let (name, ra_ms, dec_ms) = match axis {
        Axis::Ra => ("RA", pulse_ms, 0.0),
        Axis::Dec => ("DEC", 0.0, pulse_ms),
    };
    mount.pulse_guide(ra_ms, dec_ms)?;
    let after = detect_star(camera, tracker, cfg)?;

    let displacement_px = match axis {
        Axis::Ra => after.x_px - reference.x_px,
        Axis::Dec => after.y_px - reference.y_px,
    };
    // a displacement at the noise floor would put garbage in the divisor
    if displacement_px.abs() <= cfg.calibration_noise_floor_px {
        return Err(ServiceError::CalibrationFailed(format!(
            "{name} pulse of {pulse_ms:.0} ms moved the star only {displacement_px:.2} px, \
             at or below the {:.2} px noise floor",
            cfg.calibration_noise_floor_px
        )));
    }

    let scale = displacement_px.abs() * cfg.pixel_scale_arcsec / pulse_ms;
    Ok((scale, displacement_px.signum(), after))
}

fn detect_star(
    camera: &mut dyn CameraPort,
    tracker: &StarTracker,
    cfg: &GuideConfig,
) -> Result<StarTrack, ServiceError> {
    let image = camera.capture(cfg.exposure_s, &CaptureSettings::default())?;
    let track = tracker.detect(&image);
    if !track.found {
        return Err(ServiceError::CalibrationFailed(
            "no guide star detected".into(),
        ));
    }
    Ok(track)
}
