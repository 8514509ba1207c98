//! Two-pose mechanical-pole fit. Both field centres lie on a circle about
//! the mount's RA axis, separated by the commanded rotation; the closed
//! form below recovers the axis from that constraint alone.

use thiserror::Error;

use crate::angles::{
    angular_separation, cross, dot, equatorial_from_vector, from_degrees, normalized,
    rotate_about, unit_vector, Equatorial,
};

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("degenerate pose geometry: {0}")]
    Degenerate(String),
}

#[derive(Debug, Clone, Copy)]
pub struct PoleFit {
    /// Estimated mechanical pole, ICRS.
    pub pole: Equatorial,
    /// Angular radius from the pole to the field centres.
    pub radius_rad: f64,
    /// Geometry left unexplained by the fit.
    pub residual_rad: f64,
    pub confidence: f64,
}

const MIN_SEPARATION_RAD: f64 = 5e-6; // ~1 arcsec
const FULL_CONFIDENCE_ROTATION_RAD: f64 = std::f64::consts::FRAC_PI_6; // 30 deg

/// Fit the rotation axis that carries pose `a` to pose `b` under the
/// commanded RA rotation. Of the candidate axes the one nearest the
/// celestial pole of the observing hemisphere is the mount axis.
pub fn fit_mechanical_pole(
    a: &Equatorial,
    b: &Equatorial,
    rotation_rad: f64,
    northern: bool,
) -> Result<PoleFit, GeometryError> {
    let va = unit_vector(a);
    let vb = unit_vector(b);
    let separation = angular_separation(a, b);

    if separation < MIN_SEPARATION_RAD {
        return Err(GeometryError::Degenerate(
            "poses coincide; rotation produced no measurable motion".into(),
        ));
    }
    if std::f64::consts::PI - separation < from_degrees(1.0) {
        return Err(GeometryError::Degenerate(
            "poses are near-antipodal".into(),
        ));
    }

    // Any axis equidistant from both poses lies in the plane spanned by the
    // pose midpoint and the pose cross product.
    let sum = [va[0] + vb[0], va[1] + vb[1], va[2] + vb[2]];
    let mid = normalized(&sum).ok_or_else(|| {
        GeometryError::Degenerate("pose midpoint vanishes".into())
    })?;
    let perp = normalized(&cross(&va, &vb)).ok_or_else(|| {
        GeometryError::Degenerate("poses are collinear".into())
    })?;

    // chord relation: sin(sep/2) = sin(radius) * sin(|rotation|/2)
    let sin_half_rot = (rotation_rad / 2.0).sin().abs();
    if sin_half_rot < 1e-9 {
        return Err(GeometryError::Degenerate("zero rotation".into()));
    }
    let arg = ((separation / 2.0).sin() / sin_half_rot).min(1.0);
    let radius = arg.asin();

    let cos_theta = (radius.cos() / (separation / 2.0).cos()).clamp(-1.0, 1.0);
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();

    let celestial = if northern {
        [0.0, 0.0, 1.0]
    } else {
        [0.0, 0.0, -1.0]
    };

    // Four sign combinations; keep the axes that actually reproduce the
    // commanded rotation, then prefer the one nearest the celestial pole.
    let mut best: Option<([f64; 3], f64)> = None;
    for (ct, st) in [
        (cos_theta, sin_theta),
        (cos_theta, -sin_theta),
        (-cos_theta, sin_theta),
        (-cos_theta, -sin_theta),
    ] {
        let cand = [
            mid[0] * ct + perp[0] * st,
            mid[1] * ct + perp[1] * st,
            mid[2] * ct + perp[2] * st,
        ];
        let reconstructed = rotate_about(&va, &cand, rotation_rad);
        let err = dot(&reconstructed, &vb).clamp(-1.0, 1.0).acos();
        let replace = match &best {
            None => true,
            Some((prev, prev_err)) => {
                err < prev_err - 1e-9
                    || (err < prev_err + 1e-9 && dot(&cand, &celestial) > dot(prev, &celestial))
            }
        };
        if replace {
            best = Some((cand, err));
        }
    }
    let (axis, residual) = best.expect("candidate set is never empty");

    let baseline_term = (rotation_rad.abs() / FULL_CONFIDENCE_ROTATION_RAD).min(1.0);
    let residual_term = (1.0 - residual / from_degrees(0.5)).clamp(0.0, 1.0);
    let separation_term = (separation / from_degrees(0.1)).min(1.0);
    let confidence = (baseline_term * residual_term * separation_term).clamp(0.0, 1.0);

    Ok(PoleFit {
        pole: equatorial_from_vector(&axis),
        radius_rad: radius,
        residual_rad: residual,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angles::{from_arcsec, normalize_ra, to_arcsec};
    use std::f64::consts::FRAC_PI_2;

    /// Place two poses symmetrically about a known pole and check the fit
    /// recovers it.
    fn poses_about(pole: &Equatorial, radius_rad: f64, rotation_rad: f64) -> (Equatorial, Equatorial) {
        let p = unit_vector(pole);
        // any direction perpendicular to the pole
        let seed = if p[2].abs() < 0.9 {
            [0.0, 0.0, 1.0]
        } else {
            [1.0, 0.0, 0.0]
        };
        let u = normalized(&cross(&p, &seed)).unwrap();
        let start = rotate_about(&p, &u, radius_rad);
        let a = rotate_about(&start, &p, -rotation_rad / 2.0);
        let b = rotate_about(&start, &p, rotation_rad / 2.0);
        (
            equatorial_from_vector(&a),
            equatorial_from_vector(&b),
        )
    }

    #[test]
    fn recovers_offset_pole_exactly() {
        // pole 10 arcmin from the celestial pole
        let pole = Equatorial {
            ra_rad: 1.2,
            dec_rad: FRAC_PI_2 - from_arcsec(600.0),
        };
        let rotation = from_degrees(30.0);
        let (a, b) = poses_about(&pole, from_degrees(20.0), rotation);

        let fit = fit_mechanical_pole(&a, &b, rotation, true).unwrap();
        let miss = angular_separation(&fit.pole, &pole);
        assert!(to_arcsec(miss) < 1.0, "pole missed by {} arcsec", to_arcsec(miss));
        assert!(to_arcsec(fit.residual_rad) < 0.1);
        assert!(fit.confidence > 0.99, "confidence {}", fit.confidence);
        assert!((fit.radius_rad - from_degrees(20.0)).abs() < from_arcsec(5.0));
    }

    #[test]
    fn works_with_negative_rotation() {
        let pole = Equatorial {
            ra_rad: normalize_ra(-0.4),
            dec_rad: FRAC_PI_2 - from_arcsec(300.0),
        };
        let rotation = -from_degrees(25.0);
        let (a, b) = poses_about(&pole, from_degrees(15.0), rotation);
        let fit = fit_mechanical_pole(&a, &b, rotation, true).unwrap();
        assert!(to_arcsec(angular_separation(&fit.pole, &pole)) < 1.0);
    }

    #[test]
    fn coincident_poses_are_degenerate() {
        let a = Equatorial {
            ra_rad: 0.5,
            dec_rad: 0.7,
        };
        let err = fit_mechanical_pole(&a, &a, from_degrees(30.0), true).unwrap_err();
        assert!(matches!(err, GeometryError::Degenerate(_)));
    }

    #[test]
    fn small_rotation_lowers_confidence() {
        let pole = Equatorial {
            ra_rad: 0.3,
            dec_rad: FRAC_PI_2 - from_arcsec(600.0),
        };
        let small = from_degrees(3.0);
        let (a, b) = poses_about(&pole, from_degrees(20.0), small);
        let fit = fit_mechanical_pole(&a, &b, small, true).unwrap();
        assert!(fit.confidence < 0.2, "confidence {}", fit.confidence);
    }
}
