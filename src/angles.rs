//! Wrap-safe angle and coordinate arithmetic. All angles are radians, ICRS.

use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AngleError {
    #[error("declination {0} rad outside sane range (|dec| <= pi)")]
    DecOutOfRange(f64),
}

/// Equatorial coordinate in the ICRS frame. Time-independent; never carries
/// an implicit observation epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Equatorial {
    pub ra_rad: f64,
    pub dec_rad: f64,
}

impl Equatorial {
    pub fn new(ra_rad: f64, dec_rad: f64) -> Result<Self, AngleError> {
        Ok(Self {
            ra_rad: normalize_ra(ra_rad),
            dec_rad: clamp_dec(dec_rad)?,
        })
    }
}

/// Map any real radian value into [0, 2pi).
pub fn normalize_ra(rad: f64) -> f64 {
    let r = rad.rem_euclid(TAU);
    // rem_euclid can round up to TAU for tiny negative inputs
    if r >= TAU {
        0.0
    } else {
        r
    }
}

/// Map into [-pi/2, +pi/2]. Inputs beyond +-pi are rejected rather than
/// silently clamped; they indicate a caller bug, not a wrap artifact.
pub fn clamp_dec(rad: f64) -> Result<f64, AngleError> {
    if !rad.is_finite() || rad.abs() > PI {
        return Err(AngleError::DecOutOfRange(rad));
    }
    Ok(rad.clamp(-FRAC_PI_2, FRAC_PI_2))
}

/// Great-circle distance between two coordinates, in radians. Haversine
/// form, stable near the poles and the 0/2pi wrap.
pub fn angular_separation(a: &Equatorial, b: &Equatorial) -> f64 {
    let sd = ((b.dec_rad - a.dec_rad) / 2.0).sin();
    let sr = ((b.ra_rad - a.ra_rad) / 2.0).sin();
    let h = sd * sd + a.dec_rad.cos() * b.dec_rad.cos() * sr * sr;
    2.0 * h.sqrt().min(1.0).asin()
}

/// Minimal signed difference `target - current` on a circle, in (-pi, pi].
/// Corrections built from this always move the short way around.
pub fn signed_delta(target: f64, current: f64) -> f64 {
    let d = (target - current).rem_euclid(TAU);
    if d > PI {
        d - TAU
    } else {
        d
    }
}

pub fn to_arcsec(rad: f64) -> f64 {
    rad.to_degrees() * 3600.0
}

pub fn from_arcsec(arcsec: f64) -> f64 {
    (arcsec / 3600.0).to_radians()
}

pub fn from_degrees(deg: f64) -> f64 {
    deg.to_radians()
}

/// Format an RA-class angle as HH:MM:SS.ss.
pub fn format_hms(rad: f64, precision: usize) -> String {
    let hours = rad.to_degrees() / 15.0;
    let day = 24.0 * 3600.0;
    let total = round_to(hours.rem_euclid(24.0) * 3600.0, precision).rem_euclid(day);
    let h = (total / 3600.0).floor();
    let rem = total - h * 3600.0;
    let m = (rem / 60.0).floor();
    let s = rem - m * 60.0;
    format!(
        "{:02}:{:02}:{:0width$.precision$}",
        h as u32,
        m as u32,
        s,
        width = 3 + precision,
    )
}

/// Format a Dec-class angle as +DD:MM:SS.ss.
pub fn format_dms(rad: f64, precision: usize) -> String {
    let deg = rad.to_degrees();
    let sign = if deg < 0.0 { '-' } else { '+' };
    let total = round_to(deg.abs() * 3600.0, precision);
    let d = (total / 3600.0).floor();
    let rem = total - d * 3600.0;
    let m = (rem / 60.0).floor();
    let s = rem - m * 60.0;
    format!(
        "{}{:02}:{:02}:{:0width$.precision$}",
        sign,
        d as u32,
        m as u32,
        s,
        width = 3 + precision,
    )
}

fn round_to(value: f64, precision: usize) -> f64 {
    let f = 10f64.powi(precision as i32);
    (value * f).round() / f
}

// Unit-sphere helpers shared by the polar-align fit and the mount simulator.

pub fn unit_vector(c: &Equatorial) -> [f64; 3] {
    [
        c.ra_rad.cos() * c.dec_rad.cos(),
        c.ra_rad.sin() * c.dec_rad.cos(),
        c.dec_rad.sin(),
    ]
}

pub fn equatorial_from_vector(v: &[f64; 3]) -> Equatorial {
    let dec = v[2].clamp(-1.0, 1.0).asin();
    let ra = normalize_ra(v[1].atan2(v[0]));
    Equatorial {
        ra_rad: ra,
        dec_rad: dec,
    }
}

pub fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn cross(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub fn norm(v: &[f64; 3]) -> f64 {
    dot(v, v).sqrt()
}

pub fn normalized(v: &[f64; 3]) -> Option<[f64; 3]> {
    let n = norm(v);
    if n < 1e-12 {
        return None;
    }
    Some([v[0] / n, v[1] / n, v[2] / n])
}

/// Rodrigues rotation of `v` by `angle` radians about unit axis `k`.
pub fn rotate_about(v: &[f64; 3], k: &[f64; 3], angle: f64) -> [f64; 3] {
    let (s, c) = angle.sin_cos();
    let kxv = cross(k, v);
    let kdv = dot(k, v) * (1.0 - c);
    [
        v[0] * c + kxv[0] * s + k[0] * kdv,
        v[1] * c + kxv[1] * s + k[1] * kdv,
        v[2] * c + kxv[2] * s + k[2] * kdv,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_ra_range_and_idempotence() {
        for x in [
            -100.0, -TAU, -PI, -1e-17, 0.0, 1.0, PI, TAU, TAU + 0.5, 1e6,
        ] {
            let r = normalize_ra(x);
            assert!((0.0..TAU).contains(&r), "normalize_ra({x}) = {r}");
            assert_eq!(normalize_ra(r), r);
        }
    }

    #[test]
    fn clamp_dec_clamps_and_rejects() {
        assert_eq!(clamp_dec(0.3).unwrap(), 0.3);
        assert_eq!(clamp_dec(2.0).unwrap(), FRAC_PI_2);
        assert_eq!(clamp_dec(-2.0).unwrap(), -FRAC_PI_2);
        assert!(clamp_dec(3.5).is_err());
        assert!(clamp_dec(f64::NAN).is_err());
    }

    #[test]
    fn separation_symmetric_and_zero_on_wrap() {
        let a = Equatorial {
            ra_rad: 0.1,
            dec_rad: 0.5,
        };
        let b = Equatorial {
            ra_rad: 1.3,
            dec_rad: -0.2,
        };
        let ab = angular_separation(&a, &b);
        let ba = angular_separation(&b, &a);
        assert!((ab - ba).abs() < 1e-15);

        let wrapped = Equatorial {
            ra_rad: a.ra_rad + TAU,
            dec_rad: a.dec_rad,
        };
        assert!(angular_separation(&a, &wrapped) < 1e-9);
    }

    #[test]
    fn separation_stable_near_pole() {
        let a = Equatorial {
            ra_rad: 0.0,
            dec_rad: FRAC_PI_2 - 1e-8,
        };
        let b = Equatorial {
            ra_rad: PI,
            dec_rad: FRAC_PI_2 - 1e-8,
        };
        let sep = angular_separation(&a, &b);
        assert!((sep - 2e-8).abs() < 1e-10);
    }

    #[test]
    fn signed_delta_takes_short_way() {
        assert!((signed_delta(0.1, TAU - 0.1) - 0.2).abs() < 1e-12);
        assert!((signed_delta(TAU - 0.1, 0.1) + 0.2).abs() < 1e-12);
        assert!((signed_delta(1.0, 0.25) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn converters() {
        assert!((to_arcsec(from_degrees(1.0)) - 3600.0).abs() < 1e-9);
        assert!((from_arcsec(3600.0) - from_degrees(1.0)).abs() < 1e-15);
    }

    #[test]
    fn hms_formatting() {
        assert_eq!(format_hms(0.0, 2), "00:00:00.00");
        assert_eq!(format_hms(from_degrees(360.0), 2), "00:00:00.00");
        assert_eq!(format_hms(from_degrees(15.0), 1), "01:00:00.0");
        // rounding carry across the 24h wrap
        let rad = from_degrees((24.0 * 3600.0 - 0.04) / 240.0);
        assert_eq!(format_hms(rad, 1), "00:00:00.0");
    }

    #[test]
    fn dms_formatting() {
        assert_eq!(format_dms(from_degrees(10.0), 2), "+10:00:00.00");
        assert_eq!(format_dms(from_degrees(-10.0), 2), "-10:00:00.00");
        assert!(format_dms(from_degrees(-0.0001), 2).starts_with("-00:00:"));
    }

    #[test]
    fn rotation_round_trip() {
        let v = unit_vector(&Equatorial {
            ra_rad: 1.0,
            dec_rad: 0.4,
        });
        let k = [0.0, 0.0, 1.0];
        let r = rotate_about(&rotate_about(&v, &k, 0.7), &k, -0.7);
        for i in 0..3 {
            assert!((v[i] - r[i]).abs() < 1e-12);
        }
    }
}
