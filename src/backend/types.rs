use chrono::{DateTime, Utc};

use crate::angles::Equatorial;

/// A captured frame. The pixel accessor is consumed only by the guide-star
/// tracker; everything else treats images as opaque handles.
#[derive(Debug, Clone)]
pub struct Image {
    pub width_px: u32,
    pub height_px: u32,
    pub timestamp: DateTime<Utc>,
    pub exposure_s: f64,
    data: Vec<u16>,
}

impl Image {
    pub fn from_pixels(width_px: u32, height_px: u32, exposure_s: f64, data: Vec<u16>) -> Self {
        debug_assert_eq!(data.len(), (width_px * height_px) as usize);
        Self {
            width_px,
            height_px,
            timestamp: Utc::now(),
            exposure_s,
            data,
        }
    }

    /// Pixel value at (x, y). Out-of-bounds reads return 0 so centroid
    /// windows may overlap the frame edge.
    pub fn sample(&self, x: i64, y: i64) -> u16 {
        if x < 0 || y < 0 || x >= self.width_px as i64 || y >= self.height_px as i64 {
            return 0;
        }
        self.data[(y as u32 * self.width_px + x as u32) as usize]
    }

    pub fn pixels(&self) -> &[u16] {
        &self.data
    }
}

/// Optional camera capture settings beyond the exposure length.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureSettings {
    pub gain: Option<f64>,
    pub binning: Option<u32>,
    /// (x, y, width, height) in unbinned pixels.
    pub roi: Option<(u32, u32, u32, u32)>,
}

#[derive(Debug, Clone)]
pub struct SolveRequest<'a> {
    pub image: &'a Image,
    pub ra_hint_rad: Option<f64>,
    pub dec_hint_rad: Option<f64>,
    pub scale_hint_arcsec: Option<f64>,
    pub search_radius_rad: Option<f64>,
    pub timeout_s: Option<f64>,
}

impl<'a> SolveRequest<'a> {
    pub fn new(image: &'a Image) -> Self {
        Self {
            image,
            ra_hint_rad: None,
            dec_hint_rad: None,
            scale_hint_arcsec: None,
            search_radius_rad: None,
            timeout_s: None,
        }
    }
}

/// Astrometric solution for one frame. Numeric fields exist only on
/// success, so a failed solve cannot be read by accident.
#[derive(Debug, Clone)]
pub struct SolveResult {
    solution: Option<Solution>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Solution {
    pub coord: Equatorial,
    pub pixel_scale_arcsec: f64,
    pub rotation_rad: f64,
    pub rms_arcsec: f64,
    pub num_stars: u32,
}

impl SolveResult {
    pub fn solved(solution: Solution) -> Self {
        Self {
            solution: Some(solution),
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            solution: None,
            message: Some(message.into()),
        }
    }

    pub fn success(&self) -> bool {
        self.solution.is_some()
    }

    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }
}

/// Mount state as reported by the boundary. Coordinates are ICRS; the
/// boundary has already undone any apparent-frame conversion.
#[derive(Debug, Clone, Copy)]
pub struct MountState {
    pub connected: bool,
    pub ra_rad: f64,
    pub dec_rad: f64,
    pub tracking: bool,
    pub slewing: bool,
    pub timestamp: DateTime<Utc>,
}
