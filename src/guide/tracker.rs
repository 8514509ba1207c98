//! Guide-star detection: sigma-threshold above background, then an
//! intensity-weighted centroid around the brightest pixel.

use crate::backend::Image;

/// Per-frame detection result. Recreated on every capture; never carried
/// across ticks except as the calibration reference.
#[derive(Debug, Clone, Copy)]
pub struct StarTrack {
    pub x_px: f64,
    pub y_px: f64,
    pub flux: f64,
    pub confidence: f64,
    pub found: bool,
}

impl StarTrack {
    fn lost() -> Self {
        Self {
            x_px: 0.0,
            y_px: 0.0,
            flux: 0.0,
            confidence: 0.0,
            found: false,
        }
    }
}

pub struct StarTracker {
    detection_sigma: f64,
    min_flux: f64,
}

const CENTROID_RADIUS: i64 = 5;

impl StarTracker {
    pub fn new(detection_sigma: f64, min_flux: f64) -> Self {
        Self {
            detection_sigma,
            min_flux,
        }
    }

    pub fn detect(&self, image: &Image) -> StarTrack {
        let pixels = image.pixels();
        if pixels.is_empty() {
            return StarTrack::lost();
        }

        let n = pixels.len() as f64;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for &p in pixels {
            let v = p as f64;
            sum += v;
            sum_sq += v * v;
        }
        let mean = sum / n;
        let variance = (sum_sq / n - mean * mean).max(0.0);
        let threshold = mean + self.detection_sigma * variance.sqrt();

        let (mut peak_idx, mut peak) = (0usize, 0u16);
        for (i, &p) in pixels.iter().enumerate() {
            if p > peak {
                peak = p;
                peak_idx = i;
            }
        }
        if (peak as f64) <= threshold {
            return StarTrack::lost();
        }

        let px = (peak_idx as u32 % image.width_px) as i64;
        let py = (peak_idx as u32 / image.width_px) as i64;

        let mut flux = 0.0;
        let mut wx = 0.0;
        let mut wy = 0.0;
        for dy in -CENTROID_RADIUS..=CENTROID_RADIUS {
            for dx in -CENTROID_RADIUS..=CENTROID_RADIUS {
                let v = image.sample(px + dx, py + dy) as f64 - mean;
                if v <= 0.0 {
                    continue;
                }
                flux += v;
                wx += v * (px + dx) as f64;
                wy += v * (py + dy) as f64;
            }
        }
        if flux < self.min_flux {
            return StarTrack::lost();
        }

        StarTrack {
            x_px: wx / flux,
            y_px: wy / flux,
            flux,
            confidence: ((peak as f64 - threshold) / peak as f64).clamp(0.0, 1.0),
            found: true,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_frames {
    use crate::backend::Image;

    /// Gaussian star on a flat background.
    pub fn star_frame(width: u32, height: u32, cx: f64, cy: f64) -> Image {
        let sigma = 1.5f64;
        let mut data = vec![0u16; (width * height) as usize];
        for y in 0..height {
            for x in 0..width {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                let star = 12000.0 * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
                data[(y * width + x) as usize] = (100.0 + star) as u16;
            }
        }
        Image::from_pixels(width, height, 1.0, data)
    }

    pub fn dark_frame(width: u32, height: u32) -> Image {
        Image::from_pixels(width, height, 1.0, vec![100; (width * height) as usize])
    }
}
