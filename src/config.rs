use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub camera: CameraConfig,
    pub solver: SolverConfig,
    #[serde(alias = "goto")]
    pub pointing: GotoConfig,
    pub polar: PolarConfig,
    pub guide: GuideConfig,
    pub sim: SimConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub latitude_deg: f64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { latitude_deg: 47.0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub exposure_s: f64,
    pub gain: Option<f64>,
    pub binning: Option<u32>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            exposure_s: 2.0,
            gain: None,
            binning: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub search_radius_deg: f64,
    pub timeout_s: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            search_radius_deg: 15.0,
            timeout_s: 60.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GotoConfig {
    pub tolerance_arcsec: f64,
    pub max_iterations: u32,
    /// Correction gain applied to each measured offset; below 1 damps
    /// overshoot on noisy solves.
    pub gain: f64,
    pub solve_failure_limit: u32,
    pub timeout_s: Option<f64>,
}

impl Default for GotoConfig {
    fn default() -> Self {
        Self {
            tolerance_arcsec: 30.0,
            max_iterations: 5,
            gain: 0.9,
            solve_failure_limit: 2,
            timeout_s: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolarConfig {
    pub rotation_deg: f64,
    pub min_rotation_deg: f64,
    pub solve_failure_limit: u32,
    pub timeout_s: Option<f64>,
}

impl Default for PolarConfig {
    fn default() -> Self {
        Self {
            rotation_deg: 30.0,
            min_rotation_deg: 1.0,
            solve_failure_limit: 2,
            timeout_s: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuideConfig {
    pub exposure_s: f64,
    pub cadence_ms: u64,
    pub aggression: f64,
    pub min_move_arcsec: f64,
    pub kp_ms_per_arcsec: f64,
    pub ki_ms_per_arcsec: f64,
    pub max_pulse_ms: f64,
    /// Integral resets when the error flips sign by more than this.
    pub reversal_arcsec: f64,
    /// Guide camera plate scale; converts centroid offsets to angles.
    pub pixel_scale_arcsec: f64,
    pub detection_sigma: f64,
    pub min_flux: f64,
    pub star_lost_frames: u32,
    pub star_lost_timeout_frames: u32,
    pub calibration_noise_floor_px: f64,
    pub rms_window: usize,
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            exposure_s: 1.0,
            cadence_ms: 1000,
            aggression: 0.7,
            min_move_arcsec: 0.2,
            kp_ms_per_arcsec: 100.0,
            ki_ms_per_arcsec: 0.0,
            max_pulse_ms: 1000.0,
            reversal_arcsec: 0.5,
            pixel_scale_arcsec: 2.0,
            detection_sigma: 5.0,
            min_flux: 100.0,
            star_lost_frames: 3,
            star_lost_timeout_frames: 20,
            calibration_noise_floor_px: 0.5,
            rms_window: 50,
        }
    }
}

/// Knobs for the built-in simulator rig.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub pole_alt_error_arcmin: f64,
    pub pole_az_error_arcmin: f64,
    pub drift_ra_arcsec_per_s: f64,
    pub drift_dec_arcsec_per_s: f64,
    pub solve_noise_arcsec: f64,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            pole_alt_error_arcmin: 10.0,
            pole_az_error_arcmin: -6.0,
            drift_ra_arcsec_per_s: 0.8,
            drift_dec_arcsec_per_s: -0.3,
            solve_noise_arcsec: 0.0,
            seed: 7,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
