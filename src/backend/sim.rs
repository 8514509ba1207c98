//! Deterministic simulator backends. One shared sky/mount state drives all
//! three ports, so a slew commanded through the mount handle is visible to
//! the solver and the guide camera on their next call. Seeded RNG keeps
//! runs reproducible.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::angles::{
    cross, dot, equatorial_from_vector, from_arcsec, normalize_ra, normalized, rotate_about,
    unit_vector, Equatorial,
};
use crate::backend::{
    BackendError, CameraPort, CaptureSettings, Image, MountPort, MountState, Solution,
    SolveRequest, SolveResult, SolverPort,
};

const SIDEREAL_RATE_RAD_PER_S: f64 = 7.292115e-5;
const READOUT_S: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Observer latitude; the simulated mechanical pole is placed relative
    /// to the north celestial pole. Northern sites only.
    pub latitude_deg: f64,
    pub lst0_deg: f64,
    /// Mechanical polar-axis error, local alt/az components.
    pub pole_alt_error_arcmin: f64,
    pub pole_az_error_arcmin: f64,
    /// Uncorrected tracking drift seen by the guide camera.
    pub drift_ra_arcsec_per_s: f64,
    pub drift_dec_arcsec_per_s: f64,
    /// 1-sigma noise added to solved field centres.
    pub solve_noise_arcsec: f64,
    pub guide_rate_arcsec_per_ms: f64,
    pub pixel_scale_arcsec: f64,
    pub width_px: u32,
    pub height_px: u32,
    pub seed: u64,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            latitude_deg: 47.0,
            lst0_deg: 0.0,
            pole_alt_error_arcmin: 10.0,
            pole_az_error_arcmin: -6.0,
            drift_ra_arcsec_per_s: 0.8,
            drift_dec_arcsec_per_s: -0.3,
            solve_noise_arcsec: 0.0,
            guide_rate_arcsec_per_ms: 0.0075,
            pixel_scale_arcsec: 2.0,
            width_px: 96,
            height_px: 96,
            seed: 7,
        }
    }
}

struct SimState {
    opts: SimOptions,
    clock_s: f64,
    commanded: Equatorial,
    tracking: bool,
    parked: bool,
    /// Accumulated pulse-guide corrections, arcsec per axis.
    guide_ra_arcsec: f64,
    guide_dec_arcsec: f64,
    rng: StdRng,
}

impl SimState {
    fn lst(&self) -> f64 {
        normalize_ra(self.opts.lst0_deg.to_radians() + self.clock_s * SIDEREAL_RATE_RAD_PER_S)
    }

    /// Mechanical pole unit vector: the celestial pole displaced by the
    /// configured alt/az axis errors at the initial sidereal time.
    fn mechanical_pole(&self) -> [f64; 3] {
        let lst = self.opts.lst0_deg.to_radians();
        let e = from_arcsec(self.opts.pole_alt_error_arcmin * 60.0);
        let a = from_arcsec(self.opts.pole_az_error_arcmin * 60.0)
            * self.opts.latitude_deg.to_radians().cos();
        // tangent directions at the pole: toward the zenith meridian, and east
        let meridian = [lst.cos(), lst.sin(), 0.0];
        let east = [-lst.sin(), lst.cos(), 0.0];
        let v = [
            e * meridian[0] + a * east[0],
            e * meridian[1] + a * east[1],
            1.0,
        ];
        normalized(&v).unwrap_or([0.0, 0.0, 1.0])
    }

    /// Where the optical axis actually points for the commanded coordinate.
    fn true_field(&self) -> Equatorial {
        let z = [0.0, 0.0, 1.0];
        let pole = self.mechanical_pole();
        let axis = match normalized(&cross(&z, &pole)) {
            Some(axis) => axis,
            None => return self.commanded,
        };
        let angle = dot(&z, &pole).clamp(-1.0, 1.0).acos();
        let v = rotate_about(&unit_vector(&self.commanded), &axis, angle);
        equatorial_from_vector(&v)
    }

    /// Guide-star tracking error, arcsec per axis: drift minus issued
    /// corrections.
    fn guide_error_arcsec(&self) -> (f64, f64) {
        (
            self.opts.drift_ra_arcsec_per_s * self.clock_s + self.guide_ra_arcsec,
            self.opts.drift_dec_arcsec_per_s * self.clock_s + self.guide_dec_arcsec,
        )
    }

    fn gaussian(&mut self, sigma: f64) -> f64 {
        if sigma <= 0.0 {
            return 0.0;
        }
        match Normal::new(0.0, sigma) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => 0.0,
        }
    }
}

/// Handle factory for the three simulator ports sharing one state.
pub struct SimRig {
    state: Arc<Mutex<SimState>>,
}

impl SimRig {
    pub fn new(opts: SimOptions) -> Self {
        let seed = opts.seed;
        let state = SimState {
            opts,
            clock_s: 0.0,
            commanded: Equatorial {
                ra_rad: 0.0,
                dec_rad: 0.0,
            },
            tracking: true,
            parked: false,
            guide_ra_arcsec: 0.0,
            guide_dec_arcsec: 0.0,
            rng: StdRng::seed_from_u64(seed),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn camera(&self) -> SimCamera {
        SimCamera {
            state: self.state.clone(),
            connected: false,
        }
    }

    pub fn solver(&self) -> SimSolver {
        SimSolver {
            state: self.state.clone(),
        }
    }

    pub fn mount(&self) -> SimMount {
        SimMount {
            state: self.state.clone(),
            connected: false,
        }
    }

    /// Remaining guide error, arcsec per axis. Test observability hook.
    pub fn guide_error_arcsec(&self) -> (f64, f64) {
        self.state.lock().unwrap().guide_error_arcsec()
    }
}

pub struct SimCamera {
    state: Arc<Mutex<SimState>>,
    connected: bool,
}

impl CameraPort for SimCamera {
    fn connect(&mut self) -> Result<(), BackendError> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BackendError> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn capture(
        &mut self,
        exposure_s: f64,
        _settings: &CaptureSettings,
    ) -> Result<Image, BackendError> {
        if exposure_s <= 0.0 {
            return Err(BackendError::Camera {
                reason: "bad_exposure",
                detail: format!("exposure {exposure_s}s"),
            });
        }
        self.connected = true;
        let mut st = self.state.lock().unwrap();
        st.clock_s += exposure_s + READOUT_S;

        let (err_ra, err_dec) = st.guide_error_arcsec();
        let (w, h) = (st.opts.width_px, st.opts.height_px);
        let scale = st.opts.pixel_scale_arcsec;
        let cx = w as f64 / 2.0 + err_ra / scale;
        let cy = h as f64 / 2.0 + err_dec / scale;

        let mut data = vec![0u16; (w * h) as usize];
        let sigma = 1.5f64;
        let peak = 18000.0 * exposure_s.min(4.0);
        for y in 0..h {
            for x in 0..w {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                let star = peak * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
                let noise = st.gaussian(12.0);
                let value = 400.0 + star + noise;
                data[(y * w + x) as usize] = value.clamp(0.0, u16::MAX as f64) as u16;
            }
        }
        drop(st);
        Ok(Image::from_pixels(w, h, exposure_s, data))
    }
}

pub struct SimSolver {
    state: Arc<Mutex<SimState>>,
}

impl SolverPort for SimSolver {
    fn solve(&mut self, _request: &SolveRequest<'_>) -> Result<SolveResult, BackendError> {
        let mut st = self.state.lock().unwrap();
        let field = st.true_field();
        let noise = from_arcsec(st.opts.solve_noise_arcsec);
        let ra_noise = st.gaussian(noise) / field.dec_rad.cos().abs().max(1e-6);
        let dec_noise = st.gaussian(noise);
        let scale = st.opts.pixel_scale_arcsec;
        Ok(SolveResult::solved(Solution {
            coord: Equatorial {
                ra_rad: normalize_ra(field.ra_rad + ra_noise),
                dec_rad: (field.dec_rad + dec_noise).clamp(
                    -std::f64::consts::FRAC_PI_2,
                    std::f64::consts::FRAC_PI_2,
                ),
            },
            pixel_scale_arcsec: scale,
            rotation_rad: 0.0,
            rms_arcsec: 0.4,
            num_stars: 42,
        }))
    }
}

pub struct SimMount {
    state: Arc<Mutex<SimState>>,
    connected: bool,
}

impl MountPort for SimMount {
    fn connect(&mut self) -> Result<(), BackendError> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BackendError> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn get_state(&mut self) -> Result<MountState, BackendError> {
        self.connected = true;
        let st = self.state.lock().unwrap();
        Ok(MountState {
            connected: true,
            ra_rad: st.commanded.ra_rad,
            dec_rad: st.commanded.dec_rad,
            tracking: st.tracking,
            slewing: false,
            timestamp: Utc::now(),
        })
    }

    fn slew_to(&mut self, ra_rad: f64, dec_rad: f64) -> Result<(), BackendError> {
        self.connected = true;
        let mut st = self.state.lock().unwrap();
        if st.parked {
            return Err(BackendError::Mount {
                reason: "parked",
                detail: "slew rejected while parked".into(),
            });
        }
        st.commanded = Equatorial {
            ra_rad: normalize_ra(ra_rad),
            dec_rad,
        };
        // simulated slews settle instantly
        st.clock_s += 2.0;
        Ok(())
    }

    fn sync(&mut self, ra_rad: f64, dec_rad: f64) -> Result<(), BackendError> {
        self.connected = true;
        let mut st = self.state.lock().unwrap();
        st.commanded = Equatorial {
            ra_rad: normalize_ra(ra_rad),
            dec_rad,
        };
        Ok(())
    }

    fn set_tracking(&mut self, enabled: bool) -> Result<(), BackendError> {
        self.connected = true;
        self.state.lock().unwrap().tracking = enabled;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        if !self.connected {
            return Ok(());
        }
        Ok(())
    }

    fn park(&mut self) -> Result<(), BackendError> {
        self.connected = true;
        let mut st = self.state.lock().unwrap();
        st.parked = true;
        st.tracking = false;
        Ok(())
    }

    fn pulse_guide(&mut self, ra_ms: f64, dec_ms: f64) -> Result<(), BackendError> {
        self.connected = true;
        let mut st = self.state.lock().unwrap();
        let rate = st.opts.guide_rate_arcsec_per_ms;
        st.guide_ra_arcsec += ra_ms * rate;
        st.guide_dec_arcsec += dec_ms * rate;
        st.clock_s += ra_ms.abs().max(dec_ms.abs()) / 1000.0;
        Ok(())
    }

    fn sidereal_time(&mut self) -> Result<f64, BackendError> {
        self.connected = true;
        Ok(self.state.lock().unwrap().lst())
    }
}
