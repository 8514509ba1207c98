//! Deterministic scripted doubles for service tests. Unlike the simulator
//! rig these have no physics: they answer exactly what the test scripted.

use chrono::Utc;
use std::collections::VecDeque;

use crate::backend::{
    BackendError, CameraPort, CaptureSettings, Image, MountPort, MountState, SolveRequest,
    SolveResult, SolverPort,
};

pub struct FakeCamera {
    pub captures: u32,
    connected: bool,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self {
            captures: 0,
            connected: false,
        }
    }
}

impl CameraPort for FakeCamera {
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
        self.captures += 1;
        Ok(Image::from_pixels(8, 8, exposure_s, vec![0; 64]))
    }
}

pub struct ScriptedSolver {
    pub calls: u32,
    script: VecDeque<SolveResult>,
}

impl ScriptedSolver {
    pub fn new(script: Vec<SolveResult>) -> Self {
        Self {
            calls: 0,
            script: script.into(),
        }
    }

    /// Repeats the same failure forever.
    pub fn always_failing(message: &str) -> Self {
        let mut solver = Self::new(vec![]);
        solver.script.push_back(SolveResult::failed(message));
        solver
    }
}

impl SolverPort for ScriptedSolver {
    fn solve(&mut self, _request: &SolveRequest<'_>) -> Result<SolveResult, BackendError> {
        self.calls += 1;
        match self.script.len() {
            0 => Ok(SolveResult::failed("script exhausted")),
            1 => Ok(self.script[0].clone()),
            _ => Ok(self.script.pop_front().expect("non-empty")),
        }
    }
}

pub struct FakeMount {
    pub slews: Vec<(f64, f64)>,
    pub pulses: Vec<(f64, f64)>,
    pub ra_rad: f64,
    pub dec_rad: f64,
    pub tracking: bool,
    pub lst_rad: f64,
    connected: bool,
}

impl FakeMount {
    pub fn new() -> Self {
        Self {
            slews: Vec::new(),
            pulses: Vec::new(),
            ra_rad: 0.0,
            dec_rad: 0.0,
            tracking: true,
            lst_rad: 0.0,
            connected: false,
        }
    }
}

impl MountPort for FakeMount {
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
        Ok(MountState {
            connected: true,
            ra_rad: self.ra_rad,
            dec_rad: self.dec_rad,
            tracking: self.tracking,
            slewing: false,
            timestamp: Utc::now(),
        })
    }

    fn slew_to(&mut self, ra_rad: f64, dec_rad: f64) -> Result<(), BackendError> {
        self.connected = true;
        self.slews.push((ra_rad, dec_rad));
        self.ra_rad = ra_rad;
        self.dec_rad = dec_rad;
        Ok(())
    }

    fn sync(&mut self, ra_rad: f64, dec_rad: f64) -> Result<(), BackendError> {
        self.connected = true;
        self.ra_rad = ra_rad;
        self.dec_rad = dec_rad;
        Ok(())
    }

    fn set_tracking(&mut self, enabled: bool) -> Result<(), BackendError> {
        self.connected = true;
        self.tracking = enabled;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn park(&mut self) -> Result<(), BackendError> {
        self.connected = true;
        self.tracking = false;
        Ok(())
    }

    fn pulse_guide(&mut self, ra_ms: f64, dec_ms: f64) -> Result<(), BackendError> {
        self.connected = true;
        self.pulses.push((ra_ms, dec_ms));
        Ok(())
    }

    fn sidereal_time(&mut self) -> Result<f64, BackendError> {
        self.connected = true;
        Ok(self.lst_rad)
    }
}
