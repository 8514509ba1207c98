//! Per-axis P/PI controller and the trailing RMS window.

use std::collections::VecDeque;

/// One axis of the guide controller. Output is a pulse length in
/// milliseconds, clamped symmetrically; the caller owns direction mapping.
#[derive(Debug)]
pub struct AxisController {
    kp_ms_per_arcsec: f64,
    ki_ms_per_arcsec: f64,
    max_pulse_ms: f64,
    reversal_arcsec: f64,
    integral_arcsec: f64,
    last_error_arcsec: Option<f64>,
}

impl AxisController {
    pub fn new(
        kp_ms_per_arcsec: f64,
        ki_ms_per_arcsec: f64,
        max_pulse_ms: f64,
        reversal_arcsec: f64,
    ) -> Self {
        Self {
            kp_ms_per_arcsec,
            ki_ms_per_arcsec,
            max_pulse_ms,
            reversal_arcsec,
            integral_arcsec: 0.0,
            last_error_arcsec: None,
        }
    }

    /// Advance one tick of active tracking. Integral windup is cut on a
    /// sign reversal larger than the reversal threshold.
    pub fn update(&mut self, error_arcsec: f64, aggression: f64) -> f64 {
        if let Some(last) = self.last_error_arcsec {
            if last * error_arcsec < 0.0 && error_arcsec.abs() > self.reversal_arcsec {
                self.integral_arcsec = 0.0;
            }
        }
        self.integral_arcsec += error_arcsec;
        self.last_error_arcsec = Some(error_arcsec);

        let raw = self.kp_ms_per_arcsec * aggression * error_arcsec
            + self.ki_ms_per_arcsec * self.integral_arcsec;
        raw.clamp(-self.max_pulse_ms, self.max_pulse_ms)
    }

    /// Drop accumulated state; called on star loss.
    pub fn reset(&mut self) {
        self.integral_arcsec = 0.0;
        self.last_error_arcsec = None;
    }
}

/// Running RMS over the trailing N error samples.
#[derive(Debug)]
pub struct RmsWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RmsWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, error_arcsec: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(error_arcsec);
    }

    pub fn rms(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum_sq: f64 = self.samples.iter().map(|e| e * e).sum();
        Some((sum_sq / self.samples.len() as f64).sqrt())
    }
}
