//! Continuous guiding: a fixed-cadence worker task that captures, tracks
//! the guide star, and issues pulse corrections. Readers only ever see an
//! immutable published snapshot; all mutating state lives in the task.

mod calibration;
mod controller;
mod tracker;

pub use calibration::{run_calibration, CalibrationResult};
pub use controller::{AxisController, RmsWindow};
pub use tracker::{StarTrack, StarTracker};

use serde::Serialize;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};

use crate::backend::{CameraPort, CaptureSettings, MountPort};
use crate::config::GuideConfig;
use crate::error::ServiceError;

#[derive(Debug, Clone, Serialize)]
pub struct GuidingStatus {
    pub running: bool,
    pub rms_arcsec: Option<f64>,
    pub star_lost: bool,
    pub last_error_arcsec: Option<f64>,
}

impl GuidingStatus {
    fn idle() -> Self {
        Self {
            running: false,
            rms_arcsec: None,
            star_lost: false,
            last_error_arcsec: None,
        }
    }
}

#[derive(Debug)]
struct Shared {
    status: GuidingStatus,
}

struct WorkerHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<Result<(), ServiceError>>,
}

pub struct Guider {
    cfg: GuideConfig,
    calibration: Option<CalibrationResult>,
    shared: Arc<StdMutex<Shared>>,
    worker: Option<WorkerHandle>,
}

impl Guider {
    pub fn new(cfg: GuideConfig) -> Self {
        Self {
            cfg,
            calibration: None,
            shared: Arc::new(StdMutex::new(Shared {
                status: GuidingStatus::idle(),
            })),
            worker: None,
        }
    }

    pub fn calibration(&self) -> Option<&CalibrationResult> {
        self.calibration.as_ref()
    }

    /// Pulse each axis and measure the response. Must complete before
    /// `start`; rejected while the loop is running.
    pub fn calibrate(
        &mut self,
        camera: &mut dyn CameraPort,
        mount: &mut dyn MountPort,
        duration_s: f64,
    ) -> Result<CalibrationResult, ServiceError> {
        if self.worker.is_some() {
            return Err(ServiceError::ResourceBusy);
        }
        let result = run_calibration(camera, mount, &self.cfg, duration_s)?;
        self.calibration = Some(result.clone());
        Ok(result)
    }

    /// Spawn the guiding worker. The ports move into the task; they come
    /// back only by building fresh handles.
    pub fn start(
        &mut self,
        camera: Box<dyn CameraPort>,
        mount: Box<dyn MountPort>,
        aggression: f64,
        min_move_arcsec: f64,
    ) -> Result<(), ServiceError> {
        if self.worker.is_some() {
            return Err(ServiceError::ResourceBusy);
        }
        if !(0.0..=1.0).contains(&aggression) {
            return Err(ServiceError::InvalidConfig(format!(
                "aggression must be in [0, 1], got {aggression}"
            )));
        }
        if min_move_arcsec < 0.0 {
            return Err(ServiceError::InvalidConfig(format!(
                "min_move_arcsec must be non-negative, got {min_move_arcsec}"
            )));
        }
        let calibration = self
            .calibration
            .clone()
            .filter(|c| c.valid)
            .ok_or_else(|| {
                ServiceError::InvalidConfig("guiding requires a valid calibration".into())
            })?;

        let shared = self.shared.clone();
        let cfg = self.cfg.clone();
        let (stop_tx, stop_rx) = oneshot::channel();

        shared.lock().unwrap().status = GuidingStatus {
            running: true,
            rms_arcsec: None,
            star_lost: false,
            last_error_arcsec: None,
        };

        let join = tokio::spawn({
            let shared = shared.clone();
            async move {
                let result = run_guide_loop(
                    shared.clone(),
                    camera,
                    mount,
                    calibration,
                    cfg,
                    aggression,
                    min_move_arcsec,
                    stop_rx,
                )
                .await;
                let mut locked = shared.lock().unwrap();
                locked.status.running = false;
                if let Err(e) = &result {
                    log::error!("guiding stopped: {e}");
                }
                result
            }
        });

        self.worker = Some(WorkerHandle { stop_tx, join });
        Ok(())
    }

    /// Halt the loop and discard controller state. A no-op success when
    /// nothing is running.
    pub async fn stop(&mut self) -> Result<(), ServiceError> {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.join.await;
        }
        let mut locked = self.shared.lock().unwrap();
        locked.status.running = false;
        locked.status.star_lost = false;
        Ok(())
    }

    /// The most recently published snapshot; never touches live loop state.
    pub fn status(&self) -> GuidingStatus {
        self.shared.lock().unwrap().status.clone()
    }
}

fn stop_requested(stop_rx: &mut oneshot::Receiver<()>) -> bool {
    use oneshot::error::TryRecvError;
    match stop_rx.try_recv() {
        Ok(()) => true,
        Err(TryRecvError::Closed) => true,
        Err(TryRecvError::Empty) => false,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_guide_loop(
    shared: Arc<StdMutex<Shared>>,
    mut camera: Box<dyn CameraPort>,
    mut mount: Box<dyn MountPort>,
    calibration: CalibrationResult,
    cfg: GuideConfig,
    aggression: f64,
    min_move_arcsec: f64,
    mut stop_rx: oneshot::Receiver<()>,
) -> Result<(), ServiceError> {
    let tracker = StarTracker::new(cfg.detection_sigma, cfg.min_flux);
    let mut ra_ctl = AxisController::new(
        cfg.kp_ms_per_arcsec,
        cfg.ki_ms_per_arcsec,
        cfg.max_pulse_ms,
        cfg.reversal_arcsec,
    );
    let mut dec_ctl = AxisController::new(
        cfg.kp_ms_per_arcsec,
        cfg.ki_ms_per_arcsec,
        cfg.max_pulse_ms,
        cfg.reversal_arcsec,
    );
    let mut rms = RmsWindow::new(cfg.rms_window);
    let mut reference: Option<(f64, f64)> = None;
    let mut misses = 0u32;
    let mut star_lost = false;

    let period = Duration::from_millis(cfg.cadence_ms);
    let mut next_tick = Instant::now();

    loop {
        let should_stop = tokio::select! {
            _ = sleep_until(next_tick) => false,
            _ = &mut stop_rx => true,
        };
        if should_stop {
            log::info!("guiding: stop requested");
            return Ok(());
        }
        // bounded lag: an overrun tick proceeds immediately, no backlog
        next_tick = std::cmp::max(next_tick + period, Instant::now());

        let image = camera.capture(cfg.exposure_s, &CaptureSettings::default())?;
        let track = tracker.detect(&image);

        if !track.found {
            misses += 1;
            if !star_lost && misses >= cfg.star_lost_frames {
                star_lost = true;
                ra_ctl.reset();
                dec_ctl.reset();
                log::warn!("guiding: star lost after {misses} consecutive misses");
            }
            if misses >= cfg.star_lost_timeout_frames {
                publish(&shared, |s| {
                    s.star_lost = true;
                });
                return Err(ServiceError::StarLostTimeout(misses));
            }
            publish(&shared, |s| {
                s.star_lost = star_lost;
            });
            continue;
        }

        if star_lost {
            star_lost = false;
            log::info!("guiding: star reacquired");
        }
        misses = 0;

        let (ref_x, ref_y) = *reference.get_or_insert((track.x_px, track.y_px));
        let error_ra = (track.x_px - ref_x) * cfg.pixel_scale_arcsec;
        let error_dec = (track.y_px - ref_y) * cfg.pixel_scale_arcsec;
        let error_total = (error_ra * error_ra + error_dec * error_dec).sqrt();
        rms.push(error_total);

        // deadband: sub-noise errors get no pulse and no integral
        let ra_pulse = if error_ra.abs() >= min_move_arcsec {
            ra_ctl.update(error_ra, aggression)
        } else {
            0.0
        };
        let dec_pulse = if error_dec.abs() >= min_move_arcsec {
            dec_ctl.update(error_dec, aggression)
        } else {
            0.0
        };

        // cancellation point: no new backend call once stop is requested
        if stop_requested(&mut stop_rx) {
            log::info!("guiding: stop requested");
            return Ok(());
        }
        if ra_pulse != 0.0 || dec_pulse != 0.0 {
            // push against the error; calibration signs map pixel axes to
            // pulse directions
            mount.pulse_guide(
                -ra_pulse * calibration.ra_sign,
                -dec_pulse * calibration.dec_sign,
            )?;
            log::debug!(
                "guiding: error ({error_ra:+.2}, {error_dec:+.2}) arcsec, pulse ({ra_pulse:.0}, {dec_pulse:.0}) ms"
            );
        }

        let rms_now = rms.rms();
        publish(&shared, |s| {
            s.star_lost = false;
            s.rms_arcsec = rms_now;
            s.last_error_arcsec = Some(error_total);
        });
    }
}

fn publish(shared: &Arc<StdMutex<Shared>>, update: impl FnOnce(&mut GuidingStatus)) {
    let mut locked = shared.lock().unwrap();
    update(&mut locked.status);
}
