//! End-to-end runs against the simulator rig: the same port handles the CLI
//! wires up, driven through the public service APIs.

use astromat::angles::{from_degrees, Equatorial};
use astromat::backend::sim::{SimOptions, SimRig};
use astromat::backend::MountPort;
use astromat::config::{CameraConfig, GotoConfig, GuideConfig, PolarConfig, SiteConfig, SolverConfig};
use astromat::guide::Guider;
use astromat::pointing::GotoService;
use astromat::polar::PolarAlignService;

fn drift_free(opts: SimOptions) -> SimOptions {
    SimOptions {
        drift_ra_arcsec_per_s: 0.0,
        drift_dec_arcsec_per_s: 0.0,
        solve_noise_arcsec: 0.0,
        ..opts
    }
}

#[test]
fn goto_centers_through_a_misaligned_mount() {
    // ~11.7 arcmin of polar-axis error pulls every slew off target; the
    // closed loop has to walk the commanded coordinate against it.
    let rig = SimRig::new(drift_free(SimOptions::default()));
    let mut mount = rig.mount();
    let mut camera = rig.camera();
    let mut solver = rig.solver();

    let cfg = GotoConfig::default();
    let camera_cfg = CameraConfig::default();
    let solver_cfg = SolverConfig::default();
    let mut service = GotoService::new(
        &mut mount,
        &mut camera,
        &mut solver,
        &cfg,
        &camera_cfg,
        &solver_cfg,
    );

    let target = Equatorial {
        ra_rad: 1.0,
        dec_rad: from_degrees(35.0),
    };
    let result = service.center_target(target, 5.0, 8).unwrap();

    assert!(result.success, "message: {:?}", result.message);
    assert!(result.final_error_arcsec.unwrap() <= 5.0);
    assert!(result.iterations >= 2, "first slew cannot land inside 5 arcsec");
}

#[test]
fn polar_align_reports_the_injected_axis_error() {
    let opts = drift_free(SimOptions {
        pole_alt_error_arcmin: 8.0,
        pole_az_error_arcmin: 5.0,
        ..SimOptions::default()
    });
    let latitude_deg = opts.latitude_deg;
    let rig = SimRig::new(opts);
    let mut mount = rig.mount();
    let mut camera = rig.camera();
    let mut solver = rig.solver();
    mount.slew_to(0.8, from_degrees(35.0)).unwrap();

    let cfg = PolarConfig::default();
    let site = SiteConfig { latitude_deg };
    let camera_cfg = CameraConfig::default();
    let solver_cfg = SolverConfig::default();
    let mut service = PolarAlignService::new(
        &mut mount,
        &mut camera,
        &mut solver,
        &cfg,
        &site,
        &camera_cfg,
        &solver_cfg,
    );

    let result = service.run(from_degrees(30.0)).unwrap();
    assert!(result.confidence > 0.9, "confidence {}", result.confidence);
    // axis 8' too high and 5' east: lower it, push it west
    assert!((result.alt_correction_arcsec + 480.0).abs() < 5.0);
    assert!((result.az_correction_arcsec + 300.0).abs() < 5.0);
}

#[tokio::test]
async fn guiding_holds_a_drifting_mount() {
    let rig = SimRig::new(SimOptions {
        solve_noise_arcsec: 0.0,
        ..SimOptions::default()
    });
    let cfg = GuideConfig {
        exposure_s: 0.05,
        cadence_ms: 10,
        ..GuideConfig::default()
    };
    let mut guider = Guider::new(cfg);

    {
        let mut camera = rig.camera();
        let mut mount = rig.mount();
        guider.calibrate(&mut camera, &mut mount, 2.0).unwrap();
    }

    guider
        .start(Box::new(rig.camera()), Box::new(rig.mount()), 0.8, 0.2)
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(800)).await;

    let status = guider.status();
    assert!(status.running);
    assert!(!status.star_lost);
    assert!(
        status.last_error_arcsec.unwrap() < 3.0,
        "error {:?}",
        status.last_error_arcsec
    );
    guider.stop().await.unwrap();
    assert!(!guider.status().running);
}
