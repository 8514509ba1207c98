use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use astromat::angles::{clamp_dec, from_degrees, normalize_ra, Equatorial};
use astromat::backend::sim::{SimOptions, SimRig};
use astromat::config::{Config, ConfigError};
use astromat::guide::Guider;
use astromat::pointing::GotoService;
use astromat::polar::PolarAlignService;
use astromat::session::SessionGuard;

#[derive(Parser)]
#[command(name = "astromat")]
#[command(about = "Telescope mount control: goto centering, polar alignment, guiding")]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Hardware backend. Only the built-in simulator is compiled in.
    #[arg(long, global = true, value_enum, default_value_t = Backend::Sim)]
    backend: Backend,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Sim,
}

#[derive(Subcommand)]
enum Commands {
    /// Center a target with iterative slew/solve/correct rounds
    Goto {
        #[arg(long)]
        ra_deg: f64,
        #[arg(long)]
        dec_deg: f64,
        #[arg(long)]
        tolerance_arcsec: Option<f64>,
        #[arg(long)]
        max_iterations: Option<u32>,
    },
    /// Estimate polar-axis misalignment from two solved poses
    PolarAlign {
        /// RA rotation between the poses, degrees.
        #[arg(long)]
        rotation_deg: Option<f64>,
    },
    /// Guiding: calibration and the continuous correction loop
    Guide {
        #[command(subcommand)]
        command: GuideCommands,
    },
}

#[derive(Subcommand)]
enum GuideCommands {
    /// Measure guide pulse response on both axes
    Calibrate {
        /// Pulse length per axis.
        #[arg(long, default_value = "2s", value_parser = humantime::parse_duration)]
        duration: Duration,
    },
    /// Calibrate, then guide for a fixed duration
    Run(GuideRunArgs),
}

#[derive(Args)]
struct GuideRunArgs {
    #[arg(long, default_value = "60s", value_parser = humantime::parse_duration)]
    duration: Duration,
    /// Calibration pulse length per axis.
    #[arg(long, default_value = "2s", value_parser = humantime::parse_duration)]
    calibration_duration: Duration,
    #[arg(long)]
    aggression: Option<f64>,
    #[arg(long)]
    min_move_arcsec: Option<f64>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let sessions = SessionGuard::new();

    match cli.command {
        Commands::Goto {
            ra_deg,
            dec_deg,
            tolerance_arcsec,
            max_iterations,
        } => run_goto(
            &config,
            &sessions,
            cli.backend,
            cli.json,
            ra_deg,
            dec_deg,
            tolerance_arcsec,
            max_iterations,
        ),
        Commands::PolarAlign { rotation_deg } => {
            run_polar_align(&config, &sessions, cli.backend, cli.json, rotation_deg)
        },
        Commands::Guide { command } => match command {
            GuideCommands::Calibrate { duration } => {
                run_guide_calibrate(&config, &sessions, cli.backend, cli.json, duration)
            }
            GuideCommands::Run(args) => run_guide(&config, &sessions, cli.backend, cli.json, args),
        },
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config, ConfigError> {
    match path {
        Some(p) => Config::from_file(p),
        None => Ok(Config::default()),
    }
}

fn build_rig(backend: Backend, config: &Config) -> SimRig {
    let Backend::Sim = backend;
    SimRig::new(SimOptions {
        latitude_deg: config.site.latitude_deg,
        pole_alt_error_arcmin: config.sim.pole_alt_error_arcmin,
        pole_az_error_arcmin: config.sim.pole_az_error_arcmin,
        drift_ra_arcsec_per_s: config.sim.drift_ra_arcsec_per_s,
        drift_dec_arcsec_per_s: config.sim.drift_dec_arcsec_per_s,
        solve_noise_arcsec: config.sim.solve_noise_arcsec,
        pixel_scale_arcsec: config.guide.pixel_scale_arcsec,
        seed: config.sim.seed,
        ..SimOptions::default()
    })
}

fn report<T: Serialize>(json: bool, value: &T, human: impl FnOnce()) -> Result<(), ExitCode> {
    if json {
        match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Error serializing result: {e}");
                return Err(ExitCode::FAILURE);
            }
        }
    } else {
        human();
    }
    Ok(())
}

fn run_goto(
    config: &Config,
    sessions: &SessionGuard,
    backend: Backend,
    json: bool,
    ra_deg: f64,
    dec_deg: f64,
    tolerance_arcsec: Option<f64>,
    max_iterations: Option<u32>,
) -> ExitCode {
    let dec_rad = match clamp_dec(dec_deg.to_radians()) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let target = Equatorial {
        ra_rad: normalize_ra(ra_deg.to_radians()),
        dec_rad,
    };

    let _session = match sessions.try_acquire() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let rig = build_rig(backend, config);
    let mut mount = rig.mount();
    let mut camera = rig.camera();
    let mut solver = rig.solver();
    let mut service = GotoService::new(
        &mut mount,
        &mut camera,
        &mut solver,
        &config.pointing,
        &config.camera,
        &config.solver,
    );

    let tolerance = tolerance_arcsec.unwrap_or(config.pointing.tolerance_arcsec);
    let iterations = max_iterations.unwrap_or(config.pointing.max_iterations);
    let result = match service.center_target(target, tolerance, iterations) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if report(json, &result, || {
        match result.final_error_arcsec {
            Some(err) => println!(
                "{} after {} iteration(s), final error {:.1} arcsec",
                if result.success {
                    "Centered"
                } else {
                    "Not centered"
                },
                result.iterations,
                err
            ),
            None => println!("Not centered: no successful solve"),
        }
        if let Some(message) = &result.message {
            println!("{message}");
        }
    })
    .is_err()
    {
        return ExitCode::FAILURE;
    }

    if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_polar_align(
    config: &Config,
    sessions: &SessionGuard,
    backend: Backend,
    json: bool,
    rotation_deg: Option<f64>,
) -> ExitCode {
    let _session = match sessions.try_acquire() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let rig = build_rig(backend, config);
    let mut mount = rig.mount();
    let mut camera = rig.camera();
    let mut solver = rig.solver();
    let mut service = PolarAlignService::new(
        &mut mount,
        &mut camera,
        &mut solver,
        &config.polar,
        &config.site,
        &config.camera,
        &config.solver,
    );

    let rotation = from_degrees(rotation_deg.unwrap_or(config.polar.rotation_deg));
    let result = match service.run(rotation) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if report(json, &result, || {
        println!(
            "Altitude correction: {:+.0} arcsec ({})",
            result.alt_correction_arcsec,
            if result.alt_correction_arcsec >= 0.0 {
                "raise the axis"
            } else {
                "lower the axis"
            }
        );
        println!(
            "Azimuth correction:  {:+.0} arcsec ({})",
            result.az_correction_arcsec,
            if result.az_correction_arcsec >= 0.0 {
                "rotate east"
            } else {
                "rotate west"
            }
        );
        println!(
            "Residual {:.1} arcsec, confidence {:.2}",
            result.residual_arcsec, result.confidence
        );
        if let Some(message) = &result.message {
            println!("{message}");
        }
    })
    .is_err()
    {
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run_guide_calibrate(
    config: &Config,
    sessions: &SessionGuard,
    backend: Backend,
    json: bool,
    duration: Duration,
) -> ExitCode {
    let _session = match sessions.try_acquire() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let rig = build_rig(backend, config);
    let mut camera = rig.camera();
    let mut mount = rig.mount();
    let mut guider = Guider::new(config.guide.clone());

    let result = match guider.calibrate(&mut camera, &mut mount, duration.as_secs_f64()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if report(json, &result, || {
        println!(
            "RA:  {:.4} arcsec/ms, sign {:+.0}",
            result.ra_scale_arcsec_per_ms, result.ra_sign
        );
        println!(
            "DEC: {:.4} arcsec/ms, sign {:+.0}",
            result.dec_scale_arcsec_per_ms, result.dec_sign
        );
    })
    .is_err()
    {
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run_guide(
    config: &Config,
    sessions: &SessionGuard,
    backend: Backend,
    json: bool,
    args: GuideRunArgs,
) -> ExitCode {
    let _session = match sessions.try_acquire() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let rig = build_rig(backend, config);
    let mut guider = Guider::new(config.guide.clone());
    let aggression = args.aggression.unwrap_or(config.guide.aggression);
    let min_move = args.min_move_arcsec.unwrap_or(config.guide.min_move_arcsec);

    runtime.block_on(async {
        {
            let mut camera = rig.camera();
            let mut mount = rig.mount();
            if let Err(e) = guider.calibrate(
                &mut camera,
                &mut mount,
                args.calibration_duration.as_secs_f64(),
            ) {
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if let Err(e) = guider.start(
            Box::new(rig.camera()),
            Box::new(rig.mount()),
            aggression,
            min_move,
        ) {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }

        let end = tokio::time::Instant::now() + args.duration;
        while tokio::time::Instant::now() < end {
            tokio::time::sleep(Duration::from_secs(1).min(args.duration)).await;
            let status = guider.status();
            if !status.running {
                break;
            }
            if !json {
                if let (Some(rms), Some(last)) = (status.rms_arcsec, status.last_error_arcsec) {
                    println!("RMS {rms:.2} arcsec, last error {last:.2} arcsec");
                } else if status.star_lost {
                    println!("Star lost, corrections suspended");
                }
            }
        }

        let stopped_early = !guider.status().running;
        if let Err(e) = guider.stop().await {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }

        let status = guider.status();
        if report(json, &status, || match status.rms_arcsec {
            Some(rms) => println!("Guiding finished, RMS {rms:.2} arcsec"),
            None => println!("Guiding finished without any tracked frames"),
        })
        .is_err()
        {
            return ExitCode::FAILURE;
        }

        if stopped_early {
            eprintln!("Guiding stopped before the requested duration elapsed");
            return ExitCode::FAILURE;
        }
        ExitCode::SUCCESS
    })
}
