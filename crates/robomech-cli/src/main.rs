//! `robomech` – run the cruise-then-ramp motion controller.
//!
//! This binary:
//!
//! 1. Loads `~/.robomech/config.toml` (or `$ROBOMECH_CONFIG`), falling back
//!    to defaults, and applies `ROBOMECH_*` overrides.
//! 2. Rejects unsupported configurations (e.g. `robot = "FWDIS"`) before any
//!    command is published, exiting non-zero.
//! 3. Runs the fixed-rate control loop against the built-in kinematic
//!    simulator until Ctrl-C or `max_ticks`.
//!
//! `robomech init` writes the default configuration file and exits.

mod config;

use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use robomech_hal::sim::SimWorld;
use robomech_hal::sink::{CommandSink, LogSink, Tee};
use robomech_perception::estimator::VelocityEstimator;
use robomech_runtime::control_loop::{ControlLoop, LoopSummary, MonotonicClock};
use robomech_runtime::controller::MotionController;
use robomech_runtime::telemetry::init_tracing;

fn main() -> ExitCode {
    // ── Structured logging ────────────────────────────────────────────────
    // Held until main returns so pending spans are flushed.
    let telemetry = init_tracing("robomech");

    print_banner();

    let path = config::config_path();
    if std::env::args().nth(1).as_deref() == Some("init") {
        return write_default_config(&path);
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            println!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    if path.exists() {
        println!("  Config loaded from {}", path.display().to_string().bold());
    } else {
        println!(
            "  No config at {}; using defaults.  Run `{}` to create one.",
            path.display().to_string().dimmed(),
            "robomech init".bold()
        );
    }

    if let Err(e) = cfg.validate() {
        error!(error = %e, robot = %cfg.robot, "configuration rejected");
        println!("{}: {}", "Startup error".red().bold(), e);
        return ExitCode::FAILURE;
    }
    let controller = match MotionController::new(cfg.robot, cfg.profile) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to build motion controller");
            println!("{}: {}", "Startup error".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!(
            "{}",
            "⚠  Ctrl-C received – stopping after the current tick …"
                .yellow()
                .bold()
        );
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the loop will only stop at max_ticks");
    }

    print_run_plan(&cfg);

    // ── Control loop ──────────────────────────────────────────────────────
    let world = SimWorld::new(cfg.sim_config());
    let (source, drive) = world.split();
    let sink: Box<dyn CommandSink> = if cfg.echo_commands {
        Box::new(Tee::new(drive, LogSink::new(cfg.velocity_topic.clone())))
    } else {
        Box::new(drive)
    };
    let mut control = ControlLoop::new(
        cfg.loop_config(),
        source,
        sink,
        MonotonicClock::new(),
        VelocityEstimator::new(cfg.estimator.yaw_rate),
        controller,
    );

    let summary = control.run_for(cfg.max_ticks(), &shutdown);
    let pose = world.pose();
    info!(
        ticks = summary.ticks,
        state = %summary.final_state,
        x = pose.x,
        y = pose.y,
        yaw = pose.yaw,
        "control loop stopped"
    );
    print_summary(&summary, pose.x, pose.y, pose.yaw);

    drop(telemetry);
    ExitCode::SUCCESS
}

fn write_default_config(path: &Path) -> ExitCode {
    if path.exists() {
        println!(
            "  {} already exists; leaving it untouched.",
            path.display().to_string().bold()
        );
        return ExitCode::SUCCESS;
    }
    match config::save_to(&config::Config::default(), path) {
        Ok(()) => {
            println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}: {}", "Error saving config".red(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!(
        "  {} {}",
        "robomech".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Cruise-then-ramp motion controller");
    println!();
}

fn print_run_plan(cfg: &config::Config) {
    let p = &cfg.profile;
    println!(
        "  {} {} → {}  publishing on {}",
        "Frames".bold(),
        cfg.world_frame,
        cfg.robot_frame,
        cfg.velocity_topic.bold()
    );
    println!(
        "  {} {} @ {} Hz  v_max={} threshold={} delay={}s dw={} w_max={}",
        "Profile".bold(),
        cfg.robot,
        p.tick_rate_hz,
        p.v_max,
        p.speed_threshold,
        p.ramp_delay,
        p.dw,
        p.w_max
    );
    match cfg.max_ticks() {
        Some(n) => println!("  Running {} ticks (Ctrl-C to stop early).\n", n),
        None => println!("  Running until {}.\n", "Ctrl-C".bold()),
    }
}

fn print_summary(summary: &LoopSummary, x: f64, y: f64, yaw: f64) {
    println!();
    println!("{}", "  ── Summary ─────────────────────────────".bold());
    println!("  ticks            {}", summary.ticks);
    println!("  published        {}", summary.published);
    if summary.publish_failures > 0 {
        println!("  publish failures {}", summary.publish_failures.to_string().red());
    }
    println!("  missed samples   {}", summary.missed_samples);
    println!("  overruns         {}", summary.overruns);
    println!("  final state      {}", summary.final_state.to_string().green());
    println!(
        "  last command     v_x={:.3} v_y={:.3} w_z={:.3}",
        summary.last_command.linear_x, summary.last_command.linear_y, summary.last_command.angular_z
    );
    println!("  sim pose         x={:.3} y={:.3} yaw={:.3}", x, y, yaw);
    println!();
}
