//! Fixed-rate sample → estimate → control → publish loop.
//!
//! Each tick performs, strictly in order:
//!
//! 1. at most one transform lookup (`world_frame → robot_frame`, latest),
//! 2. at most one velocity estimate,
//! 3. exactly one [`MotionController::tick`],
//! 4. exactly one [`CommandSink::publish`], even when steps 1–2 produced
//!    nothing, so the drive keeps receiving the held command.
//!
//! The loop is single-threaded.  It blocks only inside the transform lookup
//! and in [`Rate::sleep`]; shutdown is a flag checked at every tick boundary.
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::AtomicBool;
//! use robomech_hal::sim::{SimConfig, SimWorld};
//! use robomech_perception::estimator::{VelocityEstimator, YawRateMode};
//! use robomech_runtime::control_loop::{ControlLoop, LoopConfig, ManualClock};
//! use robomech_runtime::controller::{ControllerState, MotionController, MotionProfile};
//! use robomech_types::RobotVariant;
//!
//! let world = SimWorld::new(SimConfig { linear_gain: 1.1, ..SimConfig::default() });
//! let (source, drive) = world.split();
//! let controller = MotionController::new(RobotVariant::Dd, MotionProfile::default()).unwrap();
//!
//! let mut control = ControlLoop::new(
//!     LoopConfig::default(),
//!     source,
//!     drive,
//!     ManualClock::new(0.0),
//!     VelocityEstimator::new(YawRateMode::Raw),
//!     controller,
//! );
//! let summary = control.run_for(Some(60), &AtomicBool::new(false));
//! assert_eq!(summary.published, 60);
//! assert_eq!(summary.final_state, ControllerState::Ramping);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use robomech_hal::sink::CommandSink;
use robomech_perception::estimator::{PoseSample, Twist, VelocityEstimator};
use robomech_perception::source::{LookupTime, TransformSource};
use robomech_types::VelocityCommand;
use tracing::{debug, info, instrument, warn};

use crate::controller::{ControllerState, MotionController};
use crate::dropout::{DropoutEvent, DropoutGuard};

// ────────────────────────────────────────────────────────────────────────────
// Clocks
// ────────────────────────────────────────────────────────────────────────────

/// Time base for the loop, in seconds.
pub trait Clock {
    fn now(&self) -> f64;

    /// Block until `now() >= deadline`.  Returns immediately if the deadline
    /// has already passed.
    fn sleep_until(&mut self, deadline: f64);
}

/// Wall-clock time from [`Instant`], counted from construction.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn sleep_until(&mut self, deadline: f64) {
        let remaining = deadline - self.now();
        if remaining <= 0.0 {
            return;
        }
        match Duration::try_from_secs_f64(remaining) {
            Ok(d) => std::thread::sleep(d),
            Err(e) => warn!(remaining, error = %e, "sleep deadline out of range, not sleeping"),
        }
    }
}

/// Manually driven clock for tests and offline runs.  Sleeping jumps time
/// straight to the deadline.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: f64,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self { now: start }
    }

    pub fn advance(&mut self, dt: f64) {
        self.now += dt;
    }

    pub fn set(&mut self, now: f64) {
        self.now = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now
    }

    fn sleep_until(&mut self, deadline: f64) {
        if deadline > self.now {
            self.now = deadline;
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rate
// ────────────────────────────────────────────────────────────────────────────

/// Deadline scheduler that keeps ticks `period` seconds apart.
///
/// Deadlines advance by exactly one period so short jitter does not
/// accumulate drift.  After an overrun the schedule is re-based on the
/// current time instead of firing a burst of catch-up ticks.
#[derive(Debug, Clone)]
pub struct Rate {
    period: f64,
    next_deadline: Option<f64>,
    overruns: u64,
}

impl Rate {
    pub fn new(period: f64) -> Self {
        Self {
            period,
            next_deadline: None,
            overruns: 0,
        }
    }

    /// Anchor the schedule at `now`; the first deadline is `now + period`.
    pub fn start(&mut self, now: f64) {
        self.next_deadline = Some(now + self.period);
    }

    /// Sleep until the next deadline.  Returns `false` if the deadline had
    /// already passed (an overrun).
    pub fn sleep<C: Clock>(&mut self, clock: &mut C) -> bool {
        let now = clock.now();
        let deadline = self.next_deadline.unwrap_or(now + self.period);

        if now <= deadline {
            clock.sleep_until(deadline);
            self.next_deadline = Some(deadline + self.period);
            true
        } else {
            self.overruns += 1;
            debug!(late_by = now - deadline, "tick overran its period");
            self.next_deadline = Some(now + self.period);
            false
        }
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Loop configuration and reports
// ────────────────────────────────────────────────────────────────────────────

/// Frame names and reporting knobs for a [`ControlLoop`].  The tick rate
/// comes from the controller's profile.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    pub world_frame: String,
    pub robot_frame: String,
    /// Consecutive ticks without a pose sample before a warning is logged.
    /// `0` disables the warning.
    pub dropout_warn_ticks: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            world_frame: "map".to_string(),
            robot_frame: "base_link".to_string(),
            dropout_warn_ticks: 20,
        }
    }
}

/// What happened during one [`ControlLoop::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Zero-based tick index.
    pub tick: u64,
    /// Loop clock at the start of the tick.
    pub now: f64,
    pub sample: Option<PoseSample>,
    pub estimate: Option<Twist>,
    pub command: VelocityCommand,
    pub state: ControllerState,
    /// Whether the sink accepted the command.
    pub published: bool,
}

/// Totals over the loop's lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSummary {
    pub ticks: u64,
    pub published: u64,
    pub publish_failures: u64,
    pub missed_samples: u64,
    pub overruns: u64,
    pub final_state: ControllerState,
    pub last_command: VelocityCommand,
}

// ────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ────────────────────────────────────────────────────────────────────────────

/// The fixed-rate control loop, generic over its pose source, command sink
/// and clock.
pub struct ControlLoop<S, K, C> {
    config: LoopConfig,
    source: S,
    sink: K,
    clock: C,
    estimator: VelocityEstimator,
    controller: MotionController,
    dropout: DropoutGuard,
    rate: Rate,
    ticks: u64,
    published: u64,
    publish_failures: u64,
}

impl<S, K, C> ControlLoop<S, K, C>
where
    S: TransformSource,
    K: CommandSink,
    C: Clock,
{
    pub fn new(
        config: LoopConfig,
        source: S,
        sink: K,
        clock: C,
        estimator: VelocityEstimator,
        controller: MotionController,
    ) -> Self {
        let rate = Rate::new(controller.profile().period());
        let dropout = DropoutGuard::new(config.dropout_warn_ticks);
        Self {
            config,
            source,
            sink,
            clock,
            estimator,
            controller,
            dropout,
            rate,
            ticks: 0,
            published: 0,
            publish_failures: 0,
        }
    }

    /// Run one tick without sleeping.
    #[instrument(level = "debug", skip_all, fields(tick = self.ticks))]
    pub fn step(&mut self) -> TickReport {
        let now = self.clock.now();

        let sample = match self.source.lookup(
            &self.config.world_frame,
            &self.config.robot_frame,
            LookupTime::Latest,
        ) {
            Ok(sample) => Some(sample),
            Err(e) => {
                debug!(error = %e, "transform unavailable, skipping estimate");
                None
            }
        };

        match self.dropout.record(sample.is_some()) {
            DropoutEvent::OutageStarted { missed } => warn!(
                missed,
                world = %self.config.world_frame,
                robot = %self.config.robot_frame,
                "no pose samples received"
            ),
            DropoutEvent::Recovered { missed } => info!(missed, "pose samples recovered"),
            DropoutEvent::None => {}
        }

        let estimate = sample.and_then(|s| self.estimator.update(s));
        let command = self.controller.tick(estimate, now);

        let published = match self.sink.publish(&command) {
            Ok(()) => {
                self.published += 1;
                true
            }
            Err(e) => {
                self.publish_failures += 1;
                warn!(error = %e, topic = %self.sink.topic(), "command publish failed");
                false
            }
        };

        let report = TickReport {
            tick: self.ticks,
            now,
            sample,
            estimate,
            command,
            state: self.controller.state(),
            published,
        };
        self.ticks += 1;
        report
    }

    /// Tick at the profile rate until `shutdown` is set.
    pub fn run(&mut self, shutdown: &AtomicBool) -> LoopSummary {
        self.run_for(None, shutdown)
    }

    /// Tick at the profile rate until `shutdown` is set or `max_ticks` ticks
    /// have run in this call.
    ///
    /// The flag is only checked between ticks; once it is seen no further
    /// command is published.
    pub fn run_for(&mut self, max_ticks: Option<u64>, shutdown: &AtomicBool) -> LoopSummary {
        info!(
            world = %self.config.world_frame,
            robot = %self.config.robot_frame,
            topic = %self.sink.topic(),
            rate_hz = self.controller.profile().tick_rate_hz,
            "control loop starting"
        );
        self.rate.start(self.clock.now());

        let mut ran = 0u64;
        loop {
            if shutdown.load(Ordering::SeqCst) {
                info!(ticks = self.ticks, "shutdown requested, leaving control loop");
                break;
            }
            if max_ticks.is_some_and(|max| ran >= max) {
                break;
            }
            self.step();
            ran += 1;
            self.rate.sleep(&mut self.clock);
        }

        self.summary()
    }

    pub fn summary(&self) -> LoopSummary {
        LoopSummary {
            ticks: self.ticks,
            published: self.published,
            publish_failures: self.publish_failures,
            missed_samples: self.dropout.total_missed(),
            overruns: self.rate.overruns(),
            final_state: self.controller.state(),
            last_command: self.controller.command(),
        }
    }

    pub fn controller(&self) -> &MotionController {
        &self.controller
    }

    pub fn estimator(&self) -> &VelocityEstimator {
        &self.estimator
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }
}
