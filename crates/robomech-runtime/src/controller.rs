//! Motion-profile state machine for a differential-drive base.
//!
//! The profile has two phases:
//!
//! 1. **Cruise** – drive straight at `v_max`.
//! 2. **Ramp** – once the *estimated* forward speed has exceeded
//!    `speed_threshold` and a further `ramp_delay` has elapsed, raise the yaw
//!    rate by `dw / tick_rate_hz` every tick, clamped to `±w_max`, while
//!    holding `v_max`.
//!
//! ```text
//!  AwaitingFirstSample ──twist──▶ Cruising ──v_x > threshold──▶ ThresholdDetected
//!                                                                  │ elapsed > delay
//!                                                                  ▼
//!                                                               Ramping (terminal)
//! ```
//!
//! # Example
//!
//! ```rust
//! use robomech_perception::estimator::Twist;
//! use robomech_perception::transform::Vec3;
//! use robomech_runtime::controller::{ControllerState, MotionController, MotionProfile};
//! use robomech_types::RobotVariant;
//!
//! let mut ctrl = MotionController::new(RobotVariant::Dd, MotionProfile::default()).unwrap();
//! assert_eq!(ctrl.tick(None, 0.0).linear_x, 0.0);
//!
//! let twist = Twist { linear: Vec3::new(0.2, 0.0, 0.0), angular_z: 0.0 };
//! let cmd = ctrl.tick(Some(twist), 0.05);
//! assert_eq!(ctrl.state(), ControllerState::Cruising);
//! assert_eq!(cmd.linear_x, 0.5);
//! ```

use robomech_perception::estimator::Twist;
use robomech_types::{RoboError, RobotVariant, VelocityCommand};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use tracing::{debug, info};

// ────────────────────────────────────────────────────────────────────────────
// Profile
// ────────────────────────────────────────────────────────────────────────────

/// Loop rates the controller accepts.
pub const TICK_RATE_RANGE_HZ: RangeInclusive<f64> = 0.1..=1000.0;

/// Tunable constants of the cruise-then-ramp profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionProfile {
    /// Control loop rate (Hz).  Also sets the ramp step `dw / tick_rate_hz`.
    pub tick_rate_hz: f64,
    /// Cruise speed (m/s).
    pub v_max: f64,
    /// Estimated forward speed that arms the ramp (m/s, strict `>`).
    pub speed_threshold: f64,
    /// Wait between arming and the first ramp step (s, strict `>`).
    pub ramp_delay: f64,
    /// Yaw-rate ramp slope (rad/s per second).
    pub dw: f64,
    /// Yaw-rate clamp (rad/s).
    pub w_max: f64,
    /// Keep advancing the armed/ramping phases on ticks with no velocity
    /// estimate.  When `false` those ticks hold the previous command in
    /// every state.
    pub ramp_through_dropouts: bool,
}

impl Default for MotionProfile {
    fn default() -> Self {
        Self {
            tick_rate_hz: 20.0,
            v_max: 0.5,
            speed_threshold: 0.5,
            ramp_delay: 1.0,
            dw: 1.0,
            w_max: 0.8,
            ramp_through_dropouts: true,
        }
    }
}

impl MotionProfile {
    /// Yaw-rate increment applied on each ramping tick.
    pub fn ramp_step(&self) -> f64 {
        self.dw / self.tick_rate_hz
    }

    /// Nominal tick period in seconds.
    pub fn period(&self) -> f64 {
        1.0 / self.tick_rate_hz
    }

    /// Reject profiles the state machine cannot run with.
    pub fn validate(&self) -> Result<(), RoboError> {
        let fields = [
            ("tick_rate_hz", self.tick_rate_hz),
            ("v_max", self.v_max),
            ("speed_threshold", self.speed_threshold),
            ("ramp_delay", self.ramp_delay),
            ("dw", self.dw),
            ("w_max", self.w_max),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(RoboError::InvalidConfig(format!(
                "profile.{name} must be finite, got {value}"
            )));
        }
        if !TICK_RATE_RANGE_HZ.contains(&self.tick_rate_hz) {
            return Err(RoboError::InvalidConfig(format!(
                "profile.tick_rate_hz must be within {}..={} Hz, got {}",
                TICK_RATE_RANGE_HZ.start(),
                TICK_RATE_RANGE_HZ.end(),
                self.tick_rate_hz
            )));
        }
        if self.w_max < 0.0 {
            return Err(RoboError::InvalidConfig(format!(
                "profile.w_max must not be negative, got {}",
                self.w_max
            )));
        }
        if self.ramp_delay < 0.0 {
            return Err(RoboError::InvalidConfig(format!(
                "profile.ramp_delay must not be negative, got {}",
                self.ramp_delay
            )));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// State
// ────────────────────────────────────────────────────────────────────────────

/// Phase of the motion profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    /// No velocity estimate seen yet; commanding a stop.
    AwaitingFirstSample,
    /// Driving straight at `v_max`.
    Cruising,
    /// Speed threshold crossed; waiting out `ramp_delay`.
    ThresholdDetected,
    /// Yaw rate ramping toward `±w_max`.
    Ramping,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ControllerState::AwaitingFirstSample => "awaiting_first_sample",
            ControllerState::Cruising => "cruising",
            ControllerState::ThresholdDetected => "threshold_detected",
            ControllerState::Ramping => "ramping",
        };
        f.write_str(name)
    }
}

/// Ramp bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RampState {
    /// Current yaw-rate command; only ever grows in magnitude until clamped.
    pub angular_command: f64,
    /// When the speed threshold was first crossed.  Set at most once.
    pub threshold_crossed_at: Option<f64>,
}

// ────────────────────────────────────────────────────────────────────────────
// MotionController
// ────────────────────────────────────────────────────────────────────────────

/// Differential-drive cruise/ramp controller.
///
/// Owns the outgoing [`VelocityCommand`]; callers only ever see copies
/// returned from [`tick`][Self::tick].
#[derive(Debug, Clone)]
pub struct MotionController {
    profile: MotionProfile,
    state: ControllerState,
    ramp: RampState,
    command: VelocityCommand,
}

impl MotionController {
    /// Build the controller for `variant`.
    ///
    /// # Errors
    ///
    /// - [`RoboError::UnsupportedVariant`] for [`RobotVariant::Fwdis`], which
    ///   has no motion profile.
    /// - [`RoboError::InvalidConfig`] if `profile` fails
    ///   [`MotionProfile::validate`].
    pub fn new(variant: RobotVariant, profile: MotionProfile) -> Result<Self, RoboError> {
        match variant {
            RobotVariant::Dd => {}
            RobotVariant::Fwdis => return Err(RoboError::UnsupportedVariant(variant)),
        }
        profile.validate()?;
        Ok(Self {
            profile,
            state: ControllerState::AwaitingFirstSample,
            ramp: RampState::default(),
            command: VelocityCommand::zero(),
        })
    }

    /// Advance one control tick and return the command to publish.
    ///
    /// `estimate` is `None` when no velocity estimate could be produced this
    /// tick; `now` is the loop clock in seconds.
    pub fn tick(&mut self, estimate: Option<Twist>, now: f64) -> VelocityCommand {
        let armed = matches!(
            self.state,
            ControllerState::ThresholdDetected | ControllerState::Ramping
        );
        let clock_driven = armed && self.profile.ramp_through_dropouts;

        match (estimate, clock_driven) {
            (Some(twist), _) => self.advance(Some(twist), now),
            (None, true) => self.advance(None, now),
            (None, false) => {
                debug!(state = %self.state, "no estimate, holding command");
            }
        }
        self.command
    }

    fn advance(&mut self, twist: Option<Twist>, now: f64) {
        if self.state == ControllerState::AwaitingFirstSample {
            // Callers only reach here with an estimate while awaiting.
            self.transition(ControllerState::Cruising, now);
        }

        self.command.linear_x = self.profile.v_max;
        self.command.linear_y = 0.0;

        match self.state {
            ControllerState::AwaitingFirstSample => {}
            ControllerState::Cruising => {
                self.command.angular_z = 0.0;
                if let Some(twist) = twist
                    && twist.linear.x > self.profile.speed_threshold
                    && self.ramp.threshold_crossed_at.is_none()
                {
                    self.ramp.threshold_crossed_at = Some(now);
                    info!(v_x = twist.linear.x, t = now, "speed threshold crossed");
                    self.transition(ControllerState::ThresholdDetected, now);
                }
            }
            ControllerState::ThresholdDetected => {
                if let Some(crossed_at) = self.ramp.threshold_crossed_at
                    && now - crossed_at > self.profile.ramp_delay
                {
                    self.transition(ControllerState::Ramping, now);
                    self.ramp_step();
                }
            }
            ControllerState::Ramping => self.ramp_step(),
        }
    }

    fn ramp_step(&mut self) {
        let w_max = self.profile.w_max;
        self.ramp.angular_command =
            (self.ramp.angular_command + self.profile.ramp_step()).clamp(-w_max, w_max);
        self.command.angular_z = self.ramp.angular_command;
        debug!(angular_z = self.command.angular_z, "ramp step");
    }

    fn transition(&mut self, next: ControllerState, now: f64) {
        info!(from = %self.state, to = %next, t = now, "controller state change");
        self.state = next;
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn ramp(&self) -> RampState {
        self.ramp
    }

    /// The command most recently returned by [`tick`][Self::tick].
    pub fn command(&self) -> VelocityCommand {
        self.command
    }

    pub fn profile(&self) -> &MotionProfile {
        &self.profile
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
