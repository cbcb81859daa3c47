//! `robomech-runtime` – the control loop.
//!
//! # Modules
//!
//! - [`controller`] – [`MotionController`][controller::MotionController]: the
//!   cruise → threshold → ramp motion-profile state machine.
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]: the
//!   fixed-rate tick that samples a pose, estimates velocity, runs the
//!   controller and publishes exactly one command.
//! - [`dropout`] – [`DropoutGuard`][dropout::DropoutGuard]: turns long runs of
//!   failed transform lookups into a single warning.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console
//!   logging plus optional OTLP span export.

pub mod control_loop;
pub mod controller;
pub mod dropout;
pub mod telemetry;

pub use control_loop::{
    Clock, ControlLoop, LoopConfig, LoopSummary, ManualClock, MonotonicClock, Rate, TickReport,
};
pub use controller::{ControllerState, MotionController, MotionProfile, RampState};
pub use dropout::{DropoutEvent, DropoutGuard};
pub use telemetry::{TracerProviderGuard, init_tracing};
